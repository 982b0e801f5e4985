use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;

use super::ServiceContext;
use crate::catalog::{self, ModelsResponse};
use crate::rerank::{self, RerankError};
use crate::types::{HealthResponse, RerankRequest, RerankResponse};

const QUERY_PREVIEW_CHARS: usize = 50;
const CORS_ALLOW_METHODS: &str = "DELETE, GET, HEAD, OPTIONS, PATCH, POST, PUT";

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

type ErrorReply = (StatusCode, Json<ErrorResponse>);

pub fn router(context: ServiceContext) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/rerank", post(handle_rerank))
        .route("/models", get(list_models))
        .layer(DefaultBodyLimit::max(context.max_body_bytes()));

    if context.cors() {
        router = router.layer(middleware::from_fn(cors));
    }

    router.with_state(context)
}

async fn health(State(context): State<ServiceContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: context.model().to_string(),
    })
}

async fn list_models() -> Json<ModelsResponse> {
    Json(catalog::models_response())
}

async fn handle_rerank(
    State(context): State<ServiceContext>,
    body: Bytes,
) -> Result<Json<RerankResponse>, ErrorReply> {
    let input = RerankRequest::from_json_slice(&body)
        .and_then(RerankRequest::validate)
        .map_err(map_rerank_error)?;

    tracing::info!(
        documents = input.documents.len(),
        top_n = input.top_n,
        query = %query_preview(&input.query),
        "reranking documents"
    );

    let _permit = context
        .acquire_scoring_permit()
        .await
        .map_err(map_rerank_error)?;

    rerank::rerank(context.scorer(), &input)
        .await
        .map(Json)
        .map_err(map_rerank_error)
}

/// First 50 characters of the query followed by `...`, whatever its length.
fn query_preview(query: &str) -> String {
    let preview: String = query.chars().take(QUERY_PREVIEW_CHARS).collect();
    format!("{preview}...")
}

fn error_response(status: StatusCode, message: impl Into<String>) -> ErrorReply {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn map_rerank_error(err: RerankError) -> ErrorReply {
    match err {
        RerankError::InvalidRequest(message) => {
            tracing::debug!(%message, "rejected rerank request");
            error_response(StatusCode::BAD_REQUEST, message)
        }
        RerankError::ScoringFailure(message) => {
            tracing::error!(%message, "error during reranking");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    }
}

/// Permissive CORS: any origin, and preflight requests are answered here
/// without reaching the routes.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        preflight_response(request.headers())
    } else {
        next.run(request).await
    };
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

fn preflight_response(request_headers: &HeaderMap) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    if let Some(requested) = request_headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
    }
    (StatusCode::OK, headers).into_response()
}

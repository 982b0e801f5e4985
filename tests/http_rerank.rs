use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode};
use crossrank::server::http::router;
use crossrank::{CrossEncoder, CrossrankError, RerankResponse, ScoringPair, ServiceContext};
use serde_json::{Value, json};
use tower::util::ServiceExt;

struct StubScorer {
    scores: Vec<f64>,
    calls: Arc<AtomicUsize>,
}

impl StubScorer {
    fn new(scores: Vec<f64>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                scores,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl CrossEncoder for StubScorer {
    fn model_id(&self) -> &str {
        "cross-encoder/ms-marco-MiniLM-L-6-v2"
    }

    async fn predict(&self, pairs: &[ScoringPair<'_>]) -> crossrank::Result<Vec<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.scores.iter().copied().take(pairs.len()).collect())
    }
}

struct BrokenScorer;

#[async_trait]
impl CrossEncoder for BrokenScorer {
    fn model_id(&self) -> &str {
        "broken"
    }

    async fn predict(&self, _pairs: &[ScoringPair<'_>]) -> crossrank::Result<Vec<f64>> {
        Err(CrossrankError::InvalidResponse("CUDA out of memory".to_string()))
    }
}

/// Counts query words in each document; records peak concurrency.
struct SlowScorer {
    in_flight: AtomicUsize,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl CrossEncoder for SlowScorer {
    fn model_id(&self) -> &str {
        "slow"
    }

    async fn predict(&self, pairs: &[ScoringPair<'_>]) -> crossrank::Result<Vec<f64>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(pairs
            .iter()
            .map(|pair| {
                pair.document
                    .split_whitespace()
                    .filter(|word| pair.query.split_whitespace().any(|q| q == *word))
                    .count() as f64
            })
            .collect())
    }
}

fn app_with(scorer: impl CrossEncoder + 'static) -> Router {
    router(ServiceContext::new(Arc::new(scorer)))
}

fn post_rerank(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/rerank")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_reports_loaded_model() {
    let (scorer, _) = StubScorer::new(Vec::new());
    let response = app_with(scorer).oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"status": "ok", "model": "cross-encoder/ms-marco-MiniLM-L-6-v2"})
    );
}

#[tokio::test]
async fn models_lists_static_catalog() {
    let (scorer, _) = StubScorer::new(Vec::new());
    let response = app_with(scorer).oneshot(get("/models")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let models = body["models"].as_array().unwrap();
    assert_eq!(models.len(), 4);
    assert_eq!(models[0]["name"], "cross-encoder/ms-marco-MiniLM-L-6-v2");
    assert_eq!(models[0]["languages"], json!(["en"]));
    assert_eq!(models[3]["size"], "~250MB");
}

#[tokio::test]
async fn rerank_returns_top_n_in_descending_order() {
    let (scorer, calls) = StubScorer::new(vec![0.9, 0.1, 0.8]);
    let payload = json!({
        "query": "cat",
        "documents": ["a cat sat", "a dog ran", "feline on a mat"],
        "top_n": 2
    });
    let response = app_with(scorer)
        .oneshot(post_rerank(payload.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(
        std::str::from_utf8(&body).unwrap(),
        r#"{"scores":[0.9,0.8],"indices":[0,2]}"#
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rerank_defaults_and_clamps_top_n() {
    let (scorer, _) = StubScorer::new(vec![0.2, 0.5, 0.2]);
    let app = app_with(scorer);

    for top_n in [json!(null), json!(3), json!(50)] {
        let payload = json!({"query": "q", "documents": ["a", "b", "c"], "top_n": top_n});
        let response = app
            .clone()
            .oneshot(post_rerank(payload.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let parsed: RerankResponse = serde_json::from_value(json_body(response).await).unwrap();
        assert_eq!(parsed.indices, vec![1, 0, 2]);
        assert_eq!(parsed.scores, vec![0.5, 0.2, 0.2]);
    }

    let payload = json!({"query": "q", "documents": ["a", "b", "c"]});
    let response = app
        .clone()
        .oneshot(post_rerank(payload.to_string()))
        .await
        .unwrap();
    let parsed: RerankResponse = serde_json::from_value(json_body(response).await).unwrap();
    assert_eq!(parsed.indices.len(), 3);

    for top_n in [0, -2] {
        let payload = json!({"query": "q", "documents": ["a", "b", "c"], "top_n": top_n});
        let response = app
            .clone()
            .oneshot(post_rerank(payload.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"scores": [], "indices": []})
        );
    }
}

#[tokio::test]
async fn rerank_rejects_missing_body() {
    let (scorer, calls) = StubScorer::new(vec![0.1]);
    let app = app_with(scorer);

    for body in ["", "{not json", "{}", "null"] {
        let response = app.clone().oneshot(post_rerank(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body:?}");
        assert_eq!(
            json_body(response).await,
            json!({"error": "No JSON data provided"})
        );
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rerank_rejects_missing_query() {
    let (scorer, calls) = StubScorer::new(vec![0.1]);
    let app = app_with(scorer);

    for payload in [
        json!({"documents": ["a"]}),
        json!({"query": "", "documents": ["a"]}),
        json!({"query": null, "documents": []}),
    ] {
        let response = app
            .clone()
            .oneshot(post_rerank(payload.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({"error": "Missing 'query' field"})
        );
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rerank_rejects_missing_or_empty_documents() {
    let (scorer, _) = StubScorer::new(vec![0.1]);
    let app = app_with(scorer);

    for payload in [
        json!({"query": "cat", "documents": []}),
        json!({"query": "cat"}),
    ] {
        let response = app
            .clone()
            .oneshot(post_rerank(payload.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({"error": "Missing or empty 'documents' field"})
        );
    }
}

#[tokio::test]
async fn rerank_rejects_mistyped_fields() {
    let (scorer, _) = StubScorer::new(vec![0.1]);
    let payload = json!({"query": "cat", "documents": ["a", 3]});
    let response = app_with(scorer)
        .oneshot(post_rerank(payload.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request body: ")
    );
}

#[tokio::test]
async fn scoring_failure_returns_500_with_message() {
    let payload = json!({"query": "cat", "documents": ["a"]});
    let response = app_with(BrokenScorer)
        .oneshot(post_rerank(payload.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await,
        json!({"error": "invalid response: CUDA out of memory"})
    );
}

#[tokio::test]
async fn short_score_vector_returns_500() {
    let (scorer, _) = StubScorer::new(vec![0.4]);
    let payload = json!({"query": "cat", "documents": ["a", "b"]});
    let response = app_with(scorer)
        .oneshot(post_rerank(payload.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await,
        json!({"error": "scorer returned 1 scores for 2 documents"})
    );
}

#[tokio::test]
async fn rerank_requires_post() {
    let (scorer, _) = StubScorer::new(Vec::new());
    let response = app_with(scorer).oneshot(get("/rerank")).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn responses_carry_cors_headers() {
    let (scorer, _) = StubScorer::new(Vec::new());
    let app = app_with(scorer);

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    let preflight = Request::builder()
        .method("OPTIONS")
        .uri("/rerank")
        .header("origin", "http://localhost:5173")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(preflight).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(
        response.headers()["access-control-allow-headers"],
        "content-type"
    );
    assert!(
        response.headers()["access-control-allow-methods"]
            .to_str()
            .unwrap()
            .contains("POST")
    );
}

#[tokio::test]
async fn cors_can_be_disabled() {
    let (scorer, _) = StubScorer::new(Vec::new());
    let app = router(ServiceContext::new(Arc::new(scorer)).with_cors(false));
    let response = app.oneshot(get("/health")).await.unwrap();
    assert!(response.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let (scorer, calls) = StubScorer::new(vec![0.1]);
    let app = router(ServiceContext::new(Arc::new(scorer)).with_max_body_bytes(16));
    let payload = json!({"query": "cat", "documents": ["a much longer document"]});
    let response = app.oneshot(post_rerank(payload.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn max_concurrency_serialises_scoring() {
    let peak = Arc::new(AtomicUsize::new(0));
    let scorer = SlowScorer {
        in_flight: AtomicUsize::new(0),
        peak: peak.clone(),
    };
    let app = router(ServiceContext::new(Arc::new(scorer)).with_max_concurrency(1));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            let payload = json!({
                "query": "red fox",
                "documents": ["a red fox", "blue whale", "fox"]
            });
            app.oneshot(post_rerank(payload.to_string())).await.unwrap()
        }));
    }

    for handle in handles {
        let response = handle.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"scores": [2.0, 1.0, 0.0], "indices": [0, 2, 1]})
        );
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

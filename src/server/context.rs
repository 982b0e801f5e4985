use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::{DEFAULT_MAX_BODY_BYTES, ServerConfig};
use crate::rerank::{CrossEncoder, RerankError};

/// Everything a request handler needs, built once at startup.
///
/// Cloning is cheap and every clone shares the same scorer. Nothing in here
/// changes after construction.
#[derive(Clone)]
pub struct ServiceContext {
    model: Arc<str>,
    scorer: Arc<dyn CrossEncoder>,
    scoring_permits: Option<Arc<Semaphore>>,
    max_body_bytes: usize,
    cors: bool,
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("model", &self.model)
            .field(
                "available_scoring_permits",
                &self
                    .scoring_permits
                    .as_ref()
                    .map(|permits| permits.available_permits()),
            )
            .field("max_body_bytes", &self.max_body_bytes)
            .field("cors", &self.cors)
            .finish_non_exhaustive()
    }
}

impl ServiceContext {
    pub fn new(scorer: Arc<dyn CrossEncoder>) -> Self {
        Self {
            model: Arc::from(scorer.model_id()),
            scorer,
            scoring_permits: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            cors: true,
        }
    }

    pub fn from_config(scorer: Arc<dyn CrossEncoder>, config: &ServerConfig) -> Self {
        let mut context = Self::new(scorer)
            .with_max_body_bytes(config.max_body_bytes)
            .with_cors(config.cors);
        if let Some(max_concurrency) = config.max_concurrency {
            context = context.with_max_concurrency(max_concurrency);
        }
        context
    }

    /// Bounds in-flight scorer calls. `1` serialises them for backends that
    /// cannot score concurrently.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.scoring_permits = Some(Arc::new(Semaphore::new(max_concurrency.max(1))));
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes.max(1);
        self
    }

    pub fn with_cors(mut self, cors: bool) -> Self {
        self.cors = cors;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn scorer(&self) -> &dyn CrossEncoder {
        self.scorer.as_ref()
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub fn cors(&self) -> bool {
        self.cors
    }

    pub(crate) async fn acquire_scoring_permit(
        &self,
    ) -> Result<Option<OwnedSemaphorePermit>, RerankError> {
        let Some(permits) = self.scoring_permits.as_ref() else {
            return Ok(None);
        };
        permits
            .clone()
            .acquire_owned()
            .await
            .map(Some)
            .map_err(|_| RerankError::ScoringFailure("scoring queue is closed".to_string()))
    }
}

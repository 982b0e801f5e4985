use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::InferenceConfig;
use crate::rerank::CrossEncoder;
use crate::types::ScoringPair;
use crate::{CrossrankError, Result};

/// Cross-encoder hosted by a text-embeddings-inference server.
///
/// Pairs go to `POST /predict` in chunks of at most `max_batch_size`, sent in
/// order; TEI runs the sequence-classification head and returns one
/// prediction list per pair. Only single-label cross-encoders are supported.
#[derive(Clone)]
pub struct TeiCrossEncoder {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    raw_scores: bool,
    truncate: bool,
    max_batch_size: Arc<AtomicUsize>,
}

impl std::fmt::Debug for TeiCrossEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeiCrossEncoder")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("raw_scores", &self.raw_scores)
            .field("truncate", &self.truncate)
            .field("max_batch_size", &self.max_batch_size())
            .finish_non_exhaustive()
    }
}

impl TeiCrossEncoder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(
                crate::config::DEFAULT_INFERENCE_TIMEOUT_SECS,
            ))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            raw_scores: false,
            truncate: true,
            max_batch_size: Arc::new(AtomicUsize::new(
                crate::config::DEFAULT_INFERENCE_MAX_BATCH_SIZE,
            )),
        }
    }

    pub fn from_config(model: &str, config: &InferenceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let mut out = Self::new(config.base_url.as_str(), model)
            .with_http_client(http)
            .with_raw_scores(config.raw_scores)
            .with_truncate(config.truncate)
            .with_max_batch_size(config.max_batch_size);
        if let Some(api_key) = config.api_key.as_deref() {
            out = out.with_api_key(api_key);
        }
        Ok(out)
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = (!api_key.trim().is_empty()).then_some(api_key);
        self
    }

    pub fn with_raw_scores(mut self, raw_scores: bool) -> Self {
        self.raw_scores = raw_scores;
        self
    }

    pub fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = Arc::new(AtomicUsize::new(max_batch_size.max(1)));
        self
    }

    /// Largest number of pairs sent in one `/predict` call. `ready()` lowers
    /// it to the server's `max_client_batch_size` when that is smaller.
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size.load(Ordering::Relaxed)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn root_url(&self) -> &str {
        let base = self.base_url.trim_end_matches('/');
        base.strip_suffix("/predict").unwrap_or(base)
    }

    fn predict_url(&self) -> String {
        format!("{}/predict", self.root_url())
    }

    fn info_url(&self) -> String {
        format!("{}/info", self.root_url())
    }

    async fn predict_chunk(&self, pairs: &[ScoringPair<'_>]) -> Result<Vec<f64>> {
        let body = WireRequest {
            inputs: pairs
                .iter()
                .map(|pair| [pair.query, pair.document])
                .collect(),
            raw_scores: self.raw_scores,
            truncate: self.truncate,
        };

        let response = self
            .apply_auth(self.http.post(self.predict_url()))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CrossrankError::Api {
                status,
                body: error_message(text),
            });
        }

        let parsed = response.json::<WireResponse>().await?.into_batch();
        if parsed.len() != pairs.len() {
            return Err(CrossrankError::InvalidResponse(format!(
                "tei returned {} predictions for {} pairs",
                parsed.len(),
                pairs.len()
            )));
        }

        parsed
            .into_iter()
            .enumerate()
            .map(|(index, predictions)| single_label_score(index, &predictions))
            .collect()
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key.as_deref() {
            Some(api_key) => req.bearer_auth(api_key),
            None => req,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    inputs: Vec<[&'a str; 2]>,
    raw_scores: bool,
    truncate: bool,
}

#[derive(Debug, Deserialize)]
struct WirePrediction {
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireResponse {
    Batch(Vec<Vec<WirePrediction>>),
    Single(Vec<WirePrediction>),
}

impl WireResponse {
    fn into_batch(self) -> Vec<Vec<WirePrediction>> {
        match self {
            Self::Batch(batch) => batch,
            Self::Single(single) => vec![single],
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireInfo {
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    max_client_batch_size: Option<usize>,
}

#[async_trait]
impl CrossEncoder for TeiCrossEncoder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn predict(&self, pairs: &[ScoringPair<'_>]) -> Result<Vec<f64>> {
        let mut scores = Vec::with_capacity(pairs.len());
        for chunk in pairs.chunks(self.max_batch_size()) {
            scores.extend(self.predict_chunk(chunk).await?);
        }
        Ok(scores)
    }

    async fn ready(&self) -> Result<()> {
        let response = self.apply_auth(self.http.get(self.info_url())).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CrossrankError::Api {
                status,
                body: error_message(text),
            });
        }

        let info = response.json::<WireInfo>().await?;
        match info.model_id.as_deref() {
            Some(served) if served != self.model => {
                tracing::warn!(
                    configured = %self.model,
                    served,
                    "inference server hosts a different model than configured"
                );
            }
            _ => {}
        }
        if let Some(limit) = info.max_client_batch_size.filter(|limit| *limit > 0) {
            let previous = self.max_batch_size.fetch_min(limit, Ordering::Relaxed);
            if limit < previous {
                tracing::info!(
                    configured = previous,
                    served = limit,
                    "using the inference server's smaller client batch size"
                );
            }
        }
        Ok(())
    }
}

/// TEI returns every label of a classifier sorted by score, so a multi-label
/// head would yield a different label's score per pair.
fn single_label_score(index: usize, predictions: &[WirePrediction]) -> Result<f64> {
    match predictions {
        [prediction] => Ok(prediction.score),
        [] => Err(CrossrankError::InvalidResponse(format!(
            "tei returned no prediction for pair {index}"
        ))),
        _ => Err(CrossrankError::InvalidResponse(format!(
            "tei returned {} labels for pair {index}; only single-label cross-encoders are supported",
            predictions.len()
        ))),
    }
}

/// Pulls the message out of TEI's `{"error": ..., "error_type": ...}`
/// envelope, falling back to the raw body.
fn error_message(body: String) -> String {
    serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| value.get("error")?.as_str().map(str::to_string))
        .unwrap_or(body)
}

use std::cmp::Ordering;

use async_trait::async_trait;
use thiserror::Error;

use crate::Result;
use crate::types::{RerankInput, RerankResponse, ScoredCandidate, ScoringPair};

/// Relevance model that scores (query, document) pairs jointly.
///
/// Implementations are loaded once at startup and shared read-only across
/// requests, so `predict` must be safe to call concurrently.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    fn model_id(&self) -> &str;

    /// Returns one score per pair, in pair order. Higher means more relevant;
    /// the range is whatever the model produces.
    async fn predict(&self, pairs: &[ScoringPair<'_>]) -> Result<Vec<f64>>;

    /// Checks that the model is reachable and loaded.
    async fn ready(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RerankError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    ScoringFailure(String),
}

/// Scores every document against the query and returns the `top_n` best,
/// highest score first.
pub async fn rerank(
    scorer: &dyn CrossEncoder,
    input: &RerankInput,
) -> std::result::Result<RerankResponse, RerankError> {
    let pairs: Vec<ScoringPair<'_>> = input
        .documents
        .iter()
        .map(|document| ScoringPair {
            query: &input.query,
            document,
        })
        .collect();

    let scores = scorer
        .predict(&pairs)
        .await
        .map_err(|err| RerankError::ScoringFailure(err.to_string()))?;

    if scores.len() != pairs.len() {
        return Err(RerankError::ScoringFailure(format!(
            "scorer returned {} scores for {} documents",
            scores.len(),
            pairs.len()
        )));
    }
    if let Some(index) = scores.iter().position(|score| !score.is_finite()) {
        return Err(RerankError::ScoringFailure(format!(
            "scorer returned a non-finite score for document {index}"
        )));
    }

    if let Some(top) = scores.iter().copied().reduce(f64::max) {
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        tracing::info!(top_score = top, mean_score = mean, "scored documents");
    }

    Ok(rank(&scores, input.top_n).into_iter().collect())
}

/// Orders scores descending and keeps the first `top_n`.
///
/// The sort is stable: equal scores keep ascending original index.
pub fn rank(scores: &[f64], top_n: usize) -> Vec<ScoredCandidate> {
    let mut candidates: Vec<ScoredCandidate> = scores
        .iter()
        .enumerate()
        .map(|(index, &score)| ScoredCandidate { index, score })
        .collect();
    candidates.sort_by(|left, right| descending(left.score, right.score));
    candidates.truncate(top_n);
    candidates
}

fn descending(left: f64, right: f64) -> Ordering {
    right.partial_cmp(&left).unwrap_or(Ordering::Equal)
}

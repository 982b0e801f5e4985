use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rerank::RerankError;

const NO_JSON: &str = "No JSON data provided";
const MISSING_QUERY: &str = "Missing 'query' field";
const MISSING_DOCUMENTS: &str = "Missing or empty 'documents' field";

/// Body of `POST /rerank` as it arrives on the wire.
///
/// Every field is optional here; [`RerankRequest::validate`] turns it into a
/// [`RerankInput`] or reports which field is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RerankRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub documents: Option<Vec<String>>,
    #[serde(default)]
    pub top_n: Option<i64>,
    /// Accepted for clients that always send their configured model id.
    /// The served model is fixed at startup, so this never routes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl RerankRequest {
    /// Parses a raw request body.
    ///
    /// Anything that is not a non-empty JSON object counts as "no data";
    /// an object with mistyped fields is reported with the decoder's detail.
    pub fn from_json_slice(body: &[u8]) -> Result<Self, RerankError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|_| RerankError::InvalidRequest(NO_JSON.to_string()))?;
        match &value {
            Value::Object(map) if !map.is_empty() => {}
            _ => return Err(RerankError::InvalidRequest(NO_JSON.to_string())),
        }
        serde_json::from_value(value)
            .map_err(|err| RerankError::InvalidRequest(format!("Invalid request body: {err}")))
    }

    pub fn validate(self) -> Result<RerankInput, RerankError> {
        let query = self
            .query
            .filter(|query| !query.is_empty())
            .ok_or_else(|| RerankError::InvalidRequest(MISSING_QUERY.to_string()))?;
        let documents = self
            .documents
            .filter(|documents| !documents.is_empty())
            .ok_or_else(|| RerankError::InvalidRequest(MISSING_DOCUMENTS.to_string()))?;

        let top_n = clamp_top_n(self.top_n, documents.len());
        Ok(RerankInput {
            query,
            documents,
            top_n,
        })
    }
}

fn clamp_top_n(top_n: Option<i64>, len: usize) -> usize {
    match top_n {
        None => len,
        Some(value) if value <= 0 => 0,
        Some(value) => usize::try_from(value).map_or(len, |value| value.min(len)),
    }
}

/// A request that passed validation. `top_n` is already clamped to
/// `0..=documents.len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankInput {
    pub query: String,
    pub documents: Vec<String>,
    pub top_n: usize,
}

impl RerankInput {
    pub fn new(query: impl Into<String>, documents: Vec<String>, top_n: Option<usize>) -> Self {
        let top_n = top_n.map_or(documents.len(), |top_n| top_n.min(documents.len()));
        Self {
            query: query.into(),
            documents,
            top_n,
        }
    }
}

/// One (query, document) pair handed to the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringPair<'a> {
    pub query: &'a str,
    pub document: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub index: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RerankResponse {
    pub scores: Vec<f64>,
    pub indices: Vec<usize>,
}

impl FromIterator<ScoredCandidate> for RerankResponse {
    fn from_iter<I: IntoIterator<Item = ScoredCandidate>>(iter: I) -> Self {
        let (indices, scores) = iter
            .into_iter()
            .map(|candidate| (candidate.index, candidate.score))
            .unzip();
        Self { scores, indices }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
}

pub mod catalog;
pub mod config;
mod env;
mod error;
pub mod providers;
pub mod rerank;
pub mod server;
pub mod telemetry;
pub mod types;
pub mod utils;

pub use catalog::{DEFAULT_MODEL, MODEL_CATALOG, ModelInfo, ModelsResponse, find_model};
pub use config::{InferenceConfig, LoggingConfig, ServerArgs, ServerConfig};
pub use env::{Env, parse_dotenv};
pub use error::{CrossrankError, Result};
pub use providers::TeiCrossEncoder;
pub use rerank::{CrossEncoder, RerankError, rank, rerank};
pub use server::ServiceContext;
pub use types::{
    HealthResponse, RerankInput, RerankRequest, RerankResponse, ScoredCandidate, ScoringPair,
};

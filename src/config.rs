//! Startup configuration.
//!
//! Sources are layered, later ones winning: built-in defaults, an optional
//! TOML file, the environment (with an optional dotenv overlay), then CLI
//! flags. The resolved [`ServerConfig`] is never mutated afterwards.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::catalog::DEFAULT_MODEL;
use crate::env::Env;
use crate::{CrossrankError, Result};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_INFERENCE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 30;
/// TEI's default `max_client_batch_size`.
pub const DEFAULT_INFERENCE_MAX_BATCH_SIZE: usize = 32;
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub const ENV_MODEL: &str = "CROSSRANK_MODEL";
pub const ENV_HOST: &str = "CROSSRANK_HOST";
pub const ENV_PORT: &str = "CROSSRANK_PORT";
pub const ENV_INFERENCE_URL: &str = "CROSSRANK_INFERENCE_URL";
pub const ENV_INFERENCE_API_KEY: &str = "CROSSRANK_INFERENCE_API_KEY";

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "crossrank-server",
    version,
    about = "Cross-encoder reranking server"
)]
pub struct ServerArgs {
    /// Model name or path (default: cross-encoder/ms-marco-MiniLM-L-6-v2)
    #[arg(long)]
    pub model: Option<String>,
    /// Port to run the server on (default: 8000)
    #[arg(long)]
    pub port: Option<u16>,
    /// Host to bind to (default: 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,
    /// Base URL of the inference server hosting the model
    #[arg(long)]
    pub inference_url: Option<String>,
    #[arg(long)]
    pub inference_timeout_secs: Option<u64>,
    /// Return unnormalised model logits instead of sigmoid scores
    #[arg(long)]
    pub raw_scores: bool,
    /// Most pairs sent to the inference server in one request
    #[arg(long)]
    pub max_batch_size: Option<usize>,
    /// Maximum concurrent scoring calls; 1 serialises them
    #[arg(long)]
    pub max_concurrency: Option<usize>,
    #[arg(long)]
    pub no_cors: bool,
    #[arg(long)]
    pub json_logs: bool,
    /// Export spans over OTLP/HTTP (requires the `otel` feature)
    #[arg(long)]
    pub otel: bool,
    #[arg(long)]
    pub otel_endpoint: Option<String>,
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Dotenv file overlaying the process environment
    #[arg(long)]
    pub dotenv: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub model: String,
    pub host: String,
    pub port: u16,
    pub inference: InferenceConfig,
    pub max_concurrency: Option<usize>,
    pub max_body_bytes: usize,
    pub cors: bool,
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            inference: InferenceConfig::default(),
            max_concurrency: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            cors: true,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InferenceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub raw_scores: bool,
    pub truncate: bool,
    pub max_batch_size: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_INFERENCE_URL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_INFERENCE_TIMEOUT_SECS,
            raw_scores: false,
            truncate: true,
            max_batch_size: DEFAULT_INFERENCE_MAX_BATCH_SIZE,
        }
    }
}

impl std::fmt::Debug for InferenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("raw_scores", &self.raw_scores)
            .field("truncate", &self.truncate)
            .field("max_batch_size", &self.max_batch_size)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub json: bool,
    pub otel: bool,
    pub otel_endpoint: Option<String>,
}

impl ServerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Resolves the full layering for the server binary.
    pub fn load(args: &ServerArgs) -> Result<Self> {
        let env = match args.dotenv.as_deref() {
            Some(path) => Env::from_dotenv_file(path)?,
            None => Env::default(),
        };
        let base = match args.config.as_deref() {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        base.with_env(&env)?.with_args(args).validated()
    }

    pub fn with_env(mut self, env: &Env) -> Result<Self> {
        if let Some(model) = env.get(ENV_MODEL) {
            self.model = model;
        }
        if let Some(host) = env.get(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = env.get(ENV_PORT) {
            self.port = port.trim().parse().map_err(|_| {
                CrossrankError::Config(format!("{ENV_PORT} must be a port number, got {port:?}"))
            })?;
        }
        if let Some(url) = env.get(ENV_INFERENCE_URL) {
            self.inference.base_url = url;
        }
        if let Some(key) = env.get(ENV_INFERENCE_API_KEY) {
            self.inference.api_key = Some(key);
        }
        Ok(self)
    }

    pub fn with_args(mut self, args: &ServerArgs) -> Self {
        if let Some(model) = args.model.as_ref() {
            self.model.clone_from(model);
        }
        if let Some(host) = args.host.as_ref() {
            self.host.clone_from(host);
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(url) = args.inference_url.as_ref() {
            self.inference.base_url.clone_from(url);
        }
        if let Some(timeout_secs) = args.inference_timeout_secs {
            self.inference.timeout_secs = timeout_secs;
        }
        if args.raw_scores {
            self.inference.raw_scores = true;
        }
        if let Some(max_batch_size) = args.max_batch_size {
            self.inference.max_batch_size = max_batch_size;
        }
        if let Some(max_concurrency) = args.max_concurrency {
            self.max_concurrency = Some(max_concurrency);
        }
        if args.no_cors {
            self.cors = false;
        }
        if args.json_logs {
            self.logging.json = true;
        }
        if args.otel {
            self.logging.otel = true;
        }
        if let Some(endpoint) = args.otel_endpoint.as_ref() {
            self.logging.otel = true;
            self.logging.otel_endpoint = Some(endpoint.clone());
        }
        self
    }

    pub fn validated(self) -> Result<Self> {
        if self.model.trim().is_empty() {
            return Err(CrossrankError::Config("model must not be empty".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(CrossrankError::Config("host must not be empty".to_string()));
        }
        if self.inference.base_url.trim().is_empty() {
            return Err(CrossrankError::Config(
                "inference base_url must not be empty".to_string(),
            ));
        }
        if self.inference.timeout_secs == 0 {
            return Err(CrossrankError::Config(
                "inference timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.inference.max_batch_size == 0 {
            return Err(CrossrankError::Config(
                "inference max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_concurrency == Some(0) {
            return Err(CrossrankError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(CrossrankError::Config(
                "max_body_bytes must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }
}

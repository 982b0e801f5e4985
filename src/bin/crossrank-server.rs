use std::sync::Arc;

use clap::Parser;

use crossrank::config::{ServerArgs, ServerConfig};
use crossrank::{CrossEncoder, ServiceContext, TeiCrossEncoder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ServerArgs::parse();
    let config = ServerConfig::load(&args)?;
    let _telemetry = crossrank::telemetry::init_tracing("crossrank-server", &config.logging)?;

    tracing::info!(model = %config.model, "loading cross-encoder model");
    if crossrank::find_model(&config.model).is_none() {
        tracing::info!(model = %config.model, "model is not in the built-in catalog");
    }

    let scorer = TeiCrossEncoder::from_config(&config.model, &config.inference)?;
    scorer.ready().await.map_err(|err| {
        tracing::error!(
            inference_url = %scorer.base_url(),
            error = %err,
            "inference server is not ready"
        );
        err
    })?;
    tracing::info!(inference_url = %scorer.base_url(), "model loaded successfully");

    let context = ServiceContext::from_config(Arc::new(scorer), &config);
    let app = crossrank::server::http::router(context);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let base = format!("http://{}:{}", config.host, config.port);
    tracing::info!(address = %listener.local_addr()?, "starting server");
    tracing::info!("rerank endpoint: {base}/rerank");
    tracing::info!("health check: {base}/health");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

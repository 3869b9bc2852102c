use anyhow::Context;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use db_ia_backend::api::handlers::connection::AppState;
use db_ia_backend::api::routes::create_router;
use db_ia_backend::config::Config;
use db_ia_backend::services::{
    ConnectionManager, GenerationEngine, LlamaServerRuntime, SamplingSettings,
    SchemaContextBuilder,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so the log level can come from it
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting server on {}", config.server_address());
    info!("Model runtime at {}", config.llm.runtime_url);

    let runtime = Arc::new(LlamaServerRuntime::new(&config.llm));
    let engine = Arc::new(GenerationEngine::new(
        runtime,
        SamplingSettings::from(&config.models),
        SchemaContextBuilder::new(&config.schema_context),
    ));

    if let Some(default_model) = config.models.default_model.as_deref() {
        if Path::new(default_model).is_file() {
            match engine
                .load_model(default_model, config.models.model_config())
                .await
            {
                Ok(_) => info!("Default model loaded: {}", default_model),
                Err(e) => error!("Failed to load default model {}: {}", default_model, e),
            }
        } else {
            warn!("Default model {} not found, starting without a model", default_model);
        }
    }

    let state = AppState {
        config: config.clone(),
        connections: Arc::new(ConnectionManager::new()),
        engine,
    };

    let app = create_router(state);

    let addr: SocketAddr = config
        .server_address()
        .parse()
        .with_context(|| format!("Invalid server address {}", config.server_address()))?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

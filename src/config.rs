use serde::Deserialize;
use std::env;

use crate::models::ModelConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub llm: LlmConfig,
    pub schema_context: SchemaContextConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub directory: String,
    pub default_model: Option<String>,
    pub n_ctx: u32,
    pub n_threads: Option<usize>,
    pub n_gpu_layers: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl ModelsConfig {
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            n_ctx: self.n_ctx,
            n_threads: self.n_threads,
            n_gpu_layers: self.n_gpu_layers,
            temperature: self.temperature,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub runtime_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaContextConfig {
    pub max_tables: usize,
    pub max_columns: usize,
}

impl Default for SchemaContextConfig {
    fn default() -> Self {
        Self {
            max_tables: 10,
            max_columns: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("models.directory", "./models")?
            .set_default("models.n_ctx", 4096)?
            .set_default("models.n_gpu_layers", 0)?
            .set_default("models.temperature", 0.1)?
            .set_default("models.top_p", 0.9)?
            .set_default("models.max_tokens", 512)?
            .set_default("llm.runtime_url", "http://127.0.0.1:8080")?
            .set_default("schema_context.max_tables", 10)?
            .set_default("schema_context.max_columns", 8)?
            .set_default("logging.level", "info")?;

        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(8000))?;
        }

        if let Ok(dir) = env::var("MODELS_DIR") {
            builder = builder.set_override("models.directory", dir)?;
        }

        if let Ok(model) = env::var("DEFAULT_MODEL") {
            builder = builder.set_override("models.default_model", Some(model))?;
        }

        if let Ok(threads) = env::var("MODEL_THREADS") {
            if let Ok(threads) = threads.parse::<u64>() {
                builder = builder.set_override("models.n_threads", Some(threads))?;
            }
        }

        if let Ok(url) = env::var("LLM_RUNTIME_URL") {
            builder = builder.set_override("llm.runtime_url", url)?;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY") {
            builder = builder.set_override("llm.api_key", Some(api_key))?;
        }

        if let Ok(max_tables) = env::var("SCHEMA_MAX_TABLES") {
            builder = builder.set_override(
                "schema_context.max_tables",
                max_tables.parse::<u64>().unwrap_or(10),
            )?;
        }

        if let Ok(max_columns) = env::var("SCHEMA_MAX_COLUMNS") {
            builder = builder.set_override(
                "schema_context.max_columns",
                max_columns.parse::<u64>().unwrap_or(8),
            )?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DriverKind;

/// Runtime settings used when a model file is loaded.
///
/// With a llama.cpp server runtime, `n_ctx`, `n_threads` and `n_gpu_layers`
/// are fixed when the server process starts. They are recorded and reported
/// here but not sent per request; only `temperature` is applied on each call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub n_ctx: u32,
    /// `None` means auto-detect from available hardware concurrency.
    pub n_threads: Option<usize>,
    pub n_gpu_layers: u32,
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_ctx: 4096,
            n_threads: None,
            n_gpu_layers: 0,
            temperature: 0.1,
        }
    }
}

impl ModelConfig {
    /// Fills in the thread count, capped at 8 like the runtime's own default.
    pub fn resolved(mut self) -> Self {
        if self.n_threads.is_none() {
            self.n_threads = Some(num_cpus::get().clamp(1, 8));
        }
        self
    }
}

/// Sampling parameters passed to the model on each completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stop: Vec<String>,
}

/// A fully assembled generation call. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub question: String,
    pub custom_prompt: Option<String>,
    pub params: GenerationParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Execute,
    /// Generate SQL without running it against the live connection.
    DryRun,
}

/// Outcome of one natural-language request.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Sql {
        sql: String,
        rows: Vec<Value>,
        row_count: usize,
        execution_time_ms: Option<u64>,
    },
    DryRun {
        sql: String,
        syntax_error: Option<String>,
    },
    NaturalLanguage {
        text: String,
    },
    Failure {
        reason: String,
        diagnostic: String,
        sql: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub loaded: bool,
    pub model_path: Option<String>,
    pub config: Option<ModelConfig>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DbInfo {
    pub driver: Option<DriverKind>,
    pub tables_count: usize,
}

/// Uniform response for `/ai/process` and `/ai/test-query`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResponse {
    pub success: bool,
    pub sql: String,
    pub result: Vec<Value>,
    pub row_count: usize,
    pub ai_response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syntax_error: Option<String>,
    pub model_info: ModelInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables_available: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_info: Option<DbInfo>,
}

impl GenerationResponse {
    pub fn from_outcome(outcome: GenerationOutcome, model_info: ModelInfo) -> Self {
        let mut response = Self {
            success: true,
            sql: String::new(),
            result: Vec::new(),
            row_count: 0,
            ai_response: String::new(),
            error: None,
            execution_time_ms: None,
            dry_run: false,
            syntax_error: None,
            model_info,
            suggestions: Vec::new(),
            tables_available: None,
            db_info: None,
        };

        match outcome {
            GenerationOutcome::Sql {
                sql,
                rows,
                row_count,
                execution_time_ms,
            } => {
                response.ai_response = format!(
                    "Query executed successfully. {} row(s) returned.",
                    row_count
                );
                response.sql = sql;
                response.result = rows;
                response.row_count = row_count;
                response.execution_time_ms = execution_time_ms;
            }
            GenerationOutcome::DryRun { sql, syntax_error } => {
                response.ai_response =
                    "Query generated but not executed (dry run).".to_string();
                response.sql = sql;
                response.dry_run = true;
                response.syntax_error = syntax_error;
            }
            GenerationOutcome::NaturalLanguage { text } => {
                response.ai_response = text;
            }
            GenerationOutcome::Failure {
                reason,
                diagnostic,
                sql,
            } => {
                response.success = false;
                response.error = Some(reason);
                response.ai_response = diagnostic;
                response.sql = sql.unwrap_or_default();
            }
        }

        response
    }
}

#[derive(Debug, Deserialize)]
pub struct AiQueryRequest {
    pub question: String,
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoadModelRequest {
    pub model_path: String,
    pub n_ctx: Option<u32>,
    pub n_threads: Option<usize>,
    pub n_gpu_layers: Option<u32>,
    pub temperature: Option<f32>,
}

impl LoadModelRequest {
    pub fn model_config(&self, defaults: &ModelConfig) -> ModelConfig {
        ModelConfig {
            n_ctx: self.n_ctx.unwrap_or(defaults.n_ctx),
            n_threads: self.n_threads.or(defaults.n_threads),
            n_gpu_layers: self.n_gpu_layers.unwrap_or(defaults.n_gpu_layers),
            temperature: self.temperature.unwrap_or(defaults.temperature),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelFile {
    pub name: String,
    pub path: String,
    pub size_mb: f64,
    pub is_loaded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelListing {
    pub models_directory: String,
    pub available_models: Vec<ModelFile>,
    pub current_model: Option<String>,
    pub total_models: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AiStatus {
    pub model: ModelInfo,
    pub database: super::ConnectionStatus,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unloaded() -> ModelInfo {
        ModelInfo {
            loaded: false,
            model_path: None,
            config: None,
        }
    }

    #[test]
    fn test_resolved_config_detects_threads() {
        let config = ModelConfig::default().resolved();
        let threads = config.n_threads.unwrap();
        assert!((1..=8).contains(&threads));

        let explicit = ModelConfig {
            n_threads: Some(3),
            ..ModelConfig::default()
        };
        assert_eq!(explicit.resolved().n_threads, Some(3));
    }

    #[test]
    fn test_failure_keeps_sql() {
        let outcome = GenerationOutcome::Failure {
            reason: "no such table: vendas".to_string(),
            diagnostic: "Query generated but failed".to_string(),
            sql: Some("SELECT * FROM vendas;".to_string()),
        };
        let response = GenerationResponse::from_outcome(outcome, unloaded());
        assert!(!response.success);
        assert_eq!(response.sql, "SELECT * FROM vendas;");
        assert_eq!(response.error.as_deref(), Some("no such table: vendas"));
    }

    #[test]
    fn test_natural_language_has_empty_sql() {
        let outcome = GenerationOutcome::NaturalLanguage {
            text: "There is no table for that.".to_string(),
        };
        let response = GenerationResponse::from_outcome(outcome, unloaded());
        assert!(response.success);
        assert_eq!(response.sql, "");
        assert_eq!(response.ai_response, "There is no table for that.");
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("error").is_none());
        assert!(json.get("suggestions").is_none());
    }

    #[test]
    fn test_load_request_falls_back_to_defaults() {
        let request: LoadModelRequest =
            serde_json::from_value(json!({"model_path": "models/a.gguf", "n_ctx": 2048})).unwrap();
        let config = request.model_config(&ModelConfig::default());
        assert_eq!(config.n_ctx, 2048);
        assert_eq!(config.n_gpu_layers, 0);
        assert_eq!(config.n_threads, None);
    }
}

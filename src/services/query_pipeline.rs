use crate::api::middleware::AppError;
use crate::models::{ExecutionMode, GenerationOutcome};
use crate::services::{ConnectionManager, GenerationEngine};
use crate::validation::SqlSanitizer;

/// Question in, uniform outcome out: generate, sanitize, then execute or dry-run.
pub struct QueryPipeline<'a> {
    connections: &'a ConnectionManager,
    engine: &'a GenerationEngine,
}

impl<'a> QueryPipeline<'a> {
    pub fn new(connections: &'a ConnectionManager, engine: &'a GenerationEngine) -> Self {
        Self {
            connections,
            engine,
        }
    }

    /// Never fails: every error becomes `GenerationOutcome::Failure`.
    pub async fn run(
        &self,
        question: &str,
        custom_prompt: Option<&str>,
        mode: ExecutionMode,
    ) -> GenerationOutcome {
        if mode == ExecutionMode::Execute && self.connections.active_kind().await.is_none() {
            return failure(
                AppError::NotConnected("connect a database before asking questions".to_string()),
                "Connect to a database first.",
            );
        }

        let raw = match self.engine.generate(self.connections, question, custom_prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Generation failed: {}", e);
                return failure(e, "The question could not be turned into SQL.");
            }
        };

        let sql = SqlSanitizer::clean(&raw);
        if !SqlSanitizer::is_valid_sql(&sql) {
            tracing::info!("Model answered in natural language");
            return GenerationOutcome::NaturalLanguage { text: raw };
        }
        tracing::info!("Generated SQL: {}", sql);

        match mode {
            ExecutionMode::DryRun => {
                let syntax_error = match self.connections.active_kind().await {
                    Some(kind) => SqlSanitizer::syntax_error(&sql, kind),
                    None => None,
                };
                GenerationOutcome::DryRun { sql, syntax_error }
            }
            ExecutionMode::Execute => {
                let execution = self.connections.execute_query(&sql).await;
                if execution.success {
                    GenerationOutcome::Sql {
                        sql,
                        row_count: execution.row_count,
                        rows: execution.results,
                        execution_time_ms: execution.execution_time_ms,
                    }
                } else {
                    let error = execution.error.unwrap_or_default();
                    GenerationOutcome::Failure {
                        diagnostic: format!("Query generated but failed: {}", error),
                        reason: error,
                        sql: Some(sql),
                    }
                }
            }
        }
    }
}

fn failure(error: AppError, diagnostic: &str) -> GenerationOutcome {
    GenerationOutcome::Failure {
        reason: error.to_string(),
        diagnostic: diagnostic.to_string(),
        sql: None,
    }
}

/// Best-effort hints keyed on words in the error message.
pub fn remediation_suggestions(error: &str) -> Vec<String> {
    let lowered = error.to_lowercase();
    let mut suggestions = Vec::new();

    if lowered.contains("model") {
        suggestions.push("Load a model with POST /ai/load-model".to_string());
        suggestions.push("List available models with GET /ai/models".to_string());
    }
    if lowered.contains("database") || lowered.contains("banco") {
        suggestions.push("Connect to a database with POST /database/connect".to_string());
    }
    if lowered.contains("sql") || lowered.contains("syntax") {
        suggestions.push("Rephrase the question more specifically".to_string());
        suggestions.push("Check the generated SQL with POST /ai/test-query".to_string());
    }

    if suggestions.is_empty() {
        suggestions.push("Check the model and database status with GET /ai/status".to_string());
        suggestions.push("Try a simpler question".to_string());
    }
    suggestions
}

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("No database connected: {0}")]
    NotConnected(String),

    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ConfigValidation(_) => "CONFIG_VALIDATION_ERROR",
            AppError::Connection(_) => "CONNECTION_ERROR",
            AppError::NotConnected(_) => "NOT_CONNECTED",
            AppError::QueryExecution(_) => "QUERY_EXECUTION_ERROR",
            AppError::ModelNotFound(_) => "MODEL_NOT_FOUND",
            AppError::ModelNotLoaded(_) => "MODEL_NOT_LOADED",
            AppError::Generation(_) => "GENERATION_ERROR",
            AppError::UnsupportedDriver(_) => "UNSUPPORTED_DRIVER",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::ConfigValidation(_)
            | AppError::UnsupportedDriver(_)
            | AppError::Validation(_)
            | AppError::NotConnected(_)
            | AppError::ModelNotLoaded(_)
            | AppError::QueryExecution(_) => StatusCode::BAD_REQUEST,
            AppError::ModelNotFound(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Connection(_) => StatusCode::BAD_GATEWAY,
            AppError::Generation(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            AppError::ModelNotLoaded(_) => ErrorDetail::new(self.code(), self.to_string())
                .with_details("Load a model with POST /ai/load-model first."),
            AppError::NotConnected(_) => ErrorDetail::new(self.code(), self.to_string())
                .with_details("Connect to a database with POST /database/connect first."),
            _ => ErrorDetail::new(self.code(), self.to_string()),
        };

        (status, Json(ErrorResponse { error: detail })).into_response()
    }
}

/// Convert anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::QueryExecution(err.to_string())
    }
}

/// Logs every `/ai/*` request with a request id and its latency.
pub async fn log_ai_requests(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if !path.starts_with("/ai/") {
        return next.run(request).await;
    }

    let request_id = uuid::Uuid::new_v4();
    let method = request.method().clone();
    let started = Instant::now();
    tracing::info!(%request_id, %method, %path, "AI request");

    let response = next.run(request).await;

    tracing::info!(
        %request_id,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "AI request finished"
    );
    response
}

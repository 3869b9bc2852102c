use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::config::Config;
use crate::models::{
    ConnectRequest, ConnectResponse, ConnectionStatus, DisconnectResponse, OperationResponse,
    QueryExecution, QueryRequest, TableInfoResponse,
};
use crate::services::{ConnectionManager, GenerationEngine};

/// Application state
///
/// The connection and the model are process-wide resources; handlers only
/// reach them through these handles.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub connections: Arc<ConnectionManager>,
    pub engine: Arc<GenerationEngine>,
}

/// Supported drivers and the fields each one needs
pub async fn list_drivers() -> Json<Value> {
    let mut drivers = Map::new();
    for (kind, descriptor) in ConnectionManager::available_drivers() {
        drivers.insert(
            kind.to_string(),
            serde_json::to_value(descriptor).unwrap_or(Value::Null),
        );
    }
    Json(serde_json::json!({ "drivers": drivers }))
}

pub async fn connect_database(
    State(state): State<AppState>,
    Json(payload): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>, AppError> {
    if payload.driver_type.trim().is_empty() {
        return Err(AppError::Validation("driver_type cannot be empty".to_string()));
    }

    tracing::info!("Connecting to {} database", payload.driver_type);
    let response = state
        .connections
        .connect(&payload.driver_type, payload.config)
        .await;

    Ok(Json(response))
}

pub async fn disconnect_database(State(state): State<AppState>) -> Json<DisconnectResponse> {
    Json(state.connections.disconnect().await)
}

pub async fn database_status(State(state): State<AppState>) -> Json<ConnectionStatus> {
    Json(state.connections.status().await)
}

/// Execute raw SQL against the active connection
pub async fn execute_query(
    State(state): State<AppState>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryExecution>, AppError> {
    let sql = payload.query.trim();
    if sql.is_empty() {
        return Err(AppError::Validation("SQL query cannot be empty".to_string()));
    }

    tracing::info!("Executing SQL query: {}", sql);
    Ok(Json(state.connections.execute_query(sql).await))
}

pub async fn table_info(
    State(state): State<AppState>,
    Path(table_name): Path<String>,
) -> Json<TableInfoResponse> {
    Json(state.connections.table_info(&table_name).await)
}

pub async fn create_sample_data(State(state): State<AppState>) -> Json<OperationResponse> {
    Json(state.connections.seed_sample_data().await)
}

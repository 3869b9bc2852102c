use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::api::handlers::connection::AppState;
use crate::api::middleware::AppError;
use crate::models::{
    AiQueryRequest, AiStatus, DbInfo, ExecutionMode, GenerationResponse, LoadModelRequest,
    ModelListing,
};
use crate::services::{list_models, remediation_suggestions, QueryPipeline};

/// Model and database readiness in one call
pub async fn ai_status(State(state): State<AppState>) -> Json<AiStatus> {
    let model = state.engine.model_info().await;
    let database = state.connections.status().await;

    let message = match (model.loaded, database.connected) {
        (true, true) => "Ready to answer questions",
        (false, true) => "Database connected, no model loaded",
        (true, false) => "Model loaded, no database connected",
        (false, false) => "Load a model and connect a database to start",
    };

    Json(AiStatus {
        model,
        database,
        message: message.to_string(),
    })
}

pub async fn load_model(
    State(state): State<AppState>,
    Json(payload): Json<LoadModelRequest>,
) -> Result<Json<Value>, AppError> {
    if payload.model_path.trim().is_empty() {
        return Err(AppError::Validation("model_path cannot be empty".to_string()));
    }

    let config = payload.model_config(&state.config.models.model_config());
    tracing::info!("Loading model {}", payload.model_path);
    let model_info = state.engine.load_model(payload.model_path.trim(), config).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Model loaded: {}", payload.model_path.trim()),
        "model_info": model_info,
    })))
}

pub async fn unload_model(State(state): State<AppState>) -> Json<Value> {
    let was_loaded = state.engine.unload_model().await;
    let message = if was_loaded {
        "Model unloaded from memory"
    } else {
        "No model was loaded"
    };

    Json(json!({
        "success": true,
        "message": message,
    }))
}

/// Natural-language question: generate, execute, report
pub async fn process_question(
    State(state): State<AppState>,
    Json(payload): Json<AiQueryRequest>,
) -> Result<Json<GenerationResponse>, AppError> {
    run_question(state, payload, ExecutionMode::Execute).await
}

/// Same as `process_question` but the SQL is only parsed, never executed
pub async fn test_query(
    State(state): State<AppState>,
    Json(payload): Json<AiQueryRequest>,
) -> Result<Json<GenerationResponse>, AppError> {
    run_question(state, payload, ExecutionMode::DryRun).await
}

async fn run_question(
    state: AppState,
    payload: AiQueryRequest,
    mode: ExecutionMode,
) -> Result<Json<GenerationResponse>, AppError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(AppError::Validation("Question cannot be empty".to_string()));
    }

    let custom_prompt = payload
        .custom_prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let pipeline = QueryPipeline::new(&state.connections, &state.engine);
    let outcome = pipeline.run(question, custom_prompt, mode).await;

    let model_info = state.engine.model_info().await;
    let mut response = GenerationResponse::from_outcome(outcome, model_info);

    let status = state.connections.status().await;
    response.db_info = Some(DbInfo {
        driver: status.driver_type,
        tables_count: status.tables.len(),
    });
    response.tables_available = Some(status.tables);

    if let Some(error) = response.error.as_deref() {
        response.suggestions = remediation_suggestions(error);
    }

    Ok(Json(response))
}

pub async fn list_available_models(State(state): State<AppState>) -> Json<ModelListing> {
    let current = state.engine.loaded_path().await;
    Json(list_models(&state.config.models.directory, current.as_deref()).await)
}

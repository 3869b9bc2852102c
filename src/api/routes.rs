use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::connection::AppState;
use crate::api::handlers::{ai, connection};
use crate::api::middleware::log_ai_requests;

/// Create router with application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/drivers", get(connection::list_drivers))
        .route("/database/connect", post(connection::connect_database))
        .route("/database/disconnect", post(connection::disconnect_database))
        .route("/database/status", get(connection::database_status))
        .route("/database/query", post(connection::execute_query))
        .route(
            "/database/tables/{table_name}/info",
            get(connection::table_info),
        )
        .route("/database/sample-data", post(connection::create_sample_data))
        .route("/ai/status", get(ai::ai_status))
        .route("/ai/load-model", post(ai::load_model))
        .route("/ai/unload-model", delete(ai::unload_model))
        .route("/ai/process", post(ai::process_question))
        .route("/ai/test-query", post(ai::test_query))
        .route("/ai/models", get(ai::list_available_models))
        .layer(middleware::from_fn(log_ai_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::generation_engine::SamplingSettings;
    use crate::services::model_runtime::testing::ScriptedRuntime;
    use crate::services::schema_context::SchemaContextBuilder;
    use crate::services::{ConnectionManager, GenerationEngine};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    fn test_app(reply: &str, models_dir: &TempDir) -> Router {
        let mut config = Config::from_env().unwrap();
        config.models.directory = models_dir.path().to_string_lossy().into_owned();

        let engine = GenerationEngine::new(
            Arc::new(ScriptedRuntime::replying(reply)),
            SamplingSettings::from(&config.models),
            SchemaContextBuilder::new(&config.schema_context),
        );

        create_router(AppState {
            config,
            connections: Arc::new(ConnectionManager::new()),
            engine: Arc::new(engine),
        })
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = tempdir().unwrap();
        let app = test_app("SELECT 1", &dir);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_drivers_catalogue() {
        let dir = tempdir().unwrap();
        let app = test_app("SELECT 1", &dir);
        let (status, body) = call(&app, "GET", "/drivers", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["drivers"]["sqlite"]["required_fields"]
            .as_array()
            .unwrap()
            .contains(&json!("database_path")));
        assert!(body["drivers"]["postgresql"].is_object());
    }

    #[tokio::test]
    async fn test_question_while_disconnected() {
        let dir = tempdir().unwrap();
        let app = test_app("SELECT * FROM vendas", &dir);
        let (status, body) = call(
            &app,
            "POST",
            "/ai/process",
            Some(json!({"question": "show all sales"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["sql"], json!(""));
        assert!(body["error"].as_str().unwrap().to_lowercase().contains("database"));
        assert!(!body["suggestions"].as_array().unwrap().is_empty());
        assert_eq!(body["tables_available"], json!([]));
    }

    #[tokio::test]
    async fn test_full_question_flow() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("tiny.gguf");
        std::fs::write(&model, b"GGUF").unwrap();
        let app = test_app("SELECT SUM(preco) FROM vendas", &dir);

        let (_, body) = call(
            &app,
            "POST",
            "/database/connect",
            Some(json!({
                "driver_type": "sqlite",
                "config": {"database_path": dir.path().join("app.db").to_string_lossy()}
            })),
        )
        .await;
        assert_eq!(body["success"], json!(true));

        let (_, body) = call(&app, "POST", "/database/sample-data", None).await;
        assert_eq!(body["success"], json!(true));

        let (status, body) = call(
            &app,
            "POST",
            "/ai/load-model",
            Some(json!({"model_path": model.to_string_lossy()})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model_info"]["loaded"], json!(true));

        let (_, body) = call(&app, "POST", "/ai/process", Some(json!({"question": "total sales"}))).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["row_count"], json!(1));
        assert_eq!(body["result"][0]["SUM(preco)"].as_f64(), Some(4170.0));
        assert_eq!(body["db_info"]["driver"], json!("sqlite"));
        assert_eq!(body["tables_available"], json!(["vendas"]));

        let (_, body) = call(&app, "POST", "/ai/test-query", Some(json!({"question": "total sales"}))).await;
        assert_eq!(body["dry_run"], json!(true));
        assert_eq!(body["sql"], json!("SELECT SUM(preco) FROM vendas;"));
        assert_eq!(body["result"], json!([]));

        let (_, body) = call(&app, "GET", "/ai/models", None).await;
        assert_eq!(body["total_models"], json!(1));
        assert_eq!(body["available_models"][0]["is_loaded"], json!(true));

        let (_, body) = call(&app, "GET", "/ai/status", None).await;
        assert_eq!(body["model"]["loaded"], json!(true));
        assert_eq!(body["database"]["connected"], json!(true));

        let (status, _) = call(&app, "DELETE", "/ai/unload-model", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&app, "GET", "/ai/status", None).await;
        assert_eq!(body["model"]["loaded"], json!(false));
    }

    #[tokio::test]
    async fn test_load_missing_model_is_not_found() {
        let dir = tempdir().unwrap();
        let app = test_app("SELECT 1", &dir);
        let (status, body) = call(
            &app,
            "POST",
            "/ai/load-model",
            Some(json!({"model_path": "/nonexistent/path.gguf"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], json!("MODEL_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_database_routes() {
        let dir = tempdir().unwrap();
        let app = test_app("SELECT 1", &dir);

        let (_, body) = call(&app, "GET", "/database/status", None).await;
        assert_eq!(body["connected"], json!(false));

        let (status, _) = call(&app, "POST", "/database/query", Some(json!({"query": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        call(
            &app,
            "POST",
            "/database/connect",
            Some(json!({
                "driver_type": "sqlite",
                "config": {"database_path": dir.path().join("routes.db").to_string_lossy()}
            })),
        )
        .await;
        call(&app, "POST", "/database/sample-data", None).await;

        let (_, body) = call(&app, "GET", "/database/tables/vendas/info", None).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["table_info"][0]["name"], json!("id"));

        let (_, body) = call(
            &app,
            "POST",
            "/database/query",
            Some(json!({"query": "SELECT COUNT(*) AS total FROM vendas"})),
        )
        .await;
        assert_eq!(body["results"][0]["total"], json!(5));

        let (_, body) = call(&app, "POST", "/database/disconnect", None).await;
        assert_eq!(body["success"], json!(true));
        let (_, body) = call(&app, "GET", "/database/status", None).await;
        assert_eq!(body["connected"], json!(false));
    }
}

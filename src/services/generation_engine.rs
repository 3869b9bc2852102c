use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::api::middleware::AppError;
use crate::config::ModelsConfig;
use crate::models::{GenerationParams, GenerationRequest, ModelConfig, ModelInfo};
use crate::services::model_runtime::{LoadedModel, ModelRuntime};
use crate::services::schema_context::SchemaContextBuilder;
use crate::services::ConnectionManager;

/// Stops at the first blank line, code fence, comment, or a repeated question.
pub const STOP_SEQUENCES: [&str; 5] = ["\n\n", "```", "Question:", "Pergunta:", "--"];

enum EngineState {
    Unloaded,
    Loaded(LoadedState),
}

struct LoadedState {
    path: PathBuf,
    config: ModelConfig,
    model: Box<dyn LoadedModel>,
}

/// Sampling settings shared by every generation call.
#[derive(Debug, Clone)]
pub struct SamplingSettings {
    pub max_tokens: u32,
    pub top_p: f32,
}

impl From<&ModelsConfig> for SamplingSettings {
    fn from(config: &ModelsConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            top_p: config.top_p,
        }
    }
}

/// Owns the single loaded model and turns questions into raw model output.
pub struct GenerationEngine {
    runtime: Arc<dyn ModelRuntime>,
    state: RwLock<EngineState>,
    /// Serializes loads. Held while the runtime is loading, never the state lock.
    load_lock: Mutex<()>,
    sampling: SamplingSettings,
    schema_context: SchemaContextBuilder,
}

impl GenerationEngine {
    pub fn new(
        runtime: Arc<dyn ModelRuntime>,
        sampling: SamplingSettings,
        schema_context: SchemaContextBuilder,
    ) -> Self {
        Self {
            runtime,
            state: RwLock::new(EngineState::Unloaded),
            load_lock: Mutex::new(()),
            sampling,
            schema_context,
        }
    }

    /// Loads `path` and swaps it in, releasing any previously loaded model.
    ///
    /// A missing file is rejected before the current model is touched. The
    /// loading phase lives only in this call: if the future is dropped
    /// mid-load the engine keeps whatever it had before.
    pub async fn load_model(&self, path: &str, config: ModelConfig) -> Result<ModelInfo, AppError> {
        let path = PathBuf::from(path);
        if !path.is_file() {
            return Err(AppError::ModelNotFound(path.display().to_string()));
        }

        let config = config.resolved();
        let _loading = self.load_lock.lock().await;
        tracing::info!("Loading model {}", path.display());

        let loaded = self.runtime.load(&path, &config).await;

        let mut state = self.state.write().await;
        if let EngineState::Loaded(previous) = &*state {
            tracing::info!("Releasing model {}", previous.path.display());
        }

        match loaded {
            Ok(model) => {
                tracing::info!(
                    "Model loaded: {} (ctx={}, threads={:?})",
                    path.display(),
                    config.n_ctx,
                    config.n_threads
                );
                *state = EngineState::Loaded(LoadedState {
                    path: path.clone(),
                    config: config.clone(),
                    model,
                });
                Ok(ModelInfo {
                    loaded: true,
                    model_path: Some(path.display().to_string()),
                    config: Some(config),
                })
            }
            Err(e) => {
                tracing::error!("Failed to load model {}: {}", path.display(), e);
                *state = EngineState::Unloaded;
                Err(e)
            }
        }
    }

    /// Returns whether a model was loaded.
    pub async fn unload_model(&self) -> bool {
        let mut state = self.state.write().await;
        let was_loaded = matches!(*state, EngineState::Loaded(_));
        *state = EngineState::Unloaded;
        if was_loaded {
            tracing::info!("Model unloaded from memory");
        }
        was_loaded
    }

    pub async fn is_loaded(&self) -> bool {
        matches!(*self.state.read().await, EngineState::Loaded(_))
    }

    pub async fn loaded_path(&self) -> Option<PathBuf> {
        match &*self.state.read().await {
            EngineState::Loaded(loaded) => Some(loaded.path.clone()),
            EngineState::Unloaded => None,
        }
    }

    pub async fn model_info(&self) -> ModelInfo {
        match &*self.state.read().await {
            EngineState::Loaded(loaded) => ModelInfo {
                loaded: true,
                model_path: Some(loaded.path.display().to_string()),
                config: Some(loaded.config.clone()),
            },
            EngineState::Unloaded => ModelInfo {
                loaded: false,
                model_path: None,
                config: None,
            },
        }
    }

    fn build_request(
        &self,
        question: &str,
        custom_prompt: Option<&str>,
        temperature: f32,
    ) -> GenerationRequest {
        GenerationRequest {
            question: question.to_string(),
            custom_prompt: custom_prompt.map(str::to_string),
            params: GenerationParams {
                max_tokens: self.sampling.max_tokens,
                temperature,
                top_p: self.sampling.top_p,
                stop: STOP_SEQUENCES.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    async fn build_prompt(&self, request: &GenerationRequest, connections: &ConnectionManager) -> String {
        match &request.custom_prompt {
            Some(template) => template.replace("{question}", &request.question),
            None => {
                let context = self.schema_context.build(connections).await;
                format!("{}\n\nQuestion: {}\n\nSQL:", context, request.question)
            }
        }
    }

    /// Generates raw model text for `question`. Never executes anything.
    pub async fn generate(
        &self,
        connections: &ConnectionManager,
        question: &str,
        custom_prompt: Option<&str>,
    ) -> Result<String, AppError> {
        let state = self.state.read().await;
        let EngineState::Loaded(loaded) = &*state else {
            return Err(AppError::ModelNotLoaded(
                "load a model before generating SQL".to_string(),
            ));
        };

        if !connections.status().await.connected {
            return Err(AppError::NotConnected("connect a database before generating SQL".to_string()));
        }

        let request = self.build_request(question, custom_prompt, loaded.config.temperature);
        let prompt = self.build_prompt(&request, connections).await;

        tracing::info!("Generating SQL for: {}", request.question);
        let text = loaded.model.complete(&prompt, &request.params).await?;
        tracing::info!("Raw model response: {}", text.trim());

        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::model_runtime::testing::ScriptedRuntime;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use tokio::time::timeout;

    fn engine(runtime: ScriptedRuntime) -> GenerationEngine {
        GenerationEngine::new(
            Arc::new(runtime),
            SamplingSettings {
                max_tokens: 512,
                top_p: 0.9,
            },
            SchemaContextBuilder::with_limits(10, 8),
        )
    }

    fn model_file(dir: &TempDir, name: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, b"GGUF").unwrap();
        path.to_string_lossy().into_owned()
    }

    async fn connected_manager(dir: &TempDir) -> ConnectionManager {
        let manager = ConnectionManager::new();
        let config = json!({"database_path": dir.path().join("gen.db").to_string_lossy()})
            .as_object()
            .cloned()
            .unwrap();
        assert!(manager.connect("sqlite", config).await.success);
        manager.seed_sample_data().await;
        manager
    }

    #[tokio::test]
    async fn test_missing_model_keeps_previous() {
        let dir = tempdir().unwrap();
        let engine = engine(ScriptedRuntime::replying("SELECT 1"));
        let first = model_file(&dir, "first.gguf");
        engine.load_model(&first, ModelConfig::default()).await.unwrap();

        let result = engine
            .load_model("/nonexistent/path.gguf", ModelConfig::default())
            .await;
        assert!(matches!(result, Err(AppError::ModelNotFound(_))));
        assert!(engine.is_loaded().await);
        assert_eq!(engine.model_info().await.model_path, Some(first));
    }

    #[tokio::test]
    async fn test_missing_model_when_unloaded() {
        let engine = engine(ScriptedRuntime::default());
        let result = engine
            .load_model("/nonexistent/path.gguf", ModelConfig::default())
            .await;
        assert!(matches!(result, Err(AppError::ModelNotFound(_))));
        assert!(!engine.is_loaded().await);
    }

    #[tokio::test]
    async fn test_load_replaces_and_unload_releases() {
        let dir = tempdir().unwrap();
        let engine = engine(ScriptedRuntime::default());
        let first = model_file(&dir, "first.gguf");
        let second = model_file(&dir, "second.gguf");

        engine.load_model(&first, ModelConfig::default()).await.unwrap();
        let info = engine.load_model(&second, ModelConfig::default()).await.unwrap();
        assert_eq!(info.model_path, Some(second.clone()));
        assert!(info.config.unwrap().n_threads.is_some());

        assert!(engine.unload_model().await);
        assert!(!engine.is_loaded().await);
        assert!(!engine.unload_model().await);
        assert_eq!(engine.model_info().await.model_path, None);
    }

    #[tokio::test]
    async fn test_failed_runtime_load_leaves_engine_unloaded() {
        let dir = tempdir().unwrap();
        let runtime = ScriptedRuntime {
            fail_load: true,
            ..ScriptedRuntime::default()
        };
        let engine = engine(runtime);
        let path = model_file(&dir, "broken.gguf");

        assert!(engine.load_model(&path, ModelConfig::default()).await.is_err());
        assert!(!engine.is_loaded().await);
    }

    fn slow_runtime() -> ScriptedRuntime {
        ScriptedRuntime {
            load_delay: Some(Duration::from_secs(5)),
            ..ScriptedRuntime::default()
        }
    }

    #[tokio::test]
    async fn test_cancelled_load_leaves_no_model() {
        let dir = tempdir().unwrap();
        let engine = engine(slow_runtime());
        let path = model_file(&dir, "slow.gguf");

        let result = timeout(
            Duration::from_millis(50),
            engine.load_model(&path, ModelConfig::default()),
        )
        .await;
        assert!(result.is_err());

        assert_eq!(engine.loaded_path().await, None);
        assert!(!engine.is_loaded().await);
        let info = engine.model_info().await;
        assert!(!info.loaded);
        assert_eq!(info.model_path, None);
    }

    #[tokio::test]
    async fn test_cancelled_load_keeps_previous_model() {
        let dir = tempdir().unwrap();
        let runtime = ScriptedRuntime::default();
        let engine = engine(runtime.clone());
        let first = model_file(&dir, "first.gguf");
        engine.load_model(&first, ModelConfig::default()).await.unwrap();

        let slow = GenerationEngine {
            runtime: Arc::new(slow_runtime()),
            ..engine
        };
        let second = model_file(&dir, "second.gguf");
        let result = timeout(
            Duration::from_millis(50),
            slow.load_model(&second, ModelConfig::default()),
        )
        .await;
        assert!(result.is_err());

        assert_eq!(slow.loaded_path().await, Some(PathBuf::from(&first)));
        assert!(slow.is_loaded().await);

        // The load lock was released with the dropped future
        let fast = GenerationEngine {
            runtime: Arc::new(runtime),
            ..slow
        };
        fast.load_model(&second, ModelConfig::default()).await.unwrap();
        assert_eq!(fast.loaded_path().await, Some(PathBuf::from(&second)));
    }

    #[tokio::test]
    async fn test_generate_requires_model_then_connection() {
        let dir = tempdir().unwrap();
        let engine = engine(ScriptedRuntime::replying("SELECT 1"));
        let manager = ConnectionManager::new();

        let err = engine.generate(&manager, "total sales", None).await.unwrap_err();
        assert!(matches!(err, AppError::ModelNotLoaded(_)));

        engine
            .load_model(&model_file(&dir, "m.gguf"), ModelConfig::default())
            .await
            .unwrap();
        let err = engine.generate(&manager, "total sales", None).await.unwrap_err();
        assert!(matches!(err, AppError::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_default_prompt_carries_schema_and_stops() {
        let dir = tempdir().unwrap();
        let runtime = ScriptedRuntime::replying("  SELECT SUM(preco) FROM vendas  ");
        let engine = engine(runtime.clone());
        let manager = connected_manager(&dir).await;
        engine
            .load_model(&model_file(&dir, "m.gguf"), ModelConfig::default())
            .await
            .unwrap();

        let text = engine.generate(&manager, "total sales", None).await.unwrap();
        assert_eq!(text, "SELECT SUM(preco) FROM vendas");

        let prompt = runtime.last_prompt().unwrap();
        assert!(prompt.contains("- vendas"));
        assert!(prompt.contains("SQLite rules"));
        assert!(prompt.ends_with("Question: total sales\n\nSQL:"));

        let params = runtime.params.lock().unwrap().last().cloned().unwrap();
        assert_eq!(params.max_tokens, 512);
        assert!(params.stop.contains(&"\n\n".to_string()));
        assert!(params.stop.contains(&"```".to_string()));
        assert!(params.stop.contains(&"Question:".to_string()));
        assert!(params.stop.contains(&"Pergunta:".to_string()));
        assert!(params.stop.contains(&"--".to_string()));
    }

    #[tokio::test]
    async fn test_custom_prompt_substitutes_question() {
        let dir = tempdir().unwrap();
        let runtime = ScriptedRuntime::replying("SELECT 1");
        let engine = engine(runtime.clone());
        let manager = connected_manager(&dir).await;
        engine
            .load_model(&model_file(&dir, "m.gguf"), ModelConfig::default())
            .await
            .unwrap();

        engine
            .generate(&manager, "how many sales?", Some("Q: {question}\nA:"))
            .await
            .unwrap();
        assert_eq!(runtime.last_prompt().unwrap(), "Q: how many sales?\nA:");
    }
}

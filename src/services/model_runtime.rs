use reqwest::{Client as HttpClient, RequestBuilder};
use serde_json::json;
use std::path::Path;

use crate::api::middleware::AppError;
use crate::config::LlmConfig;
use crate::models::{GenerationParams, ModelConfig};

/// Turns a model file into a loaded, callable model.
#[async_trait::async_trait]
pub trait ModelRuntime: Send + Sync {
    async fn load(&self, path: &Path, config: &ModelConfig) -> Result<Box<dyn LoadedModel>, AppError>;
}

/// A loaded model. Dropping it releases the handle.
#[async_trait::async_trait]
pub trait LoadedModel: Send + Sync {
    /// Generates a completion for `prompt`, bounded by `params.max_tokens`.
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, AppError>;
}

/// Runtime backed by a llama.cpp-compatible completion server.
///
/// The server owns the weights: context size, threads and GPU offload are
/// fixed when it starts. `load` only checks that it is ready to serve.
pub struct LlamaServerRuntime {
    base_url: String,
    api_key: Option<String>,
    http_client: HttpClient,
}

impl LlamaServerRuntime {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            base_url: config.runtime_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            http_client: HttpClient::new(),
        }
    }
}

/// Adds the bearer token when one is configured.
fn authorized(builder: RequestBuilder, api_key: Option<&str>) -> RequestBuilder {
    match api_key {
        Some(api_key) => builder.header("Authorization", format!("Bearer {}", api_key)),
        None => builder,
    }
}

/// Request body for `POST /completion`. Only per-request sampling fields.
fn completion_body(prompt: &str, params: &GenerationParams) -> serde_json::Value {
    json!({
        "prompt": prompt,
        "n_predict": params.max_tokens,
        "temperature": params.temperature,
        "top_p": params.top_p,
        "stop": params.stop,
        "stream": false,
    })
}

#[async_trait::async_trait]
impl ModelRuntime for LlamaServerRuntime {
    async fn load(&self, path: &Path, config: &ModelConfig) -> Result<Box<dyn LoadedModel>, AppError> {
        let health_url = format!("{}/health", self.base_url);
        let response = authorized(self.http_client.get(&health_url), self.api_key.as_deref())
            .send()
            .await
            .map_err(|e| {
                AppError::Generation(format!("Model runtime unreachable at {}: {}", self.base_url, e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::Generation(format!(
                "Model runtime at {} is not ready (status {})",
                self.base_url,
                response.status()
            )));
        }

        tracing::info!(
            "Model runtime ready at {} for {} (requested ctx={}, threads={:?}, gpu_layers={}; applied at server start)",
            self.base_url,
            path.display(),
            config.n_ctx,
            config.n_threads,
            config.n_gpu_layers
        );

        Ok(Box::new(LlamaServerModel {
            completion_url: format!("{}/completion", self.base_url),
            api_key: self.api_key.clone(),
            http_client: self.http_client.clone(),
        }))
    }
}

struct LlamaServerModel {
    completion_url: String,
    api_key: Option<String>,
    http_client: HttpClient,
}

#[async_trait::async_trait]
impl LoadedModel for LlamaServerModel {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, AppError> {
        let request = self
            .http_client
            .post(&self.completion_url)
            .json(&completion_body(prompt, params));

        let response = authorized(request, self.api_key.as_deref())
            .send()
            .await
            .map_err(|e| AppError::Generation(format!("Failed to call model runtime: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Generation(format!(
                "Model runtime returned error {}: {}",
                status, error_text
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Generation(format!("Failed to parse model response: {}", e)))?;

        // llama.cpp answers with `content`; OpenAI-style servers with `choices[0].text`
        let text = result["content"]
            .as_str()
            .or_else(|| result["choices"][0]["text"].as_str())
            .ok_or_else(|| AppError::Generation("Model response does not contain text".to_string()))?;

        Ok(text.to_string())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Deterministic runtime: every completion returns the scripted text.
    #[derive(Clone, Default)]
    pub struct ScriptedRuntime {
        pub reply: Arc<Mutex<String>>,
        pub prompts: Arc<Mutex<Vec<String>>>,
        pub params: Arc<Mutex<Vec<GenerationParams>>>,
        pub fail_load: bool,
        /// Makes `load` sleep first, to exercise cancellation.
        pub load_delay: Option<Duration>,
    }

    impl ScriptedRuntime {
        pub fn replying(reply: &str) -> Self {
            let runtime = Self::default();
            *runtime.reply.lock().unwrap() = reply.to_string();
            runtime
        }

        pub fn last_prompt(&self) -> Option<String> {
            self.prompts.lock().unwrap().last().cloned()
        }
    }

    #[async_trait::async_trait]
    impl ModelRuntime for ScriptedRuntime {
        async fn load(&self, _path: &Path, _config: &ModelConfig) -> Result<Box<dyn LoadedModel>, AppError> {
            if let Some(delay) = self.load_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_load {
                return Err(AppError::Generation("runtime refused the model".to_string()));
            }
            Ok(Box::new(self.clone()))
        }
    }

    #[async_trait::async_trait]
    impl LoadedModel for ScriptedRuntime {
        async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, AppError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.params.lock().unwrap().push(params.clone());
            Ok(self.reply.lock().unwrap().clone())
        }
    }
}

pub mod connection_manager;
pub mod database; // One driver per supported engine
pub mod generation_engine;
pub mod model_catalog;
pub mod model_runtime;
pub mod query_pipeline;
pub mod schema_context;

pub use connection_manager::ConnectionManager;
pub use generation_engine::{GenerationEngine, SamplingSettings};
pub use model_catalog::list_models;
pub use model_runtime::{LlamaServerRuntime, LoadedModel, ModelRuntime};
pub use query_pipeline::{remediation_suggestions, QueryPipeline};
pub use schema_context::SchemaContextBuilder;

use std::path::Path;
use tokio::fs;

use crate::models::{ModelFile, ModelListing};

const MODEL_EXTENSIONS: [&str; 2] = ["gguf", "bin"];

fn is_model_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MODEL_EXTENSIONS.iter().any(|m| ext.eq_ignore_ascii_case(m)))
        .unwrap_or(false)
}

/// Lists model files in `directory`, flagging the one currently loaded.
///
/// A missing or unreadable directory yields an empty listing.
pub async fn list_models(directory: &str, current: Option<&Path>) -> ModelListing {
    let mut models = Vec::new();

    match fs::read_dir(directory).await {
        Ok(mut entries) => loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("Stopped reading {}: {}", directory, e);
                    break;
                }
            };

            let path = entry.path();
            if !is_model_file(&path) {
                continue;
            }
            // Follows symlinks, so a linked model file is listed too
            let metadata = match fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };

            let is_loaded = match current {
                Some(current) => same_file(current, &path).await,
                None => false,
            };
            models.push(ModelFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: path.to_string_lossy().into_owned(),
                size_mb: (metadata.len() as f64 / (1024.0 * 1024.0) * 10.0).round() / 10.0,
                is_loaded,
            });
        },
        Err(e) => {
            tracing::debug!("Models directory {} not readable: {}", directory, e);
        }
    }

    models.sort_by(|a, b| a.name.cmp(&b.name));

    ModelListing {
        models_directory: directory.to_string(),
        total_models: models.len(),
        available_models: models,
        current_model: current.map(|c| c.display().to_string()),
    }
}

async fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a).await, fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

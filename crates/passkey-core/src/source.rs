//! Locating model and tokenizer files.
//!
//! A model identifier is either a local directory holding the files, or a
//! Hugging Face hub repository fetched into a local cache directory.

use std::path::{Path, PathBuf};

use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use tokenizers::Tokenizer;
use tracing::info;

use crate::error::{PasskeyError, PasskeyResult};

pub enum ModelSource {
    Local(PathBuf),
    Hub { id: String, repo: ApiRepo },
}

impl ModelSource {
    /// Resolve `id`. Existing directories win over hub repositories.
    pub fn resolve(id: &str, cache_dir: Option<&Path>) -> PasskeyResult<Self> {
        let local = Path::new(id);
        if local.is_dir() {
            return Ok(Self::Local(local.to_path_buf()));
        }

        let mut builder = ApiBuilder::new().with_progress(true);
        if let Some(dir) = cache_dir {
            builder = builder.with_cache_dir(dir.to_path_buf());
        }
        let api = builder
            .build()
            .map_err(|e| PasskeyError::ModelLoad(format!("hub client for {id}: {e}")))?;
        Ok(Self::Hub {
            id: id.to_string(),
            repo: api.model(id.to_string()),
        })
    }

    pub fn id(&self) -> String {
        match self {
            Self::Local(path) => path.display().to_string(),
            Self::Hub { id, .. } => id.clone(),
        }
    }

    /// Path to `file`, downloading it into the cache when needed.
    pub fn get(&self, file: &str) -> PasskeyResult<PathBuf> {
        match self {
            Self::Local(dir) => {
                let path = dir.join(file);
                if path.exists() {
                    Ok(path)
                } else {
                    Err(PasskeyError::ModelLoad(format!(
                        "{} not found in {}",
                        file,
                        dir.display()
                    )))
                }
            }
            Self::Hub { id, repo } => repo
                .get(file)
                .map_err(|e| PasskeyError::ModelLoad(format!("fetching {file} from {id}: {e}"))),
        }
    }

    /// Safetensors weight files: a single `model.safetensors`, or every shard
    /// listed in `model.safetensors.index.json`.
    pub fn safetensors(&self) -> PasskeyResult<Vec<PathBuf>> {
        if let Ok(single) = self.get("model.safetensors") {
            return Ok(vec![single]);
        }
        let index_path = self.get("model.safetensors.index.json")?;
        let index: serde_json::Value = serde_json::from_slice(&std::fs::read(&index_path)?)?;
        let shards = shard_names(&index).ok_or_else(|| {
            PasskeyError::ModelLoad(format!("no weight_map in {}", index_path.display()))
        })?;
        shards.iter().map(|shard| self.get(shard)).collect()
    }

    pub fn tokenizer(&self) -> PasskeyResult<Tokenizer> {
        let path = self.get("tokenizer.json")?;
        info!(path = %path.display(), "loading tokenizer");
        Tokenizer::from_file(&path)
            .map_err(|e| PasskeyError::ModelLoad(format!("tokenizer {}: {e}", path.display())))
    }
}

/// Distinct shard file names of a safetensors index, in first-seen order.
fn shard_names(index: &serde_json::Value) -> Option<Vec<String>> {
    let map = index.get("weight_map")?.as_object()?;
    let mut shards: Vec<String> = Vec::new();
    for file in map.values().filter_map(|v| v.as_str()) {
        if !shards.iter().any(|s| s == file) {
            shards.push(file.to_string());
        }
    }
    Some(shards)
}

/// Resolve `token` to its id in `tokenizer`.
pub fn token_id(tokenizer: &Tokenizer, token: &str) -> PasskeyResult<u32> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| PasskeyError::ModelLoad(format!("tokenizer has no {token:?} token")))
}

use serde::{Deserialize, Serialize};

use crate::error::PasskeyResult;

/// A loaded model + tokenizer + generation configuration.
pub trait Pipeline {
    /// Number of tokens the prompt encodes to, special tokens included.
    fn count_tokens(&self, text: &str) -> PasskeyResult<usize>;

    /// Generate a single sequence of at most `max_new_tokens` new tokens.
    /// Returns the full generated text: the prompt followed by the continuation.
    fn generate(&self, prompt: &str, max_new_tokens: usize) -> PasskeyResult<String>;
}

/// Numeric precision the model weights are loaded in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    F32,
    F16,
    #[default]
    Bf16,
}

/// Model-specific generation options. Unset options are left to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub use_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_flash: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offload_cache_to_cpu: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<String>,
    /// Id of the memory token, resolved from the tokenizer at load time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_id: Option<u32>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            use_flash: None,
            offload_cache_to_cpu: None,
            cache_top_k: None,
            aggregate: None,
            mem_id: None,
        }
    }
}

impl GenerationOptions {
    /// True when any option only a memory-augmented model understands is set.
    pub fn has_memory_options(&self) -> bool {
        self.offload_cache_to_cpu.is_some()
            || self.cache_top_k.is_some()
            || self.aggregate.is_some()
            || self.mem_id.is_some()
    }
}

/// Loaded pipelines keyed by model name, in registration order.
#[derive(Default)]
pub struct Pipelines {
    entries: Vec<(String, Box<dyn Pipeline>)>,
}

impl Pipelines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline. A pipeline registered under an existing name
    /// replaces it in place.
    pub fn insert(&mut self, name: impl Into<String>, pipeline: Box<dyn Pipeline>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = pipeline,
            None => self.entries.push((name, pipeline)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Pipeline> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Pipeline)> {
        self.entries.iter().map(|(n, p)| (n.as_str(), p.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Configuration loading from TOML files.
//!
//! Lookup order:
//! 1. `--config <path>`
//! 2. `$PASSKEY_CONFIG` environment variable
//! 3. `~/.config/passkey/config.toml`
//! 4. Built-in defaults (everything is optional)

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use passkey_core::{GenerationOptions, Precision, SuffixSlice, MAX_NEW_TOKENS};

/// Top-level configuration.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run: RunConfig,
    pub cache: CacheConfig,
    pub models: Vec<ModelConfig>,
}

/// What to test and where results go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Filler budgets in characters, one accuracy per entry.
    pub context_lengths: Vec<usize>,
    /// Trials per context length; also the accuracy denominator.
    pub trials: usize,
    pub max_new_tokens: usize,
    pub suffix_slice: SuffixSlice,
    /// Fixed seed for reproducible prompts. Default: fresh entropy.
    pub seed: Option<u64>,
    pub output_dir: PathBuf,
}

/// Local model/tokenizer cache.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Default: platform-specific cache dir.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// OpenAI-compatible completions server.
    Http,
    /// Local inference (requires the `candle` feature).
    Candle,
}

/// One pipeline to evaluate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub backend: Backend,
    /// Hub repository id or local directory.
    pub model_id: String,
    /// Tokenizer source. Default: `model_id`.
    pub tokenizer_id: Option<String>,
    pub endpoint: String,
    /// Model name sent to the server. Default: `model_id`.
    pub served_model: Option<String>,
    /// Environment variable holding a bearer token.
    pub api_key_env: Option<String>,
    pub timeout_secs: Option<u64>,
    pub precision: Precision,
    /// Memory token whose id is passed to memory-augmented models.
    pub mem_token: Option<String>,
    pub generation: GenerationOptions,
}

// --- Defaults ---

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            context_lengths: vec![2000],
            trials: 50,
            max_new_tokens: MAX_NEW_TOKENS,
            suffix_slice: SuffixSlice::FromStart,
            seed: None,
            output_dir: PathBuf::from("."),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            backend: Backend::Http,
            model_id: "huggyllama/llama-7b".into(),
            tokenizer_id: None,
            endpoint: "http://127.0.0.1:8000".into(),
            served_model: None,
            api_key_env: None,
            timeout_secs: None,
            precision: Precision::Bf16,
            mem_token: None,
            generation: GenerationOptions::default(),
        }
    }
}

/// The model evaluated when no `[[models]]` are configured: the
/// memory-augmented variant with its cache retrieval options.
///
/// `mem_token` stays unset: the stock `huggyllama/llama-7b` tokenizer has no
/// `<landmark>` token, and an unresolvable memory token fails loading. Point
/// `tokenizer_id` at the memory model's tokenizer and set
/// `mem_token = "<landmark>"` to send `mem_id` with every request.
pub fn default_model() -> ModelConfig {
    ModelConfig {
        name: "mem".into(),
        generation: GenerationOptions {
            use_cache: true,
            use_flash: Some(true),
            offload_cache_to_cpu: Some(false),
            cache_top_k: Some(5),
            aggregate: Some("max_over_tokens".into()),
            mem_id: None,
        },
        ..Default::default()
    }
}

impl ModelConfig {
    pub fn tokenizer_id(&self) -> &str {
        self.tokenizer_id.as_deref().unwrap_or(&self.model_id)
    }

    pub fn served_model(&self) -> &str {
        self.served_model.as_deref().unwrap_or(&self.model_id)
    }
}

impl Config {
    /// Models to load; an empty list means the single default model.
    pub fn models(&self) -> Vec<ModelConfig> {
        if self.models.is_empty() {
            vec![default_model()]
        } else {
            self.models.clone()
        }
    }

    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.cache.dir.clone().or_else(default_cache_dir)
    }

    pub fn validate(&self) -> Result<()> {
        if self.run.trials == 0 {
            bail!("run.trials must be at least 1");
        }
        if self.run.context_lengths.is_empty() {
            bail!("run.context_lengths must not be empty");
        }
        let models = self.models();
        for (i, model) in models.iter().enumerate() {
            if model.name.is_empty() {
                bail!("models[{i}].name must not be empty");
            }
            if models[..i].iter().any(|m| m.name == model.name) {
                bail!("duplicate model name {:?}", model.name);
            }
        }
        Ok(())
    }
}

fn default_cache_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "passkey", "passkey").map(|d| d.cache_dir().join("hub"))
}

/// Load config from `explicit` or the lookup chain. Returns defaults if no
/// config file exists.
pub fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let path = explicit.clone().or_else(config_path);

    if let Some(p) = &path {
        if p.exists() {
            let content =
                std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| format!("parsing {}", p.display()))?;
            return Ok(config);
        }
        if explicit.is_some() {
            bail!("config file {} not found", p.display());
        }
    }

    Ok(Config::default())
}

/// Resolve the config file path.
fn config_path() -> Option<PathBuf> {
    // 1. Environment variable
    if let Ok(p) = std::env::var("PASSKEY_CONFIG") {
        return Some(PathBuf::from(p));
    }

    // 2. ~/.config/passkey/config.toml
    if let Some(home) = dirs_home() {
        let p = home.join(".config").join("passkey").join("config.toml");
        return Some(p);
    }

    None
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

/// Show the active config path (for `passkey config`).
pub fn show_config_path(explicit: Option<PathBuf>) -> String {
    match explicit.or_else(config_path) {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "no config path resolved (using defaults)".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.run.context_lengths, vec![2000]);
        assert_eq!(config.run.trials, 50);
        assert_eq!(config.run.max_new_tokens, 30);
        assert_eq!(config.run.suffix_slice, SuffixSlice::FromStart);

        let models = config.models();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "mem");
        assert_eq!(models[0].generation.cache_top_k, Some(5));
        assert_eq!(models[0].generation.offload_cache_to_cpu, Some(false));
        assert_eq!(models[0].precision, Precision::Bf16);
        config.validate().unwrap();
    }

    #[test]
    fn test_default_model_has_no_mem_token() {
        let model = default_model();
        assert_eq!(model.tokenizer_id(), "huggyllama/llama-7b");
        assert_eq!(model.mem_token, None);
        assert_eq!(model.generation.mem_id, None);

        let toml_str = "[[models]]\nname = \"mem\"\nmem_token = \"<landmark>\"\n";
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.models()[0].mem_token.as_deref(), Some("<landmark>"));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[run]
trials = 3
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.run.trials, 3);
        // Other fields should be defaults
        assert_eq!(config.run.context_lengths, vec![2000]);
        assert_eq!(config.models()[0].endpoint, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[run]
context_lengths = [2000, 8000]
trials = 10
max_new_tokens = 20
suffix_slice = "contiguous"
seed = 42
output_dir = "/tmp/passkey"

[cache]
dir = "/tmp/hf_cache"

[[models]]
name = "base"
backend = "candle"
model_id = "huggyllama/llama-7b"
precision = "f16"

[models.generation]
use_cache = true

[[models]]
name = "mem"
model_id = "/models/llama-mem"
tokenizer_id = "huggyllama/llama-7b"
endpoint = "http://gpu-box:9000"
api_key_env = "PASSKEY_API_KEY"
timeout_secs = 600
mem_token = "<landmark>"

[models.generation]
use_flash = true
offload_cache_to_cpu = false
cache_top_k = 5
aggregate = "max_over_tokens"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.run.context_lengths, vec![2000, 8000]);
        assert_eq!(config.run.suffix_slice, SuffixSlice::Contiguous);
        assert_eq!(config.run.seed, Some(42));
        assert_eq!(config.cache_dir(), Some(PathBuf::from("/tmp/hf_cache")));

        let models = config.models();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].backend, Backend::Candle);
        assert_eq!(models[0].precision, Precision::F16);
        assert_eq!(models[0].generation.cache_top_k, None);
        assert_eq!(models[1].backend, Backend::Http);
        assert_eq!(models[1].tokenizer_id(), "huggyllama/llama-7b");
        assert_eq!(models[1].served_model(), "/models/llama-mem");
        assert_eq!(models[1].mem_token.as_deref(), Some("<landmark>"));
        assert_eq!(models[1].generation.cache_top_k, Some(5));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_runs() {
        let mut config = Config::default();
        config.run.trials = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.run.context_lengths.clear();
        assert!(config.validate().is_err());

        let config = Config {
            models: vec![default_model(), default_model()],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            models: vec![ModelConfig::default()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_model_entry_without_generation_table_is_plain() {
        let config: Config = toml::from_str("[[models]]\nname = \"base\"\n").unwrap();
        let models = config.models();
        assert_eq!(models[0].name, "base");
        assert!(models[0].generation.use_cache);
        assert!(!models[0].generation.has_memory_options());
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_explicit_config_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passkey.toml");
        std::fs::write(&path, "[run]\ntrials = 7\n").unwrap();
        let config = load_config(Some(path)).unwrap();
        assert_eq!(config.run.trials, 7);
    }
}

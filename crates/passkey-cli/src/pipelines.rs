//! Building the configured pipelines.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tokenizers::Tokenizer;
use tracing::info;

use passkey_core::source::token_id;
use passkey_core::{
    GenerationOptions, HttpPipeline, HttpPipelineConfig, ModelSource, Pipeline, Pipelines,
};

use crate::config::{Backend, ModelConfig};

/// Load every model in order. Any failure here is fatal.
pub fn load_pipelines(models: &[ModelConfig], cache_dir: Option<&Path>) -> Result<Pipelines> {
    let mut pipelines = Pipelines::new();
    for model in models {
        info!(model = %model.name, backend = ?model.backend, "loading pipeline");
        let pipeline = load_pipeline(model, cache_dir)
            .with_context(|| format!("loading model {:?}", model.name))?;
        pipelines.insert(model.name.clone(), pipeline);
    }
    Ok(pipelines)
}

fn load_pipeline(model: &ModelConfig, cache_dir: Option<&Path>) -> Result<Box<dyn Pipeline>> {
    let tokenizer = ModelSource::resolve(model.tokenizer_id(), cache_dir)?.tokenizer()?;

    let mut options = model.generation.clone();
    if let Some(token) = &model.mem_token {
        let id = token_id(&tokenizer, token)?;
        info!(token = %token, id, "resolved memory token");
        options.mem_id = Some(id);
    }

    match model.backend {
        Backend::Http => {
            let api_key = match &model.api_key_env {
                Some(var) => Some(std::env::var(var).with_context(|| format!("reading ${var}"))?),
                None => None,
            };
            let config = HttpPipelineConfig {
                endpoint: model.endpoint.clone(),
                model: model.served_model().to_string(),
                api_key,
                timeout: model.timeout_secs.map(Duration::from_secs),
                options,
            };
            Ok(Box::new(HttpPipeline::new(config, tokenizer)))
        }
        Backend::Candle => load_candle(model, cache_dir, tokenizer, &options),
    }
}

#[cfg(feature = "candle")]
fn load_candle(
    model: &ModelConfig,
    cache_dir: Option<&Path>,
    tokenizer: Tokenizer,
    options: &GenerationOptions,
) -> Result<Box<dyn Pipeline>> {
    let source = ModelSource::resolve(&model.model_id, cache_dir)?;
    let pipeline =
        passkey_core::CandlePipeline::load(&source, tokenizer, model.precision, options)?;
    Ok(Box::new(pipeline))
}

#[cfg(not(feature = "candle"))]
fn load_candle(
    model: &ModelConfig,
    _cache_dir: Option<&Path>,
    _tokenizer: Tokenizer,
    _options: &GenerationOptions,
) -> Result<Box<dyn Pipeline>> {
    anyhow::bail!(
        "model {:?} uses the candle backend; rebuild with `--features candle`",
        model.name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use passkey_core::testing::TOKENIZER_JSON;

    fn local_model(dir: &Path, name: &str) -> ModelConfig {
        std::fs::write(dir.join("tokenizer.json"), TOKENIZER_JSON).unwrap();
        ModelConfig {
            name: name.into(),
            model_id: dir.to_str().unwrap().into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_http_models_load_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut mem = local_model(dir.path(), "mem");
        mem.mem_token = Some("<landmark>".into());
        let base = local_model(dir.path(), "base");

        let pipelines = load_pipelines(&[mem, base], None).unwrap();
        assert_eq!(pipelines.names(), vec!["mem".to_string(), "base".to_string()]);
        let mem = pipelines.get("mem").unwrap();
        assert_eq!(mem.count_tokens("the the").unwrap(), 2);
    }

    #[test]
    fn test_unknown_mem_token_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = local_model(dir.path(), "mem");
        model.mem_token = Some("<mem>".into());
        let err = load_pipelines(&[model], None).err().unwrap();
        assert!(format!("{err:#}").contains("<mem>"));
    }

    #[test]
    fn test_missing_api_key_env_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = local_model(dir.path(), "mem");
        model.api_key_env = Some("PASSKEY_TEST_KEY_THAT_IS_NEVER_SET".into());
        assert!(load_pipelines(&[model], None).is_err());
    }

    #[cfg(not(feature = "candle"))]
    #[test]
    fn test_candle_backend_requires_feature() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = local_model(dir.path(), "base");
        model.backend = Backend::Candle;
        let err = load_pipelines(&[model], None).err().unwrap();
        assert!(format!("{err:#}").contains("--features candle"));
    }
}

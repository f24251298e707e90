//! Local Llama-family inference with candle.
//!
//! Weights are memory-mapped from safetensors at the configured precision
//! and placed on CUDA device 0 when one is available. Decoding is greedy.

use candle_core::{DType, Device, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use crate::error::{PasskeyError, PasskeyResult};
use crate::pipeline::{GenerationOptions, Pipeline, Precision};
use crate::source::ModelSource;

const EOS_TOKEN: &str = "</s>";

pub struct CandlePipeline {
    model: Llama,
    config: Config,
    tokenizer: Tokenizer,
    device: Device,
    dtype: DType,
    use_cache: bool,
    eos_token_id: Option<u32>,
}

fn dtype(precision: Precision) -> DType {
    match precision {
        Precision::F32 => DType::F32,
        Precision::F16 => DType::F16,
        Precision::Bf16 => DType::BF16,
    }
}

fn load_err(e: candle_core::Error) -> PasskeyError {
    PasskeyError::ModelLoad(e.to_string())
}

fn gen_err(e: candle_core::Error) -> PasskeyError {
    PasskeyError::Generation(e.to_string())
}

impl CandlePipeline {
    pub fn load(
        source: &ModelSource,
        tokenizer: Tokenizer,
        precision: Precision,
        options: &GenerationOptions,
    ) -> PasskeyResult<Self> {
        let device =
            Device::cuda_if_available(0).map_err(|e| PasskeyError::Device(e.to_string()))?;
        let dtype = dtype(precision);

        let use_flash = options.use_flash.unwrap_or(false);
        if use_flash && !cfg!(feature = "flash-attn") {
            warn!("use_flash requested but built without the flash-attn feature; ignoring");
        }
        if options.has_memory_options() {
            warn!(
                model = %source.id(),
                "memory cache options are not supported by the candle backend; ignoring"
            );
        }

        let config_path = source.get("config.json")?;
        let llama_config: LlamaConfig = serde_json::from_slice(&std::fs::read(&config_path)?)?;
        let config = llama_config.into_config(use_flash && cfg!(feature = "flash-attn"));

        let weights = source.safetensors()?;
        info!(
            model = %source.id(),
            shards = weights.len(),
            device = ?device,
            dtype = ?dtype,
            "loading weights"
        );
        // SAFETY: the weight files are not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weights, dtype, &device) }
            .map_err(load_err)?;
        let model = Llama::load(vb, &config).map_err(load_err)?;

        let eos_token_id = tokenizer.token_to_id(EOS_TOKEN);
        Ok(Self {
            model,
            config,
            tokenizer,
            device,
            dtype,
            use_cache: options.use_cache,
            eos_token_id,
        })
    }

    fn next_token(&self, logits: &Tensor) -> PasskeyResult<u32> {
        logits
            .squeeze(0)
            .and_then(|l| l.to_dtype(DType::F32))
            .and_then(|l| l.argmax(D::Minus1))
            .and_then(|t| t.to_scalar::<u32>())
            .map_err(gen_err)
    }
}

impl Pipeline for CandlePipeline {
    fn count_tokens(&self, text: &str) -> PasskeyResult<usize> {
        self.tokenizer
            .encode(text, true)
            .map(|encoding| encoding.len())
            .map_err(|e| PasskeyError::Tokenizer(e.to_string()))
    }

    fn generate(&self, prompt: &str, max_new_tokens: usize) -> PasskeyResult<String> {
        let mut tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| PasskeyError::Tokenizer(e.to_string()))?
            .get_ids()
            .to_vec();
        let mut cache =
            Cache::new(self.use_cache, self.dtype, &self.config, &self.device).map_err(gen_err)?;

        let mut generated = Vec::with_capacity(max_new_tokens);
        let mut index_pos = 0;
        for step in 0..max_new_tokens {
            let (context_size, context_index) = if self.use_cache && step > 0 {
                (1, index_pos)
            } else {
                (tokens.len(), 0)
            };
            let context = &tokens[tokens.len().saturating_sub(context_size)..];
            let input = Tensor::new(context, &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(gen_err)?;
            let logits = self
                .model
                .forward(&input, context_index, &mut cache)
                .map_err(gen_err)?;
            index_pos += context.len();

            let next = self.next_token(&logits)?;
            if Some(next) == self.eos_token_id {
                break;
            }
            tokens.push(next);
            generated.push(next);
        }

        let continuation = self
            .tokenizer
            .decode(&generated, true)
            .map_err(|e| PasskeyError::Tokenizer(e.to_string()))?;
        Ok(format!("{prompt}{continuation}"))
    }
}

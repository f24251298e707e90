//! Pipeline backed by an OpenAI-compatible completions server
//! (vLLM, llama.cpp server, text-generation-inference, ...).
//!
//! Tokens are counted locally with the model's tokenizer so prompt sizes are
//! reported the same way for every backend.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tokenizers::Tokenizer;
use tracing::debug;

use crate::error::{PasskeyError, PasskeyResult};
use crate::pipeline::{GenerationOptions, Pipeline};

#[derive(Debug, Clone)]
pub struct HttpPipelineConfig {
    /// Base URL, e.g. `http://127.0.0.1:8000`.
    pub endpoint: String,
    /// Model name sent in the request body.
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
    pub options: GenerationOptions,
}

pub struct HttpPipeline {
    agent: ureq::Agent,
    url: String,
    config: HttpPipelineConfig,
    tokenizer: Tokenizer,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

impl HttpPipeline {
    pub fn new(config: HttpPipelineConfig, tokenizer: Tokenizer) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            agent: builder.build(),
            url: completions_url(&config.endpoint),
            config,
            tokenizer,
        }
    }

    fn request_body(&self, prompt: &str, max_new_tokens: usize) -> PasskeyResult<Value> {
        let mut body = json!({
            "model": self.config.model,
            "prompt": prompt,
            "max_tokens": max_new_tokens,
            "n": 1,
            "temperature": 0.0,
        });
        if let (Value::Object(fields), Value::Object(options)) =
            (&mut body, serde_json::to_value(&self.config.options)?)
        {
            fields.extend(options);
        }
        Ok(body)
    }
}

fn completions_url(endpoint: &str) -> String {
    format!("{}/v1/completions", endpoint.trim_end_matches('/'))
}

impl Pipeline for HttpPipeline {
    fn count_tokens(&self, text: &str) -> PasskeyResult<usize> {
        self.tokenizer
            .encode(text, true)
            .map(|encoding| encoding.len())
            .map_err(|e| PasskeyError::Tokenizer(e.to_string()))
    }

    fn generate(&self, prompt: &str, max_new_tokens: usize) -> PasskeyResult<String> {
        let body = self.request_body(prompt, max_new_tokens)?;
        debug!(url = %self.url, prompt_chars = prompt.len(), "completion request");

        let mut request = self.agent.post(&self.url);
        if let Some(key) = &self.config.api_key {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }
        let response: CompletionResponse = request
            .send_json(body)
            .map_err(|e| PasskeyError::Generation(format!("POST {}: {e}", self.url)))?
            .into_json()
            .map_err(|e| PasskeyError::Generation(format!("decoding completion: {e}")))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PasskeyError::Generation("completion returned no choices".into()))?;
        Ok(format!("{prompt}{}", choice.text))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::testing::TOKENIZER_JSON;

    fn tokenizer() -> Tokenizer {
        Tokenizer::from_str(TOKENIZER_JSON).unwrap()
    }

    fn pipeline(options: GenerationOptions) -> HttpPipeline {
        HttpPipeline::new(
            HttpPipelineConfig {
                endpoint: "http://127.0.0.1:8000/".into(),
                model: "llama".into(),
                api_key: None,
                timeout: Some(Duration::from_secs(5)),
                options,
            },
            tokenizer(),
        )
    }

    #[test]
    fn test_completions_url() {
        assert_eq!(
            completions_url("http://127.0.0.1:8000/"),
            "http://127.0.0.1:8000/v1/completions"
        );
        assert_eq!(
            completions_url("http://host:8080"),
            "http://host:8080/v1/completions"
        );
    }

    #[test]
    fn test_request_body_merges_options() {
        let options = GenerationOptions {
            use_flash: Some(true),
            offload_cache_to_cpu: Some(false),
            cache_top_k: Some(5),
            aggregate: Some("max_over_tokens".into()),
            mem_id: Some(32000),
            ..Default::default()
        };
        let body = pipeline(options).request_body("prompt", 30).unwrap();
        assert_eq!(body["max_tokens"], 30);
        assert_eq!(body["n"], 1);
        assert_eq!(body["model"], "llama");
        assert_eq!(body["use_cache"], true);
        assert_eq!(body["cache_top_k"], 5);
        assert_eq!(body["aggregate"], "max_over_tokens");
        assert_eq!(body["mem_id"], 32000);
    }

    #[test]
    fn test_request_body_plain_model() {
        let body = pipeline(GenerationOptions::default())
            .request_body("prompt", 30)
            .unwrap();
        assert!(body.get("cache_top_k").is_none());
        assert!(body.get("use_flash").is_none());
    }

    #[test]
    fn test_count_tokens() {
        let p = pipeline(GenerationOptions::default());
        assert_eq!(p.count_tokens("the sky the grass").unwrap(), 4);
    }

    #[test]
    fn test_unreachable_server_is_recoverable() {
        let p = HttpPipeline::new(
            HttpPipelineConfig {
                endpoint: "http://127.0.0.1:1".into(),
                model: "llama".into(),
                api_key: None,
                timeout: Some(Duration::from_secs(1)),
                options: GenerationOptions::default(),
            },
            tokenizer(),
        );
        let err = p.generate("prompt", 30).unwrap_err();
        assert!(err.is_recoverable());
    }
}

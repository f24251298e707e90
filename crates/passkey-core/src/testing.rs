//! Fixtures shared by the test suites of both crates.

/// Minimal word-level tokenizer with a `<landmark>` token.
pub const TOKENIZER_JSON: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [],
  "normalizer": null,
  "pre_tokenizer": { "type": "Whitespace" },
  "post_processor": null,
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": { "[UNK]": 0, "the": 1, "<landmark>": 2 },
    "unk_token": "[UNK]"
  }
}"#;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasskeyError {
    #[error("filler text too short: {available} chars available, {requested} requested")]
    FillerTooShort { requested: usize, available: usize },

    #[error("planted fact {fact:?} missing from prompt")]
    FactMissing { fact: String },

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("model load error: {0}")]
    ModelLoad(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PasskeyError {
    /// Errors that only invalidate the current context length. Everything
    /// else is a misconfiguration or a broken runtime and ends the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Generation(_) | Self::Tokenizer(_))
    }
}

pub type PasskeyResult<T> = Result<T, PasskeyError>;

//! Asking a pipeline for the pass key and scoring the reply.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::PasskeyResult;
use crate::pipeline::Pipeline;
use crate::prompt::Prompt;

/// Decoding budget for the recalled number.
pub const MAX_NEW_TOKENS: usize = 30;

/// Characters of raw continuation kept when no number was produced.
const FALLBACK_CHARS: usize = 20;

/// What the model answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Number(u64),
    /// No usable digit run; never equal to a pass key.
    Text(String),
}

impl Answer {
    pub fn is_correct(&self, pass_key: u64) -> bool {
        matches!(self, Self::Number(n) if *n == pass_key)
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(t) => write!(f, "{t}"),
        }
    }
}

fn digit_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("digit pattern compiles"))
}

fn is_decimal(c: char) -> bool {
    let mut buf = [0; 4];
    c.is_ascii_digit() || digit_run().is_match(c.encode_utf8(&mut buf))
}

/// Value of a Unicode decimal digit. Decimal digits are encoded in runs of
/// ten consecutive code points, zero first.
fn digit_value(c: char) -> u64 {
    if let Some(d) = c.to_digit(10) {
        return u64::from(d);
    }
    let mut steps = 0;
    let mut cp = c as u32;
    while let Some(prev) = cp.checked_sub(1).and_then(char::from_u32) {
        if !is_decimal(prev) {
            break;
        }
        steps += 1;
        cp -= 1;
    }
    steps % 10
}

fn parse_decimal(digits: &str) -> Option<u64> {
    digits.chars().try_fold(0u64, |acc, c| {
        acc.checked_mul(10)?.checked_add(digit_value(c))
    })
}

/// First run of decimal digits in `response`, or its first 20 characters.
pub fn extract_answer(response: &str) -> Answer {
    if let Some(m) = digit_run().find(response) {
        if let Some(n) = parse_decimal(m.as_str()) {
            return Answer::Number(n);
        }
        return Answer::Text(m.as_str().to_string());
    }
    Answer::Text(response.chars().take(FALLBACK_CHARS).collect())
}

/// The part of `generated` after the first `prompt`-length characters.
pub fn continuation<'a>(generated: &'a str, prompt: &str) -> &'a str {
    let skip = prompt.chars().count();
    match generated.char_indices().nth(skip) {
        Some((idx, _)) => &generated[idx..],
        None => "",
    }
}

/// Run one prompt through `pipeline` and extract its answer.
pub fn query(
    pipeline: &dyn Pipeline,
    prompt: &Prompt,
    max_new_tokens: usize,
) -> PasskeyResult<Answer> {
    prompt.verify()?;
    let generated = pipeline.generate(&prompt.text, max_new_tokens)?;
    Ok(extract_answer(continuation(&generated, &prompt.text)))
}

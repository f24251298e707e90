//! Synthetic "needle in a haystack" prompts.
//!
//! A prompt is five segments joined by newlines: the task description, a
//! prefix of filler text, the information line planting the pass key, a
//! suffix of filler text and the final question. The model's completion is
//! sensitive to this exact layout.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{PasskeyError, PasskeyResult};

/// Size of the key-name pool: one information key, the rest feed the filler.
pub const KEY_POOL_SIZE: usize = 2001;

const TASK_DESCRIPTION: &str = "There is an important info hidden inside a lot of irrelevant text. \
Find it and memorize them. I will quiz you about the important information there.";

const FILLER_SENTENCES: &str =
    "The grass is green. The sky is blue. The sun is yellow. Here we go. There and back again.";

const PASS_KEY_MIN: u64 = 1_000_000;
const PASS_KEY_MAX: u64 = 9_999_999;

/// Where the filler suffix is sliced from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuffixSlice {
    /// `filler[..n_suffix]`: prefix and suffix both start at the beginning of
    /// the filler, so the suffix repeats text already seen in the prefix.
    #[default]
    FromStart,
    /// `filler[n_prefix..n]`: the suffix continues where the prefix ended.
    Contiguous,
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub text: String,
    pub information_key: String,
    pub pass_key: u64,
}

impl Prompt {
    /// The sentence planting the pass key.
    pub fn information_line(&self) -> String {
        information_line(&self.information_key, self.pass_key)
    }

    /// Fails when the planted fact is not in the prompt text verbatim.
    pub fn verify(&self) -> PasskeyResult<()> {
        let fact = self.information_line();
        if self.text.contains(&fact) {
            Ok(())
        } else {
            Err(PasskeyError::FactMissing { fact })
        }
    }
}

fn information_line(key: &str, pass_key: u64) -> String {
    format!("The {key} is {pass_key}. ")
}

fn final_question(key: &str) -> String {
    format!("What is the {key}? The {key} is")
}

pub struct PromptGenerator<R = StdRng> {
    rng: R,
    suffix_slice: SuffixSlice,
}

impl PromptGenerator<StdRng> {
    /// Seeded generators produce the same prompt sequence on every run.
    pub fn from_seed(seed: Option<u64>, suffix_slice: SuffixSlice) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(rng, suffix_slice)
    }
}

impl<R: Rng> PromptGenerator<R> {
    pub fn new(rng: R, suffix_slice: SuffixSlice) -> Self {
        Self { rng, suffix_slice }
    }

    /// Build a prompt around `n_garbage` characters of filler budget.
    pub fn generate(&mut self, n_garbage: usize) -> PasskeyResult<Prompt> {
        let n_prefix = self.rng.gen_range(0..=n_garbage);
        let n_suffix = n_garbage - n_prefix;

        let mut keys: Vec<String> = (0..KEY_POOL_SIZE).map(|i| format!("key_{i:04}")).collect();
        keys.shuffle(&mut self.rng);
        let information_key = keys.remove(0);

        let filler = self.filler(&keys, n_garbage)?;
        let prefix = &filler[..n_prefix];
        let suffix = match self.suffix_slice {
            SuffixSlice::FromStart => &filler[..n_suffix],
            SuffixSlice::Contiguous => &filler[n_prefix..n_garbage],
        };

        let pass_key = self.rng.gen_range(PASS_KEY_MIN..=PASS_KEY_MAX);
        let lines = [
            TASK_DESCRIPTION.to_string(),
            prefix.to_string(),
            information_line(&information_key, pass_key),
            suffix.to_string(),
            final_question(&information_key),
        ];

        Ok(Prompt {
            text: lines.join("\n"),
            information_key,
            pass_key,
        })
    }

    /// Filler of at least `budget` characters, one entry per key.
    fn filler(&mut self, keys: &[String], budget: usize) -> PasskeyResult<String> {
        let mut filler = String::new();
        for key in keys {
            if filler.len() >= budget {
                break;
            }
            if !filler.is_empty() {
                filler.push(' ');
            }
            let value = self.rng.gen_range(PASS_KEY_MIN..=PASS_KEY_MAX);
            filler.push_str(FILLER_SENTENCES);
            filler.push_str(&format!("The {key} is {value}"));
        }
        if filler.len() < budget {
            return Err(PasskeyError::FillerTooShort {
                requested: budget,
                available: filler.len(),
            });
        }
        Ok(filler)
    }
}

//! Result accumulators and the three JSON artifacts of a run.

use std::path::{Path, PathBuf};

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::info;

use crate::error::{PasskeyError, PasskeyResult};

pub const INDIVIDUAL_RESULTS_FILE: &str = "individual_results.json";
pub const ACCURACIES_FILE: &str = "accuracies.json";
pub const N_TOKENS_FILE: &str = "n_tokens.json";

/// Percentage of correct answers over the configured trial count.
pub fn accuracy(correct: usize, trials: usize) -> f64 {
    (correct as f64 / trials as f64) * 100.0
}

/// Values keyed by model name, serialized as a JSON object in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTable<T> {
    entries: Vec<(String, T)>,
}

impl<T: Default> ModelTable<T> {
    pub fn new(names: &[String]) -> Self {
        Self {
            entries: names.iter().map(|n| (n.clone(), T::default())).collect(),
        }
    }
}

impl<T> ModelTable<T> {
    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    fn entry(&mut self, name: &str) -> PasskeyResult<&mut T> {
        self.get_mut(name)
            .ok_or_else(|| PasskeyError::Config(format!("unknown model {name:?}")))
    }
}

impl<T: Serialize> Serialize for ModelTable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// 0/1 outcome of every trial of one context length, for every model.
pub type LengthOutcomes = ModelTable<Vec<u8>>;

/// Per-length bookkeeping: correct counts and outcome lists.
#[derive(Debug)]
pub struct LengthTally {
    pub n: usize,
    correct: ModelTable<usize>,
    outcomes: LengthOutcomes,
}

impl LengthTally {
    pub fn new(n: usize, names: &[String]) -> Self {
        Self {
            n,
            correct: ModelTable::new(names),
            outcomes: ModelTable::new(names),
        }
    }

    pub fn record(&mut self, model: &str, correct: bool) -> PasskeyResult<()> {
        if correct {
            *self.correct.entry(model)? += 1;
        }
        self.outcomes.entry(model)?.push(u8::from(correct));
        Ok(())
    }

    pub fn correct(&self, model: &str) -> usize {
        self.correct.get(model).copied().unwrap_or(0)
    }

    pub fn outcomes(&self) -> &LengthOutcomes {
        &self.outcomes
    }
}

/// Everything a run produces.
#[derive(Debug)]
pub struct BenchReport {
    pub accuracies: ModelTable<Vec<f64>>,
    pub individual_results: ModelTable<Vec<LengthOutcomes>>,
    pub n_tokens: ModelTable<Vec<usize>>,
}

impl BenchReport {
    pub fn new(names: &[String]) -> Self {
        Self {
            accuracies: ModelTable::new(names),
            individual_results: ModelTable::new(names),
            n_tokens: ModelTable::new(names),
        }
    }

    pub fn record_tokens(&mut self, model: &str, tokens: usize) -> PasskeyResult<()> {
        self.n_tokens.entry(model)?.push(tokens);
        Ok(())
    }

    /// Close a context length: append each model's accuracy and the
    /// length's outcome table. Returns `(model, accuracy)` pairs.
    pub fn finish_length(
        &mut self,
        tally: &LengthTally,
        trials: usize,
    ) -> PasskeyResult<Vec<(String, f64)>> {
        let names: Vec<String> = self.accuracies.iter().map(|(n, _)| n.to_string()).collect();
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let acc = accuracy(tally.correct(&name), trials);
            self.accuracies.entry(&name)?.push(acc);
            self.individual_results
                .entry(&name)?
                .push(tally.outcomes().clone());
            out.push((name, acc));
        }
        Ok(out)
    }

    /// Write the three artifacts into `dir`. Returns the written paths.
    pub fn write_to(&self, dir: &Path) -> PasskeyResult<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(3);
        written.push(write_json(
            &dir.join(INDIVIDUAL_RESULTS_FILE),
            &self.individual_results,
        )?);
        written.push(write_json(&dir.join(ACCURACIES_FILE), &self.accuracies)?);
        written.push(write_json(&dir.join(N_TOKENS_FILE), &self.n_tokens)?);
        Ok(written)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> PasskeyResult<PathBuf> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    info!(path = %path.display(), "wrote results");
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["mem".to_string(), "base".to_string()]
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(37, 50), 74.0);
        assert_eq!(accuracy(50, 50), 100.0);
        assert_eq!(accuracy(0, 3), 0.0);
    }

    #[test]
    fn test_tally_records_per_model() {
        let mut tally = LengthTally::new(100, &names());
        tally.record("mem", true).unwrap();
        tally.record("base", false).unwrap();
        tally.record("mem", true).unwrap();
        assert_eq!(tally.correct("mem"), 2);
        assert_eq!(tally.correct("base"), 0);
        assert_eq!(tally.outcomes().get("mem"), Some(&vec![1, 1]));
        assert_eq!(tally.outcomes().get("base"), Some(&vec![0]));
        assert!(tally.record("other", true).is_err());
    }

    #[test]
    fn test_finish_length_uses_configured_trials() {
        let mut report = BenchReport::new(&names());
        let mut tally = LengthTally::new(2000, &names());
        tally.record("mem", true).unwrap();
        tally.record("base", true).unwrap();
        let accs = report.finish_length(&tally, 4).unwrap();
        assert_eq!(
            accs,
            vec![("mem".to_string(), 25.0), ("base".to_string(), 25.0)]
        );
        assert_eq!(report.accuracies.get("mem"), Some(&vec![25.0]));
        assert_eq!(report.individual_results.get("base").unwrap().len(), 1);
    }

    #[test]
    fn test_serialized_layout() {
        let names = vec!["mem".to_string()];
        let mut report = BenchReport::new(&names);
        let mut tally = LengthTally::new(100, &names);
        for ok in [true, false, true] {
            report.record_tokens("mem", 57).unwrap();
            tally.record("mem", ok).unwrap();
        }
        report.finish_length(&tally, 3).unwrap();

        let individual = serde_json::to_value(&report.individual_results).unwrap();
        assert_eq!(individual, serde_json::json!({ "mem": [ { "mem": [1, 0, 1] } ] }));
        let tokens = serde_json::to_value(&report.n_tokens).unwrap();
        assert_eq!(tokens, serde_json::json!({ "mem": [57, 57, 57] }));
    }

    #[test]
    fn test_model_order_preserved() {
        let table: ModelTable<Vec<f64>> = ModelTable::new(&["zeta".into(), "alpha".into()]);
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"{"zeta":[],"alpha":[]}"#);
    }

    #[test]
    fn test_write_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let names = vec!["mem".to_string()];
        let mut report = BenchReport::new(&names);
        let tally = LengthTally::new(100, &names);
        report.finish_length(&tally, 2).unwrap();

        let written = report.write_to(dir.path()).unwrap();
        assert_eq!(written.len(), 3);
        let acc = std::fs::read_to_string(dir.path().join(ACCURACIES_FILE)).unwrap();
        assert_eq!(acc, "{\n  \"mem\": [\n    0.0\n  ]\n}");
        assert!(dir.path().join(INDIVIDUAL_RESULTS_FILE).exists());
        assert!(dir.path().join(N_TOKENS_FILE).exists());
    }
}

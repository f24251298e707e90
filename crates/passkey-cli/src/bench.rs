//! The benchmark loop: context lengths × trials × models.
//!
//! Every trial builds one prompt and asks every pipeline about it. A
//! recoverable pipeline failure stops the current context length; the trials
//! already run still count and the accuracy keeps the configured trial count
//! as its denominator. Any other failure ends the run.

use rand::Rng;
use tracing::warn;

use passkey_core::{
    query, BenchReport, LengthTally, PasskeyError, PasskeyResult, Pipelines, Prompt,
    PromptGenerator,
};

use crate::config::RunConfig;

pub struct RunSettings {
    pub context_lengths: Vec<usize>,
    pub trials: usize,
    pub max_new_tokens: usize,
}

impl From<&RunConfig> for RunSettings {
    fn from(run: &RunConfig) -> Self {
        Self {
            context_lengths: run.context_lengths.clone(),
            trials: run.trials,
            max_new_tokens: run.max_new_tokens,
        }
    }
}

pub fn run_benchmark<R: Rng>(
    pipelines: &Pipelines,
    settings: &RunSettings,
    generator: &mut PromptGenerator<R>,
) -> PasskeyResult<BenchReport> {
    if pipelines.is_empty() {
        return Err(PasskeyError::Config("no pipelines to evaluate".into()));
    }
    let names = pipelines.names();
    let mut report = BenchReport::new(&names);

    for &n in &settings.context_lengths {
        let mut tally = LengthTally::new(n, &names);

        for i in 0..settings.trials {
            println!("\nRunning test {}/{} for n = {n}...", i + 1, settings.trials);
            let prompt = generator.generate(n)?;

            if let Err(e) = run_trial(
                pipelines,
                &prompt,
                settings.max_new_tokens,
                &mut report,
                &mut tally,
            ) {
                if !e.is_recoverable() {
                    return Err(e);
                }
                warn!(
                    error = %e,
                    n = tally.n,
                    completed = i,
                    trials = settings.trials,
                    "aborting remaining trials for this context length"
                );
                break;
            }
        }

        for (model, acc) in report.finish_length(&tally, settings.trials)? {
            println!("Accuracy {model} for n = {n}: {acc:?}%");
        }
    }

    Ok(report)
}

fn run_trial(
    pipelines: &Pipelines,
    prompt: &Prompt,
    max_new_tokens: usize,
    report: &mut BenchReport,
    tally: &mut LengthTally,
) -> PasskeyResult<()> {
    for (name, pipeline) in pipelines.iter() {
        let num_tokens = pipeline.count_tokens(&prompt.text)?;
        println!("Number of tokens in this prompt: {num_tokens}");
        report.record_tokens(name, num_tokens)?;

        let answer = query(pipeline, prompt, max_new_tokens)?;
        println!(
            "Expected number in the prompt: {}, {name} output: {answer}",
            prompt.pass_key
        );

        let correct = answer.is_correct(prompt.pass_key);
        tally.record(name, correct)?;
        println!("{}", if correct { "Success!" } else { "Fail." });
    }
    Ok(())
}

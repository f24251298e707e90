mod bench;
mod config;
mod pipelines;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use passkey_core::{PromptGenerator, SuffixSlice};

use crate::bench::{run_benchmark, RunSettings};
use crate::config::Config;

#[derive(Parser)]
#[command(
    name = "passkey",
    version,
    about = "Pass-key retrieval benchmark for long-context language models"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark over every configured model
    Run {
        /// Filler budgets in characters, comma separated
        #[arg(short, long, value_delimiter = ',')]
        lengths: Option<Vec<usize>>,

        /// Trials per context length
        #[arg(short, long)]
        trials: Option<usize>,

        /// Seed for reproducible prompts
        #[arg(short, long)]
        seed: Option<u64>,

        /// Directory for the JSON result files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Only run the named model (repeatable)
        #[arg(short, long)]
        model: Vec<String>,
    },

    /// Print one generated prompt with its planted key and value
    Prompt {
        /// Filler budget in characters
        #[arg(short, long, default_value = "2000")]
        length: usize,

        #[arg(short, long)]
        seed: Option<u64>,

        /// How the filler suffix is cut
        #[arg(long, value_enum)]
        suffix_slice: Option<SliceArg>,
    },

    /// Show the resolved configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum SliceArg {
    FromStart,
    Contiguous,
}

impl From<SliceArg> for SuffixSlice {
    fn from(arg: SliceArg) -> Self {
        match arg {
            SliceArg::FromStart => SuffixSlice::FromStart,
            SliceArg::Contiguous => SuffixSlice::Contiguous,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.clone())?;

    match cli.command {
        Commands::Run {
            lengths,
            trials,
            seed,
            output_dir,
            model,
        } => cmd_run(cfg, lengths, trials, seed, output_dir, model),
        Commands::Prompt {
            length,
            seed,
            suffix_slice,
        } => cmd_prompt(&cfg, length, seed, suffix_slice),
        Commands::Config => cmd_config(&cfg, cli.config),
    }
}

fn cmd_run(
    mut cfg: Config,
    lengths: Option<Vec<usize>>,
    trials: Option<usize>,
    seed: Option<u64>,
    output_dir: Option<PathBuf>,
    only: Vec<String>,
) -> Result<()> {
    if let Some(lengths) = lengths {
        cfg.run.context_lengths = lengths;
    }
    if let Some(trials) = trials {
        cfg.run.trials = trials;
    }
    if seed.is_some() {
        cfg.run.seed = seed;
    }
    if let Some(dir) = output_dir {
        cfg.run.output_dir = dir;
    }
    cfg.validate()?;

    let mut models = cfg.models();
    if !only.is_empty() {
        if let Some(missing) = only.iter().find(|name| !models.iter().any(|m| &m.name == *name)) {
            bail!("no model named {missing:?} in config");
        }
        models.retain(|m| only.contains(&m.name));
    }

    let cache_dir = cfg.cache_dir();
    let pipelines = pipelines::load_pipelines(&models, cache_dir.as_deref())?;

    let mut generator = PromptGenerator::from_seed(cfg.run.seed, cfg.run.suffix_slice);
    info!(
        lengths = ?cfg.run.context_lengths,
        trials = cfg.run.trials,
        models = pipelines.len(),
        "starting benchmark"
    );
    let report = run_benchmark(&pipelines, &RunSettings::from(&cfg.run), &mut generator)?;

    let written = report
        .write_to(&cfg.run.output_dir)
        .with_context(|| format!("writing results to {}", cfg.run.output_dir.display()))?;
    println!();
    for path in written {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn cmd_prompt(
    cfg: &Config,
    length: usize,
    seed: Option<u64>,
    suffix_slice: Option<SliceArg>,
) -> Result<()> {
    let slice = suffix_slice.map_or(cfg.run.suffix_slice, SuffixSlice::from);
    let mut generator = PromptGenerator::from_seed(seed.or(cfg.run.seed), slice);
    let prompt = generator.generate(length)?;

    println!("{}", prompt.text);
    println!();
    println!("key:   {}", prompt.information_key);
    println!("value: {}", prompt.pass_key);
    Ok(())
}

fn cmd_config(cfg: &Config, explicit: Option<PathBuf>) -> Result<()> {
    println!("Config: {}", config::show_config_path(explicit));
    println!();
    let effective = Config {
        run: cfg.run.clone(),
        cache: config::CacheConfig {
            dir: cfg.cache_dir(),
        },
        models: cfg.models(),
    };
    print!(
        "{}",
        toml::to_string_pretty(&effective).context("rendering config")?
    );
    Ok(())
}

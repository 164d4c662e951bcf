//! rustbuzz - arXiv Buzzword Frequency Pipeline
//!
//! Counts buzzwords in arXiv abstracts per quarter and tests whether their
//! usage changed after a cutoff quarter.
//!
//! ## Usage
//!
//! ```bash
//! rustbuzz fetch --categories "cs.*,hep-*" --start-year 2019 --end-year 2025
//! rustbuzz compare --cutoff 2023-Q1
//! rustbuzz combine
//! rustbuzz run
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rustbuzz::{pipeline, Config, Quarter};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// arXiv Buzzword Frequency Pipeline
#[derive(Parser)]
#[command(name = "rustbuzz")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Config file (TOML); defaults to <config dir>/rustbuzz/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch abstracts from arXiv and write quarterly data CSVs
    Fetch {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Aggregate a local records CSV (text,published,category)
    Aggregate {
        /// Records CSV
        #[arg(short, long)]
        input: PathBuf,

        /// Category the records belong to (names the output file)
        #[arg(long)]
        category: String,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Run before/after z-tests on every data CSV
    Compare {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Combine z-test results into a factor table and significant words
    Combine {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Fetch, compare and combine in one go
    Run {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Command-line overrides applied on top of the loaded config
#[derive(Args)]
struct Overrides {
    /// Category queries, comma separated (e.g. "cs.*,hep-*")
    #[arg(long, value_delimiter = ',')]
    categories: Option<Vec<String>>,

    /// First year to fetch
    #[arg(long)]
    start_year: Option<i32>,

    /// Last year to fetch
    #[arg(long)]
    end_year: Option<i32>,

    /// Stop fetching after this quarter (e.g. 2025-Q2)
    #[arg(long)]
    last_quarter: Option<Quarter>,

    /// First quarter of the "after" epoch (e.g. 2023-Q1)
    #[arg(long)]
    cutoff: Option<Quarter>,

    /// Seconds to wait after each API page
    #[arg(long)]
    delay: Option<f64>,

    /// Directory for data CSVs
    #[arg(long)]
    database_dir: Option<PathBuf>,

    /// Directory for z-test outputs
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(categories) = self.categories {
            config.categories = categories;
        }
        if let Some(year) = self.start_year {
            config.start_year = year;
        }
        if let Some(year) = self.end_year {
            config.end_year = year;
        }
        if let Some(quarter) = self.last_quarter {
            config.last_quarter = Some(quarter);
        }
        if let Some(cutoff) = self.cutoff {
            config.cutoff = cutoff;
        }
        if let Some(delay) = self.delay {
            config.request_delay_secs = delay;
        }
        if let Some(dir) = self.database_dir {
            config.database_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let base = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let load = |overrides: Overrides| -> Result<Config> {
        let mut config = base.clone();
        overrides.apply(&mut config);
        config.validate().context("Invalid configuration")?;
        debug!(config = ?config, "Effective configuration");
        Ok(config)
    };

    match cli.command {
        Commands::Fetch { overrides } => run_fetch(&load(overrides)?).await,
        Commands::Aggregate {
            input,
            category,
            overrides,
        } => run_aggregate(&load(overrides)?, input, category),
        Commands::Compare { overrides } => run_compare(&load(overrides)?),
        Commands::Combine { overrides } => run_combine(&load(overrides)?),
        Commands::Run { overrides } => {
            let config = load(overrides)?;
            run_fetch(&config).await?;
            run_compare(&config)?;
            run_combine(&config)
        }
        Commands::Config { overrides } => {
            let config = load(overrides)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

// ============================================================================
// Stages
// ============================================================================

async fn run_fetch(config: &Config) -> Result<()> {
    println!("\n--- Stage 1: Fetch & Aggregate ---");
    let written = pipeline::run_fetch(config)
        .await
        .context("Fetch stage failed")?;
    println!("Wrote {} data file(s)", written.len());
    Ok(())
}

fn run_aggregate(config: &Config, input: PathBuf, category: String) -> Result<()> {
    println!("\n--- Aggregate: {} ---", input.display());
    match pipeline::aggregate_file(config, &input, &category)
        .with_context(|| format!("Failed to aggregate {}", input.display()))?
    {
        Some(path) => println!("Saved to {}", path.display()),
        None => println!("No records in {}", input.display()),
    }
    Ok(())
}

fn run_compare(config: &Config) -> Result<()> {
    println!("\n--- Stage 2: Before/After Comparison (cutoff {}) ---", config.cutoff);
    let written = pipeline::run_compare(config).context("Compare stage failed")?;
    println!("Wrote {} z-test file(s)", written.len());
    Ok(())
}

fn run_combine(config: &Config) -> Result<()> {
    println!("\n--- Stage 3: Combine Categories ---");
    let summary = pipeline::run_combine(config).context("Combine stage failed")?;
    for word in &summary.significant_words {
        println!("  {}", word);
    }
    println!("\n✓ Pipeline complete. Results in: {}", config.output_dir.display());
    Ok(())
}

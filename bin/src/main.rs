//! CLI for the screener library.
//!
//! Reads a long-format price CSV, runs the score or outlier pipeline and
//! writes the resulting table back to CSV.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use polars::prelude::*;
use screener::{
    ConfigurableEngine, Normalization, OutlierDetector, PipelineConfig, ScreenerPipeline,
    StoreConfig, TimeSeriesStore,
};
use std::{
    fs::File,
    path::{Path, PathBuf},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "screener")]
#[command(about = "Return scoring and robust outlier detection for equity universes", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every symbol trading on the reference date
    Score {
        /// Input CSV with symbol, date, close and optional volume/status/fincode/isin
        input: PathBuf,
        /// Output CSV path
        #[arg(short, long)]
        output: PathBuf,
        /// JSON pipeline configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Normalization method: percentile, zscore or minmax
        #[arg(long)]
        normalization: Option<String>,
        /// Reference date (YYYY-MM-DD); defaults to the latest date in the input
        #[arg(long)]
        reference_date: Option<NaiveDate>,
        /// Drop ETFs and commodity trackers by symbol pattern
        #[arg(long)]
        exclude_defaults: bool,
    },
    /// Flag anomalous daily moves with robust z-scores
    Outliers {
        /// Input CSV with symbol, date and close
        input: PathBuf,
        /// Output CSV path for per-date flags
        #[arg(short, long)]
        output: PathBuf,
        /// Optional CSV path for per-symbol descriptive statistics
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Restrict the run to one symbol
        #[arg(long)]
        symbol: Option<String>,
        /// JSON pipeline configuration (the `outlier` and `store` sections apply)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Ignore observations before this date (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<NaiveDate>,
    },
    /// List the per-symbol engines
    Engines,
    /// Print the default configuration as JSON
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Score {
            input,
            output,
            config,
            normalization,
            reference_date,
            exclude_defaults,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(name) = normalization {
                config.scoring.normalization = name.parse::<Normalization>()?;
            }
            if reference_date.is_some() {
                config.reference_date = reference_date;
            }
            if exclude_defaults {
                config.store.exclusion_patterns =
                    StoreConfig::with_default_exclusions().exclusion_patterns;
            }
            score(&input, &output, config)
        }
        Commands::Outliers {
            input,
            output,
            snapshot,
            symbol,
            config,
            start_date,
        } => {
            let mut config = load_config(config.as_deref())?;
            if start_date.is_some() {
                config.outlier.start_date = start_date;
            }
            outliers(&input, &output, snapshot.as_deref(), symbol.as_deref(), config)
        }
        Commands::Engines => {
            list_engines();
            Ok(())
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("Unable to open {}", path.display()))?;
            serde_json::from_reader(file)
                .with_context(|| format!("Invalid configuration in {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn read_prices(path: &Path, config: &StoreConfig) -> Result<TimeSeriesStore> {
    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .finish()
        .and_then(LazyFrame::collect)
        .with_context(|| format!("Unable to read {}", path.display()))?;
    info!(rows = df.height(), path = %path.display(), "Loaded input");
    Ok(TimeSeriesStore::from_frame(&df, config)?)
}

fn write_csv(path: &Path, df: &mut DataFrame) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Unable to create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(rows = df.height(), path = %path.display(), "Wrote output");
    Ok(())
}

fn score(input: &Path, output: &Path, config: PipelineConfig) -> Result<()> {
    let store = read_prices(input, &config.store)?;
    let pipeline = ScreenerPipeline::new(config)?;
    let report = pipeline.run(&store).context("Screening run failed")?;

    let mut df = report.to_frame()?;
    write_csv(output, &mut df)?;

    println!(
        "Scored {} symbols as of {}",
        report.records().iter().filter(|r| r.raw_score.is_some()).count(),
        report.reference_date()
    );
    Ok(())
}

fn outliers(
    input: &Path,
    output: &Path,
    snapshot: Option<&Path>,
    symbol: Option<&str>,
    config: PipelineConfig,
) -> Result<()> {
    let mut store = read_prices(input, &config.store)?;
    if let Some(symbol) = symbol {
        store = store.retain_symbols(&[symbol]);
        if store.is_empty() {
            bail!("Symbol {symbol} not found in {}", input.display());
        }
    }

    let detector = OutlierDetector::with_config(config.outlier);
    let report = detector
        .detect_all(&store)
        .context("Outlier detection failed")?;

    let mut rows = report.rows_frame()?;
    write_csv(output, &mut rows)?;
    if let Some(path) = snapshot {
        let mut snaps = report.snapshot_frame()?;
        write_csv(path, &mut snaps)?;
    }

    println!(
        "Analyzed {} symbols, {} flagged rows",
        report.symbols().len(),
        report.flagged_count()
    );
    Ok(())
}

/// Print every engine with its inputs.
fn list_engines() {
    let pipeline = ScreenerPipeline::default();
    let engines = pipeline.engines();

    println!("Available engines ({} total)\n", engines.len());
    for info in engines {
        println!("{} - {}", info.name, info.description);
        println!("  Lookback: {} days", info.lookback_days);
        println!("  Required columns: {}", info.required_columns.join(", "));
        println!();
    }
}

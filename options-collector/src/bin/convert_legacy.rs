//! Legacy CSV converter
//!
//! Converts per-symbol, per-day CSV files in the legacy collector layout into
//! Parquet datasets at `<dest>/<symbol>/<date>.parquet`.
//!
//! # Usage
//!
//! ```bash
//! # Convert a directory of old files (quote the glob so the tool expands it)
//! convert-legacy '~/options/csv/*.csv' --dest data/options
//!
//! # Push to object storage with 8 workers, replacing existing datasets
//! ENDPOINT_URL=http://localhost:9000 convert-legacy 'old/*.csv*' \
//!     --dest s3://market/options --parallelism 8 --overwrite
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use options_collector::convert::{expand_inputs, DEFAULT_PARALLELISM};
use options_collector::{
    CollectorConfig, ConvertSummary, DatasetWriter, LegacyConverter, OutputFormat, StorageRoot,
    StrikeEncoding, TableOptions,
};

/// Legacy CSV to Parquet converter CLI.
#[derive(Parser)]
#[command(name = "convert-legacy")]
#[command(about = "Convert legacy options CSV files to Parquet datasets")]
struct Cli {
    /// CSV files to convert (glob patterns and ~ allowed)
    #[arg(required = true)]
    file: Vec<String>,

    /// How many files to convert at a time
    #[arg(long, default_value_t = DEFAULT_PARALLELISM)]
    parallelism: usize,

    /// Directory or s3://bucket/prefix where converted datasets are saved
    #[arg(long, default_value = ".")]
    dest: String,

    /// Replace datasets that already exist
    #[arg(long)]
    overwrite: bool,

    /// Store strikes as truncated Int16, matching older datasets
    #[arg(long)]
    legacy_strike: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("options_collector=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    if cli.parallelism == 0 {
        bail!("--parallelism must be at least 1");
    }

    let files = expand_inputs(&cli.file)?;
    if files.is_empty() {
        warn!("Nothing to convert");
        return Ok(());
    }

    let config = CollectorConfig::from_env();
    let root = StorageRoot::parse(&cli.dest)?;
    let writer = DatasetWriter::new(root.open(&config.object_store), OutputFormat::Parquet);
    let table_options = TableOptions {
        strike: if cli.legacy_strike {
            StrikeEncoding::LegacyInt16
        } else {
            StrikeEncoding::Exact
        },
    };
    let converter = LegacyConverter::new(writer, tokio::runtime::Handle::current())
        .with_overwrite(cli.overwrite)
        .with_table_options(table_options);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_message("Processing");

    // The worker pool blocks on storage calls, so keep it off the runtime threads
    let parallelism = cli.parallelism;
    let (results, pb) = tokio::task::spawn_blocking(move || {
        let results = converter.convert_all(&files, parallelism, &pb);
        (results, pb)
    })
    .await
    .context("Converter pool panicked")?;
    let results = results?;
    pb.finish_with_message("done");

    let summary = ConvertSummary::from_results(&results);
    info!(
        written = summary.written,
        skipped = summary.skipped,
        failed = summary.failed,
        "Conversion complete"
    );

    if summary.failed > 0 {
        bail!("{} of {} files failed to convert", summary.failed, results.len());
    }
    Ok(())
}

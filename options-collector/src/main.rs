//! Options chain collector.
//!
//! # Usage
//!
//! ```bash
//! # One symbol, right now
//! options-collector --option SPY
//!
//! # Every symbol in a list, right now, into a bucket
//! options-collector --symbol-file symbols.txt --now --destination s3://market/options
//!
//! # Every weekday at 21:00 local time, emailing a summary
//! EMAIL_USER=me@example.com EMAIL_PWD=... options-collector -f symbols.txt --email
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, ValueEnum};
use tracing::{error, info};

use options_collector::collector::BatchHook;
use options_collector::{
    ChainProvider, CollectorConfig, DailySchedule, DatasetWriter, EmailNotifier, ObservationDate,
    OptionsCollector, OutputFormat, RestChainClient, StorageRoot, StrikeEncoding, TableOptions,
    TickerClient,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProviderKind {
    /// Finance-ticker options endpoint, no key required
    Ticker,
    /// REST chain API, requires OPTIONS_API_KEY
    Rest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Parquet,
    Csv,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Parquet => OutputFormat::Parquet,
            FormatArg::Csv => OutputFormat::Csv,
        }
    }
}

#[derive(Parser)]
#[command(name = "options-collector")]
#[command(about = "Collect daily options chains into per-symbol datasets")]
#[command(version)]
#[command(group(ArgGroup::new("input").required(true).args(["option", "symbol_file"])))]
struct Cli {
    /// Collect a single underlying symbol's chain and exit
    #[arg(short = 's', long, value_name = "SYMBOL")]
    option: Option<String>,

    /// File of symbols, one per line
    #[arg(short = 'f', long, value_name = "PATH")]
    symbol_file: Option<PathBuf>,

    /// Email a summary after each batch (requires EMAIL_USER and EMAIL_PWD)
    #[arg(short, long)]
    email: bool,

    /// Observation date to record instead of today (YYYY-MM-DD)
    #[arg(short, long)]
    date: Option<String>,

    /// Run the batch once now instead of waiting for the daily run
    #[arg(long)]
    now: bool,

    /// Hour of day (0-23, local time) for the daily run
    #[arg(long, default_value_t = 21)]
    due: u32,

    /// Directory or s3://bucket/prefix where datasets are saved
    #[arg(long, default_value = ".")]
    destination: String,

    /// Market data provider
    #[arg(long, value_enum, default_value_t = ProviderKind::Ticker)]
    provider: ProviderKind,

    /// Dataset file format
    #[arg(long, value_enum, default_value_t = FormatArg::Parquet)]
    format: FormatArg,

    /// Store strikes as truncated Int16, matching older datasets
    #[arg(long)]
    legacy_strike: bool,
}

fn build_provider(kind: ProviderKind, config: &CollectorConfig) -> Result<Arc<dyn ChainProvider>> {
    Ok(match kind {
        ProviderKind::Ticker => Arc::new(TickerClient::new()?),
        ProviderKind::Rest => {
            let api_key = config.require_api_key()?.to_string();
            let client = match &config.api_url {
                Some(url) => RestChainClient::with_base_url(api_key, url.clone())?,
                None => RestChainClient::new(api_key)?,
            };
            Arc::new(client)
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("options_collector=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = CollectorConfig::from_env();

    // Everything that can be misconfigured fails here, before any fetch
    let email_hook: Option<Arc<dyn BatchHook>> = if cli.email {
        Some(Arc::new(EmailNotifier::new(config.require_email()?)))
    } else {
        None
    };
    let provider = build_provider(cli.provider, &config)?;
    let schedule = DailySchedule::at_hour(cli.due)?;
    let date = match &cli.date {
        Some(d) => ObservationDate::parse(d).context("Invalid date format, expected YYYY-MM-DD")?,
        None => ObservationDate::today(),
    };

    let root = StorageRoot::parse(&cli.destination)?;
    let writer = DatasetWriter::new(root.open(&config.object_store), cli.format.into());
    let table_options = TableOptions {
        strike: if cli.legacy_strike {
            StrikeEncoding::LegacyInt16
        } else {
            StrikeEncoding::Exact
        },
    };

    let mut collector = OptionsCollector::new(provider, writer, date).with_table_options(table_options);
    if let Some(hook) = email_hook {
        collector = collector.with_hook(hook);
    }

    if let Some(symbol) = &cli.option {
        let count = collector.option_chain(symbol).await;
        info!(symbol = %symbol, contracts = count, "Collected options chain");
        return Ok(());
    }

    let symbol_file = cli
        .symbol_file
        .context("--symbol-file is required without --option")?;

    if cli.now {
        collector.batch_process(&symbol_file).await?;
        return Ok(());
    }

    info!(hour = cli.due, symbols = %symbol_file.display(), "Waiting for daily run");
    let collector = &collector;
    let symbol_file = &symbol_file;
    schedule
        .run(
            |today| async move {
                if let Err(e) = collector.batch_process_on(symbol_file, today).await {
                    error!(error = %e, "Scheduled batch failed");
                }
            },
            async {
                let _ = tokio::signal::ctrl_c().await;
            },
        )
        .await;

    Ok(())
}

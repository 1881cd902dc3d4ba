//! Legacy CSV to Parquet bulk converter.
//!
//! Each input file holds one symbol's chain for one day in the legacy CSV
//! layout. Files convert independently on a fixed-size worker pool; an output
//! that already exists is left alone unless overwriting is requested.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use indicatif::ProgressBar;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Deserialize;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::data::{parse_expiration, ContractRecord, Greeks, ObservationDate, OptionType};
use crate::provider::de::parse_flag;
use crate::storage::{expand_home, DatasetWriter, StorageError};
use crate::table::{ChainTable, TableError, TableOptions};

pub const DEFAULT_PARALLELISM: usize = 4;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("{} has no data rows", .0.display())]
    EmptyFile(PathBuf),

    #[error("Cannot derive a symbol from {}", .0.display())]
    InvalidFileName(PathBuf),

    #[error("{}:{line}: {reason}", path.display())]
    InvalidRow {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertOutcome {
    Written { location: String, rows: usize },
    Skipped(String),
}

/// Counts over a finished conversion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ConvertSummary {
    pub fn from_results(results: &[(PathBuf, Result<ConvertOutcome, ConvertError>)]) -> Self {
        let mut summary = Self::default();
        for (_, result) in results {
            match result {
                Ok(ConvertOutcome::Written { .. }) => summary.written += 1,
                Ok(ConvertOutcome::Skipped(_)) => summary.skipped += 1,
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }
}

/// Map a legacy header to its canonical column name. Matching ignores case.
pub fn canonical_column(name: &str) -> String {
    let lower = name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase();
    match lower.as_str() {
        "theoreticalvol" => "theoretical_vol".to_string(),
        "nonstandard" => "non_standard".to_string(),
        _ => lower,
    }
}

/// Symbol encoded in a legacy file name: the basename up to `.csv`.
pub fn symbol_from_path(path: &Path) -> Result<String, ConvertError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ConvertError::InvalidFileName(path.to_path_buf()))?;

    let symbol = match name.to_ascii_lowercase().find(".csv") {
        Some(idx) => &name[..idx],
        None => name.split('.').next().unwrap_or(name),
    };

    if symbol.is_empty() {
        return Err(ConvertError::InvalidFileName(path.to_path_buf()));
    }
    Ok(symbol.to_string())
}

/// Expand `~` and glob patterns into concrete paths, in pattern order.
pub fn expand_inputs(patterns: &[String]) -> Result<Vec<PathBuf>, ConvertError> {
    let mut files = Vec::new();
    for pattern in patterns {
        let expanded = expand_home(pattern);
        let before = files.len();
        for entry in glob::glob(&expanded.to_string_lossy())? {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => warn!(pattern = %pattern, error = %e, "Unreadable path"),
            }
        }
        if files.len() == before {
            warn!(pattern = %pattern, "No files matched");
        }
    }
    Ok(files)
}

/// One legacy CSV row, after header canonicalization.
#[derive(Debug, Deserialize)]
struct LegacyCsvRow {
    date: String,
    expiration: String,
    strike: String,
    #[serde(rename = "type")]
    option_type: String,
    symbol: String,
    #[serde(default)]
    bid: Option<String>,
    #[serde(default)]
    ask: Option<String>,
    #[serde(default)]
    last: Option<String>,
    #[serde(default)]
    volume: Option<String>,
    #[serde(default)]
    openint: Option<String>,
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    gamma: Option<String>,
    #[serde(default)]
    theta: Option<String>,
    #[serde(default)]
    vega: Option<String>,
    #[serde(default)]
    rho: Option<String>,
    #[serde(default)]
    impvol: Option<String>,
    #[serde(default)]
    theoretical_vol: Option<String>,
    #[serde(default)]
    non_standard: Option<String>,
}

fn number(field: &Option<String>) -> Option<f64> {
    field
        .as_deref()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    s.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .or_else(|| parse_expiration(s))
}

impl LegacyCsvRow {
    fn into_record(self) -> Result<ContractRecord, String> {
        let date = parse_date(&self.date).ok_or_else(|| format!("invalid date {:?}", self.date))?;
        let expiration = parse_expiration(&self.expiration)
            .ok_or_else(|| format!("invalid expiration {:?}", self.expiration))?;
        let strike = self
            .strike
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("invalid strike {:?}", self.strike))?;
        let option_type = OptionType::from_str(&self.option_type)
            .ok_or_else(|| format!("invalid type {:?}", self.option_type))?;

        Ok(ContractRecord {
            date,
            expiration,
            strike,
            option_type,
            bid: number(&self.bid),
            ask: number(&self.ask),
            last: number(&self.last),
            volume: number(&self.volume).map(|v| v as i64),
            openint: number(&self.openint).map(|v| v as i64),
            last_trade: None,
            greeks: Greeks {
                delta: number(&self.delta),
                gamma: number(&self.gamma),
                theta: number(&self.theta),
                vega: number(&self.vega),
                rho: number(&self.rho),
                impvol: number(&self.impvol),
                theoretical_vol: number(&self.theoretical_vol),
            },
            non_standard: self.non_standard.as_deref().and_then(parse_flag),
            symbol: self.symbol,
        })
    }
}

/// Read every row of a legacy CSV file into contract records.
pub fn read_legacy_csv(path: &Path) -> Result<Vec<ContractRecord>, ConvertError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: csv::StringRecord = reader.headers()?.iter().map(canonical_column).collect();
    reader.set_headers(headers);

    let mut records = Vec::new();
    for (idx, row) in reader.deserialize::<LegacyCsvRow>().enumerate() {
        let record = row?.into_record().map_err(|reason| ConvertError::InvalidRow {
            path: path.to_path_buf(),
            // 1-based, after the header line
            line: idx + 2,
            reason,
        })?;
        records.push(record);
    }
    Ok(records)
}

pub struct LegacyConverter {
    writer: DatasetWriter,
    handle: Handle,
    table_options: TableOptions,
    overwrite: bool,
}

impl LegacyConverter {
    /// `handle` runs storage calls from the worker pool threads.
    pub fn new(writer: DatasetWriter, handle: Handle) -> Self {
        Self {
            writer,
            handle,
            table_options: TableOptions::default(),
            overwrite: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_table_options(mut self, options: TableOptions) -> Self {
        self.table_options = options;
        self
    }

    /// Convert one file to `<dest>/<symbol>/<date>.<ext>`, the date taken
    /// from the first row.
    pub async fn convert_file(&self, path: &Path) -> Result<ConvertOutcome, ConvertError> {
        let symbol = symbol_from_path(path)?;
        let records = read_legacy_csv(path)?;
        let date = records
            .first()
            .map(|r| ObservationDate::new(r.date))
            .ok_or_else(|| ConvertError::EmptyFile(path.to_path_buf()))?;

        if !self.overwrite && self.writer.exists(&symbol, date).await? {
            let location = self.writer.location(&symbol, date);
            warn!(location = %location, "Dataset already exists, skipping");
            return Ok(ConvertOutcome::Skipped(location));
        }

        let table = ChainTable::build(&records, date.date(), self.table_options)?;
        let location = self.writer.save(&table, &symbol).await?;
        debug!(file = %path.display(), location = %location, rows = table.len(), "Converted");

        Ok(ConvertOutcome::Written {
            location,
            rows: table.len(),
        })
    }

    /// Convert `files` on a pool of `min(parallelism, files)` threads.
    /// Blocking: call from outside the async runtime's worker threads.
    pub fn convert_all(
        &self,
        files: &[PathBuf],
        parallelism: usize,
        progress: &ProgressBar,
    ) -> Result<Vec<(PathBuf, Result<ConvertOutcome, ConvertError>)>, ConvertError> {
        let threads = parallelism.min(files.len()).max(1);
        let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;
        info!(files = files.len(), threads, "Converting legacy files");

        let results = pool.install(|| {
            files
                .par_iter()
                .map(|path| {
                    let result = self.handle.block_on(self.convert_file(path));
                    if let Err(e) = &result {
                        error!(file = %path.display(), error = %e, "Conversion failed");
                    }
                    progress.inc(1);
                    (path.clone(), result)
                })
                .collect()
        });

        Ok(results)
    }
}

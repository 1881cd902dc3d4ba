//! Collection orchestrator.
//!
//! Drives fetch, normalize, build and save for one symbol at a time. A symbol
//! that fails at any stage is logged and counted as zero contracts; it never
//! stops the rest of a batch.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::data::ObservationDate;
use crate::normalize::NormalizeError;
use crate::notify::NotifyError;
use crate::provider::{ChainProvider, ProviderError};
use crate::storage::{DatasetWriter, StorageError};
use crate::table::{ChainTable, TableError, TableOptions};
use crate::validation::check_records;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to read symbol list {path}: {source}")]
    SymbolList {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Per-symbol contract counts for one batch, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub date: ObservationDate,
    pub results: Vec<(String, usize)>,
}

impl BatchReport {
    pub fn total_contracts(&self) -> usize {
        self.results.iter().map(|(_, count)| count).sum()
    }

    pub fn symbol_count(&self) -> usize {
        self.results.len()
    }

    /// Symbols that produced no contracts.
    pub fn empty_symbols(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, count)| *count == 0)
            .map(|(symbol, _)| symbol.as_str())
            .collect()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Options collection for {}", self.date)?;
        for (symbol, count) in &self.results {
            writeln!(f, "{}: {}", symbol, count)?;
        }
        write!(
            f,
            "Total: {} contracts across {} symbols",
            self.total_contracts(),
            self.symbol_count()
        )
    }
}

/// Invoked with the aggregated results after every batch.
#[async_trait]
pub trait BatchHook: Send + Sync {
    fn name(&self) -> &'static str;

    async fn after_batch(&self, report: &BatchReport) -> Result<(), NotifyError>;
}

/// Read a symbol list: one symbol per line, whitespace trimmed, blank lines
/// skipped, order and duplicates kept.
pub fn parse_symbol_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct OptionsCollector {
    provider: Arc<dyn ChainProvider>,
    writer: DatasetWriter,
    table_options: TableOptions,
    date: ObservationDate,
    hooks: Vec<Arc<dyn BatchHook>>,
}

impl OptionsCollector {
    pub fn new(provider: Arc<dyn ChainProvider>, writer: DatasetWriter, date: ObservationDate) -> Self {
        Self {
            provider,
            writer,
            table_options: TableOptions::default(),
            date,
            hooks: Vec::new(),
        }
    }

    pub fn with_table_options(mut self, options: TableOptions) -> Self {
        self.table_options = options;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn BatchHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn date(&self) -> ObservationDate {
        self.date
    }

    /// Observation date used for both the output path and the `date` column.
    pub fn set_date(&mut self, date: ObservationDate) {
        self.date = date;
    }

    /// Collect one symbol on the collector's date. Returns the number of
    /// contracts written, 0 on any failure.
    pub async fn option_chain(&self, symbol: &str) -> usize {
        self.option_chain_on(symbol, self.date).await
    }

    /// Collect one symbol on an explicit date.
    pub async fn option_chain_on(&self, symbol: &str, date: ObservationDate) -> usize {
        match self.try_option_chain(symbol, date).await {
            Ok(count) => count,
            Err(e) => {
                error!(symbol, date = %date, error = %e, "Failed to collect options chain");
                0
            }
        }
    }

    /// Full pipeline for one symbol, with errors surfaced.
    pub async fn try_option_chain(
        &self,
        symbol: &str,
        date: ObservationDate,
    ) -> Result<usize, CollectorError> {
        let raw = self.provider.fetch_chain(symbol).await?;
        let records = raw.normalize(date)?;

        let report = check_records(symbol, date, &records);
        report.log_warnings();

        if records.is_empty() {
            return Ok(0);
        }

        let table = ChainTable::build(&records, date.date(), self.table_options)?;
        let location = self.writer.save(&table, symbol).await?;

        info!(
            symbol,
            provider = self.provider.name(),
            contracts = table.len(),
            location = %location,
            "Saved options chain"
        );
        Ok(table.len())
    }

    /// Collect every symbol listed in `path` on the collector's date.
    pub async fn batch_process(&self, path: &Path) -> Result<BatchReport, CollectorError> {
        self.batch_process_on(path, self.date).await
    }

    pub async fn batch_process_on(
        &self,
        path: &Path,
        date: ObservationDate,
    ) -> Result<BatchReport, CollectorError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CollectorError::SymbolList {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(self.batch_symbols(&parse_symbol_list(&contents), date).await)
    }

    /// Collect `symbols` sequentially, then run every post-batch hook.
    pub async fn batch_symbols(&self, symbols: &[String], date: ObservationDate) -> BatchReport {
        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let count = self.option_chain_on(symbol, date).await;
            results.push((symbol.clone(), count));
        }

        let report = BatchReport { date, results };
        info!(
            date = %date,
            symbols = report.symbol_count(),
            contracts = report.total_contracts(),
            "Batch complete"
        );
        let empty = report.empty_symbols();
        if !empty.is_empty() {
            warn!(symbols = ?empty, "Symbols with no contracts");
        }

        for hook in &self.hooks {
            if let Err(e) = hook.after_batch(&report).await {
                warn!(hook = hook.name(), error = %e, "Post-batch hook failed");
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChainResponse, RawChain};
    use crate::storage::{LocalStore, OutputFormat};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Serves a fixed two-contract chain, failing for one symbol.
    struct StubProvider {
        failing: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChainProvider for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn fetch_chain(&self, symbol: &str) -> Result<RawChain, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if symbol == self.failing {
                return Err(ProviderError::InvalidResponse("connection reset".to_string()));
            }
            let raw: ChainResponse = serde_json::from_str(&format!(
                r#"{{
                    "symbol": "{symbol}",
                    "status": "SUCCESS",
                    "putExpDateMap": {{"2024-06-21:20": {{"150.0": [{{"symbol": "{symbol}_P150"}}]}}}},
                    "callExpDateMap": {{"2024-06-21:20": {{"150.0": [{{"symbol": "{symbol}_C150"}}]}}}}
                }}"#
            ))
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
            Ok(RawChain::NestedMap(raw))
        }
    }

    #[derive(Default)]
    struct RecordingHook {
        seen: Mutex<Vec<BatchReport>>,
    }

    #[async_trait]
    impl BatchHook for RecordingHook {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn after_batch(&self, report: &BatchReport) -> Result<(), NotifyError> {
            self.seen.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    struct FailingHook;

    #[async_trait]
    impl BatchHook for FailingHook {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn after_batch(&self, _report: &BatchReport) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("relay unreachable".to_string()))
        }
    }

    fn date() -> ObservationDate {
        ObservationDate::parse("2024-06-03").unwrap()
    }

    fn collector(root: &Path, failing: &'static str) -> OptionsCollector {
        let provider = Arc::new(StubProvider {
            failing,
            calls: AtomicUsize::new(0),
        });
        let writer = DatasetWriter::new(Arc::new(LocalStore::new(root)), OutputFormat::Parquet);
        OptionsCollector::new(provider, writer, date())
    }

    #[test]
    fn test_parse_symbol_list() {
        let symbols = parse_symbol_list("SPY\n\n  QQQ \r\n\t\nSPY\n");
        assert_eq!(symbols, vec!["SPY", "QQQ", "SPY"]);
    }

    #[tokio::test]
    async fn test_option_chain_writes_dataset() {
        let dir = tempdir().unwrap();
        let collector = collector(dir.path(), "");

        assert_eq!(collector.option_chain("SPY").await, 2);
        assert!(dir.path().join("SPY/2024-06-03.parquet").exists());
    }

    #[tokio::test]
    async fn test_failure_is_zero_and_writes_nothing() {
        let dir = tempdir().unwrap();
        let collector = collector(dir.path(), "BAD");

        assert_eq!(collector.option_chain("BAD").await, 0);
        assert!(!dir.path().join("BAD").exists());
    }

    #[tokio::test]
    async fn test_set_date_changes_output_path() {
        let dir = tempdir().unwrap();
        let mut collector = collector(dir.path(), "");
        collector.set_date(ObservationDate::parse("2023-12-29").unwrap());

        collector.option_chain("SPY").await;
        assert!(dir.path().join("SPY/2023-12-29.parquet").exists());
    }

    #[tokio::test]
    async fn test_batch_continues_past_failed_symbol() {
        let dir = tempdir().unwrap();
        let list = dir.path().join("symbols.txt");
        std::fs::write(&list, "SPY\nBAD\n\nQQQ\n").unwrap();

        let hook = Arc::new(RecordingHook::default());
        let collector = collector(dir.path(), "BAD")
            .with_hook(Arc::new(FailingHook))
            .with_hook(hook.clone());

        let report = collector.batch_process(&list).await.unwrap();
        assert_eq!(
            report.results,
            vec![
                ("SPY".to_string(), 2),
                ("BAD".to_string(), 0),
                ("QQQ".to_string(), 2)
            ]
        );
        assert_eq!(report.total_contracts(), 4);
        assert_eq!(report.empty_symbols(), vec!["BAD"]);

        // A failing hook does not stop the next one
        let seen = hook.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], report);
    }

    #[tokio::test]
    async fn test_missing_symbol_list_is_error() {
        let dir = tempdir().unwrap();
        let collector = collector(dir.path(), "");
        let err = collector
            .batch_process(&dir.path().join("missing.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectorError::SymbolList { .. }));
    }

    #[test]
    fn test_report_rendering() {
        let report = BatchReport {
            date: date(),
            results: vec![("SPY".to_string(), 1200), ("BAD".to_string(), 0)],
        };
        assert_eq!(
            report.to_string(),
            "Options collection for 2024-06-03\nSPY: 1200\nBAD: 0\nTotal: 1200 contracts across 2 symbols"
        );
    }
}

//! Dataset persistence.
//!
//! A dataset is addressed by `<root>/<symbol>/<date>.<ext>` and written in one
//! piece: the file is encoded into a local buffer first, then handed to the
//! storage capability as a single object.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use polars::prelude::*;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::ObjectStoreSettings;
use crate::data::ObservationDate;
use crate::table::{ChainTable, TableError};

/// Brotli quality used for every Parquet dataset.
pub const BROTLI_LEVEL: u32 = 5;

/// Header row of the legacy CSV format.
pub const LEGACY_CSV_HEADER: [&str; 18] = [
    "Date",
    "Expiration",
    "Strike",
    "Type",
    "Symbol",
    "Bid",
    "Ask",
    "Last",
    "Volume",
    "OpenInt",
    "Delta",
    "Gamma",
    "Theta",
    "Vega",
    "Rho",
    "ImpVol",
    "TheoreticalVol",
    "NonStandard",
];

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),
}

/// Dataset file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Parquet,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Csv => "csv",
        }
    }
}

/// Address of one dataset relative to the storage root:
/// `<symbol>/<date>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPath {
    pub symbol: String,
    pub date: ObservationDate,
    pub format: OutputFormat,
}

impl DatasetPath {
    pub fn new(symbol: impl Into<String>, date: ObservationDate, format: OutputFormat) -> Self {
        Self {
            symbol: symbol.into(),
            date,
            format,
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}.{}", self.symbol, self.date, self.format.extension())
    }
}

/// Where datasets go: a local directory or an `s3://bucket/prefix` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageRoot {
    Local(PathBuf),
    S3 { bucket: String, prefix: String },
}

impl StorageRoot {
    pub fn parse(destination: &str) -> Result<Self, StorageError> {
        match destination.strip_prefix("s3://") {
            Some(rest) => {
                let rest = rest.trim_matches('/');
                let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    return Err(StorageError::InvalidDestination(destination.to_string()));
                }
                Ok(Self::S3 {
                    bucket: bucket.to_string(),
                    prefix: prefix.trim_matches('/').to_string(),
                })
            }
            None => Ok(Self::Local(PathBuf::from(destination))),
        }
    }

    /// Open the storage capability for this root.
    pub fn open(&self, settings: &ObjectStoreSettings) -> Arc<dyn ObjectStore> {
        match self {
            Self::Local(root) => Arc::new(LocalStore::new(root.clone())),
            Self::S3 { bucket, prefix } => {
                Arc::new(S3Store::new(bucket.clone(), prefix.clone(), settings))
            }
        }
    }
}

/// Storage capability: check-exists and write-whole-object by key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable location of `key`, for logs.
    fn describe(&self, key: &str) -> String;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Write `bytes` at `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;
}

/// Local filesystem store rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn describe(&self, key: &str) -> String {
        self.path(key).display().to_string()
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.path(key)).await?)
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path(key);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }
}

/// S3-compatible object store.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Store {
    pub fn new(bucket: String, prefix: String, settings: &ObjectStoreSettings) -> Self {
        let mut builder = aws_sdk_s3::Config::builder()
            .region(Region::new(settings.region.clone()))
            .behavior_version(BehaviorVersion::latest())
            .force_path_style(true);

        if let Some(endpoint) = &settings.endpoint_url {
            builder = builder.endpoint_url(endpoint.clone());
        }
        if let (Some(key_id), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
            builder = builder.credentials_provider(Credentials::new(
                key_id.clone(),
                secret.clone(),
                None,
                None,
                "options-collector",
            ));
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket,
            prefix,
        }
    }

    fn object_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn describe(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.object_key(key))
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(StorageError::ObjectStore(err.to_string())),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::ObjectStore(e.to_string()))?;
        Ok(())
    }
}

/// Encode a table as Brotli-compressed Parquet.
pub fn encode_parquet(table: &ChainTable) -> Result<Vec<u8>, StorageError> {
    let mut df = table.to_dataframe()?;
    let mut buffer = Vec::new();
    ParquetWriter::new(&mut buffer)
        .with_compression(ParquetCompression::Brotli(Some(BrotliLevel::try_new(BROTLI_LEVEL)?)))
        .finish(&mut df)?;
    Ok(buffer)
}

/// Encode a table in the legacy CSV layout. Optional columns the table lacks
/// are written as zero.
pub fn encode_csv(table: &ChainTable) -> Result<Vec<u8>, StorageError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(LEGACY_CSV_HEADER)?;

    for row in table.rows() {
        writer.write_record([
            row.date.format("%Y-%m-%d").to_string(),
            row.expiration.to_string(),
            row.strike.to_string(),
            row.option_type.as_str().to_string(),
            row.symbol.to_string(),
            row.bid.to_string(),
            row.ask.to_string(),
            row.last.to_string(),
            row.volume.to_string(),
            row.openint.to_string(),
            row.delta.to_string(),
            row.gamma.to_string(),
            row.theta.to_string(),
            row.vega.to_string(),
            row.rho.to_string(),
            row.impvol.to_string(),
            row.theoretical_vol.to_string(),
            row.non_standard.to_string(),
        ])?;
    }

    writer.into_inner().map_err(|e| StorageError::Io(e.into_error()))
}

/// Writes whole datasets through a storage capability.
#[derive(Clone)]
pub struct DatasetWriter {
    store: Arc<dyn ObjectStore>,
    format: OutputFormat,
}

impl DatasetWriter {
    pub fn new(store: Arc<dyn ObjectStore>, format: OutputFormat) -> Self {
        Self { store, format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Full location of the dataset for `symbol` on `date`.
    pub fn location(&self, symbol: &str, date: ObservationDate) -> String {
        self.store.describe(&DatasetPath::new(symbol, date, self.format).key())
    }

    pub async fn exists(&self, symbol: &str, date: ObservationDate) -> Result<bool, StorageError> {
        self.store.exists(&DatasetPath::new(symbol, date, self.format).key()).await
    }

    /// Encode and write `table`, replacing any previous dataset for the same
    /// symbol and date. Returns the written location.
    pub async fn save(&self, table: &ChainTable, symbol: &str) -> Result<String, StorageError> {
        let date = ObservationDate::new(table.date());
        let key = DatasetPath::new(symbol, date, self.format).key();
        let bytes = self.encode(table)?;

        debug!(symbol, location = %self.store.describe(&key), bytes = bytes.len(), "Writing dataset");
        self.store.put(&key, bytes).await?;
        Ok(self.store.describe(&key))
    }

    /// Encode without writing.
    pub fn encode(&self, table: &ChainTable) -> Result<Vec<u8>, StorageError> {
        match self.format {
            OutputFormat::Parquet => encode_parquet(table),
            OutputFormat::Csv => encode_csv(table),
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => Path::new(&home).join(rest.trim_start_matches('/')),
        _ => PathBuf::from(path),
    }
}

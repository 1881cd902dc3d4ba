pub mod collector;
pub mod config;
pub mod convert;
pub mod data;
pub mod normalize;
pub mod notify;
pub mod provider;
pub mod schedule;
pub mod storage;
pub mod table;
pub mod validation;

// Re-export commonly used types
pub use collector::{BatchHook, BatchReport, CollectorError, OptionsCollector};
pub use config::{CollectorConfig, ConfigError};
pub use convert::{ConvertOutcome, ConvertSummary, LegacyConverter};
pub use data::{ContractRecord, ObservationDate, OptionType};
pub use normalize::{FlatTableSource, NestedMapSource, Normalizer};
pub use notify::EmailNotifier;
pub use provider::{ChainProvider, RawChain, RestChainClient, RetryPolicy, TickerClient};
pub use schedule::DailySchedule;
pub use storage::{DatasetWriter, LocalStore, ObjectStore, OutputFormat, S3Store, StorageRoot};
pub use table::{ChainTable, StrikeEncoding, TableOptions};

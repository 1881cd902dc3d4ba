//! Market-data providers.
//!
//! A provider turns a symbol into a raw, provider-shaped chain. The shape is
//! fixed by which client produced it, never sniffed from the payload.

pub(crate) mod de;
pub mod rest;
pub mod retry;
pub mod ticker;

use async_trait::async_trait;
use thiserror::Error;

use crate::data::{ContractRecord, ObservationDate};
use crate::normalize::{FlatTableSource, NestedMapSource, NormalizeError, Normalizer};

pub use rest::{ChainResponse, ContractQuote, RestChainClient, StrikeMap};
pub use retry::RetryPolicy;
pub use ticker::{ExpirationTables, FlatQuoteRow, TickerChain, TickerClient};

/// Provider errors.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Provider rejected request for {symbol}: {status}")]
    Rejected { symbol: String, status: String },

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Connection errors, timeouts, server errors and unclassified failures
    /// are worth retrying. A rejection or a client error (bad symbol, bad key)
    /// is not, except 408 and 429.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Rejected { .. } => false,
            Self::HttpStatus { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            _ => true,
        }
    }

    /// Error for a non-2xx response, with the body for context.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::HttpStatus { status, body }
    }
}

/// Raw chain as returned by one of the two provider families.
#[derive(Debug, Clone)]
pub enum RawChain {
    NestedMap(ChainResponse),
    FlatTable(TickerChain),
}

impl RawChain {
    /// Dispatch to the normalizer matching the producing client.
    pub fn normalize(self, date: ObservationDate) -> Result<Vec<ContractRecord>, NormalizeError> {
        match self {
            Self::NestedMap(raw) => NestedMapSource.normalize(raw, date),
            Self::FlatTable(raw) => FlatTableSource.normalize(raw, date),
        }
    }
}

/// A source of options chains for one symbol at a time.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    /// Fetch the current chain for `symbol`, retrying transient failures.
    async fn fetch_chain(&self, symbol: &str) -> Result<RawChain, ProviderError>;
}

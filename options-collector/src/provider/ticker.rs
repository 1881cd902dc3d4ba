//! Finance-ticker options client.
//!
//! Mirrors the per-ticker view of Yahoo Finance: a list of expiration dates,
//! and for each expiration two already-flat tables of calls and puts. Rows keep
//! the provider's column names; renaming happens in the normalizer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::de::{lenient_f64, lenient_i64};
use super::{ChainProvider, ProviderError, RawChain, RetryPolicy};

/// Default options endpoint.
pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com/v7/finance/options";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// One row of a calls or puts table, with provider column names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatQuoteRow {
    #[serde(default)]
    pub contract_symbol: String,
    /// Seconds since the Unix epoch
    #[serde(default, deserialize_with = "lenient_i64")]
    pub last_trade_date: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub strike: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub last_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub bid: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ask: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub change: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub percent_change: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub volume: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub open_interest: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub implied_volatility: Option<f64>,
    #[serde(default)]
    pub in_the_money: Option<bool>,
    #[serde(default)]
    pub contract_size: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Calls and puts for one expiration.
#[derive(Debug, Clone, Default)]
pub struct ExpirationTables {
    /// Expiration as `YYYY-MM-DD`
    pub expiration: String,
    pub calls: Vec<FlatQuoteRow>,
    pub puts: Vec<FlatQuoteRow>,
}

/// Every expiration listed for one underlying.
#[derive(Debug, Clone, Default)]
pub struct TickerChain {
    pub symbol: String,
    pub expirations: Vec<ExpirationTables>,
}

impl TickerChain {
    pub fn contract_count(&self) -> usize {
        self.expirations
            .iter()
            .map(|e| e.calls.len() + e.puts.len())
            .sum()
    }
}

/// Finance-ticker client.
pub struct TickerClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl TickerClient {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url,
            retry: RetryPolicy::ticker(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn options_page(
        &self,
        symbol: &str,
        expiration_ts: Option<i64>,
    ) -> Result<Option<OptionChainData>, ProviderError> {
        let url = format!("{}/{}", self.base_url, symbol);
        let mut request = self.client.get(&url);
        if let Some(ts) = expiration_ts {
            request = request.query(&[("date", ts)]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::from_response(response).await);
        }

        let body: OptionsResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse options: {}", e))
        })?;

        if let Some(error) = body.option_chain.error {
            if !error.is_null() {
                return Err(ProviderError::Rejected {
                    symbol: symbol.to_string(),
                    status: error.to_string(),
                });
            }
        }

        Ok(body.option_chain.result.into_iter().next())
    }

    /// Fetch every expiration's tables. An unknown symbol yields an empty chain.
    async fn fetch_all(&self, symbol: &str) -> Result<TickerChain, ProviderError> {
        let mut chain = TickerChain {
            symbol: symbol.to_string(),
            expirations: Vec::new(),
        };

        let Some(first) = self.options_page(symbol, None).await? else {
            return Ok(chain);
        };

        for ts in first.expiration_dates {
            let Some(date) = DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive()) else {
                continue;
            };
            let page = self.options_page(symbol, Some(ts)).await?;
            let tables = page
                .and_then(|p| p.options.into_iter().next())
                .unwrap_or_default();

            chain.expirations.push(ExpirationTables {
                expiration: date.format("%Y-%m-%d").to_string(),
                calls: tables.calls,
                puts: tables.puts,
            });
        }

        debug!(
            symbol,
            expirations = chain.expirations.len(),
            contracts = chain.contract_count(),
            "Ticker chain received"
        );
        Ok(chain)
    }
}

#[async_trait]
impl ChainProvider for TickerClient {
    fn name(&self) -> &'static str {
        "ticker"
    }

    async fn fetch_chain(&self, symbol: &str) -> Result<RawChain, ProviderError> {
        let chain = self
            .retry
            .retry_async(symbol, |_| self.fetch_all(symbol), ProviderError::is_transient)
            .await?;
        Ok(RawChain::FlatTable(chain))
    }
}

// Yahoo Finance options response structures

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionsResponse {
    option_chain: OptionChainEnvelope,
}

#[derive(Debug, Deserialize)]
struct OptionChainEnvelope {
    #[serde(default)]
    result: Vec<OptionChainData>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionChainData {
    #[serde(default)]
    expiration_dates: Vec<i64>,
    #[serde(default)]
    options: Vec<OptionTables>,
}

#[derive(Debug, Default, Deserialize)]
struct OptionTables {
    #[serde(default)]
    calls: Vec<FlatQuoteRow>,
    #[serde(default)]
    puts: Vec<FlatQuoteRow>,
}

//! REST options-chain client.
//!
//! The chain endpoint answers one request per underlying with two nested maps,
//! `putExpDateMap` and `callExpDateMap`, keyed by `"<expiration>:<dte>"` and
//! then by strike. Each strike holds one or more contract quotes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::de::{lenient_f64, lenient_flag, lenient_i64};
use super::{ChainProvider, ProviderError, RawChain, RetryPolicy};

/// Default chain endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.tdameritrade.com/v1/marketdata/chains";

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Status value the provider embeds in a successful payload.
const SUCCESS_STATUS: &str = "SUCCESS";

/// Strike key -> quotes listed at that strike.
pub type StrikeMap = BTreeMap<String, Vec<ContractQuote>>;

/// Chain payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainResponse {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub put_exp_date_map: BTreeMap<String, StrikeMap>,
    #[serde(default)]
    pub call_exp_date_map: BTreeMap<String, StrikeMap>,
}

impl ChainResponse {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case(SUCCESS_STATUS)
    }

    /// Number of quote objects across both maps.
    pub fn contract_count(&self) -> usize {
        self.put_exp_date_map
            .values()
            .chain(self.call_exp_date_map.values())
            .flat_map(|strikes| strikes.values())
            .map(Vec::len)
            .sum()
    }
}

/// One contract quote inside the nested maps.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractQuote {
    #[serde(default)]
    pub put_call: Option<String>,
    #[serde(default)]
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub strike_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub bid: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ask: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub last: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub total_volume: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub open_interest: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub delta: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub gamma: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub theta: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub vega: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rho: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub volatility: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub theoretical_volatility: Option<f64>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub non_standard: Option<bool>,
}

/// REST chain client.
pub struct RestChainClient {
    client: Client,
    base_url: String,
    api_key: String,
    params: Vec<(String, String)>,
    retry: RetryPolicy,
    request_count: AtomicU64,
}

impl RestChainClient {
    /// Create a client against the default endpoint.
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
            params: vec![
                ("contractType".to_string(), "ALL".to_string()),
                ("strategy".to_string(), "SINGLE".to_string()),
                ("includeQuotes".to_string(), "FALSE".to_string()),
            ],
            retry: RetryPolicy::rest(),
            request_count: AtomicU64::new(0),
        })
    }

    /// Replace the caller-supplied query parameters.
    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Get request count for monitoring.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    async fn request(&self, symbol: &str) -> Result<ChainResponse, ProviderError> {
        let mut query: Vec<(&str, &str)> = self
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        query.push(("symbol", symbol));
        query.push(("apikey", self.api_key.as_str()));

        let response = self.client.get(&self.base_url).query(&query).send().await?;
        self.request_count.fetch_add(1, Ordering::Relaxed);

        if !response.status().is_success() {
            return Err(ProviderError::from_response(response).await);
        }

        let chain: ChainResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;

        if !chain.is_success() {
            return Err(ProviderError::Rejected {
                symbol: symbol.to_string(),
                status: chain.status,
            });
        }

        debug!(symbol, contracts = chain.contract_count(), "Chain received");
        Ok(chain)
    }
}

#[async_trait]
impl ChainProvider for RestChainClient {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn fetch_chain(&self, symbol: &str) -> Result<RawChain, ProviderError> {
        let chain = self
            .retry
            .retry_async(symbol, |_| self.request(symbol), ProviderError::is_transient)
            .await?;
        Ok(RawChain::NestedMap(chain))
    }
}

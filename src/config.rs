//! Runtime configuration for [`MarketDataService`](crate::service::MarketDataService)

use crate::constants::{
    COINGECKO_API_URL, COINPAPRIKA_API_URL, COIN_DETAIL_TTL_MS, CRYPTOCOMPARE_API_URL,
    DEFAULT_LANGUAGE_PRIORITY, EXCHANGE_RATE_TTL_MS, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS,
    MAX_RETRIES, NO_DESCRIPTION_PLACEHOLDER, OPEN_ER_API_URL, PRICE_HISTORY_TTL_MS,
    REQUEST_TIMEOUT_SECS, TOP_COINS_LIMIT, TOP_COINS_TTL_MS,
};
use crate::normalize::Normalizer;
use crate::retry::{RetryMode, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upstream used for the listing and coin detail surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingProviderKind {
    #[default]
    CoinPaprika,
    CoinGecko,
}

impl std::str::FromStr for ListingProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coinpaprika" | "paprika" => Ok(ListingProviderKind::CoinPaprika),
            "coingecko" | "gecko" => Ok(ListingProviderKind::CoinGecko),
            other => Err(format!("unknown listing provider: {}", other)),
        }
    }
}

/// Service settings
///
/// Every field has a default, so a partial document deserializes:
///
/// ```
/// use market_data_sdk::MarketDataConfig;
///
/// let config: MarketDataConfig =
///     serde_json::from_str(r#"{"top_coins_ttl_ms": 30000}"#).unwrap();
/// assert_eq!(config.top_coins_ttl_ms, 30000);
/// assert_eq!(config.max_retries, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    pub top_coins_ttl_ms: u64,
    pub coin_detail_ttl_ms: u64,
    pub price_history_ttl_ms: u64,
    pub exchange_rate_ttl_ms: u64,

    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub retry_mode: RetryMode,

    /// Coalesce concurrent fetches of the same key into one upstream call
    pub single_flight: bool,

    pub listing_provider: ListingProviderKind,
    pub coinpaprika_url: String,
    pub coingecko_url: String,
    pub cryptocompare_url: String,
    pub cryptocompare_api_key: Option<String>,
    pub open_er_api_url: String,
    pub request_timeout_secs: u64,

    /// Description languages, most preferred first
    pub language_priority: Vec<String>,
    pub description_placeholder: String,
    pub top_coins_limit: usize,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            top_coins_ttl_ms: TOP_COINS_TTL_MS,
            coin_detail_ttl_ms: COIN_DETAIL_TTL_MS,
            price_history_ttl_ms: PRICE_HISTORY_TTL_MS,
            exchange_rate_ttl_ms: EXCHANGE_RATE_TTL_MS,
            max_retries: MAX_RETRIES,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
            retry_mode: RetryMode::default(),
            single_flight: true,
            listing_provider: ListingProviderKind::default(),
            coinpaprika_url: COINPAPRIKA_API_URL.to_string(),
            coingecko_url: COINGECKO_API_URL.to_string(),
            cryptocompare_url: CRYPTOCOMPARE_API_URL.to_string(),
            cryptocompare_api_key: None,
            open_er_api_url: OPEN_ER_API_URL.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            language_priority: DEFAULT_LANGUAGE_PRIORITY.iter().map(|l| l.to_string()).collect(),
            description_placeholder: NO_DESCRIPTION_PLACEHOLDER.to_string(),
            top_coins_limit: TOP_COINS_LIMIT,
        }
    }
}

impl MarketDataConfig {
    /// Defaults with environment overrides applied
    ///
    /// Recognized variables:
    /// - `MARKET_DATA_LISTING_PROVIDER`: `coinpaprika` or `coingecko`
    /// - `MARKET_DATA_SINGLE_FLIGHT`: `true` or `false`
    /// - `MARKET_DATA_MAX_RETRIES`
    /// - `CRYPTOCOMPARE_API_KEY`
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("MARKET_DATA_LISTING_PROVIDER") {
            match value.parse() {
                Ok(kind) => config.listing_provider = kind,
                Err(e) => tracing::warn!(error = %e, "Ignoring MARKET_DATA_LISTING_PROVIDER"),
            }
        }
        if let Ok(value) = std::env::var("MARKET_DATA_SINGLE_FLIGHT") {
            match value.trim().parse() {
                Ok(enabled) => config.single_flight = enabled,
                Err(_) => tracing::warn!(value = %value, "Ignoring MARKET_DATA_SINGLE_FLIGHT"),
            }
        }
        if let Ok(value) = std::env::var("MARKET_DATA_MAX_RETRIES") {
            match value.trim().parse() {
                Ok(retries) => config.max_retries = retries,
                Err(_) => tracing::warn!(value = %value, "Ignoring MARKET_DATA_MAX_RETRIES"),
            }
        }
        if let Ok(key) = std::env::var("CRYPTOCOMPARE_API_KEY") {
            if !key.trim().is_empty() {
                config.cryptocompare_api_key = Some(key.trim().to_string());
            }
        }

        config
    }

    pub fn top_coins_ttl(&self) -> Duration {
        Duration::from_millis(self.top_coins_ttl_ms)
    }

    pub fn coin_detail_ttl(&self) -> Duration {
        Duration::from_millis(self.coin_detail_ttl_ms)
    }

    pub fn price_history_ttl(&self) -> Duration {
        Duration::from_millis(self.price_history_ttl_ms)
    }

    pub fn exchange_rate_ttl(&self) -> Duration {
        Duration::from_millis(self.exchange_rate_ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
            mode: self.retry_mode,
        }
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(
            self.language_priority.clone(),
            self.description_placeholder.clone(),
        )
    }
}

//! Constants for the market data service
//!
//! These are the compile-time defaults. Every value that is policy rather
//! than protocol can be overridden at runtime through
//! [`MarketDataConfig`](crate::config::MarketDataConfig).

/// Freshness window for the ranked coin listing (in milliseconds)
pub const TOP_COINS_TTL_MS: u64 = 60_000;

/// Freshness window for a single coin's detail view (in milliseconds)
pub const COIN_DETAIL_TTL_MS: u64 = 60_000;

/// Freshness window for historical price series (in milliseconds)
pub const PRICE_HISTORY_TTL_MS: u64 = 5 * 60_000;

/// Freshness window for fiat exchange rates (in milliseconds)
pub const EXCHANGE_RATE_TTL_MS: u64 = 60 * 60_000;

/// HTTP request timeout when talking to upstream APIs (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Number of retries after the initial attempt
pub const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries (in milliseconds)
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum backoff delay for retries (in milliseconds)
pub const MAX_BACKOFF_MS: u64 = 30000;

/// Size of the ranked listing kept after sorting by rank
pub const TOP_COINS_LIMIT: usize = 100;

/// Largest `per_page` CoinGecko accepts on `/coins/markets`
pub const COINGECKO_MAX_PER_PAGE: usize = 250;

/// Number of daily points requested for the `max` history range
pub const MAX_HISTORY_DAYS: u32 = 365;

/// The currency every provider quotes in
pub const BASE_CURRENCY: &str = "USD";

/// Description languages tried in order, first non-empty wins
pub const DEFAULT_LANGUAGE_PRIORITY: &[&str] = &["zh-tw", "zh", "en"];

/// Shown when no description exists in any preferred language
pub const NO_DESCRIPTION_PLACEHOLDER: &str = "No description available.";

/// CoinPaprika API base URL
pub const COINPAPRIKA_API_URL: &str = "https://api.coinpaprika.com/v1";

/// CoinPaprika static logo host
pub const COINPAPRIKA_IMAGE_URL: &str = "https://static.coinpaprika.com/coin";

/// CoinGecko API base URL
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// CryptoCompare API base URL
pub const CRYPTOCOMPARE_API_URL: &str = "https://min-api.cryptocompare.com/data/v2";

/// open.er-api.com base URL
pub const OPEN_ER_API_URL: &str = "https://open.er-api.com/v6";

/// User agent for HTTP requests
pub const USER_AGENT: &str = "market-data-sdk/0.1.0";

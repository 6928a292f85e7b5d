//! # Market Data SDK
//!
//! The data layer behind a cryptocurrency dashboard: ranked coin listings,
//! coin detail views, price history charts and fiat conversion, sourced
//! from public market data APIs (CoinPaprika or CoinGecko, CryptoCompare,
//! open.er-api).
//!
//! ## Important: this is a polling client, not a price feed
//!
//! Nothing is streamed or persisted. Every read goes through a per-resource
//! TTL cache; misses are fetched with bounded exponential backoff, and when
//! an upstream stays down the last cached value is served, flagged stale.
//!
//! ## Usage
//!
//! ```no_run
//! use market_data_sdk::{MarketDataConfig, MarketDataService, RangeSelector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = MarketDataService::new(MarketDataConfig::from_env())?;
//!
//! // Top coins priced in New Taiwan dollars
//! let coins = service.get_top_coins("TWD").await?;
//! for coin in coins.data.iter().take(5) {
//!     println!("#{} {}: {} {}", coin.market_cap_rank, coin.symbol, coin.current_price, coin.currency);
//! }
//!
//! // One week of hourly prices
//! let range: RangeSelector = "7".parse()?;
//! let history = service.get_price_history("BTC", range, "USD").await?;
//! println!("{} points, stale: {}", history.data.len(), history.is_stale());
//! # Ok(())
//! # }
//! ```
//!
//! Hard failures carry an [`ErrorKind`] and a message fit for the UI:
//!
//! ```no_run
//! # use market_data_sdk::{MarketDataConfig, MarketDataService};
//! # async fn example(service: MarketDataService) {
//! if let Err(e) = service.get_coin_detail("btc-bitcoin", "USD").await {
//!     eprintln!("{}", e.user_message());
//! }
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod provider;
pub mod providers;
pub mod raw;
pub mod retry;
pub mod service;
pub mod single_flight;
pub mod types;

// Re-export commonly used types
pub use config::{ListingProviderKind, MarketDataConfig};
pub use error::{ErrorKind, MarketDataError, ProviderError, ResourceKind};
pub use metrics::ProviderMetrics;
pub use retry::{RetryMode, RetryPolicy};
pub use service::MarketDataService;
pub use types::{
    filter_coins, CoinDetail, CoinSummary, ExchangeRate, Fetched, Freshness, PricePoint,
    PriceSeries, RangeSelector,
};

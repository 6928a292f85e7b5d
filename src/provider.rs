//! Provider abstraction for the upstream API surfaces
//!
//! Each trait covers one surface and returns raw, provider-neutral shapes
//! (see [`crate::raw`]). No validation or defaulting happens here; that is
//! the normalizer's job. Implementations only reshape wire JSON and classify
//! failures into [`ProviderError`] kinds.

use crate::{
    error::ProviderError,
    raw::{RawCoinMeta, RawHistory, RawRate, RawTicker},
    types::RangeSelector,
};
use async_trait::async_trait;

/// Ranked listing and per-coin detail (CoinPaprika, CoinGecko)
#[async_trait]
pub trait ListingProvider: Send + Sync {
    /// Fetches the ranked ticker listing
    ///
    /// The result may be longer than the dashboard needs and is not
    /// guaranteed to be sorted; the normalizer ranks and truncates it.
    async fn fetch_ranked_tickers(&self) -> Result<Vec<RawTicker>, ProviderError>;

    /// Fetches descriptive metadata for one coin
    async fn fetch_coin_meta(&self, id: &str) -> Result<RawCoinMeta, ProviderError>;

    /// Fetches the USD quote and supply figures for one coin
    async fn fetch_coin_ticker(&self, id: &str) -> Result<RawTicker, ProviderError>;

    /// Returns the name of this provider
    fn provider_name(&self) -> &'static str;
}

/// Time-bucketed price history (CryptoCompare)
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Fetches the series for `symbol` with the bucket width and point count
    /// of `range`
    async fn fetch_history_series(
        &self,
        symbol: &str,
        range: RangeSelector,
    ) -> Result<RawHistory, ProviderError>;

    fn provider_name(&self) -> &'static str;
}

/// Fiat exchange rates quoted against USD (open.er-api)
#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    /// Fetches how many units of `target` one USD buys
    async fn fetch_usd_to_target_rate(&self, target: &str) -> Result<RawRate, ProviderError>;

    fn provider_name(&self) -> &'static str;
}

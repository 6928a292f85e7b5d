//! Provider-neutral raw shapes
//!
//! Provider clients reshape their wire JSON into these structs without
//! validating anything: every field stays optional. Deciding what is
//! required and what defaults apply is the normalizer's job.

use std::collections::HashMap;

/// USD quote block of a ticker
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQuote {
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
    pub percent_change_24h: Option<f64>,
}

/// One entry of a ranked listing, or the quote half of a coin detail
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTicker {
    pub id: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub rank: Option<i64>,
    pub image_url: Option<String>,
    pub quote: Option<RawQuote>,
    pub circulating_supply: Option<f64>,
    pub max_supply: Option<f64>,
}

/// Metadata half of a coin detail
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCoinMeta {
    pub id: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub image_url: Option<String>,
    /// Language code to description text as sent by the provider
    pub descriptions: HashMap<String, String>,
}

/// Unit of the provider's bucket timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Millis,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBucket {
    pub time: Option<i64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// A time-bucketed history series
#[derive(Debug, Clone, PartialEq)]
pub struct RawHistory {
    pub time_unit: TimeUnit,
    pub buckets: Vec<RawBucket>,
}

/// A fiat rate as reported upstream
#[derive(Debug, Clone, PartialEq)]
pub struct RawRate {
    pub base: String,
    pub target: String,
    pub rate: Option<f64>,
}

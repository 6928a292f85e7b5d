//! Canonical entities produced by the normalizer and served by the service

use crate::constants::{BASE_CURRENCY, MAX_HISTORY_DAYS};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A row of the ranked coin listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinSummary {
    /// Provider slug, stable across refreshes (e.g. `btc-bitcoin`)
    pub id: String,
    pub name: String,
    /// Ticker symbol, upper case (e.g. `BTC`)
    pub symbol: String,
    pub current_price: Decimal,
    pub market_cap: Decimal,
    /// 1-based rank, `0` when the provider does not rank the coin
    pub market_cap_rank: u32,
    pub price_change_pct_24h: Decimal,
    pub volume_24h: Decimal,
    pub image_url: String,
    /// Currency the monetary fields are denominated in
    pub currency: String,
}

impl CoinSummary {
    /// Case-insensitive substring match on name or symbol
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        query.is_empty()
            || self.name.to_lowercase().contains(&query)
            || self.symbol.to_lowercase().contains(&query)
    }
}

/// Filters a listing the way the dashboard search box does
pub fn filter_coins<'a>(coins: &'a [CoinSummary], query: &str) -> Vec<&'a CoinSummary> {
    coins.iter().filter(|coin| coin.matches(query)).collect()
}

/// Full view of a single coin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinDetail {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub image_large_url: String,
    /// Language code to description text, only non-empty texts are kept
    pub description: HashMap<String, String>,
    /// First non-empty description by language priority, or the placeholder
    pub preferred_description: String,
    pub current_price_by_currency: HashMap<String, Decimal>,
    pub market_cap_by_currency: HashMap<String, Decimal>,
    pub volume_24h_by_currency: HashMap<String, Decimal>,
    pub price_change_pct_24h: Decimal,
    pub circulating_supply: Decimal,
    /// `None` means uncapped supply, which is not the same as zero
    pub max_supply: Option<Decimal>,
}

impl CoinDetail {
    /// Price in the given currency code, if present
    pub fn price_in(&self, currency: &str) -> Option<Decimal> {
        self.current_price_by_currency
            .get(&currency.to_uppercase())
            .copied()
    }
}

/// One bucket of a price history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Bucket start, milliseconds since the Unix epoch
    pub timestamp_millis: i64,
    pub price: Decimal,
    pub volume: Option<Decimal>,
}

/// Price history for one symbol, strictly increasing by timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub range: RangeSelector,
    pub currency: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// An empty series is valid data, e.g. a newly listed coin
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Units of `target` per one unit of `base`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub base: String,
    pub target: String,
    pub rate: Decimal,
    pub fetched_at: DateTime<Utc>,
}

impl ExchangeRate {
    /// The `1.0` rate used when the display currency is the base currency
    pub fn identity(currency: &str) -> Self {
        Self {
            base: currency.to_string(),
            target: currency.to_string(),
            rate: Decimal::ONE,
            fetched_at: Utc::now(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.base == self.target && self.rate == Decimal::ONE
    }

    /// The reverse conversion, `None` for a zero rate
    pub fn inverse(&self) -> Option<Self> {
        Decimal::ONE.checked_div(self.rate).map(|rate| Self {
            base: self.target.clone(),
            target: self.base.clone(),
            rate,
            fetched_at: self.fetched_at,
        })
    }
}

/// Bucket width of a history series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketWidth {
    TenMinutes,
    Hour,
    Day,
}

impl BucketWidth {
    pub fn as_millis(&self) -> i64 {
        match self {
            BucketWidth::TenMinutes => 10 * 60 * 1000,
            BucketWidth::Hour => 60 * 60 * 1000,
            BucketWidth::Day => 24 * 60 * 60 * 1000,
        }
    }
}

/// Chart range requested by the caller
///
/// Parsed from the dashboard's tokens: `"1"`, `"7"`, `"14"`, `"30"`, any
/// other positive day count, or `"max"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeSelector {
    OneDay,
    SevenDays,
    FourteenDays,
    ThirtyDays,
    /// Daily buckets, one per day
    Days(u32),
    Max,
}

impl RangeSelector {
    /// Maps a day count onto the dedicated variants where one exists
    pub fn from_days(days: u32) -> Option<Self> {
        match days {
            0 => None,
            1 => Some(RangeSelector::OneDay),
            7 => Some(RangeSelector::SevenDays),
            14 => Some(RangeSelector::FourteenDays),
            30 => Some(RangeSelector::ThirtyDays),
            n => Some(RangeSelector::Days(n)),
        }
    }

    pub fn bucket_width(&self) -> BucketWidth {
        match self {
            RangeSelector::OneDay => BucketWidth::TenMinutes,
            RangeSelector::SevenDays | RangeSelector::FourteenDays | RangeSelector::ThirtyDays => {
                BucketWidth::Hour
            }
            RangeSelector::Days(_) | RangeSelector::Max => BucketWidth::Day,
        }
    }

    /// Number of buckets in the series
    pub fn point_count(&self) -> u32 {
        match self {
            RangeSelector::OneDay => 144,
            RangeSelector::SevenDays => 168,
            RangeSelector::FourteenDays => 336,
            RangeSelector::ThirtyDays => 720,
            RangeSelector::Days(days) => *days,
            RangeSelector::Max => MAX_HISTORY_DAYS,
        }
    }
}

impl fmt::Display for RangeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeSelector::OneDay => write!(f, "1"),
            RangeSelector::SevenDays => write!(f, "7"),
            RangeSelector::FourteenDays => write!(f, "14"),
            RangeSelector::ThirtyDays => write!(f, "30"),
            RangeSelector::Days(days) => write!(f, "{}", days),
            RangeSelector::Max => write!(f, "max"),
        }
    }
}

impl FromStr for RangeSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if token.eq_ignore_ascii_case("max") {
            return Ok(RangeSelector::Max);
        }
        token
            .parse::<u32>()
            .ok()
            .and_then(RangeSelector::from_days)
            .ok_or_else(|| format!("unsupported range selector: {:?}", s))
    }
}

/// Whether a served value came from a fresh fetch/cache hit or from the
/// degradation path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    /// Upstream failed, this is the last value fetched
    Stale,
}

/// A served value together with its freshness flag
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub freshness: Freshness,
    /// Time since the underlying data was fetched from upstream
    pub age: Duration,
}

impl<T> Fetched<T> {
    pub fn fresh(data: T, age: Duration) -> Self {
        Self {
            data,
            freshness: Freshness::Fresh,
            age,
        }
    }

    pub fn stale(data: T, age: Duration) -> Self {
        Self {
            data,
            freshness: Freshness::Stale,
            age,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            data: f(self.data),
            freshness: self.freshness,
            age: self.age,
        }
    }

    /// Combines with another fetched value; stale if either side is stale
    pub fn zip<U>(self, other: Fetched<U>) -> Fetched<(T, U)> {
        let freshness = if self.is_stale() || other.is_stale() {
            Freshness::Stale
        } else {
            Freshness::Fresh
        };
        Fetched {
            data: (self.data, other.data),
            freshness,
            age: self.age.max(other.age),
        }
    }
}

/// Validates and upper-cases an ISO 4217 style currency code
pub fn normalize_currency_code(code: &str) -> Option<String> {
    let code = code.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code.to_ascii_uppercase())
    } else {
        None
    }
}

/// True when `code` names the currency providers quote in
pub fn is_base_currency(code: &str) -> bool {
    code.eq_ignore_ascii_case(BASE_CURRENCY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn coin(name: &str, symbol: &str) -> CoinSummary {
        CoinSummary {
            id: format!("{}-{}", symbol.to_lowercase(), name.to_lowercase()),
            name: name.to_string(),
            symbol: symbol.to_string(),
            current_price: dec!(1),
            market_cap: dec!(1),
            market_cap_rank: 1,
            price_change_pct_24h: dec!(0),
            volume_24h: dec!(0),
            image_url: String::new(),
            currency: "USD".to_string(),
        }
    }

    #[test]
    fn test_range_table() {
        let one_day: RangeSelector = "1".parse().unwrap();
        assert_eq!(one_day, RangeSelector::OneDay);
        assert_eq!(one_day.bucket_width(), BucketWidth::TenMinutes);
        assert_eq!(one_day.point_count(), 144);

        let week: RangeSelector = "7".parse().unwrap();
        assert_eq!(week.bucket_width(), BucketWidth::Hour);
        assert_eq!(week.point_count(), 168);

        assert_eq!("14".parse::<RangeSelector>().unwrap().point_count(), 336);
        assert_eq!("30".parse::<RangeSelector>().unwrap().point_count(), 720);

        let quarter: RangeSelector = "90".parse().unwrap();
        assert_eq!(quarter, RangeSelector::Days(90));
        assert_eq!(quarter.bucket_width(), BucketWidth::Day);
        assert_eq!(quarter.point_count(), 90);

        let max: RangeSelector = "MAX".parse().unwrap();
        assert_eq!(max.bucket_width(), BucketWidth::Day);
        assert_eq!(max.point_count(), 365);
    }

    #[test]
    fn test_range_rejects_bad_tokens() {
        assert!("0".parse::<RangeSelector>().is_err());
        assert!("-7".parse::<RangeSelector>().is_err());
        assert!("week".parse::<RangeSelector>().is_err());
        assert!("".parse::<RangeSelector>().is_err());
    }

    #[test]
    fn test_range_display_round_trips_tokens() {
        for token in ["1", "7", "14", "30", "90", "365", "max"] {
            let range: RangeSelector = token.parse().unwrap();
            assert_eq!(range.to_string(), token);
        }
    }

    #[test]
    fn test_filter_coins() {
        let coins = vec![coin("Bitcoin", "BTC"), coin("Ethereum", "ETH"), coin("Tether", "USDT")];

        let hits = filter_coins(&coins, "eth");
        assert_eq!(hits.len(), 2); // Ethereum by symbol, Tether by name
        assert_eq!(filter_coins(&coins, "BTC")[0].name, "Bitcoin");
        assert_eq!(filter_coins(&coins, "  ").len(), 3);
        assert!(filter_coins(&coins, "doge").is_empty());
    }

    #[test]
    fn test_currency_codes() {
        assert_eq!(normalize_currency_code(" twd "), Some("TWD".to_string()));
        assert_eq!(normalize_currency_code("usd"), Some("USD".to_string()));
        assert!(normalize_currency_code("us").is_none());
        assert!(normalize_currency_code("U$D").is_none());
        assert!(is_base_currency("usd"));
        assert!(!is_base_currency("EUR"));
    }

    #[test]
    fn test_exchange_rate_inverse() {
        let rate = ExchangeRate {
            base: "USD".to_string(),
            target: "EUR".to_string(),
            rate: dec!(0.8),
            fetched_at: Utc::now(),
        };
        let inverse = rate.inverse().unwrap();
        assert_eq!(inverse.base, "EUR");
        assert_eq!(inverse.target, "USD");
        assert_eq!(inverse.rate, dec!(1.25));
        assert!(ExchangeRate::identity("USD").is_identity());

        let zero = ExchangeRate {
            rate: Decimal::ZERO,
            ..rate
        };
        assert!(zero.inverse().is_none());
    }

    #[test]
    fn test_fetched_zip_is_stale_if_either_is() {
        let fresh = Fetched::fresh(1, Duration::from_secs(5));
        let stale = Fetched::stale("rate", Duration::from_secs(90));
        let zipped = fresh.zip(stale);
        assert!(zipped.is_stale());
        assert_eq!(zipped.age, Duration::from_secs(90));
        assert_eq!(zipped.data, (1, "rate"));
    }
}

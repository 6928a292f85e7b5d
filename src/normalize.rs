//! Normalization of raw provider shapes into canonical entities
//!
//! All "missing field" policy lives here:
//!
//! - identity fields (`id`, `symbol`) are required; a ticker without them is
//!   `MalformedResponse` (dropped from listings, fatal for a detail view)
//! - `name` falls back to the symbol
//! - quote amounts (price, market cap, volume, 24h change, circulating
//!   supply) default to `0` so arithmetic stays total
//! - `max_supply` keeps its absence: `None` means uncapped
//! - history buckets need both a timestamp and a close value
//! - non-finite numbers are always `MalformedResponse`

use crate::constants::{BASE_CURRENCY, DEFAULT_LANGUAGE_PRIORITY, NO_DESCRIPTION_PLACEHOLDER};
use crate::error::ProviderError;
use crate::raw::{RawCoinMeta, RawHistory, RawRate, RawTicker, TimeUnit};
use crate::types::{CoinDetail, CoinSummary, ExchangeRate, PricePoint, PriceSeries, RangeSelector};
use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Converts raw provider data into canonical entities. Pure, no I/O.
#[derive(Debug, Clone)]
pub struct Normalizer {
    language_priority: Vec<String>,
    placeholder: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_LANGUAGE_PRIORITY.iter().map(|l| l.to_string()).collect(),
            NO_DESCRIPTION_PLACEHOLDER.to_string(),
        )
    }
}

impl Normalizer {
    pub fn new(language_priority: Vec<String>, placeholder: String) -> Self {
        Self {
            language_priority,
            placeholder,
        }
    }

    pub fn to_coin_summary(&self, raw: &RawTicker) -> Result<CoinSummary, ProviderError> {
        let id = required_text("id", raw.id.as_deref())?;
        let symbol = required_text("symbol", raw.symbol.as_deref())?.to_uppercase();
        let name = optional_text(raw.name.as_deref()).unwrap_or_else(|| symbol.clone());
        let quote = raw.quote.clone().unwrap_or_default();

        Ok(CoinSummary {
            current_price: amount_or_zero("price", quote.price)?,
            market_cap: amount_or_zero("market_cap", quote.market_cap)?,
            market_cap_rank: rank(raw.rank),
            price_change_pct_24h: amount_or_zero("percent_change_24h", quote.percent_change_24h)?,
            volume_24h: amount_or_zero("volume_24h", quote.volume_24h)?,
            image_url: raw.image_url.clone().unwrap_or_default(),
            currency: BASE_CURRENCY.to_string(),
            id,
            name,
            symbol,
        })
    }

    /// Normalizes a ranked listing
    ///
    /// Entries are stably sorted by rank with unranked coins last, then cut
    /// to `limit`. Malformed entries are dropped; a listing where every
    /// entry is malformed is itself malformed.
    pub fn to_coin_summaries(
        &self,
        raw: &[RawTicker],
        limit: usize,
    ) -> Result<Vec<CoinSummary>, ProviderError> {
        let mut coins = Vec::with_capacity(raw.len().min(limit));
        let mut last_error = None;

        for ticker in raw {
            match self.to_coin_summary(ticker) {
                Ok(coin) => coins.push(coin),
                Err(e) => {
                    tracing::debug!(error = %e, "Dropping malformed ticker");
                    last_error = Some(e);
                }
            }
        }

        if coins.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        coins.sort_by_key(|coin| (coin.market_cap_rank == 0, coin.market_cap_rank));
        coins.truncate(limit);
        Ok(coins)
    }

    pub fn to_coin_detail(
        &self,
        meta: &RawCoinMeta,
        ticker: &RawTicker,
    ) -> Result<CoinDetail, ProviderError> {
        let id = required_text("id", meta.id.as_deref().or(ticker.id.as_deref()))?;
        let symbol = required_text("symbol", meta.symbol.as_deref().or(ticker.symbol.as_deref()))?
            .to_uppercase();
        let name = optional_text(meta.name.as_deref())
            .or_else(|| optional_text(ticker.name.as_deref()))
            .unwrap_or_else(|| symbol.clone());
        let image_large_url = meta
            .image_url
            .clone()
            .or_else(|| ticker.image_url.clone())
            .unwrap_or_default();

        let description: HashMap<String, String> = meta
            .descriptions
            .iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(lang, text)| (lang.to_lowercase(), text.clone()))
            .collect();
        let preferred_description = self.preferred_description(&description);

        let quote = ticker.quote.clone().unwrap_or_default();
        let in_base = |amount: Decimal| HashMap::from([(BASE_CURRENCY.to_string(), amount)]);

        Ok(CoinDetail {
            current_price_by_currency: in_base(amount_or_zero("price", quote.price)?),
            market_cap_by_currency: in_base(amount_or_zero("market_cap", quote.market_cap)?),
            volume_24h_by_currency: in_base(amount_or_zero("volume_24h", quote.volume_24h)?),
            price_change_pct_24h: amount_or_zero("percent_change_24h", quote.percent_change_24h)?,
            circulating_supply: amount_or_zero("circulating_supply", ticker.circulating_supply)?,
            max_supply: optional_amount("max_supply", ticker.max_supply)?,
            id,
            name,
            symbol,
            image_large_url,
            description,
            preferred_description,
        })
    }

    /// First non-empty description by language priority, English as the
    /// last language resort, then the placeholder
    pub fn preferred_description(&self, description: &HashMap<String, String>) -> String {
        self.language_priority
            .iter()
            .map(String::as_str)
            .chain(std::iter::once("en"))
            .find_map(|lang| description.get(lang).filter(|text| !text.trim().is_empty()))
            .cloned()
            .unwrap_or_else(|| self.placeholder.clone())
    }

    /// Builds a series in milliseconds, strictly increasing, holding at most
    /// the range's bucket count (the most recent buckets win)
    pub fn to_price_series(
        &self,
        symbol: &str,
        range: RangeSelector,
        raw: &RawHistory,
    ) -> Result<PriceSeries, ProviderError> {
        let mut points = Vec::with_capacity(raw.buckets.len());

        for bucket in &raw.buckets {
            let time = bucket
                .time
                .ok_or_else(|| ProviderError::malformed("history bucket without time"))?;
            let timestamp_millis = match raw.time_unit {
                TimeUnit::Seconds => time
                    .checked_mul(1000)
                    .ok_or_else(|| ProviderError::malformed(format!("timestamp out of range: {}", time)))?,
                TimeUnit::Millis => time,
            };
            let close = bucket
                .close
                .ok_or_else(|| ProviderError::malformed("history bucket without close"))?;

            points.push(PricePoint {
                timestamp_millis,
                price: to_decimal("close", close)?,
                volume: optional_amount("volume", bucket.volume)?,
            });
        }

        if points.windows(2).any(|w| w[0].timestamp_millis >= w[1].timestamp_millis) {
            tracing::debug!(symbol = symbol, "Reordering out-of-order history buckets");
            points.sort_by_key(|p| p.timestamp_millis);
            // keep the last bucket reported for a timestamp
            points.reverse();
            points.dedup_by_key(|p| p.timestamp_millis);
            points.reverse();
        }

        let wanted = range.point_count() as usize;
        if points.len() > wanted {
            points.drain(..points.len() - wanted);
        }

        Ok(PriceSeries {
            symbol: symbol.to_uppercase(),
            range,
            currency: BASE_CURRENCY.to_string(),
            points,
        })
    }

    pub fn to_exchange_rate(&self, raw: &RawRate) -> Result<ExchangeRate, ProviderError> {
        let value = raw
            .rate
            .ok_or_else(|| ProviderError::NotFound(format!("no rate for {}", raw.target)))?;
        let rate = to_decimal("rate", value)?;
        if rate <= Decimal::ZERO {
            return Err(ProviderError::malformed(format!(
                "non-positive rate for {}: {}",
                raw.target, value
            )));
        }

        Ok(ExchangeRate {
            base: raw.base.to_uppercase(),
            target: raw.target.to_uppercase(),
            rate,
            fetched_at: Utc::now(),
        })
    }
}

/// Converts the monetary fields of an entity with an exchange rate
///
/// A rate only applies to entities denominated in its base currency, so
/// converting twice is impossible; anything else comes back unchanged.
pub trait ApplyExchangeRate: Sized {
    fn apply_exchange_rate(self, rate: &ExchangeRate) -> Self;
}

fn convert(amount: Decimal, rate: &ExchangeRate) -> Decimal {
    amount.saturating_mul(rate.rate)
}

fn convert_map(map: HashMap<String, Decimal>, rate: &ExchangeRate) -> HashMap<String, Decimal> {
    let mut map = map;
    if let Some(amount) = map.remove(&rate.base) {
        map.insert(rate.target.clone(), convert(amount, rate));
    }
    map
}

impl ApplyExchangeRate for CoinSummary {
    fn apply_exchange_rate(self, rate: &ExchangeRate) -> Self {
        if rate.is_identity() || self.currency != rate.base {
            return self;
        }
        CoinSummary {
            current_price: convert(self.current_price, rate),
            market_cap: convert(self.market_cap, rate),
            volume_24h: convert(self.volume_24h, rate),
            currency: rate.target.clone(),
            ..self
        }
    }
}

impl<T: ApplyExchangeRate> ApplyExchangeRate for Vec<T> {
    fn apply_exchange_rate(self, rate: &ExchangeRate) -> Self {
        self.into_iter().map(|item| item.apply_exchange_rate(rate)).collect()
    }
}

impl ApplyExchangeRate for CoinDetail {
    fn apply_exchange_rate(self, rate: &ExchangeRate) -> Self {
        if rate.is_identity() {
            return self;
        }
        CoinDetail {
            current_price_by_currency: convert_map(self.current_price_by_currency, rate),
            market_cap_by_currency: convert_map(self.market_cap_by_currency, rate),
            volume_24h_by_currency: convert_map(self.volume_24h_by_currency, rate),
            ..self
        }
    }
}

impl ApplyExchangeRate for PriceSeries {
    fn apply_exchange_rate(self, rate: &ExchangeRate) -> Self {
        if rate.is_identity() || self.currency != rate.base {
            return self;
        }
        PriceSeries {
            points: self
                .points
                .into_iter()
                .map(|p| PricePoint {
                    timestamp_millis: p.timestamp_millis,
                    price: convert(p.price, rate),
                    volume: p.volume.map(|v| convert(v, rate)),
                })
                .collect(),
            currency: rate.target.clone(),
            ..self
        }
    }
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required_text(field: &str, value: Option<&str>) -> Result<String, ProviderError> {
    optional_text(value).ok_or_else(|| ProviderError::malformed(format!("missing {}", field)))
}

fn to_decimal(field: &str, value: f64) -> Result<Decimal, ProviderError> {
    Decimal::from_f64(value)
        .ok_or_else(|| ProviderError::malformed(format!("{} is not a finite amount: {}", field, value)))
}

fn amount_or_zero(field: &str, value: Option<f64>) -> Result<Decimal, ProviderError> {
    value.map_or(Ok(Decimal::ZERO), |v| to_decimal(field, v))
}

fn optional_amount(field: &str, value: Option<f64>) -> Result<Option<Decimal>, ProviderError> {
    value.map(|v| to_decimal(field, v)).transpose()
}

fn rank(value: Option<i64>) -> u32 {
    value.and_then(|r| u32::try_from(r).ok()).unwrap_or(0)
}

//! CoinGecko listing and detail provider

use crate::{
    constants::{BASE_CURRENCY, COINGECKO_MAX_PER_PAGE, TOP_COINS_LIMIT},
    error::ProviderError,
    provider::ListingProvider,
    providers::http::{build_client, get_json},
    raw::{RawCoinMeta, RawQuote, RawTicker},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// `/coins/markets` entry
#[derive(Debug, Deserialize)]
struct CoinGeckoMarket {
    id: Option<String>,
    symbol: Option<String>,
    name: Option<String>,
    image: Option<String>,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    market_cap_rank: Option<i64>,
    total_volume: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    circulating_supply: Option<f64>,
    max_supply: Option<f64>,
}

/// `/coins/{id}` body
#[derive(Debug, Deserialize)]
struct CoinGeckoCoin {
    id: Option<String>,
    symbol: Option<String>,
    name: Option<String>,
    market_cap_rank: Option<i64>,
    #[serde(default)]
    description: HashMap<String, Option<String>>,
    image: Option<CoinGeckoImage>,
    market_data: Option<CoinGeckoMarketData>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoImage {
    large: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CoinGeckoMarketData {
    #[serde(default)]
    current_price: HashMap<String, Option<f64>>,
    #[serde(default)]
    market_cap: HashMap<String, Option<f64>>,
    #[serde(default)]
    total_volume: HashMap<String, Option<f64>>,
    price_change_percentage_24h: Option<f64>,
    circulating_supply: Option<f64>,
    max_supply: Option<f64>,
}

fn usd(map: &HashMap<String, Option<f64>>) -> Option<f64> {
    map.get(&BASE_CURRENCY.to_lowercase()).copied().flatten()
}

impl From<CoinGeckoMarket> for RawTicker {
    fn from(market: CoinGeckoMarket) -> Self {
        RawTicker {
            id: market.id,
            name: market.name,
            symbol: market.symbol,
            rank: market.market_cap_rank,
            image_url: market.image,
            quote: Some(RawQuote {
                price: market.current_price,
                market_cap: market.market_cap,
                volume_24h: market.total_volume,
                percent_change_24h: market.price_change_percentage_24h,
            }),
            circulating_supply: market.circulating_supply,
            max_supply: market.max_supply,
        }
    }
}

impl CoinGeckoCoin {
    fn into_ticker(self) -> RawTicker {
        let (quote, circulating_supply, max_supply) = match self.market_data {
            Some(data) => (
                Some(RawQuote {
                    price: usd(&data.current_price),
                    market_cap: usd(&data.market_cap),
                    volume_24h: usd(&data.total_volume),
                    percent_change_24h: data.price_change_percentage_24h,
                }),
                data.circulating_supply,
                data.max_supply,
            ),
            None => (None, None, None),
        };
        RawTicker {
            id: self.id,
            name: self.name,
            symbol: self.symbol,
            rank: self.market_cap_rank,
            image_url: self.image.and_then(|i| i.large),
            quote,
            circulating_supply,
            max_supply,
        }
    }

    fn into_meta(self) -> RawCoinMeta {
        let descriptions = self
            .description
            .into_iter()
            .filter_map(|(lang, text)| text.map(|t| (lang, t)))
            .collect();
        RawCoinMeta {
            id: self.id,
            name: self.name,
            symbol: self.symbol,
            image_url: self.image.and_then(|i| i.large),
            descriptions,
        }
    }
}

/// CoinGecko provider
///
/// Ids are CoinGecko slugs such as `bitcoin`. Both halves of a coin detail
/// come from the same `/coins/{id}` endpoint.
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
    per_page: usize,
}

impl CoinGeckoProvider {
    /// Creates a new CoinGecko provider against `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            per_page: TOP_COINS_LIMIT,
        })
    }

    /// Sets how many markets the listing asks for, clamped to what the API
    /// serves on one page
    pub fn with_page_size(mut self, per_page: usize) -> Self {
        self.per_page = per_page.clamp(1, COINGECKO_MAX_PER_PAGE);
        self
    }

    async fn fetch_coin(&self, id: &str, localization: bool) -> Result<CoinGeckoCoin, ProviderError> {
        let url = format!("{}/coins/{}", self.base_url, id);
        let query = [
            ("localization", localization.to_string()),
            ("tickers", "false".to_string()),
            ("market_data", (!localization).to_string()),
            ("community_data", "false".to_string()),
            ("developer_data", "false".to_string()),
            ("sparkline", "false".to_string()),
        ];
        get_json(&self.client, self.provider_name(), &url, &query).await
    }
}

#[async_trait]
impl ListingProvider for CoinGeckoProvider {
    async fn fetch_ranked_tickers(&self) -> Result<Vec<RawTicker>, ProviderError> {
        let url = format!("{}/coins/markets", self.base_url);
        let query = [
            ("vs_currency", BASE_CURRENCY.to_lowercase()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", self.per_page.to_string()),
            ("page", "1".to_string()),
            ("sparkline", "false".to_string()),
        ];
        let markets: Vec<CoinGeckoMarket> =
            get_json(&self.client, self.provider_name(), &url, &query).await?;

        tracing::debug!(count = markets.len(), "Fetched markets from CoinGecko");
        Ok(markets.into_iter().map(RawTicker::from).collect())
    }

    async fn fetch_coin_meta(&self, id: &str) -> Result<RawCoinMeta, ProviderError> {
        Ok(self.fetch_coin(id, true).await?.into_meta())
    }

    async fn fetch_coin_ticker(&self, id: &str) -> Result<RawTicker, ProviderError> {
        Ok(self.fetch_coin(id, false).await?.into_ticker())
    }

    fn provider_name(&self) -> &'static str {
        "coingecko"
    }
}

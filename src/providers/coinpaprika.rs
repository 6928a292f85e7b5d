//! CoinPaprika listing and detail provider

use crate::{
    constants::COINPAPRIKA_IMAGE_URL,
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

/// `/tickers` and `/tickers/{id}` entry
#[derive(Debug, Deserialize)]
struct PaprikaTicker {
    id: Option<String>,
    name: Option<String>,
    symbol: Option<String>,
    rank: Option<i64>,
    circulating_supply: Option<f64>,
    max_supply: Option<f64>,
    #[serde(default)]
    quotes: HashMap<String, PaprikaQuote>,
}

#[derive(Debug, Deserialize)]
struct PaprikaQuote {
    price: Option<f64>,
    market_cap: Option<f64>,
    volume_24h: Option<f64>,
    percent_change_24h: Option<f64>,
}

/// `/coins/{id}` body
#[derive(Debug, Deserialize)]
struct PaprikaCoin {
    id: Option<String>,
    name: Option<String>,
    symbol: Option<String>,
    description: Option<String>,
    logo: Option<String>,
}

fn logo_url(id: &str) -> String {
    format!("{}/{}/logo.png", COINPAPRIKA_IMAGE_URL, id)
}

impl From<PaprikaTicker> for RawTicker {
    fn from(mut ticker: PaprikaTicker) -> Self {
        let quote = ticker.quotes.remove("USD").map(|q| RawQuote {
            price: q.price,
            market_cap: q.market_cap,
            volume_24h: q.volume_24h,
            percent_change_24h: q.percent_change_24h,
        });
        RawTicker {
            image_url: ticker.id.as_deref().map(logo_url),
            id: ticker.id,
            name: ticker.name,
            symbol: ticker.symbol,
            rank: ticker.rank,
            quote,
            circulating_supply: ticker.circulating_supply,
            max_supply: ticker.max_supply,
        }
    }
}

impl From<PaprikaCoin> for RawCoinMeta {
    fn from(coin: PaprikaCoin) -> Self {
        // CoinPaprika only publishes English descriptions
        let descriptions = coin
            .description
            .map(|text| HashMap::from([("en".to_string(), text)]))
            .unwrap_or_default();
        RawCoinMeta {
            image_url: coin.logo.or_else(|| coin.id.as_deref().map(logo_url)),
            id: coin.id,
            name: coin.name,
            symbol: coin.symbol,
            descriptions,
        }
    }
}

/// CoinPaprika provider
///
/// Ids are CoinPaprika slugs such as `btc-bitcoin`.
pub struct CoinPaprikaProvider {
    client: Client,
    base_url: String,
}

impl CoinPaprikaProvider {
    /// Creates a new CoinPaprika provider against `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ListingProvider for CoinPaprikaProvider {
    async fn fetch_ranked_tickers(&self) -> Result<Vec<RawTicker>, ProviderError> {
        let url = format!("{}/tickers", self.base_url);
        let tickers: Vec<PaprikaTicker> =
            get_json(&self.client, self.provider_name(), &url, &[]).await?;

        tracing::debug!(count = tickers.len(), "Fetched tickers from CoinPaprika");
        Ok(tickers.into_iter().map(RawTicker::from).collect())
    }

    async fn fetch_coin_meta(&self, id: &str) -> Result<RawCoinMeta, ProviderError> {
        let url = format!("{}/coins/{}", self.base_url, id);
        let coin: PaprikaCoin = get_json(&self.client, self.provider_name(), &url, &[]).await?;
        Ok(coin.into())
    }

    async fn fetch_coin_ticker(&self, id: &str) -> Result<RawTicker, ProviderError> {
        let url = format!("{}/tickers/{}", self.base_url, id);
        let ticker: PaprikaTicker = get_json(&self.client, self.provider_name(), &url, &[]).await?;
        Ok(ticker.into())
    }

    fn provider_name(&self) -> &'static str {
        "coinpaprika"
    }
}

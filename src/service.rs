//! Market data service
//!
//! The facade the dashboard talks to. Every read follows the same path:
//! cache hit, or a retried upstream fetch that is normalized and cached,
//! or the last cached value flagged stale, or a typed error.

use crate::{
    cache::TtlCache,
    config::{ListingProviderKind, MarketDataConfig},
    constants::BASE_CURRENCY,
    error::{MarketDataError, ProviderError, ResourceKind},
    metrics::{MetricsCollector, ProviderMetrics},
    normalize::{ApplyExchangeRate, Normalizer},
    provider::{ExchangeRateProvider, HistoryProvider, ListingProvider},
    providers::{CoinGeckoProvider, CoinPaprikaProvider, CryptoCompareProvider, OpenErApiProvider},
    retry::RetryPolicy,
    single_flight::{run_detached, SingleFlight},
    types::{
        is_base_currency, normalize_currency_code, CoinDetail, CoinSummary, ExchangeRate, Fetched,
        PriceSeries, RangeSelector,
    },
};
use futures::future::{BoxFuture, FutureExt};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Cache, in-flight map and metrics for one kind of resource
struct Resource<K, V> {
    kind: ResourceKind,
    cache: Arc<TtlCache<K, V>>,
    inflight: SingleFlight<K, V>,
    metrics: Arc<MetricsCollector>,
}

impl<K, V> Resource<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn new(
        kind: ResourceKind,
        ttl: Duration,
        surface: &'static str,
        provider_name: &'static str,
    ) -> Self {
        Self {
            kind,
            cache: Arc::new(TtlCache::new(ttl)),
            inflight: SingleFlight::new(),
            metrics: Arc::new(MetricsCollector::new(surface, provider_name)),
        }
    }

    /// Serves `key` from cache, or through `fetch` with stale fallback
    ///
    /// `fetch` must already include retries. It runs on its own task, so a
    /// caller that gives up does not cancel it, and a successful result is
    /// cached before any waiting caller sees it.
    async fn load<F>(
        &self,
        key: K,
        resource: &str,
        single_flight: bool,
        fetch: F,
    ) -> Result<Fetched<V>, MarketDataError>
    where
        F: FnOnce() -> BoxFuture<'static, Result<V, ProviderError>> + Send,
    {
        if let Some(entry) = self.cache.get_entry(&key).await {
            let age = entry.age();
            return Ok(Fetched::fresh(entry.value, age));
        }

        let cache = Arc::clone(&self.cache);
        let metrics = Arc::clone(&self.metrics);
        let cache_key = key.clone();
        let start = move || {
            let fetch = fetch();
            async move {
                let started = Instant::now();
                let result = fetch.await;
                metrics.record_request(started.elapsed(), result.is_ok()).await;
                if let Ok(value) = &result {
                    cache.put(cache_key, value.clone()).await;
                }
                result
            }
            .boxed()
        };

        let result = if single_flight {
            self.inflight.run(key.clone(), start).await
        } else {
            run_detached(start()).await
        };

        match result {
            Ok(value) => Ok(Fetched::fresh(value, Duration::ZERO)),
            Err(e) => match self.cache.get_stale_entry(&key).await {
                Some(entry) => {
                    let age = entry.age();
                    tracing::warn!(
                        resource = resource,
                        age_ms = age.as_millis() as u64,
                        error = %e,
                        "Upstream failed, serving stale data"
                    );
                    Ok(Fetched::stale(entry.value, age))
                }
                None => {
                    tracing::error!(resource = resource, kind = %e.kind(), error = %e, "Upstream failed with nothing cached");
                    Err(MarketDataError::upstream(self.kind, resource, e))
                }
            },
        }
    }
}

/// Market data service
///
/// Owns one cache per resource kind, each with its own TTL. Entities are
/// cached in USD and converted to the display currency on the way out, so
/// a single cached listing serves every currency.
///
/// # Example
/// ```no_run
/// use market_data_sdk::{MarketDataConfig, MarketDataService};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = MarketDataService::new(MarketDataConfig::from_env())?;
/// let coins = service.get_top_coins("TWD").await?;
/// if coins.is_stale() {
///     println!("showing cached prices");
/// }
/// for coin in coins.data.iter().take(10) {
///     println!("{} {} {}", coin.market_cap_rank, coin.symbol, coin.current_price);
/// }
/// # Ok(())
/// # }
/// ```
pub struct MarketDataService {
    config: MarketDataConfig,
    listing: Arc<dyn ListingProvider>,
    history: Arc<dyn HistoryProvider>,
    rates: Arc<dyn ExchangeRateProvider>,
    normalizer: Arc<Normalizer>,
    retry: RetryPolicy,
    top_coins: Resource<(), Vec<CoinSummary>>,
    coin_details: Resource<String, CoinDetail>,
    price_histories: Resource<(String, RangeSelector), PriceSeries>,
    exchange_rates: Resource<String, ExchangeRate>,
}

impl MarketDataService {
    /// Creates a service talking to the upstream APIs named in `config`
    pub fn new(config: MarketDataConfig) -> Result<Self, ProviderError> {
        let timeout = config.request_timeout();

        let listing: Arc<dyn ListingProvider> = match config.listing_provider {
            ListingProviderKind::CoinPaprika => {
                Arc::new(CoinPaprikaProvider::new(&config.coinpaprika_url, timeout)?)
            }
            ListingProviderKind::CoinGecko => {
                Arc::new(
                    CoinGeckoProvider::new(&config.coingecko_url, timeout)?
                        .with_page_size(config.top_coins_limit),
                )
            }
        };
        let history = Arc::new(CryptoCompareProvider::new(
            &config.cryptocompare_url,
            timeout,
            config.cryptocompare_api_key.clone(),
        )?);
        let rates = Arc::new(OpenErApiProvider::new(&config.open_er_api_url, timeout)?);

        Ok(Self::with_providers(config, listing, history, rates))
    }

    /// Creates a service with custom providers
    ///
    /// This is primarily for testing with mock providers.
    pub fn with_providers(
        config: MarketDataConfig,
        listing: Arc<dyn ListingProvider>,
        history: Arc<dyn HistoryProvider>,
        rates: Arc<dyn ExchangeRateProvider>,
    ) -> Self {
        tracing::info!(
            listing = listing.provider_name(),
            history = history.provider_name(),
            rates = rates.provider_name(),
            single_flight = config.single_flight,
            "Creating market data service"
        );

        Self {
            top_coins: Resource::new(
                ResourceKind::TopCoins,
                config.top_coins_ttl(),
                "top_coins",
                listing.provider_name(),
            ),
            coin_details: Resource::new(
                ResourceKind::CoinDetail,
                config.coin_detail_ttl(),
                "coin_detail",
                listing.provider_name(),
            ),
            price_histories: Resource::new(
                ResourceKind::PriceHistory,
                config.price_history_ttl(),
                "price_history",
                history.provider_name(),
            ),
            exchange_rates: Resource::new(
                ResourceKind::ExchangeRate,
                config.exchange_rate_ttl(),
                "exchange_rate",
                rates.provider_name(),
            ),
            normalizer: Arc::new(config.normalizer()),
            retry: config.retry_policy(),
            listing,
            history,
            rates,
            config,
        }
    }

    pub fn config(&self) -> &MarketDataConfig {
        &self.config
    }

    /// Gets the ranked coin listing in `currency`
    ///
    /// # Arguments
    /// * `currency` - Display currency code, e.g. `USD` or `TWD`
    ///
    /// # Returns
    /// Up to `top_coins_limit` coins sorted by rank, flagged stale when
    /// served from an expired cache entry
    pub async fn get_top_coins(
        &self,
        currency: &str,
    ) -> Result<Fetched<Vec<CoinSummary>>, MarketDataError> {
        let currency = display_currency(currency)?;

        let coins = self
            .top_coins
            .load((), "top coins", self.config.single_flight, || {
                let listing = Arc::clone(&self.listing);
                let normalizer = Arc::clone(&self.normalizer);
                let retry = self.retry;
                let limit = self.config.top_coins_limit;
                async move {
                    let raw = retry
                        .execute("fetch_ranked_tickers", || listing.fetch_ranked_tickers())
                        .await?;
                    normalizer.to_coin_summaries(&raw, limit)
                }
                .boxed()
            })
            .await?;

        self.convert(coins, &currency).await
    }

    /// Gets one page of the ranked listing
    ///
    /// Pages are 1-based. A page past the end of the listing is empty.
    pub async fn get_top_coins_page(
        &self,
        currency: &str,
        page: usize,
        per_page: usize,
    ) -> Result<Fetched<Vec<CoinSummary>>, MarketDataError> {
        if page == 0 || per_page == 0 {
            return Err(MarketDataError::invalid(format!(
                "page and per_page must be at least 1, got page={} per_page={}",
                page, per_page
            )));
        }

        let coins = self.get_top_coins(currency).await?;
        let skip = (page - 1).saturating_mul(per_page);
        Ok(coins.map(|coins| coins.into_iter().skip(skip).take(per_page).collect()))
    }

    /// Gets the detail view of one coin in `currency`
    ///
    /// Metadata and quote are fetched concurrently, each with its own
    /// retries. If either fails the whole fetch fails.
    pub async fn get_coin_detail(
        &self,
        id: &str,
        currency: &str,
    ) -> Result<Fetched<CoinDetail>, MarketDataError> {
        let id = coin_id(id)?;
        let currency = display_currency(currency)?;
        let resource = format!("coin {}", id);

        let detail = self
            .coin_details
            .load(id.clone(), &resource, self.config.single_flight, || {
                let listing = Arc::clone(&self.listing);
                let normalizer = Arc::clone(&self.normalizer);
                let retry = self.retry;
                async move {
                    let (meta, ticker) = futures::try_join!(
                        retry.execute("fetch_coin_meta", || listing.fetch_coin_meta(&id)),
                        retry.execute("fetch_coin_ticker", || listing.fetch_coin_ticker(&id)),
                    )?;
                    normalizer.to_coin_detail(&meta, &ticker)
                }
                .boxed()
            })
            .await?;

        self.convert(detail, &currency).await
    }

    /// Gets the price history of `symbol` over `range` in `currency`
    ///
    /// An empty series is a valid answer and is cached like any other.
    pub async fn get_price_history(
        &self,
        symbol: &str,
        range: RangeSelector,
        currency: &str,
    ) -> Result<Fetched<PriceSeries>, MarketDataError> {
        let symbol = coin_symbol(symbol)?;
        let currency = display_currency(currency)?;
        let resource = format!("{} history ({} days)", symbol, range);

        let series = self
            .price_histories
            .load((symbol.clone(), range), &resource, self.config.single_flight, || {
                let history = Arc::clone(&self.history);
                let normalizer = Arc::clone(&self.normalizer);
                let retry = self.retry;
                async move {
                    let raw = retry
                        .execute("fetch_history_series", || {
                            history.fetch_history_series(&symbol, range)
                        })
                        .await?;
                    normalizer.to_price_series(&symbol, range, &raw)
                }
                .boxed()
            })
            .await?;

        self.convert(series, &currency).await
    }

    /// Gets how many units of `target` one USD buys
    ///
    /// USD itself is answered with the identity rate without a network call.
    pub async fn get_exchange_rate(
        &self,
        target: &str,
    ) -> Result<Fetched<ExchangeRate>, MarketDataError> {
        let target = display_currency(target)?;
        if is_base_currency(&target) {
            return Ok(Fetched::fresh(ExchangeRate::identity(BASE_CURRENCY), Duration::ZERO));
        }
        let resource = format!("exchange rate {}", target);

        self.exchange_rates
            .load(target.clone(), &resource, self.config.single_flight, || {
                let rates = Arc::clone(&self.rates);
                let normalizer = Arc::clone(&self.normalizer);
                let retry = self.retry;
                async move {
                    let raw = retry
                        .execute("fetch_usd_to_target_rate", || {
                            rates.fetch_usd_to_target_rate(&target)
                        })
                        .await?;
                    normalizer.to_exchange_rate(&raw)
                }
                .boxed()
            })
            .await
    }

    /// Gets fetch metrics for every upstream surface
    ///
    /// # Example
    /// ```no_run
    /// # use market_data_sdk::{MarketDataConfig, MarketDataService};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let service = MarketDataService::new(MarketDataConfig::default())?;
    /// for metrics in service.provider_metrics().await {
    ///     println!("{} via {}: p50={}ms, p99={}ms, success_rate={:.1}%",
    ///         metrics.surface,
    ///         metrics.provider_name,
    ///         metrics.latency_p50_ms,
    ///         metrics.latency_p99_ms,
    ///         metrics.success_rate * 100.0
    ///     );
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn provider_metrics(&self) -> Vec<ProviderMetrics> {
        vec![
            self.top_coins.metrics.get_metrics().await,
            self.coin_details.metrics.get_metrics().await,
            self.price_histories.metrics.get_metrics().await,
            self.exchange_rates.metrics.get_metrics().await,
        ]
    }

    /// Converts USD data into `currency`; the result is stale if either the
    /// data or the rate is
    async fn convert<T: ApplyExchangeRate>(
        &self,
        data: Fetched<T>,
        currency: &str,
    ) -> Result<Fetched<T>, MarketDataError> {
        if is_base_currency(currency) {
            return Ok(data);
        }
        let rate = self.get_exchange_rate(currency).await?;
        Ok(data
            .zip(rate)
            .map(|(value, rate)| value.apply_exchange_rate(&rate)))
    }
}

fn display_currency(code: &str) -> Result<String, MarketDataError> {
    normalize_currency_code(code)
        .ok_or_else(|| MarketDataError::invalid(format!("invalid currency code: {:?}", code)))
}

/// Provider slugs: letters, digits, `-`, `_` and `.`, with at least one
/// letter or digit so the id cannot collapse into a path segment like `..`
fn coin_id(id: &str) -> Result<String, MarketDataError> {
    let id = id.trim();
    if !id.chars().any(|c| c.is_ascii_alphanumeric())
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(MarketDataError::invalid(format!("invalid coin id: {:?}", id)));
    }
    Ok(id.to_string())
}

fn coin_symbol(symbol: &str) -> Result<String, MarketDataError> {
    let symbol = symbol.trim();
    if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(MarketDataError::invalid(format!("invalid symbol: {:?}", symbol)));
    }
    Ok(symbol.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::provider::mock::{ticker, MockProvider};
    use crate::raw::{RawBucket, RawHistory, TimeUnit};
    use crate::retry::RetryMode;
    use crate::types::Freshness;
    use rust_decimal_macros::dec;

    fn service_with(config: MarketDataConfig) -> (MarketDataService, Arc<MockProvider>) {
        let mock = Arc::new(MockProvider::new());
        let service = MarketDataService::with_providers(config, mock.clone(), mock.clone(), mock.clone());
        (service, mock)
    }

    fn service() -> (MarketDataService, Arc<MockProvider>) {
        service_with(MarketDataConfig::default())
    }

    fn history(count: i64, start_secs: i64, step_secs: i64) -> RawHistory {
        RawHistory {
            time_unit: TimeUnit::Seconds,
            buckets: (0..count)
                .map(|i| RawBucket {
                    time: Some(start_secs + i * step_secs),
                    close: Some(100.0 + i as f64),
                    volume: Some(1.0),
                })
                .collect(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_top_coins_served_from_cache_until_ttl() {
        let (service, mock) = service();
        mock.set_tickers(vec![
            ticker("btc-bitcoin", "btc", 1, 65000.0),
            ticker("eth-ethereum", "eth", 2, 3000.0),
        ]);

        let first = service.get_top_coins("USD").await.unwrap();
        assert_eq!(first.freshness, Freshness::Fresh);
        assert_eq!(mock.call_count("fetch_ranked_tickers"), 1);

        tokio::time::advance(Duration::from_millis(10_000)).await;
        let second = service.get_top_coins("USD").await.unwrap();
        assert_eq!(second.data, first.data);
        assert!(second.age >= Duration::from_millis(10_000));
        assert_eq!(mock.call_count("fetch_ranked_tickers"), 1);

        tokio::time::advance(Duration::from_millis(51_000)).await;
        let third = service.get_top_coins("USD").await.unwrap();
        assert_eq!(third.freshness, Freshness::Fresh);
        assert_eq!(mock.call_count("fetch_ranked_tickers"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_top_coins_sorted_and_limited() {
        let (service, mock) = service_with(MarketDataConfig {
            top_coins_limit: 2,
            ..MarketDataConfig::default()
        });
        mock.set_tickers(vec![
            ticker("unranked", "unr", 0, 1.0),
            ticker("eth-ethereum", "eth", 2, 3000.0),
            ticker("sol-solana", "sol", 3, 150.0),
            ticker("btc-bitcoin", "btc", 1, 65000.0),
        ]);

        let coins = service.get_top_coins("usd").await.unwrap().data;
        let ids: Vec<&str> = coins.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["btc-bitcoin", "eth-ethereum"]);
        assert_eq!(coins[0].symbol, "BTC");
    }

    #[tokio::test(start_paused = true)]
    async fn test_top_coins_page() {
        let (service, mock) = service();
        mock.set_tickers(vec![
            ticker("btc-bitcoin", "btc", 1, 65000.0),
            ticker("eth-ethereum", "eth", 2, 3000.0),
            ticker("sol-solana", "sol", 3, 150.0),
        ]);

        let page = service.get_top_coins_page("USD", 2, 2).await.unwrap().data;
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "sol-solana");

        let past_end = service.get_top_coins_page("USD", 5, 2).await.unwrap().data;
        assert!(past_end.is_empty());
        assert_eq!(mock.call_count("fetch_ranked_tickers"), 1);

        let err = service.get_top_coins_page("USD", 0, 2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_listing_after_upstream_failure() {
        let (service, mock) = service();
        mock.set_tickers(vec![ticker("btc-bitcoin", "btc", 1, 65000.0)]);
        let fresh = service.get_top_coins("USD").await.unwrap();

        tokio::time::advance(Duration::from_millis(61_000)).await;
        mock.fail_tickers(ProviderError::ServiceUnavailable("HTTP 503".into()));

        let stale = service.get_top_coins("USD").await.unwrap();
        assert_eq!(stale.freshness, Freshness::Stale);
        assert_eq!(stale.data, fresh.data);
        assert!(stale.age >= Duration::from_millis(61_000));
        // one success, then one initial attempt and three retries
        assert_eq!(mock.call_count("fetch_ranked_tickers"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_failure_keeps_error_kind() {
        let (service, mock) = service();
        mock.fail_tickers(ProviderError::RateLimited);

        let err = service.get_top_coins("USD").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(mock.call_count("fetch_ranked_tickers"), 4);

        let metrics = service.provider_metrics().await;
        assert_eq!(metrics[0].surface, "top_coins");
        assert_eq!(metrics[0].total_requests, 1);
        assert_eq!(metrics[0].failed_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detail_fails_when_ticker_fails() {
        let (service, mock) = service();
        mock.set_coin("eth-ethereum", "eth", 3000.0);
        mock.fail_coin_ticker(
            "eth-ethereum",
            ProviderError::ServiceUnavailable("HTTP 503".into()),
        );

        let err = service.get_coin_detail("eth-ethereum", "USD").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(mock.call_count("fetch_coin_ticker"), 4);
        assert_eq!(mock.call_count("fetch_coin_meta"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detail_falls_back_to_stale_when_ticker_fails() {
        let (service, mock) = service();
        mock.set_coin("btc-bitcoin", "btc", 65000.0);
        let fresh = service.get_coin_detail("btc-bitcoin", "USD").await.unwrap();
        assert_eq!(fresh.data.price_in("USD"), Some(dec!(65000)));
        assert_eq!(fresh.data.preferred_description, "About btc-bitcoin");

        tokio::time::advance(Duration::from_millis(61_000)).await;
        mock.fail_coin_ticker("btc-bitcoin", ProviderError::NetworkUnreachable("timeout".into()));

        let stale = service.get_coin_detail("btc-bitcoin", "USD").await.unwrap();
        assert!(stale.is_stale());
        assert_eq!(stale.data, fresh.data);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uniform_retry_retries_not_found() {
        let (service, mock) = service();
        mock.set_coin("gone", "gone", 1.0);
        mock.fail_coin_ticker("gone", ProviderError::NotFound("gone".into()));

        let err = service.get_coin_detail("gone", "USD").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(mock.call_count("fetch_coin_ticker"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_only_retry_fails_fast_on_not_found() {
        let (service, mock) = service_with(MarketDataConfig {
            retry_mode: RetryMode::TransientOnly,
            ..MarketDataConfig::default()
        });
        mock.set_coin("gone", "gone", 1.0);
        mock.fail_coin_ticker("gone", ProviderError::NotFound("gone".into()));

        let err = service.get_coin_detail("gone", "USD").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(mock.call_count("fetch_coin_ticker"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_day_history_has_144_ten_minute_points() {
        let (service, mock) = service();
        // the upstream answers with one bucket more than asked for
        mock.set_history("BTC", Ok(history(145, 1_700_000_000, 600)));

        let range: RangeSelector = "1".parse().unwrap();
        let series = service.get_price_history("btc", range, "USD").await.unwrap().data;

        assert_eq!(
            mock.last_history_request(),
            Some(("BTC".to_string(), RangeSelector::OneDay))
        );
        assert_eq!(series.len(), 144);
        assert!(series
            .points
            .windows(2)
            .all(|w| w[1].timestamp_millis - w[0].timestamp_millis == 600_000));
        assert_eq!(series.points[0].timestamp_millis, 1_700_000_600_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_history_is_cached_data() {
        let (service, mock) = service();
        mock.set_history("NEW", Ok(history(0, 0, 0)));

        let first = service
            .get_price_history("NEW", RangeSelector::SevenDays, "USD")
            .await
            .unwrap();
        assert!(first.data.is_empty());
        assert_eq!(first.freshness, Freshness::Fresh);

        let second = service
            .get_price_history("NEW", RangeSelector::SevenDays, "USD")
            .await
            .unwrap();
        assert!(second.data.is_empty());
        assert_eq!(mock.call_count("fetch_history_series"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_ranges_are_cached_separately() {
        let (service, mock) = service();
        mock.set_history("ETH", Ok(history(3, 1_700_000_000, 86_400)));

        service.get_price_history("ETH", RangeSelector::Days(90), "USD").await.unwrap();
        service.get_price_history("ETH", RangeSelector::Max, "USD").await.unwrap();
        service.get_price_history("ETH", RangeSelector::Days(90), "USD").await.unwrap();

        assert_eq!(mock.call_count("fetch_history_series"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_expires_after_five_minutes() {
        let (service, mock) = service();
        mock.set_tickers(vec![ticker("btc-bitcoin", "btc", 1, 65000.0)]);
        mock.set_history("BTC", Ok(history(3, 1_700_000_000, 600)));

        service.get_top_coins("USD").await.unwrap();
        service.get_price_history("BTC", RangeSelector::OneDay, "USD").await.unwrap();

        // past the listing TTL, well inside the history TTL
        tokio::time::advance(Duration::from_secs(61)).await;
        service.get_top_coins("USD").await.unwrap();
        let cached = service
            .get_price_history("BTC", RangeSelector::OneDay, "USD")
            .await
            .unwrap();
        assert_eq!(cached.freshness, Freshness::Fresh);
        assert!(cached.age >= Duration::from_secs(61));
        assert_eq!(mock.call_count("fetch_ranked_tickers"), 2);
        assert_eq!(mock.call_count("fetch_history_series"), 1);

        tokio::time::advance(Duration::from_secs(238)).await;
        service.get_price_history("BTC", RangeSelector::OneDay, "USD").await.unwrap();
        assert_eq!(mock.call_count("fetch_history_series"), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        let refetched = service
            .get_price_history("BTC", RangeSelector::OneDay, "USD")
            .await
            .unwrap();
        assert_eq!(refetched.age, Duration::ZERO);
        assert_eq!(mock.call_count("fetch_history_series"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_share_one_fetch() {
        let (service, mock) = service();
        mock.set_latency(Duration::from_millis(100));
        mock.set_tickers(vec![ticker("btc-bitcoin", "btc", 1, 65000.0)]);

        let results = futures::future::join_all((0..5).map(|_| service.get_top_coins("USD"))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(mock.call_count("fetch_ranked_tickers"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_without_single_flight() {
        let (service, mock) = service_with(MarketDataConfig {
            single_flight: false,
            ..MarketDataConfig::default()
        });
        mock.set_latency(Duration::from_millis(100));
        mock.set_tickers(vec![ticker("btc-bitcoin", "btc", 1, 65000.0)]);

        let results = futures::future::join_all((0..3).map(|_| service.get_top_coins("USD"))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(mock.call_count("fetch_ranked_tickers"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_request_still_fills_the_cache() {
        for single_flight in [true, false] {
            let (service, mock) = service_with(MarketDataConfig {
                single_flight,
                ..MarketDataConfig::default()
            });
            mock.set_latency(Duration::from_millis(100));
            mock.set_tickers(vec![ticker("btc-bitcoin", "btc", 1, 65000.0)]);

            let waited =
                tokio::time::timeout(Duration::from_millis(50), service.get_top_coins("USD")).await;
            assert!(waited.is_err());

            tokio::time::sleep(Duration::from_secs(1)).await;
            assert_eq!(service.top_coins.cache.len().await, 1);
            assert_eq!(service.top_coins.inflight.in_flight().await, 0);

            let coins = service.get_top_coins("USD").await.unwrap();
            assert_eq!(coins.freshness, Freshness::Fresh);
            assert_eq!(coins.data[0].id, "btc-bitcoin");
            assert_eq!(mock.call_count("fetch_ranked_tickers"), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_display_currency_conversion() {
        let (service, mock) = service();
        mock.set_tickers(vec![ticker("btc-bitcoin", "btc", 1, 100.0)]);
        mock.set_coin("btc-bitcoin", "btc", 100.0);
        mock.set_rate("TWD", Ok(32.0));

        let coins = service.get_top_coins("twd").await.unwrap().data;
        assert_eq!(coins[0].currency, "TWD");
        assert_eq!(coins[0].current_price, dec!(3200));
        assert_eq!(coins[0].market_cap, dec!(320000));

        let detail = service.get_coin_detail("btc-bitcoin", "TWD").await.unwrap().data;
        assert_eq!(detail.price_in("TWD"), Some(dec!(3200)));
        assert_eq!(detail.price_in("USD"), None);

        // the cached USD listing is untouched by conversion
        let usd = service.get_top_coins("USD").await.unwrap().data;
        assert_eq!(usd[0].current_price, dec!(100));
        assert_eq!(usd[0].currency, "USD");

        assert_eq!(mock.call_count("fetch_usd_to_target_rate"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_rate_makes_converted_result_stale() {
        let (service, mock) = service();
        mock.set_tickers(vec![ticker("btc-bitcoin", "btc", 1, 100.0)]);
        mock.set_rate("TWD", Ok(32.0));
        service.get_top_coins("TWD").await.unwrap();

        tokio::time::advance(Duration::from_secs(3601)).await;
        mock.set_rate("TWD", Err(ProviderError::ServiceUnavailable("HTTP 502".into())));

        let coins = service.get_top_coins("TWD").await.unwrap();
        assert!(coins.is_stale());
        assert_eq!(coins.data[0].current_price, dec!(3200));
        assert_eq!(mock.call_count("fetch_ranked_tickers"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_failure_without_cache_is_an_error() {
        let (service, mock) = service();
        mock.set_tickers(vec![ticker("btc-bitcoin", "btc", 1, 100.0)]);
        mock.set_rate("EUR", Err(ProviderError::ServiceUnavailable("HTTP 500".into())));

        let err = service.get_top_coins("EUR").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        assert!(err.to_string().contains("exchange rate EUR"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_currency_message_names_the_currency() {
        let (service, mock) = service();
        mock.set_tickers(vec![ticker("btc-bitcoin", "btc", 1, 100.0)]);

        let err = service.get_top_coins("XYZ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.user_message(), "The requested currency is not supported.");

        mock.set_history("ZZZ", Err(ProviderError::NotFound("ZZZ".into())));
        let err = service
            .get_price_history("ZZZ", RangeSelector::OneDay, "USD")
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "No price history is available for this coin.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_usd_rate_is_identity_without_network() {
        let (service, mock) = service();

        let rate = service.get_exchange_rate("usd").await.unwrap().data;
        assert!(rate.is_identity());
        assert_eq!(mock.call_count("fetch_usd_to_target_rate"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_requests_never_reach_upstream() {
        let (service, mock) = service();

        for err in [
            service.get_top_coins("US").await.unwrap_err(),
            service.get_coin_detail("", "USD").await.unwrap_err(),
            service.get_coin_detail("btc/bitcoin", "USD").await.unwrap_err(),
            service.get_coin_detail(".", "USD").await.unwrap_err(),
            service.get_coin_detail("..", "USD").await.unwrap_err(),
            service.get_coin_detail("-_.", "USD").await.unwrap_err(),
            service
                .get_price_history(" ", RangeSelector::OneDay, "USD")
                .await
                .unwrap_err(),
            service.get_exchange_rate("T W").await.unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        }

        assert_eq!(mock.call_count("fetch_ranked_tickers"), 0);
        assert_eq!(mock.call_count("fetch_coin_meta"), 0);
        assert_eq!(mock.call_count("fetch_coin_ticker"), 0);
        assert_eq!(mock.call_count("fetch_history_series"), 0);
    }
}

use market_data_sdk::{filter_coins, MarketDataConfig, MarketDataService};
use tracing_subscriber::EnvFilter;

/// Prints the ranked listing, optionally filtered
///
/// Usage: `cargo run --example top_coins -- [CURRENCY] [SEARCH]`
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let currency = args.next().unwrap_or_else(|| "USD".to_string());
    let query = args.next().unwrap_or_default();

    let service = MarketDataService::new(MarketDataConfig::from_env())?;

    let coins = match service.get_top_coins(&currency).await {
        Ok(coins) => coins,
        Err(e) => {
            eprintln!("Error: {}", e.user_message());
            eprintln!("       {}", e);
            return Ok(());
        }
    };

    if coins.is_stale() {
        println!("(showing cached data, {}s old)", coins.age.as_secs());
    }
    println!("{:>4}  {:<8} {:<24} {:>20} {:>8}", "#", "SYMBOL", "NAME", "PRICE", "24H %");
    println!("-----------------------------------------------------------------------");
    for coin in filter_coins(&coins.data, &query) {
        println!(
            "{:>4}  {:<8} {:<24} {:>16.2} {} {:>7.2}%",
            coin.market_cap_rank,
            coin.symbol,
            coin.name,
            coin.current_price,
            coin.currency,
            coin.price_change_pct_24h
        );
    }

    for metrics in service.provider_metrics().await {
        if metrics.total_requests > 0 {
            println!(
                "\n{} via {}: {:.0}ms, success rate {:.1}%",
                metrics.surface,
                metrics.provider_name,
                metrics.latency_p50_ms,
                metrics.success_rate * 100.0
            );
        }
    }

    Ok(())
}

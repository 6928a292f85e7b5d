use market_data_sdk::{MarketDataConfig, MarketDataService, RangeSelector};
use tracing_subscriber::EnvFilter;

/// Prints one coin's detail view and a summary of its price history
///
/// Usage: `cargo run --example coin_detail -- [ID] [SYMBOL] [RANGE] [CURRENCY]`
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let id = args.next().unwrap_or_else(|| "btc-bitcoin".to_string());
    let symbol = args.next().unwrap_or_else(|| "BTC".to_string());
    let range: RangeSelector = args.next().as_deref().unwrap_or("7").parse()?;
    let currency = args.next().unwrap_or_else(|| "USD".to_string()).to_uppercase();

    let service = MarketDataService::new(MarketDataConfig::from_env())?;

    let (detail, history) = tokio::join!(
        service.get_coin_detail(&id, &currency),
        service.get_price_history(&symbol, range, &currency)
    );

    match detail {
        Ok(detail) => {
            let coin = &detail.data;
            println!("{} ({})", coin.name, coin.symbol);
            println!("-------------------------------------------");
            if let Some(price) = coin.price_in(&currency) {
                println!("Price:              {:.2} {}", price, currency);
            }
            println!("24h change:         {:.2}%", coin.price_change_pct_24h);
            println!("Circulating supply: {}", coin.circulating_supply);
            match coin.max_supply {
                Some(max) => println!("Max supply:         {}", max),
                None => println!("Max supply:         uncapped"),
            }
            println!("\n{}", coin.preferred_description);
            if detail.is_stale() {
                println!("\n(cached data, {}s old)", detail.age.as_secs());
            }
        }
        Err(e) => eprintln!("Detail unavailable: {}", e.user_message()),
    }

    match history {
        Ok(history) => {
            let series = &history.data;
            println!("\n{} day history: {} points", range, series.len());
            if let (Some(first), Some(last)) = (series.points.first(), series.points.last()) {
                println!("  from {:.2} to {:.2} {}", first.price, last.price, series.currency);
            }
        }
        Err(e) => eprintln!("History unavailable: {}", e.user_message()),
    }

    Ok(())
}

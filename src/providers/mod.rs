//! Upstream provider implementations

pub mod coingecko;
pub mod coinpaprika;
pub mod cryptocompare;
pub(crate) mod http;
pub mod open_er_api;

pub use coingecko::CoinGeckoProvider;
pub use coinpaprika::CoinPaprikaProvider;
pub use cryptocompare::CryptoCompareProvider;
pub use open_er_api::OpenErApiProvider;

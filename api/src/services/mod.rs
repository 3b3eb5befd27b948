pub mod alchemy;
pub mod coingecko;
pub mod rpc;

pub use alchemy::AlchemyBalanceProvider;
pub use coingecko::{CoingeckoPriceProvider, MarketChartSource};
pub use rpc::{RpcBalanceProvider, TokenConfig};

pub mod balances;
pub mod error;
pub mod prices;
pub mod provider;
pub mod valuation;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use domain::{Chain, PortfolioReport, RawBalance};
use tracing::{info, warn};

pub use balances::{fetch_balances, validate_address, ChainBalances, FetchOptions};
pub use error::{PortfolioError, PortfolioResult};
pub use prices::{fetch_prices, normalize_symbols, FallbackPriceTable, PriceFetch};
pub use provider::{BalanceProvider, PriceProvider, TokenBalance, TokenMetadata};
pub use valuation::{decimal_amount, normalize, normalize_at};

#[async_trait]
pub trait PortfolioService: Send + Sync {
    async fn get_portfolio(&self, address: &str, chains: &[Chain]) -> PortfolioResult<PortfolioReport>;

    async fn quotes(&self, symbols: &[String]) -> PriceFetch;
}

#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    pub fetch: FetchOptions,
    pub price_timeout: Duration,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            fetch: FetchOptions::default(),
            price_timeout: Duration::from_secs(10),
        }
    }
}

/// Balances → prices → valuation, stateless per call.
#[derive(Clone)]
pub struct PortfolioAggregator {
    balances: Arc<dyn BalanceProvider>,
    prices: Arc<dyn PriceProvider>,
    fallback: FallbackPriceTable,
    options: AggregatorOptions,
}

impl PortfolioAggregator {
    pub fn new(
        balances: Arc<dyn BalanceProvider>,
        prices: Arc<dyn PriceProvider>,
        fallback: FallbackPriceTable,
        options: AggregatorOptions,
    ) -> Self {
        Self {
            balances,
            prices,
            fallback,
            options,
        }
    }
}

#[async_trait]
impl PortfolioService for PortfolioAggregator {
    async fn get_portfolio(&self, address: &str, chains: &[Chain]) -> PortfolioResult<PortfolioReport> {
        let fetched =
            fetch_balances(self.balances.as_ref(), address, chains, &self.options.fetch).await?;

        if !fetched.is_empty() && fetched.iter().all(|chain| !chain.is_available()) {
            // 全部鏈都失敗仍回傳空快照，由 networks 告知呼叫端
            warn!(
                address = %address.trim(),
                chains = fetched.len(),
                "no chain returned balances, reporting empty portfolio"
            );
        }

        let networks = fetched.iter().map(ChainBalances::status).collect();
        let balances: Vec<RawBalance> = fetched.into_iter().flat_map(|chain| chain.balances).collect();

        let prices = fetch_prices(
            self.prices.as_ref(),
            &self.fallback,
            balances.iter().map(|balance| balance.symbol.as_str()),
            self.options.price_timeout,
        )
        .await;

        let snapshot = normalize(&balances, &prices.quotes);
        info!(
            address = %address.trim(),
            assets = snapshot.assets.len(),
            total_usd_value = snapshot.total_usd_value,
            price_source = ?prices.source,
            "portfolio aggregated"
        );

        Ok(PortfolioReport {
            snapshot,
            networks,
            price_source: prices.source,
        })
    }

    async fn quotes(&self, symbols: &[String]) -> PriceFetch {
        fetch_prices(
            self.prices.as_ref(),
            &self.fallback,
            symbols,
            self.options.price_timeout,
        )
        .await
    }
}

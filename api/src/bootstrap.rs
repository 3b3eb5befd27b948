use std::sync::Arc;

use aggregator::{
    AggregatorOptions, BalanceProvider, FallbackPriceTable, FetchOptions, PortfolioAggregator,
};
use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
    config::{AppConfig, BalanceBackend},
    services::{AlchemyBalanceProvider, CoingeckoPriceProvider, RpcBalanceProvider, TokenConfig},
    state::AppState,
};

pub fn build_state(config: &AppConfig) -> Result<AppState> {
    let balances = build_balance_provider(config)?;

    let coingecko = Arc::new(CoingeckoPriceProvider::new(
        config.coingecko_api_base.clone(),
        config.token_price_ids.clone(),
    ));
    let fallback = FallbackPriceTable::default().with_overrides(&config.token_prices);

    let options = AggregatorOptions {
        fetch: FetchOptions {
            timeout: config.fetch_timeout,
            metadata_timeout: config.metadata_timeout,
            metadata_concurrency: config.metadata_concurrency,
        },
        price_timeout: config.price_timeout,
    };
    let portfolio = PortfolioAggregator::new(balances, coingecko.clone(), fallback, options);

    Ok(AppState {
        config: config.clone(),
        portfolio: Arc::new(portfolio),
        market: coingecko,
    })
}

fn build_balance_provider(config: &AppConfig) -> Result<Arc<dyn BalanceProvider>> {
    match config.balance_backend {
        BalanceBackend::Alchemy => {
            let api_key = config
                .alchemy_api_key
                .clone()
                .context("ALCHEMY_API_KEY is required for the alchemy backend")?;
            info!(chains = ?config.default_chains, "using alchemy balance backend");
            Ok(Arc::new(AlchemyBalanceProvider::new(
                config.alchemy_url_template.clone(),
                api_key,
            )))
        }
        BalanceBackend::Rpc => {
            let tokens: Vec<TokenConfig> = config
                .erc20_tokens
                .iter()
                .filter_map(|token| {
                    let parsed = TokenConfig::from_config(token);
                    if parsed.is_none() {
                        warn!(symbol = %token.symbol, address = %token.address, "ignoring token with invalid address");
                    }
                    parsed
                })
                .collect();
            let provider = RpcBalanceProvider::from_urls(&config.chain_rpc_urls, tokens)?;
            Ok(Arc::new(provider))
        }
    }
}

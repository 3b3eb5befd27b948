use std::time::Duration;

use anyhow::Context;
use domain::{Chain, ChainStatus, RawBalance};
use ethers::types::U256;
use futures_util::{
    future::{join_all, try_join},
    stream, StreamExt,
};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    error::{PortfolioError, PortfolioResult},
    provider::{BalanceProvider, TokenBalance},
};

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Upper bound for the native + token balance reads of one chain.
    pub timeout: Duration,
    /// Upper bound for a single token metadata lookup.
    pub metadata_timeout: Duration,
    pub metadata_concurrency: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            metadata_timeout: Duration::from_secs(5),
            metadata_concurrency: 4,
        }
    }
}

/// Balances for one chain. `error` is set when the chain could not be read at all.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainBalances {
    pub chain: Chain,
    pub balances: Vec<RawBalance>,
    pub error: Option<String>,
    pub dropped_tokens: Vec<String>,
}

impl ChainBalances {
    fn unavailable(chain: Chain, reason: String) -> Self {
        Self {
            chain,
            balances: Vec::new(),
            error: Some(reason),
            dropped_tokens: Vec::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.error.is_none()
    }

    pub fn status(&self) -> ChainStatus {
        ChainStatus {
            chain: self.chain,
            available: self.is_available(),
            error: self.error.clone(),
            balances_found: self.balances.len(),
            dropped_tokens: self.dropped_tokens.clone(),
        }
    }
}

/// EVM addresses are `0x` followed by 40 hex characters. Every supported
/// chain is EVM, so one format covers them all.
pub fn validate_address(address: &str) -> PortfolioResult<String> {
    let trimmed = address.trim();
    let valid = trimmed.len() == 42
        && (trimmed.starts_with("0x") || trimmed.starts_with("0X"))
        && trimmed[2..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(trimmed.to_string())
    } else {
        Err(PortfolioError::InvalidAddress {
            address: address.to_string(),
        })
    }
}

pub async fn fetch_balances(
    provider: &dyn BalanceProvider,
    address: &str,
    chains: &[Chain],
    options: &FetchOptions,
) -> PortfolioResult<Vec<ChainBalances>> {
    let address = validate_address(address)?;

    let mut unique = Vec::with_capacity(chains.len());
    for chain in chains {
        if !unique.contains(chain) {
            unique.push(*chain);
        }
    }

    info!(%address, chain_count = unique.len(), "fetching balances");
    let fetches = unique
        .into_iter()
        .map(|chain| fetch_chain(provider, &address, chain, options));
    Ok(join_all(fetches).await)
}

async fn fetch_chain(
    provider: &dyn BalanceProvider,
    address: &str,
    chain: Chain,
    options: &FetchOptions,
) -> ChainBalances {
    let (native, tokens) = match timeout(options.timeout, read_raw(provider, address, chain)).await {
        Ok(Ok(raw)) => raw,
        Ok(Err(err)) => return chain_unavailable(chain, format!("{err:#}")),
        Err(_) => {
            return chain_unavailable(
                chain,
                format!("timed out after {}ms", options.timeout.as_millis()),
            )
        }
    };

    let balances = resolve_balances(provider, chain, native, tokens, options).await;
    debug!(
        %chain,
        balances = balances.balances.len(),
        dropped = balances.dropped_tokens.len(),
        "chain balances fetched"
    );
    balances
}

fn chain_unavailable(chain: Chain, reason: String) -> ChainBalances {
    let err = PortfolioError::ChainProviderUnavailable {
        chain,
        reason: reason.clone(),
    };
    warn!(error = %err, %chain, "skipping chain");
    ChainBalances::unavailable(chain, reason)
}

async fn read_raw(
    provider: &dyn BalanceProvider,
    address: &str,
    chain: Chain,
) -> anyhow::Result<(U256, Vec<TokenBalance>)> {
    try_join(
        async {
            provider
                .native_balance(address, chain)
                .await
                .context("native balance lookup failed")
        },
        async {
            provider
                .token_balances(address, chain)
                .await
                .context("token balance lookup failed")
        },
    )
    .await
}

/// Metadata lookups run after the chain deadline, each under its own
/// timeout; a token that cannot be resolved is dropped, never the chain.
async fn resolve_balances(
    provider: &dyn BalanceProvider,
    chain: Chain,
    native: U256,
    tokens: Vec<TokenBalance>,
    options: &FetchOptions,
) -> ChainBalances {
    let mut balances = Vec::new();
    if !native.is_zero() {
        let coin = chain.native_coin();
        balances.push(RawBalance {
            contract_address: None,
            raw_amount: native.to_string(),
            symbol: coin.symbol.to_string(),
            name: coin.name.to_string(),
            decimals: coin.decimals,
            chain,
        });
    }

    let nonzero: Vec<TokenBalance> = tokens
        .into_iter()
        .filter(|token| !token.raw_amount.is_zero())
        .collect();

    let metadata_timeout = options.metadata_timeout;
    let lookups: Vec<_> = stream::iter(nonzero)
        .map(|token| async move {
            let metadata = match timeout(
                metadata_timeout,
                provider.token_metadata(&token.contract_address, chain),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!(
                    "timed out after {}ms",
                    metadata_timeout.as_millis()
                )),
            };
            (token, metadata)
        })
        .buffered(options.metadata_concurrency.max(1))
        .collect()
        .await;

    let mut dropped_tokens = Vec::new();
    for (token, metadata) in lookups {
        let metadata = match metadata {
            Ok(Some(meta)) if !meta.symbol.trim().is_empty() => meta,
            Ok(_) => {
                let unresolved = PortfolioError::TokenMetadataUnresolved {
                    chain,
                    contract: token.contract_address.clone(),
                };
                debug!(error = %unresolved, "no token metadata, dropping token");
                dropped_tokens.push(token.contract_address);
                continue;
            }
            Err(err) => {
                let unresolved = PortfolioError::TokenMetadataUnresolved {
                    chain,
                    contract: token.contract_address.clone(),
                };
                warn!(
                    error = %unresolved,
                    cause = %format!("{err:#}"),
                    "token metadata lookup failed, dropping token"
                );
                dropped_tokens.push(token.contract_address);
                continue;
            }
        };
        let name = if metadata.name.trim().is_empty() {
            metadata.symbol.clone()
        } else {
            metadata.name
        };
        balances.push(RawBalance {
            contract_address: Some(token.contract_address),
            raw_amount: token.raw_amount.to_string(),
            symbol: metadata.symbol,
            name,
            decimals: metadata.decimals,
            chain,
        });
    }

    ChainBalances {
        chain,
        balances,
        error: None,
        dropped_tokens,
    }
}

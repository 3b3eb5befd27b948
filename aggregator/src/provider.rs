use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use domain::{Chain, PriceQuote};
use ethers::types::U256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    pub contract_address: String,
    pub raw_amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

/// Read-only access to on-chain balances. Implementations parse provider
/// payloads into these typed records and report transport failures as errors.
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    async fn native_balance(&self, address: &str, chain: Chain) -> Result<U256>;

    async fn token_balances(&self, address: &str, chain: Chain) -> Result<Vec<TokenBalance>>;

    /// `Ok(None)` when the provider has no metadata for the contract.
    async fn token_metadata(&self, contract: &str, chain: Chain) -> Result<Option<TokenMetadata>>;
}

/// Batched USD quotes keyed by uppercase symbol. Symbols the provider cannot
/// map are left out of the result.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn get_prices(&self, symbols: &BTreeSet<String>) -> Result<HashMap<String, PriceQuote>>;
}

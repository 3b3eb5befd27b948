use std::{collections::HashMap, str::FromStr, sync::Arc, time::Duration};

use aggregator::{BalanceProvider, TokenBalance, TokenMetadata};
use anyhow::{Context, Result};
use async_trait::async_trait;
use domain::Chain;
use ethers::{
    contract::abigen,
    providers::{Http, Middleware, Provider},
    types::{Address, U256},
};
use futures_util::future::join_all;
use tracing::{info, warn};

use crate::config::Erc20TokenConfig;

abigen!(
    Erc20Token,
    r#"[
        function balanceOf(address owner) view returns (uint256)
        function decimals() view returns (uint8)
        function symbol() view returns (string)
        function name() view returns (string)
    ]"#,
);

#[derive(Clone)]
pub struct TokenConfig {
    pub symbol: String,
    pub name: String,
    pub address: Address,
    pub decimals: u8,
    pub chain: Chain,
}

impl TokenConfig {
    pub fn from_config(token: &Erc20TokenConfig) -> Option<Self> {
        let address = Address::from_str(&token.address).ok()?;
        Some(Self {
            symbol: token.symbol.clone(),
            name: token.name.clone(),
            address,
            decimals: token.decimals,
            chain: token.chain,
        })
    }
}

/// Balances through plain EVM JSON-RPC. Token discovery is limited to the
/// configured token list; metadata for unlisted contracts is read on-chain.
pub struct RpcBalanceProvider {
    providers_by_chain: HashMap<Chain, Arc<Provider<Http>>>,
    tokens: Vec<TokenConfig>,
}

impl RpcBalanceProvider {
    pub fn new(providers_by_chain: HashMap<Chain, Arc<Provider<Http>>>, tokens: Vec<TokenConfig>) -> Self {
        info!(
            chains = providers_by_chain.len(),
            tokens = tokens.len(),
            "rpc balance provider ready"
        );
        Self {
            providers_by_chain,
            tokens,
        }
    }

    pub fn from_urls(urls: &HashMap<Chain, String>, tokens: Vec<TokenConfig>) -> Result<Self> {
        let mut providers = HashMap::new();
        for (chain, url) in urls {
            let provider = Provider::<Http>::try_from(url.as_str())
                .with_context(|| format!("invalid RPC url for {chain}"))?
                .interval(Duration::from_millis(500));
            providers.insert(*chain, Arc::new(provider));
        }
        Ok(Self::new(providers, tokens))
    }

    fn provider_for_chain(&self, chain: Chain) -> Result<Arc<Provider<Http>>> {
        self.providers_by_chain
            .get(&chain)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no RPC endpoint configured for {chain}"))
    }

    fn configured_token(&self, contract: Address, chain: Chain) -> Option<&TokenConfig> {
        self.tokens
            .iter()
            .find(|token| token.chain == chain && token.address == contract)
    }
}

#[async_trait]
impl BalanceProvider for RpcBalanceProvider {
    async fn native_balance(&self, address: &str, chain: Chain) -> Result<U256> {
        let owner = Address::from_str(address).context("invalid wallet address")?;
        let provider = self.provider_for_chain(chain)?;
        let balance = provider
            .get_balance(owner, None)
            .await
            .context("eth_getBalance failed")?;
        Ok(balance)
    }

    async fn token_balances(&self, address: &str, chain: Chain) -> Result<Vec<TokenBalance>> {
        let owner = Address::from_str(address).context("invalid wallet address")?;
        let provider = self.provider_for_chain(chain)?;

        let calls = self
            .tokens
            .iter()
            .filter(|token| token.chain == chain)
            .map(|token| {
                let contract = Erc20Token::new(token.address, provider.clone());
                async move { (token, contract.balance_of(owner).call().await) }
            });

        let mut balances = Vec::new();
        for (token, result) in join_all(calls).await {
            match result {
                Ok(raw_amount) => balances.push(TokenBalance {
                    contract_address: format!("{:#x}", token.address),
                    raw_amount,
                }),
                // 單一 token 失敗不影響整條鏈
                Err(err) => warn!(
                    error = %err,
                    %chain,
                    token = %token.symbol,
                    token_address = %token.address,
                    "erc20 balance_of call failed, skipping"
                ),
            }
        }
        Ok(balances)
    }

    async fn token_metadata(&self, contract: &str, chain: Chain) -> Result<Option<TokenMetadata>> {
        let address = Address::from_str(contract).context("invalid token contract")?;
        if let Some(token) = self.configured_token(address, chain) {
            return Ok(Some(TokenMetadata {
                symbol: token.symbol.clone(),
                name: token.name.clone(),
                decimals: token.decimals,
            }));
        }

        let provider = self.provider_for_chain(chain)?;
        let erc20 = Erc20Token::new(address, provider);
        let symbol_call = erc20.symbol();
        let name_call = erc20.name();
        let decimals_call = erc20.decimals();
        let (symbol, name, decimals) = futures_util::try_join!(
            symbol_call.call(),
            name_call.call(),
            decimals_call.call()
        )
        .context("erc20 metadata call failed")?;
        if symbol.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(TokenMetadata {
            symbol: symbol.trim().to_string(),
            name: name.trim().to_string(),
            decimals,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc_config(chain: Chain) -> Erc20TokenConfig {
        Erc20TokenConfig {
            symbol: "USDC".to_string(),
            name: "USDC".to_string(),
            address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string(),
            decimals: 6,
            chain,
        }
    }

    #[test]
    fn token_config_requires_valid_address() {
        assert!(TokenConfig::from_config(&usdc_config(Chain::Ethereum)).is_some());
        let mut broken = usdc_config(Chain::Ethereum);
        broken.address = "not-hex".to_string();
        assert!(TokenConfig::from_config(&broken).is_none());
    }

    #[tokio::test]
    async fn configured_metadata_short_circuits_rpc() {
        let token = TokenConfig::from_config(&usdc_config(Chain::Base)).unwrap();
        let provider = RpcBalanceProvider::new(HashMap::new(), vec![token]);

        let meta = provider
            .token_metadata("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", Chain::Base)
            .await
            .expect("metadata")
            .expect("configured");
        assert_eq!(meta.decimals, 6);
        assert_eq!(meta.symbol, "USDC");
    }

    #[tokio::test]
    async fn missing_endpoint_is_an_error() {
        let provider = RpcBalanceProvider::new(HashMap::new(), Vec::new());
        let err = provider
            .native_balance("0x00000000000000000000000000000000000000aa", Chain::Polygon)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("polygon"));
    }
}

use std::{collections::HashMap, env, time::Duration};

use anyhow::{Context, Result};
use domain::Chain;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Erc20TokenConfig {
    pub symbol: String,
    pub name: String,
    pub address: String,
    pub decimals: u8,
    pub chain: Chain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BalanceBackend {
    /// Hosted Alchemy JSON-RPC with token discovery.
    Alchemy,
    /// Plain EVM JSON-RPC plus a configured token list.
    Rpc,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub frontend_origins: Vec<String>,
    pub balance_backend: BalanceBackend,
    pub alchemy_api_key: Option<String>,
    pub alchemy_url_template: String,
    pub chain_rpc_urls: HashMap<Chain, String>,
    pub erc20_tokens: Vec<Erc20TokenConfig>,
    pub coingecko_api_base: String,
    pub token_price_ids: HashMap<String, String>,
    pub token_prices: HashMap<String, f64>,
    pub default_chains: Vec<Chain>,
    pub fetch_timeout: Duration,
    pub metadata_timeout: Duration,
    pub price_timeout: Duration,
    pub metadata_concurrency: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let balance_backend = match env::var("BALANCE_BACKEND")
            .unwrap_or_else(|_| "alchemy".to_string())
            .trim()
            .to_lowercase()
            .as_str()
        {
            "rpc" => BalanceBackend::Rpc,
            "alchemy" | "" => BalanceBackend::Alchemy,
            other => anyhow::bail!("BALANCE_BACKEND must be `alchemy` or `rpc`, got `{other}`"),
        };
        let alchemy_api_key = env::var("ALCHEMY_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        if balance_backend == BalanceBackend::Alchemy && alchemy_api_key.is_none() {
            anyhow::bail!("ALCHEMY_API_KEY must be set when BALANCE_BACKEND=alchemy");
        }

        let chain_rpc_urls = parse_chain_urls("CHAIN_RPC_URLS");
        if balance_backend == BalanceBackend::Rpc && chain_rpc_urls.is_empty() {
            anyhow::bail!("CHAIN_RPC_URLS must list at least one chain when BALANCE_BACKEND=rpc");
        }

        let default_chains = match env::var("DEFAULT_CHAINS") {
            Ok(raw) => parse_chain_list(&raw).context("DEFAULT_CHAINS is invalid")?,
            Err(_) => vec![Chain::Ethereum, Chain::Base, Chain::Polygon],
        };

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8081".to_string())
                .parse()
                .context("PORT must be a valid u16")?,
            frontend_origins: parse_origins(),
            balance_backend,
            alchemy_api_key,
            alchemy_url_template: env::var("ALCHEMY_URL_TEMPLATE")
                .unwrap_or_else(|_| "https://{network}.g.alchemy.com/v2/{key}".to_string()),
            chain_rpc_urls,
            erc20_tokens: parse_erc20_tokens("ERC20_TOKENS"),
            coingecko_api_base: env::var("COINGECKO_API_BASE")
                .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string()),
            token_price_ids: parse_token_price_ids("TOKEN_PRICE_IDS"),
            token_prices: parse_token_prices("TOKEN_PRICES"),
            default_chains,
            fetch_timeout: parse_duration_seconds("FETCH_TIMEOUT_SECS", 10),
            metadata_timeout: parse_duration_seconds("METADATA_TIMEOUT_SECS", 5),
            price_timeout: parse_duration_seconds("PRICE_TIMEOUT_SECS", 10),
            metadata_concurrency: parse_usize("METADATA_CONCURRENCY", 4),
        })
    }
}

/// Comma-separated chain names, slugs or ids. Duplicates are removed.
pub fn parse_chain_list(raw: &str) -> Result<Vec<Chain>, domain::ParseChainError> {
    let mut chains = Vec::new();
    for item in raw.split(',') {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }
        let chain: Chain = trimmed.parse()?;
        if !chains.contains(&chain) {
            chains.push(chain);
        }
    }
    Ok(chains)
}

fn parse_origins() -> Vec<String> {
    if let Ok(list) = env::var("FRONTEND_ORIGINS") {
        split_origins(&list)
    } else if let Ok(origin) = env::var("FRONTEND_ORIGIN") {
        split_origins(&origin)
    } else {
        vec!["http://localhost:3000".to_string()]
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|item| {
            let trimmed = item.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn parse_duration_seconds(key: &str, default: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default))
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_erc20_tokens(key: &str) -> Vec<Erc20TokenConfig> {
    match env::var(key) {
        Ok(raw) => erc20_tokens_from_str(&raw),
        Err(_) => Vec::new(),
    }
}

/// `SYMBOL:address:decimals[:chain]` entries; decimals default to 18, chain to Ethereum.
fn erc20_tokens_from_str(raw: &str) -> Vec<Erc20TokenConfig> {
    raw.split(',')
        .filter_map(|item| {
            let trimmed = item.trim();
            if trimmed.is_empty() {
                return None;
            }
            let parts: Vec<_> = trimmed.split(':').collect();
            if parts.len() < 2 {
                return None;
            }
            let symbol = parts[0].trim().to_uppercase();
            let address = parts[1].trim().to_string();
            let decimals = parts
                .get(2)
                .and_then(|d| d.trim().parse::<u8>().ok())
                .unwrap_or(18);
            let chain = match parts.get(3) {
                Some(c) => c.trim().parse::<Chain>().ok()?,
                None => Chain::Ethereum,
            };
            if symbol.is_empty() || address.is_empty() {
                return None;
            }
            Some(Erc20TokenConfig {
                name: symbol.clone(),
                symbol,
                address,
                decimals,
                chain,
            })
        })
        .collect()
}

fn parse_token_prices(key: &str) -> HashMap<String, f64> {
    let raw = match env::var(key) {
        Ok(v) => v,
        Err(_) => return HashMap::new(),
    };

    raw.split(',')
        .filter_map(|item| {
            let (symbol, value) = item.split_once('=')?;
            let price = value.trim().parse::<f64>().ok()?;
            let symbol = symbol.trim().to_uppercase();
            if symbol.is_empty() {
                return None;
            }
            Some((symbol, price))
        })
        .collect()
}

fn parse_token_price_ids(key: &str) -> HashMap<String, String> {
    let raw = match env::var(key) {
        Ok(v) => v,
        Err(_) => return HashMap::new(),
    };

    raw.split(',')
        .filter_map(|item| {
            let (symbol, id) = item.split_once(':')?;
            let symbol = symbol.trim().to_uppercase();
            let id = id.trim().to_lowercase();
            if symbol.is_empty() || id.is_empty() {
                return None;
            }
            Some((symbol, id))
        })
        .collect()
}

fn parse_chain_urls(key: &str) -> HashMap<Chain, String> {
    let raw = match env::var(key) {
        Ok(v) => v,
        Err(_) => return HashMap::new(),
    };

    raw.split(',')
        .filter_map(|item| {
            let (chain, url) = item.split_once('=')?;
            let chain = chain.trim().parse::<Chain>().ok()?;
            let url = url.trim();
            if url.is_empty() {
                return None;
            }
            Some((chain, url.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_list_dedups_and_rejects_unknown() {
        assert_eq!(
            parse_chain_list("ethereum, 137,eth-mainnet,,base").unwrap(),
            vec![Chain::Ethereum, Chain::Polygon, Chain::Base]
        );
        assert!(parse_chain_list("ethereum,solana").is_err());
    }

    #[test]
    fn erc20_tokens_parse_with_defaults() {
        let tokens = erc20_tokens_from_str(
            "usdc:0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48:6, LINK:0x514910771AF9Ca656af840dff83E8264EcF986CA, \
             USDC:0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359:6:polygon, broken, X:0x1:6:solana",
        );
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].symbol, "USDC");
        assert_eq!(tokens[0].decimals, 6);
        assert_eq!(tokens[0].chain, Chain::Ethereum);
        assert_eq!(tokens[1].decimals, 18);
        assert_eq!(tokens[2].chain, Chain::Polygon);
    }
}

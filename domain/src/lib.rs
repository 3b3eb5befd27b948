use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported EVM networks.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Chain {
    Ethereum,
    Base,
    Polygon,
    Arbitrum,
    Optimism,
}

impl Chain {
    pub const ALL: [Chain; 5] = [
        Chain::Ethereum,
        Chain::Base,
        Chain::Polygon,
        Chain::Arbitrum,
        Chain::Optimism,
    ];

    pub fn chain_id(self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::Base => 8453,
            Chain::Polygon => 137,
            Chain::Arbitrum => 42161,
            Chain::Optimism => 10,
        }
    }

    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.chain_id() == chain_id)
    }

    /// Network slug used by hosted node providers (`eth-mainnet`, ...).
    pub fn network(self) -> &'static str {
        match self {
            Chain::Ethereum => "eth-mainnet",
            Chain::Base => "base-mainnet",
            Chain::Polygon => "polygon-mainnet",
            Chain::Arbitrum => "arb-mainnet",
            Chain::Optimism => "opt-mainnet",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Base => "base",
            Chain::Polygon => "polygon",
            Chain::Arbitrum => "arbitrum",
            Chain::Optimism => "optimism",
        }
    }

    pub fn native_coin(self) -> NativeCoin {
        match self {
            // Polygon 的原生幣是 MATIC，其餘 L1/L2 都是 ETH
            Chain::Polygon => NativeCoin {
                symbol: "MATIC",
                name: "Polygon",
                decimals: 18,
            },
            _ => NativeCoin {
                symbol: "ETH",
                name: "Ethereum",
                decimals: 18,
            },
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseChainError(pub String);

impl fmt::Display for ParseChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported chain: {}", self.0)
    }
}

impl std::error::Error for ParseChainError {}

impl FromStr for Chain {
    type Err = ParseChainError;

    /// Accepts a name (`polygon`), a network slug (`polygon-mainnet`) or a chain id (`137`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().to_lowercase();
        if let Ok(chain_id) = raw.parse::<u64>() {
            return Chain::from_chain_id(chain_id).ok_or_else(|| ParseChainError(s.to_string()));
        }
        match raw.as_str() {
            "ethereum" | "eth" | "mainnet" | "eth-mainnet" => Ok(Chain::Ethereum),
            "base" | "base-mainnet" => Ok(Chain::Base),
            "polygon" | "matic" | "polygon-mainnet" => Ok(Chain::Polygon),
            "arbitrum" | "arb" | "arb-mainnet" => Ok(Chain::Arbitrum),
            "optimism" | "op" | "opt-mainnet" => Ok(Chain::Optimism),
            _ => Err(ParseChainError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeCoin {
    pub symbol: &'static str,
    pub name: &'static str,
    pub decimals: u8,
}

/// A balance as reported by a chain, before `decimals` is applied.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RawBalance {
    /// `None` for the chain's native coin.
    pub contract_address: Option<String>,
    /// Base-10 integer in the token's smallest unit.
    pub raw_amount: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub chain: Chain,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PriceQuote {
    pub symbol: String,
    pub usd_price: f64,
    pub change_24h_percent: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ValuedAsset {
    pub symbol: String,
    pub name: String,
    pub decimal_balance: f64,
    pub usd_price: f64,
    pub usd_value: f64,
    pub change_24h_percent: f64,
    pub allocation_percent: f64,
    pub chains: BTreeSet<Chain>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PortfolioSnapshot {
    pub total_usd_value: f64,
    pub daily_change_usd: f64,
    pub daily_change_percent: f64,
    /// Sorted by `usd_value` descending, ties by symbol ascending.
    pub assets: Vec<ValuedAsset>,
    pub generated_at: DateTime<Utc>,
}

impl PortfolioSnapshot {
    pub fn empty(generated_at: DateTime<Utc>) -> Self {
        Self {
            total_usd_value: 0.0,
            daily_change_usd: 0.0,
            daily_change_percent: 0.0,
            assets: Vec::new(),
            generated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChainStatus {
    pub chain: Chain,
    pub available: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub balances_found: usize,
    #[serde(default)]
    pub dropped_tokens: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Live,
    Fallback,
    /// No symbols needed pricing.
    None,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PortfolioReport {
    #[serde(flatten)]
    pub snapshot: PortfolioSnapshot,
    pub networks: Vec<ChainStatus>,
    pub price_source: PriceSource,
}

impl PortfolioReport {
    pub fn skipped_chains(&self) -> impl Iterator<Item = Chain> + '_ {
        self.networks
            .iter()
            .filter(|status| !status.available)
            .map(|status| status.chain)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct ChainInfo {
    pub chain: Chain,
    pub chain_id: u64,
    pub network: &'static str,
    pub native_symbol: &'static str,
}

impl From<Chain> for ChainInfo {
    fn from(chain: Chain) -> Self {
        Self {
            chain,
            chain_id: chain.chain_id(),
            network: chain.network(),
            native_symbol: chain.native_coin().symbol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_parses_names_slugs_and_ids() {
        assert_eq!("Ethereum".parse::<Chain>().unwrap(), Chain::Ethereum);
        assert_eq!("base-mainnet".parse::<Chain>().unwrap(), Chain::Base);
        assert_eq!(" 137 ".parse::<Chain>().unwrap(), Chain::Polygon);
        assert_eq!("arb".parse::<Chain>().unwrap(), Chain::Arbitrum);
        assert!("solana".parse::<Chain>().is_err());
        assert!("56".parse::<Chain>().is_err());
    }

    #[test]
    fn polygon_native_coin_is_matic() {
        assert_eq!(Chain::Polygon.native_coin().symbol, "MATIC");
        assert_eq!(Chain::Base.native_coin().symbol, "ETH");
        assert_eq!(Chain::Optimism.native_coin().decimals, 18);
    }

    #[test]
    fn report_flattens_snapshot_fields() {
        let report = PortfolioReport {
            snapshot: PortfolioSnapshot::empty(Utc::now()),
            networks: vec![ChainStatus {
                chain: Chain::Base,
                available: false,
                error: Some("timeout".to_string()),
                balances_found: 0,
                dropped_tokens: vec![],
            }],
            price_source: PriceSource::Fallback,
        };
        let value = serde_json::to_value(&report).expect("serialize report");
        assert_eq!(value["total_usd_value"], 0.0);
        assert_eq!(value["price_source"], "fallback");
        assert_eq!(value["networks"][0]["chain"], "base");
        assert_eq!(report.skipped_chains().collect::<Vec<_>>(), vec![Chain::Base]);
    }
}

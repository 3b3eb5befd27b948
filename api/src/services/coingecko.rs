use std::collections::{BTreeMap, BTreeSet, HashMap};

use aggregator::PriceProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{PricePoint, PriceQuote};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// Historical price series for charts.
#[async_trait]
pub trait MarketChartSource: Send + Sync {
    async fn market_chart(&self, symbol: &str, days: u32) -> Result<Vec<PricePoint>>;
}

const BUILTIN_IDS: &[(&str, &str)] = &[
    ("ETH", "ethereum"),
    ("WETH", "ethereum"),
    ("BTC", "bitcoin"),
    ("BTCB", "bitcoin"),
    ("WBTC", "wrapped-bitcoin"),
    ("USDC", "usd-coin"),
    ("USDT", "tether"),
    ("DAI", "dai"),
    ("UNI", "uniswap"),
    ("LINK", "chainlink"),
    ("AAVE", "aave"),
    ("MATIC", "matic-network"),
    ("COMP", "compound-governance-token"),
    ("CRV", "curve-dao-token"),
    ("SNX", "havven"),
    ("MKR", "maker"),
    ("YFI", "yearn-finance"),
    ("ARB", "arbitrum"),
    ("OP", "optimism"),
    ("SOL", "solana"),
    ("USOL", "solana"),
];

#[derive(Clone)]
pub struct CoingeckoPriceProvider {
    client: Client,
    api_base: String,
    ids: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
    #[serde(default)]
    usd_24h_change: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    #[serde(default)]
    prices: Vec<(f64, f64)>,
}

impl CoingeckoPriceProvider {
    /// `overrides` maps uppercase symbols to CoinGecko ids and wins over the built-in table.
    pub fn new(api_base: String, overrides: HashMap<String, String>) -> Self {
        let mut ids: HashMap<String, String> = BUILTIN_IDS
            .iter()
            .map(|(symbol, id)| (symbol.to_string(), id.to_string()))
            .collect();
        for (symbol, id) in overrides {
            ids.insert(symbol.to_uppercase(), id.to_lowercase());
        }
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            ids,
        }
    }

    pub fn coingecko_id(&self, symbol: &str) -> Option<&str> {
        self.ids.get(&symbol.trim().to_uppercase()).map(String::as_str)
    }

    /// id → symbols requesting it. Several symbols can share an id (BTC/BTCB).
    fn ids_for(&self, symbols: &BTreeSet<String>) -> BTreeMap<String, Vec<String>> {
        let mut by_id: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for symbol in symbols {
            match self.coingecko_id(symbol) {
                Some(id) => by_id.entry(id.to_string()).or_default().push(symbol.clone()),
                None => debug!(%symbol, "no coingecko id, skipping"),
            }
        }
        by_id
    }
}

fn quotes_from_simple_price(
    body: HashMap<String, SimplePrice>,
    by_id: &BTreeMap<String, Vec<String>>,
) -> HashMap<String, PriceQuote> {
    let mut quotes = HashMap::new();
    for (id, entry) in body {
        let Some(usd) = entry.usd else {
            continue;
        };
        let Some(symbols) = by_id.get(&id) else {
            continue;
        };
        for symbol in symbols {
            quotes.insert(
                symbol.clone(),
                PriceQuote {
                    symbol: symbol.clone(),
                    usd_price: usd,
                    change_24h_percent: entry.usd_24h_change.unwrap_or(0.0),
                },
            );
        }
    }
    quotes
}

fn points_from_market_chart(chart: MarketChart) -> Vec<PricePoint> {
    chart
        .prices
        .into_iter()
        .filter_map(|(ts_ms, price)| {
            let timestamp = DateTime::<Utc>::from_timestamp_millis(ts_ms as i64)?;
            price.is_finite().then_some(PricePoint { timestamp, price })
        })
        .collect()
}

#[async_trait]
impl PriceProvider for CoingeckoPriceProvider {
    async fn get_prices(&self, symbols: &BTreeSet<String>) -> Result<HashMap<String, PriceQuote>> {
        let by_id = self.ids_for(symbols);
        if by_id.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = by_id.keys().cloned().collect::<Vec<_>>().join(",");
        let url = format!("{}/simple/price", self.api_base);
        let resp = self
            .client
            .get(url)
            .query(&[
                ("ids", ids.as_str()),
                ("vs_currencies", "usd"),
                ("include_24hr_change", "true"),
            ])
            .send()
            .await
            .context("coingecko request failed")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("coingecko returned status {}", status));
        }
        let body: HashMap<String, SimplePrice> = resp
            .json()
            .await
            .context("failed to decode coingecko price response")?;
        Ok(quotes_from_simple_price(body, &by_id))
    }
}

#[async_trait]
impl MarketChartSource for CoingeckoPriceProvider {
    async fn market_chart(&self, symbol: &str, days: u32) -> Result<Vec<PricePoint>> {
        let id = self
            .coingecko_id(symbol)
            .ok_or_else(|| anyhow::anyhow!("no coingecko id for {symbol}"))?;
        let url = format!("{}/coins/{}/market_chart", self.api_base, id);
        let days_str = days.to_string();
        let resp = self
            .client
            .get(url)
            .query(&[("vs_currency", "usd"), ("days", days_str.as_str())])
            .send()
            .await
            .context("coingecko market_chart request failed")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("coingecko market_chart status {}", status));
        }
        let chart: MarketChart = resp
            .json()
            .await
            .context("decode market_chart response failed")?;
        Ok(points_from_market_chart(chart))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> CoingeckoPriceProvider {
        CoingeckoPriceProvider::new(
            "https://api.coingecko.com/api/v3/".to_string(),
            HashMap::from([("pepe".to_string(), "Pepe".to_string())]),
        )
    }

    #[test]
    fn ids_share_and_skip_unmapped() {
        let provider = provider();
        let symbols: BTreeSet<String> = ["BTC", "BTCB", "PEPE", "NOPE"]
            .into_iter()
            .map(String::from)
            .collect();
        let by_id = provider.ids_for(&symbols);
        assert_eq!(by_id["bitcoin"], vec!["BTC".to_string(), "BTCB".to_string()]);
        assert_eq!(by_id["pepe"], vec!["PEPE".to_string()]);
        assert_eq!(by_id.len(), 2);
        assert_eq!(provider.api_base, "https://api.coingecko.com/api/v3");
    }

    #[test]
    fn simple_price_body_fans_out_to_symbols() {
        let provider = provider();
        let symbols: BTreeSet<String> = ["ETH", "WETH", "USDC", "DAI"]
            .into_iter()
            .map(String::from)
            .collect();
        let by_id = provider.ids_for(&symbols);
        let body: HashMap<String, SimplePrice> = serde_json::from_str(
            r#"{
                "ethereum": {"usd": 2500.5, "usd_24h_change": 4.2},
                "usd-coin": {"usd": 0.9998},
                "dai": {}
            }"#,
        )
        .expect("valid body");

        let quotes = quotes_from_simple_price(body, &by_id);
        assert_eq!(quotes.len(), 3);
        assert_eq!(quotes["ETH"].usd_price, 2500.5);
        assert_eq!(quotes["WETH"].change_24h_percent, 4.2);
        assert_eq!(quotes["USDC"].change_24h_percent, 0.0);
        assert!(!quotes.contains_key("DAI"));
    }

    #[test]
    fn market_chart_points_parse() {
        let chart: MarketChart = serde_json::from_str(
            r#"{"prices": [[1704067200000, 2281.5], [1704070800000.0, 2290.25]], "market_caps": []}"#,
        )
        .expect("valid chart");
        let points = points_from_market_chart(chart);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(points[1].price, 2290.25);
    }
}

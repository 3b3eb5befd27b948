use aggregator::{BalanceProvider, TokenBalance, TokenMetadata};
use anyhow::{Context, Result};
use async_trait::async_trait;
use domain::Chain;
use ethers::types::U256;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// alchemy_getTokenBalances 每頁最多 100 筆，避免無限翻頁
const MAX_TOKEN_PAGES: usize = 10;

#[derive(Clone)]
pub struct AlchemyBalanceProvider {
    client: Client,
    url_template: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalancesPage {
    #[serde(default)]
    token_balances: Vec<TokenBalanceEntry>,
    page_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalanceEntry {
    contract_address: String,
    token_balance: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TokenMetadataResult {
    symbol: Option<String>,
    name: Option<String>,
    decimals: Option<u8>,
}

impl AlchemyBalanceProvider {
    /// `url_template` may contain `{network}` and `{key}` placeholders.
    pub fn new(url_template: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            url_template,
            api_key,
        }
    }

    fn endpoint(&self, chain: Chain) -> String {
        self.url_template
            .replace("{network}", chain.network())
            .replace("{key}", &self.api_key)
    }

    async fn call<T: DeserializeOwned>(&self, chain: Chain, method: &str, params: Value) -> Result<T> {
        let body = self.send(chain, method, params).await?;
        unwrap_rpc(method, body)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        chain: Chain,
        method: &str,
        params: Value,
    ) -> Result<RpcResponse<T>> {
        let resp = self
            .client
            .post(self.endpoint(chain))
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .with_context(|| format!("{method} request to {} failed", chain.network()))?;
        let status = resp.status();
        if status == StatusCode::FORBIDDEN {
            anyhow::bail!("API key does not support {}", chain.network());
        }
        if !status.is_success() {
            anyhow::bail!("{} returned status {status}", chain.network());
        }
        resp.json()
            .await
            .with_context(|| format!("failed to decode {method} response"))
    }
}

fn unwrap_rpc<T>(method: &str, body: RpcResponse<T>) -> Result<T> {
    if let Some(err) = body.error {
        anyhow::bail!("{method} failed: {} (code {})", err.message, err.code);
    }
    body.result
        .ok_or_else(|| anyhow::anyhow!("{method} returned no result"))
}

/// Hex quantity as returned by JSON-RPC. `0x` alone means zero.
pub fn parse_hex_u256(raw: &str) -> Result<U256> {
    let digits = raw
        .trim()
        .strip_prefix("0x")
        .or_else(|| raw.trim().strip_prefix("0X"))
        .ok_or_else(|| anyhow::anyhow!("hex quantity missing 0x prefix: {raw}"))?;
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16).with_context(|| format!("invalid hex quantity: {raw}"))
}

fn balances_from_page(chain: Chain, page: &TokenBalancesPage) -> Vec<TokenBalance> {
    page.token_balances
        .iter()
        .filter_map(|entry| {
            if let Some(err) = &entry.error {
                debug!(%chain, contract = %entry.contract_address, error = %err, "token balance error");
                return None;
            }
            let raw = entry.token_balance.as_deref()?;
            match parse_hex_u256(raw) {
                Ok(raw_amount) => Some(TokenBalance {
                    contract_address: entry.contract_address.to_lowercase(),
                    raw_amount,
                }),
                Err(err) => {
                    warn!(error = %err, %chain, contract = %entry.contract_address, "skipping token balance");
                    None
                }
            }
        })
        .collect()
}

fn metadata_from_result(result: Option<TokenMetadataResult>) -> Option<TokenMetadata> {
    let result = result?;
    let symbol = result.symbol?.trim().to_string();
    if symbol.is_empty() {
        return None;
    }
    // decimals 缺失時無法換算，直接視為查無
    let decimals = result.decimals?;
    let name = result
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| symbol.clone());
    Some(TokenMetadata {
        symbol,
        name,
        decimals,
    })
}

#[async_trait]
impl BalanceProvider for AlchemyBalanceProvider {
    async fn native_balance(&self, address: &str, chain: Chain) -> Result<U256> {
        let raw: String = self
            .call(chain, "eth_getBalance", json!([address, "latest"]))
            .await?;
        parse_hex_u256(&raw)
    }

    async fn token_balances(&self, address: &str, chain: Chain) -> Result<Vec<TokenBalance>> {
        let mut balances = Vec::new();
        let mut page_key: Option<String> = None;
        for _ in 0..MAX_TOKEN_PAGES {
            let params = match &page_key {
                Some(key) => json!([address, "erc20", { "pageKey": key }]),
                None => json!([address, "erc20"]),
            };
            let page: TokenBalancesPage = self
                .call(chain, "alchemy_getTokenBalances", params)
                .await?;
            balances.extend(balances_from_page(chain, &page));
            match page.page_key {
                Some(next) if !next.is_empty() => page_key = Some(next),
                _ => return Ok(balances),
            }
        }
        warn!(%chain, %address, pages = MAX_TOKEN_PAGES, "token balance pagination truncated");
        Ok(balances)
    }

    async fn token_metadata(&self, contract: &str, chain: Chain) -> Result<Option<TokenMetadata>> {
        let body: RpcResponse<TokenMetadataResult> = self
            .send(chain, "alchemy_getTokenMetadata", json!([contract]))
            .await?;
        if let Some(err) = body.error {
            anyhow::bail!("alchemy_getTokenMetadata failed: {} (code {})", err.message, err.code);
        }
        // null result 代表合約沒有 metadata
        Ok(metadata_from_result(body.result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_fills_template() {
        let provider = AlchemyBalanceProvider::new(
            "https://{network}.g.alchemy.com/v2/{key}".to_string(),
            "demo".to_string(),
        );
        assert_eq!(
            provider.endpoint(Chain::Base),
            "https://base-mainnet.g.alchemy.com/v2/demo"
        );
    }

    #[test]
    fn hex_quantities_parse() {
        assert_eq!(parse_hex_u256("0x0").unwrap(), U256::zero());
        assert_eq!(parse_hex_u256("0x").unwrap(), U256::zero());
        assert_eq!(
            parse_hex_u256("0x1bc16d674ec80000").unwrap(),
            U256::from(2_000_000_000_000_000_000u64)
        );
        assert!(parse_hex_u256("1234").is_err());
        assert!(parse_hex_u256("0xzz").is_err());
    }

    #[test]
    fn token_page_skips_errors_and_keeps_zeroes_for_caller() {
        let page: TokenBalancesPage = serde_json::from_value(json!({
            "address": "0x00000000000000000000000000000000000000aa",
            "tokenBalances": [
                {"contractAddress": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "tokenBalance": "0x000000000000000000000000000000000000000000000000000000001dcd6500"},
                {"contractAddress": "0xdead", "tokenBalance": "0x0000000000000000000000000000000000000000000000000000000000000000"},
                {"contractAddress": "0xbeef", "tokenBalance": null, "error": "execution reverted"}
            ],
            "pageKey": "next"
        }))
        .expect("valid page");

        let balances = balances_from_page(Chain::Ethereum, &page);
        assert_eq!(balances.len(), 2);
        assert_eq!(
            balances[0].contract_address,
            "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"
        );
        assert_eq!(balances[0].raw_amount, U256::from(500_000_000u64));
        assert!(balances[1].raw_amount.is_zero());
        assert_eq!(page.page_key.as_deref(), Some("next"));
    }

    #[test]
    fn metadata_requires_symbol_and_decimals() {
        let full: TokenMetadataResult =
            serde_json::from_value(json!({"symbol": "USDC", "name": "USD Coin", "decimals": 6, "logo": null}))
                .unwrap();
        let meta = metadata_from_result(Some(full)).expect("resolved");
        assert_eq!(meta.decimals, 6);
        assert_eq!(meta.name, "USD Coin");

        let nameless: TokenMetadataResult =
            serde_json::from_value(json!({"symbol": "XYZ", "name": "", "decimals": 18})).unwrap();
        assert_eq!(metadata_from_result(Some(nameless)).unwrap().name, "XYZ");

        let no_decimals: TokenMetadataResult =
            serde_json::from_value(json!({"symbol": "XYZ", "name": "x", "decimals": null})).unwrap();
        assert!(metadata_from_result(Some(no_decimals)).is_none());
        assert!(metadata_from_result(None).is_none());
    }

    #[test]
    fn rpc_error_object_becomes_error() {
        let body: RpcResponse<String> = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1,
            "error": {"code": -32602, "message": "invalid address"}
        }))
        .unwrap();
        let err = unwrap_rpc("eth_getBalance", body).unwrap_err();
        assert!(err.to_string().contains("invalid address"));
    }
}

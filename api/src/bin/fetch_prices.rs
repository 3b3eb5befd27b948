use std::time::Duration;

use api::{bootstrap::build_state, config::AppConfig, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing()?;
    let config = AppConfig::from_env()?;
    let symbols = std::env::var("PRICE_SYMBOLS").unwrap_or_else(|_| "ETH,USDC,MATIC".to_string());
    let days: u32 = std::env::var("PRICE_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30)
        .clamp(1, 365);

    let state = build_state(&config)?;
    let symbols: Vec<String> = symbols
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_uppercase())
            }
        })
        .collect();

    let current = state.portfolio.quotes(&symbols).await;
    tracing::info!(source = ?current.source, quotes = current.quotes.len(), "spot prices fetched");

    for symbol in symbols {
        match state.market.market_chart(&symbol, days).await {
            Ok(points) => {
                let first = points.first().map(|p| p.price);
                let last = points.last().map(|p| p.price);
                let spot = current.quotes.get(&symbol).map(|q| q.usd_price);
                tracing::info!(%symbol, days, points = points.len(), ?first, ?last, ?spot, "price history fetched");
                // 小睡 1 秒避免踩到免費 API rate limit。
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(err) => {
                tracing::warn!(%symbol, %err, "price history fetch failed");
            }
        }
    }

    Ok(())
}

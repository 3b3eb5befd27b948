use api::{
    bootstrap::build_state,
    config::{parse_chain_list, AppConfig},
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing()?;
    let config = AppConfig::from_env()?;

    let address = std::env::var("WALLET_ADDRESS")
        .map_err(|_| anyhow::anyhow!("WALLET_ADDRESS must be set"))?;
    let chains = match std::env::var("CHAINS") {
        Ok(raw) if !raw.trim().is_empty() => parse_chain_list(&raw)?,
        _ => config.default_chains.clone(),
    };

    let state = build_state(&config)?;
    let report = state.portfolio.get_portfolio(&address, &chains).await?;

    for status in report.networks.iter().filter(|status| !status.available) {
        tracing::warn!(
            chain = %status.chain,
            error = status.error.as_deref().unwrap_or("unknown"),
            "chain skipped"
        );
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use aggregator::PortfolioError;
use domain::{Chain, PortfolioReport};
use serde::Deserialize;

use super::ApiError;
use crate::{config::parse_chain_list, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/portfolio/:address", get(get_portfolio))
}

#[derive(Debug, Deserialize)]
struct PortfolioQuery {
    chains: Option<String>,
}

async fn get_portfolio(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<PortfolioQuery>,
) -> Result<Json<PortfolioReport>, ApiError> {
    metrics::counter!("portfolio_requests_total").increment(1);

    let chains = match params.chains.as_deref() {
        Some(raw) if !raw.trim().is_empty() => parse_chains(raw)?,
        _ => state.config.default_chains.clone(),
    };

    let report = state.portfolio.get_portfolio(&address, &chains).await?;
    for chain in report.skipped_chains() {
        metrics::counter!("portfolio_chain_unavailable_total", "chain" => chain.name()).increment(1);
    }
    if report.price_source == domain::PriceSource::Fallback {
        metrics::counter!("price_fallback_total").increment(1);
    }
    Ok(Json(report))
}

fn parse_chains(raw: &str) -> Result<Vec<Chain>, ApiError> {
    let chains = parse_chain_list(raw).map_err(PortfolioError::from)?;
    Ok(chains)
}

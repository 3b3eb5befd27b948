use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use domain::{PricePoint, PriceQuote, PriceSource};
use serde::{Deserialize, Serialize};

use super::{split_list, ApiError};
use crate::state::AppState;

const DEFAULT_HISTORY_DAYS: u32 = 7;
const MAX_HISTORY_DAYS: u32 = 365;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/prices", get(get_prices))
        .route("/prices/:symbol/history", get(get_price_history))
}

#[derive(Debug, Deserialize)]
struct PricesQuery {
    symbols: Option<String>,
}

#[derive(Debug, Serialize)]
struct PricesResponse {
    quotes: Vec<PriceQuote>,
    source: PriceSource,
}

async fn get_prices(
    State(state): State<AppState>,
    Query(params): Query<PricesQuery>,
) -> Json<PricesResponse> {
    let symbols: Vec<String> = params
        .symbols
        .as_deref()
        .map(|raw| split_list(raw).map(str::to_string).collect())
        .unwrap_or_default();

    let fetch = state.portfolio.quotes(&symbols).await;
    if fetch.source == PriceSource::Fallback {
        metrics::counter!("price_fallback_total").increment(1);
    }
    let mut quotes: Vec<PriceQuote> = fetch.quotes.into_values().collect();
    quotes.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    Json(PricesResponse {
        quotes,
        source: fetch.source,
    })
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    days: Option<u32>,
}

async fn get_price_history(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<PricePoint>>, ApiError> {
    let days = clamp_days(params.days);
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(ApiError::BadRequest("symbol must not be empty".to_string()));
    }
    state
        .market
        .market_chart(&symbol, days)
        .await
        .map(Json)
        .map_err(|err| ApiError::Upstream(format!("{err:#}")))
}

fn clamp_days(days: Option<u32>) -> u32 {
    days.unwrap_or(DEFAULT_HISTORY_DAYS).clamp(1, MAX_HISTORY_DAYS)
}

use axum::{routing::get, Json, Router};
use domain::{Chain, ChainInfo};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

pub fn api_router() -> Router<AppState> {
    Router::new().route("/chains", get(list_chains))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_chains() -> Json<Vec<ChainInfo>> {
    Json(Chain::ALL.into_iter().map(ChainInfo::from).collect())
}

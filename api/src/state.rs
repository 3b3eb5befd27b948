use aggregator::PortfolioService;
use std::sync::Arc;

use crate::{config::AppConfig, services::MarketChartSource};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub portfolio: Arc<dyn PortfolioService>,
    pub market: Arc<dyn MarketChartSource>,
}

// Ensure critical dependencies uphold Send/Sync for Axum state usage.
#[allow(dead_code)]
fn _assert_state_types_are_send_sync()
where
    AppConfig: Send + Sync + 'static,
    dyn PortfolioService: Send + Sync,
    dyn MarketChartSource: Send + Sync,
{
}

#[allow(dead_code)]
fn _assert_state_bounds() {
    fn assert_bounds<T: Clone + Send + Sync + 'static>() {}
    assert_bounds::<AppState>();
}

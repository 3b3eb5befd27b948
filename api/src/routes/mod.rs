pub mod meta;
pub mod portfolio;
pub mod prices;

use aggregator::PortfolioError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("upstream error: {0}")]
    Upstream(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl From<PortfolioError> for ApiError {
    fn from(err: PortfolioError) -> Self {
        match err {
            PortfolioError::InvalidAddress { .. } | PortfolioError::UnsupportedChain(_) => {
                ApiError::BadRequest(err.to_string())
            }
            // 其餘錯誤不會從 get_portfolio 冒出來，保守當作上游問題
            PortfolioError::TokenMetadataUnresolved { .. }
            | PortfolioError::ChainProviderUnavailable { .. }
            | PortfolioError::PriceProviderUnavailable(_) => ApiError::Upstream(err.to_string()),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Splits a comma-separated query value, dropping blanks.
pub(crate) fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ParseChainError;

    #[test]
    fn portfolio_errors_map_to_statuses() {
        let invalid: ApiError = PortfolioError::InvalidAddress {
            address: "0x12".to_string(),
        }
        .into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let chain: ApiError = PortfolioError::from(ParseChainError("solana".to_string())).into();
        assert_eq!(chain.status(), StatusCode::BAD_REQUEST);
        assert_eq!(chain.to_string(), "unsupported chain: solana");

        let price: ApiError = PortfolioError::PriceProviderUnavailable("429".to_string()).into();
        assert_eq!(price.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn list_split_drops_blanks() {
        assert_eq!(split_list(" eth, ,usdc,").collect::<Vec<_>>(), vec!["eth", "usdc"]);
    }
}

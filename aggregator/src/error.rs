use domain::{Chain, ParseChainError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("invalid address: {address}")]
    InvalidAddress { address: String },
    #[error("token metadata unresolved for {contract} on {chain}")]
    TokenMetadataUnresolved { chain: Chain, contract: String },
    #[error("{chain} provider unavailable: {reason}")]
    ChainProviderUnavailable { chain: Chain, reason: String },
    #[error("price provider unavailable: {0}")]
    PriceProviderUnavailable(String),
    #[error(transparent)]
    UnsupportedChain(#[from] ParseChainError),
}

pub type PortfolioResult<T> = Result<T, PortfolioError>;

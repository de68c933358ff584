use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("cannot pop {requested} items, only {available} present")]
    NotEnoughItemsToPop { requested: usize, available: usize },

    #[error("ring buffer capacity must be positive")]
    ZeroCapacity,

    #[error("unknown network: {0}")]
    UnknownNetwork(String),
}

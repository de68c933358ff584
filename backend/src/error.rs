use market::MarketError;
use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Market(#[from] MarketError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AppError {
    /// Errors that retrying next cycle cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Config(_) | AppError::Api(ApiError::UnsupportedSchema { .. })
        )
    }
}

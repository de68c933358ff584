//! Upstream market data APIs.
//!
//! Two clients feed the service: a snapshot API polled for live pool figures
//! and a discovery/history API used to find pools and backfill candlesticks.
//! Both pace themselves with a [`rate_limit::RateLimiter`] and back off on
//! 429/500 with an exponential [`cooldown::Cooldown`].

pub mod cooldown;
pub mod dexscreener;
pub mod geckoterminal;
pub mod http;
pub mod rate_limit;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use market::{Network, PoolSnapshot, Timestamp};
use thiserror::Error;

pub use types::{Candlestick, Currency, OhlcvTimeframe, PageRange, PoolRef, PoolSource, SortBy};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("internal server error: {0}")]
    InternalServerError(String),

    #[error("unexpected response {status}: {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("unsupported schema: supported {supported}, got {got}")]
    UnsupportedSchema { supported: String, got: String },

    #[error("empty data: {0}")]
    EmptyData(String),

    #[error("requested {requested} requests, limit is {max}")]
    InvalidRequestCount { requested: usize, max: usize },

    #[error("value out of domain: {0}")]
    ValueOutOfDomain(String),
}

/// Live pool figures, looked up by address.
#[async_trait]
pub trait SnapshotApi: Send {
    /// Largest address batch a single request accepts.
    fn max_addresses_per_request(&self) -> usize;

    /// Fails with [`ApiError::EmptyData`] when none of the addresses is known.
    async fn get_pools(&mut self, network: Network, addresses: &[String]) -> Result<Vec<PoolSnapshot>, ApiError>;

    fn available_requests(&mut self) -> usize;

    fn time_until_requests_available(&mut self, requests: Option<usize>) -> Result<Duration, ApiError>;
}

/// Pool discovery and historical candlesticks.
#[async_trait]
pub trait HistoryApi: Send {
    async fn get_pools(
        &mut self,
        network: Network,
        sources: &[PoolSource],
        pages: PageRange,
        sort: SortBy,
    ) -> Result<Vec<PoolRef>, ApiError>;

    /// Candlesticks in chronological order.
    async fn get_ohlcv(
        &mut self,
        network: Network,
        address: &str,
        timeframe: OhlcvTimeframe,
        currency: Currency,
        before: Option<Timestamp>,
    ) -> Result<Vec<Candlestick>, ApiError>;

    fn available_requests(&mut self) -> usize;

    fn time_until_requests_available(&mut self, requests: Option<usize>) -> Result<Duration, ApiError>;
}

//! GeckoTerminal client: pool discovery and OHLCV history.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use market::{Network, Timestamp};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::cooldown::Cooldown;
use super::http::HttpApi;
use super::rate_limit::{RateLimiter, WaitPolicy};
use super::types::{Candlestick, Currency, OhlcvTimeframe, PageRange, PoolRef, PoolSource, SortBy};
use super::{ApiError, HistoryApi};

pub const BASE_URL: &str = "https://api.geckoterminal.com/api/v2";
pub const API_VERSION: &str = "20230302";
pub const MAX_REQUESTS: usize = 30;
pub const PERIOD: Duration = Duration::from_secs(60);
pub const OHLCV_LIMIT: u32 = 1000;

#[derive(Debug, Deserialize)]
pub struct PoolsResponse {
    #[serde(default)]
    pub data: Vec<PoolData>,
}

#[derive(Debug, Deserialize)]
pub struct PoolData {
    pub attributes: PoolAttributes,
}

#[derive(Debug, Deserialize)]
pub struct PoolAttributes {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct OhlcvResponse {
    pub data: OhlcvData,
}

#[derive(Debug, Deserialize)]
pub struct OhlcvData {
    pub attributes: OhlcvAttributes,
}

#[derive(Debug, Deserialize)]
pub struct OhlcvAttributes {
    /// `[unix_seconds, open, high, low, close, volume]`, newest first.
    pub ohlcv_list: Vec<[f64; 6]>,
}

/// Converts the newest-first upstream list into chronological candlesticks.
pub fn parse_ohlcv(resp: OhlcvResponse) -> Result<Vec<Candlestick>, ApiError> {
    let rows = resp.data.attributes.ohlcv_list;
    if rows.is_empty() {
        return Err(ApiError::EmptyData("ohlcv list is empty".to_string()));
    }

    rows.iter()
        .rev()
        .map(|[ts, open, high, low, close, volume]| {
            let timestamp = DateTime::from_timestamp(*ts as i64, 0)
                .ok_or_else(|| ApiError::ValueOutOfDomain(format!("timestamp {ts}")))?;
            Ok(Candlestick {
                timestamp,
                open: *open,
                high: *high,
                low: *low,
                close: *close,
                volume: *volume,
            })
        })
        .collect()
}

pub struct GeckoTerminalClient {
    api: HttpApi,
}

impl GeckoTerminalClient {
    /// Fails unless `version` is the API version this client understands.
    pub fn new(version: &str, cooldown: Option<Cooldown>) -> Result<Self, ApiError> {
        Self::with_base_url(BASE_URL, version, cooldown)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        version: &str,
        cooldown: Option<Cooldown>,
    ) -> Result<Self, ApiError> {
        if version != API_VERSION {
            return Err(ApiError::UnsupportedSchema {
                supported: API_VERSION.to_string(),
                got: version.to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json;version=20230302"),
        );

        let limiter = RateLimiter::new(MAX_REQUESTS, PERIOD, WaitPolicy::Strict);
        let api = HttpApi::new("geckoterminal", base_url, limiter, cooldown, headers)?;
        Ok(Self { api })
    }
}

#[async_trait]
impl HistoryApi for GeckoTerminalClient {
    #[instrument(skip(self, sources), fields(network = network.id()), level = "debug")]
    async fn get_pools(
        &mut self,
        network: Network,
        sources: &[PoolSource],
        pages: PageRange,
        sort: SortBy,
    ) -> Result<Vec<PoolRef>, ApiError> {
        let mut out = Vec::new();

        for source in sources {
            let path = format!("networks/{}/{}pools", network.id(), source.path_prefix());

            for page in pages.pages() {
                let query = [("page", page.to_string()), ("sort", sort.as_param().to_string())];
                let resp: PoolsResponse = self.api.get_json(&path, &query).await?;

                if resp.data.is_empty() {
                    debug!(?source, page, "no more pages");
                    break;
                }

                out.extend(resp.data.into_iter().map(|p| PoolRef {
                    network,
                    address: p.attributes.address,
                }));
            }
        }

        Ok(out)
    }

    #[instrument(skip(self, before), fields(network = network.id(), pool = %address), level = "debug")]
    async fn get_ohlcv(
        &mut self,
        network: Network,
        address: &str,
        timeframe: OhlcvTimeframe,
        currency: Currency,
        before: Option<Timestamp>,
    ) -> Result<Vec<Candlestick>, ApiError> {
        let path = format!(
            "networks/{}/pools/{}/ohlcv/{}",
            network.id(),
            address,
            timeframe.path()
        );
        let before = before.unwrap_or_else(market::time::now);
        let query = [
            ("aggregate", timeframe.aggregate().to_string()),
            ("currency", currency.as_param().to_string()),
            ("before_timestamp", before.timestamp().to_string()),
            ("limit", OHLCV_LIMIT.to_string()),
        ];

        let resp: OhlcvResponse = self.api.get_json(&path, &query).await?;
        parse_ohlcv(resp)
    }

    fn available_requests(&mut self) -> usize {
        self.api.limiter().available()
    }

    fn time_until_requests_available(&mut self, requests: Option<usize>) -> Result<Duration, ApiError> {
        self.api.limiter().time_until_available(requests)
    }
}

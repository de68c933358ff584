//! DEX Screener client: live figures for known pool addresses.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use market::{Dex, Network, PoolSnapshot, PoolStats, TimePeriods, Token};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument};

use super::cooldown::Cooldown;
use super::http::HttpApi;
use super::rate_limit::{RateLimiter, WaitPolicy};
use super::{ApiError, SnapshotApi};

pub const BASE_URL: &str = "https://api.dexscreener.com/latest/dex";
pub const SCHEMA_VERSION: &str = "1.0.0";
pub const MAX_ADDRESSES_PER_REQUEST: usize = 30;
pub const MAX_REQUESTS: usize = 300;
pub const PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairsResponse {
    pub schema_version: String,
    #[serde(default)]
    pub pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Deserialize)]
pub struct TokenInfo {
    pub address: String,
    pub symbol: String,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Periods {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub m5: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub h1: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub h6: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub h24: Option<f64>,
}

impl From<&Periods> for TimePeriods {
    fn from(p: &Periods) -> Self {
        TimePeriods {
            m5: p.m5,
            h1: p.h1,
            h6: p.h6,
            h24: p.h24,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Liquidity {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub base: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub quote: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pair {
    pub chain_id: String,
    pub pair_address: String,
    pub base_token: TokenInfo,
    pub quote_token: TokenInfo,
    pub dex_id: String,
    #[serde(deserialize_with = "required_f64")]
    pub price_native: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fdv: Option<f64>,
    #[serde(default)]
    pub volume: Periods,
    #[serde(default)]
    pub liquidity: Option<Liquidity>,
    #[serde(default)]
    pub price_change: Periods,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub pair_created_at: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Pair {
    /// Maps to a snapshot, or `None` when a figure the tracker relies on is
    /// missing upstream.
    pub fn into_snapshot(self) -> Result<Option<PoolSnapshot>, ApiError> {
        let network = Network::from_id(&self.chain_id)
            .map_err(|e| ApiError::ValueOutOfDomain(e.to_string()))?;

        let liquidity = self.liquidity.as_ref().and_then(|l| l.usd);
        let creation_date = self.pair_created_at.and_then(DateTime::from_timestamp_millis);

        let (Some(price_usd), Some(fdv), Some(liquidity), Some(creation_date)) =
            (self.price_usd, self.fdv, liquidity, creation_date)
        else {
            debug!(pool = %self.pair_address, "skipping pool with incomplete figures");
            return Ok(None);
        };

        let token = |t: TokenInfo| Token {
            network,
            address: t.address,
            ticker: t.symbol,
            name: t.name,
        };

        Ok(Some(PoolSnapshot {
            network,
            address: self.pair_address,
            dex: Dex::from_id(network, &self.dex_id),
            stats: PoolStats {
                price_native: self.price_native,
                price_usd,
                fdv,
                volume: self.volume.h24.unwrap_or(0.0),
                liquidity,
                price_change: TimePeriods::from(&self.price_change),
                creation_date,
            },
            base_token: token(self.base_token),
            quote_token: token(self.quote_token),
        }))
    }
}

/// Accepts numbers, numeric strings and null.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn required_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_f64(deserializer)?.ok_or_else(|| serde::de::Error::custom("missing number"))
}

/// Checks the schema and flattens a response into snapshots.
pub fn parse_pairs(resp: PairsResponse, requested: &[String]) -> Result<Vec<PoolSnapshot>, ApiError> {
    if resp.schema_version != SCHEMA_VERSION {
        return Err(ApiError::UnsupportedSchema {
            supported: SCHEMA_VERSION.to_string(),
            got: resp.schema_version,
        });
    }

    let pairs = resp.pairs.unwrap_or_default();
    if pairs.is_empty() {
        return Err(ApiError::EmptyData(format!("no pairs for {}", requested.join(","))));
    }

    let mut out = Vec::with_capacity(pairs.len());
    for pair in pairs {
        if let Some(snapshot) = pair.into_snapshot()? {
            out.push(snapshot);
        }
    }
    Ok(out)
}

/// Folds one parsed batch into `out`, skipping a batch that came back empty.
/// Returns whether the batch carried any pairs.
fn absorb_batch(out: &mut Vec<PoolSnapshot>, parsed: Result<Vec<PoolSnapshot>, ApiError>) -> Result<bool, ApiError> {
    match parsed {
        Ok(found) => {
            out.extend(found);
            Ok(true)
        }
        Err(ApiError::EmptyData(msg)) => {
            debug!(reason = %msg, "skipping empty batch");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

pub struct DexScreenerClient {
    api: HttpApi,
}

impl DexScreenerClient {
    pub fn new(cooldown: Option<Cooldown>) -> Result<Self, ApiError> {
        Self::with_base_url(BASE_URL, cooldown)
    }

    pub fn with_base_url(base_url: impl Into<String>, cooldown: Option<Cooldown>) -> Result<Self, ApiError> {
        let limiter = RateLimiter::new(MAX_REQUESTS, PERIOD, WaitPolicy::Smart);
        let api = HttpApi::new("dexscreener", base_url, limiter, cooldown, HeaderMap::new())?;
        Ok(Self { api })
    }

    /// Requests needed to refresh `pools` addresses.
    pub fn requests_for(pools: usize) -> usize {
        pools.div_ceil(MAX_ADDRESSES_PER_REQUEST)
    }
}

#[async_trait]
impl SnapshotApi for DexScreenerClient {
    fn max_addresses_per_request(&self) -> usize {
        MAX_ADDRESSES_PER_REQUEST
    }

    #[instrument(skip(self, addresses), fields(network = network.id(), addresses = addresses.len()), level = "debug")]
    async fn get_pools(&mut self, network: Network, addresses: &[String]) -> Result<Vec<PoolSnapshot>, ApiError> {
        let mut out = Vec::new();
        let mut any_pairs = false;

        for batch in addresses.chunks(MAX_ADDRESSES_PER_REQUEST) {
            let path = format!("pairs/{}/{}", network.id(), batch.join(","));
            let resp: PairsResponse = self.api.get_json(&path, &[]).await?;
            any_pairs |= absorb_batch(&mut out, parse_pairs(resp, batch))?;
        }

        if !any_pairs && !addresses.is_empty() {
            return Err(ApiError::EmptyData(format!("no pairs for {} addresses", addresses.len())));
        }
        Ok(out)
    }

    fn available_requests(&mut self) -> usize {
        self.api.limiter().available()
    }

    fn time_until_requests_available(&mut self, requests: Option<usize>) -> Result<Duration, ApiError> {
        self.api.limiter().time_until_available(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "schemaVersion": "1.0.0",
        "pairs": [
            {
                "chainId": "ton",
                "dexId": "stonfi",
                "url": "https://dexscreener.com/ton/eqpool",
                "pairAddress": "EQpool",
                "baseToken": {"address": "EQjet", "name": "Jetton", "symbol": "JET"},
                "quoteToken": {"address": "EQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAM9c", "name": "Toncoin", "symbol": "TON"},
                "priceNative": "0.0125",
                "priceUsd": "0.0651",
                "txns": {"m5": {"buys": 1, "sells": 2}},
                "volume": {"h24": 12345.5, "h6": 100, "h1": 10, "m5": 1},
                "priceChange": {"m5": 0.5, "h1": -3.2, "h6": 4, "h24": 12.75},
                "liquidity": {"usd": 45000.25, "base": 100000, "quote": 500},
                "fdv": 650000,
                "pairCreatedAt": 1700000000000
            },
            {
                "chainId": "ton",
                "dexId": "dedust",
                "pairAddress": "EQnoliq",
                "baseToken": {"address": "EQx", "name": "X", "symbol": "X"},
                "quoteToken": {"address": "EQy", "name": "Y", "symbol": "Y"},
                "priceNative": "1",
                "volume": {},
                "priceChange": {}
            }
        ]
    }"#;

    #[test]
    fn maps_complete_pairs_and_skips_partial_ones() {
        let resp: PairsResponse = serde_json::from_str(BODY).unwrap();
        let pools = parse_pairs(resp, &["EQpool".into(), "EQnoliq".into()]).unwrap();

        assert_eq!(pools.len(), 1);
        let p = &pools[0];
        assert_eq!(p.address, "EQpool");
        assert_eq!(p.dex.name, "STON.fi");
        assert_eq!(p.stats.price_native, 0.0125);
        assert_eq!(p.stats.liquidity, 45000.25);
        assert_eq!(p.stats.volume, 12345.5);
        assert_eq!(p.stats.price_change.h1, Some(-3.2));
        assert_eq!(p.stats.creation_date.timestamp(), 1_700_000_000);
        assert!(p.quote_token.is_native_currency());
    }

    #[test]
    fn wrong_schema_is_rejected() {
        let resp: PairsResponse =
            serde_json::from_str(r#"{"schemaVersion": "2.0.0", "pairs": []}"#).unwrap();
        assert!(matches!(
            parse_pairs(resp, &[]),
            Err(ApiError::UnsupportedSchema { .. })
        ));
    }

    #[test]
    fn null_pairs_is_empty_data() {
        let resp: PairsResponse =
            serde_json::from_str(r#"{"schemaVersion": "1.0.0", "pairs": null}"#).unwrap();
        assert!(matches!(parse_pairs(resp, &["EQa".into()]), Err(ApiError::EmptyData(_))));
    }

    #[test]
    fn empty_batch_does_not_discard_the_others() {
        let mut out = Vec::new();

        let empty: PairsResponse =
            serde_json::from_str(r#"{"schemaVersion": "1.0.0", "pairs": []}"#).unwrap();
        assert!(!absorb_batch(&mut out, parse_pairs(empty, &["EQgone".into()])).unwrap());

        let full: PairsResponse = serde_json::from_str(BODY).unwrap();
        assert!(absorb_batch(&mut out, parse_pairs(full, &["EQpool".into()])).unwrap());

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].address, "EQpool");
    }

    #[test]
    fn schema_errors_still_abort_the_batch_loop() {
        let mut out = Vec::new();
        let resp: PairsResponse =
            serde_json::from_str(r#"{"schemaVersion": "2.0.0", "pairs": []}"#).unwrap();
        assert!(matches!(
            absorb_batch(&mut out, parse_pairs(resp, &["EQa".into()])),
            Err(ApiError::UnsupportedSchema { .. })
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn request_count_rounds_up() {
        assert_eq!(DexScreenerClient::requests_for(0), 0);
        assert_eq!(DexScreenerClient::requests_for(30), 1);
        assert_eq!(DexScreenerClient::requests_for(31), 2);
    }
}

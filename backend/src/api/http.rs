use std::time::Duration;

use common::logger::warn_if_slow;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use super::ApiError;
use super::cooldown::Cooldown;
use super::rate_limit::RateLimiter;

const SLOW_CALL: Duration = Duration::from_secs(5);

/// Shared GET plumbing: request accounting, cache busting and backoff.
pub struct HttpApi {
    name: &'static str,
    base_url: String,
    http: Client,
    limiter: RateLimiter,
    cooldown: Option<Cooldown>,
}

impl HttpApi {
    pub fn new(
        name: &'static str,
        base_url: impl Into<String>,
        limiter: RateLimiter,
        cooldown: Option<Cooldown>,
        headers: HeaderMap,
    ) -> Result<Self, ApiError> {
        let mut default_headers = headers;
        default_headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            name,
            base_url: base_url.into(),
            http,
            limiter,
            cooldown,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn limiter(&mut self) -> &mut RateLimiter {
        &mut self.limiter
    }

    /// GETs `base_url/path` and decodes the JSON body.
    ///
    /// 429 and 500 are retried after the cooldown delay; without a cooldown
    /// they are returned as typed errors.
    #[instrument(skip(self, query), fields(api = self.name, path = %path), level = "debug")]
    pub async fn get_json<T: DeserializeOwned>(&mut self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
        let url = format!("{}/{}", self.base_url, path);

        loop {
            let anti_cache = chrono::Utc::now().timestamp().to_string();
            let request = self
                .http
                .get(&url)
                .query(&[("anti-cache", anti_cache)])
                .query(query)
                .send();

            let resp = warn_if_slow(self.name, SLOW_CALL, request).await?;
            self.limiter.mark_sent()?;

            let status = resp.status();
            match status {
                StatusCode::OK => {
                    if let Some(cooldown) = self.cooldown.as_mut() {
                        cooldown.reset(true);
                    }
                    let body = resp.text().await?;
                    debug!(bytes = body.len(), "response received");
                    return Ok(serde_json::from_str(&body)?);
                }
                StatusCode::TOO_MANY_REQUESTS | StatusCode::INTERNAL_SERVER_ERROR => {
                    let Some(cooldown) = self.cooldown.as_mut() else {
                        return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                            ApiError::RateLimitExceeded(self.name.to_string())
                        } else {
                            ApiError::InternalServerError(self.name.to_string())
                        });
                    };

                    let delay = cooldown.make();
                    warn!(
                        api = self.name,
                        status = status.as_u16(),
                        delay_s = delay.as_secs_f64(),
                        "upstream refused request, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                _ => {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(ApiError::UnexpectedResponse {
                        status: status.as_u16(),
                        body,
                    });
                }
            }
        }
    }
}

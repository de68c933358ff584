//! Delivery of detected patterns.

use async_trait::async_trait;
use market::{PatternMatch, Timestamp};
use tracing::info;

/// What a sink needs to describe a detection without access to the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternAlert {
    pub pool_address: String,
    /// `BASE / QUOTE (dex)`.
    pub pool_name: String,
    pub price_usd: f64,
    pub liquidity: f64,
    pub volume: f64,
    pub detected_at: Timestamp,
    pub pattern: PatternMatch,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, alert: PatternAlert) -> anyhow::Result<()>;
}

/// Writes every alert to the log.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, alert: PatternAlert) -> anyhow::Result<()> {
        let m = &alert.pattern;
        info!(
            pool = %alert.pool_address,
            name = %alert.pool_name,
            pattern = m.pattern.name(),
            abbreviation = m.pattern.abbreviation(),
            change_pct = m.magnitude * 100.0,
            significant = m.significant,
            start = %m.start.format("%m-%d %H:%M"),
            end = %m.end.format("%m-%d %H:%M"),
            price_usd = alert.price_usd,
            "pattern detected"
        );
        Ok(())
    }
}

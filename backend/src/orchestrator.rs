//! The update cycle: discover pools, refresh live figures, backfill history,
//! detect patterns and hand them to the notification sink.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use common::logger::{TraceId, annotate_pool, cycle_span};
use market::time::{floor_to_minute, now};
use market::{Address, Network, PatternDetector, PoolRegistry, Timeframe};
use tokio::sync::watch;
use tracing::{Instrument, Level, debug, enabled, error, info, warn};

use crate::api::{ApiError, Currency, HistoryApi, OhlcvTimeframe, PageRange, PoolSource, SnapshotApi, SortBy};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::ingest::{BackfillPriority, candlesticks_to_ticks};
use crate::metrics::counters::{Counters, incr};
use crate::notify::{NotificationSink, PatternAlert};

/// Lower bound on the pause between cycles, so an empty registry does not spin.
pub const MIN_CYCLE_PAUSE: Duration = Duration::from_secs(1);

const DISCOVERY_SOURCES: [PoolSource; 2] = [PoolSource::Trending, PoolSource::Top];

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub network: Network,
    pub apply_filter_every: u64,
    pub fetch_new_every: u64,
    pub additional_cooldown: Duration,
    /// Live ticks are stamped at `now - snapshot_delay`, floored to the minute.
    pub snapshot_delay: Timeframe,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for OrchestratorSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            network: cfg.network,
            apply_filter_every: cfg.apply_filter_every.max(1),
            fetch_new_every: cfg.fetch_new_every.max(1),
            additional_cooldown: cfg.additional_cooldown,
            snapshot_delay: Timeframe::from_std(cfg.snapshot_delay).unwrap_or(Timeframe::zero()),
        }
    }
}

/// What one cycle did, for the summary log line and for tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub discovered: usize,
    pub added: usize,
    pub filtered_out: usize,
    pub backfilled: usize,
    pub alerts: Vec<PatternAlert>,
}

pub struct Orchestrator<S, H> {
    settings: OrchestratorSettings,
    snapshot_api: S,
    history_api: H,
    registry: PoolRegistry,
    detector: PatternDetector,
    sink: Arc<dyn NotificationSink>,
    counters: Counters,

    cycle: u64,
    /// Set while a scheduled discovery has not yet reached the registry, so
    /// a failed discovery cycle is retried on the next one.
    discovery_pending: bool,
    /// Cycle number of each pool's last backfill.
    last_backfill: HashMap<Address, u64>,
}

impl<S, H> Orchestrator<S, H>
where
    S: SnapshotApi,
    H: HistoryApi,
{
    pub fn new(
        settings: OrchestratorSettings,
        snapshot_api: S,
        history_api: H,
        registry: PoolRegistry,
        detector: PatternDetector,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            settings,
            snapshot_api,
            history_api,
            registry,
            detector,
            sink,
            counters: Counters::default(),
            cycle: 0,
            discovery_pending: false,
            last_backfill: HashMap::new(),
        }
    }

    pub fn with_counters(mut self, counters: Counters) -> Self {
        self.counters = counters;
        self
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Number of cycles attempted so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Runs cycles until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Fatal errors stop the loop and are returned; anything else fails the
    /// current cycle only.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), AppError> {
        info!(network = self.settings.network.id(), "orchestrator started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let span = cycle_span(self.cycle, &TraceId::default());
            if let Err(e) = self.run_cycle().instrument(span).await {
                if e.is_fatal() {
                    error!(error = %e, "fatal error, stopping");
                    return Err(e);
                }
                incr(&self.counters.cycles_failed);
                error!(error = %e, cycle = self.cycle - 1, "cycle failed");
            }

            let wait = match self.time_until_next_cycle() {
                Ok(wait) => wait,
                Err(e) => {
                    warn!(error = %e, "could not compute wait, using the minimum pause");
                    MIN_CYCLE_PAUSE + self.settings.additional_cooldown
                }
            };
            if wait >= Duration::from_secs(1) {
                info!(wait_s = wait.as_secs(), "waiting for the next cycle");
            }

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(cycles = self.cycle, "orchestrator stopped");
        Ok(())
    }

    /// One full cycle. The cycle counter advances whether or not it succeeds.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, AppError> {
        let result = self.cycle_steps().await;
        self.cycle += 1;
        incr(&self.counters.cycles_run);
        result
    }

    /// Pause before the next cycle: the longer of both APIs' waits for a
    /// full round of requests, plus the configured extra cooldown.
    pub fn time_until_next_cycle(&mut self) -> Result<Duration, AppError> {
        let pools = self.registry.len();

        let history = wait_for(|n| self.history_api.time_until_requests_available(n), pools)?;

        let per_request = self.snapshot_api.max_addresses_per_request().max(1);
        let snapshot = wait_for(
            |n| self.snapshot_api.time_until_requests_available(n),
            pools.div_ceil(per_request),
        )?;

        Ok(history.max(snapshot).max(MIN_CYCLE_PAUSE) + self.settings.additional_cooldown)
    }

    async fn cycle_steps(&mut self) -> Result<CycleReport, AppError> {
        let mut report = CycleReport::default();
        let cycle = self.cycle;
        info!(cycle, pools = self.registry.len(), "starting cycle");

        if cycle % self.settings.apply_filter_every == 0 {
            let removed = self.registry.apply_filter();
            if removed > 0 {
                debug!(removed, "pools no longer pass the filter");
            }
            report.filtered_out += removed;
        }

        let mut addresses = self.registry.addresses();
        if cycle % self.settings.fetch_new_every == 0 {
            self.discovery_pending = true;
        }
        if self.discovery_pending {
            let known: HashSet<Address> = addresses.iter().cloned().collect();
            let discovered = self.discover_pools().await?;
            let mut fresh: Vec<Address> = discovered
                .into_iter()
                .filter(|a| !known.contains(a))
                .collect();
            fresh.sort();
            fresh.dedup();
            report.discovered = fresh.len();
            addresses.extend(fresh);
        }

        let cycle_ts = floor_to_minute(now() - self.settings.snapshot_delay);
        let summary = self.refresh_snapshots(&addresses, cycle_ts).await?;
        report.added = summary.added;
        report.filtered_out += summary.filtered_out;
        self.discovery_pending = false;

        self.registry.append_live_ticks(&summary.refreshed, cycle_ts)?;
        self.last_backfill.retain(|a, _| self.registry.contains(a));
        annotate_pool(self.registry.len());
        self.counters
            .pools_tracked
            .store(self.registry.len() as u64, std::sync::atomic::Ordering::Relaxed);

        report.backfilled = self.backfill(cycle).await?;
        report.alerts = self.detect_and_notify().await;

        if enabled!(Level::DEBUG) {
            for pool in self.registry.pools() {
                debug!(pool = %self.registry.pool_name(pool), chart = %pool.chart);
            }
        }

        let c = self.counters.snapshot();
        info!(
            cycle,
            pools = self.registry.len(),
            discovered = report.discovered,
            added = summary.added,
            updated = summary.updated,
            filtered_out = report.filtered_out,
            evicted = summary.evicted,
            backfilled = report.backfilled,
            alerts = report.alerts.len(),
            total_backfills = c.backfills,
            total_patterns = c.patterns_emitted,
            cycles_failed = c.cycles_failed,
            "cycle finished"
        );

        Ok(report)
    }

    async fn discover_pools(&mut self) -> Result<Vec<Address>, AppError> {
        let refs = match self
            .history_api
            .get_pools(self.settings.network, &DISCOVERY_SOURCES, PageRange::ALL, SortBy::Volume)
            .await
        {
            Ok(refs) => refs,
            Err(ApiError::EmptyData(msg)) => {
                warn!(reason = %msg, "pool discovery returned nothing");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        debug!(found = refs.len(), "discovered pools");
        Ok(refs
            .into_iter()
            .filter(|r| r.network == self.settings.network)
            .map(|r| r.address)
            .collect())
    }

    async fn refresh_snapshots(
        &mut self,
        addresses: &[Address],
        cycle_ts: market::Timestamp,
    ) -> Result<market::UpdateSummary, AppError> {
        let batch_size = self.snapshot_api.max_addresses_per_request().max(1);
        let mut snapshots = Vec::with_capacity(addresses.len());

        for batch in addresses.chunks(batch_size) {
            match self.snapshot_api.get_pools(self.settings.network, batch).await {
                Ok(found) => snapshots.extend(found),
                Err(ApiError::EmptyData(msg)) => {
                    incr(&self.counters.snapshot_batches_empty);
                    warn!(reason = %msg, batch = batch.len(), "snapshot batch returned no pools");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(self.registry.update(snapshots, cycle_ts)?)
    }

    /// Spends the history API's free requests on the highest-priority pools.
    async fn backfill(&mut self, cycle: u64) -> Result<usize, AppError> {
        let budget = self.history_api.available_requests();
        if budget == 0 || self.registry.is_empty() {
            return Ok(0);
        }

        let mut queue: Vec<(Address, BackfillPriority)> = self
            .registry
            .pools()
            .map(|p| {
                let priority = BackfillPriority::new(
                    self.last_backfill.get(&p.address).copied(),
                    p.stats.volume,
                    p.stats.price_change.h1,
                );
                (p.address.clone(), priority)
            })
            .collect();
        queue.sort_by(|a, b| a.1.cmp_key(&b.1));
        queue.truncate(budget);

        let mut done = 0;
        for (address, _) in queue {
            let candles = self
                .history_api
                .get_ohlcv(
                    self.settings.network,
                    &address,
                    OhlcvTimeframe::Minute1,
                    Currency::Token,
                    None,
                )
                .await;
            self.last_backfill.insert(address.clone(), cycle);

            let candles = match candles {
                Ok(candles) => candles,
                Err(ApiError::EmptyData(msg)) => {
                    incr(&self.counters.backfills_empty);
                    warn!(pool = %address, reason = %msg, "no history for pool");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if let Some(pool) = self.registry.get_mut(&address) {
                pool.chart.update(candlesticks_to_ticks(&candles))?;
                incr(&self.counters.backfills);
                done += 1;
            }
        }

        Ok(done)
    }

    /// Asks every chart for a new pattern and notifies, largest move first.
    async fn detect_and_notify(&mut self) -> Vec<PatternAlert> {
        let detected_at = now();
        let mut found = Vec::new();

        for pool in self.registry.pools_mut() {
            let liquidity = pool.liquidity();
            if let Some(m) = pool
                .chart
                .get_pattern(&self.detector, Some(liquidity), true, detected_at)
            {
                found.push((pool.address.clone(), m));
            }
        }

        let mut alerts: Vec<PatternAlert> = found
            .into_iter()
            .filter_map(|(address, pattern)| {
                let pool = self.registry.get(&address)?;
                Some(PatternAlert {
                    pool_address: address,
                    pool_name: self.registry.pool_name(pool),
                    price_usd: pool.stats.price_usd,
                    liquidity: pool.stats.liquidity,
                    volume: pool.stats.volume,
                    detected_at,
                    pattern,
                })
            })
            .collect();
        alerts.sort_by(|a, b| b.pattern.magnitude.total_cmp(&a.pattern.magnitude));

        for alert in &alerts {
            incr(&self.counters.patterns_emitted);
            if let Err(e) = self.sink.notify(alert.clone()).await {
                incr(&self.counters.notify_failures);
                warn!(pool = %alert.pool_address, error = %e, "notification failed");
            }
        }

        alerts
    }
}

/// Wait for `requests` slots, capped at the limiter's maximum.
fn wait_for<F>(mut time_until: F, requests: usize) -> Result<Duration, ApiError>
where
    F: FnMut(Option<usize>) -> Result<Duration, ApiError>,
{
    if requests == 0 {
        return Ok(Duration::ZERO);
    }
    match time_until(Some(requests)) {
        Err(ApiError::InvalidRequestCount { max, .. }) => time_until(Some(max)),
        other => other,
    }
}

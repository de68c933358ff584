use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;

use market::time::{floor_to_minute, now};
use market::{
    Dex, Network, PatternDetector, PatternKind, PoolRegistry, PoolSnapshot, PoolStats, TimePeriods, Timeframe,
    Timestamp, Token,
};
use poolscan::{
    api::{
        ApiError, Candlestick, Currency, HistoryApi, OhlcvTimeframe, PageRange, PoolRef, PoolSource,
        SnapshotApi, SortBy,
    },
    config::AppConfig,
    notify::{NotificationSink, PatternAlert},
    orchestrator::{Orchestrator, OrchestratorSettings},
};

// -----------------------
// Mocks
// -----------------------

struct MockSnapshots {
    pools: HashMap<String, PoolSnapshot>,
    batches: Arc<Mutex<Vec<usize>>>,
    fail_next: Option<ApiError>,
}

#[async_trait]
impl SnapshotApi for MockSnapshots {
    fn max_addresses_per_request(&self) -> usize {
        2
    }

    async fn get_pools(&mut self, _network: Network, addresses: &[String]) -> Result<Vec<PoolSnapshot>, ApiError> {
        if let Some(e) = self.fail_next.take() {
            return Err(e);
        }
        self.batches.lock().unwrap().push(addresses.len());

        let found: Vec<_> = addresses.iter().filter_map(|a| self.pools.get(a).cloned()).collect();
        if found.is_empty() {
            return Err(ApiError::EmptyData("no pairs".into()));
        }
        Ok(found)
    }

    fn available_requests(&mut self) -> usize {
        300
    }

    fn time_until_requests_available(&mut self, _requests: Option<usize>) -> Result<Duration, ApiError> {
        Ok(Duration::ZERO)
    }
}

struct MockHistory {
    discovered: Vec<String>,
    discovery_error: Option<ApiError>,
    ohlcv: HashMap<String, Vec<Candlestick>>,
    budget: usize,
    backfilled: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl HistoryApi for MockHistory {
    async fn get_pools(
        &mut self,
        network: Network,
        sources: &[PoolSource],
        _pages: PageRange,
        sort: SortBy,
    ) -> Result<Vec<PoolRef>, ApiError> {
        assert_eq!(sources, &[PoolSource::Trending, PoolSource::Top]);
        assert_eq!(sort, SortBy::Volume);
        if let Some(e) = self.discovery_error.take() {
            return Err(e);
        }
        Ok(self
            .discovered
            .iter()
            .map(|a| PoolRef {
                network,
                address: a.clone(),
            })
            .collect())
    }

    async fn get_ohlcv(
        &mut self,
        _network: Network,
        address: &str,
        timeframe: OhlcvTimeframe,
        currency: Currency,
        _before: Option<Timestamp>,
    ) -> Result<Vec<Candlestick>, ApiError> {
        assert_eq!(timeframe, OhlcvTimeframe::Minute1);
        assert_eq!(currency, Currency::Token);
        self.backfilled.lock().unwrap().push(address.to_string());

        self.ohlcv
            .get(address)
            .cloned()
            .ok_or_else(|| ApiError::EmptyData("ohlcv list is empty".into()))
    }

    fn available_requests(&mut self) -> usize {
        self.budget
    }

    fn time_until_requests_available(&mut self, _requests: Option<usize>) -> Result<Duration, ApiError> {
        Ok(Duration::ZERO)
    }
}

#[derive(Default)]
struct RecordingSink {
    alerts: Mutex<Vec<PatternAlert>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, alert: PatternAlert) -> anyhow::Result<()> {
        self.alerts.lock().unwrap().push(alert);
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn notify(&self, _alert: PatternAlert) -> anyhow::Result<()> {
        anyhow::bail!("chat unreachable")
    }
}

// -----------------------
// Fixtures
// -----------------------

fn snapshot(address: &str, ticker: &str, price: f64, liquidity: f64, volume: f64, h1: f64) -> PoolSnapshot {
    let network = Network::Ton;
    PoolSnapshot {
        network,
        address: address.to_string(),
        base_token: Token {
            network,
            address: format!("{address}-token"),
            ticker: ticker.to_string(),
            name: ticker.to_string(),
        },
        quote_token: Token {
            network,
            address: network.native_token_address().to_string(),
            ticker: "TON".into(),
            name: "Toncoin".into(),
        },
        dex: Dex::from_id(network, "stonfi"),
        stats: PoolStats {
            price_native: price,
            price_usd: price * 5.0,
            fdv: 1_000_000.0,
            volume,
            liquidity,
            price_change: TimePeriods {
                h1: Some(h1),
                ..TimePeriods::default()
            },
            creation_date: Utc::now(),
        },
    }
}

/// Ten flat one-minute bars ending ten minutes ago, the last one dropping 35%.
fn dump_candles() -> Vec<Candlestick> {
    let start = floor_to_minute(now()) - Timeframe::minutes(20);
    (1..=10)
        .map(|i| {
            let close = if i == 10 { 0.65 } else { 1.0 };
            Candlestick {
                timestamp: start + Timeframe::minutes(i),
                open: 1.0,
                high: 1.0,
                low: close,
                close,
                volume: 100.0,
            }
        })
        .collect()
}

struct Harness {
    snapshots: MockSnapshots,
    history: MockHistory,
    batches: Arc<Mutex<Vec<usize>>>,
    backfilled: Arc<Mutex<Vec<String>>>,
}

fn harness() -> Harness {
    let batches = Arc::new(Mutex::new(Vec::new()));
    let backfilled = Arc::new(Mutex::new(Vec::new()));

    let pools = [
        snapshot("EQdump", "DMP", 0.65, 200_000.0, 50_000.0, -35.0),
        snapshot("EQquiet", "QT", 2.0, 200_000.0, 10_000.0, 0.1),
        snapshot("EQtiny", "TNY", 1.0, 10.0, 10.0, 0.0),
    ]
    .into_iter()
    .map(|s| (s.address.clone(), s))
    .collect();

    Harness {
        snapshots: MockSnapshots {
            pools,
            batches: batches.clone(),
            fail_next: None,
        },
        history: MockHistory {
            discovered: vec!["EQdump".into(), "EQquiet".into(), "EQtiny".into(), "EQgone".into()],
            discovery_error: None,
            ohlcv: HashMap::from([("EQdump".to_string(), dump_candles())]),
            budget: 1,
            backfilled: backfilled.clone(),
        },
        batches,
        backfilled,
    }
}

fn orchestrator(
    h: Harness,
    sink: Arc<dyn NotificationSink>,
) -> Orchestrator<MockSnapshots, MockHistory> {
    let cfg = AppConfig::default();
    let registry = PoolRegistry::new(cfg.chart_settings())
        .with_filter(cfg.pool_filter())
        .with_repeated_pool_key(cfg.repeated_pool_key);

    Orchestrator::new(
        OrchestratorSettings::from(&cfg),
        h.snapshots,
        h.history,
        registry,
        PatternDetector::new(cfg.pattern_config()),
        sink,
    )
}

// -----------------------
// Tests
// -----------------------

#[tokio::test]
async fn first_cycle_discovers_backfills_and_alerts() {
    let h = harness();
    let (batches, backfilled) = (h.batches.clone(), h.backfilled.clone());
    let sink = Arc::new(RecordingSink::default());
    let mut orch = orchestrator(h, sink.clone());

    let report = orch.run_cycle().await.unwrap();

    assert_eq!(report.discovered, 4);
    assert_eq!(report.added, 2);
    assert_eq!(report.filtered_out, 1);
    assert_eq!(orch.registry().len(), 2);
    assert!(!orch.registry().contains("EQtiny"));

    // four addresses, two per request
    assert_eq!(*batches.lock().unwrap(), vec![2, 2]);

    // budget of one goes to the most active pool
    assert_eq!(*backfilled.lock().unwrap(), vec!["EQdump".to_string()]);
    assert_eq!(report.backfilled, 1);

    let alerts = sink.alerts.lock().unwrap().clone();
    assert_eq!(alerts.len(), 1);
    assert_eq!(report.alerts, alerts);

    let alert = &alerts[0];
    assert_eq!(alert.pool_address, "EQdump");
    assert_eq!(alert.pool_name, "DMP / TON (stonfi)");
    assert_eq!(alert.pattern.pattern, PatternKind::Dump);
    assert!(alert.pattern.significant);
    assert!((alert.pattern.magnitude - 0.35).abs() < 1e-9);

    let c = orch.counters().snapshot();
    assert_eq!((c.cycles_run, c.backfills, c.patterns_emitted), (1, 1, 1));
    assert_eq!(c.pools_tracked, 2);
}

#[tokio::test]
async fn later_cycles_rotate_backfills_and_do_not_repeat_alerts() {
    let h = harness();
    let backfilled = h.backfilled.clone();
    let sink = Arc::new(RecordingSink::default());
    let mut orch = orchestrator(h, sink.clone());

    orch.run_cycle().await.unwrap();
    let second = orch.run_cycle().await.unwrap();

    // never-backfilled pool goes next; it has no history upstream
    assert_eq!(
        *backfilled.lock().unwrap(),
        vec!["EQdump".to_string(), "EQquiet".to_string()]
    );
    assert_eq!(second.backfilled, 0);
    assert_eq!(second.discovered, 0);
    assert!(second.alerts.is_empty());

    let c = orch.counters().snapshot();
    assert_eq!(c.backfills_empty, 1);
    assert_eq!(c.patterns_emitted, 1);
    assert_eq!(sink.alerts.lock().unwrap().len(), 1);

    // live ticks keep arriving every cycle
    let chart = &orch.registry().get("EQquiet").unwrap().chart;
    assert!(!chart.is_empty());
    assert_eq!(orch.cycle(), 2);
}

#[tokio::test]
async fn empty_snapshot_batches_are_skipped() {
    let mut h = harness();
    h.history.discovered = vec!["EQgone".into(), "EQmissing".into(), "EQdump".into()];
    let mut orch = orchestrator(h, Arc::new(RecordingSink::default()));

    let report = orch.run_cycle().await.unwrap();

    assert_eq!(report.added, 1);
    assert_eq!(orch.counters().snapshot().snapshot_batches_empty, 1);
}

#[tokio::test]
async fn sink_failures_do_not_fail_the_cycle() {
    let mut orch = orchestrator(harness(), Arc::new(FailingSink));

    let report = orch.run_cycle().await.unwrap();

    assert_eq!(report.alerts.len(), 1);
    let c = orch.counters().snapshot();
    assert_eq!((c.patterns_emitted, c.notify_failures), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn transient_errors_fail_one_cycle_and_the_loop_goes_on() {
    let mut h = harness();
    h.snapshots.fail_next = Some(ApiError::RateLimitExceeded("dexscreener".into()));
    let mut orch = orchestrator(h, Arc::new(RecordingSink::default()));

    let (tx, rx) = watch::channel(false);
    let (result, _) = tokio::join!(orch.run(rx), async move {
        tokio::time::sleep(Duration::from_millis(3500)).await;
        tx.send(true).unwrap();
    });

    assert!(result.is_ok());
    let c = orch.counters().snapshot();
    assert_eq!(c.cycles_failed, 1);
    assert!(c.cycles_run >= 3, "{c:?}");
    // discovery from the failed first cycle is picked up by the second
    assert!(orch.registry().contains("EQdump"));
    assert!(orch.registry().contains("EQquiet"));
}

#[tokio::test]
async fn failed_discovery_is_retried_next_cycle() {
    let mut h = harness();
    h.history.discovery_error = Some(ApiError::RateLimitExceeded("geckoterminal".into()));
    let mut orch = orchestrator(h, Arc::new(RecordingSink::default()));

    assert!(orch.run_cycle().await.is_err());
    assert!(orch.registry().is_empty());

    let retry = orch.run_cycle().await.unwrap();
    assert_eq!(retry.discovered, 4);
    assert_eq!(orch.registry().len(), 2);

    // once the pools are in, discovery goes back to its schedule
    let third = orch.run_cycle().await.unwrap();
    assert_eq!(third.discovered, 0);
    assert_eq!(orch.cycle(), 3);
}

#[tokio::test(start_paused = true)]
async fn unsupported_schema_stops_the_loop() {
    let mut h = harness();
    h.history.discovery_error = Some(ApiError::UnsupportedSchema {
        supported: "1.0.0".into(),
        got: "2.0.0".into(),
    });
    let mut orch = orchestrator(h, Arc::new(RecordingSink::default()));

    let (_tx, rx) = watch::channel(false);
    let err = orch.run(rx).await.unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(orch.cycle(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_before_start_runs_nothing() {
    let mut orch = orchestrator(harness(), Arc::new(RecordingSink::default()));

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    orch.run(rx).await.unwrap();

    assert_eq!(orch.cycle(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropped_shutdown_sender_stops_the_loop() {
    let mut orch = orchestrator(harness(), Arc::new(RecordingSink::default()));

    let (tx, rx) = watch::channel(false);
    drop(tx);
    orch.run(rx).await.unwrap();

    assert_eq!(orch.cycle(), 1);
}

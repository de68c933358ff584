use std::sync::Arc;

use common::logger::init_logger;
use market::{PatternDetector, PoolRegistry};
use poolscan::{
    api::{dexscreener::DexScreenerClient, geckoterminal, geckoterminal::GeckoTerminalClient},
    config::AppConfig,
    metrics::Counters,
    notify::TracingSink,
    orchestrator::{Orchestrator, OrchestratorSettings},
};
use tokio::sync::watch;

fn build_registry(cfg: &AppConfig) -> PoolRegistry {
    PoolRegistry::new(cfg.chart_settings())
        .with_filter(cfg.pool_filter())
        .with_repeated_pool_key(cfg.repeated_pool_key)
}

/// Flips the shutdown flag on Ctrl-C.
fn spawn_signal_handler(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = tx.send(true);
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            init_logger("poolscan", false);
            tracing::error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };
    init_logger("poolscan", cfg.production);

    tracing::info!("Starting poolscan...");
    tracing::info!(
        network = cfg.network.id(),
        testing_mode = cfg.testing_mode,
        min_liquidity = cfg.min_liquidity,
        min_volume = cfg.min_volume,
        "configuration loaded"
    );

    let snapshot_api = DexScreenerClient::new(Some(cfg.error_cooldown()))?;
    let history_api = GeckoTerminalClient::new(geckoterminal::API_VERSION, Some(cfg.error_cooldown()))?;

    let counters = Counters::default();
    let mut orchestrator = Orchestrator::new(
        OrchestratorSettings::from(&cfg),
        snapshot_api,
        history_api,
        build_registry(&cfg),
        PatternDetector::new(cfg.pattern_config()),
        Arc::new(TracingSink),
    )
    .with_counters(counters.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handler(shutdown_tx);

    let result = orchestrator.run(shutdown_rx).await;

    // Dropping the orchestrator closes both HTTP clients' connection pools.
    drop(orchestrator);
    tracing::info!(counters = ?counters.snapshot(), "poolscan stopped");

    Ok(result?)
}

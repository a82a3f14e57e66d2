//! Bridge messenger ETH balance auditor
//!
//! Runs one reconciler per layer against the shared `message_match` table
//! until Ctrl+C.
//!
//! Usage: `bridge_auditor [--env|-e <env>]` (reads `config/<env>.yaml`)

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use bridge_auditor::chain::EthRpcOracle;
use bridge_auditor::config::AppConfig;
use bridge_auditor::db::Database;
use bridge_auditor::logging::init_logging;
use bridge_auditor::reconcile::{CheckedCounters, LogAlerter, MessageStore, Reconciler};
use bridge_auditor::store::PgMessageStore;
use bridge_auditor::types::Layer;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env).context("loading configuration")?;
    let _log_guard = init_logging(&app_config);

    tracing::info!(env = %env, version = env!("GIT_HASH"), "Starting bridge auditor");

    let db = Database::connect(&app_config.database)
        .await
        .context("connecting to PostgreSQL")?;
    db.health_check().await.context("database health check")?;

    let store: Arc<dyn MessageStore> = Arc::new(PgMessageStore::new(db.pool().clone()));
    let counters = Arc::new(CheckedCounters::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::with_capacity(Layer::ALL.len());
    for layer in Layer::ALL {
        let layer_config = app_config.layer(layer);
        let settings = layer_config
            .settings(layer, &app_config.reconcile)
            .with_context(|| format!("{} settings", layer))?;
        let oracle = EthRpcOracle::new(layer, &layer_config.rpc_url, layer_config.rpc_timeout())
            .with_context(|| format!("{} oracle", layer))?;

        let reconciler = Reconciler::new(settings, store.clone(), Arc::new(oracle))
            .with_alerter(Arc::new(LogAlerter))
            .with_metrics(counters.clone());

        let interval = layer_config.check_interval();
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            reconciler.run(interval, shutdown).await;
        }));
    }

    tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;
    tracing::info!("Shutdown requested");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "reconciler task panicked");
        }
    }

    for layer in Layer::ALL {
        tracing::info!(
            layer = %layer,
            checked = counters.checked_total(layer),
            mismatches = counters.mismatch_total(layer),
            "Final ETH check counters"
        );
    }
    Ok(())
}

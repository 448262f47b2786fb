//! Background reconciliation loop for `serve`.

use std::sync::Arc;

use adsync_core::config::SyncConfig;
use adsync_core::{MirrorStore, Reconciler, RemoteCatalog};
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info};

/// Runs a full pass every `config.interval()` until `shutdown_rx` fires.
///
/// With `run_on_startup` the first pass starts immediately, otherwise after
/// one interval. Ticks missed while a pass runs long are skipped rather than
/// queued. A failed pass is logged and the loop carries on.
pub async fn run_scheduler<S, C>(
    reconciler: Arc<Reconciler<S, C>>,
    config: SyncConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) where
    S: MirrorStore,
    C: RemoteCatalog,
{
    let period = config.interval();
    let start = if config.run_on_startup {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_secs = period.as_secs(), "Scheduler started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                info!("Scheduled sync starting");
                match reconciler.sync_all().await {
                    Ok(report) => info!(
                        status = report.overall_status().as_str(),
                        advertisers_upserted = report.advertisers.upserted,
                        advertisers_failed = report.advertisers.failed,
                        campaigns_upserted = report.campaigns.upserted,
                        campaigns_failed = report.campaigns.failed,
                        "Scheduled sync finished"
                    ),
                    Err(e) => error!(error = %e, "Scheduled sync failed"),
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Scheduler received shutdown signal");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adsync_core::memory::MemoryStore;
    use adsync_core::AppError;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingCatalog {
        advertiser_calls: AtomicUsize,
        fail: bool,
    }

    impl RemoteCatalog for CountingCatalog {
        async fn list_advertisers(&self) -> Result<Vec<Value>, AppError> {
            self.advertiser_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::NetworkError("connection refused".to_string()));
            }
            Ok(vec![json!({"id": "adv-1", "name": "Acme"})])
        }

        async fn list_campaigns(&self) -> Result<Vec<Value>, AppError> {
            Ok(Vec::new())
        }
    }

    fn config(run_on_startup: bool) -> SyncConfig {
        SyncConfig {
            enabled: true,
            run_on_startup,
            interval_secs: 60,
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_startup_then_every_interval() {
        let reconciler = Arc::new(Reconciler::new(
            MemoryStore::new(),
            CountingCatalog::default(),
        ));
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_scheduler(Arc::clone(&reconciler), config(true), rx));

        settle().await;
        assert_eq!(reconciler.catalog().advertiser_calls.load(Ordering::SeqCst), 1);
        assert_eq!(reconciler.store().advertiser_rows().len(), 1);

        time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(reconciler.catalog().advertiser_calls.load(Ordering::SeqCst), 2);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_one_interval_without_startup_run() {
        let reconciler = Arc::new(Reconciler::new(
            MemoryStore::new(),
            CountingCatalog::default(),
        ));
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_scheduler(Arc::clone(&reconciler), config(false), rx));

        settle().await;
        assert_eq!(reconciler.catalog().advertiser_calls.load(Ordering::SeqCst), 0);

        time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(reconciler.catalog().advertiser_calls.load(Ordering::SeqCst), 1);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_pass_keeps_loop_alive() {
        let reconciler = Arc::new(Reconciler::new(
            MemoryStore::new(),
            CountingCatalog {
                fail: true,
                ..CountingCatalog::default()
            },
        ));
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_scheduler(Arc::clone(&reconciler), config(true), rx));

        settle().await;
        time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(reconciler.catalog().advertiser_calls.load(Ordering::SeqCst), 2);
        assert!(!handle.is_finished());

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}

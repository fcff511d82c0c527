use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Interval, MissedTickBehavior};

use mapway_core::{ChangeRequest, Config};
use mapway_table::TableFile;

use crate::control::{ControlEndpoint, ControlSocket};
use crate::engine::{EventOutcome, ReconcileReport, Reconciler};
use crate::error::{io_err, DaemonError};
use crate::events::{self, EventSource, RedisSubscription};
use crate::reload::trigger_reload;
use crate::store::{RedisStore, RouteStore};

/// Counters kept by the event loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    pub applied: u64,
    pub skipped: u64,
    pub invalid: u64,
    pub failed: u64,
    pub reconciliations: u64,
    pub reconcile_failures: u64,
}

impl LoopStats {
    fn record(&mut self, outcome: &EventOutcome) {
        match outcome {
            EventOutcome::Applied { .. } => self.applied += 1,
            EventOutcome::Skipped { .. } => self.skipped += 1,
            EventOutcome::Invalid { .. } => self.invalid += 1,
            EventOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Start the agent and block the current thread until it exits.
pub fn start_blocking(config: Config) -> Result<(), DaemonError> {
    crate::logging::init_tracing(&config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    let result = runtime.block_on(run(config));
    if let Err(err) = &result {
        tracing::error!(error = %err, "mapway agent stopped on fatal error");
    }
    result
}

/// Run the agent: subscribe, seed the table file, reload the load balancer,
/// then apply change events until shutdown or a fatal error.
pub async fn run(config: Config) -> Result<(), DaemonError> {
    tracing::info!(
        table = %config.table_path.display(),
        redis = %config.redis_url(),
        channel = %config.redis_channel,
        hash = %config.redis_key,
        socket = %config.control_socket.display(),
        "starting mapway agent",
    );

    // Subscribe first so changes published during bootstrap are queued, not lost.
    let mut source = RedisSubscription::subscribe(&config).await?;
    let store = RedisStore::connect(&config).await?;
    let mut engine = Reconciler::new(
        store,
        ControlSocket::new(&config.control_socket),
        TableFile::new(&config.table_path),
        config.op_timeout(),
    );

    engine.bootstrap().await?;

    let output = trigger_reload(&config.reload_command).await?;
    tracing::info!(command = %config.reload_command, output = %output, "load balancer reload triggered");

    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let shutdown_rx = shutdown_tx.subscribe();
    let signal_handle = tokio::spawn(async move {
        if let Err(err) = wait_for_shutdown_signal(&shutdown_tx).await {
            tracing::warn!(error = %err, "signal handler failed");
        }
    });

    let result = serve(
        &mut engine,
        &mut source,
        config.reconcile_interval(),
        shutdown_rx,
    )
    .await;
    signal_handle.abort();

    let stats = result?;
    tracing::info!(
        applied = stats.applied,
        skipped = stats.skipped,
        invalid = stats.invalid,
        failed = stats.failed,
        reconciliations = stats.reconciliations,
        "event loop stopped",
    );
    Ok(())
}

/// Apply events one at a time until shutdown.
///
/// Per-event failures are logged and trigger a reconciliation pass; only a
/// broken subscription ends the loop with an error. When `reconcile_every`
/// is set the pass also runs on that period.
pub async fn serve<S, C, E>(
    engine: &mut Reconciler<S, C>,
    source: &mut E,
    reconcile_every: Option<Duration>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<LoopStats, DaemonError>
where
    S: RouteStore,
    C: ControlEndpoint,
    E: EventSource,
{
    let mut ticker = match reconcile_every {
        Some(period) => {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await; // consume the first immediate tick
            Some(interval)
        }
        None => None,
    };
    let mut stats = LoopStats::default();
    let mut shutdown_open = true;

    loop {
        tokio::select! {
            signal = shutdown_rx.recv(), if shutdown_open => {
                if let Err(RecvError::Closed) = signal {
                    // No sender left: nothing can request shutdown any more.
                    tracing::warn!("shutdown channel closed; continuing without a shutdown trigger");
                    shutdown_open = false;
                    continue;
                }
                tracing::info!("shutdown requested; leaving event loop");
                break;
            }
            _ = next_tick(&mut ticker) => {
                run_reconcile(engine, &mut stats, "interval").await;
            }
            payload = source.next_payload() => {
                let payload = payload?;
                let outcome = engine.handle_payload(&payload).await;
                log_outcome(&outcome);
                stats.record(&outcome);
                if outcome.is_failure() {
                    run_reconcile(engine, &mut stats, "event failure").await;
                }
            }
        }
    }

    Ok(stats)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn run_reconcile<S, C>(
    engine: &mut Reconciler<S, C>,
    stats: &mut LoopStats,
    trigger: &'static str,
) where
    S: RouteStore,
    C: ControlEndpoint,
{
    stats.reconciliations += 1;
    match engine.reconcile().await {
        Ok(report) if report.is_clean() => {
            tracing::debug!(trigger, "reconciliation pass clean");
        }
        Ok(report) => {
            tracing::info!(trigger, report = ?report, "reconciliation pass repaired drift");
        }
        Err(err) => {
            stats.reconcile_failures += 1;
            tracing::error!(
                trigger,
                error = %err,
                "reconciliation pass failed; projections may disagree until the next pass",
            );
        }
    }
}

fn log_outcome(outcome: &EventOutcome) {
    match outcome {
        EventOutcome::Applied { action, key } => {
            tracing::info!(action = %action, key = %key, "change applied");
        }
        EventOutcome::Skipped {
            action,
            key,
            reason,
        } => {
            tracing::info!(action = %action, key = %key, reason = %reason, "change skipped");
        }
        EventOutcome::Invalid { reason } => {
            tracing::warn!(reason = %reason, "invalid change discarded");
        }
        EventOutcome::Failed {
            action,
            key,
            stage,
            error,
        } => {
            tracing::error!(
                action = %action,
                key = %key,
                stage = %stage,
                error = %error,
                "change failed",
            );
        }
    }
}

async fn wait_for_shutdown_signal(shutdown: &broadcast::Sender<()>) -> Result<(), DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM", e))?;
    tokio::select! {
        received = tokio::signal::ctrl_c() => {
            received.map_err(|e| DaemonError::Runtime(format!("ctrl-c handler failed: {e}")))?;
            tracing::info!("received ctrl-c, shutting down");
        }
        _ = terminate.recv() => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
    let _ = shutdown.send(());
    Ok(())
}

// ---------------------------------------------------------------------------
// One-shot entrypoints for the CLI
// ---------------------------------------------------------------------------

/// Run a single reconciliation pass against the configured store, file and socket.
pub async fn reconcile_once(config: &Config) -> Result<ReconcileReport, DaemonError> {
    let store = RedisStore::connect(config).await?;
    let mut engine = Reconciler::new(
        store,
        ControlSocket::new(&config.control_socket),
        TableFile::new(&config.table_path),
        config.op_timeout(),
    );
    engine.reconcile().await
}

pub fn reconcile_blocking(config: &Config) -> Result<ReconcileReport, DaemonError> {
    current_thread_runtime()?.block_on(reconcile_once(config))
}

pub fn publish_blocking(config: &Config, request: &ChangeRequest) -> Result<usize, DaemonError> {
    current_thread_runtime()?.block_on(events::publish(config, request))
}

fn current_thread_runtime() -> Result<tokio::runtime::Runtime, DaemonError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::TempDir;
    use tokio_test::assert_err;

    use crate::testing::{ChannelSource, MemoryStore, RecordingControl};

    fn engine_in(
        dir: &TempDir,
        store: &MemoryStore,
        control: &RecordingControl,
    ) -> Reconciler<MemoryStore, RecordingControl> {
        let path = dir.path().join("mappings.map");
        fs::write(&path, "").expect("seed table file");
        Reconciler::new(
            store.clone(),
            control.clone(),
            TableFile::new(path),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn broken_subscription_ends_the_loop_with_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let store = MemoryStore::default();
        let control = RecordingControl::default();
        let mut engine = engine_in(&dir, &store, &control);
        let (tx, mut source) = ChannelSource::new();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(ChangeRequest::add("a", "1").encode().unwrap())
            .await
            .unwrap();
        tx.send(ChangeRequest::add("a", "1").encode().unwrap())
            .await
            .unwrap();
        tx.send(r#"{"Key":"a","Action":"update"}"#.to_string())
            .await
            .unwrap();
        tx.send(ChangeRequest::remove("zzz").encode().unwrap())
            .await
            .unwrap();
        drop(tx);

        let err = assert_err!(serve(&mut engine, &mut source, None, shutdown_rx).await);

        assert!(
            matches!(err, DaemonError::SubscriptionClosed { .. }),
            "got: {err}"
        );
        assert_eq!(fs::read_to_string(engine.table().path()).unwrap(), "a 1\n");
        assert_eq!(control.sent().len(), 1);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_signal_returns_stats() {
        let dir = TempDir::new().expect("tempdir");
        let store = MemoryStore::default();
        let control = RecordingControl::default();
        let mut engine = engine_in(&dir, &store, &control);
        let (tx, mut source) = ChannelSource::new();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let feeder = tokio::spawn(async move {
            tx.send(ChangeRequest::add("a", "1").encode().unwrap())
                .await
                .unwrap();
            tx.send("garbage".to_string()).await.unwrap();
            tx.send(ChangeRequest::remove("a").encode().unwrap())
                .await
                .unwrap();
            // Keep the subscription open until the loop is told to stop.
            tx
        });

        let control_probe = control.clone();
        let stopper = tokio::spawn(async move {
            while control_probe.sent().len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            shutdown_tx.send(()).unwrap();
        });

        let stats = serve(&mut engine, &mut source, None, shutdown_rx)
            .await
            .expect("clean shutdown");
        stopper.await.unwrap();
        let _tx = feeder.await.unwrap();

        assert_eq!(
            stats,
            LoopStats {
                applied: 2,
                invalid: 1,
                ..LoopStats::default()
            }
        );
        assert_eq!(fs::read_to_string(engine.table().path()).unwrap(), "");
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn failed_event_triggers_a_repair_pass() {
        let dir = TempDir::new().expect("tempdir");
        let store = MemoryStore::default();
        let control = RecordingControl::default();
        let mut engine = engine_in(&dir, &store, &control);
        let (tx, mut source) = ChannelSource::new();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        // The store write fails after the file append; the repair pass then
        // rebuilds the file from the (still empty) store.
        store.fail_on(Some("set"));
        tx.send(ChangeRequest::add("a", "1").encode().unwrap())
            .await
            .unwrap();
        drop(tx);

        let _ = serve(&mut engine, &mut source, None, shutdown_rx).await;

        assert_eq!(fs::read_to_string(engine.table().path()).unwrap(), "");
        assert_eq!(
            control.sent(),
            vec![format!("del map {} a", engine.table().path().display())]
        );
        assert!(!engine.has_pending_repairs());
    }

    #[tokio::test]
    async fn closed_shutdown_channel_does_not_stop_the_loop() {
        let dir = TempDir::new().expect("tempdir");
        let store = MemoryStore::default();
        let control = RecordingControl::default();
        let mut engine = engine_in(&dir, &store, &control);
        let (tx, mut source) = ChannelSource::new();
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        drop(shutdown_tx);

        tx.send(ChangeRequest::add("a", "1").encode().unwrap())
            .await
            .unwrap();
        tx.send(ChangeRequest::add("b", "2").encode().unwrap())
            .await
            .unwrap();
        drop(tx);

        let err = assert_err!(serve(&mut engine, &mut source, None, shutdown_rx).await);

        assert!(
            matches!(err, DaemonError::SubscriptionClosed { .. }),
            "got: {err}"
        );
        assert_eq!(fs::read_to_string(engine.table().path()).unwrap(), "a 1\nb 2\n");
        assert_eq!(control.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_reconciles_without_events() {
        let dir = TempDir::new().expect("tempdir");
        let store = MemoryStore::with(&[("a", "1")]);
        let control = RecordingControl::default();
        let mut engine = engine_in(&dir, &store, &control);
        let (_tx, mut source) = ChannelSource::new();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let control_probe = control.clone();
        let stopper = tokio::spawn(async move {
            while control_probe.sent().is_empty() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            shutdown_tx.send(()).unwrap();
        });

        let stats = serve(
            &mut engine,
            &mut source,
            Some(Duration::from_secs(30)),
            shutdown_rx,
        )
        .await
        .expect("clean shutdown");
        stopper.await.unwrap();

        assert!(stats.reconciliations >= 1);
        assert_eq!(fs::read_to_string(engine.table().path()).unwrap(), "a 1\n");
    }
}

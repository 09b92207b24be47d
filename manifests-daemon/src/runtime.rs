//! Daemon runtime: single-flight sync processor + HTTP server + signal handler.
//!
//! Every trigger goes through one queue drained by one processor task, so at
//! most one pass touches the managed directory at a time. Triggers that queue
//! up while a pass is running are answered together by the next pass.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::Instant;

use manifests_core::Config;
use manifests_sync::{
    pipeline::{self, SyncOutcome, SyncRequest},
    CancellationToken, GitRemote, RemoteSource, SyncError,
};

use crate::error::{io_err, DaemonError};
use crate::server::{self, AppState};

/// Everything a pass needs, fixed at startup.
#[derive(Clone)]
pub struct SyncSettings {
    pub source: Arc<dyn RemoteSource>,
    pub request: SyncRequest,
    /// Upper bound for one pass before it is cancelled.
    pub timeout: Duration,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source: Arc::new(GitRemote::new(config.git_repo_url.clone())),
            request: SyncRequest {
                root: config.manifests_dir.clone(),
                filter: config.filter.clone(),
                dry_run: false,
            },
            timeout: config.sync_timeout,
        }
    }
}

/// Counts reported back to triggers for a completed pass.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SyncSummary {
    pub revision: String,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
    /// Set when the pass hit the sync timeout after it had started applying;
    /// the counts then cover only the paths visited before cancellation.
    pub timed_out: bool,
    /// Failed paths with their cause, `path: error`.
    pub errors: Vec<String>,
    /// How many triggers this pass answered.
    pub triggers: usize,
    pub duration_ms: u128,
}

impl SyncSummary {
    fn from_outcome(
        outcome: &SyncOutcome,
        triggers: usize,
        elapsed: Duration,
        timed_out: bool,
    ) -> Self {
        let report = &outcome.report;
        Self {
            revision: outcome.revision.clone(),
            created: report.created(),
            updated: report.updated(),
            unchanged: report.unchanged(),
            deleted: report.deleted(),
            failed: report.failed(),
            skipped: report.skipped.len(),
            cancelled: report.cancelled,
            timed_out,
            errors: report
                .outcomes
                .iter()
                .filter_map(|o| match &o.status {
                    manifests_sync::OutcomeStatus::Failed { error } => {
                        Some(format!("{}: {error}", o.path))
                    }
                    _ => None,
                })
                .collect(),
            triggers,
            duration_ms: elapsed.as_millis(),
        }
    }
}

/// Most recent pass, served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LastSync {
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SyncSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct SyncJob {
    source: &'static str,
    respond_to: oneshot::Sender<Result<SyncSummary, String>>,
}

/// Cloneable entry point for requesting a pass.
#[derive(Clone)]
pub struct SyncHandle {
    sync_tx: mpsc::Sender<SyncJob>,
}

impl SyncHandle {
    /// Request a pass and wait for the pass that serves it.
    pub async fn trigger(&self, source: &'static str) -> Result<SyncSummary, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.sync_tx
            .send(SyncJob {
                source,
                respond_to: tx,
            })
            .await
            .map_err(|_| DaemonError::ChannelClosed("sync queue"))?;

        let outcome = rx
            .await
            .map_err(|_| DaemonError::ChannelClosed("sync response"))?;
        outcome.map_err(DaemonError::PassFailed)
    }
}

/// Spawn the processor task and return a handle feeding it.
pub fn spawn_processor(
    settings: SyncSettings,
    last_sync: Arc<RwLock<Option<LastSync>>>,
    shutdown: &broadcast::Sender<()>,
) -> (SyncHandle, tokio::task::JoinHandle<Result<(), DaemonError>>) {
    let (sync_tx, sync_rx) = mpsc::channel::<SyncJob>(64);
    let shutdown_rx = shutdown.subscribe();
    let handle = tokio::spawn(sync_processor_task(settings, last_sync, sync_rx, shutdown_rx));
    (SyncHandle { sync_tx }, handle)
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: Config) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon until ctrl-c.
pub async fn run(config: Config) -> Result<(), DaemonError> {
    let settings = SyncSettings::from_config(&config);
    tracing::info!(
        repo = %config.git_repo_url,
        manifests_dir = %config.manifests_dir.display(),
        "starting manifests updater"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| io_err(addr.to_string(), e))?;
    tracing::info!("listening on http://{addr}");

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let last_sync = Arc::new(RwLock::new(None));

    let (sync, processor_handle) = spawn_processor(settings, last_sync.clone(), &shutdown_tx);

    let server_handle = {
        let shutdown = shutdown_tx.clone();
        let state = AppState { sync, last_sync };
        tokio::spawn(async move {
            let result = server::serve(listener, state, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Task {
                            task: "signal_handler",
                            reason: format!("ctrl-c handler failed: {err}"),
                        }),
                    }
                }
            }
        })
    };

    let (processor_result, server_result, signal_result) =
        tokio::join!(processor_handle, server_handle, signal_handle);

    handle_join("sync_processor", processor_result)?;
    handle_join("http_server", server_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn sync_processor_task(
    settings: SyncSettings,
    last_sync: Arc<RwLock<Option<LastSync>>>,
    mut sync_rx: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = sync_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let mut jobs = vec![job];
                while let Ok(job) = sync_rx.try_recv() {
                    jobs.push(job);
                }
                tracing::info!(
                    triggers = jobs.len(),
                    source = jobs[0].source,
                    "starting sync pass"
                );

                let (outcome, stopping) = run_pass(&settings, jobs.len(), &mut shutdown_rx).await;
                match &outcome {
                    Ok(summary) => tracing::info!(
                        revision = %summary.revision,
                        created = summary.created,
                        updated = summary.updated,
                        deleted = summary.deleted,
                        failed = summary.failed,
                        duration_ms = summary.duration_ms,
                        "sync pass completed",
                    ),
                    Err(err) => tracing::error!(error = %err, "sync pass failed"),
                }

                // Lock taken only after the pass, never across it.
                *last_sync.write().await = Some(LastSync {
                    finished_at: Utc::now(),
                    summary: outcome.as_ref().ok().cloned(),
                    error: outcome.as_ref().err().cloned(),
                });

                for job in jobs {
                    let _ = job.respond_to.send(outcome.clone());
                }
                if stopping {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Run one pass on the blocking pool. Timeout and shutdown cancel the pass
/// and then wait for it to wind down, so passes never overlap.
///
/// The returned flag is set when shutdown was requested during the pass.
async fn run_pass(
    settings: &SyncSettings,
    triggers: usize,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> (Result<SyncSummary, String>, bool) {
    let started = Instant::now();
    let cancel = CancellationToken::new();

    let mut pass = {
        let source = settings.source.clone();
        let request = settings.request.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || pipeline::run(source.as_ref(), &request, &cancel))
    };

    let mut stopping = false;
    let mut timed_out = false;
    let joined = tokio::select! {
        joined = &mut pass => joined,
        _ = tokio::time::sleep(settings.timeout) => {
            tracing::warn!(timeout_ms = settings.timeout.as_millis() as u64, "sync pass timed out, cancelling");
            timed_out = true;
            cancel.cancel();
            pass.await
        }
        _ = shutdown_rx.recv() => {
            tracing::warn!("shutdown requested during sync pass, cancelling");
            stopping = true;
            cancel.cancel();
            pass.await
        }
    };

    let outcome = match joined {
        Err(err) => Err(format!("sync task join error: {err}")),
        Ok(Err(SyncError::Cancelled)) if timed_out => Err(format!(
            "sync timed out after {}s",
            settings.timeout.as_secs_f64()
        )),
        Ok(Err(err)) => Err(err.to_string()),
        // Cancelled while reconciling: some paths may already be applied, so
        // the partial report is still returned.
        Ok(Ok(outcome)) => Ok(SyncSummary::from_outcome(
            &outcome,
            triggers,
            started.elapsed(),
            timed_out,
        )),
    };
    (outcome, stopping)
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Task {
            task,
            reason: format!("join failure: {err}"),
        }),
    }
}

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

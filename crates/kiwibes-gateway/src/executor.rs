//! Job execution: turns a catalog `start` request into a spawned child,
//! tracks it for the watchdog sweep, and re-spawns it immediately if a
//! start request queued up while it was running (SPEC_FULL §4.5).
//!
//! The Executor never mutates a `Job`'s runtime-statistics fields
//! itself — that's `Catalog`'s job, through `try_begin_start` and
//! `finish_run`. Executor only decides *when* to call those, and owns
//! the actual OS process handle in between.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kiwibes_domain::Error;
use tokio::sync::RwLock;

use crate::catalog::{BeginStart, Catalog};

struct RunningEntry {
    handle: kiwibes_procman::ChildHandle,
    /// `None` means `max-runtime == 0`, i.e. no watchdog deadline (J2).
    deadline: Option<Instant>,
}

pub struct Executor {
    catalog: Arc<Catalog>,
    running: Arc<RwLock<HashMap<String, RunningEntry>>>,
}

impl Executor {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Executor { catalog, running: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Request a run of `name`. If the job is already running, this only
    /// queues `pending-start`; otherwise it spawns the child immediately.
    pub async fn start(&self, name: &str) -> Result<(), Error> {
        match self.catalog.try_begin_start(name).await? {
            BeginStart::Queued => Ok(()),
            BeginStart::ShouldSpawn { program, max_runtime } => {
                spawn_and_track(name.to_string(), program, max_runtime, self.catalog.clone(), self.running.clone())
                    .await
            }
        }
    }

    /// Request termination of a running job's process. Completion is
    /// always observed through the background waiter, never here.
    pub async fn stop(&self, name: &str) -> Result<(), Error> {
        if !self.catalog.is_running(name).await? {
            return Err(Error::JobIsNotRunning(name.to_string()));
        }
        if let Some(entry) = self.running.read().await.get(name) {
            entry.handle.kill();
        }
        Ok(())
    }

    pub async fn clear_pending(&self, name: &str) -> Result<(), Error> {
        self.catalog.clear_pending(name).await
    }

    /// Terminate every currently running child. Used on graceful
    /// shutdown (SPEC_FULL §5); does not wait for them to exit.
    pub async fn shutdown(&self) {
        for entry in self.running.read().await.values() {
            entry.handle.kill();
        }
    }

    /// Called once per scheduler tick: kill any running job whose
    /// `start-time + max-runtime` deadline has passed. This is the whole
    /// of the watchdog — there is no per-child timer.
    pub async fn watchdog_sweep(&self) {
        let now = Instant::now();
        let running = self.running.read().await;
        for (name, entry) in running.iter() {
            if let Some(deadline) = entry.deadline {
                if now >= deadline {
                    tracing::info!(name, "watchdog: job exceeded max-runtime, terminating");
                    entry.handle.kill();
                }
            }
        }
    }
}

/// Spawn `program`, register it in `running`, and arrange for
/// `catalog.finish_run` to be called when it exits. If `finish_run`
/// reports a queued restart, this fires again for the same job name.
/// Boxed because it recurses through an `async move` block spawned onto
/// the runtime.
fn spawn_and_track(
    name: String,
    program: Vec<String>,
    max_runtime: u64,
    catalog: Arc<Catalog>,
    running: Arc<RwLock<HashMap<String, RunningEntry>>>,
) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send>> {
    Box::pin(async move {
        let (handle, done_rx) = match kiwibes_procman::spawn(&program) {
            Ok(pair) => pair,
            Err(e) => {
                catalog.revert_failed_start(&name).await;
                return Err(Error::ProcessLaunchFailed(e.to_string()));
            }
        };

        let deadline = (max_runtime > 0).then(|| Instant::now() + Duration::from_secs(max_runtime));
        running.write().await.insert(name.clone(), RunningEntry { handle, deadline });

        let started = Instant::now();
        tokio::spawn(async move {
            let _outcome = done_rx.await;
            running.write().await.remove(&name);
            let duration = started.elapsed().as_secs_f64();
            let should_restart = catalog.finish_run(&name, duration).await;
            if should_restart {
                if let Err(e) = fire_queued_restart(name, catalog, running).await {
                    tracing::warn!(error = %e, "failed to restart queued job");
                }
            }
        });

        Ok(())
    })
}

/// Re-enter the start path for a job whose completion handler found a
/// queued `pending-start`. `try_begin_start` is guaranteed to return
/// `ShouldSpawn` here since the job was just set back to `stopped`.
async fn fire_queued_restart(
    name: String,
    catalog: Arc<Catalog>,
    running: Arc<RwLock<HashMap<String, RunningEntry>>>,
) -> Result<(), Error> {
    match catalog.try_begin_start(&name).await? {
        BeginStart::ShouldSpawn { program, max_runtime } => {
            spawn_and_track(name, program, max_runtime, catalog, running).await
        }
        BeginStart::Queued => Ok(()),
    }
}

//! One-second tick loop: matches every scheduled job's cron expression
//! against the current local time and fires `Executor::start` for
//! matching entries whose `status == stopped`, then runs the watchdog
//! sweep (SPEC_FULL §4.3, §4.5, §4.6). A running job that keeps
//! matching its own schedule is left alone here — it is not re-queued
//! tick after tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::catalog::Catalog;
use crate::config::defaults;
use crate::cron::{self, BrokenDownTime};
use crate::executor::Executor;

fn now_epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Drives the tick loop until the process is told to shut down. Runs as
/// its own task; never returns under normal operation.
pub async fn run(catalog: Arc<Catalog>, executor: Arc<Executor>) {
    let mut interval = tokio::time::interval(defaults::SCHEDULER_TICK);
    // last epoch-second a given job was fired, so a late or doubled tick
    // (e.g. after a scheduling hiccup) never fires the same job twice
    // for what is really the same calendar second.
    let mut last_fired: HashMap<String, u64> = HashMap::new();

    loop {
        interval.tick().await;
        let now_secs = now_epoch_secs();
        let now = BrokenDownTime::now_local();

        for name in catalog.scheduled().await {
            let Ok(job) = catalog.details(&name).await else { continue };
            if !cron::matches(&job.schedule, now) {
                continue;
            }
            if last_fired.get(&name) == Some(&now_secs) {
                continue;
            }
            last_fired.insert(name.clone(), now_secs);

            // Only fire a fresh start for a stopped job (§4.6); a job
            // that's already running must not have its pending-start
            // queue bumped by every tick the schedule keeps matching.
            if job.status != kiwibes_domain::JobStatus::Stopped {
                continue;
            }

            if let Err(e) = executor.start(&name).await {
                tracing::warn!(name = %name, error = %e, "scheduled start failed");
            }
        }

        executor.watchdog_sweep().await;
    }
}

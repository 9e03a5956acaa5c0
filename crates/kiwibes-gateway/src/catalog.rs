//! Thread-safe, single-writer store over the Job set (SPEC_FULL §4.2).
//!
//! All mutations serialize on one `tokio::sync::RwLock`; readers take
//! the read side and clone out. Definition fields (`program`,
//! `schedule`, `max-runtime`) are owned here exclusively; so are the
//! runtime-statistics fields (`status`, `start-time`, `nbr-runs`,
//! `avg-runtime`, `var-runtime`, `pending-start`) — Executor is the
//! only caller permitted to invoke the mutation methods below that
//! touch them (`try_begin_start`, `finish_run`, `clear_pending`).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use kiwibes_domain::{is_valid_job_name, Error, Job, JobStatus};
use tokio::sync::RwLock;

use crate::cron;
use crate::persistence;

/// Result of atomically attempting to start a job: either the caller
/// must spawn a new child (this call transitioned stopped -> running),
/// or the job was already running and this call only queued a request.
#[derive(Debug, Clone)]
pub enum BeginStart {
    ShouldSpawn { program: Vec<String>, max_runtime: u64 },
    Queued,
}

pub struct Catalog {
    jobs: RwLock<HashMap<String, Job>>,
    path: PathBuf,
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Catalog {
    /// Load the catalog from `path`, failing boot per §4.1's contract.
    /// Callers that already loaded the map (e.g. `main`) should use
    /// `Catalog::from_jobs` instead.
    pub fn from_jobs(jobs: HashMap<String, Job>, path: PathBuf) -> Self {
        Catalog { jobs: RwLock::new(jobs), path }
    }

    async fn persist(&self) {
        let snapshot = self.jobs.read().await.clone();
        let path = self.path.clone();
        let result =
            tokio::task::spawn_blocking(move || persistence::save_catalog(&path, &snapshot))
                .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to persist catalog"),
            Err(e) => tracing::warn!(error = %e, "catalog persist task panicked"),
        }
    }

    /// Force a persist of the current in-memory state. Every mutation
    /// already persists itself; this exists for the shutdown path,
    /// which wants an explicit guarantee rather than an implicit one.
    pub async fn flush(&self) {
        self.persist().await;
    }

    pub async fn list(&self) -> Vec<String> {
        self.jobs.read().await.keys().cloned().collect()
    }

    pub async fn scheduled(&self) -> Vec<String> {
        self.jobs
            .read()
            .await
            .iter()
            .filter(|(_, j)| !j.schedule.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub async fn details(&self, name: &str) -> Result<Job, Error> {
        self.jobs
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::JobNameUnknown(name.to_string()))
    }

    fn validate_definition(schedule: &str, program: &[String]) -> Result<(), Error> {
        if program.is_empty() || program[0].is_empty() {
            return Err(Error::JobDescriptionInvalid);
        }
        if !schedule.is_empty() && !cron::validate(schedule) {
            return Err(Error::JobScheduleInvalid);
        }
        Ok(())
    }

    pub async fn create(
        &self,
        name: String,
        program: Vec<String>,
        schedule: String,
        max_runtime: u64,
    ) -> Result<(), Error> {
        if !is_valid_job_name(&name) {
            return Err(Error::JobDescriptionInvalid);
        }
        Self::validate_definition(&schedule, &program)?;

        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&name) {
            return Err(Error::JobNameTaken(name));
        }
        jobs.insert(name, Job::new(program, schedule, max_runtime));
        drop(jobs);
        self.persist().await;
        Ok(())
    }

    pub async fn edit(
        &self,
        name: &str,
        program: Vec<String>,
        schedule: String,
        max_runtime: u64,
    ) -> Result<(), Error> {
        Self::validate_definition(&schedule, &program)?;

        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(name)
            .ok_or_else(|| Error::JobNameUnknown(name.to_string()))?;
        if job.status == JobStatus::Running {
            return Err(Error::JobIsRunning(name.to_string()));
        }
        job.apply_edit(program, schedule, max_runtime);
        drop(jobs);
        self.persist().await;
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<(), Error> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get(name)
            .ok_or_else(|| Error::JobNameUnknown(name.to_string()))?;
        if job.status == JobStatus::Running {
            return Err(Error::JobIsRunning(name.to_string()));
        }
        jobs.remove(name);
        drop(jobs);
        self.persist().await;
        Ok(())
    }

    /// Atomically either transitions `stopped -> running` (caller must
    /// then spawn the child) or increments `pending-start` when already
    /// running. Serializing this under the single catalog lock is what
    /// makes two concurrent `start(n)` calls resolve deterministically
    /// (SPEC_FULL §5).
    pub async fn try_begin_start(&self, name: &str) -> Result<BeginStart, Error> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(name)
            .ok_or_else(|| Error::JobNameUnknown(name.to_string()))?;

        if job.status == JobStatus::Running {
            job.pending_start += 1;
            let outcome = BeginStart::Queued;
            drop(jobs);
            self.persist().await;
            return Ok(outcome);
        }

        job.status = JobStatus::Running;
        job.start_time = now_epoch_secs();
        let outcome = BeginStart::ShouldSpawn {
            program: job.program.clone(),
            max_runtime: job.max_runtime,
        };
        drop(jobs);
        self.persist().await;
        Ok(outcome)
    }

    /// Revert a job to `stopped` after a spawn attempt failed, per §4.5
    /// "no state change" on `ERROR_PROCESS_LAUNCH_FAILED`. `try_begin_start`
    /// had already flipped the job to `running`; this undoes exactly that.
    pub async fn revert_failed_start(&self, name: &str) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(name) {
            job.status = JobStatus::Stopped;
            job.start_time = 0;
        }
        drop(jobs);
        self.persist().await;
    }

    /// `true` iff the job exists and is currently running.
    pub async fn is_running(&self, name: &str) -> Result<bool, Error> {
        self.jobs
            .read()
            .await
            .get(name)
            .map(|j| j.status == JobStatus::Running)
            .ok_or_else(|| Error::JobNameUnknown(name.to_string()))
    }

    pub async fn clear_pending(&self, name: &str) -> Result<(), Error> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(name)
            .ok_or_else(|| Error::JobNameUnknown(name.to_string()))?;
        job.pending_start = 0;
        drop(jobs);
        self.persist().await;
        Ok(())
    }

    /// Completion handler (SPEC_FULL §4.5): updates Welford moments,
    /// increments `nbr-runs`, clears the running state, and — if a
    /// pending start is queued — decrements it and reports that the
    /// caller should immediately spawn another run of the same job.
    pub async fn finish_run(&self, name: &str, duration_secs: f64) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(name) else {
            tracing::warn!(name, "finish_run called for a job no longer in the catalog");
            return false;
        };

        welford_update(job, duration_secs);
        job.nbr_runs += 1;
        job.status = JobStatus::Stopped;
        job.start_time = 0;

        let should_restart = if job.pending_start > 0 {
            job.pending_start -= 1;
            true
        } else {
            false
        };

        drop(jobs);
        self.persist().await;
        should_restart
    }
}

/// Welford's online algorithm for running mean/variance (J5, P3).
fn welford_update(job: &mut Job, new_value: f64) {
    let n = (job.nbr_runs + 1) as f64;
    let delta = new_value - job.avg_runtime;
    job.avg_runtime += delta / n;
    let delta2 = new_value - job.avg_runtime;
    // var_runtime holds the running sum of squared deviations (M2);
    // divide by n once exposed, matching the mean-of-squares semantics
    // a caller reading `var-runtime` expects.
    job.var_runtime = if job.nbr_runs == 0 {
        0.0
    } else {
        (job.var_runtime * (job.nbr_runs as f64) + delta * delta2) / n
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with(jobs: HashMap<String, Job>, dir: &tempfile::TempDir) -> Catalog {
        Catalog::from_jobs(jobs, dir.path().join("kiwibes.json"))
    }

    #[tokio::test]
    async fn create_then_details_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog_with(HashMap::new(), &dir);
        cat.create("j1".into(), vec!["/bin/true".into()], "".into(), 0)
            .await
            .unwrap();
        let d = cat.details("j1").await.unwrap();
        assert_eq!(d.program, vec!["/bin/true".to_string()]);
        assert_eq!(d.status, JobStatus::Stopped);
    }

    #[tokio::test]
    async fn create_duplicate_name_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog_with(HashMap::new(), &dir);
        cat.create("j1".into(), vec!["/bin/true".into()], "".into(), 0)
            .await
            .unwrap();
        let err = cat
            .create("j1".into(), vec!["/bin/true".into()], "".into(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::JobNameTaken(_)));
    }

    #[tokio::test]
    async fn create_rejects_malformed_name() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog_with(HashMap::new(), &dir);
        let err = cat
            .create("has space".into(), vec!["/bin/true".into()], "".into(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::JobDescriptionInvalid));
    }

    #[tokio::test]
    async fn create_rejects_invalid_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog_with(HashMap::new(), &dir);
        let err = cat
            .create(
                "j1".into(),
                vec!["/bin/true".into()],
                "* * ? 34".into(),
                0,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::JobScheduleInvalid));
        assert!(cat.details("j1").await.is_err());
    }

    #[tokio::test]
    async fn edit_while_running_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog_with(HashMap::new(), &dir);
        cat.create("j1".into(), vec!["/bin/true".into()], "".into(), 0)
            .await
            .unwrap();
        cat.try_begin_start("j1").await.unwrap();
        let err = cat
            .edit("j1", vec!["/bin/false".into()], "".into(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::JobIsRunning(_)));
    }

    #[tokio::test]
    async fn second_concurrent_start_queues() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog_with(HashMap::new(), &dir);
        cat.create("j1".into(), vec!["/bin/true".into()], "".into(), 0)
            .await
            .unwrap();

        let first = cat.try_begin_start("j1").await.unwrap();
        assert!(matches!(first, BeginStart::ShouldSpawn { .. }));

        let second = cat.try_begin_start("j1").await.unwrap();
        assert!(matches!(second, BeginStart::Queued));
        assert_eq!(cat.details("j1").await.unwrap().pending_start, 1);
    }

    #[tokio::test]
    async fn finish_run_decrements_pending_and_reports_restart() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog_with(HashMap::new(), &dir);
        cat.create("j1".into(), vec!["/bin/true".into()], "".into(), 0)
            .await
            .unwrap();
        cat.try_begin_start("j1").await.unwrap();
        cat.try_begin_start("j1").await.unwrap(); // pending = 1

        let should_restart = cat.finish_run("j1", 1.0).await;
        assert!(should_restart);
        let d = cat.details("j1").await.unwrap();
        assert_eq!(d.pending_start, 0);
        assert_eq!(d.nbr_runs, 1);
        assert_eq!(d.status, JobStatus::Stopped);
    }

    #[tokio::test]
    async fn clear_pending_zeroes_without_restart() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog_with(HashMap::new(), &dir);
        cat.create("j1".into(), vec!["/bin/true".into()], "".into(), 0)
            .await
            .unwrap();
        cat.try_begin_start("j1").await.unwrap();
        cat.try_begin_start("j1").await.unwrap();
        cat.clear_pending("j1").await.unwrap();
        assert_eq!(cat.details("j1").await.unwrap().pending_start, 0);

        let should_restart = cat.finish_run("j1", 1.0).await;
        assert!(!should_restart);
    }

    #[tokio::test]
    async fn welford_moments_match_manual_computation() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog_with(HashMap::new(), &dir);
        cat.create("j1".into(), vec!["/bin/true".into()], "".into(), 0)
            .await
            .unwrap();

        let durations = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        for d in durations {
            cat.try_begin_start("j1").await.unwrap();
            cat.finish_run("j1", d).await;
        }

        let job = cat.details("j1").await.unwrap();
        let n = durations.len() as f64;
        let mean = durations.iter().sum::<f64>() / n;
        let var = durations.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;

        assert_eq!(job.nbr_runs, durations.len() as u64);
        assert!((job.avg_runtime - mean).abs() < 1e-9);
        assert!((job.var_runtime - var).abs() < 1e-9);
    }

    #[tokio::test]
    async fn scheduled_filters_on_nonempty_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let cat = catalog_with(HashMap::new(), &dir);
        cat.create("scheduled".into(), vec!["/bin/true".into()], "0 0 * * * *".into(), 0)
            .await
            .unwrap();
        cat.create("adhoc".into(), vec!["/bin/true".into()], "".into(), 0)
            .await
            .unwrap();

        let scheduled = cat.scheduled().await;
        assert_eq!(scheduled, vec!["scheduled".to_string()]);
    }
}

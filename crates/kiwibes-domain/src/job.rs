//! The catalog's unit of work: a named program invocation plus schedule,
//! limits, and running statistics (invariants J1-J7 in SPEC_FULL §3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Stopped,
    Running,
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Stopped
    }
}

/// Full job record as held by the Catalog and round-tripped through
/// `kiwibes.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub program: Vec<String>,
    pub schedule: String,
    #[serde(rename = "max-runtime")]
    pub max_runtime: u64,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(rename = "start-time", default)]
    pub start_time: u64,
    #[serde(rename = "nbr-runs", default)]
    pub nbr_runs: u64,
    #[serde(rename = "avg-runtime", default)]
    pub avg_runtime: f64,
    #[serde(rename = "var-runtime", default)]
    pub var_runtime: f64,
    #[serde(rename = "pending-start", default)]
    pub pending_start: u64,
}

impl Job {
    /// Build a freshly-created job: definition fields from the request,
    /// every runtime-statistics field zeroed (§4.2 `create` contract).
    pub fn new(program: Vec<String>, schedule: String, max_runtime: u64) -> Self {
        Job {
            program,
            schedule,
            max_runtime,
            status: JobStatus::Stopped,
            start_time: 0,
            nbr_runs: 0,
            avg_runtime: 0.0,
            var_runtime: 0.0,
            pending_start: 0,
        }
    }

    /// `true` when this job schema is well-formed in isolation: a
    /// non-empty program, a schedule that at least looks like a string
    /// (field-level cron validity is CronMatcher's job). Name format
    /// (non-empty, no whitespace, no `/`) is validated by the caller
    /// since the name is not part of this struct.
    pub fn is_well_formed(&self) -> bool {
        !self.program.is_empty() && self.program[0].len() > 0
    }

    /// Overwrite only the definition fields (`program`, `schedule`,
    /// `max-runtime`), preserving statistics — the `edit` contract.
    pub fn apply_edit(&mut self, program: Vec<String>, schedule: String, max_runtime: u64) {
        self.program = program;
        self.schedule = schedule;
        self.max_runtime = max_runtime;
    }

    /// Returns a clone with `status` forced to `stopped` and
    /// `start-time` forced to 0, for persistence (§4.2, §6).
    pub fn normalized_for_persistence(&self) -> Job {
        let mut j = self.clone();
        j.status = JobStatus::Stopped;
        j.start_time = 0;
        j
    }
}

/// Validate a job name per §3: non-empty, printable, no whitespace, no `/`.
pub fn is_valid_job_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_graphic() && c != '/' && !c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_zeroes_statistics() {
        let j = Job::new(vec!["/bin/true".into()], "".into(), 0);
        assert_eq!(j.nbr_runs, 0);
        assert_eq!(j.pending_start, 0);
        assert_eq!(j.status, JobStatus::Stopped);
    }

    #[test]
    fn apply_edit_preserves_statistics() {
        let mut j = Job::new(vec!["/bin/true".into()], "".into(), 0);
        j.nbr_runs = 3;
        j.avg_runtime = 1.5;
        j.apply_edit(vec!["/bin/false".into()], "* * * * * *".into(), 5);
        assert_eq!(j.program, vec!["/bin/false".to_string()]);
        assert_eq!(j.nbr_runs, 3);
        assert_eq!(j.avg_runtime, 1.5);
    }

    #[test]
    fn normalized_for_persistence_forces_stopped() {
        let mut j = Job::new(vec!["/bin/true".into()], "".into(), 0);
        j.status = JobStatus::Running;
        j.start_time = 1234;
        let n = j.normalized_for_persistence();
        assert_eq!(n.status, JobStatus::Stopped);
        assert_eq!(n.start_time, 0);
        // original untouched
        assert_eq!(j.status, JobStatus::Running);
    }

    #[test]
    fn job_name_validation() {
        assert!(is_valid_job_name("hello_world"));
        assert!(is_valid_job_name("job-1"));
        assert!(!is_valid_job_name(""));
        assert!(!is_valid_job_name("has space"));
        assert!(!is_valid_job_name("has/slash"));
    }

    #[test]
    fn well_formed_requires_nonempty_program() {
        let j = Job::new(vec![], "".into(), 0);
        assert!(!j.is_well_formed());
        let j2 = Job::new(vec!["/bin/true".into()], "".into(), 0);
        assert!(j2.is_well_formed());
    }
}

//! Atomic load/save of the catalog, auth tokens and data store
//! (SPEC_FULL §4.1).
//!
//! Every save follows the same sequence: serialize to a temporary file
//! in the same directory as the target, `fsync`, then `rename` over the
//! target. The rename is the only step that is observable to a
//! concurrent reader, so a reader never sees a half-written file.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use kiwibes_domain::Job;
use serde::{de::DeserializeOwned, Serialize};

/// Failures that can occur while loading the catalog at boot. These map
/// 1:1 onto exit codes but are kept separate from `BootError` since one
/// variant (`JobDescriptionInvalid`) shares its numeric code with a
/// post-boot REST error rather than the `ERROR_CMDLINE_*`/`ERROR_NO_*`
/// family.
#[derive(Debug)]
pub enum CatalogLoadError {
    NoDatabaseFile,
    JsonParseFail(String),
    JobDescriptionInvalid(String),
}

impl CatalogLoadError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CatalogLoadError::NoDatabaseFile => 6,
            CatalogLoadError::JsonParseFail(_) => 7,
            CatalogLoadError::JobDescriptionInvalid(_) => 11,
        }
    }
}

/// Write `value` to `path` atomically: serialize to a sibling temp
/// file, fsync, rename over `path`.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = tmp_path_for(path);

    {
        let mut f = File::create(&tmp_path)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;

    // fsync the directory entry too, so the rename itself is durable.
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| format!("{}.tmp", n.to_string_lossy()))
        .unwrap_or_else(|| "kiwibes.tmp".to_string());
    path.with_file_name(file_name)
}

/// Load the catalog from `kiwibes.json`. Missing file, a JSON syntax
/// error, and a schema violation in any job record are each reported as
/// a distinct error per SPEC_FULL §4.1.
pub fn load_catalog(path: &Path) -> Result<HashMap<String, Job>, CatalogLoadError> {
    if !path.is_file() {
        return Err(CatalogLoadError::NoDatabaseFile);
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| CatalogLoadError::JsonParseFail(e.to_string()))?;

    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| CatalogLoadError::JsonParseFail(e.to_string()))?;

    if value.is_null() {
        return Ok(HashMap::new());
    }

    let map = value
        .as_object()
        .ok_or_else(|| CatalogLoadError::JobDescriptionInvalid("catalog is not an object".into()))?;

    let mut jobs = HashMap::with_capacity(map.len());
    for (name, record) in map {
        let job: Job = serde_json::from_value(record.clone())
            .map_err(|e| CatalogLoadError::JobDescriptionInvalid(format!("{name}: {e}")))?;
        if !job.is_well_formed() {
            return Err(CatalogLoadError::JobDescriptionInvalid(format!(
                "{name}: empty program"
            )));
        }
        jobs.insert(name.clone(), job.normalized_for_persistence());
    }
    Ok(jobs)
}

/// Persist the catalog: `null` when empty, otherwise the name->record
/// map with every job's live status normalized to `stopped` (§4.2, §6).
pub fn save_catalog(path: &Path, jobs: &HashMap<String, Job>) -> std::io::Result<()> {
    if jobs.is_empty() {
        return atomic_write_json(path, &serde_json::Value::Null);
    }
    let normalized: HashMap<&String, Job> = jobs
        .iter()
        .map(|(k, v)| (k, v.normalized_for_persistence()))
        .collect();
    atomic_write_json(path, &normalized)
}

/// Load a generic JSON-backed file, treating a missing file or a `null`
/// document as the type's default. Used for the auth token list and the
/// data store, which (unlike the catalog) are allowed to simply not
/// exist yet at boot.
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let Ok(text) = std::fs::read_to_string(path) else {
        return T::default();
    };
    serde_json::from_str(&text).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiwibes_domain::JobStatus;

    #[test]
    fn missing_catalog_is_no_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_catalog(&dir.path().join("kiwibes.json")).unwrap_err();
        assert!(matches!(err, CatalogLoadError::NoDatabaseFile));
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn syntax_error_is_json_parse_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiwibes.json");
        std::fs::write(&path, "{not valid json").unwrap();
        let err = load_catalog(&path).unwrap_err();
        assert!(matches!(err, CatalogLoadError::JsonParseFail(_)));
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn incomplete_job_is_description_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiwibes.json");
        std::fs::write(&path, r#"{"job1": {"schedule": ""}}"#).unwrap();
        let err = load_catalog(&path).unwrap_err();
        assert!(matches!(err, CatalogLoadError::JobDescriptionInvalid(_)));
        assert_eq!(err.exit_code(), 11);
    }

    #[test]
    fn null_catalog_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiwibes.json");
        std::fs::write(&path, "null").unwrap();
        let jobs = load_catalog(&path).unwrap();
        assert!(jobs.is_empty());
    }

    #[test]
    fn save_then_load_round_trips_with_stopped_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiwibes.json");
        let mut jobs = HashMap::new();
        let mut j = Job::new(vec!["/bin/true".into()], "".into(), 0);
        j.status = JobStatus::Running;
        j.start_time = 999;
        jobs.insert("job1".to_string(), j);

        save_catalog(&path, &jobs).unwrap();
        let loaded = load_catalog(&path).unwrap();
        assert_eq!(loaded["job1"].status, JobStatus::Stopped);
        assert_eq!(loaded["job1"].start_time, 0);
    }

    #[test]
    fn save_empty_catalog_writes_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiwibes.json");
        save_catalog(&path, &HashMap::new()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim(), "null");
    }

    #[test]
    fn load_or_default_handles_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let tokens: Vec<String> = load_or_default(&dir.path().join("kiwibes.auth"));
        assert!(tokens.is_empty());
    }
}

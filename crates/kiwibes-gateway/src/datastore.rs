//! Byte-capped string->string key/value store, persisted on every
//! mutation (SPEC_FULL §4.4).

use std::collections::HashMap;
use std::path::PathBuf;

use kiwibes_domain::Error;
use tokio::sync::RwLock;

use crate::persistence;

pub struct DataStore {
    entries: RwLock<HashMap<String, String>>,
    cap_bytes: usize,
    path: PathBuf,
}

fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

fn total_size(entries: &HashMap<String, String>) -> usize {
    entries.iter().map(|(k, v)| entry_size(k, v)).sum()
}

impl DataStore {
    pub fn new(entries: HashMap<String, String>, cap_bytes: usize, path: PathBuf) -> Self {
        DataStore { entries: RwLock::new(entries), cap_bytes, path }
    }

    async fn persist(&self) {
        let snapshot = self.entries.read().await.clone();
        let path = self.path.clone();
        let result =
            tokio::task::spawn_blocking(move || persistence::atomic_write_json(&path, &snapshot))
                .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to persist data store"),
            Err(e) => tracing::warn!(error = %e, "data store persist task panicked"),
        }
    }

    /// Force a persist of the current in-memory state; see
    /// `Catalog::flush` for why this exists alongside per-mutation persist.
    pub async fn flush(&self) {
        self.persist().await;
    }

    pub async fn write(&self, key: String, value: String) -> Result<(), Error> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&key) {
            return Err(Error::DataKeyTaken(key));
        }
        let projected = total_size(&entries) + entry_size(&key, &value);
        if projected > self.cap_bytes {
            return Err(Error::DataStoreFull);
        }
        entries.insert(key, value);
        drop(entries);
        self.persist().await;
        Ok(())
    }

    pub async fn read(&self, key: &str) -> Result<String, Error> {
        self.entries
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| Error::DataKeyUnknown(key.to_string()))
    }

    pub async fn clear(&self, key: &str) -> Result<(), Error> {
        let mut entries = self.entries.write().await;
        if entries.remove(key).is_none() {
            return Err(Error::DataKeyUnknown(key.to_string()));
        }
        drop(entries);
        self.persist().await;
        Ok(())
    }

    /// Removes everything, returns the count removed.
    pub async fn clear_all(&self) -> usize {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        drop(entries);
        self.persist().await;
        count
    }

    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(cap_bytes: usize, dir: &tempfile::TempDir) -> DataStore {
        DataStore::new(HashMap::new(), cap_bytes, dir.path().join("kiwibes.data"))
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let ds = store(1024, &dir);
        ds.write("k".into(), "v".into()).await.unwrap();
        assert_eq!(ds.read("k").await.unwrap(), "v");
    }

    #[tokio::test]
    async fn write_existing_key_is_taken() {
        let dir = tempfile::tempdir().unwrap();
        let ds = store(1024, &dir);
        ds.write("k".into(), "v".into()).await.unwrap();
        let err = ds.write("k".into(), "v2".into()).await.unwrap_err();
        assert!(matches!(err, Error::DataKeyTaken(_)));
    }

    #[tokio::test]
    async fn clear_then_read_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let ds = store(1024, &dir);
        ds.write("k".into(), "v".into()).await.unwrap();
        ds.clear("k").await.unwrap();
        let err = ds.read("k").await.unwrap_err();
        assert!(matches!(err, Error::DataKeyUnknown(_)));
    }

    #[tokio::test]
    async fn clear_unknown_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ds = store(1024, &dir);
        let err = ds.clear("nope").await.unwrap_err();
        assert!(matches!(err, Error::DataKeyUnknown(_)));
    }

    #[tokio::test]
    async fn write_past_cap_is_rejected_prior_writes_kept() {
        let dir = tempfile::tempdir().unwrap();
        let ds = store(16, &dir); // tiny cap
        ds.write("a".into(), "1234567".into()).await.unwrap(); // 1 + 7 = 8 bytes
        let err = ds.write("b".into(), "1234567890".into()).await.unwrap_err(); // 1+10=11 -> total 19 > 16
        assert!(matches!(err, Error::DataStoreFull));
        // prior write is untouched
        assert_eq!(ds.read("a").await.unwrap(), "1234567");
    }

    #[tokio::test]
    async fn clear_all_reports_count_and_empties() {
        let dir = tempfile::tempdir().unwrap();
        let ds = store(1024, &dir);
        ds.write("a".into(), "1".into()).await.unwrap();
        ds.write("b".into(), "2".into()).await.unwrap();
        let count = ds.clear_all().await;
        assert_eq!(count, 2);
        assert!(ds.keys().await.is_empty());
    }
}

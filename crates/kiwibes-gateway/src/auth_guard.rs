//! Authentication token cache, reloaded from `kiwibes.auth` on a poll
//! interval rather than a filesystem watch (SPEC_FULL §4.7).
//!
//! Unlike a single pre-shared secret known at startup, Kiwibes accepts
//! any token out of a *set* read from disk, and that set can change
//! while the server runs — an operator rotates `kiwibes.auth` and the
//! change takes effect within one poll interval, no restart needed.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use subtle::ConstantTimeEq;

use crate::persistence;

pub struct AuthGuard {
    path: PathBuf,
    tokens: RwLock<Arc<HashSet<String>>>,
    last_mtime: RwLock<Option<SystemTime>>,
}

fn mtime_of(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}

impl AuthGuard {
    /// Load the initial token set from `path`. A missing file means "no
    /// tokens accepted yet", not a boot failure.
    pub fn new(path: PathBuf) -> Self {
        let tokens: Vec<String> = persistence::load_or_default(&path);
        let last_mtime = mtime_of(&path);
        AuthGuard {
            path,
            tokens: RwLock::new(Arc::new(tokens.into_iter().collect())),
            last_mtime: RwLock::new(last_mtime),
        }
    }

    /// `true` iff `candidate` is a member of the current token set,
    /// compared in constant time so a timing side-channel can't be used
    /// to learn a valid token one byte at a time.
    pub fn validate(&self, candidate: &str) -> bool {
        let tokens = self.tokens.read().clone();
        tokens.iter().any(|known| {
            known.as_bytes().len() == candidate.as_bytes().len()
                && bool::from(known.as_bytes().ct_eq(candidate.as_bytes()))
        })
    }

    fn reload_if_changed(&self) {
        let current = mtime_of(&self.path);
        let changed = {
            let last = self.last_mtime.read();
            *last != current
        };
        if !changed {
            return;
        }
        let tokens: Vec<String> = persistence::load_or_default(&self.path);
        *self.tokens.write() = Arc::new(tokens.into_iter().collect());
        *self.last_mtime.write() = current;
        tracing::info!("reloaded auth tokens");
    }

    /// Background poll task: never returns under normal operation.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(crate::config::defaults::AUTH_POLL_INTERVAL);
        loop {
            interval.tick().await;
            self.reload_if_changed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_auth_file_accepts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let guard = AuthGuard::new(dir.path().join("kiwibes.auth"));
        assert!(!guard.validate("anything"));
    }

    #[test]
    fn known_token_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiwibes.auth");
        std::fs::write(&path, r#"["secret-token"]"#).unwrap();
        let guard = AuthGuard::new(path);
        assert!(guard.validate("secret-token"));
        assert!(!guard.validate("wrong-token"));
    }

    #[test]
    fn reload_picks_up_rotated_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiwibes.auth");
        std::fs::write(&path, r#"["old-token"]"#).unwrap();
        let guard = AuthGuard::new(path.clone());
        assert!(guard.validate("old-token"));

        // ensure the mtime actually advances on filesystems with coarse
        // timestamp resolution.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        std::fs::write(&path, r#"["new-token"]"#).unwrap();
        guard.reload_if_changed();

        assert!(!guard.validate("old-token"));
        assert!(guard.validate("new-token"));
    }
}

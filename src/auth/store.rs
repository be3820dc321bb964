//! File-backed credential store.
//!
//! The backing file is a JSON object mapping username to password. Every
//! operation re-reads the file inside the store lock, so a read-check-insert-
//! write sequence in `register` is atomic with respect to every other caller.

use crate::snapshot::{self, SnapshotError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

type Credentials = BTreeMap<String, String>;

/// Why a registration was refused.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("user '{0}' already exists")]
    AlreadyExists(String),
    #[error(transparent)]
    Storage(#[from] SnapshotError),
}

/// Durable username → password mapping.
pub struct CredentialStore {
    path: PathBuf,
    /// Last snapshot that was successfully read from or written to disk.
    users: Mutex<Credentials>,
}

impl CredentialStore {
    /// Open the store at `path`. A missing or corrupt file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let path = path.into();
        snapshot::ensure_parent(&path)?;
        let users = snapshot::load_or_default(&path, "credentials");

        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a new user and persist the store before returning.
    pub fn register(&self, username: &str, password: &str) -> Result<(), RegisterError> {
        let mut users = self.users.lock();
        self.refresh(&mut users);

        if users.contains_key(username) {
            return Err(RegisterError::AlreadyExists(username.to_string()));
        }

        let mut next = users.clone();
        next.insert(username.to_string(), password.to_string());
        snapshot::write(&self.path, &next)?;
        *users = next;

        tracing::info!(user = username, total = users.len(), "User registered");
        Ok(())
    }

    /// True iff `username` exists and its stored password equals `password`.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let mut users = self.users.lock();
        self.refresh(&mut users);

        users
            .get(username)
            .is_some_and(|stored| constant_time_eq(stored.as_bytes(), password.as_bytes()))
    }

    /// Number of registered users.
    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick up the current on-disk state. A missing or unreadable file keeps
    /// the last good snapshot so a damaged file can't erase known users.
    fn refresh(&self, users: &mut Credentials) {
        match snapshot::load::<Credentials>(&self.path) {
            Ok(Some(on_disk)) => *users = on_disk,
            Ok(None) => {
                if !users.is_empty() {
                    tracing::warn!(
                        path = %self.path.display(),
                        "Credential file disappeared; keeping in-memory snapshot"
                    );
                }
            }
            Err(e) => {
                tracing::warn!("Credential file unreadable, keeping in-memory snapshot: {e}");
            }
        }
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, CredentialStore) {
        let tmp = TempDir::new().unwrap();
        let store = CredentialStore::open(tmp.path().join("auth_data")).unwrap();
        (tmp, store)
    }

    #[test]
    fn register_and_verify() {
        let (_tmp, store) = test_store();

        store.register("alice", "secret").unwrap();
        assert!(store.verify("alice", "secret"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn register_duplicate_username_fails() {
        let (_tmp, store) = test_store();

        store.register("alice", "secret").unwrap();
        let result = store.register("alice", "another");
        assert!(matches!(result, Err(RegisterError::AlreadyExists(ref name)) if name == "alice"));

        // The original password is untouched.
        assert!(store.verify("alice", "secret"));
        assert!(!store.verify("alice", "another"));
    }

    #[test]
    fn usernames_are_case_sensitive() {
        let (_tmp, store) = test_store();

        store.register("Alice", "one").unwrap();
        store.register("alice", "two").unwrap();
        assert!(store.verify("Alice", "one"));
        assert!(store.verify("alice", "two"));
    }

    #[test]
    fn verify_wrong_password_fails() {
        let (_tmp, store) = test_store();

        store.register("alice", "secret").unwrap();
        assert!(!store.verify("alice", "Secret"));
        assert!(!store.verify("alice", ""));
    }

    #[test]
    fn verify_unknown_user_fails() {
        let (_tmp, store) = test_store();
        assert!(!store.verify("ghost", "anything"));
    }

    #[test]
    fn registrations_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("auth_data");

        {
            let store = CredentialStore::open(&path).unwrap();
            store.register("alice", "secret").unwrap();
            store.register("bob", "hunter2").unwrap();
        }

        let reopened = CredentialStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert!(reopened.verify("bob", "hunter2"));
    }

    #[test]
    fn file_is_a_plain_json_object() {
        let (_tmp, store) = test_store();
        store.register("alice", "secret").unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, serde_json::json!({ "alice": "secret" }));
    }

    #[test]
    fn corrupt_file_on_open_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("auth_data");
        std::fs::write(&path, "garbage").unwrap();

        let store = CredentialStore::open(&path).unwrap();
        assert!(store.is_empty());
        store.register("alice", "secret").unwrap();
        assert!(store.verify("alice", "secret"));
    }

    #[test]
    fn external_edits_are_observed() {
        let (_tmp, store) = test_store();
        store.register("alice", "secret").unwrap();

        std::fs::write(store.path(), r#"{"alice":"secret","carol":"pw"}"#).unwrap();
        assert!(store.verify("carol", "pw"));
        assert!(matches!(
            store.register("carol", "x"),
            Err(RegisterError::AlreadyExists(_))
        ));
    }

    #[test]
    fn corruption_after_start_keeps_known_users() {
        let (_tmp, store) = test_store();
        store.register("alice", "secret").unwrap();

        std::fs::write(store.path(), "{broken").unwrap();
        assert!(store.verify("alice", "secret"));

        store.register("bob", "pw").unwrap();
        let reopened = CredentialStore::open(store.path()).unwrap();
        assert!(reopened.verify("alice", "secret"));
        assert!(reopened.verify("bob", "pw"));
    }

    #[test]
    fn concurrent_registration_of_same_name_has_one_winner() {
        let (_tmp, store) = test_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.register("contested", &format!("pw{i}")).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}

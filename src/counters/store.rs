//! File-backed per-user counters.
//!
//! Counters live in a map keyed by `"<owner>/<label>"` and are snapshotted to
//! a single JSON file. Writers are serialized by `writer`; the published map
//! in `entries` is only swapped after the new snapshot is on disk, so readers
//! never block on I/O and never observe state that was not persisted.

use crate::snapshot::{self, SnapshotError};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

type Counters = BTreeMap<String, i64>;

/// Separator between the (escaped) owner and the label in a storage key.
const KEY_SEPARATOR: char = '/';

/// Why an accumulate call left the counter unchanged.
#[derive(Debug, thiserror::Error)]
pub enum AccumulateError {
    #[error("counter {label:?} would overflow: {current} + {delta}")]
    Overflow {
        label: String,
        current: i64,
        delta: i64,
    },
    #[error(transparent)]
    Storage(#[from] SnapshotError),
}

/// Durable (owner, label) → integer accumulator.
pub struct CounterStore {
    path: PathBuf,
    entries: RwLock<Counters>,
    writer: Mutex<()>,
}

impl CounterStore {
    /// Open the store at `path`. A missing or corrupt file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let path = path.into();
        snapshot::ensure_parent(&path)?;
        let entries = snapshot::load_or_default(&path, "counters");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current value of `owner`'s counter `label`, if it was ever set.
    pub fn get(&self, owner: &str, label: &str) -> Option<i64> {
        self.entries.read().get(&storage_key(owner, label)).copied()
    }

    /// Add `delta` to `owner`'s counter `label` (starting from 0), persist,
    /// and return the new value.
    pub fn accumulate(&self, owner: &str, label: &str, delta: i64) -> Result<i64, AccumulateError> {
        let _writer = self.writer.lock();
        let key = storage_key(owner, label);

        let mut next = self.entries.read().clone();
        let current = next.get(&key).copied().unwrap_or(0);
        let updated = current
            .checked_add(delta)
            .ok_or_else(|| AccumulateError::Overflow {
                label: label.to_string(),
                current,
                delta,
            })?;
        next.insert(key, updated);

        snapshot::write(&self.path, &next)?;
        *self.entries.write() = next;

        Ok(updated)
    }

    /// Number of stored counters across all owners.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the storage key for `(owner, label)`.
///
/// The owner is percent-escaped for `%` and `/` so the first separator in a
/// key always ends the owner; labels are stored verbatim.
fn storage_key(owner: &str, label: &str) -> String {
    let mut key = String::with_capacity(owner.len() + label.len() + 1);
    for ch in owner.chars() {
        match ch {
            '%' => key.push_str("%25"),
            KEY_SEPARATOR => key.push_str("%2F"),
            other => key.push(other),
        }
    }
    key.push(KEY_SEPARATOR);
    key.push_str(label);
    key
}

// ── Tests ───────────────────────────────────────────────────────────

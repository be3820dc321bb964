//! Whole-file JSON snapshots.
//!
//! Both stores keep their full contents in memory and rewrite the backing
//! file from scratch on every mutation. Writes go through a temporary file in
//! the same directory followed by a rename, so the target path always holds
//! either the previous snapshot or the new one, never a torn write.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Failure to read or replace a snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot {} is not valid JSON for this store: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SnapshotError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read a snapshot. `Ok(None)` means the file does not exist.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SnapshotError> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SnapshotError::io(path, e)),
    };

    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|source| SnapshotError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Load a snapshot for store start-up: a missing or unreadable file yields
/// `T::default()`. Corruption is logged, never propagated.
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path, store: &str) -> T {
    match load(path) {
        Ok(Some(value)) => value,
        Ok(None) => {
            tracing::info!(store, path = %path.display(), "No snapshot on disk, starting empty");
            T::default()
        }
        Err(e) => {
            tracing::warn!(store, "Unusable snapshot, starting empty: {e}");
            T::default()
        }
    }
}

/// Atomically replace the snapshot at `path` with `value`.
pub fn write<T: Serialize>(path: &Path, value: &T) -> Result<(), SnapshotError> {
    let dir = parent_dir(path);
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| SnapshotError::io(dir, e))?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer(&mut writer, value)?;
        writer.flush().map_err(|e| SnapshotError::io(path, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| SnapshotError::io(path, e))?;

    tmp.persist(path)
        .map_err(|e| SnapshotError::io(path, e.error))?;
    Ok(())
}

/// Make sure the directory holding `path` exists.
pub fn ensure_parent(path: &Path) -> Result<(), SnapshotError> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir).map_err(|e| SnapshotError::io(dir, e))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

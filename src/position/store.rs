// SPDX-License-Identifier: Apache-2.0

//! Durable store mapping file identities to committed read offsets.
//!
//! The in-memory map holds one atomic slot per identity so the hot path
//! (advancing an offset after records are consumed) takes only a read
//! lock and a fetch-add. Flushes snapshot the map and write the state
//! file atomically via a uniquely named temp file and rename, so a crash
//! mid-flush leaves the previous state intact.

use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use portable_atomic::AtomicU64 as CounterU64;
use tracing::debug;

use crate::error::{Error, Result};
use crate::input::FileIdentity;
use crate::position::schema::{
    identity_key, PersistedEntry, PersistedState, POSITION_STATE_VERSION,
};

static TEMP_COUNTER: CounterU64 = CounterU64::new(0);

#[derive(Debug)]
struct Slot {
    offset: AtomicU64,
    path: RwLock<PathBuf>,
}

#[derive(Debug)]
pub struct PositionStore {
    backing: Option<PathBuf>,
    slots: RwLock<HashMap<FileIdentity, Arc<Slot>>>,
}

impl PositionStore {
    /// Open a store backed by `path`, loading any existing state.
    ///
    /// A missing or empty file yields an empty store. A file that exists
    /// but does not parse is reported as [`Error::Persistence`] rather
    /// than silently discarded.
    pub fn open(path: &Path) -> Result<Self> {
        let mut slots = HashMap::new();

        match fs::read(path) {
            Ok(data) if data.is_empty() => {}
            Ok(data) => {
                let state: PersistedState = serde_json::from_slice(&data).map_err(|e| {
                    Error::Persistence(format!(
                        "failed to parse position state {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                for entry in state.files.into_values() {
                    slots.insert(
                        FileIdentity::new(entry.dev, entry.ino),
                        Arc::new(Slot {
                            offset: AtomicU64::new(entry.offset),
                            path: RwLock::new(PathBuf::from(entry.path)),
                        }),
                    );
                }
                debug!(
                    path = %path.display(),
                    entries = slots.len(),
                    "loaded position state"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            backing: Some(path.to_path_buf()),
            slots: RwLock::new(slots),
        })
    }

    /// A store with no backing file. Flushes are no-ops.
    pub fn in_memory() -> Self {
        Self {
            backing: None,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.backing.as_deref()
    }

    pub fn offset(&self, id: FileIdentity) -> Option<u64> {
        self.slots
            .read()
            .unwrap()
            .get(&id)
            .map(|slot| slot.offset.load(Ordering::Acquire))
    }

    /// Register an identity at an absolute offset, recording the path it
    /// was last seen at. Used when a cursor is opened.
    pub fn track(&self, id: FileIdentity, path: &Path, offset: u64) {
        let mut slots = self.slots.write().unwrap();
        match slots.get(&id) {
            Some(slot) => {
                slot.offset.store(offset, Ordering::Release);
                *slot.path.write().unwrap() = path.to_path_buf();
            }
            None => {
                slots.insert(
                    id,
                    Arc::new(Slot {
                        offset: AtomicU64::new(offset),
                        path: RwLock::new(path.to_path_buf()),
                    }),
                );
            }
        }
    }

    /// Advance the identity's offset by `delta` bytes, returning the new
    /// value. The common path takes only the read lock.
    pub fn advance(&self, id: FileIdentity, delta: u64) -> u64 {
        if let Some(slot) = self.slots.read().unwrap().get(&id) {
            return slot.offset.fetch_add(delta, Ordering::AcqRel) + delta;
        }

        let mut slots = self.slots.write().unwrap();
        let slot = slots.entry(id).or_insert_with(|| {
            Arc::new(Slot {
                offset: AtomicU64::new(0),
                path: RwLock::new(PathBuf::new()),
            })
        });
        slot.offset.fetch_add(delta, Ordering::AcqRel) + delta
    }

    /// Reset the identity's offset to 0 (truncation recovery).
    pub fn reset(&self, id: FileIdentity) {
        if let Some(slot) = self.slots.read().unwrap().get(&id) {
            slot.offset.store(0, Ordering::Release);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().unwrap().is_empty()
    }

    /// Write the current state to the backing file atomically.
    pub fn flush(&self) -> Result<()> {
        let Some(backing) = &self.backing else {
            return Ok(());
        };

        let mut state = PersistedState {
            version: POSITION_STATE_VERSION,
            files: HashMap::new(),
        };
        {
            let slots = self.slots.read().unwrap();
            for (id, slot) in slots.iter() {
                state.files.insert(
                    identity_key(id.dev(), id.ino()),
                    PersistedEntry {
                        path: slot.path.read().unwrap().display().to_string(),
                        dev: id.dev(),
                        ino: id.ino(),
                        offset: slot.offset.load(Ordering::Acquire),
                    },
                );
            }
        }

        atomic_write(backing, &state)?;
        debug!(path = %backing.display(), entries = state.files.len(), "flushed position state");
        Ok(())
    }
}

/// Serialize `state` to a uniquely named temp file next to `path`, then
/// rename it into place. Rename on the same filesystem is atomic, so
/// readers always see either the old or the new complete state.
fn atomic_write(path: &Path, state: &PersistedState) -> Result<()> {
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let temp = path.with_extension(format!("tmp.{}.{}", std::process::id(), seq));

    let write = || -> Result<()> {
        let file = fs::File::create(&temp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, state)?;
        writer.flush()?;
        fs::rename(&temp, path)?;
        Ok(())
    };

    write().map_err(|e| {
        let _ = fs::remove_file(&temp);
        Error::Persistence(format!(
            "failed to write position state {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn id(n: u64) -> FileIdentity {
        FileIdentity::new(1, n)
    }

    #[test]
    fn test_open_missing_file_yields_empty_store() {
        let dir = tempdir().unwrap();
        let store = PositionStore::open(&dir.path().join("positions.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_open_corrupt_file_is_persistence_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.json");
        fs::write(&path, b"{not json").unwrap();

        let err = PositionStore::open(&path).unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[test]
    fn test_track_and_advance() {
        let store = PositionStore::in_memory();
        store.track(id(10), Path::new("/var/log/wtmp"), 384);
        assert_eq!(store.offset(id(10)), Some(384));

        assert_eq!(store.advance(id(10), 384), 768);
        assert_eq!(store.offset(id(10)), Some(768));
    }

    #[test]
    fn test_advance_inserts_unknown_identity() {
        let store = PositionStore::in_memory();
        assert_eq!(store.advance(id(7), 64), 64);
        assert_eq!(store.offset(id(7)), Some(64));
    }

    #[test]
    fn test_reset_zeroes_offset() {
        let store = PositionStore::in_memory();
        store.track(id(3), Path::new("/var/log/wtmp"), 1024);
        store.reset(id(3));
        assert_eq!(store.offset(id(3)), Some(0));
    }

    #[test]
    fn test_flush_and_reload_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.json");

        let store = PositionStore::open(&path).unwrap();
        store.track(id(20), Path::new("/var/log/wtmp"), 0);
        store.advance(id(20), 768);
        store.track(id(21), Path::new("/var/log/btmp"), 384);
        store.flush().unwrap();

        let reloaded = PositionStore::open(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.offset(id(20)), Some(768));
        assert_eq!(reloaded.offset(id(21)), Some(384));
    }

    #[test]
    fn test_in_memory_flush_is_noop() {
        let store = PositionStore::in_memory();
        store.advance(id(1), 128);
        store.flush().unwrap();
    }

    #[test]
    fn test_rotated_identity_survives_new_file_at_path() {
        let store = PositionStore::in_memory();
        let path = Path::new("/var/log/wtmp");
        store.track(id(40), path, 768);
        // New inode at the same path starts fresh; old entry untouched.
        store.track(id(41), path, 0);

        assert_eq!(store.offset(id(40)), Some(768));
        assert_eq!(store.offset(id(41)), Some(0));
        assert_eq!(store.len(), 2);
    }
}

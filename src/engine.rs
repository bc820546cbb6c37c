// SPDX-License-Identifier: Apache-2.0

//! Tail engine driving every tracked file.
//!
//! The engine is synchronous and tick-driven. Each tick services every
//! tracked path in turn: re-stat it to catch rotation, open a cursor if
//! needed, detect truncation, then drain complete blocks, decode them and
//! emit the records. Consumed bytes are committed to the position store
//! after the drain, and a rate-limited flush persists the store.
//!
//! Rotation is detected by identity: when the inode behind a path changes,
//! the old cursor is discarded and a fresh one is bound to the new file.
//! The old identity's stored offset is left in place so it can still be
//! resumed if the rotated file reappears under another tracked path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::{StartAt, TailConfig};
use crate::input::{FileCursor, FileIdentity, ReadOutcome};
use crate::layout::RecordLayout;
use crate::output::RecordOutput;
use crate::position::PositionStore;
use crate::record::DecodedRecord;

struct PathState {
    cursor: Option<FileCursor>,
    /// Whether this path has ever been successfully opened. The start
    /// policy applies only to first contact; reopens after rotation or
    /// disappearance always resume from the stored offset.
    seen: bool,
}

pub struct TailEngine {
    layout: Arc<RecordLayout>,
    block_size: usize,
    start_at: StartAt,
    flush_interval: Duration,
    host: String,
    positions: PositionStore,
    tracked: HashMap<PathBuf, PathState>,
    output: RecordOutput,
    last_flush: Instant,
    dirty: bool,
}

impl TailEngine {
    pub fn new(
        config: &TailConfig,
        layout: Arc<RecordLayout>,
        positions: PositionStore,
        output: RecordOutput,
        host: String,
    ) -> Self {
        let block_size = layout.total_size();
        Self {
            layout,
            block_size,
            start_at: config.start_at,
            flush_interval: config.flush_interval(),
            host,
            positions,
            tracked: HashMap::new(),
            output,
            last_flush: Instant::now(),
            dirty: false,
        }
    }

    /// Replace the tracked path set. Paths already tracked keep their
    /// cursor; removed paths are closed but their positions are retained.
    pub fn provide_paths(&mut self, paths: Vec<PathBuf>) {
        self.tracked.retain(|path, _| paths.contains(path));
        for path in paths {
            self.add_path(path);
        }
    }

    /// Start tracking `path`. Idempotent.
    pub fn add_path(&mut self, path: PathBuf) {
        self.tracked.entry(path).or_insert(PathState {
            cursor: None,
            seen: false,
        });
    }

    /// Stop tracking `path`. The stored position survives so re-adding
    /// the path resumes where it left off.
    pub fn remove_path(&mut self, path: &Path) {
        if self.tracked.remove(path).is_some() {
            debug!(path = %path.display(), "stopped tracking path");
        }
    }

    pub fn positions(&self) -> &PositionStore {
        &self.positions
    }

    /// Read granularity, equal to the layout's record size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Service every tracked path, then flush positions if due.
    pub fn tick(&mut self) {
        let paths: Vec<PathBuf> = self.tracked.keys().cloned().collect();
        for path in &paths {
            self.service_path(path);
        }
        self.maybe_flush();
    }

    /// Close all cursors and perform a final flush regardless of the
    /// flush interval.
    pub fn shutdown(mut self) {
        self.tracked.clear();
        if let Err(e) = self.positions.flush() {
            error!(error = %e, "final position flush failed");
        }
    }

    fn service_path(&mut self, path: &Path) {
        let Some(state) = self.tracked.get_mut(path) else {
            return;
        };

        // Catch rotation and disappearance before reading: the cursor
        // stays valid on the old inode, but the path no longer points
        // at it.
        let mut rebind = false;
        let mut disappeared = false;
        if let Some(cursor) = &state.cursor {
            match FileIdentity::from_path(path) {
                Ok(id) if id != cursor.identity() => {
                    info!(
                        path = %path.display(),
                        old = %cursor.identity(),
                        new = %id,
                        "file rotated, rebinding"
                    );
                    rebind = true;
                }
                Ok(_) => {}
                Err(_) => {
                    debug!(path = %path.display(), "file disappeared, closing cursor");
                    disappeared = true;
                }
            }
        }
        if rebind || disappeared {
            state.cursor = None;
        }
        if disappeared {
            return;
        }

        if state.cursor.is_none() {
            let mut cursor = match FileCursor::open(path, self.block_size) {
                Ok(cursor) => cursor,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "open failed, will retry");
                    return;
                }
            };
            let len = match cursor.file_len() {
                Ok(len) => len,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "stat failed, will retry");
                    return;
                }
            };
            let offset = match self.positions.offset(cursor.identity()) {
                // The file shrank while untracked; same treatment as a
                // live truncation.
                Some(stored) if stored > len => {
                    warn!(
                        path = %path.display(),
                        stored,
                        len,
                        "stored offset beyond file length, restarting from beginning"
                    );
                    self.positions.reset(cursor.identity());
                    self.dirty = true;
                    0
                }
                Some(stored) => stored,
                None if !state.seen && self.start_at == StartAt::End => len,
                None => 0,
            };
            cursor.seek_to(offset);
            self.positions.track(cursor.identity(), path, offset);
            debug!(
                path = %path.display(),
                identity = %cursor.identity(),
                offset,
                "opened cursor"
            );
            state.seen = true;
            state.cursor = Some(cursor);
        }

        let Some(mut cursor) = state.cursor.take() else {
            return;
        };

        match cursor.check_truncated() {
            Ok(true) => {
                warn!(path = %path.display(), "file truncated, restarting from beginning");
                self.positions.reset(cursor.identity());
                self.dirty = true;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "truncation check failed");
                return;
            }
        }

        let mut consumed: u64 = 0;
        let mut failed = false;
        loop {
            match cursor.read_block() {
                Ok(ReadOutcome::Block(block)) => {
                    match self.layout.decode(&block) {
                        Ok(fields) => {
                            self.output.emit(DecodedRecord::new(
                                fields,
                                path.to_path_buf(),
                                self.host.clone(),
                            ));
                        }
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "dropping undecodable record");
                        }
                    }
                    consumed += self.block_size as u64;
                }
                Ok(ReadOutcome::WouldBlock) | Ok(ReadOutcome::Eof) => break,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "read failed, closing cursor");
                    failed = true;
                    break;
                }
            }
        }

        if consumed > 0 {
            self.positions.advance(cursor.identity(), consumed);
            self.dirty = true;
        }
        if !failed {
            state.cursor = Some(cursor);
        }
    }

    fn maybe_flush(&mut self) {
        if !self.dirty || self.last_flush.elapsed() < self.flush_interval {
            return;
        }
        // Reset the timer on failure too so a broken backing file is
        // retried at the flush interval, not every tick.
        self.last_flush = Instant::now();
        match self.positions.flush() {
            Ok(()) => self.dirty = false,
            Err(e) => warn!(error = %e, "position flush failed, will retry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ByteOrder, FieldSpec};
    use crate::output::record_channel;
    use std::io::Write;
    use tempfile::tempdir;

    fn layout() -> Arc<RecordLayout> {
        Arc::new(
            RecordLayout::new(vec![
                FieldSpec::uint("seq", 4, ByteOrder::Little),
                FieldSpec::string("name", 4),
            ])
            .unwrap(),
        )
    }

    fn config(dir: &Path) -> TailConfig {
        let mut config = TailConfig::new(
            vec![
                FieldSpec::uint("seq", 4, ByteOrder::Little),
                FieldSpec::string("name", 4),
            ],
            dir.join("positions.json"),
        );
        config.start_at = StartAt::Beginning;
        config
    }

    fn write_record(path: &Path, seq: u32, name: &[u8; 4]) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(&seq.to_le_bytes()).unwrap();
        file.write_all(name).unwrap();
        file.flush().unwrap();
    }

    #[test]
    fn test_tick_emits_records_and_advances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.bin");
        write_record(&path, 1, b"aaaa");
        write_record(&path, 2, b"bbbb");

        let (output, receiver) = record_channel(16);
        let mut engine = TailEngine::new(
            &config(dir.path()),
            layout(),
            PositionStore::in_memory(),
            output,
            "testhost".to_string(),
        );
        engine.add_path(path.clone());
        engine.tick();

        let records = receiver.drain();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("seq").unwrap().as_u64(), Some(1));
        assert_eq!(records[1].get("seq").unwrap().as_u64(), Some(2));
        assert_eq!(records[0].host, "testhost");

        let id = FileIdentity::from_path(&path).unwrap();
        assert_eq!(engine.positions().offset(id), Some(16));
    }

    #[test]
    fn test_missing_file_is_retried() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.bin");

        let (output, receiver) = record_channel(16);
        let mut engine = TailEngine::new(
            &config(dir.path()),
            layout(),
            PositionStore::in_memory(),
            output,
            "testhost".to_string(),
        );
        engine.add_path(path.clone());

        engine.tick();
        assert!(receiver.is_empty());

        write_record(&path, 5, b"late");
        engine.tick();
        let records = receiver.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("seq").unwrap().as_u64(), Some(5));
    }

    #[test]
    fn test_start_at_end_skips_existing_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.bin");
        write_record(&path, 1, b"old1");
        write_record(&path, 2, b"old2");

        let mut cfg = config(dir.path());
        cfg.start_at = StartAt::End;

        let (output, receiver) = record_channel(16);
        let mut engine = TailEngine::new(
            &cfg,
            layout(),
            PositionStore::in_memory(),
            output,
            "testhost".to_string(),
        );
        engine.add_path(path.clone());

        engine.tick();
        assert!(receiver.is_empty());

        write_record(&path, 3, b"new1");
        engine.tick();
        let records = receiver.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("seq").unwrap().as_u64(), Some(3));
    }

    #[test]
    fn test_remove_path_keeps_position() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.bin");
        write_record(&path, 1, b"aaaa");

        let (output, receiver) = record_channel(16);
        let mut engine = TailEngine::new(
            &config(dir.path()),
            layout(),
            PositionStore::in_memory(),
            output,
            "testhost".to_string(),
        );
        engine.add_path(path.clone());
        engine.tick();
        assert_eq!(receiver.drain().len(), 1);

        engine.remove_path(&path);
        write_record(&path, 2, b"bbbb");
        engine.tick();
        assert!(receiver.is_empty());

        // Re-adding resumes from the stored offset, not the beginning.
        engine.add_path(path.clone());
        engine.tick();
        let records = receiver.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("seq").unwrap().as_u64(), Some(2));
    }
}

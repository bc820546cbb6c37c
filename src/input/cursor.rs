// SPDX-License-Identifier: Apache-2.0

//! Cursor over one binary record file.
//!
//! A cursor exclusively owns an open handle, the identity it was bound to
//! at open time, and the current read offset. Reads are positioned
//! ([`FileExt::read_at`]) so the handle carries no seek state, and they are
//! framed by a fixed block size: a read either yields a complete block or
//! reports that no complete block is currently available. A trailing
//! partial fragment is never surfaced and never advances the offset.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::input::FileIdentity;

/// Outcome of a block read attempt. `WouldBlock` and `Eof` are control
/// flow, not errors: they are the normal "caught up" signal.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete block of exactly the configured size. The cursor offset
    /// has already advanced past it.
    Block(Vec<u8>),
    /// The handle is non-blocking and no data is currently available.
    WouldBlock,
    /// Fewer than a full block remains at the current offset.
    Eof,
}

#[derive(Debug)]
pub struct FileCursor {
    path: PathBuf,
    identity: FileIdentity,
    file: File,
    offset: u64,
    block_size: usize,
}

impl FileCursor {
    /// Open the file at `path` non-blocking and bind to its identity.
    ///
    /// The cursor starts at offset 0; the caller seeks it to the stored or
    /// policy-derived position. Open failures are reported as
    /// [`Error::Open`] and are expected to be retried on a later tick.
    pub fn open(path: &Path, block_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| Error::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let identity = FileIdentity::from_file(&file)?;

        Ok(Self {
            path: path.to_path_buf(),
            identity,
            file,
            offset: 0,
            block_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The identity this cursor was bound to at open time. A differing
    /// identity at the same path on a later stat means rotation.
    pub fn identity(&self) -> FileIdentity {
        self.identity
    }

    /// Bytes already consumed from this file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Position the cursor at an absolute byte offset.
    pub fn seek_to(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Current size of the underlying file.
    pub fn file_len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Detect truncation: the file shrank below the consumed offset while
    /// keeping its identity. Resets the cursor to 0 and returns true.
    pub fn check_truncated(&mut self) -> Result<bool> {
        let len = self.file.metadata()?.len();
        if len < self.offset {
            self.offset = 0;
            return Ok(true);
        }
        Ok(false)
    }

    /// Attempt to read exactly one block at the current offset.
    ///
    /// On success the offset advances by exactly the block size. A short
    /// read leaves the offset untouched so the fragment is re-read once
    /// the writer completes it.
    pub fn read_block(&mut self) -> Result<ReadOutcome> {
        let mut block = vec![0u8; self.block_size];
        let mut filled = 0usize;

        while filled < self.block_size {
            match self
                .file
                .read_at(&mut block[filled..], self.offset + filled as u64)
            {
                Ok(0) => return Ok(ReadOutcome::Eof),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(if filled == 0 {
                        ReadOutcome::WouldBlock
                    } else {
                        ReadOutcome::Eof
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.offset += self.block_size as u64;
        Ok(ReadOutcome::Block(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BLOCK: usize = 8;

    fn write_blocks(file: &mut NamedTempFile, blocks: &[&[u8; BLOCK]]) {
        for b in blocks {
            file.write_all(*b).unwrap();
        }
        file.flush().unwrap();
    }

    #[test]
    fn test_reads_whole_blocks_in_order() {
        let mut file = NamedTempFile::new().unwrap();
        write_blocks(&mut file, &[b"AAAAAAAA", b"BBBBBBBB"]);

        let mut cursor = FileCursor::open(file.path(), BLOCK).unwrap();

        match cursor.read_block().unwrap() {
            ReadOutcome::Block(b) => assert_eq!(&b, b"AAAAAAAA"),
            other => panic!("expected block, got {:?}", other),
        }
        match cursor.read_block().unwrap() {
            ReadOutcome::Block(b) => assert_eq!(&b, b"BBBBBBBB"),
            other => panic!("expected block, got {:?}", other),
        }
        assert!(matches!(cursor.read_block().unwrap(), ReadOutcome::Eof));
        assert_eq!(cursor.offset(), 16);
    }

    #[test]
    fn test_partial_fragment_not_surfaced() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"AAAAAAAA").unwrap();
        file.write_all(b"frag").unwrap(); // 4 bytes, less than a block
        file.flush().unwrap();

        let mut cursor = FileCursor::open(file.path(), BLOCK).unwrap();

        assert!(matches!(
            cursor.read_block().unwrap(),
            ReadOutcome::Block(_)
        ));
        // Fragment stays unread and the offset points at its start.
        assert!(matches!(cursor.read_block().unwrap(), ReadOutcome::Eof));
        assert_eq!(cursor.offset(), BLOCK as u64);

        // Completing the fragment makes it readable as a whole block.
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(file.path())
            .unwrap();
        f.write_all(b"ment").unwrap();
        f.flush().unwrap();

        match cursor.read_block().unwrap() {
            ReadOutcome::Block(b) => assert_eq!(&b, b"fragment"),
            other => panic!("expected block, got {:?}", other),
        }
        assert_eq!(cursor.offset(), 16);
    }

    #[test]
    fn test_seek_to_resumes_mid_file() {
        let mut file = NamedTempFile::new().unwrap();
        write_blocks(&mut file, &[b"AAAAAAAA", b"BBBBBBBB", b"CCCCCCCC"]);

        let mut cursor = FileCursor::open(file.path(), BLOCK).unwrap();
        cursor.seek_to(16);

        match cursor.read_block().unwrap() {
            ReadOutcome::Block(b) => assert_eq!(&b, b"CCCCCCCC"),
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn test_truncation_detected_and_offset_reset() {
        let mut file = NamedTempFile::new().unwrap();
        write_blocks(&mut file, &[b"AAAAAAAA", b"BBBBBBBB"]);

        let mut cursor = FileCursor::open(file.path(), BLOCK).unwrap();
        cursor.read_block().unwrap();
        cursor.read_block().unwrap();
        assert_eq!(cursor.offset(), 16);

        let f = std::fs::OpenOptions::new()
            .write(true)
            .open(file.path())
            .unwrap();
        f.set_len(0).unwrap();

        assert!(cursor.check_truncated().unwrap());
        assert_eq!(cursor.offset(), 0);

        // Without truncation the check is a no-op.
        assert!(!cursor.check_truncated().unwrap());
    }

    #[test]
    fn test_open_missing_file_is_open_error() {
        let err = FileCursor::open(Path::new("/nonexistent/bintail-test"), BLOCK).unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
    }

    #[test]
    fn test_identity_bound_at_open() {
        let file = NamedTempFile::new().unwrap();
        let cursor = FileCursor::open(file.path(), BLOCK).unwrap();
        let id = FileIdentity::from_path(file.path()).unwrap();
        assert_eq!(cursor.identity(), id);
    }
}

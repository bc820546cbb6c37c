// SPDX-License-Identifier: Apache-2.0

//! Tailer for append-only files of fixed-size binary records.
//!
//! A [`RecordLayout`] describes how one record's bytes decode into named
//! fields. The [`TailEngine`] tracks a set of files, reads them one
//! record-sized block at a time, decodes each block and emits
//! [`DecodedRecord`]s over a bounded channel, while a [`PositionStore`]
//! durably remembers how far each file has been consumed so restarts
//! resume without re-emitting. Files are identified by device and inode
//! rather than path, so rotation and truncation are detected and handled
//! in place. [`BinaryTailReceiver`] wraps the engine for use inside a
//! tokio runtime.

pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod layout;
pub mod output;
pub mod position;
pub mod receiver;
pub mod record;

pub use config::{StartAt, TailConfig};
pub use engine::TailEngine;
pub use error::{Error, Result};
pub use input::{FileCursor, FileIdentity, ReadOutcome};
pub use layout::{ByteOrder, FieldKind, FieldSpec, RecordLayout};
pub use output::{record_channel, RecordOutput, RecordReceiver};
pub use position::PositionStore;
pub use receiver::{BinaryTailReceiver, DiscoverySender};
pub use record::{DecodedRecord, FieldValue};

// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A file could not be opened. Never fatal: the engine retries on the
    /// next discovery tick.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A block handed to the decoder did not match the layout's total
    /// record size. Indicates misconfiguration; the record is dropped.
    #[error("block size mismatch: layout expects {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// The declared record layout is inconsistent. Fatal at construction.
    #[error("invalid record layout: {0}")]
    InvalidLayout(String),

    /// Writing the position store failed. The in-memory mapping remains
    /// the source of truth; the flush is retried on the next interval.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("channel send error")]
    ChannelSend,

    #[error("task error: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, Error>;

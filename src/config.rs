// SPDX-License-Identifier: Apache-2.0

//! Tailer configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::layout::FieldSpec;

/// Where to start reading a file seen for the first time. Known files
/// always resume from their stored offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartAt {
    Beginning,
    #[default]
    End,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TailConfig {
    /// Field layout of one record, in on-disk order.
    pub fields: Vec<FieldSpec>,

    /// Backing file for the position state.
    pub position_path: PathBuf,

    /// Minimum seconds between position flushes.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Poll interval for the tail loop, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default)]
    pub start_at: StartAt,

    /// Host name attached to every record. Defaults to the local host
    /// name when unset.
    #[serde(default)]
    pub host: Option<String>,

    /// Capacity of the decoded record channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_flush_interval_secs() -> u64 {
    15
}

fn default_tick_interval_ms() -> u64 {
    250
}

fn default_channel_capacity() -> usize {
    1024
}

impl TailConfig {
    pub fn new(fields: Vec<FieldSpec>, position_path: PathBuf) -> Self {
        Self {
            fields,
            position_path,
            flush_interval_secs: default_flush_interval_secs(),
            tick_interval_ms: default_tick_interval_ms(),
            start_at: StartAt::default(),
            host: None,
            channel_capacity: default_channel_capacity(),
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.fields.is_empty() {
            return Err("fields must not be empty".to_string());
        }
        if self.flush_interval_secs == 0 {
            return Err("flush_interval_secs must be at least 1".to_string());
        }
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be at least 1".to_string());
        }
        if self.channel_capacity == 0 {
            return Err("channel_capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

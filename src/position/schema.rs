// SPDX-License-Identifier: Apache-2.0

//! On-disk schema for persisted read positions.
//!
//! The state file is versioned JSON keyed by file identity so that
//! positions survive renames: a rotated file keeps its entry under the
//! old identity while the fresh file at the same path gets a new one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const POSITION_STATE_VERSION: u8 = 1;

/// Stable map key for a file identity, readable in the state file.
pub fn identity_key(dev: u64, ino: u64) -> String {
    format!("{}:{}", dev, ino)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u8,
    pub files: HashMap<String, PersistedEntry>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: POSITION_STATE_VERSION,
            files: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEntry {
    /// Last known path for the identity. Informational: lookups go by
    /// identity, so a rename does not invalidate the entry.
    pub path: String,
    pub dev: u64,
    pub ino: u64,
    pub offset: u64,
}

// SPDX-License-Identifier: Apache-2.0

mod cursor;
mod file_id;

pub use cursor::{FileCursor, ReadOutcome};
pub use file_id::FileIdentity;

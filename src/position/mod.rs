// SPDX-License-Identifier: Apache-2.0

mod schema;
mod store;

pub use schema::{identity_key, PersistedEntry, PersistedState, POSITION_STATE_VERSION};
pub use store::PositionStore;

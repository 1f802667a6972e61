//! Port implementations shipped with the crate
//!
//! - `memory`: in-process repository, lease store and channel emitter
//! - `mock`: scriptable doubles for the ledger, gateway, accounts and emitter

pub mod memory;

#[cfg(any(test, feature = "mock-api"))]
pub mod mock;

pub use memory::{ChannelEmitter, InMemoryLease, InMemoryRepository};

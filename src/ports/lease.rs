//! Lease Port
//!
//! Mutual exclusion for periodic triggers: only the holder of the lease runs a
//! reconciliation pass. Backed by a shared store outside the engine.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub key: String,
    /// Proves ownership on release
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait LeaseProvider: Send + Sync {
    /// `Ok(None)` when someone else holds an unexpired lease on `key`
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<Lease>, EngineError>;

    async fn release(&self, lease: &Lease) -> Result<(), EngineError>;
}

//! In-process adapters
//!
//! DashMap-backed repository and lease store, and an mpsc event emitter.
//! Suitable for single-process deployments and tests; the repository is the
//! store, not a cache in front of one.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::error::EngineError;
use crate::fsm::{Instrument, InstrumentState};
use crate::ports::{EventEmitter, InstrumentEvent, InstrumentRepository, Lease, LeaseProvider, Page};
use crate::types::InstrumentId;

// ============================================================================
// Repository
// ============================================================================

pub struct InMemoryRepository<I: Instrument> {
    by_id: DashMap<InstrumentId, I>,
    /// correlation key -> id
    by_key: DashMap<String, InstrumentId>,
}

impl<I: Instrument> InMemoryRepository<I> {
    pub fn new() -> Self {
        Self {
            by_id: DashMap::new(),
            by_key: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Snapshot ordered by creation time
    fn sorted<F>(&self, filter: F) -> Vec<I>
    where
        F: Fn(&I) -> bool,
    {
        let mut items: Vec<I> = self
            .by_id
            .iter()
            .filter(|e| filter(e.value()))
            .map(|e| e.value().clone())
            .collect();
        items.sort_by_key(|i| (i.header().created_at, i.id()));
        items
    }
}

impl<I: Instrument> Default for InMemoryRepository<I> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<I: Instrument> InstrumentRepository<I> for InMemoryRepository<I> {
    async fn get_by_id(&self, id: InstrumentId) -> Result<Option<I>, EngineError> {
        Ok(self.by_id.get(&id).map(|e| e.value().clone()))
    }

    async fn get_by_correlation_key(&self, key: &str) -> Result<Option<I>, EngineError> {
        let Some(id) = self.by_key.get(key).map(|e| *e.value()) else {
            return Ok(None);
        };
        Ok(self.by_id.get(&id).map(|e| e.value().clone()))
    }

    async fn create(&self, instrument: I) -> Result<I, EngineError> {
        match self.by_key.entry(instrument.correlation_key().to_string()) {
            Entry::Occupied(e) => Err(EngineError::Repository(format!(
                "{} correlation key '{}' already taken by {}",
                I::KIND,
                e.key(),
                e.get()
            ))),
            Entry::Vacant(e) => {
                self.by_id.insert(instrument.id(), instrument.clone());
                e.insert(instrument.id());
                Ok(instrument)
            }
        }
    }

    async fn update_if(&self, instrument: &I, expected: I::State) -> Result<bool, EngineError> {
        let mut stored = self
            .by_id
            .get_mut(&instrument.id())
            .ok_or_else(|| EngineError::not_found(I::KIND, instrument.id()))?;

        if stored.state() != expected {
            debug!(
                kind = %I::KIND,
                id = %instrument.id(),
                expected = expected.as_str(),
                actual = stored.state().as_str(),
                "CAS failed"
            );
            return Ok(false);
        }

        *stored = instrument.clone();
        Ok(true)
    }

    async fn list_by_state(&self, state: I::State, page: Page) -> Result<Vec<I>, EngineError> {
        Ok(self
            .sorted(|i| i.state() == state)
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn list_by_parent(&self, parent: InstrumentId) -> Result<Vec<I>, EngineError> {
        Ok(self.sorted(|i| i.parent_id() == Some(parent)))
    }
}

// ============================================================================
// Event emitter
// ============================================================================

/// Forwards events to an unbounded channel drained by the publisher task
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<InstrumentEvent>,
}

impl ChannelEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InstrumentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventEmitter for ChannelEmitter {
    async fn emit(&self, event: &InstrumentEvent) -> Result<(), EngineError> {
        self.tx
            .send(event.clone())
            .map_err(|_| EngineError::System("event channel closed".to_string()))
    }
}

// ============================================================================
// Lease
// ============================================================================

#[derive(Default)]
pub struct InMemoryLease {
    leases: DashMap<String, Lease>,
}

impl InMemoryLease {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseProvider for InMemoryLease {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<Lease>, EngineError> {
        let now = Utc::now();
        let ttl = TimeDelta::from_std(ttl).map_err(|e| EngineError::Config(e.to_string()))?;
        let lease = Lease {
            key: key.to_string(),
            token: Uuid::new_v4(),
            expires_at: now + ttl,
        };

        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut e) => {
                if e.get().expires_at > now {
                    return Ok(None);
                }
                e.insert(lease.clone());
            }
            Entry::Vacant(e) => {
                e.insert(lease.clone());
            }
        }

        Ok(Some(lease))
    }

    async fn release(&self, lease: &Lease) -> Result<(), EngineError> {
        self.leases
            .remove_if(&lease.key, |_, held| held.token == lease.token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::payment::{Payment, PaymentState};
    use crate::types::Counterparty;

    fn payment(key: &str) -> Payment {
        Payment::new(key, 100, "acc", Counterparty::default(), None)
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let repo: InMemoryRepository<Payment> = InMemoryRepository::new();
        repo.create(payment("K1")).await.unwrap();
        let err = repo.create(payment("K1")).await.unwrap_err();
        assert!(matches!(err, EngineError::Repository(_)));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_update_if_checks_expected_state() {
        let repo: InMemoryRepository<Payment> = InMemoryRepository::new();
        let mut p = repo.create(payment("K2")).await.unwrap();
        p.header.state = PaymentState::Waiting;

        assert!(!repo.update_if(&p, PaymentState::Waiting).await.unwrap());
        assert!(repo.update_if(&p, PaymentState::Pending).await.unwrap());
        let stored = repo.get_by_correlation_key("K2").await.unwrap().unwrap();
        assert_eq!(stored.state(), PaymentState::Waiting);
    }

    #[tokio::test]
    async fn test_list_by_state_pages() {
        let repo: InMemoryRepository<Payment> = InMemoryRepository::new();
        for i in 0..5 {
            repo.create(payment(&format!("P{}", i))).await.unwrap();
        }
        let first = repo.list_by_state(PaymentState::Pending, Page::first(3)).await.unwrap();
        let second = repo
            .list_by_state(PaymentState::Pending, Page::first(3).next())
            .await
            .unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn test_lease_is_exclusive_until_released() {
        let store = InMemoryLease::new();
        let ttl = Duration::from_secs(30);
        let lease = store.try_acquire("recon", ttl).await.unwrap().unwrap();
        assert!(store.try_acquire("recon", ttl).await.unwrap().is_none());

        store.release(&lease).await.unwrap();
        assert!(store.try_acquire("recon", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken() {
        let store = InMemoryLease::new();
        store.try_acquire("recon", Duration::ZERO).await.unwrap().unwrap();
        assert!(store.try_acquire("recon", Duration::from_secs(5)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_channel_emitter_forwards() {
        let (emitter, mut rx) = ChannelEmitter::new();
        let event = InstrumentEvent::snapshot(&payment("K3")).unwrap();
        emitter.emit(&event).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().topic, "pix_payment.pending");
    }
}

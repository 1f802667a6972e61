//! Instrument Repository Port
//!
//! One repository per instrument kind. The repository is the single source of
//! truth for instrument state; updates are optimistic on the state last read.

use async_trait::async_trait;

use crate::error::EngineError;
use crate::fsm::Instrument;
use crate::types::InstrumentId;

/// Offset pagination for `list_by_state`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }

    pub fn next(&self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(100)
    }
}

#[async_trait]
pub trait InstrumentRepository<I: Instrument>: Send + Sync {
    async fn get_by_id(&self, id: InstrumentId) -> Result<Option<I>, EngineError>;

    async fn get_by_correlation_key(&self, key: &str) -> Result<Option<I>, EngineError>;

    /// Insert a new instrument.
    ///
    /// Fails with `EngineError::Repository` when the correlation key is taken.
    async fn create(&self, instrument: I) -> Result<I, EngineError>;

    /// Atomic CAS update: persist `instrument` only if the stored state still
    /// equals `expected`.
    ///
    /// Returns false if another writer moved the instrument in between.
    async fn update_if(&self, instrument: &I, expected: I::State) -> Result<bool, EngineError>;

    async fn list_by_state(&self, state: I::State, page: Page) -> Result<Vec<I>, EngineError>;

    /// Instruments owned by `parent` (see `Instrument::parent_id`)
    async fn list_by_parent(&self, parent: InstrumentId) -> Result<Vec<I>, EngineError>;
}

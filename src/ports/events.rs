//! Event Emitter Port
//!
//! The engine decides *that* an event happened and builds a transport-neutral
//! descriptor; publishing it is the collaborator's job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::EngineError;
use crate::fsm::{Instrument, InstrumentState};
use crate::types::{InstrumentId, InstrumentKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentEvent {
    pub event_id: Uuid,
    /// `<kind>.<state>`, e.g. `pix_deposit.blocked`
    pub topic: String,
    pub kind: InstrumentKind,
    pub instrument_id: InstrumentId,
    pub correlation_key: String,
    pub state: &'static str,
    pub occurred_at: DateTime<Utc>,
    /// Full instrument snapshot
    pub payload: serde_json::Value,
}

impl InstrumentEvent {
    pub fn snapshot<I: Instrument>(instrument: &I) -> Result<Self, EngineError> {
        let state = instrument.state().as_str();
        let payload = serde_json::to_value(instrument)
            .map_err(|e| EngineError::System(format!("snapshot serialization: {}", e)))?;

        Ok(Self {
            event_id: Uuid::new_v4(),
            topic: format!("{}.{}", I::KIND.topic(), state.to_lowercase()),
            kind: I::KIND,
            instrument_id: instrument.id(),
            correlation_key: instrument.correlation_key().to_string(),
            state,
            occurred_at: instrument.header().updated_at,
            payload,
        })
    }
}

#[async_trait]
pub trait EventEmitter: Send + Sync {
    /// Fire-and-forget from the engine's point of view: failures are logged by
    /// the caller and never undo a persisted transition.
    async fn emit(&self, event: &InstrumentEvent) -> Result<(), EngineError>;
}

//! Instrument abstraction
//!
//! Every trackable object (deposit, infraction, admin TED, ...) embeds a
//! [`Header`] and exposes its transition table. The runner only talks to this
//! trait, never to a concrete instrument.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::table::{InstrumentState, TransitionEvent, TransitionTable};
use crate::config::LedgerConfig;
use crate::ports::ledger::OperationDraft;
use crate::types::{InstrumentId, InstrumentKind, OperationRef};

/// Fields shared by every instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header<S> {
    pub id: InstrumentId,
    /// External reference used to deduplicate redelivered triggers
    pub correlation_key: String,
    pub state: S,
    /// Minor units; 0 for instruments without a monetary effect
    pub amount: u64,
    pub ledger_operation: Option<OperationRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once, by the transition reaching a terminal state
    pub terminal_at: Option<DateTime<Utc>>,
}

impl<S: InstrumentState> Header<S> {
    pub fn new(correlation_key: impl Into<String>, state: S, amount: u64) -> Self {
        let now = Utc::now();
        Self {
            id: InstrumentId::new(),
            correlation_key: correlation_key.into(),
            state,
            amount,
            ledger_operation: None,
            created_at: now,
            updated_at: now,
            terminal_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub(crate) fn advance(&mut self, to: S, at: DateTime<Utc>) {
        self.state = to;
        self.updated_at = at;
        if to.is_terminal() && self.terminal_at.is_none() {
            self.terminal_at = Some(at);
        }
    }
}

pub trait Instrument: Clone + fmt::Debug + Serialize + Send + Sync + 'static {
    type State: InstrumentState + Serialize;
    type Event: TransitionEvent;

    const KIND: InstrumentKind;

    fn table() -> &'static TransitionTable<Self::State, Self::Event>;

    fn header(&self) -> &Header<Self::State>;

    fn header_mut(&mut self) -> &mut Header<Self::State>;

    /// Owning instrument (deposit of a devolution, infraction of a refund link)
    fn parent_id(&self) -> Option<InstrumentId> {
        None
    }

    /// Ledger posting for instruments whose table carries a `Create` effect.
    /// `target` is the state the posting transition moves to.
    fn ledger_draft(&self, _config: &LedgerConfig, _target: Self::State) -> Option<OperationDraft> {
        None
    }

    fn id(&self) -> InstrumentId {
        self.header().id
    }

    fn state(&self) -> Self::State {
        self.header().state
    }

    fn correlation_key(&self) -> &str {
        &self.header().correlation_key
    }
}

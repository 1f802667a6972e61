//! Deposit Warning
//!
//! Compliance warning raised on a waiting deposit. One per deposit.
//! Approving releases the deposit; rejecting leads to a devolution.

use serde::{Deserialize, Serialize};

use crate::fsm::{Header, Instrument, InstrumentState, TransitionEvent, TransitionRule, TransitionTable};
use crate::types::{InstrumentId, InstrumentKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningState {
    Created,
    Approved,
    Rejected,
}

impl InstrumentState for WarningState {
    fn as_str(&self) -> &'static str {
        match self {
            WarningState::Created => "CREATED",
            WarningState::Approved => "APPROVED",
            WarningState::Rejected => "REJECTED",
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, WarningState::Created)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningEvent {
    Approve,
    Reject,
}

impl TransitionEvent for WarningEvent {
    fn as_str(&self) -> &'static str {
        match self {
            WarningEvent::Approve => "approve",
            WarningEvent::Reject => "reject",
        }
    }
}

pub static TABLE: TransitionTable<WarningState, WarningEvent> = TransitionTable::new(
    InstrumentKind::DepositWarning,
    &[
        TransitionRule {
            event: WarningEvent::Approve,
            sources: &[WarningState::Created],
            target: WarningState::Approved,
            settled: &[],
            effects: &[],
        },
        TransitionRule {
            event: WarningEvent::Reject,
            sources: &[WarningState::Created],
            target: WarningState::Rejected,
            settled: &[],
            effects: &[],
        },
    ],
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositWarning {
    #[serde(flatten)]
    pub header: Header<WarningState>,
    pub deposit_id: InstrumentId,
    pub reason: String,
}

impl DepositWarning {
    pub fn correlation_key_for(deposit_id: InstrumentId) -> String {
        format!("warning:{}", deposit_id)
    }

    pub fn new(deposit_id: InstrumentId, reason: impl Into<String>) -> Self {
        Self {
            header: Header::new(Self::correlation_key_for(deposit_id), WarningState::Created, 0),
            deposit_id,
            reason: reason.into(),
        }
    }
}

impl Instrument for DepositWarning {
    type State = WarningState;
    type Event = WarningEvent;

    const KIND: InstrumentKind = InstrumentKind::DepositWarning;

    fn table() -> &'static TransitionTable<WarningState, WarningEvent> {
        &TABLE
    }

    fn header(&self) -> &Header<WarningState> {
        &self.header
    }

    fn header_mut(&mut self) -> &mut Header<WarningState> {
        &mut self.header
    }

    fn parent_id(&self) -> Option<InstrumentId> {
        Some(self.deposit_id)
    }
}

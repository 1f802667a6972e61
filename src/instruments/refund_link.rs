//! Refund Operation Link
//!
//! Ties an infraction to the funds held for a possible refund. Opening a link
//! moves `amount` from the client account into the refund reserve; the link is
//! closed either by reverting that hold (compensation) or by settling it once
//! the refund is paid out.
//!
//! ```text
//! PENDING --open--> OPEN --settle--> CLOSED (ledger accept)
//!    |                |
//!    +----revert------+--> CLOSED (ledger revert)
//! ```

use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;
use crate::fsm::{
    Effect, Header, Instrument, InstrumentState, LedgerEffect, TransitionEvent, TransitionRule,
    TransitionTable,
};
use crate::ports::ledger::OperationDraft;
use crate::types::{InstrumentId, InstrumentKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkState {
    Pending,
    Open,
    Closed,
}

impl InstrumentState for LinkState {
    fn as_str(&self) -> &'static str {
        match self {
            LinkState::Pending => "PENDING",
            LinkState::Open => "OPEN",
            LinkState::Closed => "CLOSED",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, LinkState::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Open,
    Revert,
    Settle,
}

impl TransitionEvent for LinkEvent {
    fn as_str(&self) -> &'static str {
        match self {
            LinkEvent::Open => "open",
            LinkEvent::Revert => "revert",
            LinkEvent::Settle => "settle",
        }
    }
}

pub static TABLE: TransitionTable<LinkState, LinkEvent> = TransitionTable::new(
    InstrumentKind::RefundLink,
    &[
        TransitionRule {
            event: LinkEvent::Open,
            sources: &[LinkState::Pending],
            target: LinkState::Open,
            settled: &[LinkState::Closed],
            effects: &[Effect::Ledger(LedgerEffect::Create)],
        },
        TransitionRule {
            event: LinkEvent::Revert,
            sources: &[LinkState::Pending, LinkState::Open],
            target: LinkState::Closed,
            settled: &[],
            effects: &[Effect::Ledger(LedgerEffect::Revert)],
        },
        TransitionRule {
            event: LinkEvent::Settle,
            sources: &[LinkState::Open],
            target: LinkState::Closed,
            settled: &[],
            effects: &[Effect::Ledger(LedgerEffect::Accept)],
        },
    ],
);

/// How a link was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkClosure {
    Reverted,
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundLink {
    #[serde(flatten)]
    pub header: Header<LinkState>,
    pub infraction_id: InstrumentId,
    /// Client account the hold is taken from
    pub client_account: String,
    /// End-to-end id of the operation being refunded
    pub operation_id: String,
    pub closure: Option<LinkClosure>,
}

impl RefundLink {
    pub fn new(
        key: impl Into<String>,
        infraction_id: InstrumentId,
        refund_operation_value: u64,
        client_account: impl Into<String>,
        operation_id: impl Into<String>,
    ) -> Self {
        Self {
            header: Header::new(key, LinkState::Pending, refund_operation_value),
            infraction_id,
            client_account: client_account.into(),
            operation_id: operation_id.into(),
            closure: None,
        }
    }
}

impl Instrument for RefundLink {
    type State = LinkState;
    type Event = LinkEvent;

    const KIND: InstrumentKind = InstrumentKind::RefundLink;

    fn table() -> &'static TransitionTable<LinkState, LinkEvent> {
        &TABLE
    }

    fn header(&self) -> &Header<LinkState> {
        &self.header
    }

    fn header_mut(&mut self) -> &mut Header<LinkState> {
        &mut self.header
    }

    fn parent_id(&self) -> Option<InstrumentId> {
        Some(self.infraction_id)
    }

    fn ledger_draft(&self, config: &LedgerConfig, _target: LinkState) -> Option<OperationDraft> {
        Some(OperationDraft {
            tag: config.tags.refund_hold.clone(),
            source: Some(self.client_account.clone()),
            destination: config.refund_reserve_account.clone(),
            description: format!("Refund hold for {}", self.operation_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::Decision;

    #[test]
    fn test_table_is_well_formed() {
        TABLE.validate().unwrap();
    }

    #[test]
    fn test_closed_dominates_both_closures() {
        assert_eq!(TABLE.evaluate(LinkState::Closed, LinkEvent::Revert).unwrap(), Decision::NoOp);
        assert_eq!(TABLE.evaluate(LinkState::Closed, LinkEvent::Settle).unwrap(), Decision::NoOp);
        assert_eq!(TABLE.evaluate(LinkState::Closed, LinkEvent::Open).unwrap(), Decision::NoOp);
    }

    #[test]
    fn test_pending_link_cannot_settle() {
        assert!(TABLE.evaluate(LinkState::Pending, LinkEvent::Settle).is_err());
    }
}

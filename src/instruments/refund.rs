//! Pix Refund
//!
//! Refund request received from the network, usually following an agreed
//! infraction. Closing pays the refund out of the refund reserve.
//!
//! ```text
//! RECEIVE_PENDING -confirm_receive-> RECEIVE_CONFIRMED -close-> CLOSED_PENDING
//!                                         |                         | confirm_close
//!                                         |                         v   (ledger create)
//!                                         |                    CLOSED_CONFIRMED
//!                                         +-cancel-> CANCEL_PENDING -confirm_cancel-> CANCEL_CONFIRMED
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
pub enum RefundState {
    ReceivePending,
    ReceiveConfirmed,
    ClosedPending,
    ClosedConfirmed,
    CancelPending,
    CancelConfirmed,
    Error,
}

impl InstrumentState for RefundState {
    fn as_str(&self) -> &'static str {
        match self {
            RefundState::ReceivePending => "RECEIVE_PENDING",
            RefundState::ReceiveConfirmed => "RECEIVE_CONFIRMED",
            RefundState::ClosedPending => "CLOSED_PENDING",
            RefundState::ClosedConfirmed => "CLOSED_CONFIRMED",
            RefundState::CancelPending => "CANCEL_PENDING",
            RefundState::CancelConfirmed => "CANCEL_CONFIRMED",
            RefundState::Error => "ERROR",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            RefundState::ClosedConfirmed | RefundState::CancelConfirmed | RefundState::Error
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundEvent {
    ConfirmReceive,
    Close,
    ConfirmClose,
    CloseRemotely,
    Cancel,
    ConfirmCancel,
    CancelRemotely,
    Fail,
}

impl TransitionEvent for RefundEvent {
    fn as_str(&self) -> &'static str {
        match self {
            RefundEvent::ConfirmReceive => "confirm_receive",
            RefundEvent::Close => "close",
            RefundEvent::ConfirmClose => "confirm_close",
            RefundEvent::CloseRemotely => "close_remotely",
            RefundEvent::Cancel => "cancel",
            RefundEvent::ConfirmCancel => "confirm_cancel",
            RefundEvent::CancelRemotely => "cancel_remotely",
            RefundEvent::Fail => "fail",
        }
    }
}

use RefundState::*;

pub static TABLE: TransitionTable<RefundState, RefundEvent> = TransitionTable::new(
    InstrumentKind::Refund,
    &[
        TransitionRule {
            event: RefundEvent::ConfirmReceive,
            sources: &[ReceivePending],
            target: ReceiveConfirmed,
            settled: &[ClosedPending, ClosedConfirmed, CancelPending, CancelConfirmed],
            effects: &[],
        },
        TransitionRule {
            event: RefundEvent::Close,
            sources: &[ReceiveConfirmed],
            target: ClosedPending,
            settled: &[ClosedConfirmed],
            effects: &[Effect::Gateway],
        },
        TransitionRule {
            event: RefundEvent::ConfirmClose,
            sources: &[ClosedPending],
            target: ClosedConfirmed,
            settled: &[],
            effects: &[Effect::Ledger(LedgerEffect::Create)],
        },
        TransitionRule {
            event: RefundEvent::CloseRemotely,
            sources: &[ReceivePending, ReceiveConfirmed, ClosedPending],
            target: ClosedConfirmed,
            settled: &[],
            effects: &[Effect::Ledger(LedgerEffect::Create)],
        },
        TransitionRule {
            event: RefundEvent::Cancel,
            sources: &[ReceiveConfirmed],
            target: CancelPending,
            settled: &[CancelConfirmed],
            effects: &[Effect::Gateway],
        },
        TransitionRule {
            event: RefundEvent::ConfirmCancel,
            sources: &[CancelPending],
            target: CancelConfirmed,
            settled: &[],
            effects: &[],
        },
        TransitionRule {
            event: RefundEvent::CancelRemotely,
            sources: &[ReceivePending, ReceiveConfirmed, CancelPending],
            target: CancelConfirmed,
            settled: &[],
            effects: &[],
        },
        TransitionRule {
            event: RefundEvent::Fail,
            sources: &[ReceivePending, ReceiveConfirmed, ClosedPending, CancelPending],
            target: Error,
            settled: &[],
            effects: &[],
        },
    ],
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    #[serde(flatten)]
    pub header: Header<RefundState>,
    /// Infraction this refund follows, when known locally
    pub infraction_id: Option<InstrumentId>,
    /// End-to-end id of the refunded operation
    pub operation_id: String,
    pub reason: Option<String>,
    pub description: Option<String>,
    pub external_id: Option<String>,
    pub rejection_reason: Option<String>,
    pub analysis_details: Option<String>,
    pub failure_reason: Option<String>,
}

impl Refund {
    pub fn received(
        refund_request_id: impl Into<String>,
        amount: u64,
        operation_id: impl Into<String>,
        infraction_id: Option<InstrumentId>,
        reason: Option<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            header: Header::new(refund_request_id, ReceivePending, amount),
            infraction_id,
            operation_id: operation_id.into(),
            reason,
            description,
            external_id: None,
            rejection_reason: None,
            analysis_details: None,
            failure_reason: None,
        }
    }
}

impl Instrument for Refund {
    type State = RefundState;
    type Event = RefundEvent;

    const KIND: InstrumentKind = InstrumentKind::Refund;

    fn table() -> &'static TransitionTable<RefundState, RefundEvent> {
        &TABLE
    }

    fn header(&self) -> &Header<RefundState> {
        &self.header
    }

    fn header_mut(&mut self) -> &mut Header<RefundState> {
        &mut self.header
    }

    fn parent_id(&self) -> Option<InstrumentId> {
        self.infraction_id
    }

    fn ledger_draft(&self, config: &LedgerConfig, _target: RefundState) -> Option<OperationDraft> {
        Some(OperationDraft {
            tag: config.tags.refund.clone(),
            source: Some(config.refund_reserve_account.clone()),
            destination: config.settlement_account.clone(),
            description: format!("Pix refund of {}", self.operation_id),
        })
    }
}

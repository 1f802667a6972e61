//! Pix Infraction
//!
//! Fraud/dispute report on a Pix operation, either opened by us or received
//! from the network. Keyed by the network's issue id.
//!
//! ```text
//! sent:     NEW -open-> OPEN_PENDING -confirm_open-> OPEN_CONFIRMED --+
//! received: RECEIVE_PENDING -acknowledge-> ACKNOWLEDGED_PENDING       |
//!             -confirm_acknowledge-> ACKNOWLEDGED_CONFIRMED ----------+
//!                                                                     v
//!             CLOSED_PENDING <---------------close--------------------+
//!                  | confirm_close
//!                  v
//!             CLOSED_CONFIRMED  (analysis AGREED / DISAGREED)
//!
//! OPEN_PENDING | OPEN_CONFIRMED -cancel-> CANCEL_PENDING -confirm_cancel-> CANCEL_CONFIRMED
//! ```
//!
//! The network can close or cancel an infraction at any point before we do;
//! those arrive through reconciliation as `close_remotely`/`cancel_remotely`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::fsm::{
    Effect, Header, Instrument, InstrumentState, TransitionEvent, TransitionRule, TransitionTable,
};
use crate::types::InstrumentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InfractionState {
    New,
    OpenPending,
    OpenConfirmed,
    ReceivePending,
    AcknowledgedPending,
    AcknowledgedConfirmed,
    ClosedPending,
    ClosedConfirmed,
    CancelPending,
    CancelConfirmed,
    Error,
}

impl InstrumentState for InfractionState {
    fn as_str(&self) -> &'static str {
        match self {
            InfractionState::New => "NEW",
            InfractionState::OpenPending => "OPEN_PENDING",
            InfractionState::OpenConfirmed => "OPEN_CONFIRMED",
            InfractionState::ReceivePending => "RECEIVE_PENDING",
            InfractionState::AcknowledgedPending => "ACKNOWLEDGED_PENDING",
            InfractionState::AcknowledgedConfirmed => "ACKNOWLEDGED_CONFIRMED",
            InfractionState::ClosedPending => "CLOSED_PENDING",
            InfractionState::ClosedConfirmed => "CLOSED_CONFIRMED",
            InfractionState::CancelPending => "CANCEL_PENDING",
            InfractionState::CancelConfirmed => "CANCEL_CONFIRMED",
            InfractionState::Error => "ERROR",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            InfractionState::ClosedConfirmed
                | InfractionState::CancelConfirmed
                | InfractionState::Error
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfractionEvent {
    Open,
    ConfirmOpen,
    Acknowledge,
    ConfirmAcknowledge,
    Close,
    ConfirmClose,
    CloseRemotely,
    Cancel,
    ConfirmCancel,
    CancelRemotely,
    Fail,
}

impl TransitionEvent for InfractionEvent {
    fn as_str(&self) -> &'static str {
        match self {
            InfractionEvent::Open => "open",
            InfractionEvent::ConfirmOpen => "confirm_open",
            InfractionEvent::Acknowledge => "acknowledge",
            InfractionEvent::ConfirmAcknowledge => "confirm_acknowledge",
            InfractionEvent::Close => "close",
            InfractionEvent::ConfirmClose => "confirm_close",
            InfractionEvent::CloseRemotely => "close_remotely",
            InfractionEvent::Cancel => "cancel",
            InfractionEvent::ConfirmCancel => "confirm_cancel",
            InfractionEvent::CancelRemotely => "cancel_remotely",
            InfractionEvent::Fail => "fail",
        }
    }
}

use InfractionState::*;

pub static TABLE: TransitionTable<InfractionState, InfractionEvent> = TransitionTable::new(
    InstrumentKind::Infraction,
    &[
        TransitionRule {
            event: InfractionEvent::Open,
            sources: &[New],
            target: OpenPending,
            settled: &[OpenConfirmed, ClosedPending, ClosedConfirmed, CancelPending, CancelConfirmed],
            effects: &[Effect::Gateway],
        },
        TransitionRule {
            event: InfractionEvent::ConfirmOpen,
            sources: &[OpenPending],
            target: OpenConfirmed,
            settled: &[ClosedPending, ClosedConfirmed, CancelPending, CancelConfirmed],
            effects: &[],
        },
        TransitionRule {
            event: InfractionEvent::Acknowledge,
            sources: &[ReceivePending],
            target: AcknowledgedPending,
            settled: &[AcknowledgedConfirmed, ClosedPending, ClosedConfirmed],
            effects: &[Effect::Gateway],
        },
        TransitionRule {
            event: InfractionEvent::ConfirmAcknowledge,
            sources: &[AcknowledgedPending],
            target: AcknowledgedConfirmed,
            settled: &[ClosedPending, ClosedConfirmed],
            effects: &[],
        },
        TransitionRule {
            event: InfractionEvent::Close,
            sources: &[OpenConfirmed, AcknowledgedConfirmed],
            target: ClosedPending,
            settled: &[ClosedConfirmed],
            effects: &[Effect::Gateway],
        },
        TransitionRule {
            event: InfractionEvent::ConfirmClose,
            sources: &[ClosedPending],
            target: ClosedConfirmed,
            settled: &[],
            effects: &[],
        },
        TransitionRule {
            event: InfractionEvent::CloseRemotely,
            sources: &[
                OpenPending,
                OpenConfirmed,
                ReceivePending,
                AcknowledgedPending,
                AcknowledgedConfirmed,
                ClosedPending,
            ],
            target: ClosedConfirmed,
            settled: &[],
            effects: &[],
        },
        TransitionRule {
            event: InfractionEvent::Cancel,
            sources: &[OpenPending, OpenConfirmed],
            target: CancelPending,
            settled: &[CancelConfirmed],
            effects: &[Effect::Gateway],
        },
        TransitionRule {
            event: InfractionEvent::ConfirmCancel,
            sources: &[CancelPending],
            target: CancelConfirmed,
            settled: &[],
            effects: &[],
        },
        TransitionRule {
            event: InfractionEvent::CancelRemotely,
            sources: &[
                OpenPending,
                OpenConfirmed,
                ReceivePending,
                AcknowledgedPending,
                AcknowledgedConfirmed,
                CancelPending,
            ],
            target: CancelConfirmed,
            settled: &[],
            effects: &[],
        },
        TransitionRule {
            event: InfractionEvent::Fail,
            sources: &[
                New,
                OpenPending,
                ReceivePending,
                AcknowledgedPending,
                ClosedPending,
                CancelPending,
            ],
            target: Error,
            settled: &[],
            effects: &[],
        },
    ],
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisResult {
    Agreed,
    Disagreed,
}

impl AnalysisResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisResult::Agreed => "AGREED",
            AnalysisResult::Disagreed => "DISAGREED",
        }
    }
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AGREED" => Ok(AnalysisResult::Agreed),
            "DISAGREED" => Ok(AnalysisResult::Disagreed),
            other => Err(format!("unknown analysis result '{}'", other)),
        }
    }
}

/// Who raised the infraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InfractionOrigin {
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Infraction {
    #[serde(flatten)]
    pub header: Header<InfractionState>,
    pub origin: InfractionOrigin,
    /// End-to-end id of the disputed operation
    pub operation_id: String,
    pub infraction_type: String,
    pub description: Option<String>,
    /// Network-side identifier, once known
    pub external_id: Option<String>,
    pub analysis_result: Option<AnalysisResult>,
    pub analysis_details: Option<String>,
    pub failure_reason: Option<String>,
}

impl Infraction {
    /// Infraction opened by us, starts in NEW
    pub fn sent(
        issue_id: impl Into<String>,
        operation_id: impl Into<String>,
        infraction_type: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self::with_origin(InfractionOrigin::Sent, New, issue_id, operation_id, infraction_type, description)
    }

    /// Infraction raised by the network, starts in RECEIVE_PENDING
    pub fn received(
        issue_id: impl Into<String>,
        operation_id: impl Into<String>,
        infraction_type: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self::with_origin(
            InfractionOrigin::Received,
            ReceivePending,
            issue_id,
            operation_id,
            infraction_type,
            description,
        )
    }

    fn with_origin(
        origin: InfractionOrigin,
        state: InfractionState,
        issue_id: impl Into<String>,
        operation_id: impl Into<String>,
        infraction_type: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            header: Header::new(issue_id, state, 0),
            origin,
            operation_id: operation_id.into(),
            infraction_type: infraction_type.into(),
            description,
            external_id: None,
            analysis_result: None,
            analysis_details: None,
            failure_reason: None,
        }
    }

    /// Whether the refund-operation holds taken for this infraction must be
    /// reverted: closed with a DISAGREED analysis, cancelled, or failed.
    pub fn requires_compensation(&self) -> bool {
        match self.header.state {
            ClosedConfirmed => self.analysis_result == Some(AnalysisResult::Disagreed),
            CancelConfirmed | Error => true,
            _ => false,
        }
    }
}

impl Instrument for Infraction {
    type State = InfractionState;
    type Event = InfractionEvent;

    const KIND: InstrumentKind = InstrumentKind::Infraction;

    fn table() -> &'static TransitionTable<InfractionState, InfractionEvent> {
        &TABLE
    }

    fn header(&self) -> &Header<InfractionState> {
        &self.header
    }

    fn header_mut(&mut self) -> &mut Header<InfractionState> {
        &mut self.header
    }
}

//! Pix Fraud Detection
//!
//! Fraud marker on a document/key, registered by us or received from the
//! network. No monetary effect.

use serde::{Deserialize, Serialize};

use crate::fsm::{
    Effect, Header, Instrument, InstrumentState, TransitionEvent, TransitionRule, TransitionTable,
};
use crate::types::InstrumentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudState {
    Pending,
    RegisterPending,
    RegisterConfirmed,
    CancelRegisterPending,
    CancelRegisterConfirmed,
    ReceivePending,
    ReceiveConfirmed,
    CancelReceiveConfirmed,
    Error,
}

impl InstrumentState for FraudState {
    fn as_str(&self) -> &'static str {
        match self {
            FraudState::Pending => "PENDING",
            FraudState::RegisterPending => "REGISTER_PENDING",
            FraudState::RegisterConfirmed => "REGISTER_CONFIRMED",
            FraudState::CancelRegisterPending => "CANCEL_REGISTER_PENDING",
            FraudState::CancelRegisterConfirmed => "CANCEL_REGISTER_CONFIRMED",
            FraudState::ReceivePending => "RECEIVE_PENDING",
            FraudState::ReceiveConfirmed => "RECEIVE_CONFIRMED",
            FraudState::CancelReceiveConfirmed => "CANCEL_RECEIVE_CONFIRMED",
            FraudState::Error => "ERROR",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            FraudState::CancelRegisterConfirmed
                | FraudState::CancelReceiveConfirmed
                | FraudState::Error
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FraudEvent {
    Register,
    ConfirmRegister,
    CancelRegistration,
    ConfirmCancelRegistration,
    CancelRegistrationRemotely,
    ConfirmReceive,
    CancelReceived,
    Fail,
}

impl TransitionEvent for FraudEvent {
    fn as_str(&self) -> &'static str {
        match self {
            FraudEvent::Register => "register",
            FraudEvent::ConfirmRegister => "confirm_register",
            FraudEvent::CancelRegistration => "cancel_registration",
            FraudEvent::ConfirmCancelRegistration => "confirm_cancel_registration",
            FraudEvent::CancelRegistrationRemotely => "cancel_registration_remotely",
            FraudEvent::ConfirmReceive => "confirm_receive",
            FraudEvent::CancelReceived => "cancel_received",
            FraudEvent::Fail => "fail",
        }
    }
}

use FraudState::*;

pub static TABLE: TransitionTable<FraudState, FraudEvent> = TransitionTable::new(
    InstrumentKind::FraudDetection,
    &[
        TransitionRule {
            event: FraudEvent::Register,
            sources: &[Pending],
            target: RegisterPending,
            settled: &[RegisterConfirmed, CancelRegisterPending, CancelRegisterConfirmed],
            effects: &[Effect::Gateway],
        },
        TransitionRule {
            event: FraudEvent::ConfirmRegister,
            sources: &[RegisterPending],
            target: RegisterConfirmed,
            settled: &[CancelRegisterPending, CancelRegisterConfirmed],
            effects: &[],
        },
        TransitionRule {
            event: FraudEvent::CancelRegistration,
            sources: &[RegisterConfirmed],
            target: CancelRegisterPending,
            settled: &[CancelRegisterConfirmed],
            effects: &[Effect::Gateway],
        },
        TransitionRule {
            event: FraudEvent::ConfirmCancelRegistration,
            sources: &[CancelRegisterPending],
            target: CancelRegisterConfirmed,
            settled: &[],
            effects: &[],
        },
        TransitionRule {
            event: FraudEvent::CancelRegistrationRemotely,
            sources: &[RegisterPending, RegisterConfirmed, CancelRegisterPending],
            target: CancelRegisterConfirmed,
            settled: &[],
            effects: &[],
        },
        TransitionRule {
            event: FraudEvent::ConfirmReceive,
            sources: &[ReceivePending],
            target: ReceiveConfirmed,
            settled: &[CancelReceiveConfirmed],
            effects: &[],
        },
        TransitionRule {
            event: FraudEvent::CancelReceived,
            sources: &[ReceivePending, ReceiveConfirmed],
            target: CancelReceiveConfirmed,
            settled: &[],
            effects: &[],
        },
        TransitionRule {
            event: FraudEvent::Fail,
            sources: &[Pending, RegisterPending, CancelRegisterPending, ReceivePending],
            target: Error,
            settled: &[],
            effects: &[],
        },
    ],
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudDetection {
    #[serde(flatten)]
    pub header: Header<FraudState>,
    /// CPF/CNPJ the marker applies to
    pub document: String,
    pub fraud_type: String,
    /// Pix key, when the marker is key-specific
    pub key: Option<String>,
    pub external_id: Option<String>,
    pub failure_reason: Option<String>,
}

impl FraudDetection {
    /// Marker we register, starts in PENDING
    pub fn new(
        key: impl Into<String>,
        document: impl Into<String>,
        fraud_type: impl Into<String>,
        pix_key: Option<String>,
    ) -> Self {
        Self::with_state(Pending, key, document, fraud_type, pix_key)
    }

    /// Marker received from the network, starts in RECEIVE_PENDING
    pub fn received(
        key: impl Into<String>,
        document: impl Into<String>,
        fraud_type: impl Into<String>,
        pix_key: Option<String>,
    ) -> Self {
        Self::with_state(ReceivePending, key, document, fraud_type, pix_key)
    }

    fn with_state(
        state: FraudState,
        key: impl Into<String>,
        document: impl Into<String>,
        fraud_type: impl Into<String>,
        pix_key: Option<String>,
    ) -> Self {
        Self {
            header: Header::new(key, state, 0),
            document: document.into(),
            fraud_type: fraud_type.into(),
            key: pix_key,
            external_id: None,
            failure_reason: None,
        }
    }
}

impl Instrument for FraudDetection {
    type State = FraudState;
    type Event = FraudEvent;

    const KIND: InstrumentKind = InstrumentKind::FraudDetection;

    fn table() -> &'static TransitionTable<FraudState, FraudEvent> {
        &TABLE
    }

    fn header(&self) -> &Header<FraudState> {
        &self.header
    }

    fn header_mut(&mut self) -> &mut Header<FraudState> {
        &mut self.header
    }
}

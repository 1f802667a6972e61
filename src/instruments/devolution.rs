//! Warning Pix Devolution
//!
//! Returns a warned deposit to its payer. The account holding the deposited
//! funds (the client's, or the quarantine of a blocked deposit) is debited
//! before the transfer leaves; a failed devolution reverts that debit.
//!
//! ```text
//! PENDING --submit--> WAITING --confirm--> CONFIRMED
//!    |   (ledger create,  |   (ledger accept)
//!    |    then gateway)   |
//!    +------fail----------+--> FAILED (ledger revert)
//! ```

use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;
use crate::fsm::{
    Effect, Header, Instrument, InstrumentState, LedgerEffect, TransitionEvent, TransitionRule,
    TransitionTable,
};
use crate::ports::ledger::OperationDraft;
use crate::types::{Counterparty, InstrumentId, InstrumentKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DevolutionState {
    Pending,
    Waiting,
    Confirmed,
    Failed,
}

impl InstrumentState for DevolutionState {
    fn as_str(&self) -> &'static str {
        match self {
            DevolutionState::Pending => "PENDING",
            DevolutionState::Waiting => "WAITING",
            DevolutionState::Confirmed => "CONFIRMED",
            DevolutionState::Failed => "FAILED",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, DevolutionState::Confirmed | DevolutionState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevolutionEvent {
    Submit,
    Confirm,
    Fail,
}

impl TransitionEvent for DevolutionEvent {
    fn as_str(&self) -> &'static str {
        match self {
            DevolutionEvent::Submit => "submit",
            DevolutionEvent::Confirm => "confirm",
            DevolutionEvent::Fail => "fail",
        }
    }
}

pub static TABLE: TransitionTable<DevolutionState, DevolutionEvent> = TransitionTable::new(
    InstrumentKind::Devolution,
    &[
        TransitionRule {
            event: DevolutionEvent::Submit,
            sources: &[DevolutionState::Pending],
            target: DevolutionState::Waiting,
            settled: &[DevolutionState::Confirmed],
            effects: &[Effect::Ledger(LedgerEffect::Create), Effect::Gateway],
        },
        TransitionRule {
            event: DevolutionEvent::Confirm,
            sources: &[DevolutionState::Waiting],
            target: DevolutionState::Confirmed,
            settled: &[],
            effects: &[Effect::Ledger(LedgerEffect::Accept)],
        },
        TransitionRule {
            event: DevolutionEvent::Fail,
            sources: &[DevolutionState::Pending, DevolutionState::Waiting],
            target: DevolutionState::Failed,
            settled: &[],
            effects: &[Effect::Ledger(LedgerEffect::Revert)],
        },
    ],
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Devolution {
    #[serde(flatten)]
    pub header: Header<DevolutionState>,
    pub deposit_id: InstrumentId,
    pub warning_id: InstrumentId,
    /// Client the deposit was addressed to
    pub client_account: String,
    /// Debited account, the client's unless the deposit was never credited
    pub funding_account: String,
    /// Original payer, receives the funds back
    pub beneficiary: Counterparty,
    pub original_end_to_end_id: String,
    pub description: Option<String>,
    pub external_ref: Option<String>,
    pub failure_reason: Option<String>,
}

impl Devolution {
    pub fn correlation_key_for(deposit_id: InstrumentId) -> String {
        format!("devolution:{}", deposit_id)
    }

    pub fn new(
        deposit_id: InstrumentId,
        warning_id: InstrumentId,
        amount: u64,
        client_account: impl Into<String>,
        beneficiary: Counterparty,
        original_end_to_end_id: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        let client_account = client_account.into();
        Self {
            header: Header::new(
                Self::correlation_key_for(deposit_id),
                DevolutionState::Pending,
                amount,
            ),
            deposit_id,
            warning_id,
            funding_account: client_account.clone(),
            client_account,
            beneficiary,
            original_end_to_end_id: original_end_to_end_id.into(),
            description,
            external_ref: None,
            failure_reason: None,
        }
    }
}

impl Devolution {
    pub fn funded_from(mut self, account: impl Into<String>) -> Self {
        self.funding_account = account.into();
        self
    }
}

impl Instrument for Devolution {
    type State = DevolutionState;
    type Event = DevolutionEvent;

    const KIND: InstrumentKind = InstrumentKind::Devolution;

    fn table() -> &'static TransitionTable<DevolutionState, DevolutionEvent> {
        &TABLE
    }

    fn header(&self) -> &Header<DevolutionState> {
        &self.header
    }

    fn header_mut(&mut self) -> &mut Header<DevolutionState> {
        &mut self.header
    }

    fn parent_id(&self) -> Option<InstrumentId> {
        Some(self.deposit_id)
    }

    fn ledger_draft(&self, config: &LedgerConfig, _target: DevolutionState) -> Option<OperationDraft> {
        Some(OperationDraft {
            tag: config.tags.devolution.clone(),
            source: Some(self.funding_account.clone()),
            destination: config.settlement_account.clone(),
            description: format!("Pix devolution of {}", self.original_end_to_end_id),
        })
    }
}

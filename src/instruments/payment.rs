//! Pix Payment
//!
//! Outgoing Pix, including chargeback of a confirmed payment.
//!
//! ```text
//! PENDING --submit--> WAITING --confirm--> CONFIRMED --revert--> REVERTED
//!    |                  |
//!    +-------fail-------+--> FAILED
//! ```
//!
//! FAILED and REVERTED dominate each other's triggers: a late `revert` on a
//! failed payment, or a late `fail` on a reverted one, is a no-op.

use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;
use crate::fsm::{
    Effect, Header, Instrument, InstrumentState, LedgerEffect, TransitionEvent, TransitionRule,
    TransitionTable,
};
use crate::ports::ledger::OperationDraft;
use crate::types::{Counterparty, InstrumentKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    Pending,
    Waiting,
    Confirmed,
    Failed,
    Reverted,
}

impl InstrumentState for PaymentState {
    fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "PENDING",
            PaymentState::Waiting => "WAITING",
            PaymentState::Confirmed => "CONFIRMED",
            PaymentState::Failed => "FAILED",
            PaymentState::Reverted => "REVERTED",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, PaymentState::Failed | PaymentState::Reverted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    Submit,
    Confirm,
    Fail,
    Revert,
}

impl TransitionEvent for PaymentEvent {
    fn as_str(&self) -> &'static str {
        match self {
            PaymentEvent::Submit => "submit",
            PaymentEvent::Confirm => "confirm",
            PaymentEvent::Fail => "fail",
            PaymentEvent::Revert => "revert",
        }
    }
}

use PaymentState::*;

pub static TABLE: TransitionTable<PaymentState, PaymentEvent> = TransitionTable::new(
    InstrumentKind::Payment,
    &[
        TransitionRule {
            event: PaymentEvent::Submit,
            sources: &[Pending],
            target: Waiting,
            settled: &[Confirmed, Reverted],
            effects: &[Effect::Ledger(LedgerEffect::Create), Effect::Gateway],
        },
        TransitionRule {
            event: PaymentEvent::Confirm,
            sources: &[Waiting],
            target: Confirmed,
            settled: &[Reverted],
            effects: &[Effect::Ledger(LedgerEffect::Accept)],
        },
        TransitionRule {
            event: PaymentEvent::Fail,
            sources: &[Pending, Waiting],
            target: Failed,
            settled: &[Reverted],
            effects: &[Effect::Ledger(LedgerEffect::Revert)],
        },
        TransitionRule {
            event: PaymentEvent::Revert,
            sources: &[Confirmed],
            target: Reverted,
            settled: &[Failed],
            effects: &[Effect::Ledger(LedgerEffect::Revert)],
        },
    ],
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    #[serde(flatten)]
    pub header: Header<PaymentState>,
    /// Debited client account
    pub source_account: String,
    pub beneficiary: Counterparty,
    pub description: Option<String>,
    pub external_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub chargeback_reason: Option<String>,
}

impl Payment {
    pub fn new(
        end_to_end_id: impl Into<String>,
        amount: u64,
        source_account: impl Into<String>,
        beneficiary: Counterparty,
        description: Option<String>,
    ) -> Self {
        Self {
            header: Header::new(end_to_end_id, Pending, amount),
            source_account: source_account.into(),
            beneficiary,
            description,
            external_ref: None,
            failure_reason: None,
            chargeback_reason: None,
        }
    }
}

impl Instrument for Payment {
    type State = PaymentState;
    type Event = PaymentEvent;

    const KIND: InstrumentKind = InstrumentKind::Payment;

    fn table() -> &'static TransitionTable<PaymentState, PaymentEvent> {
        &TABLE
    }

    fn header(&self) -> &Header<PaymentState> {
        &self.header
    }

    fn header_mut(&mut self) -> &mut Header<PaymentState> {
        &mut self.header
    }

    fn ledger_draft(&self, config: &LedgerConfig, _target: PaymentState) -> Option<OperationDraft> {
        Some(OperationDraft {
            tag: config.tags.payment.clone(),
            source: Some(self.source_account.clone()),
            destination: config.settlement_account.clone(),
            description: format!("Pix payment {}", self.header.correlation_key),
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
    fn test_failed_and_reverted_dominate() {
        assert_eq!(TABLE.evaluate(Failed, PaymentEvent::Revert).unwrap(), Decision::NoOp);
        assert_eq!(TABLE.evaluate(Reverted, PaymentEvent::Fail).unwrap(), Decision::NoOp);
    }

    #[test]
    fn test_confirmed_payment_cannot_fail() {
        assert!(TABLE.evaluate(Confirmed, PaymentEvent::Fail).is_err());
    }
}

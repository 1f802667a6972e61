//! Pix Deposit
//!
//! Incoming Pix credit, keyed by its end-to-end id.
//!
//! ```text
//! NEW --hold--> WAITING --receive--> RECEIVED   (ledger: credit client)
//!  |              |
//!  |              +------block-----> BLOCKED    (ledger: park in quarantine)
//!  +-----fail-----+------fail------> ERROR
//! ```

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
pub enum DepositState {
    New,
    Waiting,
    Received,
    Blocked,
    Error,
}

impl InstrumentState for DepositState {
    fn as_str(&self) -> &'static str {
        match self {
            DepositState::New => "NEW",
            DepositState::Waiting => "WAITING",
            DepositState::Received => "RECEIVED",
            DepositState::Blocked => "BLOCKED",
            DepositState::Error => "ERROR",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            DepositState::Received | DepositState::Blocked | DepositState::Error
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositEvent {
    Hold,
    Receive,
    Block,
    Fail,
}

impl TransitionEvent for DepositEvent {
    fn as_str(&self) -> &'static str {
        match self {
            DepositEvent::Hold => "hold",
            DepositEvent::Receive => "receive",
            DepositEvent::Block => "block",
            DepositEvent::Fail => "fail",
        }
    }
}

use DepositState::*;

pub static TABLE: TransitionTable<DepositState, DepositEvent> = TransitionTable::new(
    InstrumentKind::Deposit,
    &[
        TransitionRule {
            event: DepositEvent::Hold,
            sources: &[New],
            target: Waiting,
            settled: &[Received, Blocked],
            effects: &[],
        },
        TransitionRule {
            event: DepositEvent::Receive,
            sources: &[Waiting],
            target: Received,
            settled: &[],
            effects: &[Effect::Ledger(LedgerEffect::Create)],
        },
        TransitionRule {
            event: DepositEvent::Block,
            sources: &[Waiting],
            target: Blocked,
            settled: &[],
            effects: &[Effect::Ledger(LedgerEffect::Create)],
        },
        TransitionRule {
            event: DepositEvent::Fail,
            sources: &[New, Waiting],
            target: Error,
            settled: &[],
            effects: &[],
        },
    ],
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    #[serde(flatten)]
    pub header: Header<DepositState>,
    pub payer: Counterparty,
    /// Client account credited on receipt
    pub client_account: String,
    pub description: Option<String>,
    pub failure_reason: Option<String>,
}

impl Deposit {
    pub fn new(
        end_to_end_id: impl Into<String>,
        amount: u64,
        payer: Counterparty,
        client_account: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            header: Header::new(end_to_end_id, New, amount),
            payer,
            client_account: client_account.into(),
            description,
            failure_reason: None,
        }
    }

    pub fn end_to_end_id(&self) -> &str {
        &self.header.correlation_key
    }

    /// Account holding the deposited funds once the deposit is terminal
    pub fn funds_account<'a>(&'a self, config: &'a LedgerConfig) -> Option<&'a str> {
        match self.header.state {
            Received => Some(self.client_account.as_str()),
            Blocked => Some(config.blocked_account.as_str()),
            _ => None,
        }
    }
}

impl Instrument for Deposit {
    type State = DepositState;
    type Event = DepositEvent;

    const KIND: InstrumentKind = InstrumentKind::Deposit;

    fn table() -> &'static TransitionTable<DepositState, DepositEvent> {
        &TABLE
    }

    fn header(&self) -> &Header<DepositState> {
        &self.header
    }

    fn header_mut(&mut self) -> &mut Header<DepositState> {
        &mut self.header
    }

    /// Receiving credits the client; blocking parks the funds in quarantine
    /// so the client never sees them.
    fn ledger_draft(&self, config: &LedgerConfig, target: DepositState) -> Option<OperationDraft> {
        let (tag, destination) = match target {
            Received => (&config.tags.deposit_received, &self.client_account),
            Blocked => (&config.tags.deposit_blocked, &config.blocked_account),
            _ => return None,
        };
        Some(OperationDraft {
            tag: tag.clone(),
            source: None,
            destination: destination.clone(),
            description: format!("Pix deposit {}", self.end_to_end_id()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::fsm::Decision;

    #[test]
    fn test_table_is_well_formed() {
        TABLE.validate().unwrap();
    }

    #[test]
    fn test_block_requires_waiting() {
        let err = TABLE.evaluate(Received, DepositEvent::Block).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid state for PIX_DEPOSIT 'block': current RECEIVED, expected one of [WAITING]"
        );
        assert!(matches!(err, EngineError::InvalidState { .. }));
    }

    #[test]
    fn test_hold_is_settled_once_received() {
        assert_eq!(
            TABLE.evaluate(Received, DepositEvent::Hold).unwrap(),
            Decision::NoOp
        );
    }

    #[test]
    fn test_draft_credits_client_account() {
        let deposit = Deposit::new("E2E1", 1_000, Counterparty::default(), "acc-1", None);
        let draft = deposit.ledger_draft(&LedgerConfig::default(), Received).unwrap();
        assert_eq!(draft.source, None);
        assert_eq!(draft.destination, "acc-1");
    }

    #[test]
    fn test_blocked_funds_never_reach_client() {
        let config = LedgerConfig::default();
        let mut deposit = Deposit::new("E2E2", 1_000, Counterparty::default(), "acc-1", None);
        let draft = deposit.ledger_draft(&config, Blocked).unwrap();
        assert_eq!(draft.destination, config.blocked_account);
        assert_eq!(draft.tag, config.tags.deposit_blocked);

        assert_eq!(deposit.funds_account(&config), None);
        deposit.header.state = Blocked;
        assert_eq!(deposit.funds_account(&config), Some("pix-blocked"));
    }
}

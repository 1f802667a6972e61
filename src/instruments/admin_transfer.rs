//! Administrative TED
//!
//! Transfer between institution-owned accounts, sent through the settlement
//! network with a callback URL for the final status.
//!
//! ```text
//! PENDING --send--> WAITING --confirm--> CONFIRMED
//!    |                 |
//!    +------fail-------+--> FAILED
//! ```

use serde::{Deserialize, Serialize};

use crate::fsm::{
    Effect, Header, Instrument, InstrumentState, TransitionEvent, TransitionRule, TransitionTable,
};
use crate::types::{Counterparty, InstrumentKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminTransferState {
    Pending,
    Waiting,
    Confirmed,
    Failed,
}

impl InstrumentState for AdminTransferState {
    fn as_str(&self) -> &'static str {
        match self {
            AdminTransferState::Pending => "PENDING",
            AdminTransferState::Waiting => "WAITING",
            AdminTransferState::Confirmed => "CONFIRMED",
            AdminTransferState::Failed => "FAILED",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, AdminTransferState::Confirmed | AdminTransferState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminTransferEvent {
    Send,
    Confirm,
    Fail,
}

impl TransitionEvent for AdminTransferEvent {
    fn as_str(&self) -> &'static str {
        match self {
            AdminTransferEvent::Send => "send",
            AdminTransferEvent::Confirm => "confirm",
            AdminTransferEvent::Fail => "fail",
        }
    }
}

pub static TABLE: TransitionTable<AdminTransferState, AdminTransferEvent> = TransitionTable::new(
    InstrumentKind::AdminTransfer,
    &[
        TransitionRule {
            event: AdminTransferEvent::Send,
            sources: &[AdminTransferState::Pending],
            target: AdminTransferState::Waiting,
            settled: &[AdminTransferState::Confirmed],
            effects: &[Effect::Gateway],
        },
        TransitionRule {
            event: AdminTransferEvent::Confirm,
            sources: &[AdminTransferState::Waiting],
            target: AdminTransferState::Confirmed,
            settled: &[],
            effects: &[],
        },
        TransitionRule {
            event: AdminTransferEvent::Fail,
            sources: &[AdminTransferState::Pending, AdminTransferState::Waiting],
            target: AdminTransferState::Failed,
            settled: &[],
            effects: &[],
        },
    ],
);

/// Institution account with its banking coordinates
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdminAccount {
    pub id: String,
    pub holder: Counterparty,
}

/// Settlement report for a TED, compared field by field with the request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferConfirmation {
    pub amount: u64,
    pub bank_code: String,
    pub branch: String,
    pub account_number: String,
    pub account_type: String,
}

fn zero_pad(value: &str, width: usize) -> String {
    format!("{:0>width$}", value.trim(), width = width)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminTransfer {
    #[serde(flatten)]
    pub header: Header<AdminTransferState>,
    pub source: AdminAccount,
    pub destination: AdminAccount,
    pub description: Option<String>,
    pub external_ref: Option<String>,
    pub failure_reason: Option<String>,
}

impl AdminTransfer {
    pub fn new(
        key: impl Into<String>,
        amount: u64,
        source: AdminAccount,
        destination: AdminAccount,
        description: Option<String>,
    ) -> Self {
        Self {
            header: Header::new(key, AdminTransferState::Pending, amount),
            source,
            destination,
            description,
            external_ref: None,
            failure_reason: None,
        }
    }

    /// Names of the fields where `confirmation` disagrees with the request.
    ///
    /// Bank codes are compared zero-padded to 3 digits, branches to 4, account
    /// types case-insensitively.
    pub fn mismatches(&self, confirmation: &TransferConfirmation) -> Vec<&'static str> {
        let expected = &self.destination.holder;
        let mut fields = Vec::new();

        if confirmation.amount != self.header.amount {
            fields.push("amount");
        }
        if zero_pad(&confirmation.bank_code, 3) != zero_pad(&expected.bank_code, 3) {
            fields.push("bank_code");
        }
        if zero_pad(&confirmation.branch, 4) != zero_pad(&expected.branch, 4) {
            fields.push("branch");
        }
        if confirmation.account_number.trim() != expected.account_number.trim() {
            fields.push("account_number");
        }
        if confirmation.account_type.trim().to_lowercase()
            != expected.account_type.trim().to_lowercase()
        {
            fields.push("account_type");
        }

        fields
    }
}

impl Instrument for AdminTransfer {
    type State = AdminTransferState;
    type Event = AdminTransferEvent;

    const KIND: InstrumentKind = InstrumentKind::AdminTransfer;

    fn table() -> &'static TransitionTable<AdminTransferState, AdminTransferEvent> {
        &TABLE
    }

    fn header(&self) -> &Header<AdminTransferState> {
        &self.header
    }

    fn header_mut(&mut self) -> &mut Header<AdminTransferState> {
        &mut self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer() -> AdminTransfer {
        let holder = Counterparty {
            name: Some("Treasury".into()),
            document: "12345678000190".into(),
            bank_code: "1".into(),
            branch: "42".into(),
            account_number: "99887".into(),
            account_type: "CHECKING".into(),
        };
        AdminTransfer::new(
            "TED-1",
            50_000,
            AdminAccount { id: "src".into(), holder: Counterparty::default() },
            AdminAccount { id: "dst".into(), holder },
            None,
        )
    }

    #[test]
    fn test_table_is_well_formed() {
        TABLE.validate().unwrap();
    }

    #[test]
    fn test_normalized_fields_match() {
        let confirmation = TransferConfirmation {
            amount: 50_000,
            bank_code: "001".into(),
            branch: "0042".into(),
            account_number: "99887".into(),
            account_type: "checking".into(),
        };
        assert!(transfer().mismatches(&confirmation).is_empty());
    }

    #[test]
    fn test_every_mismatch_is_reported() {
        let confirmation = TransferConfirmation {
            amount: 49_999,
            bank_code: "237".into(),
            branch: "0042".into(),
            account_number: "99887".into(),
            account_type: "savings".into(),
        };
        assert_eq!(
            transfer().mismatches(&confirmation),
            vec!["amount", "bank_code", "account_type"]
        );
    }
}

//! Core Types
//!
//! Identifiers and value objects shared by every instrument.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Instrument ID - ULID-based unique identifier
///
/// Assigned once at creation, never reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(ulid::Ulid);

impl InstrumentId {
    /// Generate a new unique InstrumentId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Get the inner ULID value
    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for InstrumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InstrumentId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Namespace for operation references derived from instruments.
const OPERATION_NAMESPACE: Uuid = Uuid::from_u128(0x5f1c_2b8e_7d3a_4e61_9c0f_a4b7_e2d9_1c35);

/// Reference to a ledger operation owned by the external ledger.
///
/// Every monetary instrument owns exactly one operation whose reference is
/// derived from `(kind, id)`, so a retried "create" names the same operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationRef(Uuid);

impl OperationRef {
    pub fn for_instrument(kind: InstrumentKind, id: InstrumentId) -> Self {
        let name = format!("{}:{}", kind.as_str(), id);
        Self(Uuid::new_v5(&OPERATION_NAMESPACE, name.as_bytes()))
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for OperationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Instrument kind, used for event topics, logging and derived references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstrumentKind {
    Deposit,
    DepositWarning,
    Devolution,
    Payment,
    Infraction,
    RefundLink,
    Refund,
    FraudDetection,
    AdminTransfer,
}

impl InstrumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentKind::Deposit => "PIX_DEPOSIT",
            InstrumentKind::DepositWarning => "WARNING_PIX_DEPOSIT",
            InstrumentKind::Devolution => "WARNING_PIX_DEVOLUTION",
            InstrumentKind::Payment => "PIX_PAYMENT",
            InstrumentKind::Infraction => "PIX_INFRACTION",
            InstrumentKind::RefundLink => "PIX_INFRACTION_REFUND_OPERATION",
            InstrumentKind::Refund => "PIX_REFUND",
            InstrumentKind::FraudDetection => "PIX_FRAUD_DETECTION",
            InstrumentKind::AdminTransfer => "ADMIN_BANKING_TED",
        }
    }

    /// Prefix for emitted event topics, e.g. `pix_deposit.blocked`
    pub fn topic(&self) -> String {
        self.as_str().to_lowercase()
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The other side of a transfer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counterparty {
    pub name: Option<String>,
    /// CPF/CNPJ
    pub document: String,
    /// ISPB for Pix participants, COMPE code for TED
    pub bank_code: String,
    pub branch: String,
    pub account_number: String,
    pub account_type: String,
}

//! Engine Error Types
//!
//! One taxonomy for every use case. Codes are stable so callers can map them
//! onto their own transport (HTTP status, message redelivery, alerting).

use std::time::Duration;

use thiserror::Error;

use crate::types::InstrumentKind;

/// Engine error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    // === Validation Errors ===
    #[error("Missing required field(s): {}", .fields.join(", "))]
    MissingRequiredField { fields: Vec<&'static str> },

    #[error("Source and destination account cannot be the same: {account}")]
    SameAccount { account: String },

    #[error("Counterparty account {account} is not active ({reason})")]
    CounterpartyNotActive { account: String, reason: String },

    #[error("Confirmation does not match the transfer request (fields: {})", .fields.join(", "))]
    ConfirmationMismatch { fields: Vec<&'static str> },

    // === State Errors ===
    #[error("{kind} not found: {key}")]
    InstrumentNotFound { kind: InstrumentKind, key: String },

    #[error(
        "Invalid state for {kind} '{event}': current {current}, expected one of [{}]",
        .expected.join(", ")
    )]
    InvalidState {
        kind: InstrumentKind,
        event: &'static str,
        current: &'static str,
        expected: Vec<&'static str>,
    },

    #[error("{kind} has no transition named '{event}'")]
    UnsupportedEvent {
        kind: InstrumentKind,
        event: &'static str,
    },

    #[error("{kind} {id} was modified concurrently ({attempts} attempts)")]
    ConcurrentModification {
        kind: InstrumentKind,
        id: String,
        attempts: u32,
    },

    // === Collaborator Errors ===
    #[error("Settlement gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Settlement gateway timed out after {after:?}")]
    GatewayTimeout { after: Duration },

    #[error("Ledger inconsistency: {0}")]
    LedgerInconsistency(String),

    #[error("Repository error: {0}")]
    Repository(String),

    // === System Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal system error: {0}")]
    System(String),
}

impl EngineError {
    pub fn missing(field: &'static str) -> Self {
        EngineError::MissingRequiredField {
            fields: vec![field],
        }
    }

    pub fn not_found(kind: InstrumentKind, key: impl ToString) -> Self {
        EngineError::InstrumentNotFound {
            kind,
            key: key.to_string(),
        }
    }

    /// Get the error code for callers
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::MissingRequiredField { .. } => "MISSING_REQUIRED_FIELD",
            EngineError::SameAccount { .. } => "SAME_ACCOUNT",
            EngineError::CounterpartyNotActive { .. } => "COUNTERPARTY_NOT_ACTIVE",
            EngineError::ConfirmationMismatch { .. } => "CONFIRMATION_MISMATCH",
            EngineError::InstrumentNotFound { .. } => "INSTRUMENT_NOT_FOUND",
            EngineError::InvalidState { .. } => "INVALID_STATE",
            EngineError::UnsupportedEvent { .. } => "UNSUPPORTED_EVENT",
            EngineError::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            EngineError::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            EngineError::GatewayTimeout { .. } => "GATEWAY_TIMEOUT",
            EngineError::LedgerInconsistency(_) => "LEDGER_INCONSISTENCY",
            EngineError::Repository(_) => "REPOSITORY_ERROR",
            EngineError::Config(_) => "CONFIG_ERROR",
            EngineError::System(_) => "SYSTEM_ERROR",
        }
    }

    /// Whether redelivering the same trigger may succeed.
    ///
    /// The engine never retries on its own; this only informs the caller's
    /// redelivery policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::GatewayUnavailable(_)
                | EngineError::GatewayTimeout { .. }
                | EngineError::ConcurrentModification { .. }
                | EngineError::Repository(_)
        )
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(e: serde_yaml::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}

//! Ledger Port
//!
//! Interface to the external double-entry operation service. A reversal is a
//! new operation on the ledger side referencing the original; the original is
//! never mutated beyond its state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::OperationRef;

/// Instrument-specific part of a ledger posting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDraft {
    pub tag: String,
    /// Debited account, None for money entering from the network
    pub source: Option<String>,
    pub destination: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    /// Idempotency key: creating the same id twice must not post twice
    pub id: OperationRef,
    pub tag: String,
    pub amount: u64,
    pub currency: String,
    pub source: Option<String>,
    pub destination: String,
    pub description: String,
}

impl OperationRequest {
    pub fn from_draft(id: OperationRef, amount: u64, currency: &str, draft: OperationDraft) -> Self {
        Self {
            id,
            tag: draft.tag,
            amount,
            currency: currency.to_string(),
            source: draft.source,
            destination: draft.destination,
            description: draft.description,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationState {
    Pending,
    Accepted,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationRef,
    pub tag: String,
    pub amount: u64,
    pub currency: String,
    pub source: Option<String>,
    pub destination: String,
    pub state: OperationState,
    /// Reversal operation, once reverted
    pub reverted_by: Option<OperationRef>,
}

#[async_trait]
pub trait LedgerPort: Send + Sync {
    async fn create_operation(&self, request: OperationRequest) -> Result<OperationRef, EngineError>;

    async fn accept_operation(&self, id: &OperationRef) -> Result<(), EngineError>;

    async fn revert_operation(&self, id: &OperationRef) -> Result<(), EngineError>;

    async fn get_operation(&self, id: &OperationRef) -> Result<Option<Operation>, EngineError>;
}

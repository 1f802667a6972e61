//! Settlement Gateway Port
//!
//! Interface to the PSP / settlement network. Every call is a synchronous
//! request/response; the engine bounds each call with a timeout and never
//! retries internally. Implementations must be idempotent on
//! `correlation_key` so that a redelivered trigger cannot settle twice.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::instruments::infraction::AnalysisResult;
use crate::types::{Counterparty, InstrumentKind};

// ============================================================================
// Requests
// ============================================================================

/// Outbound transfer: payments, devolutions and administrative TEDs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOrder {
    pub kind: InstrumentKind,
    pub correlation_key: String,
    pub amount: u64,
    pub source_account: String,
    pub beneficiary: Counterparty,
    pub description: Option<String>,
    /// Where the PSP reports the final status
    pub callback_url: String,
    /// End-to-end id of the operation being returned (devolutions)
    pub original_end_to_end_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub external_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfractionRequest {
    pub correlation_key: String,
    pub external_id: Option<String>,
    pub operation_id: String,
    pub infraction_type: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseInfractionRequest {
    pub correlation_key: String,
    pub external_id: Option<String>,
    pub analysis_result: AnalysisResult,
    pub analysis_details: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRefundRequest {
    pub correlation_key: String,
    pub operation_id: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRefundRequest {
    pub correlation_key: String,
    pub rejection_reason: String,
    pub analysis_details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudDetectionRequest {
    pub correlation_key: String,
    pub external_id: Option<String>,
    pub document: String,
    pub fraud_type: String,
    pub key: Option<String>,
}

/// Acknowledgement of a non-transfer request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GatewayAck {
    /// Network-side identifier, when the network assigns one
    pub external_id: Option<String>,
    pub status: String,
}

// ============================================================================
// Reconciliation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl ReconciliationWindow {
    /// Window of `lookback` ending at `now`
    pub fn ending_at(now: DateTime<Utc>, lookback: std::time::Duration) -> Self {
        let lookback = TimeDelta::from_std(lookback).unwrap_or(TimeDelta::MAX);
        Self {
            from: now.checked_sub_signed(lookback).unwrap_or(DateTime::<Utc>::MIN_UTC),
            to: now,
        }
    }
}

/// Status of one instrument as reported by the network.
///
/// Fields are raw strings; the reconciliation loop parses and validates them
/// per kind and reports anything it cannot interpret as an anomaly.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub correlation_key: String,
    pub status: String,
    pub external_id: Option<String>,
    /// Decimal string, e.g. "5.00"
    pub amount: Option<String>,
    /// End-to-end id of the operation the record is about
    pub operation_id: Option<String>,
    /// Correlation key of a related instrument (the infraction of a refund)
    pub related_key: Option<String>,
    pub analysis_result: Option<String>,
    pub infraction_type: Option<String>,
    pub reason: Option<String>,
    pub document: Option<String>,
    pub fraud_type: Option<String>,
    pub key: Option<String>,
    pub description: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A record the gateway could not fetch or decode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFetchError {
    pub correlation_key: Option<String>,
    pub reason: String,
}

pub type RemoteEntry = Result<RemoteRecord, RemoteFetchError>;

// ============================================================================
// Port
// ============================================================================

#[async_trait]
pub trait SettlementGateway: Send + Sync {
    async fn create_transfer(&self, order: TransferOrder) -> Result<TransferReceipt, EngineError>;

    async fn open_infraction(&self, request: InfractionRequest) -> Result<GatewayAck, EngineError>;

    async fn acknowledge_infraction(
        &self,
        request: InfractionRequest,
    ) -> Result<GatewayAck, EngineError>;

    async fn close_infraction(
        &self,
        request: CloseInfractionRequest,
    ) -> Result<GatewayAck, EngineError>;

    async fn cancel_infraction(&self, request: InfractionRequest)
    -> Result<GatewayAck, EngineError>;

    async fn close_refund(&self, request: CloseRefundRequest) -> Result<GatewayAck, EngineError>;

    async fn cancel_refund(&self, request: CancelRefundRequest) -> Result<GatewayAck, EngineError>;

    async fn register_fraud_detection(
        &self,
        request: FraudDetectionRequest,
    ) -> Result<GatewayAck, EngineError>;

    async fn cancel_fraud_detection(
        &self,
        request: FraudDetectionRequest,
    ) -> Result<GatewayAck, EngineError>;

    /// Records of `kind` updated within `window`.
    ///
    /// An `Err` entry stands for a single record that failed; an `Err` result
    /// means nothing could be fetched.
    async fn get_remote_statuses(
        &self,
        kind: InstrumentKind,
        window: ReconciliationWindow,
    ) -> Result<Vec<RemoteEntry>, EngineError>;
}

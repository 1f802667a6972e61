//! Scriptable mock adapters
//!
//! Ledger, gateway, account directory and emitter doubles that record every
//! call and can be told to fail. Available in tests and behind the `mock-api`
//! feature for local runs without a PSP.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::EngineError;
use crate::ports::gateway::{
    CancelRefundRequest, CloseInfractionRequest, CloseRefundRequest, FraudDetectionRequest,
    GatewayAck, InfractionRequest, RemoteEntry, ReconciliationWindow, SettlementGateway,
    TransferOrder, TransferReceipt,
};
use crate::ports::ledger::{LedgerPort, Operation, OperationRequest, OperationState};
use crate::ports::{AccountDirectory, AccountStatus, EventEmitter, InstrumentEvent, Ports};
use crate::types::{InstrumentKind, OperationRef};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Ledger
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerCall {
    Create,
    Accept,
    Revert,
}

#[derive(Default)]
pub struct MockLedger {
    operations: DashMap<OperationRef, Operation>,
    create_calls: AtomicUsize,
    accept_calls: AtomicUsize,
    revert_calls: AtomicUsize,
    /// Fails every call of a kind
    failing_calls: DashMap<LedgerCall, EngineError>,
    /// Fails every mutating call on one operation
    failing_operations: DashMap<OperationRef, EngineError>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_calls(&self, call: LedgerCall, error: EngineError) {
        self.failing_calls.insert(call, error);
    }

    pub fn fail_operation(&self, id: OperationRef, error: EngineError) {
        self.failing_operations.insert(id, error);
    }

    pub fn clear_failures(&self) {
        self.failing_calls.clear();
        self.failing_operations.clear();
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn accept_calls(&self) -> usize {
        self.accept_calls.load(Ordering::SeqCst)
    }

    pub fn revert_calls(&self) -> usize {
        self.revert_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.create_calls() + self.accept_calls() + self.revert_calls()
    }

    pub fn operation(&self, id: &OperationRef) -> Option<Operation> {
        self.operations.get(id).map(|e| e.value().clone())
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.operations.iter().map(|e| e.value().clone()).collect()
    }

    fn check(&self, call: LedgerCall, id: &OperationRef) -> Result<(), EngineError> {
        if let Some(err) = self.failing_calls.get(&call) {
            return Err(err.value().clone());
        }
        if let Some(err) = self.failing_operations.get(id) {
            return Err(err.value().clone());
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerPort for MockLedger {
    async fn create_operation(&self, request: OperationRequest) -> Result<OperationRef, EngineError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check(LedgerCall::Create, &request.id)?;

        self.operations.entry(request.id).or_insert_with(|| Operation {
            id: request.id,
            tag: request.tag.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
            source: request.source.clone(),
            destination: request.destination.clone(),
            state: OperationState::Pending,
            reverted_by: None,
        });
        Ok(request.id)
    }

    async fn accept_operation(&self, id: &OperationRef) -> Result<(), EngineError> {
        self.accept_calls.fetch_add(1, Ordering::SeqCst);
        self.check(LedgerCall::Accept, id)?;

        let mut op = self
            .operations
            .get_mut(id)
            .ok_or_else(|| EngineError::LedgerInconsistency(format!("unknown operation {}", id)))?;
        if op.state == OperationState::Reverted {
            return Err(EngineError::LedgerInconsistency(format!(
                "operation {} is reverted",
                id
            )));
        }
        op.state = OperationState::Accepted;
        Ok(())
    }

    async fn revert_operation(&self, id: &OperationRef) -> Result<(), EngineError> {
        self.revert_calls.fetch_add(1, Ordering::SeqCst);
        self.check(LedgerCall::Revert, id)?;

        let mut op = self
            .operations
            .get_mut(id)
            .ok_or_else(|| EngineError::LedgerInconsistency(format!("unknown operation {}", id)))?;
        if op.state != OperationState::Reverted {
            op.state = OperationState::Reverted;
            op.reverted_by = Some(OperationRef::from_uuid(Uuid::new_v4()));
        }
        Ok(())
    }

    async fn get_operation(&self, id: &OperationRef) -> Result<Option<Operation>, EngineError> {
        Ok(self.operation(id))
    }
}

// ============================================================================
// Gateway
// ============================================================================

pub struct MockGateway {
    calls: DashMap<&'static str, usize>,
    failing: DashMap<&'static str, EngineError>,
    delay_ms: AtomicU64,
    transfers: Mutex<Vec<TransferOrder>>,
    remote: DashMap<InstrumentKind, Vec<RemoteEntry>>,
    fetch_failures: DashMap<InstrumentKind, EngineError>,
    sequence: AtomicU64,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            calls: DashMap::new(),
            failing: DashMap::new(),
            delay_ms: AtomicU64::new(0),
            transfers: Mutex::new(Vec::new()),
            remote: DashMap::new(),
            fetch_failures: DashMap::new(),
            sequence: AtomicU64::new(1),
        }
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `method` fail, e.g. `"create_transfer"`
    pub fn fail(&self, method: &'static str, error: EngineError) {
        self.failing.insert(method, error);
    }

    pub fn clear_failures(&self) {
        self.failing.clear();
        self.fetch_failures.clear();
    }

    /// Delay every call, to exercise timeouts
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_remote(&self, kind: InstrumentKind, entries: Vec<RemoteEntry>) {
        self.remote.insert(kind, entries);
    }

    pub fn fail_fetch(&self, kind: InstrumentKind, error: EngineError) {
        self.fetch_failures.insert(kind, error);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.get(method).map(|c| *c.value()).unwrap_or(0)
    }

    /// Calls excluding status fetches
    pub fn total_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|e| *e.key() != "get_remote_statuses")
            .map(|e| *e.value())
            .sum()
    }

    pub fn transfers(&self) -> Vec<TransferOrder> {
        lock(&self.transfers).clone()
    }

    async fn record(&self, method: &'static str) -> Result<(), EngineError> {
        *self.calls.entry(method).or_insert(0) += 1;

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        match self.failing.get(method) {
            Some(err) => Err(err.value().clone()),
            None => Ok(()),
        }
    }

    fn ack(&self, external_id: Option<String>) -> GatewayAck {
        let external_id =
            external_id.or_else(|| Some(format!("EXT{}", self.sequence.fetch_add(1, Ordering::SeqCst))));
        GatewayAck {
            external_id,
            status: "OK".to_string(),
        }
    }
}

#[async_trait]
impl SettlementGateway for MockGateway {
    async fn create_transfer(&self, order: TransferOrder) -> Result<TransferReceipt, EngineError> {
        self.record("create_transfer").await?;
        let external_ref = format!("PSP{}", self.sequence.fetch_add(1, Ordering::SeqCst));
        lock(&self.transfers).push(order);
        Ok(TransferReceipt { external_ref })
    }

    async fn open_infraction(&self, request: InfractionRequest) -> Result<GatewayAck, EngineError> {
        self.record("open_infraction").await?;
        Ok(self.ack(request.external_id))
    }

    async fn acknowledge_infraction(
        &self,
        request: InfractionRequest,
    ) -> Result<GatewayAck, EngineError> {
        self.record("acknowledge_infraction").await?;
        Ok(self.ack(request.external_id))
    }

    async fn close_infraction(
        &self,
        request: CloseInfractionRequest,
    ) -> Result<GatewayAck, EngineError> {
        self.record("close_infraction").await?;
        Ok(self.ack(request.external_id))
    }

    async fn cancel_infraction(
        &self,
        request: InfractionRequest,
    ) -> Result<GatewayAck, EngineError> {
        self.record("cancel_infraction").await?;
        Ok(self.ack(request.external_id))
    }

    async fn close_refund(&self, _request: CloseRefundRequest) -> Result<GatewayAck, EngineError> {
        self.record("close_refund").await?;
        Ok(self.ack(None))
    }

    async fn cancel_refund(&self, _request: CancelRefundRequest) -> Result<GatewayAck, EngineError> {
        self.record("cancel_refund").await?;
        Ok(self.ack(None))
    }

    async fn register_fraud_detection(
        &self,
        request: FraudDetectionRequest,
    ) -> Result<GatewayAck, EngineError> {
        self.record("register_fraud_detection").await?;
        Ok(self.ack(request.external_id))
    }

    async fn cancel_fraud_detection(
        &self,
        request: FraudDetectionRequest,
    ) -> Result<GatewayAck, EngineError> {
        self.record("cancel_fraud_detection").await?;
        Ok(self.ack(request.external_id))
    }

    async fn get_remote_statuses(
        &self,
        kind: InstrumentKind,
        _window: ReconciliationWindow,
    ) -> Result<Vec<RemoteEntry>, EngineError> {
        self.record("get_remote_statuses").await?;
        if let Some(err) = self.fetch_failures.get(&kind) {
            return Err(err.value().clone());
        }
        Ok(self.remote.get(&kind).map(|e| e.value().clone()).unwrap_or_default())
    }
}

// ============================================================================
// Accounts
// ============================================================================

#[derive(Default)]
pub struct MockAccounts {
    accounts: DashMap<String, bool>,
}

impl MockAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: &str, active: bool) {
        self.accounts.insert(id.to_string(), active);
    }

    pub fn with_active(ids: &[&str]) -> Self {
        let accounts = Self::new();
        for id in ids {
            accounts.set(id, true);
        }
        accounts
    }
}

#[async_trait]
impl AccountDirectory for MockAccounts {
    async fn get_account(&self, id: &str) -> Result<Option<AccountStatus>, EngineError> {
        Ok(self.accounts.get(id).map(|e| AccountStatus {
            id: id.to_string(),
            active: *e.value(),
        }))
    }
}

// ============================================================================
// Emitter
// ============================================================================

#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<InstrumentEvent>>,
    failing: AtomicBool,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emission errors are swallowed by the engine; events are not recorded
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<InstrumentEvent> {
        lock(&self.events).clone()
    }

    pub fn topics(&self) -> Vec<String> {
        lock(&self.events).iter().map(|e| e.topic.clone()).collect()
    }

    pub fn count(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn count_topic(&self, topic: &str) -> usize {
        lock(&self.events).iter().filter(|e| e.topic == topic).count()
    }
}

#[async_trait]
impl EventEmitter for RecordingEmitter {
    async fn emit(&self, event: &InstrumentEvent) -> Result<(), EngineError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::System("broker unavailable".to_string()));
        }
        lock(&self.events).push(event.clone());
        Ok(())
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// All mocks, kept typed so tests can script and inspect them
#[derive(Clone, Default)]
pub struct MockPorts {
    pub ledger: Arc<MockLedger>,
    pub gateway: Arc<MockGateway>,
    pub emitter: Arc<RecordingEmitter>,
    pub accounts: Arc<MockAccounts>,
}

impl MockPorts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active_accounts(ids: &[&str]) -> Self {
        Self {
            accounts: Arc::new(MockAccounts::with_active(ids)),
            ..Self::default()
        }
    }

    pub fn ports(&self) -> Ports {
        Ports {
            ledger: self.ledger.clone(),
            gateway: self.gateway.clone(),
            emitter: self.emitter.clone(),
            accounts: self.accounts.clone(),
        }
    }
}

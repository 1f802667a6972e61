//! Ports
//!
//! Contracts the engine requires from its collaborators. Everything behind a
//! port (persistence, ledger service, PSP, message bus, lock store) is outside
//! the engine; see `adapters` for the in-process implementations.

pub mod accounts;
pub mod events;
pub mod gateway;
pub mod ledger;
pub mod lease;
pub mod repository;

use std::sync::Arc;

pub use accounts::{AccountDirectory, AccountStatus};
pub use events::{EventEmitter, InstrumentEvent};
pub use gateway::{RemoteEntry, RemoteRecord, ReconciliationWindow, SettlementGateway};
pub use ledger::{LedgerPort, Operation, OperationRequest, OperationState};
pub use lease::{Lease, LeaseProvider};
pub use repository::{InstrumentRepository, Page};

/// Collaborators shared by every instrument kind
#[derive(Clone)]
pub struct Ports {
    pub ledger: Arc<dyn LedgerPort>,
    pub gateway: Arc<dyn SettlementGateway>,
    pub emitter: Arc<dyn EventEmitter>,
    pub accounts: Arc<dyn AccountDirectory>,
}

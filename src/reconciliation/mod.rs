//! Reconciliation
//!
//! - `remote`: remote status parsing and event planning (pure)
//! - `sync`: one pass over the lookback window
//! - `worker`: lease-guarded periodic trigger

pub mod remote;
pub mod sync;
pub mod worker;

pub use sync::{Anomaly, ReconciliationReport, ReconciliationService, RecordFailure};
pub use worker::ReconciliationWorker;

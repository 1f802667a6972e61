//! Instrument kinds
//!
//! One module per kind: its states, events, static transition table and the
//! instrument struct itself.

pub mod admin_transfer;
pub mod deposit;
pub mod devolution;
pub mod fraud;
pub mod infraction;
pub mod payment;
pub mod refund;
pub mod refund_link;
pub mod warning;

pub use admin_transfer::{AdminAccount, AdminTransfer, AdminTransferEvent, AdminTransferState, TransferConfirmation};
pub use deposit::{Deposit, DepositEvent, DepositState};
pub use devolution::{Devolution, DevolutionEvent, DevolutionState};
pub use fraud::{FraudDetection, FraudEvent, FraudState};
pub use infraction::{AnalysisResult, Infraction, InfractionEvent, InfractionOrigin, InfractionState};
pub use payment::{Payment, PaymentEvent, PaymentState};
pub use refund::{Refund, RefundEvent, RefundState};
pub use refund_link::{LinkClosure, LinkEvent, LinkState, RefundLink};
pub use warning::{DepositWarning, WarningEvent, WarningState};

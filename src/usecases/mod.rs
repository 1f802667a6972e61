//! Use cases
//!
//! One service per instrument family. Every operation:
//! 1. validates its inbound patch with the guard,
//! 2. checks domain preconditions (account activity, related instruments),
//! 3. hands the transition to the runner with its gateway bindings,
//!
//! all inside the span of the caller's `Context`.

pub mod admin_transfer;
pub mod deposit;
pub mod devolution;
pub mod fraud;
pub mod infraction;
pub mod payment;
pub mod refund;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::fsm::{Instrument, Transition, TransitionHooks};

pub use admin_transfer::{AdminTransferService, NewAdminTransfer};
pub use deposit::{DepositService, NewDeposit, NewDevolution, NewWarning};
pub use devolution::DevolutionService;
pub use fraud::{FraudDetectionService, NewFraudDetection};
pub use infraction::{CloseInfraction, InfractionService, NewInfraction, NewRefundOperation};
pub use payment::{NewPayment, PaymentService};
pub use refund::{CancelRefund, NewRefund, RefundService};

/// Hooks that only copy trigger data onto the instrument
pub(crate) struct Patch<F>(pub F);

#[async_trait]
impl<I, F> TransitionHooks<I> for Patch<F>
where
    I: Instrument,
    F: Fn(&mut I) + Send + Sync,
{
    fn prepare(
        &self,
        instrument: &mut I,
        _transition: &Transition<I::State, I::Event>,
    ) -> Result<(), EngineError> {
        (self.0)(instrument);
        Ok(())
    }
}

/// Blank strings are treated as absent
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

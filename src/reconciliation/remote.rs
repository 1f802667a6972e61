//! Remote status interpretation
//!
//! Pure functions from (local state, remote status) to the events that bring
//! the local instrument to where the network says it is. No I/O here; the
//! sync loop folds the planned events through the runner.
//!
//! Only events without a gateway effect are ever planned: reconciliation
//! observes the network, it never calls it.

use std::fmt;
use std::str::FromStr;

use crate::instruments::fraud::{FraudEvent, FraudState};
use crate::instruments::infraction::{InfractionEvent, InfractionState};
use crate::instruments::refund::{RefundEvent, RefundState};

/// Remote record that cannot be folded into local state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence(pub String);

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn diverged(local: &str, remote: &str) -> Divergence {
    Divergence(format!("local {} cannot follow remote {}", local, remote))
}

fn normalize(s: &str) -> String {
    s.trim().to_ascii_uppercase()
}

// ============================================================================
// Infraction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteInfractionStatus {
    Open,
    Acknowledged,
    Closed,
    Cancelled,
}

impl FromStr for RemoteInfractionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "OPEN" => Ok(Self::Open),
            "ACKNOWLEDGED" => Ok(Self::Acknowledged),
            "CLOSED" => Ok(Self::Closed),
            "CANCELLED" | "CANCELED" => Ok(Self::Cancelled),
            other => Err(format!("unknown infraction status '{}'", other)),
        }
    }
}

pub fn plan_infraction(
    local: InfractionState,
    remote: RemoteInfractionStatus,
) -> Result<Vec<InfractionEvent>, Divergence> {
    use InfractionEvent as E;
    use InfractionState as S;
    use RemoteInfractionStatus as R;

    let events = match (remote, local) {
        (_, S::Error) => return Err(diverged("ERROR", &format!("{:?}", remote))),

        (R::Open, S::OpenPending) => vec![E::ConfirmOpen],
        (R::Open, _) => vec![],

        (R::Acknowledged, S::OpenPending) => vec![E::ConfirmOpen],
        (R::Acknowledged, S::AcknowledgedPending) => vec![E::ConfirmAcknowledge],
        (R::Acknowledged, _) => vec![],

        (R::Closed, S::ClosedPending) => vec![E::ConfirmClose],
        (R::Closed, S::ClosedConfirmed) => vec![],
        (R::Closed, S::New) => return Err(diverged("NEW", "CLOSED")),
        (R::Closed, S::CancelPending | S::CancelConfirmed) => {
            return Err(diverged("CANCEL", "CLOSED"));
        }
        (R::Closed, _) => vec![E::CloseRemotely],

        (R::Cancelled, S::CancelPending) => vec![E::ConfirmCancel],
        (R::Cancelled, S::CancelConfirmed) => vec![],
        (R::Cancelled, S::New) => return Err(diverged("NEW", "CANCELLED")),
        (R::Cancelled, S::ClosedPending | S::ClosedConfirmed) => {
            return Err(diverged("CLOSED", "CANCELLED"));
        }
        (R::Cancelled, _) => vec![E::CancelRemotely],
    };
    Ok(events)
}

// ============================================================================
// Refund
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRefundStatus {
    Open,
    Closed,
    Cancelled,
}

impl FromStr for RemoteRefundStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "OPEN" | "RECEIVED" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            "CANCELLED" | "CANCELED" => Ok(Self::Cancelled),
            other => Err(format!("unknown refund status '{}'", other)),
        }
    }
}

pub fn plan_refund(local: RefundState, remote: RemoteRefundStatus) -> Result<Vec<RefundEvent>, Divergence> {
    use RefundEvent as E;
    use RefundState as S;
    use RemoteRefundStatus as R;

    let events = match (remote, local) {
        (_, S::Error) => return Err(diverged("ERROR", &format!("{:?}", remote))),

        (R::Open, S::ReceivePending) => vec![E::ConfirmReceive],
        (R::Open, _) => vec![],

        (R::Closed, S::ClosedPending) => vec![E::ConfirmClose],
        (R::Closed, S::ClosedConfirmed) => vec![],
        (R::Closed, S::ReceivePending | S::ReceiveConfirmed) => vec![E::CloseRemotely],
        (R::Closed, S::CancelPending | S::CancelConfirmed) => return Err(diverged("CANCEL", "CLOSED")),

        (R::Cancelled, S::CancelPending) => vec![E::ConfirmCancel],
        (R::Cancelled, S::CancelConfirmed) => vec![],
        (R::Cancelled, S::ReceivePending | S::ReceiveConfirmed) => vec![E::CancelRemotely],
        (R::Cancelled, S::ClosedPending | S::ClosedConfirmed) => {
            return Err(diverged("CLOSED", "CANCELLED"));
        }
    };
    Ok(events)
}

// ============================================================================
// Fraud detection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFraudStatus {
    Registered,
    Cancelled,
}

impl FromStr for RemoteFraudStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "REGISTERED" | "ACTIVE" => Ok(Self::Registered),
            "CANCELLED" | "CANCELED" => Ok(Self::Cancelled),
            other => Err(format!("unknown fraud detection status '{}'", other)),
        }
    }
}

pub fn plan_fraud(local: FraudState, remote: RemoteFraudStatus) -> Result<Vec<FraudEvent>, Divergence> {
    use FraudEvent as E;
    use FraudState as S;
    use RemoteFraudStatus as R;

    let events = match (remote, local) {
        (_, S::Error) => return Err(diverged("ERROR", &format!("{:?}", remote))),
        (_, S::Pending) => return Err(diverged("PENDING", &format!("{:?}", remote))),

        (R::Registered, S::RegisterPending) => vec![E::ConfirmRegister],
        (R::Registered, S::ReceivePending) => vec![E::ConfirmReceive],
        (R::Registered, _) => vec![],

        (R::Cancelled, S::CancelRegisterPending) => vec![E::ConfirmCancelRegistration],
        (R::Cancelled, S::RegisterPending | S::RegisterConfirmed) => vec![E::CancelRegistrationRemotely],
        (R::Cancelled, S::ReceivePending | S::ReceiveConfirmed) => vec![E::CancelReceived],
        (R::Cancelled, S::CancelRegisterConfirmed | S::CancelReceiveConfirmed) => vec![],
    };
    Ok(events)
}

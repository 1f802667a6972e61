//! Refund use cases
//!
//! Refund requests come from the network. Paying one out settles the refund
//! holds of its infraction; rejecting it reverts them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{Instrument as _, debug, warn};

use super::{Patch, non_blank};
use crate::compensation::{Compensated, CompensationOrchestrator};
use crate::context::Context;
use crate::error::EngineError;
use crate::fsm::{Instrument, Lookup, NoHooks, Outcome, Transition, TransitionHooks, TransitionRunner};
use crate::instruments::infraction::Infraction;
use crate::instruments::refund::{Refund, RefundEvent, RefundState};
use crate::ports::gateway::{CancelRefundRequest, CloseRefundRequest, SettlementGateway};
use crate::require;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRefund {
    pub refund_request_id: Option<String>,
    /// Minor units
    pub amount: Option<u64>,
    pub operation_id: Option<String>,
    /// Issue id of the infraction the refund follows
    pub infraction_key: Option<String>,
    pub reason: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelRefund {
    pub rejection_reason: Option<String>,
    pub analysis_details: Option<String>,
}

struct CloseOnNetwork {
    gateway: Arc<dyn SettlementGateway>,
}

#[async_trait]
impl TransitionHooks<Refund> for CloseOnNetwork {
    async fn gateway(
        &self,
        _ctx: &Context,
        refund: &mut Refund,
        _transition: &Transition<RefundState, RefundEvent>,
    ) -> Result<(), EngineError> {
        let ack = self
            .gateway
            .close_refund(CloseRefundRequest {
                correlation_key: refund.header.correlation_key.clone(),
                operation_id: refund.operation_id.clone(),
                amount: refund.header.amount,
            })
            .await?;
        if refund.external_id.is_none() {
            refund.external_id = ack.external_id;
        }
        Ok(())
    }
}

struct RejectOnNetwork {
    gateway: Arc<dyn SettlementGateway>,
    rejection_reason: String,
    analysis_details: Option<String>,
}

#[async_trait]
impl TransitionHooks<Refund> for RejectOnNetwork {
    fn prepare(
        &self,
        refund: &mut Refund,
        _transition: &Transition<RefundState, RefundEvent>,
    ) -> Result<(), EngineError> {
        refund.rejection_reason = Some(self.rejection_reason.clone());
        refund.analysis_details = self.analysis_details.clone();
        Ok(())
    }

    async fn gateway(
        &self,
        _ctx: &Context,
        refund: &mut Refund,
        _transition: &Transition<RefundState, RefundEvent>,
    ) -> Result<(), EngineError> {
        self.gateway
            .cancel_refund(CancelRefundRequest {
                correlation_key: refund.header.correlation_key.clone(),
                rejection_reason: self.rejection_reason.clone(),
                analysis_details: self.analysis_details.clone(),
            })
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct RefundService {
    refunds: TransitionRunner<Refund>,
    infractions: TransitionRunner<Infraction>,
    compensation: CompensationOrchestrator,
    gateway: Arc<dyn SettlementGateway>,
}

impl RefundService {
    pub fn new(
        refunds: TransitionRunner<Refund>,
        infractions: TransitionRunner<Infraction>,
        compensation: CompensationOrchestrator,
        gateway: Arc<dyn SettlementGateway>,
    ) -> Self {
        Self {
            refunds,
            infractions,
            compensation,
            gateway,
        }
    }

    pub(crate) fn runner(&self) -> &TransitionRunner<Refund> {
        &self.refunds
    }

    /// Record a refund request from the network, in RECEIVE_PENDING.
    ///
    /// The infraction is resolved by its issue id; a refund for an infraction
    /// we do not know is still recorded, without a parent.
    pub async fn receive(&self, ctx: &Context, patch: NewRefund) -> Result<Outcome<Refund>, EngineError> {
        let ctx = ctx.for_kind(Refund::KIND);
        async {
            let refund_request_id = non_blank(patch.refund_request_id);
            let amount = patch.amount.filter(|a| *a > 0);
            let operation_id = non_blank(patch.operation_id);
            require!(refund_request_id, amount, operation_id);

            let infraction_id = match non_blank(patch.infraction_key) {
                Some(key) => {
                    let parent = self.infractions.find(Lookup::Key(&key)).await?;
                    if parent.is_none() {
                        debug!(infraction = %key, "Refund for unknown infraction");
                    }
                    parent.map(|i| i.id())
                }
                None => None,
            };

            self.refunds
                .create(Refund::received(
                    refund_request_id,
                    amount,
                    operation_id,
                    infraction_id,
                    non_blank(patch.reason),
                    patch.description,
                ))
                .await
        }
        .instrument(ctx.span())
        .await
    }

    pub async fn confirm_receive(&self, ctx: &Context, lookup: Lookup<'_>) -> Result<Outcome<Refund>, EngineError> {
        self.fire(ctx, lookup, RefundEvent::ConfirmReceive, &NoHooks).await
    }

    /// Accept the refund on the network
    pub async fn close(&self, ctx: &Context, lookup: Lookup<'_>) -> Result<Outcome<Refund>, EngineError> {
        let hooks = CloseOnNetwork {
            gateway: self.gateway.clone(),
        };
        self.fire(ctx, lookup, RefundEvent::Close, &hooks).await
    }

    /// The network confirmed the refund: pay it out of the reserve and settle
    /// the holds its infraction took for the refunded operation.
    pub async fn confirm_close(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
    ) -> Result<Compensated<Refund>, EngineError> {
        let outcome = self.fire(ctx, lookup, RefundEvent::ConfirmClose, &NoHooks).await?;
        self.compensate(ctx, outcome).await
    }

    /// Reject the refund on the network
    pub async fn cancel(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
        patch: CancelRefund,
    ) -> Result<Outcome<Refund>, EngineError> {
        let rejection_reason = non_blank(patch.rejection_reason);
        require!(rejection_reason);
        let hooks = RejectOnNetwork {
            gateway: self.gateway.clone(),
            rejection_reason,
            analysis_details: non_blank(patch.analysis_details),
        };
        self.fire(ctx, lookup, RefundEvent::Cancel, &hooks).await
    }

    /// The network confirmed the rejection: release the holds of the operation
    pub async fn confirm_cancel(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
    ) -> Result<Compensated<Refund>, EngineError> {
        let outcome = self.fire(ctx, lookup, RefundEvent::ConfirmCancel, &NoHooks).await?;
        self.compensate(ctx, outcome).await
    }

    pub async fn fail(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
        failure_reason: Option<String>,
    ) -> Result<Outcome<Refund>, EngineError> {
        let failure_reason = non_blank(failure_reason);
        let hooks = Patch(move |r: &mut Refund| r.failure_reason = failure_reason.clone());
        self.fire(ctx, lookup, RefundEvent::Fail, &hooks).await
    }

    /// Close the parent's links according to where the refund ended
    pub(crate) async fn compensate(
        &self,
        ctx: &Context,
        outcome: Outcome<Refund>,
    ) -> Result<Compensated<Refund>, EngineError> {
        let refund = outcome.get();
        let Some(parent) = refund.infraction_id else {
            return Ok(Compensated { outcome, report: None });
        };

        let report = match refund.state() {
            RefundState::ClosedConfirmed => {
                self.compensation
                    .settle_operation_links(ctx, parent, &refund.operation_id)
                    .await?
            }
            RefundState::CancelConfirmed => {
                self.compensation
                    .revert_operation_links(ctx, parent, &refund.operation_id)
                    .await?
            }
            _ => return Ok(Compensated { outcome, report: None }),
        };
        if !report.is_complete() {
            warn!(
                refund = %refund.id(),
                infraction = %parent,
                failed = report.failed.len(),
                "Link closure incomplete, redeliver to retry"
            );
        }
        Ok(Compensated {
            outcome,
            report: Some(report),
        })
    }

    async fn fire<H>(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
        event: RefundEvent,
        hooks: &H,
    ) -> Result<Outcome<Refund>, EngineError>
    where
        H: TransitionHooks<Refund>,
    {
        let ctx = ctx.for_kind(Refund::KIND);
        let span = ctx.span();
        self.refunds.fire(&ctx, lookup, event, hooks).instrument(span).await
    }
}

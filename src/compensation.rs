//! Compensation Orchestrator
//!
//! Closes the refund-operation links of an infraction. Reverting a link posts
//! a reversal of its hold; settling accepts the hold once the refund is paid.
//! Each link goes through the runner on its own, so the ledger call happens
//! before the link is marked CLOSED and a closed link is never touched again.
//!
//! A failure on one link does not stop the others; the report names exactly
//! the links that failed, and running the orchestrator again retries only
//! those.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{Instrument as _, info, warn};

use crate::context::Context;
use crate::error::EngineError;
use crate::fsm::{Instrument, Outcome, Transition, TransitionHooks, TransitionRunner};
use crate::instruments::refund_link::{LinkClosure, LinkEvent, LinkState, RefundLink};
use crate::types::InstrumentId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkFailure {
    pub link_id: InstrumentId,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompensationReport {
    pub parent: InstrumentId,
    /// Links closed by this run
    pub compensated: Vec<InstrumentId>,
    /// Links already closed (or not eligible)
    pub skipped: Vec<InstrumentId>,
    pub failed: Vec<LinkFailure>,
}

impl CompensationReport {
    fn new(parent: InstrumentId) -> Self {
        Self {
            parent,
            compensated: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A parent transition together with the compensation it triggered
#[derive(Debug, Clone, PartialEq)]
pub struct Compensated<I> {
    pub outcome: Outcome<I>,
    pub report: Option<CompensationReport>,
}

struct CloseLink(LinkClosure);

#[async_trait]
impl TransitionHooks<RefundLink> for CloseLink {
    fn prepare(
        &self,
        link: &mut RefundLink,
        _transition: &Transition<LinkState, LinkEvent>,
    ) -> Result<(), EngineError> {
        link.closure = Some(self.0);
        Ok(())
    }
}

#[derive(Clone)]
pub struct CompensationOrchestrator {
    links: TransitionRunner<RefundLink>,
}

impl CompensationOrchestrator {
    pub fn new(links: TransitionRunner<RefundLink>) -> Self {
        Self { links }
    }

    /// Revert the hold of every non-closed link of `infraction_id`
    pub async fn revert_open_links(
        &self,
        ctx: &Context,
        infraction_id: InstrumentId,
    ) -> Result<CompensationReport, EngineError> {
        self.run(ctx, infraction_id, None, LinkEvent::Revert, LinkClosure::Reverted)
            .await
    }

    /// Revert the holds taken for one disputed operation of `infraction_id`
    pub async fn revert_operation_links(
        &self,
        ctx: &Context,
        infraction_id: InstrumentId,
        operation_id: &str,
    ) -> Result<CompensationReport, EngineError> {
        self.run(ctx, infraction_id, Some(operation_id), LinkEvent::Revert, LinkClosure::Reverted)
            .await
    }

    /// Accept the open holds taken for one disputed operation of
    /// `infraction_id`. Links of other operations stay open.
    pub async fn settle_operation_links(
        &self,
        ctx: &Context,
        infraction_id: InstrumentId,
        operation_id: &str,
    ) -> Result<CompensationReport, EngineError> {
        self.run(ctx, infraction_id, Some(operation_id), LinkEvent::Settle, LinkClosure::Settled)
            .await
    }

    async fn run(
        &self,
        ctx: &Context,
        infraction_id: InstrumentId,
        operation_id: Option<&str>,
        event: LinkEvent,
        closure: LinkClosure,
    ) -> Result<CompensationReport, EngineError> {
        let ctx = ctx.for_kind(RefundLink::KIND);
        let span = ctx.span();
        self.close_links(&ctx, infraction_id, operation_id, event, closure)
            .instrument(span)
            .await
    }

    async fn close_links(
        &self,
        ctx: &Context,
        infraction_id: InstrumentId,
        operation_id: Option<&str>,
        event: LinkEvent,
        closure: LinkClosure,
    ) -> Result<CompensationReport, EngineError> {
        let links = self.links.repository().list_by_parent(infraction_id).await?;
        let hooks = CloseLink(closure);
        let mut report = CompensationReport::new(infraction_id);

        let in_scope = |link: &RefundLink| operation_id.is_none_or(|op| link.operation_id == op);
        for link in links.into_iter().filter(in_scope) {
            let link_id = link.id();

            // Nothing was held for a pending link, so there is nothing to settle
            let eligible = match event {
                LinkEvent::Settle => link.state() == LinkState::Open,
                _ => !link.header.is_terminal(),
            };
            if !eligible {
                report.skipped.push(link_id);
                continue;
            }

            match self.links.fire_on(ctx, link, event, &hooks).await {
                Ok(Outcome::Applied(_)) => report.compensated.push(link_id),
                Ok(Outcome::Unchanged(_)) => report.skipped.push(link_id),
                Err(e) => {
                    warn!(link = %link_id, error = %e, code = e.code(), "Link compensation failed");
                    report.failed.push(LinkFailure {
                        link_id,
                        code: e.code(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            infraction = %infraction_id,
            event = ?event,
            compensated = report.compensated.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Compensation finished"
        );

        Ok(report)
    }
}

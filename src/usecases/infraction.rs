//! Infraction use cases
//!
//! Infractions we open and infractions the network raises against us share
//! one lifecycle. Refund-operation links hold client funds while an
//! infraction is open; a DISAGREED close or a cancellation reverts them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{Instrument as _, info, warn};

use super::{Patch, non_blank};
use crate::compensation::{Compensated, CompensationOrchestrator};
use crate::context::Context;
use crate::error::EngineError;
use crate::fsm::{
    Instrument, InstrumentState, Lookup, NoHooks, Outcome, Transition, TransitionEvent, TransitionHooks,
    TransitionRunner,
};
use crate::guard::expect_state;
use crate::instruments::infraction::{AnalysisResult, Infraction, InfractionEvent, InfractionState};
use crate::instruments::refund_link::{LinkEvent, RefundLink};
use crate::ports::gateway::{CloseInfractionRequest, InfractionRequest, SettlementGateway};
use crate::require;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewInfraction {
    pub issue_id: Option<String>,
    pub operation_id: Option<String>,
    pub infraction_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloseInfraction {
    pub analysis_result: Option<AnalysisResult>,
    pub analysis_details: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRefundOperation {
    /// Minor units held from the client account
    pub amount: Option<u64>,
    pub client_account: Option<String>,
    pub operation_id: Option<String>,
}

/// States in which an infraction may still take refund holds
const LINKABLE: &[InfractionState] = &[
    InfractionState::OpenPending,
    InfractionState::OpenConfirmed,
    InfractionState::ReceivePending,
    InfractionState::AcknowledgedPending,
    InfractionState::AcknowledgedConfirmed,
];

fn request_for(infraction: &Infraction) -> InfractionRequest {
    InfractionRequest {
        correlation_key: infraction.header.correlation_key.clone(),
        external_id: infraction.external_id.clone(),
        operation_id: infraction.operation_id.clone(),
        infraction_type: infraction.infraction_type.clone(),
        description: infraction.description.clone(),
    }
}

/// Gateway binding of open, acknowledge and cancel
struct NotifyNetwork {
    gateway: Arc<dyn SettlementGateway>,
}

#[async_trait]
impl TransitionHooks<Infraction> for NotifyNetwork {
    async fn gateway(
        &self,
        _ctx: &Context,
        infraction: &mut Infraction,
        transition: &Transition<InfractionState, InfractionEvent>,
    ) -> Result<(), EngineError> {
        let request = request_for(infraction);
        let ack = match transition.event {
            InfractionEvent::Open => self.gateway.open_infraction(request).await?,
            InfractionEvent::Acknowledge => self.gateway.acknowledge_infraction(request).await?,
            InfractionEvent::Cancel => self.gateway.cancel_infraction(request).await?,
            other => {
                return Err(EngineError::System(format!(
                    "infraction '{}' has no network binding",
                    other.as_str()
                )));
            }
        };
        if infraction.external_id.is_none() {
            infraction.external_id = ack.external_id;
        }
        Ok(())
    }
}

struct CloseWithAnalysis {
    gateway: Arc<dyn SettlementGateway>,
    analysis_result: AnalysisResult,
    analysis_details: String,
}

#[async_trait]
impl TransitionHooks<Infraction> for CloseWithAnalysis {
    fn prepare(
        &self,
        infraction: &mut Infraction,
        _transition: &Transition<InfractionState, InfractionEvent>,
    ) -> Result<(), EngineError> {
        infraction.analysis_result = Some(self.analysis_result);
        infraction.analysis_details = Some(self.analysis_details.clone());
        Ok(())
    }

    async fn gateway(
        &self,
        _ctx: &Context,
        infraction: &mut Infraction,
        _transition: &Transition<InfractionState, InfractionEvent>,
    ) -> Result<(), EngineError> {
        let ack = self
            .gateway
            .close_infraction(CloseInfractionRequest {
                correlation_key: infraction.header.correlation_key.clone(),
                external_id: infraction.external_id.clone(),
                analysis_result: self.analysis_result,
                analysis_details: self.analysis_details.clone(),
            })
            .await?;
        if infraction.external_id.is_none() {
            infraction.external_id = ack.external_id;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct InfractionService {
    infractions: TransitionRunner<Infraction>,
    links: TransitionRunner<RefundLink>,
    compensation: CompensationOrchestrator,
    gateway: Arc<dyn SettlementGateway>,
}

impl InfractionService {
    pub fn new(
        infractions: TransitionRunner<Infraction>,
        links: TransitionRunner<RefundLink>,
        compensation: CompensationOrchestrator,
        gateway: Arc<dyn SettlementGateway>,
    ) -> Self {
        Self {
            infractions,
            links,
            compensation,
            gateway,
        }
    }

    pub(crate) fn runner(&self) -> &TransitionRunner<Infraction> {
        &self.infractions
    }

    fn hooks(&self) -> NotifyNetwork {
        NotifyNetwork {
            gateway: self.gateway.clone(),
        }
    }

    /// Record an infraction we are about to report, in NEW
    pub async fn create(
        &self,
        ctx: &Context,
        patch: NewInfraction,
    ) -> Result<Outcome<Infraction>, EngineError> {
        let ctx = ctx.for_kind(Infraction::KIND);
        let (issue_id, operation_id, infraction_type, description) = Self::validate(patch)?;
        self.infractions
            .create(Infraction::sent(issue_id, operation_id, infraction_type, description))
            .instrument(ctx.span())
            .await
    }

    /// Record an infraction raised against us by the network, in RECEIVE_PENDING
    pub async fn receive(
        &self,
        ctx: &Context,
        patch: NewInfraction,
    ) -> Result<Outcome<Infraction>, EngineError> {
        let ctx = ctx.for_kind(Infraction::KIND);
        let (issue_id, operation_id, infraction_type, description) = Self::validate(patch)?;
        self.infractions
            .create(Infraction::received(issue_id, operation_id, infraction_type, description))
            .instrument(ctx.span())
            .await
    }

    fn validate(patch: NewInfraction) -> Result<(String, String, String, Option<String>), EngineError> {
        let issue_id = non_blank(patch.issue_id);
        let operation_id = non_blank(patch.operation_id);
        let infraction_type = non_blank(patch.infraction_type);
        require!(issue_id, operation_id, infraction_type);
        Ok((issue_id, operation_id, infraction_type, patch.description))
    }

    /// Report the infraction to the network
    pub async fn open(&self, ctx: &Context, lookup: Lookup<'_>) -> Result<Outcome<Infraction>, EngineError> {
        self.fire(ctx, lookup, InfractionEvent::Open, &self.hooks()).await
    }

    pub async fn confirm_open(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
    ) -> Result<Outcome<Infraction>, EngineError> {
        self.fire(ctx, lookup, InfractionEvent::ConfirmOpen, &NoHooks).await
    }

    /// Acknowledge receipt of a network-raised infraction
    pub async fn acknowledge(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
    ) -> Result<Outcome<Infraction>, EngineError> {
        self.fire(ctx, lookup, InfractionEvent::Acknowledge, &self.hooks()).await
    }

    pub async fn confirm_acknowledge(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
    ) -> Result<Outcome<Infraction>, EngineError> {
        self.fire(ctx, lookup, InfractionEvent::ConfirmAcknowledge, &NoHooks).await
    }

    /// Submit the analysis result of the infraction
    pub async fn close(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
        patch: CloseInfraction,
    ) -> Result<Outcome<Infraction>, EngineError> {
        let analysis_result = patch.analysis_result;
        let analysis_details = non_blank(patch.analysis_details);
        require!(analysis_result, analysis_details);

        let hooks = CloseWithAnalysis {
            gateway: self.gateway.clone(),
            analysis_result,
            analysis_details,
        };
        self.fire(ctx, lookup, InfractionEvent::Close, &hooks).await
    }

    /// The network confirmed the close.
    ///
    /// A DISAGREED analysis reverts the refund holds. Compensation runs even
    /// when the close was already confirmed, so a redelivery retries links
    /// that failed the first time.
    pub async fn confirm_close(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
    ) -> Result<Compensated<Infraction>, EngineError> {
        let outcome = self.fire(ctx, lookup, InfractionEvent::ConfirmClose, &NoHooks).await?;
        self.compensate(ctx, outcome).await
    }

    /// Withdraw an infraction we opened
    pub async fn cancel(&self, ctx: &Context, lookup: Lookup<'_>) -> Result<Outcome<Infraction>, EngineError> {
        self.fire(ctx, lookup, InfractionEvent::Cancel, &self.hooks()).await
    }

    /// The network confirmed the cancellation: revert the refund holds
    pub async fn confirm_cancel(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
    ) -> Result<Compensated<Infraction>, EngineError> {
        let outcome = self.fire(ctx, lookup, InfractionEvent::ConfirmCancel, &NoHooks).await?;
        self.compensate(ctx, outcome).await
    }

    /// Move to ERROR and revert the holds taken so far
    pub async fn fail(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
        failure_reason: Option<String>,
    ) -> Result<Compensated<Infraction>, EngineError> {
        let failure_reason = non_blank(failure_reason);
        let hooks = Patch(move |i: &mut Infraction| i.failure_reason = failure_reason.clone());
        let outcome = self.fire(ctx, lookup, InfractionEvent::Fail, &hooks).await?;
        self.compensate(ctx, outcome).await
    }

    /// Hold `amount` of the client's funds against an open infraction.
    ///
    /// The link is keyed by infraction and disputed operation, so a
    /// redelivered request finds the existing link instead of holding twice.
    pub async fn open_refund_operation(
        &self,
        ctx: &Context,
        infraction: Lookup<'_>,
        patch: NewRefundOperation,
    ) -> Result<Outcome<RefundLink>, EngineError> {
        let ctx = ctx.for_kind(RefundLink::KIND);
        let span = ctx.span();
        async {
            let amount = patch.amount.filter(|a| *a > 0);
            let client_account = non_blank(patch.client_account);
            let operation_id = non_blank(patch.operation_id);
            require!(amount, client_account, operation_id);

            let infraction = self.infractions.load(infraction).await?;
            let key = format!("{}:{}", infraction.correlation_key(), operation_id);
            let opened = match self.links.find(Lookup::Key(&key)).await? {
                Some(link) => self.links.fire_on(&ctx, link, LinkEvent::Open, &NoHooks).await?,
                None => {
                    expect_state(&infraction, "open_refund_operation", LINKABLE)?;
                    let created = self
                        .links
                        .create(RefundLink::new(key, infraction.id(), amount, client_account, operation_id))
                        .await?
                        .into_inner();
                    self.links.fire_on(&ctx, created, LinkEvent::Open, &NoHooks).await?
                }
            };

            // A close or cancel may have compensated the infraction while the
            // hold was being taken; its link scan could not see this link.
            let parent = self.infractions.load(Lookup::Id(infraction.id())).await?;
            if parent.requires_compensation() {
                warn!(
                    infraction = %parent.id(),
                    state = parent.state().as_str(),
                    link = %opened.get().id(),
                    "Infraction left linkable states, reverting new hold"
                );
                self.compensate(&ctx, Outcome::Unchanged(parent.clone())).await?;
                expect_state(&parent, "open_refund_operation", LINKABLE)?;
            }

            info!(
                infraction = %infraction.id(),
                link = %opened.get().id(),
                amount,
                "Refund operation opened"
            );
            Ok::<_, EngineError>(opened)
        }
        .instrument(span)
        .await
    }

    /// Run compensation for an infraction that needs it
    pub(crate) async fn compensate(
        &self,
        ctx: &Context,
        outcome: Outcome<Infraction>,
    ) -> Result<Compensated<Infraction>, EngineError> {
        let infraction = outcome.get();
        if !infraction.requires_compensation() {
            return Ok(Compensated { outcome, report: None });
        }

        let report = self.compensation.revert_open_links(ctx, infraction.id()).await?;
        if !report.is_complete() {
            warn!(
                infraction = %infraction.id(),
                failed = report.failed.len(),
                "Compensation incomplete, redeliver to retry"
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
        event: InfractionEvent,
        hooks: &H,
    ) -> Result<Outcome<Infraction>, EngineError>
    where
        H: TransitionHooks<Infraction>,
    {
        let ctx = ctx.for_kind(Infraction::KIND);
        let span = ctx.span();
        self.infractions
            .fire(&ctx, lookup, event, hooks)
            .instrument(span)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::adapters::memory::InMemoryRepository;
    use crate::adapters::mock::MockPorts;
    use crate::config::EngineConfig;
    use crate::instruments::refund_link::{LinkClosure, LinkState};
    use crate::ports::repository::{InstrumentRepository, Page};
    use crate::types::InstrumentId;

    /// Serves one outdated snapshot on the next key lookup, as a reader
    /// racing a concurrent writer would see it.
    struct StaleRead {
        inner: InMemoryRepository<Infraction>,
        snapshot: Mutex<Option<Infraction>>,
    }

    #[async_trait]
    impl InstrumentRepository<Infraction> for StaleRead {
        async fn get_by_id(&self, id: InstrumentId) -> Result<Option<Infraction>, EngineError> {
            self.inner.get_by_id(id).await
        }

        async fn get_by_correlation_key(&self, key: &str) -> Result<Option<Infraction>, EngineError> {
            let stale = self.snapshot.lock().unwrap().take();
            if stale.is_some() {
                return Ok(stale);
            }
            self.inner.get_by_correlation_key(key).await
        }

        async fn create(&self, instrument: Infraction) -> Result<Infraction, EngineError> {
            self.inner.create(instrument).await
        }

        async fn update_if(
            &self,
            instrument: &Infraction,
            expected: InfractionState,
        ) -> Result<bool, EngineError> {
            self.inner.update_if(instrument, expected).await
        }

        async fn list_by_state(
            &self,
            state: InfractionState,
            page: Page,
        ) -> Result<Vec<Infraction>, EngineError> {
            self.inner.list_by_state(state, page).await
        }

        async fn list_by_parent(&self, parent: InstrumentId) -> Result<Vec<Infraction>, EngineError> {
            self.inner.list_by_parent(parent).await
        }
    }

    fn service(mocks: &MockPorts) -> InfractionService {
        service_over(mocks, Arc::new(InMemoryRepository::<Infraction>::new()))
    }

    fn service_over(
        mocks: &MockPorts,
        infractions: Arc<dyn InstrumentRepository<Infraction>>,
    ) -> InfractionService {
        let ports = mocks.ports();
        let config = Arc::new(EngineConfig::default());
        let links = TransitionRunner::new(
            Arc::new(InMemoryRepository::<RefundLink>::new()),
            &ports,
            config.clone(),
        );
        InfractionService::new(
            TransitionRunner::new(infractions, &ports, config),
            links.clone(),
            CompensationOrchestrator::new(links),
            ports.gateway.clone(),
        )
    }

    fn new_infraction(issue: &str) -> NewInfraction {
        NewInfraction {
            issue_id: Some(issue.into()),
            operation_id: Some("E2E-1".into()),
            infraction_type: Some("FRAUD".into()),
            description: None,
        }
    }

    fn refund_operation(amount: u64) -> NewRefundOperation {
        NewRefundOperation {
            amount: Some(amount),
            client_account: Some("acc-1".into()),
            operation_id: Some("E2E-1".into()),
        }
    }

    async fn opened(svc: &InfractionService, ctx: &Context, issue: &str) -> Infraction {
        svc.create(ctx, new_infraction(issue)).await.unwrap();
        svc.open(ctx, Lookup::Key(issue)).await.unwrap();
        svc.confirm_open(ctx, Lookup::Key(issue)).await.unwrap().into_inner()
    }

    #[tokio::test]
    async fn test_open_records_external_id() {
        let mocks = MockPorts::new();
        let svc = service(&mocks);
        let infraction = opened(&svc, &Context::new("i-1"), "ISSUE-1").await;

        assert_eq!(infraction.state(), InfractionState::OpenConfirmed);
        assert!(infraction.external_id.is_some());
        assert_eq!(mocks.gateway.calls("open_infraction"), 1);
    }

    #[tokio::test]
    async fn test_close_requires_analysis() {
        let mocks = MockPorts::new();
        let err = service(&mocks)
            .close(&Context::new("i-2"), Lookup::Key("ISSUE-2"), CloseInfraction::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::MissingRequiredField {
                fields: vec!["analysis_result", "analysis_details"]
            }
        );
    }

    #[tokio::test]
    async fn test_disagreed_close_reverts_links() {
        let mocks = MockPorts::new();
        let svc = service(&mocks);
        let ctx = Context::new("i-3");
        opened(&svc, &ctx, "ISSUE-3").await;
        let link = svc
            .open_refund_operation(&ctx, Lookup::Key("ISSUE-3"), refund_operation(500))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(link.state(), LinkState::Open);

        svc.close(
            &ctx,
            Lookup::Key("ISSUE-3"),
            CloseInfraction {
                analysis_result: Some(AnalysisResult::Disagreed),
                analysis_details: Some("not fraud".into()),
            },
        )
        .await
        .unwrap();
        let closed = svc.confirm_close(&ctx, Lookup::Key("ISSUE-3")).await.unwrap();

        let report = closed.report.unwrap();
        assert_eq!(report.compensated, vec![link.id()]);
        assert_eq!(mocks.ledger.revert_calls(), 1);
        let link = svc.links.load(Lookup::Id(link.id())).await.unwrap();
        assert_eq!(link.closure, Some(LinkClosure::Reverted));

        // Redelivery: nothing left to revert
        let again = svc.confirm_close(&ctx, Lookup::Key("ISSUE-3")).await.unwrap();
        assert!(!again.outcome.is_applied());
        assert_eq!(mocks.ledger.revert_calls(), 1);
    }

    #[tokio::test]
    async fn test_agreed_close_keeps_links() {
        let mocks = MockPorts::new();
        let svc = service(&mocks);
        let ctx = Context::new("i-4");
        opened(&svc, &ctx, "ISSUE-4").await;
        svc.open_refund_operation(&ctx, Lookup::Key("ISSUE-4"), refund_operation(300))
            .await
            .unwrap();

        svc.close(
            &ctx,
            Lookup::Key("ISSUE-4"),
            CloseInfraction {
                analysis_result: Some(AnalysisResult::Agreed),
                analysis_details: Some("confirmed".into()),
            },
        )
        .await
        .unwrap();
        let closed = svc.confirm_close(&ctx, Lookup::Key("ISSUE-4")).await.unwrap();

        assert!(closed.report.is_none());
        assert_eq!(mocks.ledger.revert_calls(), 0);
    }

    #[tokio::test]
    async fn test_refund_operation_replay_holds_once() {
        let mocks = MockPorts::new();
        let svc = service(&mocks);
        let ctx = Context::new("i-5");
        opened(&svc, &ctx, "ISSUE-5").await;

        let first = svc
            .open_refund_operation(&ctx, Lookup::Key("ISSUE-5"), refund_operation(500))
            .await
            .unwrap();
        let second = svc
            .open_refund_operation(&ctx, Lookup::Key("ISSUE-5"), refund_operation(500))
            .await
            .unwrap();

        assert!(first.is_applied());
        assert!(!second.is_applied());
        assert_eq!(mocks.ledger.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_refund_operation_rejected_on_new_infraction() {
        let mocks = MockPorts::new();
        let svc = service(&mocks);
        let ctx = Context::new("i-6");
        svc.create(&ctx, new_infraction("ISSUE-6")).await.unwrap();

        let err = svc
            .open_refund_operation(&ctx, Lookup::Key("ISSUE-6"), refund_operation(100))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { current: "NEW", .. }));
        assert_eq!(mocks.ledger.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_received_infraction_acknowledged() {
        let mocks = MockPorts::new();
        let svc = service(&mocks);
        let ctx = Context::new("i-7");
        let received = svc.receive(&ctx, new_infraction("ISSUE-7")).await.unwrap().into_inner();
        assert_eq!(received.state(), InfractionState::ReceivePending);

        svc.acknowledge(&ctx, Lookup::Key("ISSUE-7")).await.unwrap();
        let done = svc
            .confirm_acknowledge(&ctx, Lookup::Key("ISSUE-7"))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(done.state(), InfractionState::AcknowledgedConfirmed);
        assert_eq!(mocks.gateway.calls("acknowledge_infraction"), 1);
    }

    #[tokio::test]
    async fn test_cancel_reverts_links() {
        let mocks = MockPorts::new();
        let svc = service(&mocks);
        let ctx = Context::new("i-8");
        opened(&svc, &ctx, "ISSUE-8").await;
        svc.open_refund_operation(&ctx, Lookup::Key("ISSUE-8"), refund_operation(700))
            .await
            .unwrap();

        svc.cancel(&ctx, Lookup::Key("ISSUE-8")).await.unwrap();
        let cancelled = svc.confirm_cancel(&ctx, Lookup::Key("ISSUE-8")).await.unwrap();

        assert_eq!(cancelled.outcome.get().state(), InfractionState::CancelConfirmed);
        assert_eq!(cancelled.report.unwrap().compensated.len(), 1);
        assert_eq!(mocks.ledger.revert_calls(), 1);
    }

    #[tokio::test]
    async fn test_fail_reverts_links() {
        let mocks = MockPorts::new();
        let svc = service(&mocks);
        let ctx = Context::new("i-9");
        svc.create(&ctx, new_infraction("ISSUE-9")).await.unwrap();
        svc.open(&ctx, Lookup::Key("ISSUE-9")).await.unwrap();
        let link = svc
            .open_refund_operation(&ctx, Lookup::Key("ISSUE-9"), refund_operation(500))
            .await
            .unwrap()
            .into_inner();

        let failed = svc
            .fail(&ctx, Lookup::Key("ISSUE-9"), Some("network rejected".into()))
            .await
            .unwrap();

        assert_eq!(failed.outcome.get().state(), InfractionState::Error);
        assert_eq!(failed.outcome.get().failure_reason.as_deref(), Some("network rejected"));
        assert_eq!(failed.report.unwrap().compensated, vec![link.id()]);
        assert_eq!(mocks.ledger.revert_calls(), 1);
        let link = svc.links.load(Lookup::Id(link.id())).await.unwrap();
        assert_eq!(link.closure, Some(LinkClosure::Reverted));
    }

    #[tokio::test]
    async fn test_hold_taken_during_close_is_reverted() {
        let mocks = MockPorts::new();
        let repo = Arc::new(StaleRead {
            inner: InMemoryRepository::new(),
            snapshot: Mutex::new(None),
        });
        let svc = service_over(&mocks, repo.clone());
        let ctx = Context::new("i-10");
        let before_close = opened(&svc, &ctx, "ISSUE-10").await;

        svc.close(
            &ctx,
            Lookup::Key("ISSUE-10"),
            CloseInfraction {
                analysis_result: Some(AnalysisResult::Disagreed),
                analysis_details: Some("not fraud".into()),
            },
        )
        .await
        .unwrap();
        let closed = svc.confirm_close(&ctx, Lookup::Key("ISSUE-10")).await.unwrap();
        assert!(closed.report.unwrap().compensated.is_empty());

        // The hold request read the infraction before the close landed
        *repo.snapshot.lock().unwrap() = Some(before_close);
        let err = svc
            .open_refund_operation(&ctx, Lookup::Key("ISSUE-10"), refund_operation(500))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::InvalidState {
                current: "CLOSED_CONFIRMED",
                ..
            }
        ));
        assert_eq!(mocks.ledger.create_calls(), 1);
        assert_eq!(mocks.ledger.revert_calls(), 1);
        let link = svc.links.load(Lookup::Key("ISSUE-10:E2E-1")).await.unwrap();
        assert_eq!(link.state(), LinkState::Closed);
        assert_eq!(link.closure, Some(LinkClosure::Reverted));
    }
}

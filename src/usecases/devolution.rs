//! Devolution use cases

use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument as _;

use super::{Patch, non_blank};
use crate::context::Context;
use crate::error::EngineError;
use crate::fsm::{Instrument, Lookup, NoHooks, Outcome, Transition, TransitionHooks, TransitionRunner};
use crate::instruments::devolution::{Devolution, DevolutionEvent, DevolutionState};
use crate::ports::gateway::{SettlementGateway, TransferOrder};

struct SendDevolution {
    gateway: Arc<dyn SettlementGateway>,
    callback_url: String,
}

#[async_trait]
impl TransitionHooks<Devolution> for SendDevolution {
    async fn gateway(
        &self,
        _ctx: &Context,
        devolution: &mut Devolution,
        _transition: &Transition<DevolutionState, DevolutionEvent>,
    ) -> Result<(), EngineError> {
        let receipt = self
            .gateway
            .create_transfer(TransferOrder {
                kind: Devolution::KIND,
                correlation_key: devolution.header.correlation_key.clone(),
                amount: devolution.header.amount,
                source_account: devolution.client_account.clone(),
                beneficiary: devolution.beneficiary.clone(),
                description: devolution.description.clone(),
                callback_url: self.callback_url.clone(),
                original_end_to_end_id: Some(devolution.original_end_to_end_id.clone()),
            })
            .await?;
        devolution.external_ref = Some(receipt.external_ref);
        Ok(())
    }
}

#[derive(Clone)]
pub struct DevolutionService {
    devolutions: TransitionRunner<Devolution>,
    gateway: Arc<dyn SettlementGateway>,
}

impl DevolutionService {
    pub fn new(devolutions: TransitionRunner<Devolution>, gateway: Arc<dyn SettlementGateway>) -> Self {
        Self { devolutions, gateway }
    }

    pub(crate) fn runner(&self) -> &TransitionRunner<Devolution> {
        &self.devolutions
    }

    /// Debit the client, then send the transfer back to the payer
    pub async fn submit(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
    ) -> Result<Outcome<Devolution>, EngineError> {
        let ctx = ctx.for_kind(Devolution::KIND);
        let span = ctx.span();
        let hooks = SendDevolution {
            gateway: self.gateway.clone(),
            callback_url: self.devolutions.config().gateway.callback_url("devolutions"),
        };
        self.devolutions
            .fire(&ctx, lookup, DevolutionEvent::Submit, &hooks)
            .instrument(span)
            .await
    }

    pub async fn confirm(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
    ) -> Result<Outcome<Devolution>, EngineError> {
        let ctx = ctx.for_kind(Devolution::KIND);
        let span = ctx.span();
        self.devolutions
            .fire(&ctx, lookup, DevolutionEvent::Confirm, &NoHooks)
            .instrument(span)
            .await
    }

    /// Settlement failed: revert the client debit
    pub async fn fail(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
        failure_reason: Option<String>,
    ) -> Result<Outcome<Devolution>, EngineError> {
        let ctx = ctx.for_kind(Devolution::KIND);
        let span = ctx.span();
        let failure_reason = non_blank(failure_reason);
        let hooks = Patch(move |d: &mut Devolution| d.failure_reason = failure_reason.clone());
        self.devolutions
            .fire(&ctx, lookup, DevolutionEvent::Fail, &hooks)
            .instrument(span)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRepository;
    use crate::adapters::mock::MockPorts;
    use crate::config::EngineConfig;
    use crate::ports::ledger::OperationState;
    use crate::types::{Counterparty, InstrumentId, OperationRef};

    async fn pending(mocks: &MockPorts) -> (DevolutionService, Devolution) {
        let ports = mocks.ports();
        let svc = DevolutionService::new(
            TransitionRunner::new(
                Arc::new(InMemoryRepository::<Devolution>::new()),
                &ports,
                Arc::new(EngineConfig::default()),
            ),
            ports.gateway.clone(),
        );
        let devolution = Devolution::new(
            InstrumentId::new(),
            InstrumentId::new(),
            1_000,
            "acc-1",
            Counterparty::default(),
            "E2E-ORIG",
            None,
        );
        let created = svc.runner().create(devolution).await.unwrap().into_inner();
        (svc, created)
    }

    #[tokio::test]
    async fn test_submit_sends_back_to_payer() {
        let mocks = MockPorts::new();
        let (svc, devolution) = pending(&mocks).await;
        let ctx = Context::new("dv-1");

        let sent = svc.submit(&ctx, Lookup::Id(devolution.id())).await.unwrap().into_inner();
        let confirmed = svc.confirm(&ctx, Lookup::Id(devolution.id())).await.unwrap().into_inner();

        assert_eq!(sent.state(), DevolutionState::Waiting);
        assert!(sent.external_ref.is_some());
        assert_eq!(confirmed.state(), DevolutionState::Confirmed);
        let order = &mocks.gateway.transfers()[0];
        assert_eq!(order.original_end_to_end_id.as_deref(), Some("E2E-ORIG"));
        assert!(order.callback_url.ends_with("/devolutions"));
        let op = mocks
            .ledger
            .operation(&OperationRef::for_instrument(Devolution::KIND, devolution.id()))
            .unwrap();
        assert_eq!(op.state, OperationState::Accepted);
    }

    #[tokio::test]
    async fn test_gateway_failure_keeps_pending_and_resumes() {
        let mocks = MockPorts::new();
        let (svc, devolution) = pending(&mocks).await;
        let ctx = Context::new("dv-2");
        mocks
            .gateway
            .fail("create_transfer", EngineError::GatewayUnavailable("503".into()));

        let err = svc.submit(&ctx, Lookup::Id(devolution.id())).await.unwrap_err();
        assert!(err.is_retryable());
        let stored = svc.runner().load(Lookup::Id(devolution.id())).await.unwrap();
        assert_eq!(stored.state(), DevolutionState::Pending);

        mocks.gateway.clear_failures();
        let sent = svc.submit(&ctx, Lookup::Id(devolution.id())).await.unwrap();

        assert!(sent.is_applied());
        assert_eq!(mocks.ledger.create_calls(), 1);
        assert_eq!(mocks.ledger.operations().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_records_reason() {
        let mocks = MockPorts::new();
        let (svc, devolution) = pending(&mocks).await;
        let failed = svc
            .fail(&Context::new("dv-3"), Lookup::Id(devolution.id()), Some("  ".into()))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(failed.state(), DevolutionState::Failed);
        assert_eq!(failed.failure_reason, None);
        // Never debited, so nothing to revert
        assert_eq!(mocks.ledger.operations().len(), 0);
    }
}

//! Payment use cases

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::Instrument as _;

use super::{Patch, non_blank};
use crate::context::Context;
use crate::error::EngineError;
use crate::fsm::{Instrument, Lookup, NoHooks, Outcome, Transition, TransitionHooks, TransitionRunner};
use crate::instruments::payment::{Payment, PaymentEvent, PaymentState};
use crate::ports::accounts::ensure_active;
use crate::ports::gateway::{SettlementGateway, TransferOrder};
use crate::ports::AccountDirectory;
use crate::require;
use crate::types::Counterparty;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPayment {
    pub end_to_end_id: Option<String>,
    /// Minor units
    pub amount: Option<u64>,
    pub source_account: Option<String>,
    pub beneficiary: Option<Counterparty>,
    pub description: Option<String>,
}

struct SendPayment {
    gateway: Arc<dyn SettlementGateway>,
    callback_url: String,
}

#[async_trait]
impl TransitionHooks<Payment> for SendPayment {
    async fn gateway(
        &self,
        _ctx: &Context,
        payment: &mut Payment,
        _transition: &Transition<PaymentState, PaymentEvent>,
    ) -> Result<(), EngineError> {
        let receipt = self
            .gateway
            .create_transfer(TransferOrder {
                kind: Payment::KIND,
                correlation_key: payment.header.correlation_key.clone(),
                amount: payment.header.amount,
                source_account: payment.source_account.clone(),
                beneficiary: payment.beneficiary.clone(),
                description: payment.description.clone(),
                callback_url: self.callback_url.clone(),
                original_end_to_end_id: None,
            })
            .await?;
        payment.external_ref = Some(receipt.external_ref);
        Ok(())
    }
}

#[derive(Clone)]
pub struct PaymentService {
    payments: TransitionRunner<Payment>,
    gateway: Arc<dyn SettlementGateway>,
    accounts: Arc<dyn AccountDirectory>,
}

impl PaymentService {
    pub fn new(
        payments: TransitionRunner<Payment>,
        gateway: Arc<dyn SettlementGateway>,
        accounts: Arc<dyn AccountDirectory>,
    ) -> Self {
        Self {
            payments,
            gateway,
            accounts,
        }
    }

    /// Record an outgoing payment in PENDING. The paying account must be active.
    pub async fn register(
        &self,
        ctx: &Context,
        patch: NewPayment,
    ) -> Result<Outcome<Payment>, EngineError> {
        let ctx = ctx.for_kind(Payment::KIND);
        async {
            let NewPayment {
                end_to_end_id,
                amount,
                source_account,
                beneficiary,
                description,
            } = patch;
            let end_to_end_id = non_blank(end_to_end_id);
            let amount = amount.filter(|a| *a > 0);
            let source_account = non_blank(source_account);
            require!(end_to_end_id, amount, source_account, beneficiary);

            if let Some(existing) = self.payments.find(Lookup::Key(&end_to_end_id)).await? {
                return Ok(Outcome::Unchanged(existing));
            }
            ensure_active(self.accounts.as_ref(), &source_account).await?;

            self.payments
                .create(Payment::new(end_to_end_id, amount, source_account, beneficiary, description))
                .await
        }
        .instrument(ctx.span())
        .await
    }

    /// Debit the client, then hand the transfer to the PSP
    pub async fn submit(&self, ctx: &Context, lookup: Lookup<'_>) -> Result<Outcome<Payment>, EngineError> {
        let ctx = ctx.for_kind(Payment::KIND);
        let span = ctx.span();
        let hooks = SendPayment {
            gateway: self.gateway.clone(),
            callback_url: self.payments.config().gateway.callback_url("payments"),
        };
        self.payments
            .fire(&ctx, lookup, PaymentEvent::Submit, &hooks)
            .instrument(span)
            .await
    }

    pub async fn confirm(&self, ctx: &Context, lookup: Lookup<'_>) -> Result<Outcome<Payment>, EngineError> {
        let ctx = ctx.for_kind(Payment::KIND);
        let span = ctx.span();
        self.payments
            .fire(&ctx, lookup, PaymentEvent::Confirm, &NoHooks)
            .instrument(span)
            .await
    }

    pub async fn fail(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
        failure_reason: Option<String>,
    ) -> Result<Outcome<Payment>, EngineError> {
        let ctx = ctx.for_kind(Payment::KIND);
        let span = ctx.span();
        let failure_reason = non_blank(failure_reason);
        let hooks = Patch(move |p: &mut Payment| p.failure_reason = failure_reason.clone());
        self.payments
            .fire(&ctx, lookup, PaymentEvent::Fail, &hooks)
            .instrument(span)
            .await
    }

    /// Chargeback of a confirmed payment: reverts the debit
    pub async fn chargeback(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
        chargeback_reason: Option<String>,
    ) -> Result<Outcome<Payment>, EngineError> {
        let ctx = ctx.for_kind(Payment::KIND);
        let span = ctx.span();
        let chargeback_reason = non_blank(chargeback_reason);
        require!(chargeback_reason);
        let hooks = Patch(move |p: &mut Payment| p.chargeback_reason = Some(chargeback_reason.clone()));
        self.payments
            .fire(&ctx, lookup, PaymentEvent::Revert, &hooks)
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
    use crate::types::OperationRef;

    fn service(mocks: &MockPorts) -> PaymentService {
        let ports = mocks.ports();
        PaymentService::new(
            TransitionRunner::new(
                Arc::new(InMemoryRepository::<Payment>::new()),
                &ports,
                Arc::new(EngineConfig::default()),
            ),
            ports.gateway.clone(),
            ports.accounts.clone(),
        )
    }

    fn new_payment(key: &str) -> NewPayment {
        NewPayment {
            end_to_end_id: Some(key.into()),
            amount: Some(2_500),
            source_account: Some("acc-1".into()),
            beneficiary: Some(Counterparty::default()),
            description: Some("rent".into()),
        }
    }

    #[tokio::test]
    async fn test_full_lifecycle_with_chargeback() {
        let mocks = MockPorts::with_active_accounts(&["acc-1"]);
        let svc = service(&mocks);
        let ctx = Context::new("p-1");

        let payment = svc.register(&ctx, new_payment("E1")).await.unwrap().into_inner();
        svc.submit(&ctx, Lookup::Key("E1")).await.unwrap();
        svc.confirm(&ctx, Lookup::Key("E1")).await.unwrap();
        let reverted = svc
            .chargeback(&ctx, Lookup::Key("E1"), Some("MED".into()))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(reverted.state(), PaymentState::Reverted);
        assert_eq!(reverted.chargeback_reason.as_deref(), Some("MED"));
        let op = mocks
            .ledger
            .operation(&OperationRef::for_instrument(Payment::KIND, payment.id()))
            .unwrap();
        assert_eq!(op.state, OperationState::Reverted);
        assert_eq!(mocks.gateway.transfers().len(), 1);
        assert!(mocks.gateway.transfers()[0].callback_url.ends_with("/payments"));
    }

    #[tokio::test]
    async fn test_inactive_source_account_rejected() {
        let mocks = MockPorts::new();
        mocks.accounts.set("acc-1", false);
        let err = service(&mocks)
            .register(&Context::new("p-2"), new_payment("E2"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::CounterpartyNotActive {
                account: "acc-1".into(),
                reason: "inactive".into()
            }
        );
    }

    #[tokio::test]
    async fn test_redelivered_submit_debits_once() {
        let mocks = MockPorts::with_active_accounts(&["acc-1"]);
        let svc = service(&mocks);
        let ctx = Context::new("p-3");
        svc.register(&ctx, new_payment("E3")).await.unwrap();

        for _ in 0..3 {
            svc.submit(&ctx, Lookup::Key("E3")).await.unwrap();
        }

        assert_eq!(mocks.ledger.create_calls(), 1);
        assert_eq!(mocks.gateway.calls("create_transfer"), 1);
    }

    #[tokio::test]
    async fn test_chargeback_requires_reason() {
        let mocks = MockPorts::new();
        let err = service(&mocks)
            .chargeback(&Context::new("p-4"), Lookup::Key("E4"), Some(" ".into()))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::missing("chargeback_reason"));
    }
}

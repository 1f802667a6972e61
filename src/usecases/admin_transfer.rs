//! Administrative TED use cases

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{Instrument as _, warn};

use super::{Patch, non_blank};
use crate::context::Context;
use crate::error::EngineError;
use crate::fsm::{Instrument, Lookup, NoHooks, Outcome, Transition, TransitionHooks, TransitionRunner};
use crate::instruments::admin_transfer::{
    AdminAccount, AdminTransfer, AdminTransferEvent, AdminTransferState, TransferConfirmation,
};
use crate::ports::AccountDirectory;
use crate::ports::accounts::ensure_active;
use crate::ports::gateway::{SettlementGateway, TransferOrder};
use crate::require;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAdminTransfer {
    pub key: Option<String>,
    /// Minor units
    pub amount: Option<u64>,
    pub source: Option<AdminAccount>,
    pub destination: Option<AdminAccount>,
    pub description: Option<String>,
}

struct SendTed {
    gateway: Arc<dyn SettlementGateway>,
    callback_url: String,
}

#[async_trait]
impl TransitionHooks<AdminTransfer> for SendTed {
    async fn gateway(
        &self,
        _ctx: &Context,
        transfer: &mut AdminTransfer,
        _transition: &Transition<AdminTransferState, AdminTransferEvent>,
    ) -> Result<(), EngineError> {
        let receipt = self
            .gateway
            .create_transfer(TransferOrder {
                kind: AdminTransfer::KIND,
                correlation_key: transfer.header.correlation_key.clone(),
                amount: transfer.header.amount,
                source_account: transfer.source.id.clone(),
                beneficiary: transfer.destination.holder.clone(),
                description: transfer.description.clone(),
                callback_url: self.callback_url.clone(),
                original_end_to_end_id: None,
            })
            .await?;
        transfer.external_ref = Some(receipt.external_ref);
        Ok(())
    }
}

#[derive(Clone)]
pub struct AdminTransferService {
    transfers: TransitionRunner<AdminTransfer>,
    accounts: Arc<dyn AccountDirectory>,
    gateway: Arc<dyn SettlementGateway>,
}

impl AdminTransferService {
    pub fn new(
        transfers: TransitionRunner<AdminTransfer>,
        accounts: Arc<dyn AccountDirectory>,
        gateway: Arc<dyn SettlementGateway>,
    ) -> Self {
        Self {
            transfers,
            accounts,
            gateway,
        }
    }

    /// Record a transfer between two institution accounts, in PENDING.
    ///
    /// Same-account transfers are rejected before anything is read or stored.
    pub async fn create(
        &self,
        ctx: &Context,
        patch: NewAdminTransfer,
    ) -> Result<Outcome<AdminTransfer>, EngineError> {
        let ctx = ctx.for_kind(AdminTransfer::KIND);
        async {
            let NewAdminTransfer {
                key,
                amount,
                source,
                destination,
                description,
            } = patch;
            let key = non_blank(key);
            let amount = amount.filter(|a| *a > 0);
            require!(key, amount, source, destination);

            if source.id.trim() == destination.id.trim() {
                return Err(EngineError::SameAccount { account: source.id });
            }

            if let Some(existing) = self.transfers.find(Lookup::Key(&key)).await? {
                return Ok(Outcome::Unchanged(existing));
            }
            ensure_active(self.accounts.as_ref(), &source.id).await?;
            ensure_active(self.accounts.as_ref(), &destination.id).await?;

            self.transfers
                .create(AdminTransfer::new(key, amount, source, destination, description))
                .await
        }
        .instrument(ctx.span())
        .await
    }

    /// Hand the TED to the settlement network
    pub async fn send(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
    ) -> Result<Outcome<AdminTransfer>, EngineError> {
        let ctx = ctx.for_kind(AdminTransfer::KIND);
        let span = ctx.span();
        async {
            let transfer = self.transfers.load(lookup).await?;
            let hooks = SendTed {
                gateway: self.gateway.clone(),
                callback_url: self
                    .transfers
                    .config()
                    .gateway
                    .callback_url(&format!("admin-teds/{}", transfer.id())),
            };
            self.transfers
                .fire_on(&ctx, transfer, AdminTransferEvent::Send, &hooks)
                .await
        }
        .instrument(span)
        .await
    }

    /// Settle a waiting TED against the network's report.
    ///
    /// Any disagreement between the report and the request fails with one
    /// `ConfirmationMismatch` naming every differing field; the transfer stays
    /// WAITING.
    pub async fn confirm(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
        confirmation: TransferConfirmation,
    ) -> Result<Outcome<AdminTransfer>, EngineError> {
        let ctx = ctx.for_kind(AdminTransfer::KIND);
        let span = ctx.span();
        async {
            let transfer = self.transfers.load(lookup).await?;
            if transfer.state() == AdminTransferState::Waiting {
                let fields = transfer.mismatches(&confirmation);
                if !fields.is_empty() {
                    warn!(transfer = %transfer.id(), fields = ?fields, "TED confirmation mismatch");
                    return Err(EngineError::ConfirmationMismatch { fields });
                }
            }
            self.transfers
                .fire_on(&ctx, transfer, AdminTransferEvent::Confirm, &NoHooks)
                .await
        }
        .instrument(span)
        .await
    }

    pub async fn fail(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
        failure_reason: Option<String>,
    ) -> Result<Outcome<AdminTransfer>, EngineError> {
        let ctx = ctx.for_kind(AdminTransfer::KIND);
        let span = ctx.span();
        let failure_reason = non_blank(failure_reason);
        let hooks = Patch(move |t: &mut AdminTransfer| t.failure_reason = failure_reason.clone());
        self.transfers
            .fire(&ctx, lookup, AdminTransferEvent::Fail, &hooks)
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
    use crate::types::Counterparty;

    fn service(mocks: &MockPorts) -> (AdminTransferService, Arc<InMemoryRepository<AdminTransfer>>) {
        let ports = mocks.ports();
        let repo = Arc::new(InMemoryRepository::<AdminTransfer>::new());
        let service = AdminTransferService::new(
            TransitionRunner::new(repo.clone(), &ports, Arc::new(EngineConfig::default())),
            ports.accounts.clone(),
            ports.gateway.clone(),
        );
        (service, repo)
    }

    fn account(id: &str) -> AdminAccount {
        AdminAccount {
            id: id.into(),
            holder: Counterparty {
                name: Some("Treasury".into()),
                document: "12345678000190".into(),
                bank_code: "1".into(),
                branch: "42".into(),
                account_number: "99887".into(),
                account_type: "CHECKING".into(),
            },
        }
    }

    fn ted(key: &str, source: &str, destination: &str) -> NewAdminTransfer {
        NewAdminTransfer {
            key: Some(key.into()),
            amount: Some(50_000),
            source: Some(account(source)),
            destination: Some(account(destination)),
            description: None,
        }
    }

    fn confirmation(amount: u64) -> TransferConfirmation {
        TransferConfirmation {
            amount,
            bank_code: "001".into(),
            branch: "0042".into(),
            account_number: "99887".into(),
            account_type: "checking".into(),
        }
    }

    #[tokio::test]
    async fn test_same_account_rejected_before_storage() {
        let mocks = MockPorts::with_active_accounts(&["ops"]);
        let (svc, repo) = service(&mocks);

        let err = svc
            .create(&Context::new("t-1"), ted("TED-1", "ops", "ops"))
            .await
            .unwrap_err();

        assert_eq!(err, EngineError::SameAccount { account: "ops".into() });
        assert!(repo.is_empty());
        assert_eq!(mocks.emitter.count(), 0);
    }

    #[tokio::test]
    async fn test_send_uses_callback_per_transfer() {
        let mocks = MockPorts::with_active_accounts(&["ops", "reserve"]);
        let (svc, _) = service(&mocks);
        let ctx = Context::new("t-2");

        let created = svc.create(&ctx, ted("TED-2", "ops", "reserve")).await.unwrap().into_inner();
        let sent = svc.send(&ctx, Lookup::Key("TED-2")).await.unwrap().into_inner();

        assert_eq!(sent.state(), AdminTransferState::Waiting);
        let order = &mocks.gateway.transfers()[0];
        assert_eq!(order.source_account, "ops");
        assert!(order.callback_url.ends_with(&format!("admin-teds/{}", created.id())));
    }

    #[tokio::test]
    async fn test_confirm_mismatch_keeps_waiting() {
        let mocks = MockPorts::with_active_accounts(&["ops", "reserve"]);
        let (svc, _) = service(&mocks);
        let ctx = Context::new("t-3");
        svc.create(&ctx, ted("TED-3", "ops", "reserve")).await.unwrap();
        svc.send(&ctx, Lookup::Key("TED-3")).await.unwrap();

        let err = svc
            .confirm(&ctx, Lookup::Key("TED-3"), confirmation(49_000))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::ConfirmationMismatch { fields: vec!["amount"] });

        let confirmed = svc
            .confirm(&ctx, Lookup::Key("TED-3"), confirmation(50_000))
            .await
            .unwrap();
        assert!(confirmed.is_applied());
        assert_eq!(confirmed.get().state(), AdminTransferState::Confirmed);

        // A late, stale report on a confirmed TED is a no-op
        let replay = svc
            .confirm(&ctx, Lookup::Key("TED-3"), confirmation(1))
            .await
            .unwrap();
        assert!(!replay.is_applied());
    }

    #[tokio::test]
    async fn test_inactive_destination_rejected() {
        let mocks = MockPorts::with_active_accounts(&["ops"]);
        let (svc, repo) = service(&mocks);
        let err = svc
            .create(&Context::new("t-4"), ted("TED-4", "ops", "closed"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::CounterpartyNotActive {
                account: "closed".into(),
                reason: "not found".into()
            }
        );
        assert!(repo.is_empty());
    }
}

//! Deposit use cases
//!
//! Incoming Pix credits and the compliance path around them: a waiting
//! deposit is either approved (credited) or flagged with a warning. A
//! rejected warning turns into a devolution of the deposit to its payer.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{Instrument as _, info};

use super::devolution::DevolutionService;
use super::{Patch, non_blank};
use crate::context::Context;
use crate::error::EngineError;
use crate::fsm::{Instrument, Lookup, NoHooks, Outcome, TransitionRunner};
use crate::guard::expect_state;
use crate::instruments::deposit::{Deposit, DepositEvent, DepositState};
use crate::instruments::devolution::Devolution;
use crate::instruments::warning::{DepositWarning, WarningEvent, WarningState};
use crate::ports::AccountDirectory;
use crate::ports::accounts::ensure_active;
use crate::require;
use crate::types::Counterparty;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDeposit {
    pub end_to_end_id: Option<String>,
    /// Minor units
    pub amount: Option<u64>,
    pub payer: Option<Counterparty>,
    pub client_account: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewWarning {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDevolution {
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct DepositService {
    deposits: TransitionRunner<Deposit>,
    warnings: TransitionRunner<DepositWarning>,
    devolutions: DevolutionService,
    accounts: Arc<dyn AccountDirectory>,
}

impl DepositService {
    pub fn new(
        deposits: TransitionRunner<Deposit>,
        warnings: TransitionRunner<DepositWarning>,
        devolutions: DevolutionService,
        accounts: Arc<dyn AccountDirectory>,
    ) -> Self {
        Self {
            deposits,
            warnings,
            devolutions,
            accounts,
        }
    }

    /// Record an incoming deposit in NEW
    pub async fn register(
        &self,
        ctx: &Context,
        patch: NewDeposit,
    ) -> Result<Outcome<Deposit>, EngineError> {
        let ctx = ctx.for_kind(Deposit::KIND);
        async {
            let NewDeposit {
                end_to_end_id,
                amount,
                payer,
                client_account,
                description,
            } = patch;
            let amount = amount.filter(|a| *a > 0);
            let end_to_end_id = non_blank(end_to_end_id);
            let client_account = non_blank(client_account);
            require!(end_to_end_id, amount, client_account);

            let deposit = Deposit::new(
                end_to_end_id,
                amount,
                payer.unwrap_or_default(),
                client_account,
                description,
            );
            self.deposits.create(deposit).await
        }
        .instrument(ctx.span())
        .await
    }

    pub async fn hold(&self, ctx: &Context, lookup: Lookup<'_>) -> Result<Outcome<Deposit>, EngineError> {
        let ctx = ctx.for_kind(Deposit::KIND);
        let span = ctx.span();
        self.deposits
            .fire(&ctx, lookup, DepositEvent::Hold, &NoHooks)
            .instrument(span)
            .await
    }

    /// Credit the client account. The account must be active, and a warning
    /// raised on the deposit must have been approved first.
    pub async fn approve(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
    ) -> Result<Outcome<Deposit>, EngineError> {
        let ctx = ctx.for_kind(Deposit::KIND);
        let span = ctx.span();
        async {
            let deposit = self.deposits.load(lookup).await?;
            if let Some(warning) = self
                .warnings
                .find(Lookup::Key(&DepositWarning::correlation_key_for(deposit.id())))
                .await?
            {
                expect_state(&warning, "approve", &[WarningState::Approved])?;
            }
            self.ensure_creditable(&deposit).await?;
            self.deposits
                .fire_on(&ctx, deposit, DepositEvent::Receive, &NoHooks)
                .await
        }
        .instrument(span)
        .await
    }

    async fn ensure_creditable(&self, deposit: &Deposit) -> Result<(), EngineError> {
        if deposit.header.is_terminal() {
            return Ok(());
        }
        ensure_active(self.accounts.as_ref(), &deposit.client_account).await
    }

    /// Raise a compliance warning on a waiting deposit
    pub async fn flag(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
        patch: NewWarning,
    ) -> Result<Outcome<DepositWarning>, EngineError> {
        let ctx = ctx.for_kind(DepositWarning::KIND);
        let span = ctx.span();
        async {
            let reason = non_blank(patch.reason);
            require!(reason);

            let deposit = self.deposits.load(lookup).await?;
            if let Some(existing) = self
                .warnings
                .find(Lookup::Key(&DepositWarning::correlation_key_for(deposit.id())))
                .await?
            {
                return Ok(Outcome::Unchanged(existing));
            }
            expect_state(&deposit, "flag", &[DepositState::Waiting])?;

            self.warnings
                .create(DepositWarning::new(deposit.id(), reason))
                .await
        }
        .instrument(span)
        .await
    }

    /// Clear a warning and credit its deposit
    pub async fn approve_warning(
        &self,
        ctx: &Context,
        warning: Lookup<'_>,
    ) -> Result<Outcome<Deposit>, EngineError> {
        let warning_ctx = ctx.for_kind(DepositWarning::KIND);
        let span = warning_ctx.span();
        let deposit_id = async {
            let warning = self.warnings.load(warning).await?;
            let deposit_id = warning.deposit_id;
            let deposit = self.deposits.load(Lookup::Id(deposit_id)).await?;
            self.ensure_creditable(&deposit).await?;
            self.warnings
                .fire_on(&warning_ctx, warning, WarningEvent::Approve, &NoHooks)
                .await?;
            Ok::<_, EngineError>(deposit_id)
        }
        .instrument(span)
        .await?;

        self.approve(ctx, Lookup::Id(deposit_id)).await
    }

    /// Block the deposit, reject its warning and return the funds to the payer.
    ///
    /// Safe to redeliver: every step is a no-op once done, and the devolution
    /// is keyed by its deposit, so a replay finds the existing one.
    pub async fn create_warning_devolution(
        &self,
        ctx: &Context,
        warning: Lookup<'_>,
        patch: NewDevolution,
    ) -> Result<Outcome<Devolution>, EngineError> {
        let ctx = ctx.for_kind(Devolution::KIND);
        let span = ctx.span();
        async {
            let warning = self.warnings.load(warning).await?;
            expect_state(
                &warning,
                "create_warning_devolution",
                &[WarningState::Created, WarningState::Rejected],
            )?;
            let deposit = self.deposits.load(Lookup::Id(warning.deposit_id)).await?;
            expect_state(
                &deposit,
                "create_warning_devolution",
                &[DepositState::Waiting, DepositState::Blocked],
            )?;

            let deposit = self
                .deposits
                .fire_on(&ctx.for_kind(Deposit::KIND), deposit, DepositEvent::Block, &NoHooks)
                .await?
                .into_inner();
            let funding_account = deposit
                .funds_account(&self.deposits.config().ledger)
                .ok_or_else(|| {
                    EngineError::System(format!("blocked deposit {} holds no funds", deposit.id()))
                })?
                .to_string();
            let warning = self
                .warnings
                .fire_on(
                    &ctx.for_kind(DepositWarning::KIND),
                    warning,
                    WarningEvent::Reject,
                    &NoHooks,
                )
                .await?
                .into_inner();

            let devolution = Devolution::new(
                deposit.id(),
                warning.id(),
                deposit.header.amount,
                deposit.client_account.clone(),
                deposit.payer.clone(),
                deposit.end_to_end_id(),
                patch.description,
            )
            .funded_from(funding_account);
            let created = self.devolutions.runner().create(devolution).await?;
            let submitted = self
                .devolutions
                .submit(&ctx, Lookup::Id(created.get().id()))
                .await?;

            info!(
                deposit = %deposit.id(),
                devolution = %submitted.get().id(),
                created = created.is_applied(),
                submitted = submitted.is_applied(),
                "Warning devolution requested"
            );

            Ok(match (created.is_applied(), submitted) {
                (true, outcome) => Outcome::Applied(outcome.into_inner()),
                (false, outcome) => outcome,
            })
        }
        .instrument(span)
        .await
    }

    pub async fn fail(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
        failure_reason: Option<String>,
    ) -> Result<Outcome<Deposit>, EngineError> {
        let ctx = ctx.for_kind(Deposit::KIND);
        let span = ctx.span();
        let failure_reason = non_blank(failure_reason);
        let hooks = Patch(move |d: &mut Deposit| d.failure_reason = failure_reason.clone());
        self.deposits
            .fire(&ctx, lookup, DepositEvent::Fail, &hooks)
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

    fn service(mocks: &MockPorts) -> DepositService {
        let ports = mocks.ports();
        let config = Arc::new(EngineConfig::default());
        let devolutions = DevolutionService::new(
            TransitionRunner::new(
                Arc::new(InMemoryRepository::<Devolution>::new()),
                &ports,
                config.clone(),
            ),
            ports.gateway.clone(),
        );
        DepositService::new(
            TransitionRunner::new(
                Arc::new(InMemoryRepository::<Deposit>::new()),
                &ports,
                config.clone(),
            ),
            TransitionRunner::new(
                Arc::new(InMemoryRepository::<DepositWarning>::new()),
                &ports,
                config,
            ),
            devolutions,
            ports.accounts.clone(),
        )
    }

    fn new_deposit(key: &str) -> NewDeposit {
        NewDeposit {
            end_to_end_id: Some(key.into()),
            amount: Some(1_000),
            payer: Some(Counterparty::default()),
            client_account: Some("acc-1".into()),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_register_reports_all_missing_fields() {
        let mocks = MockPorts::new();
        let err = service(&mocks)
            .register(&Context::new("d-1"), NewDeposit::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::MissingRequiredField {
                fields: vec!["end_to_end_id", "amount", "client_account"]
            }
        );
    }

    #[tokio::test]
    async fn test_approve_requires_active_account() {
        let mocks = MockPorts::new();
        let svc = service(&mocks);
        let ctx = Context::new("d-2");
        svc.register(&ctx, new_deposit("E1")).await.unwrap();
        svc.hold(&ctx, Lookup::Key("E1")).await.unwrap();

        let err = svc.approve(&ctx, Lookup::Key("E1")).await.unwrap_err();
        assert!(matches!(err, EngineError::CounterpartyNotActive { .. }));
        assert_eq!(mocks.ledger.create_calls(), 0);

        mocks.accounts.set("acc-1", true);
        let outcome = svc.approve(&ctx, Lookup::Key("E1")).await.unwrap();
        assert_eq!(outcome.get().state(), DepositState::Received);
        assert_eq!(mocks.ledger.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_flag_requires_waiting_deposit() {
        let mocks = MockPorts::new();
        let svc = service(&mocks);
        let ctx = Context::new("d-3");
        svc.register(&ctx, new_deposit("E2")).await.unwrap();

        let err = svc
            .flag(&ctx, Lookup::Key("E2"), NewWarning { reason: Some("PEP".into()) })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { current: "NEW", .. }));
    }

    #[tokio::test]
    async fn test_approve_warning_credits_deposit() {
        let mocks = MockPorts::with_active_accounts(&["acc-1"]);
        let svc = service(&mocks);
        let ctx = Context::new("d-4");
        svc.register(&ctx, new_deposit("E3")).await.unwrap();
        svc.hold(&ctx, Lookup::Key("E3")).await.unwrap();
        let warning = svc
            .flag(&ctx, Lookup::Key("E3"), NewWarning { reason: Some("limits".into()) })
            .await
            .unwrap()
            .into_inner();

        let deposit = svc
            .approve_warning(&ctx, Lookup::Id(warning.id()))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(deposit.state(), DepositState::Received);
        let warning = svc.warnings.load(Lookup::Id(warning.id())).await.unwrap();
        assert_eq!(warning.state(), WarningState::Approved);
    }

    async fn flagged(svc: &DepositService, ctx: &Context, key: &str) -> DepositWarning {
        svc.register(ctx, new_deposit(key)).await.unwrap();
        svc.hold(ctx, Lookup::Key(key)).await.unwrap();
        svc.flag(ctx, Lookup::Key(key), NewWarning { reason: Some("PEP".into()) })
            .await
            .unwrap()
            .into_inner()
    }

    #[tokio::test]
    async fn test_approve_refused_while_warning_open() {
        let mocks = MockPorts::with_active_accounts(&["acc-1"]);
        let svc = service(&mocks);
        let ctx = Context::new("d-5");
        flagged(&svc, &ctx, "E5").await;

        let err = svc.approve(&ctx, Lookup::Key("E5")).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidState {
                event: "approve",
                current: "CREATED",
                ..
            }
        ));
        assert_eq!(mocks.ledger.total_calls(), 0);
        let deposit = svc.deposits.load(Lookup::Key("E5")).await.unwrap();
        assert_eq!(deposit.state(), DepositState::Waiting);
    }

    #[tokio::test]
    async fn test_approve_warning_checks_account_before_approving() {
        let mocks = MockPorts::new();
        let svc = service(&mocks);
        let ctx = Context::new("d-6");
        let warning = flagged(&svc, &ctx, "E6").await;

        let err = svc
            .approve_warning(&ctx, Lookup::Id(warning.id()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CounterpartyNotActive { .. }));
        let warning = svc.warnings.load(Lookup::Id(warning.id())).await.unwrap();
        assert_eq!(warning.state(), WarningState::Created);
    }

    #[tokio::test]
    async fn test_warning_devolution_returns_quarantined_funds() {
        let mocks = MockPorts::with_active_accounts(&["acc-1"]);
        let svc = service(&mocks);
        let ctx = Context::new("d-7");
        let warning = flagged(&svc, &ctx, "E7").await;

        let devolution = svc
            .create_warning_devolution(&ctx, Lookup::Id(warning.id()), NewDevolution::default())
            .await
            .unwrap()
            .into_inner();

        let config = EngineConfig::default();
        assert_eq!(devolution.funding_account, config.ledger.blocked_account);
        let operations = mocks.ledger.operations();
        assert_eq!(operations.len(), 2);
        assert!(
            operations
                .iter()
                .all(|op| op.source.as_deref() != Some("acc-1") && op.destination != "acc-1")
        );
        // Every unit debited from quarantine was first credited to it
        let net: i64 = operations
            .iter()
            .map(|op| {
                let credit = (op.destination == config.ledger.blocked_account) as i64;
                let debit = (op.source.as_deref() == Some(config.ledger.blocked_account.as_str())) as i64;
                (credit - debit) * op.amount as i64
            })
            .sum();
        assert_eq!(net, 0);
    }
}

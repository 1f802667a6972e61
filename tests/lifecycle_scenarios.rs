//! Lifecycle scenarios through the public API
//!
//! Runs with the default `mock-api` feature.

use std::sync::Arc;

use pix_lifecycle::adapters::mock::MockPorts;
use pix_lifecycle::adapters::{ChannelEmitter, InMemoryLease};
use pix_lifecycle::fsm::Instrument;
use pix_lifecycle::instruments::admin_transfer::{
    AdminAccount, AdminTransferState, TransferConfirmation,
};
use pix_lifecycle::instruments::fraud::FraudState;
use pix_lifecycle::instruments::payment::PaymentState;
use pix_lifecycle::ports::gateway::RemoteRecord;
use pix_lifecycle::ports::{LeaseProvider, Ports};
use pix_lifecycle::types::{Counterparty, InstrumentKind};
use pix_lifecycle::usecases::{NewAdminTransfer, NewFraudDetection, NewPayment};
use pix_lifecycle::{Context, EngineConfig, EngineError, Lookup, PixEngine, Repositories};

fn engine(mocks: &MockPorts) -> PixEngine {
    PixEngine::new(Repositories::in_memory(), mocks.ports(), EngineConfig::default())
}

fn beneficiary() -> Counterparty {
    Counterparty {
        name: Some("Maria".into()),
        document: "11122233344".into(),
        bank_code: "341".into(),
        branch: "0500".into(),
        account_number: "778899".into(),
        account_type: "CHECKING".into(),
    }
}

fn treasury(id: &str) -> AdminAccount {
    AdminAccount {
        id: id.into(),
        holder: Counterparty {
            name: Some("Bank Treasury".into()),
            document: "12345678000190".into(),
            bank_code: "77".into(),
            branch: "1".into(),
            account_number: "40001".into(),
            account_type: "CHECKING".into(),
        },
    }
}

// ========================================================================
// Payments
// ========================================================================

#[tokio::test]
async fn payment_confirmed_then_charged_back() {
    let mocks = MockPorts::with_active_accounts(&["acc-9"]);
    let engine = engine(&mocks);
    let ctx = Context::new("pay-1");
    let payments = engine.payments();

    payments
        .register(
            &ctx,
            NewPayment {
                end_to_end_id: Some("E2E-PAY-1".into()),
                amount: Some(12_345),
                source_account: Some("acc-9".into()),
                beneficiary: Some(beneficiary()),
                description: Some("invoice 42".into()),
            },
        )
        .await
        .unwrap();
    payments.submit(&ctx, Lookup::Key("E2E-PAY-1")).await.unwrap();
    payments.confirm(&ctx, Lookup::Key("E2E-PAY-1")).await.unwrap();

    let missing = payments
        .chargeback(&ctx, Lookup::Key("E2E-PAY-1"), Some("  ".into()))
        .await
        .unwrap_err();
    assert_eq!(
        missing,
        EngineError::MissingRequiredField {
            fields: vec!["chargeback_reason"]
        }
    );

    let reverted = payments
        .chargeback(&ctx, Lookup::Key("E2E-PAY-1"), Some("MED".into()))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(reverted.state(), PaymentState::Reverted);
    assert_eq!(reverted.chargeback_reason.as_deref(), Some("MED"));
    assert_eq!(mocks.ledger.create_calls(), 1);
    assert_eq!(mocks.ledger.revert_calls(), 1);
    assert_eq!(mocks.gateway.transfers()[0].amount, 12_345);
}

#[tokio::test]
async fn payment_from_inactive_account_rejected() {
    let mocks = MockPorts::new();
    let err = engine(&mocks)
        .payments()
        .register(
            &Context::new("pay-2"),
            NewPayment {
                end_to_end_id: Some("E2E-PAY-2".into()),
                amount: Some(100),
                source_account: Some("acc-closed".into()),
                beneficiary: Some(beneficiary()),
                description: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CounterpartyNotActive { .. }));
    assert_eq!(mocks.ledger.total_calls(), 0);
}

// ========================================================================
// Admin TED
// ========================================================================

#[tokio::test]
async fn admin_ted_confirmed_after_mismatch() {
    let mocks = MockPorts::with_active_accounts(&["ops", "reserve"]);
    let engine = engine(&mocks);
    let ctx = Context::new("ted-1");
    let teds = engine.admin_transfers();

    teds.create(
        &ctx,
        NewAdminTransfer {
            key: Some("TED-100".into()),
            amount: Some(1_000_000),
            source: Some(treasury("ops")),
            destination: Some(treasury("reserve")),
            description: Some("reserve top-up".into()),
        },
    )
    .await
    .unwrap();
    teds.send(&ctx, Lookup::Key("TED-100")).await.unwrap();

    let report = TransferConfirmation {
        amount: 1_000_000,
        bank_code: "077".into(),
        branch: "0001".into(),
        account_number: "40002".into(),
        account_type: "CHECKING".into(),
    };
    let err = teds
        .confirm(&ctx, Lookup::Key("TED-100"), report.clone())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::ConfirmationMismatch {
            fields: vec!["account_number"]
        }
    );

    let confirmed = teds
        .confirm(
            &ctx,
            Lookup::Key("TED-100"),
            TransferConfirmation {
                account_number: "40001".into(),
                ..report
            },
        )
        .await
        .unwrap()
        .into_inner();
    assert_eq!(confirmed.state(), AdminTransferState::Confirmed);
    assert_eq!(mocks.gateway.calls("create_transfer"), 1);
}

// ========================================================================
// Fraud markers
// ========================================================================

#[tokio::test]
async fn fraud_marker_registered_and_withdrawn() {
    let mocks = MockPorts::new();
    let engine = engine(&mocks);
    let ctx = Context::new("fraud-1");
    let frauds = engine.fraud_detections();

    let marker = NewFraudDetection {
        key: Some("FD-1".into()),
        document: Some("11122233344".into()),
        fraud_type: Some("APPLICATION_FRAUD".into()),
        pix_key: Some("maria@example.com".into()),
    };
    frauds.register(&ctx, marker.clone()).await.unwrap();
    frauds.register(&ctx, marker).await.unwrap();
    frauds.confirm_register(&ctx, Lookup::Key("FD-1")).await.unwrap();
    frauds.cancel_registration(&ctx, Lookup::Key("FD-1")).await.unwrap();
    let withdrawn = frauds
        .confirm_cancel_registration(&ctx, Lookup::Key("FD-1"))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(withdrawn.state(), FraudState::CancelRegisterConfirmed);
    assert_eq!(mocks.gateway.calls("register_fraud_detection"), 1);
    assert_eq!(mocks.gateway.calls("cancel_fraud_detection"), 1);
}

// ========================================================================
// Events
// ========================================================================

#[tokio::test]
async fn events_delivered_over_channel() {
    let mocks = MockPorts::with_active_accounts(&["acc-3"]);
    let (emitter, mut rx) = ChannelEmitter::new();
    let ports = Ports {
        emitter: Arc::new(emitter),
        ..mocks.ports()
    };
    let engine = PixEngine::new(Repositories::in_memory(), ports, EngineConfig::default());
    let ctx = Context::new("events-1");

    engine
        .payments()
        .register(
            &ctx,
            NewPayment {
                end_to_end_id: Some("E2E-EV-1".into()),
                amount: Some(700),
                source_account: Some("acc-3".into()),
                beneficiary: Some(beneficiary()),
                description: None,
            },
        )
        .await
        .unwrap();
    engine.payments().submit(&ctx, Lookup::Key("E2E-EV-1")).await.unwrap();
    engine.payments().submit(&ctx, Lookup::Key("E2E-EV-1")).await.unwrap();

    let created = rx.recv().await.unwrap();
    assert_eq!(created.topic, "pix_payment.pending");
    let event = rx.recv().await.unwrap();
    assert_eq!(event.topic, "pix_payment.waiting");
    assert_eq!(event.kind, InstrumentKind::Payment);
    assert_eq!(event.correlation_key, "E2E-EV-1");
    assert!(rx.try_recv().is_err());
}

// ========================================================================
// Reconciliation worker
// ========================================================================

#[tokio::test]
async fn worker_folds_remote_markers_under_lease() {
    let mocks = MockPorts::new();
    let engine = engine(&mocks);
    mocks.gateway.set_remote(
        InstrumentKind::FraudDetection,
        vec![Ok(RemoteRecord {
            correlation_key: "FD-REMOTE".into(),
            status: "ACTIVE".into(),
            document: Some("55566677788".into()),
            fraud_type: Some("SCAM".into()),
            external_id: Some("NET-FD-1".into()),
            ..Default::default()
        })],
    );
    let lease = Arc::new(InMemoryLease::new());
    let worker = engine.reconciliation_worker(lease.clone());

    let report = worker.tick().await.unwrap().unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(report.created, 1);

    let held = lease
        .try_acquire(
            &engine.config().reconciliation.lease_key,
            engine.config().reconciliation.lease_ttl(),
        )
        .await
        .unwrap();
    assert!(held.is_some());
    assert!(worker.tick().await.unwrap().is_none());
}

#[test]
fn config_rejects_zero_attempts() {
    let yaml = r#"
ledger:
  currency: "BRL"
  settlement_account: "settlement"
  refund_reserve_account: "reserve"
  tags:
    deposit_received: "PIXREC"
    devolution: "PIXDEVSEND"
    payment: "PIXSEND"
    refund: "PIXREFUND"
    refund_hold: "PIXREFUNDHOLD"
gateway:
  timeout_ms: 1500
  callback_base_url: "https://psp.example/cb"
max_attempts: 0
"#;
    assert!(matches!(
        EngineConfig::from_yaml(yaml),
        Err(EngineError::Config(_))
    ));
}

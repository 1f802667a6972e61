//! Pix Lifecycle Engine
//!
//! Wires repositories, ports and configuration into the use case services.
//! Services are cheap to clone; every clone shares the same collaborators.

use std::sync::Arc;

use tracing::info;

use crate::adapters::memory::InMemoryRepository;
use crate::compensation::CompensationOrchestrator;
use crate::config::EngineConfig;
use crate::fsm::TransitionRunner;
use crate::instruments::{
    AdminTransfer, Deposit, DepositWarning, Devolution, FraudDetection, Infraction, Payment,
    Refund, RefundLink,
};
use crate::ports::{InstrumentRepository, LeaseProvider, Ports};
use crate::reconciliation::{ReconciliationService, ReconciliationWorker};
use crate::usecases::{
    AdminTransferService, DepositService, DevolutionService, FraudDetectionService,
    InfractionService, PaymentService, RefundService,
};

/// One repository per instrument kind
#[derive(Clone)]
pub struct Repositories {
    pub deposits: Arc<dyn InstrumentRepository<Deposit>>,
    pub warnings: Arc<dyn InstrumentRepository<DepositWarning>>,
    pub devolutions: Arc<dyn InstrumentRepository<Devolution>>,
    pub payments: Arc<dyn InstrumentRepository<Payment>>,
    pub infractions: Arc<dyn InstrumentRepository<Infraction>>,
    pub refund_links: Arc<dyn InstrumentRepository<RefundLink>>,
    pub refunds: Arc<dyn InstrumentRepository<Refund>>,
    pub fraud_detections: Arc<dyn InstrumentRepository<FraudDetection>>,
    pub admin_transfers: Arc<dyn InstrumentRepository<AdminTransfer>>,
}

impl Repositories {
    /// Process-local repositories, for tests and local runs
    pub fn in_memory() -> Self {
        Self {
            deposits: Arc::new(InMemoryRepository::<Deposit>::new()),
            warnings: Arc::new(InMemoryRepository::<DepositWarning>::new()),
            devolutions: Arc::new(InMemoryRepository::<Devolution>::new()),
            payments: Arc::new(InMemoryRepository::<Payment>::new()),
            infractions: Arc::new(InMemoryRepository::<Infraction>::new()),
            refund_links: Arc::new(InMemoryRepository::<RefundLink>::new()),
            refunds: Arc::new(InMemoryRepository::<Refund>::new()),
            fraud_detections: Arc::new(InMemoryRepository::<FraudDetection>::new()),
            admin_transfers: Arc::new(InMemoryRepository::<AdminTransfer>::new()),
        }
    }
}

#[derive(Clone)]
pub struct PixEngine {
    config: Arc<EngineConfig>,
    deposits: DepositService,
    devolutions: DevolutionService,
    payments: PaymentService,
    infractions: InfractionService,
    refunds: RefundService,
    fraud_detections: FraudDetectionService,
    admin_transfers: AdminTransferService,
    compensation: CompensationOrchestrator,
    reconciliation: ReconciliationService,
}

impl PixEngine {
    pub fn new(repos: Repositories, ports: Ports, config: EngineConfig) -> Self {
        let config = Arc::new(config);

        let infraction_runner = TransitionRunner::new(repos.infractions, &ports, config.clone());
        let link_runner = TransitionRunner::new(repos.refund_links, &ports, config.clone());
        let compensation = CompensationOrchestrator::new(link_runner.clone());

        let devolutions = DevolutionService::new(
            TransitionRunner::new(repos.devolutions, &ports, config.clone()),
            ports.gateway.clone(),
        );
        let deposits = DepositService::new(
            TransitionRunner::new(repos.deposits, &ports, config.clone()),
            TransitionRunner::new(repos.warnings, &ports, config.clone()),
            devolutions.clone(),
            ports.accounts.clone(),
        );
        let payments = PaymentService::new(
            TransitionRunner::new(repos.payments, &ports, config.clone()),
            ports.gateway.clone(),
            ports.accounts.clone(),
        );
        let infractions = InfractionService::new(
            infraction_runner.clone(),
            link_runner,
            compensation.clone(),
            ports.gateway.clone(),
        );
        let refunds = RefundService::new(
            TransitionRunner::new(repos.refunds, &ports, config.clone()),
            infraction_runner,
            compensation.clone(),
            ports.gateway.clone(),
        );
        let fraud_detections = FraudDetectionService::new(
            TransitionRunner::new(repos.fraud_detections, &ports, config.clone()),
            ports.gateway.clone(),
        );
        let admin_transfers = AdminTransferService::new(
            TransitionRunner::new(repos.admin_transfers, &ports, config.clone()),
            ports.accounts.clone(),
            ports.gateway.clone(),
        );
        let reconciliation = ReconciliationService::new(
            infractions.clone(),
            refunds.clone(),
            fraud_detections.clone(),
            ports.gateway.clone(),
            config.clone(),
        );

        info!(
            currency = %config.ledger.currency,
            max_attempts = config.max_attempts,
            gateway_timeout_ms = config.gateway.timeout_ms,
            "Pix lifecycle engine ready"
        );

        Self {
            config,
            deposits,
            devolutions,
            payments,
            infractions,
            refunds,
            fraud_detections,
            admin_transfers,
            compensation,
            reconciliation,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn deposits(&self) -> &DepositService {
        &self.deposits
    }

    pub fn devolutions(&self) -> &DevolutionService {
        &self.devolutions
    }

    pub fn payments(&self) -> &PaymentService {
        &self.payments
    }

    pub fn infractions(&self) -> &InfractionService {
        &self.infractions
    }

    pub fn refunds(&self) -> &RefundService {
        &self.refunds
    }

    pub fn fraud_detections(&self) -> &FraudDetectionService {
        &self.fraud_detections
    }

    pub fn admin_transfers(&self) -> &AdminTransferService {
        &self.admin_transfers
    }

    pub fn compensation(&self) -> &CompensationOrchestrator {
        &self.compensation
    }

    pub fn reconciliation(&self) -> &ReconciliationService {
        &self.reconciliation
    }

    /// Periodic reconciliation trigger guarded by `lease`
    pub fn reconciliation_worker(&self, lease: Arc<dyn LeaseProvider>) -> ReconciliationWorker {
        ReconciliationWorker::new(self.reconciliation.clone(), lease, &self.config.reconciliation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockPorts;
    use crate::instruments::{
        admin_transfer, deposit, devolution, fraud, infraction, payment, refund, refund_link,
        warning,
    };

    #[test]
    fn test_all_tables_are_well_formed() {
        deposit::TABLE.validate().unwrap();
        warning::TABLE.validate().unwrap();
        devolution::TABLE.validate().unwrap();
        payment::TABLE.validate().unwrap();
        infraction::TABLE.validate().unwrap();
        refund_link::TABLE.validate().unwrap();
        refund::TABLE.validate().unwrap();
        fraud::TABLE.validate().unwrap();
        admin_transfer::TABLE.validate().unwrap();
    }

    #[test]
    fn test_engine_keeps_config() {
        let config = EngineConfig {
            max_attempts: 7,
            ..Default::default()
        };
        let engine = PixEngine::new(Repositories::in_memory(), MockPorts::new().ports(), config);
        assert_eq!(engine.config().max_attempts, 7);
    }
}

//! Reconciliation pass
//!
//! Pulls the network's view of infractions, refunds and fraud detections over
//! the configured lookback window and folds every record into local state.
//! A record that cannot be interpreted is an anomaly; a record whose fold
//! fails is a failure. Neither stops the batch.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{Instrument as _, debug, error, info, warn};

use super::remote::{
    RemoteFraudStatus, RemoteInfractionStatus, RemoteRefundStatus, plan_fraud, plan_infraction,
    plan_refund,
};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::EngineError;
use crate::fsm::{Instrument, Lookup, Outcome};
use crate::instruments::fraud::FraudDetection;
use crate::instruments::infraction::{AnalysisResult, Infraction};
use crate::instruments::refund::{Refund, RefundState};
use crate::money::{BRL_DECIMALS, parse_minor_units};
use crate::ports::gateway::{ReconciliationWindow, RemoteRecord, SettlementGateway};
use crate::types::InstrumentKind;
use crate::usecases::{FraudDetectionService, InfractionService, Patch, RefundService, non_blank};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anomaly {
    pub kind: InstrumentKind,
    pub correlation_key: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub kind: InstrumentKind,
    /// `None` when the whole fetch for `kind` failed
    pub correlation_key: Option<String>,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub fetched: usize,
    /// Network-initiated instruments seen for the first time
    pub created: usize,
    /// Records that moved local state
    pub advanced: usize,
    pub unchanged: usize,
    /// Links closed by compensation or settlement
    pub compensated: usize,
    pub anomalies: Vec<Anomaly>,
    pub failures: Vec<RecordFailure>,
}

impl ReconciliationReport {
    pub fn merge(&mut self, other: ReconciliationReport) {
        self.fetched += other.fetched;
        self.created += other.created;
        self.advanced += other.advanced;
        self.unchanged += other.unchanged;
        self.compensated += other.compensated;
        self.anomalies.extend(other.anomalies);
        self.failures.extend(other.failures);
    }

    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty() && self.failures.is_empty()
    }
}

/// What folding one record did
#[derive(Debug, Default)]
struct Folded {
    created: bool,
    advanced: bool,
    compensated: usize,
    link_failures: usize,
}

enum RecordError {
    Anomaly(String),
    Engine(EngineError),
}

impl From<EngineError> for RecordError {
    fn from(e: EngineError) -> Self {
        RecordError::Engine(e)
    }
}

fn required(value: &Option<String>, field: &str) -> Result<String, RecordError> {
    non_blank(value.clone()).ok_or_else(|| RecordError::Anomaly(format!("missing {}", field)))
}

#[derive(Clone)]
pub struct ReconciliationService {
    infractions: InfractionService,
    refunds: RefundService,
    frauds: FraudDetectionService,
    gateway: Arc<dyn SettlementGateway>,
    config: Arc<EngineConfig>,
}

impl ReconciliationService {
    pub fn new(
        infractions: InfractionService,
        refunds: RefundService,
        frauds: FraudDetectionService,
        gateway: Arc<dyn SettlementGateway>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            infractions,
            refunds,
            frauds,
            gateway,
            config,
        }
    }

    /// Sync every reconciled kind over one window
    pub async fn run_pass(&self, ctx: &Context) -> ReconciliationReport {
        let window = self.window();
        info!(
            correlation_id = %ctx.correlation_id,
            from = %window.from,
            to = %window.to,
            "Reconciliation pass started"
        );

        let mut report = self.sync_infractions_in(ctx, window).await;
        report.merge(self.sync_refunds_in(ctx, window).await);
        report.merge(self.sync_fraud_detections_in(ctx, window).await);

        if report.is_clean() {
            info!(
                fetched = report.fetched,
                created = report.created,
                advanced = report.advanced,
                compensated = report.compensated,
                "Reconciliation pass finished"
            );
        } else {
            warn!(
                fetched = report.fetched,
                created = report.created,
                advanced = report.advanced,
                compensated = report.compensated,
                anomalies = report.anomalies.len(),
                failures = report.failures.len(),
                "Reconciliation pass finished with errors"
            );
        }
        report
    }

    fn window(&self) -> ReconciliationWindow {
        ReconciliationWindow::ending_at(Utc::now(), self.config.reconciliation.lookback())
    }

    pub async fn sync_infractions(&self, ctx: &Context) -> ReconciliationReport {
        self.sync_infractions_in(ctx, self.window()).await
    }

    pub async fn sync_refunds(&self, ctx: &Context) -> ReconciliationReport {
        self.sync_refunds_in(ctx, self.window()).await
    }

    pub async fn sync_fraud_detections(&self, ctx: &Context) -> ReconciliationReport {
        self.sync_fraud_detections_in(ctx, self.window()).await
    }

    async fn sync_infractions_in(&self, ctx: &Context, window: ReconciliationWindow) -> ReconciliationReport {
        let ctx = ctx.for_kind(Infraction::KIND);
        let span = ctx.span();
        async {
            let mut report = ReconciliationReport::default();
            for record in self.fetch(Infraction::KIND, window, &mut report).await {
                let key = record.correlation_key.clone();
                let result = self.fold_infraction(&ctx, &record).await;
                tally(&mut report, Infraction::KIND, key, result);
            }
            report
        }
        .instrument(span)
        .await
    }

    async fn sync_refunds_in(&self, ctx: &Context, window: ReconciliationWindow) -> ReconciliationReport {
        let ctx = ctx.for_kind(Refund::KIND);
        let span = ctx.span();
        async {
            let mut report = ReconciliationReport::default();
            for record in self.fetch(Refund::KIND, window, &mut report).await {
                let key = record.correlation_key.clone();
                let result = self.fold_refund(&ctx, &record).await;
                tally(&mut report, Refund::KIND, key, result);
            }
            report
        }
        .instrument(span)
        .await
    }

    async fn sync_fraud_detections_in(
        &self,
        ctx: &Context,
        window: ReconciliationWindow,
    ) -> ReconciliationReport {
        let ctx = ctx.for_kind(FraudDetection::KIND);
        let span = ctx.span();
        async {
            let mut report = ReconciliationReport::default();
            for record in self.fetch(FraudDetection::KIND, window, &mut report).await {
                let key = record.correlation_key.clone();
                let result = self.fold_fraud(&ctx, &record).await;
                tally(&mut report, FraudDetection::KIND, key, result);
            }
            report
        }
        .instrument(span)
        .await
    }

    /// Records of `kind` that decoded; everything else lands in `report`
    async fn fetch(
        &self,
        kind: InstrumentKind,
        window: ReconciliationWindow,
        report: &mut ReconciliationReport,
    ) -> Vec<RemoteRecord> {
        let entries = match self.gateway.get_remote_statuses(kind, window).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(kind = %kind, error = %e, "Remote status fetch failed");
                report.failures.push(RecordFailure {
                    kind,
                    correlation_key: None,
                    code: e.code(),
                    message: e.to_string(),
                });
                return Vec::new();
            }
        };

        report.fetched += entries.len();
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(kind = %kind, key = ?e.correlation_key, reason = %e.reason, "Undecodable remote record");
                    report.anomalies.push(Anomaly {
                        kind,
                        correlation_key: e.correlation_key,
                        reason: e.reason,
                    });
                }
            }
        }
        debug!(kind = %kind, records = records.len(), "Remote statuses fetched");
        records
    }

    async fn fold_infraction(&self, ctx: &Context, record: &RemoteRecord) -> Result<Folded, RecordError> {
        let status: RemoteInfractionStatus = record.status.parse().map_err(RecordError::Anomaly)?;
        let analysis = match non_blank(record.analysis_result.clone()) {
            Some(raw) => Some(raw.parse::<AnalysisResult>().map_err(RecordError::Anomaly)?),
            None => None,
        };
        let runner = self.infractions.runner();
        let mut folded = Folded::default();

        let mut current = match runner.find(Lookup::Key(&record.correlation_key)).await? {
            Some(existing) => existing,
            None => {
                let mut infraction = Infraction::received(
                    record.correlation_key.clone(),
                    required(&record.operation_id, "operation_id")?,
                    required(&record.infraction_type, "infraction_type")?,
                    record.description.clone(),
                );
                infraction.external_id = non_blank(record.external_id.clone());
                let outcome = runner.create(infraction).await?;
                folded.created = outcome.is_applied();
                outcome.into_inner()
            }
        };

        let events = plan_infraction(current.state(), status).map_err(|d| RecordError::Anomaly(d.0))?;
        let external_id = non_blank(record.external_id.clone());
        let hooks = Patch(move |i: &mut Infraction| {
            if i.external_id.is_none() {
                i.external_id = external_id.clone();
            }
            if i.analysis_result.is_none() {
                i.analysis_result = analysis;
            }
        });
        for event in events {
            let outcome = runner.fire_on(ctx, current, event, &hooks).await?;
            folded.advanced |= outcome.is_applied();
            current = outcome.into_inner();
        }

        if current.requires_compensation() {
            let compensated = self.infractions.compensate(ctx, Outcome::Unchanged(current)).await?;
            if let Some(report) = compensated.report {
                folded.compensated = report.compensated.len();
                folded.link_failures = report.failed.len();
            }
        }
        Ok(folded)
    }

    async fn fold_refund(&self, ctx: &Context, record: &RemoteRecord) -> Result<Folded, RecordError> {
        let status: RemoteRefundStatus = record.status.parse().map_err(RecordError::Anomaly)?;
        let runner = self.refunds.runner();
        let mut folded = Folded::default();

        let mut current = match runner.find(Lookup::Key(&record.correlation_key)).await? {
            Some(existing) => existing,
            None => {
                let amount = required(&record.amount, "amount")?;
                let amount = parse_minor_units(&amount, BRL_DECIMALS)
                    .map_err(|e| RecordError::Anomaly(format!("amount: {}", e)))?;
                let infraction_id = match non_blank(record.related_key.clone()) {
                    Some(key) => self
                        .infractions
                        .runner()
                        .find(Lookup::Key(&key))
                        .await?
                        .map(|i| i.id()),
                    None => None,
                };
                let mut refund = Refund::received(
                    record.correlation_key.clone(),
                    amount,
                    required(&record.operation_id, "operation_id")?,
                    infraction_id,
                    non_blank(record.reason.clone()),
                    record.description.clone(),
                );
                refund.external_id = non_blank(record.external_id.clone());
                let outcome = runner.create(refund).await?;
                folded.created = outcome.is_applied();
                outcome.into_inner()
            }
        };

        let events = plan_refund(current.state(), status).map_err(|d| RecordError::Anomaly(d.0))?;
        let external_id = non_blank(record.external_id.clone());
        let hooks = Patch(move |r: &mut Refund| {
            if r.external_id.is_none() {
                r.external_id = external_id.clone();
            }
        });
        for event in events {
            let outcome = runner.fire_on(ctx, current, event, &hooks).await?;
            folded.advanced |= outcome.is_applied();
            current = outcome.into_inner();
        }

        if matches!(current.state(), RefundState::ClosedConfirmed | RefundState::CancelConfirmed) {
            let compensated = self.refunds.compensate(ctx, Outcome::Unchanged(current)).await?;
            if let Some(report) = compensated.report {
                folded.compensated = report.compensated.len();
                folded.link_failures = report.failed.len();
            }
        }
        Ok(folded)
    }

    async fn fold_fraud(&self, ctx: &Context, record: &RemoteRecord) -> Result<Folded, RecordError> {
        let status: RemoteFraudStatus = record.status.parse().map_err(RecordError::Anomaly)?;
        let runner = self.frauds.runner();
        let mut folded = Folded::default();

        let mut current = match runner.find(Lookup::Key(&record.correlation_key)).await? {
            Some(existing) => existing,
            None => {
                let mut fraud = FraudDetection::received(
                    record.correlation_key.clone(),
                    required(&record.document, "document")?,
                    required(&record.fraud_type, "fraud_type")?,
                    non_blank(record.key.clone()),
                );
                fraud.external_id = non_blank(record.external_id.clone());
                let outcome = runner.create(fraud).await?;
                folded.created = outcome.is_applied();
                outcome.into_inner()
            }
        };

        let events = plan_fraud(current.state(), status).map_err(|d| RecordError::Anomaly(d.0))?;
        let external_id = non_blank(record.external_id.clone());
        let hooks = Patch(move |f: &mut FraudDetection| {
            if f.external_id.is_none() {
                f.external_id = external_id.clone();
            }
        });
        for event in events {
            let outcome = runner.fire_on(ctx, current, event, &hooks).await?;
            folded.advanced |= outcome.is_applied();
            current = outcome.into_inner();
        }
        Ok(folded)
    }
}

fn tally(
    report: &mut ReconciliationReport,
    kind: InstrumentKind,
    key: String,
    result: Result<Folded, RecordError>,
) {
    match result {
        Ok(folded) => {
            if folded.created {
                report.created += 1;
            }
            if folded.advanced {
                report.advanced += 1;
            }
            if !folded.created && !folded.advanced {
                report.unchanged += 1;
            }
            report.compensated += folded.compensated;
            if folded.link_failures > 0 {
                report.failures.push(RecordFailure {
                    kind,
                    correlation_key: Some(key),
                    code: "COMPENSATION_INCOMPLETE",
                    message: format!("{} link(s) could not be closed", folded.link_failures),
                });
            }
        }
        Err(RecordError::Anomaly(reason)) => {
            warn!(kind = %kind, key = %key, reason = %reason, "Reconciliation anomaly");
            report.anomalies.push(Anomaly {
                kind,
                correlation_key: Some(key),
                reason,
            });
        }
        Err(RecordError::Engine(e)) => {
            error!(kind = %kind, key = %key, error = %e, code = e.code(), "Reconciliation record failed");
            report.failures.push(RecordFailure {
                kind,
                correlation_key: Some(key),
                code: e.code(),
                message: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRepository;
    use crate::adapters::mock::MockPorts;
    use crate::compensation::CompensationOrchestrator;
    use crate::fsm::{NoHooks, TransitionRunner};
    use crate::instruments::fraud::FraudState;
    use crate::instruments::infraction::{InfractionEvent, InfractionState};
    use crate::instruments::refund_link::{LinkEvent, LinkState, RefundLink};
    use crate::ports::gateway::RemoteFetchError;

    struct Fixture {
        mocks: MockPorts,
        service: ReconciliationService,
        infractions: TransitionRunner<Infraction>,
        refunds: TransitionRunner<Refund>,
        links: TransitionRunner<RefundLink>,
        frauds: TransitionRunner<FraudDetection>,
    }

    fn fixture() -> Fixture {
        let mocks = MockPorts::new();
        let ports = mocks.ports();
        let config = Arc::new(EngineConfig::default());
        let infractions = TransitionRunner::new(
            Arc::new(InMemoryRepository::<Infraction>::new()),
            &ports,
            config.clone(),
        );
        let refunds =
            TransitionRunner::new(Arc::new(InMemoryRepository::<Refund>::new()), &ports, config.clone());
        let links = TransitionRunner::new(
            Arc::new(InMemoryRepository::<RefundLink>::new()),
            &ports,
            config.clone(),
        );
        let frauds = TransitionRunner::new(
            Arc::new(InMemoryRepository::<FraudDetection>::new()),
            &ports,
            config.clone(),
        );
        let compensation = CompensationOrchestrator::new(links.clone());
        let service = ReconciliationService::new(
            InfractionService::new(
                infractions.clone(),
                links.clone(),
                compensation.clone(),
                ports.gateway.clone(),
            ),
            RefundService::new(refunds.clone(), infractions.clone(), compensation, ports.gateway.clone()),
            FraudDetectionService::new(frauds.clone(), ports.gateway.clone()),
            ports.gateway.clone(),
            config,
        );
        Fixture {
            mocks,
            service,
            infractions,
            refunds,
            links,
            frauds,
        }
    }

    fn record(key: &str, status: &str) -> RemoteRecord {
        RemoteRecord {
            correlation_key: key.into(),
            status: status.into(),
            operation_id: Some("E2E-1".into()),
            infraction_type: Some("FRAUD".into()),
            ..Default::default()
        }
    }

    /// Opened infraction with one open 500 hold
    async fn open_infraction_with_link(f: &Fixture, key: &str) -> RefundLink {
        let ctx = Context::new("setup");
        let mut infraction = Infraction::sent(key, "E2E-1", "FRAUD", None);
        infraction.header.state = InfractionState::OpenConfirmed;
        let infraction = f.infractions.create(infraction).await.unwrap().into_inner();
        let link = f
            .links
            .create(RefundLink::new(format!("{}:E2E-1", key), infraction.id(), 500, "acc-1", "E2E-1"))
            .await
            .unwrap()
            .into_inner();
        f.links
            .fire_on(&ctx, link, LinkEvent::Open, &NoHooks)
            .await
            .unwrap()
            .into_inner()
    }

    #[tokio::test]
    async fn test_remote_disagreed_close_converges_and_compensates_once() {
        let f = fixture();
        let link = open_infraction_with_link(&f, "ISSUE-1").await;
        let mut closed = record("ISSUE-1", "CLOSED");
        closed.analysis_result = Some("DISAGREED".into());
        f.mocks
            .gateway
            .set_remote(InstrumentKind::Infraction, vec![Ok(closed)]);

        let first = f.service.run_pass(&Context::new("pass-1")).await;
        let second = f.service.run_pass(&Context::new("pass-2")).await;

        assert!(first.is_clean(), "{:?}", first);
        assert_eq!(first.advanced, 1);
        assert_eq!(first.compensated, 1);
        assert_eq!(second.advanced, 0);
        assert_eq!(second.compensated, 0);
        assert_eq!(f.mocks.ledger.revert_calls(), 1);

        let infraction = f.infractions.load(Lookup::Key("ISSUE-1")).await.unwrap();
        assert_eq!(infraction.state(), InfractionState::ClosedConfirmed);
        assert_eq!(infraction.analysis_result, Some(AnalysisResult::Disagreed));
        let link = f.links.load(Lookup::Id(link.id())).await.unwrap();
        assert_eq!(link.state(), LinkState::Closed);
    }

    #[tokio::test]
    async fn test_unseen_infraction_is_created_as_received() {
        let f = fixture();
        let mut remote = record("ISSUE-2", "OPEN");
        remote.external_id = Some("NET-9".into());
        f.mocks
            .gateway
            .set_remote(InstrumentKind::Infraction, vec![Ok(remote)]);

        let report = f.service.sync_infractions(&Context::new("pass-3")).await;

        assert_eq!(report.created, 1);
        let infraction = f.infractions.load(Lookup::Key("ISSUE-2")).await.unwrap();
        assert_eq!(infraction.state(), InfractionState::ReceivePending);
        assert_eq!(infraction.external_id.as_deref(), Some("NET-9"));
        assert_eq!(f.mocks.gateway.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_status_is_an_anomaly_not_a_transition() {
        let f = fixture();
        open_infraction_with_link(&f, "ISSUE-3").await;
        f.mocks.gateway.set_remote(
            InstrumentKind::Infraction,
            vec![
                Ok(record("ISSUE-3", "UNDER_REVIEW")),
                Err(RemoteFetchError {
                    correlation_key: Some("ISSUE-X".into()),
                    reason: "malformed payload".into(),
                }),
            ],
        );

        let report = f.service.sync_infractions(&Context::new("pass-4")).await;

        assert_eq!(report.fetched, 2);
        assert_eq!(report.anomalies.len(), 2);
        assert_eq!(report.advanced, 0);
        let infraction = f.infractions.load(Lookup::Key("ISSUE-3")).await.unwrap();
        assert_eq!(infraction.state(), InfractionState::OpenConfirmed);
    }

    #[tokio::test]
    async fn test_fetch_failure_does_not_stop_other_kinds() {
        let f = fixture();
        f.mocks.gateway.fail_fetch(
            InstrumentKind::Infraction,
            EngineError::GatewayUnavailable("503".into()),
        );
        let mut fraud = record("FR-1", "REGISTERED");
        fraud.document = Some("12345678900".into());
        fraud.fraud_type = Some("SCAM".into());
        f.mocks
            .gateway
            .set_remote(InstrumentKind::FraudDetection, vec![Ok(fraud)]);

        let report = f.service.run_pass(&Context::new("pass-5")).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, InstrumentKind::Infraction);
        assert_eq!(report.failures[0].correlation_key, None);
        let fraud = f.frauds.load(Lookup::Key("FR-1")).await.unwrap();
        assert_eq!(fraud.state(), FraudState::ReceiveConfirmed);
    }

    #[tokio::test]
    async fn test_remote_closed_refund_pays_out_and_settles() {
        let f = fixture();
        let link = open_infraction_with_link(&f, "ISSUE-4").await;
        let mut remote = record("REF-1", "CLOSED");
        remote.amount = Some("5.00".into());
        remote.related_key = Some("ISSUE-4".into());
        f.mocks.gateway.set_remote(InstrumentKind::Refund, vec![Ok(remote)]);

        let report = f.service.sync_refunds(&Context::new("pass-6")).await;

        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(report.created, 1);
        assert_eq!(report.compensated, 1);
        let refund = f.refunds.load(Lookup::Key("REF-1")).await.unwrap();
        assert_eq!(refund.state(), RefundState::ClosedConfirmed);
        assert_eq!(refund.header.amount, 500);
        assert_eq!(f.mocks.ledger.accept_calls(), 1);
        let link = f.links.load(Lookup::Id(link.id())).await.unwrap();
        assert_eq!(link.state(), LinkState::Closed);
    }

    #[tokio::test]
    async fn test_unparseable_amount_is_an_anomaly() {
        let f = fixture();
        let mut remote = record("REF-2", "OPEN");
        remote.amount = Some("5.001".into());
        f.mocks.gateway.set_remote(InstrumentKind::Refund, vec![Ok(remote)]);

        let report = f.service.sync_refunds(&Context::new("pass-7")).await;

        assert_eq!(report.anomalies.len(), 1);
        assert!(f.refunds.find(Lookup::Key("REF-2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_divergent_terminal_is_an_anomaly() {
        let f = fixture();
        let ctx = Context::new("pass-8");
        let mut infraction = Infraction::sent("ISSUE-5", "E2E-1", "FRAUD", None);
        infraction.header.state = InfractionState::OpenConfirmed;
        f.infractions.create(infraction).await.unwrap();
        f.infractions
            .fire(&ctx, Lookup::Key("ISSUE-5"), InfractionEvent::CancelRemotely, &NoHooks)
            .await
            .unwrap();
        f.mocks
            .gateway
            .set_remote(InstrumentKind::Infraction, vec![Ok(record("ISSUE-5", "CLOSED"))]);

        let report = f.service.sync_infractions(&ctx).await;

        assert_eq!(report.anomalies.len(), 1);
        let infraction = f.infractions.load(Lookup::Key("ISSUE-5")).await.unwrap();
        assert_eq!(infraction.state(), InfractionState::CancelConfirmed);
    }
}

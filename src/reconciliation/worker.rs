//! Reconciliation Worker
//!
//! Periodic trigger for reconciliation passes. Several engine replicas may run
//! a worker; the lease makes sure only one of them runs a pass at a time.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::sync::{ReconciliationReport, ReconciliationService};
use crate::config::ReconciliationConfig;
use crate::context::Context;
use crate::error::EngineError;
use crate::ports::LeaseProvider;

pub struct ReconciliationWorker {
    service: ReconciliationService,
    lease: Arc<dyn LeaseProvider>,
    lease_key: String,
    lease_ttl: Duration,
    interval: Duration,
}

impl ReconciliationWorker {
    pub fn new(
        service: ReconciliationService,
        lease: Arc<dyn LeaseProvider>,
        config: &ReconciliationConfig,
    ) -> Self {
        Self {
            service,
            lease,
            lease_key: config.lease_key.clone(),
            lease_ttl: config.lease_ttl(),
            interval: config.interval(),
        }
    }

    /// Run the worker loop
    ///
    /// Runs forever; a failed tick is logged and the next one runs on schedule.
    pub async fn run(&self) -> ! {
        info!(
            interval_secs = self.interval.as_secs(),
            lease_key = %self.lease_key,
            "Starting reconciliation worker"
        );

        loop {
            if let Err(e) = self.tick().await {
                error!(error = %e, "Reconciliation tick failed");
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    /// Run a single pass if the lease can be acquired.
    ///
    /// Returns `Ok(None)` when another holder has the lease.
    pub async fn tick(&self) -> Result<Option<ReconciliationReport>, EngineError> {
        let Some(lease) = self.lease.try_acquire(&self.lease_key, self.lease_ttl).await? else {
            debug!(lease_key = %self.lease_key, "Lease held elsewhere, skipping tick");
            return Ok(None);
        };

        let ctx = Context::generate();
        let report = self.service.run_pass(&ctx).await;

        if let Err(e) = self.lease.release(&lease).await {
            // Expires on its own after the ttl
            warn!(lease_key = %self.lease_key, error = %e, "Lease release failed");
        }

        Ok(Some(report))
    }
}

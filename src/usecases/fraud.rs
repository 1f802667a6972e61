//! Fraud detection use cases

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::Instrument as _;

use super::{Patch, non_blank};
use crate::context::Context;
use crate::error::EngineError;
use crate::fsm::{
    Instrument, Lookup, NoHooks, Outcome, Transition, TransitionEvent, TransitionHooks,
    TransitionRunner,
};
use crate::instruments::fraud::{FraudDetection, FraudEvent, FraudState};
use crate::ports::gateway::{FraudDetectionRequest, SettlementGateway};
use crate::require;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewFraudDetection {
    /// Correlation key of the marker
    pub key: Option<String>,
    pub document: Option<String>,
    pub fraud_type: Option<String>,
    pub pix_key: Option<String>,
}

struct FraudMarkerCall {
    gateway: Arc<dyn SettlementGateway>,
}

#[async_trait]
impl TransitionHooks<FraudDetection> for FraudMarkerCall {
    async fn gateway(
        &self,
        _ctx: &Context,
        fraud: &mut FraudDetection,
        transition: &Transition<FraudState, FraudEvent>,
    ) -> Result<(), EngineError> {
        let request = FraudDetectionRequest {
            correlation_key: fraud.header.correlation_key.clone(),
            external_id: fraud.external_id.clone(),
            document: fraud.document.clone(),
            fraud_type: fraud.fraud_type.clone(),
            key: fraud.key.clone(),
        };
        let ack = match transition.event {
            FraudEvent::Register => self.gateway.register_fraud_detection(request).await?,
            FraudEvent::CancelRegistration => self.gateway.cancel_fraud_detection(request).await?,
            other => {
                return Err(EngineError::System(format!(
                    "fraud detection '{}' has no network binding",
                    other.as_str()
                )));
            }
        };
        if fraud.external_id.is_none() {
            fraud.external_id = ack.external_id;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct FraudDetectionService {
    frauds: TransitionRunner<FraudDetection>,
    gateway: Arc<dyn SettlementGateway>,
}

impl FraudDetectionService {
    pub fn new(frauds: TransitionRunner<FraudDetection>, gateway: Arc<dyn SettlementGateway>) -> Self {
        Self { frauds, gateway }
    }

    pub(crate) fn runner(&self) -> &TransitionRunner<FraudDetection> {
        &self.frauds
    }

    fn hooks(&self) -> FraudMarkerCall {
        FraudMarkerCall {
            gateway: self.gateway.clone(),
        }
    }

    fn validate(patch: NewFraudDetection) -> Result<(String, String, String, Option<String>), EngineError> {
        let key = non_blank(patch.key);
        let document = non_blank(patch.document);
        let fraud_type = non_blank(patch.fraud_type);
        require!(key, document, fraud_type);
        Ok((key, document, fraud_type, non_blank(patch.pix_key)))
    }

    /// Create the marker and register it with the network.
    ///
    /// A redelivered registration resumes from whatever step was stored.
    pub async fn register(
        &self,
        ctx: &Context,
        patch: NewFraudDetection,
    ) -> Result<Outcome<FraudDetection>, EngineError> {
        let ctx = ctx.for_kind(FraudDetection::KIND);
        let span = ctx.span();
        async {
            let (key, document, fraud_type, pix_key) = Self::validate(patch)?;
            let created = self
                .frauds
                .create(FraudDetection::new(key, document, fraud_type, pix_key))
                .await?;
            let was_created = created.is_applied();
            let registered = self
                .frauds
                .fire_on(&ctx, created.into_inner(), FraudEvent::Register, &self.hooks())
                .await?;

            Ok::<_, EngineError>(match (was_created, registered) {
                (true, outcome) => Outcome::Applied(outcome.into_inner()),
                (false, outcome) => outcome,
            })
        }
        .instrument(span)
        .await
    }

    pub async fn confirm_register(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
    ) -> Result<Outcome<FraudDetection>, EngineError> {
        self.fire(ctx, lookup, FraudEvent::ConfirmRegister, &NoHooks).await
    }

    /// Withdraw a marker we registered
    pub async fn cancel_registration(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
    ) -> Result<Outcome<FraudDetection>, EngineError> {
        self.fire(ctx, lookup, FraudEvent::CancelRegistration, &self.hooks()).await
    }

    pub async fn confirm_cancel_registration(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
    ) -> Result<Outcome<FraudDetection>, EngineError> {
        self.fire(ctx, lookup, FraudEvent::ConfirmCancelRegistration, &NoHooks).await
    }

    /// Record a marker published by the network, in RECEIVE_PENDING
    pub async fn receive(
        &self,
        ctx: &Context,
        patch: NewFraudDetection,
    ) -> Result<Outcome<FraudDetection>, EngineError> {
        let ctx = ctx.for_kind(FraudDetection::KIND);
        let (key, document, fraud_type, pix_key) = Self::validate(patch)?;
        self.frauds
            .create(FraudDetection::received(key, document, fraud_type, pix_key))
            .instrument(ctx.span())
            .await
    }

    pub async fn confirm_receive(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
    ) -> Result<Outcome<FraudDetection>, EngineError> {
        self.fire(ctx, lookup, FraudEvent::ConfirmReceive, &NoHooks).await
    }

    pub async fn cancel_received(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
    ) -> Result<Outcome<FraudDetection>, EngineError> {
        self.fire(ctx, lookup, FraudEvent::CancelReceived, &NoHooks).await
    }

    pub async fn fail(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
        failure_reason: Option<String>,
    ) -> Result<Outcome<FraudDetection>, EngineError> {
        let failure_reason = non_blank(failure_reason);
        let hooks = Patch(move |f: &mut FraudDetection| f.failure_reason = failure_reason.clone());
        self.fire(ctx, lookup, FraudEvent::Fail, &hooks).await
    }

    async fn fire<H>(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
        event: FraudEvent,
        hooks: &H,
    ) -> Result<Outcome<FraudDetection>, EngineError>
    where
        H: TransitionHooks<FraudDetection>,
    {
        let ctx = ctx.for_kind(FraudDetection::KIND);
        let span = ctx.span();
        self.frauds.fire(&ctx, lookup, event, hooks).instrument(span).await
    }
}

//! Transition Runner
//!
//! Drives one requested transition to completion:
//!
//! ```text
//! load -> evaluate -> prepare -> effects (table order) -> update_if -> emit
//!            |                                               |
//!          NoOp --> Unchanged                 conflict --> re-read, re-evaluate
//! ```
//!
//! Effects run before the state is persisted. A failing effect leaves the
//! stored instrument untouched, so redelivering the trigger re-runs the
//! transition; the ledger binding makes that retry reuse the operation created
//! by the earlier attempt.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::instrument::Instrument;
use super::table::{Decision, Effect, InstrumentState, LedgerEffect, Transition, TransitionEvent};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::error::EngineError;
use crate::ports::ledger::{LedgerPort, OperationRequest, OperationState};
use crate::ports::{EventEmitter, InstrumentEvent, InstrumentRepository, Ports};
use crate::types::{InstrumentId, OperationRef};

/// How a trigger names its instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Id(InstrumentId),
    Key(&'a str),
}

impl fmt::Display for Lookup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Id(id) => write!(f, "id {}", id),
            Lookup::Key(key) => write!(f, "key {}", key),
        }
    }
}

/// Result of a use case that may or may not change state
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<I> {
    /// State changed, effects ran, one event was emitted
    Applied(I),
    /// Replay or already-settled: nothing happened
    Unchanged(I),
}

impl<I> Outcome<I> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn get(&self) -> &I {
        match self {
            Outcome::Applied(i) | Outcome::Unchanged(i) => i,
        }
    }

    pub fn into_inner(self) -> I {
        match self {
            Outcome::Applied(i) | Outcome::Unchanged(i) => i,
        }
    }
}

/// Per-use-case bindings for a transition.
///
/// `prepare` copies trigger data onto the instrument (e.g. an analysis
/// result); it runs on every attempt, against the freshly read instrument.
/// `gateway` performs the settlement call of rules carrying `Effect::Gateway`.
#[async_trait]
pub trait TransitionHooks<I: Instrument>: Send + Sync {
    fn prepare(
        &self,
        _instrument: &mut I,
        _transition: &Transition<I::State, I::Event>,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    async fn gateway(
        &self,
        _ctx: &Context,
        _instrument: &mut I,
        transition: &Transition<I::State, I::Event>,
    ) -> Result<(), EngineError> {
        Err(EngineError::System(format!(
            "{} '{}' has no gateway binding",
            I::KIND,
            transition.event.as_str()
        )))
    }
}

/// Hooks for transitions without trigger data or gateway calls
pub struct NoHooks;

#[async_trait]
impl<I: Instrument> TransitionHooks<I> for NoHooks {}

pub struct TransitionRunner<I: Instrument> {
    repo: Arc<dyn InstrumentRepository<I>>,
    ledger: Arc<dyn LedgerPort>,
    emitter: Arc<dyn EventEmitter>,
    config: Arc<EngineConfig>,
}

impl<I: Instrument> Clone for TransitionRunner<I> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            ledger: self.ledger.clone(),
            emitter: self.emitter.clone(),
            config: self.config.clone(),
        }
    }
}

impl<I: Instrument> TransitionRunner<I> {
    pub fn new(
        repo: Arc<dyn InstrumentRepository<I>>,
        ports: &Ports,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            repo,
            ledger: ports.ledger.clone(),
            emitter: ports.emitter.clone(),
            config,
        }
    }

    pub fn repository(&self) -> &Arc<dyn InstrumentRepository<I>> {
        &self.repo
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn find(&self, lookup: Lookup<'_>) -> Result<Option<I>, EngineError> {
        match lookup {
            Lookup::Id(id) => self.repo.get_by_id(id).await,
            Lookup::Key(key) => self.repo.get_by_correlation_key(key).await,
        }
    }

    pub async fn load(&self, lookup: Lookup<'_>) -> Result<I, EngineError> {
        self.find(lookup)
            .await?
            .ok_or_else(|| EngineError::not_found(I::KIND, lookup))
    }

    /// Persist a new instrument, or return the one already stored under its
    /// correlation key.
    pub async fn create(&self, instrument: I) -> Result<Outcome<I>, EngineError> {
        let key = instrument.correlation_key().to_string();

        if let Some(existing) = self.repo.get_by_correlation_key(&key).await? {
            debug!(kind = %I::KIND, key = %key, id = %existing.id(), "Replay: instrument exists");
            return Ok(Outcome::Unchanged(existing));
        }

        let created = match self.repo.create(instrument).await {
            Ok(created) => created,
            Err(e) => {
                // Lost the race against a concurrent create of the same key
                if let Some(existing) = self.repo.get_by_correlation_key(&key).await? {
                    debug!(kind = %I::KIND, key = %key, "Concurrent create resolved to existing");
                    return Ok(Outcome::Unchanged(existing));
                }
                return Err(e);
            }
        };

        info!(
            kind = %I::KIND,
            key = %key,
            id = %created.id(),
            state = created.state().as_str(),
            "Instrument created"
        );
        self.emit(&created).await;

        Ok(Outcome::Applied(created))
    }

    /// Load by `lookup` and fire `event`
    pub async fn fire<H>(
        &self,
        ctx: &Context,
        lookup: Lookup<'_>,
        event: I::Event,
        hooks: &H,
    ) -> Result<Outcome<I>, EngineError>
    where
        H: TransitionHooks<I> + ?Sized,
    {
        let instrument = self.load(lookup).await?;
        self.fire_on(ctx, instrument, event, hooks).await
    }

    /// Fire `event` on an instrument the caller already loaded
    pub async fn fire_on<H>(
        &self,
        ctx: &Context,
        mut current: I,
        event: I::Event,
        hooks: &H,
    ) -> Result<Outcome<I>, EngineError>
    where
        H: TransitionHooks<I> + ?Sized,
    {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let transition = match I::table().evaluate(current.state(), event)? {
                Decision::NoOp => {
                    debug!(
                        kind = %I::KIND,
                        id = %current.id(),
                        event = event.as_str(),
                        state = current.state().as_str(),
                        "Transition already settled"
                    );
                    return Ok(Outcome::Unchanged(current));
                }
                Decision::Apply(t) => t,
            };

            let mut next = current.clone();
            hooks.prepare(&mut next, &transition)?;

            for effect in transition.effects {
                match effect {
                    Effect::Ledger(op) => self.apply_ledger(&mut next, *op, transition.to).await?,
                    Effect::Gateway => self.call_gateway(ctx, hooks, &mut next, &transition).await?,
                }
            }

            next.header_mut().advance(transition.to, Utc::now());

            if self.repo.update_if(&next, transition.from).await? {
                info!(
                    kind = %I::KIND,
                    id = %next.id(),
                    event = event.as_str(),
                    from = transition.from.as_str(),
                    to = transition.to.as_str(),
                    "Transition applied"
                );
                self.emit(&next).await;
                return Ok(Outcome::Applied(next));
            }

            warn!(
                kind = %I::KIND,
                id = %current.id(),
                attempt,
                "Concurrent modification, re-reading"
            );
            current = self.load(Lookup::Id(current.id())).await?;
        }

        Err(EngineError::ConcurrentModification {
            kind: I::KIND,
            id: current.id().to_string(),
            attempts: max_attempts,
        })
    }

    async fn call_gateway<H>(
        &self,
        ctx: &Context,
        hooks: &H,
        instrument: &mut I,
        transition: &Transition<I::State, I::Event>,
    ) -> Result<(), EngineError>
    where
        H: TransitionHooks<I> + ?Sized,
    {
        let after = ctx.timeout.unwrap_or_else(|| self.config.gateway.timeout());

        match tokio::time::timeout(after, hooks.gateway(ctx, instrument, transition)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    kind = %I::KIND,
                    id = %instrument.id(),
                    event = transition.event.as_str(),
                    timeout_ms = after.as_millis() as u64,
                    "Gateway call timed out"
                );
                Err(EngineError::GatewayTimeout { after })
            }
        }
    }

    async fn apply_ledger(
        &self,
        instrument: &mut I,
        effect: LedgerEffect,
        target: I::State,
    ) -> Result<(), EngineError> {
        let derived = OperationRef::for_instrument(I::KIND, instrument.id());
        let bound = instrument.header().ledger_operation;

        if let Some(bound) = bound
            && bound != derived
        {
            return Err(EngineError::LedgerInconsistency(format!(
                "{} {} references operation {}, expected {}",
                I::KIND,
                instrument.id(),
                bound,
                derived
            )));
        }

        let existing = self.ledger.get_operation(&derived).await?;

        match effect {
            LedgerEffect::Create => {
                let amount = instrument.header().amount;
                match existing {
                    Some(op) if op.amount != amount => {
                        return Err(EngineError::LedgerInconsistency(format!(
                            "operation {} has amount {}, {} {} has {}",
                            derived,
                            op.amount,
                            I::KIND,
                            instrument.id(),
                            amount
                        )));
                    }
                    Some(_) => {
                        debug!(kind = %I::KIND, operation = %derived, "Reusing ledger operation");
                    }
                    None => {
                        let draft = instrument.ledger_draft(&self.config.ledger, target).ok_or_else(|| {
                            EngineError::System(format!("{} has no ledger posting", I::KIND))
                        })?;
                        let request = OperationRequest::from_draft(
                            derived,
                            amount,
                            &self.config.ledger.currency,
                            draft,
                        );
                        let created = self.ledger.create_operation(request).await?;
                        if created != derived {
                            return Err(EngineError::LedgerInconsistency(format!(
                                "ledger created {} for requested {}",
                                created, derived
                            )));
                        }
                        info!(kind = %I::KIND, operation = %derived, amount, "Ledger operation created");
                    }
                }
            }
            LedgerEffect::Accept => {
                let op = existing.ok_or_else(|| {
                    EngineError::LedgerInconsistency(format!(
                        "cannot accept unknown operation {}",
                        derived
                    ))
                })?;
                match op.state {
                    OperationState::Accepted => {
                        debug!(kind = %I::KIND, operation = %derived, "Operation already accepted");
                    }
                    OperationState::Reverted => {
                        return Err(EngineError::LedgerInconsistency(format!(
                            "cannot accept reverted operation {}",
                            derived
                        )));
                    }
                    OperationState::Pending => {
                        self.ledger.accept_operation(&derived).await?;
                        info!(kind = %I::KIND, operation = %derived, "Ledger operation accepted");
                    }
                }
            }
            LedgerEffect::Revert => match existing {
                None if bound.is_some() => {
                    return Err(EngineError::LedgerInconsistency(format!(
                        "operation {} is missing on the ledger",
                        derived
                    )));
                }
                None => {
                    debug!(kind = %I::KIND, id = %instrument.id(), "No ledger operation to revert");
                    return Ok(());
                }
                Some(op) if op.state == OperationState::Reverted => {
                    debug!(kind = %I::KIND, operation = %derived, "Operation already reverted");
                }
                Some(_) => {
                    self.ledger.revert_operation(&derived).await?;
                    info!(kind = %I::KIND, operation = %derived, "Ledger operation reverted");
                }
            },
        }

        instrument.header_mut().ledger_operation = Some(derived);
        Ok(())
    }

    async fn emit(&self, instrument: &I) {
        let event = match InstrumentEvent::snapshot(instrument) {
            Ok(event) => event,
            Err(e) => {
                error!(kind = %I::KIND, id = %instrument.id(), error = %e, "Event snapshot failed");
                return;
            }
        };

        if let Err(e) = self.emitter.emit(&event).await {
            error!(topic = %event.topic, id = %instrument.id(), error = %e, "Event emission failed");
        }
    }
}

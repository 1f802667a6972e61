//! Transition Tables
//!
//! Each instrument kind describes its state graph as static data. The table
//! only knows state-graph legality; domain preconditions are checked by the
//! use case before a transition is requested.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use crate::error::EngineError;
use crate::types::InstrumentKind;

/// Persisted state of one instrument kind
pub trait InstrumentState: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    fn as_str(&self) -> &'static str;
    fn is_terminal(&self) -> bool;
}

/// Named transition of one instrument kind
pub trait TransitionEvent: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    fn as_str(&self) -> &'static str;
}

/// Ledger call required by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    /// Create the instrument's operation
    Create,
    /// Accept (finalize) the instrument's operation
    Accept,
    /// Revert the instrument's operation (new reversal operation on the ledger side)
    Revert,
}

/// Side effect of a transition, executed in table order before persisting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Ledger(LedgerEffect),
    Gateway,
}

#[derive(Debug)]
pub struct TransitionRule<S: 'static, E: 'static> {
    pub event: E,
    /// States the transition may start from
    pub sources: &'static [S],
    pub target: S,
    /// States that already satisfy this transition (replay => no-op)
    pub settled: &'static [S],
    pub effects: &'static [Effect],
}

#[derive(Debug)]
pub struct TransitionTable<S: 'static, E: 'static> {
    pub kind: InstrumentKind,
    pub rules: &'static [TransitionRule<S, E>],
}

/// A transition the engine decided to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S: 'static, E: 'static> {
    pub event: E,
    pub from: S,
    pub to: S,
    pub effects: &'static [Effect],
}

impl<S, E> Transition<S, E> {
    pub fn ledger_effects(&self) -> impl Iterator<Item = LedgerEffect> + '_ {
        self.effects.iter().filter_map(|e| match e {
            Effect::Ledger(l) => Some(*l),
            Effect::Gateway => None,
        })
    }

    pub fn calls_gateway(&self) -> bool {
        self.effects.contains(&Effect::Gateway)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision<S: 'static, E: 'static> {
    /// Already in the target (or a dominating) state: no effects, no event
    NoOp,
    Apply(Transition<S, E>),
}

impl<S: InstrumentState, E: TransitionEvent> TransitionTable<S, E> {
    pub const fn new(kind: InstrumentKind, rules: &'static [TransitionRule<S, E>]) -> Self {
        Self { kind, rules }
    }

    pub fn rule(&self, event: E) -> Option<&'static TransitionRule<S, E>> {
        self.rules.iter().find(|r| r.event == event)
    }

    /// Decide what requesting `event` means for an instrument in `current`.
    pub fn evaluate(&self, current: S, event: E) -> Result<Decision<S, E>, EngineError> {
        let rule = self.rule(event).ok_or(EngineError::UnsupportedEvent {
            kind: self.kind,
            event: event.as_str(),
        })?;

        if current == rule.target || rule.settled.contains(&current) {
            return Ok(Decision::NoOp);
        }

        if !rule.sources.contains(&current) {
            return Err(EngineError::InvalidState {
                kind: self.kind,
                event: event.as_str(),
                current: current.as_str(),
                expected: rule.sources.iter().map(|s| s.as_str()).collect(),
            });
        }

        Ok(Decision::Apply(Transition {
            event,
            from: current,
            to: rule.target,
            effects: rule.effects,
        }))
    }

    /// Structural checks on the table itself.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for rule in self.rules {
            let name = rule.event.as_str();
            if !seen.insert(name) {
                return Err(format!("{}: duplicate event '{}'", self.kind, name));
            }
            if rule.sources.is_empty() {
                return Err(format!("{}: '{}' has no source state", self.kind, name));
            }
            if rule.sources.contains(&rule.target) {
                return Err(format!("{}: '{}' loops on its target", self.kind, name));
            }
            if let Some(s) = rule.sources.iter().find(|s| s.is_terminal()) {
                return Err(format!(
                    "{}: '{}' leaves terminal state {}",
                    self.kind,
                    name,
                    s.as_str()
                ));
            }
            if let Some(s) = rule.settled.iter().find(|s| rule.sources.contains(s)) {
                return Err(format!(
                    "{}: '{}' lists {} as both source and settled",
                    self.kind,
                    name,
                    s.as_str()
                ));
            }
            let ledger = rule
                .effects
                .iter()
                .filter(|e| matches!(e, Effect::Ledger(_)))
                .count();
            let gateway = rule
                .effects
                .iter()
                .filter(|e| matches!(e, Effect::Gateway))
                .count();
            if ledger > 1 || gateway > 1 {
                return Err(format!(
                    "{}: '{}' has more than one ledger or gateway effect",
                    self.kind, name
                ));
            }
        }
        Ok(())
    }
}

//! Precondition Guard
//!
//! Inbound payloads arrive as patch structs with optional fields. The guard
//! validates all required fields in one pass so the caller learns every
//! missing field at once, not just the first.

use crate::error::EngineError;
use crate::fsm::{Instrument, InstrumentState};

#[derive(Debug, Default)]
pub struct FieldGuard {
    missing: Vec<&'static str>,
}

impl FieldGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, name: &'static str, present: bool) -> &mut Self {
        if !present {
            self.missing.push(name);
        }
        self
    }

    /// Blank strings count as missing
    pub fn check_str(&mut self, name: &'static str, value: Option<&str>) -> &mut Self {
        self.check(name, value.is_some_and(|v| !v.trim().is_empty()))
    }

    pub fn finish(&self) -> Result<(), EngineError> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::MissingRequiredField {
                fields: self.missing.clone(),
            })
        }
    }
}

/// Validate a set of `Option` bindings at once, then rebind them as values.
///
/// ```
/// use pix_lifecycle::require;
/// use pix_lifecycle::error::EngineError;
///
/// fn build(name: Option<String>, amount: Option<u64>) -> Result<(String, u64), EngineError> {
///     require!(name, amount);
///     Ok((name, amount))
/// }
///
/// assert!(build(Some("a".into()), Some(1)).is_ok());
/// let err = build(None, None).unwrap_err();
/// assert_eq!(err, EngineError::MissingRequiredField { fields: vec!["name", "amount"] });
/// ```
#[macro_export]
macro_rules! require {
    ($($field:ident),+ $(,)?) => {
        let mut guard = $crate::guard::FieldGuard::new();
        $( guard.check(stringify!($field), $field.is_some()); )+
        guard.finish()?;
        $(
            let Some($field) = $field else {
                return Err($crate::error::EngineError::missing(stringify!($field)).into());
            };
        )+
    };
}

/// Domain precondition on the current state of an instrument other than the
/// one being transitioned (e.g. the deposit behind a warning).
pub fn expect_state<I: Instrument>(
    instrument: &I,
    operation: &'static str,
    allowed: &[I::State],
) -> Result<(), EngineError> {
    let current = instrument.state();
    if allowed.contains(&current) {
        return Ok(());
    }
    Err(EngineError::InvalidState {
        kind: I::KIND,
        event: operation,
        current: current.as_str(),
        expected: allowed.iter().map(|s| s.as_str()).collect(),
    })
}

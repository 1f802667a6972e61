//! Execution Context
//!
//! Carried explicitly through every use case call instead of ambient child
//! loggers. The span it opens tags all log lines of one unit of work.

use std::time::Duration;

use tracing::Span;
use uuid::Uuid;

use crate::types::InstrumentKind;

#[derive(Debug, Clone)]
pub struct Context {
    /// Correlation id of the trigger (message id, reconciliation pass id, ...)
    pub correlation_id: String,
    /// Instrument kind the unit of work is about, when known
    pub instrument: Option<InstrumentKind>,
    /// Caller-supplied bound for settlement gateway calls.
    /// Falls back to `gateway.timeout_ms` from configuration.
    pub timeout: Option<Duration>,
}

impl Context {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            instrument: None,
            timeout: None,
        }
    }

    /// Context with a freshly generated correlation id
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn with_instrument(mut self, kind: InstrumentKind) -> Self {
        self.instrument = Some(kind);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Child context for another instrument kind within the same unit of work
    pub fn for_kind(&self, kind: InstrumentKind) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            instrument: Some(kind),
            timeout: self.timeout,
        }
    }

    pub fn span(&self) -> Span {
        tracing::info_span!(
            "pix",
            correlation_id = %self.correlation_id,
            instrument = self.instrument.map(|k| k.as_str()).unwrap_or("-"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_kind_keeps_correlation() {
        let ctx = Context::new("msg-1").with_timeout(Duration::from_millis(250));
        let child = ctx.for_kind(InstrumentKind::Infraction);
        assert_eq!(child.correlation_id, "msg-1");
        assert_eq!(child.instrument, Some(InstrumentKind::Infraction));
        assert_eq!(child.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_generate_is_unique() {
        assert_ne!(Context::generate().correlation_id, Context::generate().correlation_id);
    }
}

//! Pix Lifecycle - Payment Instrument State Engine
//!
//! Drives Pix instruments (deposits, warnings, devolutions, payments,
//! infractions, refunds, fraud markers and admin TEDs) through table-driven
//! state machines, with ledger effects, settlement-network calls and events
//! applied exactly once per transition.
//!
//! # Modules
//!
//! - [`types`] - Shared identifiers and value types
//! - [`money`] - BRL minor-unit parsing and formatting
//! - [`error`] - Engine error taxonomy
//! - [`context`] - Correlation context and tracing spans
//! - [`config`] - YAML + env configuration
//! - [`logging`] - tracing-subscriber setup
//! - [`fsm`] - Transition tables and the transition runner
//! - [`guard`] - Required-field and state preconditions
//! - [`instruments`] - One state machine per instrument kind
//! - [`ports`] - Repository, ledger, gateway, event and lease seams
//! - [`adapters`] - In-memory and scriptable port implementations
//! - [`compensation`] - Reverting or settling refund links
//! - [`usecases`] - One service per instrument family
//! - [`reconciliation`] - Folding the network's view into local state
//! - [`engine`] - Service wiring

// Core types - must be first!
pub mod error;
pub mod money;
pub mod types;

// Ambient
pub mod config;
pub mod context;
pub mod logging;

// State machines
pub mod fsm;
pub mod guard;
pub mod instruments;

// Seams
pub mod adapters;
pub mod ports;

// Services
pub mod compensation;
pub mod engine;
pub mod reconciliation;
pub mod usecases;


// Convenient re-exports at crate root
pub use config::EngineConfig;
pub use context::Context;
pub use engine::{PixEngine, Repositories};
pub use error::EngineError;
pub use fsm::{Lookup, Outcome};
pub use reconciliation::{ReconciliationReport, ReconciliationWorker};

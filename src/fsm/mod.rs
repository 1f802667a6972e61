//! Generic instrument state machine
//!
//! - `table`: static transition tables and their evaluation
//! - `instrument`: the trait every instrument kind implements
//! - `runner`: executes a transition against the ports

pub mod instrument;
pub mod runner;
pub mod table;

pub use instrument::{Header, Instrument};
pub use runner::{Lookup, NoHooks, Outcome, TransitionHooks, TransitionRunner};
pub use table::{
    Decision, Effect, InstrumentState, LedgerEffect, Transition, TransitionEvent, TransitionRule,
    TransitionTable,
};

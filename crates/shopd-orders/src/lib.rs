//! Order domain logic: the lifecycle state machine and money arithmetic.
//!
//! Everything here is pure — no IO, no store access. The coordinator crate
//! reads rows, runs these rules, and commits the results.

pub mod money;
pub mod state_machine;

pub use state_machine::{
    transition, LedgerEffect, OrderEvent, Stamp, Transition, TransitionError,
};

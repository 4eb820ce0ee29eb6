//! Fan-out of one prompt to many providers.
//!
//! The [`Dispatcher`](dispatcher::Dispatcher) admits a turn against the
//! token ledger and spawns one task per provider. Tasks push their events
//! into a shared channel; the [multiplexer](multiplexer) drains it in
//! arrival order and ends the sequence with a single completion marker.

pub mod dispatcher;
pub mod multiplexer;
pub mod turn;

pub use dispatcher::{Dispatcher, GenerationSettings, TurnRequest};
pub use multiplexer::TurnEvents;
pub use turn::{AnswerHandle, Turn, TurnOutcome};

/// Error cause reported for a provider task stopped by cancellation.
pub const CANCELLED: &str = "cancelled";

//! Business logic and port traits for lurk.
//!
//! This crate owns the concurrent core: the provider abstraction, the shared
//! token ledger, fan-out dispatch with its stream multiplexer, and best-of-N
//! synthesis. It depends only on `lurk-types` -- never on `lurk-infra` or any
//! network crate.

pub mod estimate;
pub mod fanout;
pub mod history;
pub mod ledger;
pub mod llm;
pub mod synthesis;

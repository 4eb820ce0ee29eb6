//! History storage implementations.

pub mod memory;

pub use memory::InMemoryHistory;

//! Shared state for command implementations.

pub mod context;

pub use context::Context;

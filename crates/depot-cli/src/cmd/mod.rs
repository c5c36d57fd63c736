//! Subcommand implementations.

pub mod delete;
pub mod list;
pub mod metadata;
pub mod repositories;
pub mod resolve;
pub mod store;
pub mod trash;

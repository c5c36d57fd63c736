//! depot core engine.
//!
//! Layers, leaf first: [`storage`] backends, the [`vfs`] virtual repository
//! filesystem, the atomic writer in [`io`], the process-wide [`lock`]
//! registry, [`layout`] providers, the [`metadata`] manager, the [`resolve`]
//! chain and the [`service`] facade the CLI talks to.

pub mod config;
pub mod io;
pub mod layout;
pub mod lock;
pub mod metadata;
pub mod paths;
pub mod remote;
pub mod resolve;
pub mod service;
pub mod storage;
pub mod vfs;

pub use config::{ConfigError, DepotConfig, RepositoryRegistry};
pub use paths::*;
pub use resolve::{ResolutionChain, ResolveError, ResolvedArtifact};
pub use service::ArtifactManagementService;

/// User Agent string for remote fetches
pub const USER_AGENT: &str = concat!("depot/", env!("CARGO_PKG_VERSION"));

//! Manifest resolution for freezer.
//!
//! This crate expands a root freeze manifest into the ordered, deduplicated list
//! of files to embed: include chains are followed depth-first with cycle
//! detection, freeze directives are enumerated against the filesystem, and
//! destination conflicts are settled by a [`DuplicatePolicy`]. The [`Engine`]
//! adds content locking and drift detection on top, configured by a layered
//! [`FreezerConfig`].

pub mod config;
pub mod drift;
pub mod engine;
mod enumerate;
pub mod policy;
pub mod resolver;

pub use config::{ConfigError, FreezerConfig};
pub use drift::{diff_lock, DriftReport};
pub use engine::{default_lock_path, lock_entries, Engine, DEFAULT_LOCK_NAME};
pub use policy::DuplicatePolicy;
pub use resolver::{
    Origin, Resolution, ResolveError, ResolveOptions, ResolvedEntry, Resolver, DEFAULT_MANIFEST_NAME,
};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("lock error: {0}")]
    Lock(#[from] freezer_schema::LockError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("resolve error: {origin}: failed to hash {}: {source}", .path.display())]
    Digest {
        origin: Origin,
        path: PathBuf,
        source: std::io::Error,
    },
}

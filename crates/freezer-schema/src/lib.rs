//! Manifest parsing, validation, placeholder substitution, and lock files for freezer.
//!
//! This crate defines the schema layer: TOML freeze manifest parsing (`ManifestV1`),
//! validated directive lists (`NormalizedManifest`), `$(NAME)` substitution against
//! layered variable scopes (`Environment`, `Scope`), content-derived image identity
//! (`compute_image_id`), and lock file generation/verification (`ImageLock`).

pub mod identity;
pub mod lock;
pub mod manifest;
pub mod normalize;
pub mod types;
pub mod vars;

pub use identity::{compute_image_id, digest_file, ImageIdentity};
pub use lock::{ImageLock, LockError, LockedEntry, LOCK_VERSION};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, DirectiveEntry, EntryKind, FreezeKind,
    ManifestError, ManifestV1, Members,
};
pub use normalize::{
    check_member, Directive, FreezeDirective, IncludeDirective, NormalizedManifest,
};
pub use types::{ContentDigest, DestName, ImageId, ShortId};
pub use vars::{substitute, Environment, Scope, VarError};

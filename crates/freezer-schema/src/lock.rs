use crate::identity::{compute_image_id, ImageIdentity};
use crate::manifest::EntryKind;
use crate::types::{ContentDigest, DestName};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const LOCK_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock file parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("lock file serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("unsupported lock_version: {0}, expected {LOCK_VERSION}")]
    UnsupportedVersion(u32),
    #[error("lock file image_id mismatch: lock has '{lock_id}', recomputed '{computed_id}'")]
    ImageIdMismatch {
        lock_id: String,
        computed_id: String,
    },
}

/// One frozen file as recorded in the lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockedEntry {
    pub dest_name: DestName,
    pub source_path: String,
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opt: Option<u8>,
    pub digest: ContentDigest,
}

/// The lock file captures the content of a resolved image.
///
/// The image_id is computed from the locked entries, so
/// same entries and same content → same image_id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageLock {
    pub lock_version: u32,
    pub image_id: String,
    pub short_id: String,
    #[serde(default)]
    pub entries: Vec<LockedEntry>,
}

impl ImageLock {
    pub fn from_entries(entries: Vec<LockedEntry>) -> Self {
        let identity = compute_image_id(&entries);
        ImageLock {
            lock_version: LOCK_VERSION,
            image_id: identity.image_id.into_inner(),
            short_id: identity.short_id.into_inner(),
            entries,
        }
    }

    pub fn compute_identity(&self) -> ImageIdentity {
        compute_image_id(&self.entries)
    }

    /// Verify that this lock file is internally consistent
    /// (stored image_id matches recomputed image_id).
    pub fn verify_integrity(&self) -> Result<ImageIdentity, LockError> {
        if self.lock_version != LOCK_VERSION {
            return Err(LockError::UnsupportedVersion(self.lock_version));
        }
        let identity = self.compute_identity();
        if self.image_id != identity.image_id.as_str() {
            return Err(LockError::ImageIdMismatch {
                lock_id: self.image_id.clone(),
                computed_id: identity.image_id.into_inner(),
            });
        }
        Ok(identity)
    }

    pub fn find(&self, dest_name: &str) -> Option<&LockedEntry> {
        self.entries.iter().find(|e| e.dest_name == dest_name)
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), LockError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| LockError::Io(e.error))?;
        if let Ok(f) = fs::File::open(dir) {
            let _ = f.sync_all();
        }
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

use crate::config::FreezerConfig;
use crate::drift::{diff_lock, DriftReport};
use crate::resolver::{ResolveOptions, ResolvedEntry, Resolution, Resolver};
use crate::CoreError;
use freezer_schema::{digest_file, ImageLock, LockedEntry};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Lock file name written next to the root manifest by default.
pub const DEFAULT_LOCK_NAME: &str = "freezer.lock";

/// Entry point tying resolution, locking and drift detection to one configuration.
pub struct Engine {
    config: FreezerConfig,
}

impl Engine {
    pub fn new(config: FreezerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FreezerConfig {
        &self.config
    }

    pub fn resolve(&self, manifest: &Path) -> Result<Resolution, CoreError> {
        let options = ResolveOptions {
            on_duplicate: self.config.on_duplicate,
        };
        let resolution = Resolver::new(&self.config.vars, options).resolve(manifest)?;
        info!(
            "resolved {} entries from {} manifests",
            resolution.entries.len(),
            resolution.manifests.len()
        );
        Ok(resolution)
    }

    /// Hash every resolved source and build the lock for `resolution`.
    pub fn lock(&self, resolution: &Resolution) -> Result<ImageLock, CoreError> {
        let entries = lock_entries(&resolution.entries)?;
        Ok(ImageLock::from_entries(entries))
    }

    /// Resolve `manifest` and write its lock, to `output` or next to the manifest.
    pub fn write_lock(
        &self,
        manifest: &Path,
        output: Option<&Path>,
    ) -> Result<(ImageLock, PathBuf), CoreError> {
        let resolution = self.resolve(manifest)?;
        let lock = self.lock(&resolution)?;
        let path = output.map_or_else(|| default_lock_path(&resolution.root), Path::to_path_buf);
        lock.write_to_file(&path)?;
        info!("wrote {} ({})", path.display(), lock.short_id);
        Ok((lock, path))
    }

    /// Resolve `manifest` again and compare it with the lock at `lock_path`.
    pub fn verify(
        &self,
        manifest: &Path,
        lock_path: Option<&Path>,
    ) -> Result<DriftReport, CoreError> {
        let resolution = self.resolve(manifest)?;
        let path =
            lock_path.map_or_else(|| default_lock_path(&resolution.root), Path::to_path_buf);
        debug!("verifying against {}", path.display());

        let locked = ImageLock::read_from_file(&path)?;
        locked.verify_integrity()?;
        let current = self.lock(&resolution)?;
        Ok(diff_lock(&locked, &current))
    }
}

/// `freezer.lock` in the directory of `manifest`.
pub fn default_lock_path(manifest: &Path) -> PathBuf {
    let dir = if manifest.is_dir() {
        manifest
    } else {
        manifest.parent().unwrap_or_else(|| Path::new("."))
    };
    dir.join(DEFAULT_LOCK_NAME)
}

pub fn lock_entries(entries: &[ResolvedEntry]) -> Result<Vec<LockedEntry>, CoreError> {
    entries
        .iter()
        .map(|entry| {
            let digest = digest_file(&entry.source_path).map_err(|source| CoreError::Digest {
                origin: entry.origin.clone(),
                path: entry.source_path.clone(),
                source,
            })?;
            Ok(LockedEntry {
                dest_name: entry.dest_name.clone(),
                source_path: entry.source_path.to_string_lossy().into_owned(),
                kind: entry.kind,
                opt: entry.opt,
                digest,
            })
        })
        .collect()
}

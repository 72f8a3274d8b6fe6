use freezer_schema::{ImageLock, LockedEntry};
use serde::Serialize;
use std::collections::BTreeMap;

/// Difference between a lock file and a fresh resolution.
#[derive(Debug, Serialize)]
pub struct DriftReport {
    pub locked_image_id: String,
    pub current_image_id: String,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    pub has_drift: bool,
}

/// Compare `lock` with the entries of a fresh resolution.
///
/// An entry is modified when its content, kind or optimisation level changed.
/// A pure reordering changes the image id, so it is reported as drift even when
/// every list is empty.
pub fn diff_lock(lock: &ImageLock, current: &ImageLock) -> DriftReport {
    let locked: BTreeMap<&str, &LockedEntry> = lock
        .entries
        .iter()
        .map(|e| (e.dest_name.as_str(), e))
        .collect();
    let fresh: BTreeMap<&str, &LockedEntry> = current
        .entries
        .iter()
        .map(|e| (e.dest_name.as_str(), e))
        .collect();

    let mut added = Vec::new();
    let mut modified = Vec::new();
    for (dest, entry) in &fresh {
        match locked.get(dest) {
            None => added.push((*dest).to_owned()),
            Some(old)
                if old.digest != entry.digest || old.kind != entry.kind || old.opt != entry.opt =>
            {
                modified.push((*dest).to_owned());
            }
            Some(_) => {}
        }
    }
    let removed: Vec<String> = locked
        .keys()
        .filter(|dest| !fresh.contains_key(*dest))
        .map(|dest| (*dest).to_owned())
        .collect();

    let has_drift = !added.is_empty()
        || !modified.is_empty()
        || !removed.is_empty()
        || lock.image_id != current.image_id;

    DriftReport {
        locked_image_id: lock.image_id.clone(),
        current_image_id: current.image_id.clone(),
        added,
        modified,
        removed,
        has_drift,
    }
}

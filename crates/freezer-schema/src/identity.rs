use crate::lock::LockedEntry;
use crate::types::{ContentDigest, ImageId, ShortId};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Deterministic identity of a frozen image, derived from what goes into it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImageIdentity {
    pub image_id: ImageId,
    pub short_id: ShortId,
}

/// Compute the image identity from locked entries, in order.
///
/// Only destination names, treatment and content digests participate.
/// Absolute source paths do not, so the same content frozen from two
/// checkouts in different locations yields the same id.
pub fn compute_image_id(entries: &[LockedEntry]) -> ImageIdentity {
    let mut hasher = blake3::Hasher::new();

    for entry in entries {
        let opt = entry
            .opt
            .map_or_else(|| "-".to_owned(), |o| o.to_string());
        hasher.update(
            format!(
                "entry:{}:{}:{}:{}\n",
                entry.dest_name, entry.kind, opt, entry.digest
            )
            .as_bytes(),
        );
    }

    let hex = hasher.finalize().to_hex().to_string();
    let short = hex[..12].to_owned();

    ImageIdentity {
        image_id: ImageId::new(hex),
        short_id: ShortId::new(short),
    }
}

/// Blake3 digest of a file's contents.
pub fn digest_file(path: impl AsRef<Path>) -> Result<ContentDigest, std::io::Error> {
    let data = fs::read(path)?;
    Ok(ContentDigest::new(blake3::hash(&data).to_hex().to_string()))
}

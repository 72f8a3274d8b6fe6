use super::{json_pretty, GlobalOpts, EXIT_SUCCESS};
use std::path::Path;

pub fn run(opts: &GlobalOpts, manifest: &Path, output: Option<&Path>) -> Result<u8, String> {
    let engine = opts.engine(manifest)?;
    let (lock, path) = engine
        .write_lock(manifest, output)
        .map_err(|e| e.to_string())?;

    if opts.json {
        println!(
            "{}",
            json_pretty(&serde_json::json!({
                "path": path,
                "image_id": lock.image_id,
                "short_id": lock.short_id,
                "entries": lock.entries.len(),
            }))?
        );
    } else {
        println!(
            "wrote {} ({} entries, image {})",
            path.display(),
            lock.entries.len(),
            lock.short_id
        );
    }
    Ok(EXIT_SUCCESS)
}

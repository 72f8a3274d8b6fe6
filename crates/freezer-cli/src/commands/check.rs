use super::{colorize_status, json_pretty, GlobalOpts, EXIT_SUCCESS};
use std::path::Path;

pub fn run(opts: &GlobalOpts, manifest: &Path) -> Result<u8, String> {
    let engine = opts.engine(manifest)?;
    let resolution = engine.resolve(manifest).map_err(|e| e.to_string())?;

    if opts.json {
        println!(
            "{}",
            json_pretty(&serde_json::json!({
                "root": resolution.root,
                "entries": resolution.entries.len(),
                "manifests": resolution.manifests,
            }))?
        );
    } else {
        println!(
            "{} {}: {} entries from {} manifest(s)",
            colorize_status(true, "ok"),
            resolution.root.display(),
            resolution.entries.len(),
            resolution.manifests.len()
        );
    }
    Ok(EXIT_SUCCESS)
}

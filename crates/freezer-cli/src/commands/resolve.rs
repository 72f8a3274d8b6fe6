use super::{colorize_kind, json_pretty, GlobalOpts, EXIT_SUCCESS};
use std::path::Path;

pub fn run(opts: &GlobalOpts, manifest: &Path) -> Result<u8, String> {
    let engine = opts.engine(manifest)?;
    let resolution = engine.resolve(manifest).map_err(|e| e.to_string())?;

    if opts.json {
        println!("{}", json_pretty(&resolution.entries)?);
    } else {
        for entry in &resolution.entries {
            println!(
                "{} {} <- {}",
                colorize_kind(entry.kind),
                entry.dest_name,
                entry.source_path.display()
            );
        }
    }
    Ok(EXIT_SUCCESS)
}

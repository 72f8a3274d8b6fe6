use super::{colorize_status, json_pretty, GlobalOpts, EXIT_DRIFT, EXIT_SUCCESS};
use std::path::Path;

pub fn run(opts: &GlobalOpts, manifest: &Path, lock: Option<&Path>) -> Result<u8, String> {
    let engine = opts.engine(manifest)?;
    let report = engine.verify(manifest, lock).map_err(|e| e.to_string())?;

    if opts.json {
        println!("{}", json_pretty(&report)?);
    } else if report.has_drift {
        println!(
            "{}: lock {} != current {}",
            colorize_status(false, "drift"),
            short(&report.locked_image_id),
            short(&report.current_image_id)
        );
        for f in &report.added {
            println!("  + {f}");
        }
        for f in &report.modified {
            println!("  ~ {f}");
        }
        for f in &report.removed {
            println!("  - {f}");
        }
        if report.added.is_empty() && report.modified.is_empty() && report.removed.is_empty() {
            println!("  entries were reordered");
        }
    } else {
        println!(
            "{}: lock matches ({})",
            colorize_status(true, "ok"),
            short(&report.current_image_id)
        );
    }

    Ok(if report.has_drift {
        EXIT_DRIFT
    } else {
        EXIT_SUCCESS
    })
}

fn short(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

use super::{json_pretty, GlobalOpts, EXIT_SUCCESS};
use std::path::Path;

pub fn run(opts: &GlobalOpts, manifest: &Path) -> Result<u8, String> {
    let config = opts.load_config(manifest)?;

    if opts.json {
        println!("{}", json_pretty(&config)?);
    } else {
        for (name, value) in config.vars.iter() {
            println!("{name}={value}");
        }
        println!("# on_duplicate = {}", config.on_duplicate);
    }
    Ok(EXIT_SUCCESS)
}

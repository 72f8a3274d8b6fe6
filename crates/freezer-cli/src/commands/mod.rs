pub mod check;
pub mod completions;
pub mod lock;
pub mod man_pages;
pub mod resolve;
pub mod vars;
pub mod verify;

use freezer_core::{DuplicatePolicy, Engine, FreezerConfig};
use freezer_schema::EntryKind;
use std::path::{Path, PathBuf};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_RESOLVE_ERROR: u8 = 3;
pub const EXIT_DRIFT: u8 = 4;

/// Options shared by every command.
#[derive(Debug, Default)]
pub struct GlobalOpts {
    pub json: bool,
    pub config: Option<PathBuf>,
    pub vars: Vec<(String, String)>,
    pub on_duplicate: Option<DuplicatePolicy>,
}

impl GlobalOpts {
    /// Config file, then `FREEZER_*` environment, then command-line flags.
    pub fn load_config(&self, manifest: &Path) -> Result<FreezerConfig, String> {
        let mut config = FreezerConfig::discover(self.config.as_deref(), manifest)
            .map_err(|e| e.to_string())?
            .with_env_overrides();
        for (name, value) in &self.vars {
            config.vars.set(name, value);
        }
        if let Some(policy) = self.on_duplicate {
            config.on_duplicate = policy;
        }
        Ok(config)
    }

    pub fn engine(&self, manifest: &Path) -> Result<Engine, String> {
        Ok(Engine::new(self.load_config(manifest)?))
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn colorize_kind(kind: EntryKind) -> String {
    use console::Style;
    let label = format!("{:<6}", kind.to_string());
    match kind {
        EntryKind::AsMpy => Style::new().green().apply_to(label).to_string(),
        EntryKind::AsStr => Style::new().yellow().apply_to(label).to_string(),
        EntryKind::Mpy => Style::new().cyan().apply_to(label).to_string(),
    }
}

pub fn colorize_status(ok: bool, word: &str) -> String {
    use console::Style;
    if ok {
        Style::new().green().bold().apply_to(word).to_string()
    } else {
        Style::new().red().bold().apply_to(word).to_string()
    }
}

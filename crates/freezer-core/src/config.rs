//! Layered configuration.
//!
//! Lookup order for the file: an explicit path, `$FREEZER_CONFIG`, a project
//! `freezer.toml` next to the root manifest, then the user config under
//! `$XDG_CONFIG_HOME/freezer/config.toml` (or `~/.config/freezer/config.toml`).
//! The first file found wins; `FREEZER_*` environment overrides are layered on
//! top, and CLI flags on top of those.

use crate::policy::DuplicatePolicy;
use freezer_schema::Environment;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const CONFIG_ENV: &str = "FREEZER_CONFIG";
pub const ON_DUPLICATE_ENV: &str = "FREEZER_ON_DUPLICATE";
pub const VAR_ENV_PREFIX: &str = "FREEZER_VAR_";
pub const PROJECT_CONFIG_NAME: &str = "freezer.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config error: failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config error: failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("config error: invalid variable name(s) in {}: {}", .path.display(), .names.join(", "))]
    InvalidVarNames { path: PathBuf, names: Vec<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FreezerConfig {
    /// Caller environment for `$(NAME)` placeholders, e.g. `MPY_DIR`, `PORT_DIR`.
    #[serde(default)]
    pub vars: Environment,
    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,
}

impl FreezerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let invalid = config.vars.invalid_names();
        if !invalid.is_empty() {
            return Err(ConfigError::InvalidVarNames {
                path: path.to_path_buf(),
                names: invalid.into_iter().map(str::to_owned).collect(),
            });
        }
        debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Find and load the config file for a run on `manifest`, without env overrides.
    ///
    /// An explicitly named file (flag or `$FREEZER_CONFIG`) must exist; the
    /// implicit locations are only used when present.
    pub fn discover(explicit: Option<&Path>, manifest: &Path) -> Result<Self, ConfigError> {
        Self::discover_with(explicit, manifest, |key| std::env::var(key).ok())
    }

    pub fn discover_with<F>(
        explicit: Option<&Path>,
        manifest: &Path,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = lookup(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Self::load(Path::new(&path));
        }

        let project = project_config_path(manifest);
        if project.is_file() {
            return Self::load(&project);
        }

        if let Some(user) = user_config_path(&lookup) {
            if user.is_file() {
                return Self::load(&user);
            }
        }

        Ok(Self::default())
    }

    /// Apply `FREEZER_ON_DUPLICATE` and `FREEZER_VAR_<NAME>` from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(std::env::vars_os())
    }

    /// Like [`Self::with_env_overrides`], over explicit pairs.
    ///
    /// Pairs that are not valid UTF-8 are skipped.
    #[must_use]
    pub fn with_overrides_from<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        for (key, value) in vars {
            let Ok(key) = key.into_string() else {
                continue;
            };
            if !key.starts_with("FREEZER_") {
                continue;
            }
            let Ok(value) = value.into_string() else {
                warn!("ignoring {key}: value is not valid UTF-8");
                continue;
            };
            if key == ON_DUPLICATE_ENV {
                match value.parse() {
                    Ok(policy) => self.on_duplicate = policy,
                    Err(e) => warn!("ignoring {ON_DUPLICATE_ENV}: {e}"),
                }
            } else if let Some(name) = key.strip_prefix(VAR_ENV_PREFIX) {
                if freezer_schema::vars::is_valid_name(name) {
                    self.vars.set(name, value);
                } else {
                    warn!("ignoring {key}: '{name}' is not a valid variable name");
                }
            }
        }
        self
    }
}

/// `freezer.toml` in the directory of the root manifest.
pub fn project_config_path(manifest: &Path) -> PathBuf {
    let dir = if manifest.is_dir() {
        manifest
    } else {
        manifest.parent().unwrap_or_else(|| Path::new("."))
    };
    dir.join(PROJECT_CONFIG_NAME)
}

fn user_config_path<F>(lookup: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    lookup("XDG_CONFIG_HOME")
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .or_else(|| lookup("HOME").map(|h| PathBuf::from(h).join(".config")))
        .map(|dir| dir.join("freezer").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_pairs(pairs: &[(&str, &str)]) -> Vec<(OsString, OsString)> {
        pairs
            .iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v)))
            .collect()
    }

    #[test]
    fn defaults_when_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("manifest.toml");
        let config = FreezerConfig::discover_with(None, &manifest, no_env).unwrap();
        assert_eq!(config, FreezerConfig::default());
        assert_eq!(config.on_duplicate, DuplicatePolicy::Error);
    }

    #[test]
    fn project_config_next_to_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("freezer.toml"),
            "on_duplicate = \"last-wins\"\n[vars]\nMPY_DIR = \"/opt/micropython\"\n",
        )
        .unwrap();
        let manifest = dir.path().join("manifest.toml");
        let config = FreezerConfig::discover_with(None, &manifest, no_env).unwrap();
        assert_eq!(config.on_duplicate, DuplicatePolicy::LastWins);
        assert_eq!(config.vars.get("MPY_DIR"), Some("/opt/micropython"));
    }

    #[test]
    fn explicit_path_beats_env_and_project() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("freezer.toml"), "on_duplicate = \"last-wins\"\n").unwrap();
        let explicit = dir.path().join("explicit.toml");
        fs::write(&explicit, "on_duplicate = \"first-wins\"\n").unwrap();
        let from_env = dir.path().join("env.toml");
        fs::write(&from_env, "on_duplicate = \"error\"\n").unwrap();

        let env_path = from_env.display().to_string();
        let lookup = |key: &str| (key == CONFIG_ENV).then(|| env_path.clone());
        let manifest = dir.path().join("manifest.toml");

        let config = FreezerConfig::discover_with(Some(&explicit), &manifest, lookup).unwrap();
        assert_eq!(config.on_duplicate, DuplicatePolicy::FirstWins);

        let config = FreezerConfig::discover_with(None, &manifest, lookup).unwrap();
        assert_eq!(config.on_duplicate, DuplicatePolicy::Error);
    }

    #[test]
    fn user_config_under_xdg_home() {
        let home = tempfile::tempdir().unwrap();
        fs::create_dir_all(home.path().join("freezer")).unwrap();
        fs::write(
            home.path().join("freezer/config.toml"),
            "[vars]\nPORT_DIR = \"/p\"\n",
        )
        .unwrap();
        let project = tempfile::tempdir().unwrap();
        let xdg = home.path().display().to_string();
        let lookup = |key: &str| (key == "XDG_CONFIG_HOME").then(|| xdg.clone());

        let config =
            FreezerConfig::discover_with(None, &project.path().join("manifest.toml"), lookup)
                .unwrap();
        assert_eq!(config.vars.get("PORT_DIR"), Some("/p"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FreezerConfig::discover_with(
            Some(&dir.path().join("nope.toml")),
            &dir.path().join("manifest.toml"),
            no_env,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().starts_with("config error:"));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        fs::write(&path, "store = \"/tmp\"\n").unwrap();
        assert!(matches!(
            FreezerConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));

        fs::write(&path, "[vars]\n\"BAD-NAME\" = \"x\"\n").unwrap();
        assert!(matches!(
            FreezerConfig::load(&path),
            Err(ConfigError::InvalidVarNames { .. })
        ));
    }

    #[test]
    fn env_overrides_layer_on_top() {
        let config = FreezerConfig {
            vars: Environment::new().with("MPY_DIR", "/from/file"),
            on_duplicate: DuplicatePolicy::Error,
        }
        .with_overrides_from(env_pairs(&[
            ("FREEZER_ON_DUPLICATE", "first-wins"),
            ("FREEZER_VAR_MPY_DIR", "/from/env"),
            ("FREEZER_VAR_BOARD_DIR", "/b"),
            ("FREEZER_VAR_bad-name", "x"),
            ("PATH", "/usr/bin"),
        ]));
        assert_eq!(config.on_duplicate, DuplicatePolicy::FirstWins);
        assert_eq!(config.vars.get("MPY_DIR"), Some("/from/env"));
        assert_eq!(config.vars.get("BOARD_DIR"), Some("/b"));
        assert_eq!(config.vars.len(), 2);
    }

    #[test]
    fn invalid_env_policy_is_ignored() {
        let config = FreezerConfig::default()
            .with_overrides_from(env_pairs(&[("FREEZER_ON_DUPLICATE", "newest")]));
        assert_eq!(config.on_duplicate, DuplicatePolicy::Error);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_env_pairs_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let bad = || OsString::from_vec(vec![0xff, 0xfe]);
        let mut vars = vec![
            (OsString::from("LANG_JUNK"), bad()),
            (bad(), OsString::from("x")),
            (OsString::from("FREEZER_VAR_BROKEN"), bad()),
        ];
        vars.extend(env_pairs(&[
            ("FREEZER_VAR_PORT_DIR", "/p"),
            ("FREEZER_ON_DUPLICATE", "last-wins"),
        ]));

        let config = FreezerConfig::default().with_overrides_from(vars);
        assert_eq!(config.vars.get("PORT_DIR"), Some("/p"));
        assert_eq!(config.vars.get("BROKEN"), None);
        assert_eq!(config.vars.len(), 1);
        assert_eq!(config.on_duplicate, DuplicatePolicy::LastWins);
    }

    #[test]
    fn process_environment_overrides_do_not_panic() {
        // Whatever the test runner's environment holds, the defaults survive.
        let config = FreezerConfig::default().with_env_overrides();
        assert!(config.vars.invalid_names().is_empty());
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported manifest_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("invalid variable name '{0}' in [vars]")]
    InvalidVarName(String),
    #[error("directive[{index}] declares neither 'freeze' nor 'include'")]
    EmptyDirective { index: usize },
    #[error("directive[{index}] declares both 'freeze' and 'include'")]
    AmbiguousDirective { index: usize },
    #[error("directive[{index}]: '{key}' is only valid on {expected} directives")]
    MisplacedKey {
        index: usize,
        key: &'static str,
        expected: &'static str,
    },
    #[error("directive[{index}]: path must not be empty")]
    EmptyPath { index: usize },
    #[error("directive[{index}]: invalid member '{member}': {reason}")]
    InvalidMember {
        index: usize,
        member: String,
        reason: &'static str,
    },
    #[error("directive[{index}]: opt level {opt} out of range, expected 0..=3")]
    InvalidOptLevel { index: usize, opt: u8 },
    #[error("directive[{index}]: invalid variable name '{name}' in include vars")]
    InvalidIncludeVar { index: usize, name: String },
}

/// Raw on-disk form of a freeze manifest.
///
/// Directives are kept in one ordered `[[directive]]` array so that freezes and
/// includes interleave exactly as declared.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ManifestV1 {
    pub manifest_version: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,
    #[serde(default, rename = "directive")]
    pub directives: Vec<DirectiveEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DirectiveEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeze: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Members>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FreezeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opt: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vars: Option<BTreeMap<String, String>>,
}

/// `members = "a.py"` or `members = ["a.py", "b.py"]`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Members {
    One(String),
    Many(Vec<String>),
}

impl Members {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Members::One(m) => vec![m.clone()],
            Members::Many(ms) => ms.clone(),
        }
    }
}

/// How the files of a freeze directive are embedded.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FreezeKind {
    /// `.py` is compiled to bytecode, `.mpy` is embedded as-is, anything else is skipped.
    #[default]
    Auto,
    AsStr,
    AsMpy,
    Mpy,
}

/// The concrete treatment a single resolved file receives.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Source text embedded verbatim.
    AsStr,
    /// Source compiled to bytecode at build time.
    AsMpy,
    /// Precompiled bytecode embedded as-is.
    Mpy,
}

const PY_EXT: &str = ".py";
const MPY_EXT: &str = ".mpy";

impl FreezeKind {
    /// Decide how `file_name` is frozen under this kind.
    ///
    /// `Ok(None)` means `Auto` met a file it does not handle and the file is
    /// skipped. `Err` carries the extension an explicit kind requires.
    pub fn classify(self, file_name: &str) -> Result<Option<EntryKind>, &'static str> {
        let is_py = file_name.ends_with(PY_EXT);
        let is_mpy = file_name.ends_with(MPY_EXT);
        match self {
            FreezeKind::Auto if is_py => Ok(Some(EntryKind::AsMpy)),
            FreezeKind::Auto if is_mpy => Ok(Some(EntryKind::Mpy)),
            FreezeKind::Auto => Ok(None),
            FreezeKind::AsStr if is_py => Ok(Some(EntryKind::AsStr)),
            FreezeKind::AsMpy if is_py => Ok(Some(EntryKind::AsMpy)),
            FreezeKind::AsStr | FreezeKind::AsMpy => Err(PY_EXT),
            FreezeKind::Mpy if is_mpy => Ok(Some(EntryKind::Mpy)),
            FreezeKind::Mpy => Err(MPY_EXT),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryKind::AsStr => "as_str",
            EntryKind::AsMpy => "as_mpy",
            EntryKind::Mpy => "mpy",
        };
        f.write_str(s)
    }
}

pub fn parse_manifest_str(input: &str) -> Result<ManifestV1, ManifestError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<ManifestV1, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}

use crate::manifest::{DirectiveEntry, FreezeKind, ManifestError, ManifestV1};
use crate::vars::is_valid_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MAX_OPT_LEVEL: u8 = 3;

/// Validated, typed representation of a parsed manifest.
///
/// Every directive has been checked to be exactly one of freeze or include,
/// paths are trimmed and non-empty, and members are safe package-relative
/// paths. Placeholders are still unexpanded; expansion needs the caller's
/// environment and happens during resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedManifest {
    pub manifest_version: u32,
    pub vars: BTreeMap<String, String>,
    pub directives: Vec<Directive>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum Directive {
    Freeze(FreezeDirective),
    Include(IncludeDirective),
}

/// Embed files from `source_dir`; all of them when `members` is `None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FreezeDirective {
    pub index: usize,
    pub source_dir: String,
    pub members: Option<Vec<String>>,
    pub kind: FreezeKind,
    pub opt: Option<u8>,
}

/// Splice the resolution of another manifest in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncludeDirective {
    pub index: usize,
    pub manifest_path: String,
    pub vars: BTreeMap<String, String>,
}

impl Directive {
    /// Zero-based position of the directive in its manifest.
    pub fn index(&self) -> usize {
        match self {
            Directive::Freeze(f) => f.index,
            Directive::Include(i) => i.index,
        }
    }
}

impl ManifestV1 {
    /// Normalize the manifest: validate every directive and convert it to its typed form.
    pub fn normalize(&self) -> Result<NormalizedManifest, ManifestError> {
        if self.manifest_version != 1 {
            return Err(ManifestError::UnsupportedVersion(self.manifest_version));
        }

        for name in self.vars.keys() {
            if !is_valid_name(name) {
                return Err(ManifestError::InvalidVarName(name.clone()));
            }
        }

        let directives = self
            .directives
            .iter()
            .enumerate()
            .map(|(index, entry)| normalize_directive(index, entry))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(NormalizedManifest {
            manifest_version: self.manifest_version,
            vars: self.vars.clone(),
            directives,
        })
    }
}

fn normalize_directive(index: usize, entry: &DirectiveEntry) -> Result<Directive, ManifestError> {
    match (&entry.freeze, &entry.include) {
        (Some(_), Some(_)) => Err(ManifestError::AmbiguousDirective { index }),
        (None, None) => Err(ManifestError::EmptyDirective { index }),
        (Some(source_dir), None) => {
            if entry.vars.is_some() {
                return Err(ManifestError::MisplacedKey {
                    index,
                    key: "vars",
                    expected: "include",
                });
            }
            let source_dir = non_empty_path(index, source_dir)?;
            let members = match &entry.members {
                Some(members) => Some(
                    members
                        .to_vec()
                        .iter()
                        .map(|m| normalize_member(index, m))
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                None => None,
            };
            if let Some(opt) = entry.opt {
                if opt > MAX_OPT_LEVEL {
                    return Err(ManifestError::InvalidOptLevel { index, opt });
                }
            }
            Ok(Directive::Freeze(FreezeDirective {
                index,
                source_dir,
                members,
                kind: entry.kind.unwrap_or_default(),
                opt: entry.opt,
            }))
        }
        (None, Some(manifest_path)) => {
            for (key, present) in [
                ("members", entry.members.is_some()),
                ("kind", entry.kind.is_some()),
                ("opt", entry.opt.is_some()),
            ] {
                if present {
                    return Err(ManifestError::MisplacedKey {
                        index,
                        key,
                        expected: "freeze",
                    });
                }
            }
            let manifest_path = non_empty_path(index, manifest_path)?;
            let vars = entry.vars.clone().unwrap_or_default();
            if let Some(name) = vars.keys().find(|name| !is_valid_name(name)) {
                return Err(ManifestError::InvalidIncludeVar {
                    index,
                    name: name.clone(),
                });
            }
            Ok(Directive::Include(IncludeDirective {
                index,
                manifest_path,
                vars,
            }))
        }
    }
}

fn non_empty_path(index: usize, raw: &str) -> Result<String, ManifestError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ManifestError::EmptyPath { index });
    }
    Ok(trimmed.to_owned())
}

fn normalize_member(index: usize, raw: &str) -> Result<String, ManifestError> {
    check_member(raw)
        .map(str::to_owned)
        .map_err(|reason| ManifestError::InvalidMember {
            index,
            member: raw.to_owned(),
            reason,
        })
}

/// Members become destination names, so they must stay inside the package.
///
/// Returns the member trimmed of surrounding whitespace and trailing slashes.
pub fn check_member(raw: &str) -> Result<&str, &'static str> {
    let member = raw.trim();
    if member.is_empty() {
        return Err("must not be empty");
    }
    if member.starts_with('/') || member.contains('\\') || member.contains(':') {
        return Err("must be a relative '/'-separated path");
    }
    let member = member.trim_end_matches('/');
    for component in member.split('/') {
        match component {
            "" | "." => return Err("must not contain empty or '.' components"),
            ".." => return Err("must not contain '..'"),
            _ => {}
        }
    }
    Ok(member)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_manifest_str;

    fn normalize(input: &str) -> Result<NormalizedManifest, ManifestError> {
        parse_manifest_str(input).unwrap().normalize()
    }

    #[test]
    fn preserves_declaration_order() {
        let normalized = normalize(
            r#"
manifest_version = 1

[[directive]]
include = "lib/manifest.toml"

[[directive]]
freeze = "modules"
members = ["b.py", "a.py"]

[[directive]]
freeze = "drivers"
"#,
        )
        .unwrap();

        assert_eq!(normalized.directives.len(), 3);
        assert!(matches!(normalized.directives[0], Directive::Include(_)));
        let Directive::Freeze(ref f) = normalized.directives[1] else {
            panic!("expected freeze");
        };
        assert_eq!(f.index, 1);
        assert_eq!(f.members.as_deref(), Some(&["b.py".to_owned(), "a.py".to_owned()][..]));
        assert_eq!(f.kind, FreezeKind::Auto);
        let Directive::Freeze(ref f) = normalized.directives[2] else {
            panic!("expected freeze");
        };
        assert!(f.members.is_none());
    }

    #[test]
    fn single_member_string_becomes_list() {
        let normalized = normalize(
            r#"
manifest_version = 1
[[directive]]
freeze = "/y/"
members = "c.py"
"#,
        )
        .unwrap();
        let Directive::Freeze(ref f) = normalized.directives[0] else {
            panic!("expected freeze");
        };
        assert_eq!(f.members, Some(vec!["c.py".to_owned()]));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = normalize("manifest_version = 2\n").unwrap_err();
        assert!(matches!(err, ManifestError::UnsupportedVersion(2)));
    }

    #[test]
    fn rejects_directive_with_both_kinds() {
        let err = normalize(
            r#"
manifest_version = 1
[[directive]]
freeze = "modules"
include = "other.toml"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::AmbiguousDirective { index: 0 }));
    }

    #[test]
    fn rejects_empty_directive_with_index() {
        let err = normalize(
            r#"
manifest_version = 1
[[directive]]
freeze = "modules"
[[directive]]
opt = 1
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::EmptyDirective { index: 1 }));
        assert!(err.to_string().contains("directive[1]"));
    }

    #[test]
    fn rejects_members_on_include() {
        let err = normalize(
            r#"
manifest_version = 1
[[directive]]
include = "other.toml"
members = ["a.py"]
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ManifestError::MisplacedKey { key: "members", .. }
        ));
    }

    #[test]
    fn rejects_vars_on_freeze() {
        let err = normalize(
            r#"
manifest_version = 1
[[directive]]
freeze = "modules"
vars = { A = "b" }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::MisplacedKey { key: "vars", .. }));
    }

    #[test]
    fn rejects_blank_paths() {
        let err = normalize(
            r#"
manifest_version = 1
[[directive]]
freeze = "   "
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::EmptyPath { index: 0 }));
    }

    #[test]
    fn rejects_escaping_members() {
        for member in ["../secret.py", "/abs.py", "a/../b.py", "", "a//b.py"] {
            let input = format!(
                "manifest_version = 1\n[[directive]]\nfreeze = \"m\"\nmembers = [\"{member}\"]\n"
            );
            let err = normalize(&input).unwrap_err();
            assert!(
                matches!(err, ManifestError::InvalidMember { .. }),
                "member {member:?} should be rejected"
            );
        }
    }

    #[test]
    fn accepts_nested_members() {
        let normalized = normalize(
            r#"
manifest_version = 1
[[directive]]
freeze = "lib"
members = ["umqtt/simple.py", "umqtt/"]
"#,
        )
        .unwrap();
        let Directive::Freeze(ref f) = normalized.directives[0] else {
            panic!("expected freeze");
        };
        assert_eq!(
            f.members,
            Some(vec!["umqtt/simple.py".to_owned(), "umqtt".to_owned()])
        );
    }

    #[test]
    fn rejects_opt_level_out_of_range() {
        let err = normalize(
            r#"
manifest_version = 1
[[directive]]
freeze = "modules"
opt = 4
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidOptLevel { opt: 4, .. }));
    }

    #[test]
    fn rejects_invalid_var_names() {
        let err = normalize(
            r#"
manifest_version = 1
[vars]
"SRC-TOP" = "/src"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidVarName(_)));

        let err = normalize(
            r#"
manifest_version = 1
[[directive]]
include = "lib"
vars = { "1X" = "y" }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidIncludeVar { index: 0, .. }));
    }
}

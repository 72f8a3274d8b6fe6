use crate::enumerate::collect_freeze;
use crate::policy::DuplicatePolicy;
use freezer_schema::{
    check_member, parse_manifest_file, DestName, Directive, EntryKind, Environment,
    FreezeDirective, IncludeDirective, ManifestError, Scope, VarError,
};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, trace};

/// File name looked up when an include points at a directory.
pub const DEFAULT_MANIFEST_NAME: &str = "manifest.toml";

/// Where a resolved entry or an error came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Origin {
    pub manifest: PathBuf,
    /// `None` for errors raised while expanding the manifest's `[vars]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl Origin {
    pub fn directive(manifest: &Path, index: usize) -> Self {
        Self {
            manifest: manifest.to_path_buf(),
            index: Some(index),
        }
    }

    pub fn vars(manifest: &Path) -> Self {
        Self {
            manifest: manifest.to_path_buf(),
            index: None,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}: directive[{index}]", self.manifest.display()),
            None => write!(f, "{}: [vars]", self.manifest.display()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("manifest error: {}: {source}", .manifest.display())]
    Read {
        manifest: PathBuf,
        source: ManifestError,
    },
    #[error("manifest error: {origin}: undefined variable $({name})")]
    UndefinedVariable { origin: Origin, name: String },
    #[error("manifest error: {origin}: {source}")]
    Placeholder { origin: Origin, source: VarError },
    #[error("manifest error: {origin}: invalid member '{member}': {reason}")]
    InvalidMember {
        origin: Origin,
        member: String,
        reason: &'static str,
    },
    #[error("manifest error: {origin}: include cycle: {}", format_chain(.chain))]
    Cycle { origin: Origin, chain: Vec<PathBuf> },
    #[error("resolve error: {origin}: path not found: {}", .path.display())]
    PathNotFound { origin: Origin, path: PathBuf },
    #[error("resolve error: {origin}: not a directory: {}", .path.display())]
    NotADirectory { origin: Origin, path: PathBuf },
    #[error("resolve error: {origin}: kind expects a {expected} file: {}", .file.display())]
    KindMismatch {
        origin: Origin,
        file: PathBuf,
        expected: &'static str,
    },
    #[error("resolve error: duplicate destination '{dest_name}' declared by {first} and {second}")]
    DuplicateDestination {
        dest_name: DestName,
        first: Origin,
        second: Origin,
    },
    #[error("resolve error: {origin}: {}: {source}", .path.display())]
    Io {
        origin: Origin,
        path: PathBuf,
        source: io::Error,
    },
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A final `(source, destination)` pair ready for the packaging step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEntry {
    pub source_path: PathBuf,
    pub dest_name: DestName,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opt: Option<u8>,
    pub origin: Origin,
}

impl ResolvedEntry {
    /// Same source, kind and opt. Such entries collapse instead of conflicting.
    pub fn same_payload(&self, other: &ResolvedEntry) -> bool {
        self.source_path == other.source_path && self.kind == other.kind && self.opt == other.opt
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    pub on_duplicate: DuplicatePolicy,
}

/// Outcome of resolving a root manifest.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub root: PathBuf,
    pub entries: Vec<ResolvedEntry>,
    /// Every manifest visited, in first-visit order.
    pub manifests: Vec<PathBuf>,
}

/// Depth-first expansion of a manifest and everything it includes.
///
/// A resolver is consumed by [`Resolver::resolve`]; build a new one per run.
pub struct Resolver<'a> {
    env: &'a Environment,
    options: ResolveOptions,
    stack: Vec<PathBuf>,
    manifests: Vec<PathBuf>,
}

impl<'a> Resolver<'a> {
    pub fn new(env: &'a Environment, options: ResolveOptions) -> Self {
        Self {
            env,
            options,
            stack: Vec::new(),
            manifests: Vec::new(),
        }
    }

    pub fn resolve(mut self, root: &Path) -> Result<Resolution, ResolveError> {
        let root = manifest_file(root);
        let root = fs::canonicalize(&root).map_err(|e| ResolveError::Read {
            manifest: root.clone(),
            source: ManifestError::Io(e),
        })?;
        info!("resolving {}", root.display());

        let mut raw = Vec::new();
        self.resolve_manifest(&root, &Environment::new(), &mut raw)?;
        debug!(
            "{} entries from {} manifests before duplicate handling",
            raw.len(),
            self.manifests.len()
        );

        let entries = self.options.on_duplicate.apply(raw)?;
        Ok(Resolution {
            root,
            entries,
            manifests: self.manifests,
        })
    }

    fn resolve_manifest(
        &mut self,
        path: &Path,
        include_vars: &Environment,
        out: &mut Vec<ResolvedEntry>,
    ) -> Result<(), ResolveError> {
        let read_err = |source: ManifestError| ResolveError::Read {
            manifest: path.to_path_buf(),
            source,
        };
        let manifest = parse_manifest_file(path)
            .map_err(read_err)?
            .normalize()
            .map_err(read_err)?;

        if !self.manifests.iter().any(|p| p == path) {
            self.manifests.push(path.to_path_buf());
        }
        self.stack.push(path.to_path_buf());
        trace!("entering {} (depth {})", path.display(), self.stack.len());

        let outer = [include_vars, self.env];
        let outer_scope = Scope::new(&outer);
        let mut local = Environment::new();
        for (name, value) in &manifest.vars {
            let value = outer_scope
                .expand(value)
                .map_err(|e| var_error(Origin::vars(path), e))?;
            local.set(name, value);
        }

        let layers = [&local, include_vars, self.env];
        let scope = Scope::new(&layers);
        let base = path.parent().unwrap_or_else(|| Path::new("/"));

        for directive in &manifest.directives {
            match directive {
                Directive::Freeze(freeze) => {
                    let entries = self.freeze(path, base, &scope, freeze)?;
                    out.extend(entries);
                }
                Directive::Include(include) => {
                    let (child, child_vars) = self.include_target(path, base, &scope, include)?;
                    if let Some(pos) = self.stack.iter().position(|p| *p == child) {
                        let mut chain = self.stack[pos..].to_vec();
                        chain.push(child);
                        return Err(ResolveError::Cycle {
                            origin: Origin::directive(path, include.index),
                            chain,
                        });
                    }
                    debug!(
                        "{}: directive[{}] includes {}",
                        path.display(),
                        include.index,
                        child.display()
                    );
                    self.resolve_manifest(&child, &child_vars, out)?;
                }
            }
        }

        self.stack.pop();
        Ok(())
    }

    fn freeze(
        &self,
        manifest: &Path,
        base: &Path,
        scope: &Scope<'_>,
        freeze: &FreezeDirective,
    ) -> Result<Vec<ResolvedEntry>, ResolveError> {
        let origin = Origin::directive(manifest, freeze.index);

        // All placeholders are expanded before the filesystem is touched.
        let source_dir = scope
            .expand(&freeze.source_dir)
            .map_err(|e| var_error(origin.clone(), e))?;
        let members = match &freeze.members {
            Some(members) => Some(
                members
                    .iter()
                    .map(|m| expand_member(scope, &origin, m))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };

        let source_dir = join_path(base, &source_dir);
        match fs::metadata(&source_dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(ResolveError::NotADirectory {
                    origin,
                    path: source_dir,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ResolveError::PathNotFound {
                    origin,
                    path: source_dir,
                })
            }
            Err(source) => {
                return Err(ResolveError::Io {
                    origin,
                    path: source_dir,
                    source,
                })
            }
        }

        collect_freeze(
            &source_dir,
            members.as_deref(),
            freeze.kind,
            freeze.opt,
            &origin,
        )
    }

    fn include_target(
        &self,
        manifest: &Path,
        base: &Path,
        scope: &Scope<'_>,
        include: &IncludeDirective,
    ) -> Result<(PathBuf, Environment), ResolveError> {
        let origin = Origin::directive(manifest, include.index);

        let target = scope
            .expand(&include.manifest_path)
            .map_err(|e| var_error(origin.clone(), e))?;
        let mut child_vars = Environment::new();
        for (name, value) in &include.vars {
            let value = scope
                .expand(value)
                .map_err(|e| var_error(origin.clone(), e))?;
            child_vars.set(name, value);
        }

        let target = manifest_file(&join_path(base, &target));
        let canonical = fs::canonicalize(&target).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ResolveError::PathNotFound {
                    origin: origin.clone(),
                    path: target.clone(),
                }
            } else {
                ResolveError::Io {
                    origin: origin.clone(),
                    path: target.clone(),
                    source: e,
                }
            }
        })?;
        Ok((canonical, child_vars))
    }
}

fn expand_member(scope: &Scope<'_>, origin: &Origin, raw: &str) -> Result<String, ResolveError> {
    let expanded = scope
        .expand(raw)
        .map_err(|e| var_error(origin.clone(), e))?;
    check_member(&expanded)
        .map(str::to_owned)
        .map_err(|reason| ResolveError::InvalidMember {
            origin: origin.clone(),
            member: expanded.clone(),
            reason,
        })
}

fn var_error(origin: Origin, err: VarError) -> ResolveError {
    match err {
        VarError::Undefined { name } => ResolveError::UndefinedVariable { origin, name },
        source => ResolveError::Placeholder { origin, source },
    }
}

/// An include or root path naming a directory means its `manifest.toml`.
fn manifest_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(DEFAULT_MANIFEST_NAME)
    } else {
        path.to_path_buf()
    }
}

/// `rel` against `base`, dropping `.` components.
///
/// `..` is kept for the OS to resolve, since folding it lexically would be wrong
/// past a symlinked directory.
fn join_path(base: &Path, rel: &str) -> PathBuf {
    base.join(rel).components().collect()
}

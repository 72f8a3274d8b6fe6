use crate::resolver::{Origin, ResolveError, ResolvedEntry};
use freezer_schema::{DestName, EntryKind, FreezeKind};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// Expand one freeze directive into entries, in declaration then name order.
///
/// `source_dir` must already be known to be a directory.
pub(crate) fn collect_freeze(
    source_dir: &Path,
    members: Option<&[String]>,
    kind: FreezeKind,
    opt: Option<u8>,
    origin: &Origin,
) -> Result<Vec<ResolvedEntry>, ResolveError> {
    let mut collector = Collector {
        root: source_dir,
        kind,
        opt,
        origin,
        ancestors: Vec::new(),
        out: Vec::new(),
    };

    match members {
        None => collector.walk(source_dir)?,
        Some(members) => {
            for member in members {
                let path = member
                    .split('/')
                    .fold(source_dir.to_path_buf(), |acc, part| acc.join(part));
                match fs::metadata(&path) {
                    Ok(meta) if meta.is_dir() => collector.walk(&path)?,
                    Ok(_) => collector.push_file(path, member)?,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        return Err(ResolveError::PathNotFound {
                            origin: origin.clone(),
                            path,
                        });
                    }
                    Err(source) => {
                        return Err(ResolveError::Io {
                            origin: origin.clone(),
                            path,
                            source,
                        })
                    }
                }
            }
        }
    }

    Ok(collector.out)
}

struct Collector<'a> {
    root: &'a Path,
    kind: FreezeKind,
    opt: Option<u8>,
    origin: &'a Origin,
    /// Canonical directories on the current walk path, for symlink loop detection.
    ancestors: Vec<PathBuf>,
    out: Vec<ResolvedEntry>,
}

impl Collector<'_> {
    fn walk(&mut self, dir: &Path) -> Result<(), ResolveError> {
        let origin = self.origin;
        let io_err = |source: io::Error| ResolveError::Io {
            origin: origin.clone(),
            path: dir.to_path_buf(),
            source,
        };

        let canonical = fs::canonicalize(dir).map_err(io_err)?;
        if self.ancestors.contains(&canonical) {
            warn!("skipping symlink loop at {}", dir.display());
            return Ok(());
        }
        self.ancestors.push(canonical);

        let mut entries = fs::read_dir(dir)
            .map_err(io_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(io_err)?;
        entries.sort_by_key(fs::DirEntry::file_name);

        for entry in entries {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                trace!("skipping hidden entry {}", entry.path().display());
                continue;
            }
            let path = entry.path();
            // fs::metadata follows symlinks.
            let meta = match fs::metadata(&path) {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!("skipping dangling symlink {}", path.display());
                    continue;
                }
                Err(source) => {
                    return Err(ResolveError::Io {
                        origin: self.origin.clone(),
                        path,
                        source,
                    })
                }
            };
            if meta.is_dir() {
                self.walk(&path)?;
            } else {
                let dest = relative_dest(self.root, &path);
                self.push_file(path, &dest)?;
            }
        }

        self.ancestors.pop();
        Ok(())
    }

    fn push_file(&mut self, path: PathBuf, dest: &str) -> Result<(), ResolveError> {
        let Some(kind) = self.classify(&path)? else {
            warn!(
                "{}: skipping {}, not a .py or .mpy file",
                self.origin,
                path.display()
            );
            return Ok(());
        };
        self.out.push(ResolvedEntry {
            source_path: path,
            dest_name: DestName::new(dest),
            kind,
            opt: self.opt,
            origin: self.origin.clone(),
        });
        Ok(())
    }

    fn classify(&self, path: &Path) -> Result<Option<EntryKind>, ResolveError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.kind
            .classify(&file_name)
            .map_err(|expected| ResolveError::KindMismatch {
                origin: self.origin.clone(),
                file: path.to_path_buf(),
                expected,
            })
    }
}

/// `/`-separated path of `path` relative to `root`.
fn relative_dest(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    fn origin() -> Origin {
        Origin::directive(Path::new("/m/manifest.toml"), 0)
    }

    fn dests(entries: &[ResolvedEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.dest_name.as_str()).collect()
    }

    #[test]
    fn walk_is_sorted_recursive_and_skips_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path();
        touch(&src.join("b.py"));
        touch(&src.join("a.py"));
        touch(&src.join("pkg/z.mpy"));
        touch(&src.join("pkg/y.py"));
        touch(&src.join(".hidden.py"));
        touch(&src.join(".git/config.py"));

        let entries = collect_freeze(src, None, FreezeKind::Auto, None, &origin()).unwrap();
        assert_eq!(dests(&entries), vec!["a.py", "b.py", "pkg/y.py", "pkg/z.mpy"]);
        assert_eq!(entries[3].kind, EntryKind::Mpy);
        assert_eq!(entries[0].source_path, src.join("a.py"));
    }

    #[test]
    fn auto_skips_unknown_extensions() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("README.md"));
        touch(&dir.path().join("boot.py"));

        let entries =
            collect_freeze(dir.path(), None, FreezeKind::Auto, Some(1), &origin()).unwrap();
        assert_eq!(dests(&entries), vec!["boot.py"]);
        assert_eq!(entries[0].opt, Some(1));
    }

    #[test]
    fn explicit_kind_rejects_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("README.md"));

        let err =
            collect_freeze(dir.path(), None, FreezeKind::AsStr, None, &origin()).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::KindMismatch {
                expected: ".py",
                ..
            }
        ));
    }

    #[test]
    fn members_keep_declared_order_and_names() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.py"));
        touch(&dir.path().join("a.py"));
        touch(&dir.path().join("umqtt/simple.py"));

        let members = vec![
            "b.py".to_owned(),
            "a.py".to_owned(),
            "umqtt/simple.py".to_owned(),
        ];
        let entries = collect_freeze(
            dir.path(),
            Some(members.as_slice()),
            FreezeKind::Auto,
            None,
            &origin(),
        )
        .unwrap();
        assert_eq!(dests(&entries), vec!["b.py", "a.py", "umqtt/simple.py"]);
    }

    #[test]
    fn directory_member_is_walked_relative_to_source() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("umqtt/simple.py"));
        touch(&dir.path().join("umqtt/robust.py"));
        touch(&dir.path().join("other.py"));

        let members = vec!["umqtt".to_owned()];
        let entries = collect_freeze(
            dir.path(),
            Some(members.as_slice()),
            FreezeKind::Auto,
            None,
            &origin(),
        )
        .unwrap();
        assert_eq!(dests(&entries), vec!["umqtt/robust.py", "umqtt/simple.py"]);
    }

    #[test]
    fn missing_member_is_path_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let members = vec!["gone.py".to_owned()];
        let err = collect_freeze(
            dir.path(),
            Some(members.as_slice()),
            FreezeKind::Auto,
            None,
            &origin(),
        )
        .unwrap_err();
        match err {
            ResolveError::PathNotFound { path, origin } => {
                assert_eq!(path, dir.path().join("gone.py"));
                assert_eq!(origin.index, Some(0));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlink_loops_terminate() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("pkg/a.py"));
        std::os::unix::fs::symlink(dir.path(), dir.path().join("pkg/loop")).unwrap();

        let entries = collect_freeze(dir.path(), None, FreezeKind::Auto, None, &origin()).unwrap();
        assert_eq!(dests(&entries), vec!["pkg/a.py"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_followed() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        touch(&outside.path().join("lib.py"));
        std::os::unix::fs::symlink(outside.path(), dir.path().join("linked")).unwrap();

        let entries = collect_freeze(dir.path(), None, FreezeKind::Auto, None, &origin()).unwrap();
        assert_eq!(dests(&entries), vec!["linked/lib.py"]);
        assert_eq!(entries[0].source_path, dir.path().join("linked/lib.py"));
    }
}

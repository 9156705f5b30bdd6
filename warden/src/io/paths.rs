//! Path confinement for file tools.
//!
//! A user-supplied relative path is joined to a root and resolved component by
//! component, following symlinks the way the OS would. Confinement is checked
//! on the resolved result, never on the text, so a link inside the root that
//! points outside it is rejected. Components that do not exist yet (write
//! targets) are appended lexically below their deepest existing ancestor.

use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("absolute paths are not allowed")]
    Absolute,
    #[error("path escapes allowed base")]
    Escapes,
    #[error("path is outside allowed roots")]
    OutsideRoots,
    #[error("cannot resolve {path}: {source}")]
    Unresolvable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Resolve `user_path` below `root`.
///
/// Returns an absolute, symlink-resolved path that lies inside the
/// canonicalized root.
pub fn resolve(root: &Path, user_path: &str) -> Result<PathBuf, PathError> {
    let relative = Path::new(user_path);
    if relative.is_absolute() || relative.has_root() {
        return Err(PathError::Absolute);
    }

    let base = canonicalize(root)?;
    let mut current = base.clone();
    let mut exists = true;

    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                current.pop();
                exists = current.symlink_metadata().is_ok();
            }
            Component::Normal(part) => {
                current.push(part);
                if exists {
                    match current.symlink_metadata() {
                        Ok(_) => current = canonicalize(&current)?,
                        Err(err) if err.kind() == io::ErrorKind::NotFound => exists = false,
                        Err(source) => {
                            return Err(PathError::Unresolvable {
                                path: current,
                                source,
                            });
                        }
                    }
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(PathError::Absolute),
        }
    }

    if !current.starts_with(&base) {
        debug!(root = %base.display(), resolved = %current.display(), "path escapes root");
        return Err(PathError::Escapes);
    }
    Ok(current)
}

/// Resolve `user_path` against each root in order; the first confined
/// result wins.
pub fn resolve_in_roots(roots: &[PathBuf], user_path: &str) -> Result<PathBuf, PathError> {
    if Path::new(user_path).is_absolute() {
        return Err(PathError::Absolute);
    }
    for root in roots {
        match resolve(root, user_path) {
            Ok(resolved) => return Ok(resolved),
            Err(err) => debug!(root = %root.display(), err = %err, "root rejected path"),
        }
    }
    Err(PathError::OutsideRoots)
}

fn canonicalize(path: &Path) -> Result<PathBuf, PathError> {
    path.canonicalize()
        .map_err(|source| PathError::Unresolvable {
            path: path.to_path_buf(),
            source,
        })
}

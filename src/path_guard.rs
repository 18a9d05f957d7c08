//! Path validation and confinement.
//!
//! Every externally supplied path enters the system through this module.
//! `confine` is the sole defense against directory traversal via relative
//! paths or malicious filenames; downstream components must not accept raw
//! path input themselves.

use std::fs;
use std::path::{Component, Path, PathBuf};

/// Errors raised while validating paths.
#[derive(Debug)]
pub enum GuardError {
    /// The input is empty or cannot be resolved to an absolute path.
    InvalidPath { path: PathBuf, reason: String },
    /// The resolved path is not nested under the declared root.
    PathEscape { path: PathBuf, root: PathBuf },
    /// The path exists but lacks the required access.
    PermissionDenied { path: PathBuf, access: Access },
}

/// Access kind checked by `ensure_readable` / `ensure_writable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::Read => write!(f, "read"),
            Access::Write => write!(f, "write"),
        }
    }
}

impl std::fmt::Display for GuardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPath { path, reason } => {
                write!(f, "Invalid path {}: {}", path.display(), reason)
            }
            Self::PathEscape { path, root } => {
                write!(
                    f,
                    "Path {} escapes root {}",
                    path.display(),
                    root.display()
                )
            }
            Self::PermissionDenied { path, access } => {
                write!(
                    f,
                    "Permission denied: {} access required for {}",
                    access,
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for GuardError {}

pub type GuardResult<T> = Result<T, GuardError>;

/// A normalized, absolute path. Never contains `.` or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilePath(PathBuf);

impl FilePath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for FilePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl std::fmt::Display for FilePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Stateless path validation entry point.
pub struct PathGuard;

impl PathGuard {
    /// Resolves `.`/`..`/symlinked segments and returns an absolute form.
    ///
    /// Paths that exist are canonicalized through the filesystem. Paths that
    /// do not exist yet (e.g. a destination about to be created) are resolved
    /// lexically against their deepest existing ancestor, so `..` segments
    /// still cannot survive normalization.
    pub fn normalize(path: &Path) -> GuardResult<FilePath> {
        if path.as_os_str().is_empty() {
            return Err(GuardError::InvalidPath {
                path: path.to_path_buf(),
                reason: "path is empty".to_string(),
            });
        }

        match fs::canonicalize(path) {
            Ok(resolved) => Ok(FilePath(resolved)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::normalize_nonexistent(path)
            }
            Err(e) => Err(GuardError::InvalidPath {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    /// Normalizes `path` and verifies the result is equal to or nested under
    /// the normalized form of `root`.
    pub fn confine(path: &Path, root: &Path) -> GuardResult<FilePath> {
        let resolved = Self::normalize(path)?;
        let resolved_root = Self::normalize(root)?;
        if resolved.as_path().starts_with(resolved_root.as_path()) {
            Ok(resolved)
        } else {
            Err(GuardError::PathEscape {
                path: resolved.into_path_buf(),
                root: resolved_root.into_path_buf(),
            })
        }
    }

    /// Fails unless `path` exists and is readable by the current process.
    pub fn ensure_readable(path: &Path) -> GuardResult<()> {
        match fs::metadata(path) {
            Ok(_) => {
                // Opening the directory listing (or the file) is the portable
                // readability check; permission bits alone lie under ACLs.
                let probe = if path.is_dir() {
                    fs::read_dir(path).map(|_| ())
                } else {
                    fs::File::open(path).map(|_| ())
                };
                probe.map_err(|_| GuardError::PermissionDenied {
                    path: path.to_path_buf(),
                    access: Access::Read,
                })
            }
            Err(e) => Err(GuardError::InvalidPath {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    /// Fails unless `path` (or, for a not-yet-created path, its deepest
    /// existing ancestor) is writable.
    pub fn ensure_writable(path: &Path) -> GuardResult<()> {
        let target = Self::deepest_existing(path);
        let meta = fs::metadata(&target).map_err(|e| GuardError::InvalidPath {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if meta.permissions().readonly() {
            return Err(GuardError::PermissionDenied {
                path: path.to_path_buf(),
                access: Access::Write,
            });
        }
        Ok(())
    }

    /// Lexical resolution for paths whose tail does not exist on disk.
    fn normalize_nonexistent(path: &Path) -> GuardResult<FilePath> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| GuardError::InvalidPath {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
                .join(path)
        };

        let mut normalized = PathBuf::new();
        for component in absolute.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(GuardError::InvalidPath {
                            path: path.to_path_buf(),
                            reason: "path climbs above the filesystem root".to_string(),
                        });
                    }
                }
                other => normalized.push(other.as_os_str()),
            }
        }

        // Re-anchor on the canonical form of the deepest existing ancestor so
        // symlinked prefixes resolve the same way canonicalize would.
        let existing = Self::deepest_existing(&normalized);
        if existing != normalized {
            if let Ok(canonical_prefix) = fs::canonicalize(&existing) {
                if let Ok(tail) = normalized.strip_prefix(&existing) {
                    return Ok(FilePath(canonical_prefix.join(tail)));
                }
            }
        }
        Ok(FilePath(normalized))
    }

    /// Walks up from `path` to the closest ancestor that exists.
    fn deepest_existing(path: &Path) -> PathBuf {
        let mut current = path.to_path_buf();
        while !current.exists() {
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }
        current
    }
}

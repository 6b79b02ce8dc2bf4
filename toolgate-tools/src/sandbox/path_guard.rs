use crate::error::SandboxViolation;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Confines path arguments to a set of allowed directory trees.
///
/// Targets are resolved to absolute, symlink-free paths before the
/// containment check, so `..` segments and links cannot escape a root.
#[derive(Debug, Clone)]
pub struct PathGuard {
    roots: Vec<PathBuf>,
}

impl PathGuard {
    pub fn new<S: AsRef<str>>(allowed: &[S]) -> Self {
        let roots = allowed
            .iter()
            .filter_map(|dir| {
                let expanded = expand_home(dir.as_ref());
                match resolve_lenient(&expanded) {
                    Some(root) => Some(root),
                    None => {
                        tracing::warn!("Ignoring unresolvable allowed directory: {}", dir.as_ref());
                        None
                    }
                }
            })
            .collect();
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn validate(&self, raw: &str) -> Result<PathBuf, SandboxViolation> {
        if raw.contains('\0') {
            return Err(SandboxViolation::path("path contains a NUL byte"));
        }

        // No roots means nothing is reachable.
        let Some(base) = self.roots.first() else {
            return Err(SandboxViolation::path(format!(
                "{} rejected: no allowed directories configured",
                raw
            )));
        };

        let expanded = expand_home(raw);
        let candidate = if expanded.is_absolute() {
            expanded
        } else {
            base.join(expanded)
        };

        let resolved = resolve_lenient(&candidate).ok_or_else(|| {
            SandboxViolation::path(format!("{} could not be resolved", raw))
        })?;

        if self.roots.iter().any(|root| resolved.starts_with(root)) {
            Ok(resolved)
        } else {
            Err(SandboxViolation::path(format!(
                "{} is outside the allowed directories",
                raw
            )))
        }
    }
}

fn expand_home(raw: &str) -> PathBuf {
    let rest = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(raw),
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => PathBuf::from(raw),
    }
}

/// Same limit as Linux `MAXSYMLINKS`.
const MAX_LINK_HOPS: usize = 40;

/// Canonicalize the deepest existing ancestor and re-append the rest.
///
/// Dangling symlinks are followed by hand, since `canonicalize` gives up on
/// them. Returns `None` when the missing tail contains `..`, since it cannot
/// be resolved without the filesystem, or when links loop.
fn resolve_lenient(path: &Path) -> Option<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<OsString> = Vec::new();
    let mut hops = 0;

    let canonical = loop {
        match fs::canonicalize(&existing) {
            Ok(canonical) => break canonical,
            Err(_) if is_symlink(&existing) => {
                hops += 1;
                if hops > MAX_LINK_HOPS {
                    tracing::warn!("Too many symlink hops resolving {}", path.display());
                    return None;
                }
                let target = fs::read_link(&existing).ok()?;
                existing = match existing.parent() {
                    Some(parent) => parent.join(target),
                    None => target,
                };
            }
            Err(_) => {
                let name = existing.file_name()?.to_os_string();
                let parent = existing.parent()?.to_path_buf();
                tail.push(name);
                existing = parent;
            }
        }
    };

    Some(tail.into_iter().rev().fold(canonical, |acc, part| acc.join(part)))
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_symlink())
}

//! Same-file output: save to a sibling temp file, then rename over the original

use crate::error::{RulesError, RulesResult};
use crate::workbook::WorkbookFormat;
use std::path::{Component, Path, PathBuf};
use tempfile::Builder;
use tracing::debug;

/// True when both paths name the same file.
///
/// Compares the lexically normalized paths case-insensitively, then falls
/// back to canonical paths for files that exist (symlinks, `..` through links).
pub fn same_file(a: &Path, b: &Path) -> bool {
    let (na, nb) = (normalize(a), normalize(b));
    if na.to_string_lossy().to_lowercase() == nb.to_string_lossy().to_lowercase() {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}

/// Resolve `.` and `..` without touching the filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if out.file_name().is_some() {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Write `target` through a temporary sibling carrying the format's extension.
///
/// `save` receives the temporary path. Only after it succeeds is the temp
/// file renamed over `target`; on failure the temp file is removed and
/// `target` is left untouched.
pub fn replace_atomically<F>(target: &Path, format: WorkbookFormat, save: F) -> RulesResult<()>
where
    F: FnOnce(&Path) -> RulesResult<()>,
{
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let temp = Builder::new()
        .prefix(".xlrules-")
        .suffix(format.extension())
        .tempfile_in(dir)
        .map_err(|e| RulesError::Save {
            path: target.to_path_buf(),
            reason: format!("cannot create temporary file: {e}"),
        })?;

    debug!(temp = %temp.path().display(), target = %target.display(), "saving through temp file");

    // Dropping `temp` on the error path deletes it
    save(temp.path())?;

    temp.persist(target).map_err(|e| RulesError::Save {
        path: target.to_path_buf(),
        reason: format!("cannot replace original: {}", e.error),
    })?;
    Ok(())
}

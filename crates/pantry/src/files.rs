use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// All files under a cookbook directory, relative to it, sorted.
///
/// Symlinks are followed; a dangling link is an error rather than a silently
/// missing file. Entries whose name starts with `.` are skipped, directories
/// included (`.git`, `.kitchen`, editor swap files).
pub(crate) fn cookbook_files(root: &Path) -> Result<Vec<PathBuf>> {
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

    let mut out = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to read directory {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", entry.path().display(), root.display()))?;
        out.push(rel.to_path_buf());
    }
    Ok(out)
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

/// Render a relative path with `/` separators regardless of platform.
pub(crate) fn slash_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

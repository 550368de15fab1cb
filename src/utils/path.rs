//! Path utilities for project-relative paths

use std::path::{Component, Path, PathBuf};

/// Normalize a path for consistent representation.
///
/// Converts to forward slashes and resolves `.` and `..` components
/// lexically, without touching the file system.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    normalized
}

/// Project-relative, forward-slash path of `path` under `root`.
///
/// Returns `None` if `path` is not inside `root`.
pub fn relative_to<P: AsRef<Path>, R: AsRef<Path>>(path: P, root: R) -> Option<String> {
    let path = normalize_path(path);
    let root = normalize_path(root);
    let relative = path.strip_prefix(&root).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(to_slash(relative))
}

/// Render a path with forward slashes
pub fn to_slash<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve a possibly project-relative path against the project root
pub fn resolve_in_root<P: AsRef<Path>, R: AsRef<Path>>(path: P, root: R) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(root.as_ref().join(path))
    }
}

/// Get file name as a string
pub fn file_name<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Get file extension (without the dot), or an empty string
pub fn extension<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Get file stem (filename without extension)
pub fn file_stem<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Parent directory of a forward-slash relative path ("" for top-level files)
pub fn parent_dir(relative: &str) -> &str {
    relative.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

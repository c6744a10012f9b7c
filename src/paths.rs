//! Path normalization helpers

use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path (no filesystem access).
///
/// Removes `.` segments and resolves `..` against preceding normal segments.
/// Leading `..` segments of a relative path are preserved; `..` above the
/// root of an absolute path is dropped.
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    let mut has_root = false;

    for c in path.components() {
        match c {
            Component::Prefix(p) => {
                out.clear();
                out.push(p.as_os_str());
                has_root = true;
            }
            Component::RootDir => {
                out.push(Component::RootDir.as_os_str());
                has_root = true;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = out
                    .components()
                    .next_back()
                    .is_some_and(|last| matches!(last, Component::Normal(_)));
                if popped {
                    out.pop();
                } else if !has_root {
                    out.push("..");
                }
            }
            Component::Normal(seg) => out.push(seg),
        }
    }

    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Normalize a path before any file is created at it.
///
/// Relative paths are resolved against the current directory and the result
/// is cleaned. On Windows the `\\?\` prefix is added so paths longer than
/// `MAX_PATH` stay usable.
pub fn normalize(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(long_path(clean(&absolute)))
}

#[cfg(windows)]
fn long_path(path: PathBuf) -> PathBuf {
    let s = path.to_string_lossy();
    if s.starts_with(r"\\?\") {
        return path;
    }
    if let Some(unc) = s.strip_prefix(r"\\") {
        return PathBuf::from(format!(r"\\?\UNC\{}", unc));
    }
    PathBuf::from(format!(r"\\?\{}", s))
}

#[cfg(not(windows))]
fn long_path(path: PathBuf) -> PathBuf {
    path
}

/// Returns true if `candidate` stays lexically inside `root` after cleaning.
pub fn within(root: &Path, candidate: &Path) -> bool {
    clean(candidate).starts_with(clean(root))
}

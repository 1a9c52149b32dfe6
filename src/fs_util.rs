use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::EncodeError;

pub const TEMP_PREFIX: &str = ".encode-cat";

/// Writes `content` to a temp file beside `path` and renames it into place.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), EncodeError> {
    let parent = path
        .parent()
        .ok_or_else(|| EncodeError::Filesystem(format!("invalid path {}", path.display())))?;
    fs::create_dir_all(parent).map_err(|err| EncodeError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|err| EncodeError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| EncodeError::Filesystem(err.to_string()))?;
    temp.flush()
        .map_err(|err| EncodeError::Filesystem(err.to_string()))?;
    temp.persist(path)
        .map_err(|err| EncodeError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Regular files under `root`, depth first. A missing root yields nothing.
pub fn walk_files(root: &Path) -> Result<Vec<PathBuf>, EncodeError> {
    let mut items = Vec::new();
    if !root.exists() {
        return Ok(items);
    }
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| EncodeError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| EncodeError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() {
                items.push(path);
            }
        }
    }
    Ok(items)
}

/// Reduces a remote filename to a bare, non-hidden basename.
pub fn sanitize_filename(name: &str) -> Option<&str> {
    let base = name.rsplit(['/', '\\']).next()?;
    if base.is_empty() || base.starts_with('.') {
        return None;
    }
    Some(base)
}

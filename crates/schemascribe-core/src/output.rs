use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, ScribeError};

/// Write `bytes` to `path` atomically.
///
/// Writes to a temporary file in the same directory, syncs it, then renames
/// it into place. `rename` is atomic on POSIX and Windows, so a crash or
/// Ctrl+C mid-write leaves the previous file intact. Missing parent
/// directories are created.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| ScribeError::Output {
        message: format!("Failed to create directory {}", dir.display()),
        source: e,
    })?;

    let tmp_path = temp_path_for(path, &dir);

    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp_path).map_err(|e| ScribeError::Output {
            message: format!("Failed to create temp file at {}", tmp_path.display()),
            source: e,
        })?;
        file.write_all(bytes).map_err(|e| ScribeError::Output {
            message: format!("Failed to write temp file at {}", tmp_path.display()),
            source: e,
        })?;
        file.sync_all().map_err(|e| ScribeError::Output {
            message: format!("Failed to sync {} to disk", tmp_path.display()),
            source: e,
        })?;

        fs::rename(&tmp_path, path).map_err(|e| ScribeError::Output {
            message: format!(
                "Failed to rename {} -> {}",
                tmp_path.display(),
                path.display()
            ),
            source: e,
        })
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn temp_path_for(path: &Path, dir: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    dir.join(format!(".{}.{}.tmp", name, std::process::id()))
}

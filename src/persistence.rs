//! Shared atomic-JSON-file persistence helper used by the sample store and
//! the rollback store: a fallible save/load pair where a missing file is
//! treated as empty state rather than an error.

use crate::error::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Reject paths containing `..` components; everything else is accepted
/// as-is (absolute or relative to the process's working directory).
fn sanitize(path: &Path) -> Result<PathBuf> {
    if path.components().any(|c| c == std::path::Component::ParentDir) {
        return Err(Error::Config(format!(
            "path must not contain '..' components: {}",
            path.display()
        )));
    }
    Ok(path.to_path_buf())
}

/// Atomically write `value` as JSON to `path`: serialize to `path.tmp`,
/// flush, set `0600` permissions, then rename over `path`. The parent
/// directory is created (`0750`) if absent.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let path = sanitize(path)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
            #[cfg(unix)]
            std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o750))?;
        }
    }

    let tmp_path = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        let bytes = serde_json::to_vec_pretty(value)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }

    #[cfg(unix)]
    std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;

    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Load JSON from `path`. A missing file is not an error: returns `T`'s
/// `Default`.
pub fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let path = sanitize(path)?;

    match std::fs::read(&path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(Error::Io(e)),
    }
}

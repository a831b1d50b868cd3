//! Owner-only file helpers shared by the durable stores

use crate::error::{ErrorCategory, ErrorKind, KisError, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Replace the file at `path` with `contents`, readable by the owner only.
///
/// The data goes to a temporary file in the same directory which is
/// flushed, fsynced and then renamed over `path`. Either the old file or
/// the new file exists afterwards, never a partial one.
pub fn write_file_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        persistence_error(format!("failed to create tempfile in {}", dir.display()), e)
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| persistence_error("failed to set tempfile permissions", e))?;
    }

    temp_file
        .write_all(contents)
        .map_err(|e| persistence_error("failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| persistence_error("failed to flush tempfile", e))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| persistence_error("failed to sync file prior to rename", e))?;

    temp_file.persist(path).map_err(|e| {
        persistence_error(
            format!("failed to rename to target file {}", path.display()),
            e.error,
        )
    })?;
    Ok(())
}

/// Remove `path`; a file that is already gone counts as removed.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(persistence_error(
            format!("failed to remove {}", path.display()),
            e,
        )),
    }
}

/// Create `dir` (and parents) restricted to the owner.
///
/// An existing directory is used as-is; its permissions are left alone.
pub fn create_private_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        #[cfg(unix)]
        warn_if_shared(dir);
        return Ok(());
    }

    fs::create_dir_all(dir)
        .map_err(|e| persistence_error(format!("failed to create {}", dir.display()), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let private = fs::Permissions::from_mode(0o700);
        fs::set_permissions(dir, private)
            .map_err(|e| persistence_error(format!("failed to restrict {}", dir.display()), e))?;
    }

    Ok(())
}

#[cfg(unix)]
fn warn_if_shared(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    use tracing::warn;

    if let Ok(metadata) = fs::metadata(dir) {
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            warn!(
                dir = %dir.display(),
                mode = %format!("{:o}", mode & 0o777),
                "vault directory is accessible by other users"
            );
        }
    }
}

fn persistence_error(msg: impl Into<String>, err: io::Error) -> KisError {
    KisError::with_kind_and_source(
        ErrorCategory::Internal,
        ErrorKind::PersistenceFailed,
        msg,
        err,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_write_replaces_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("file.json");

        write_file_atomic(&path, b"first").unwrap();
        write_file_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    #[cfg(unix)]
    fn test_write_narrows_existing_permissions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("file.json");
        fs::write(&path, b"old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        write_file_atomic(&path, b"new").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_write_into_missing_dir_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nope").join("file.json");

        let err = write_file_atomic(&path, b"x").expect_err("expected failure");
        assert_eq!(err.kind, Some(ErrorKind::PersistenceFailed));
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_missing_file_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        remove_file_if_exists(&temp_dir.path().join("absent")).unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn test_private_dir() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("a").join("b");

        create_private_dir(&dir).unwrap();
        create_private_dir(&dir).unwrap();

        let mode = fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    #[cfg(unix)]
    fn test_existing_dir_permissions_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("shared");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        create_private_dir(&dir).unwrap();

        let mode = fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}

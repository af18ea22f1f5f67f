use crate::error::{FilesystemError, FsOperation};
use log::debug;
use std::fs::{create_dir_all, read};
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

pub fn ensure_dir(path: &Path) -> Result<(), FilesystemError> {
    if path.is_dir() {
        return Ok(());
    }

    create_dir_all(path).map_err(|err| FilesystemError::new(FsOperation::CreateDir, path, err))?;
    debug!("Created directory {}", path.display());
    Ok(())
}

/// Writes through a temporary file in the destination directory and moves it
/// over `path`, so readers see either the old content or the new one.
/// A file that already holds `contents` is left alone.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<WriteOutcome, FilesystemError> {
    if let Ok(existing) = read(path) {
        if existing == contents {
            debug!("{} is up to date", path.display());
            return Ok(WriteOutcome::Unchanged);
        }
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)
        .map_err(|err| FilesystemError::new(FsOperation::Write, dir, err))?;

    carry_permissions(&temp, path)
        .map_err(|err| FilesystemError::new(FsOperation::SetPermissions, temp.path(), err))?;

    temp.write_all(contents)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|err| FilesystemError::new(FsOperation::Write, temp.path(), err))?;

    temp.persist(path)
        .map_err(|err| FilesystemError::new(FsOperation::Persist, path, err.error))?;

    debug!("Wrote {}", path.display());
    Ok(WriteOutcome::Written)
}

/// Temp files are created 0600. The replacement takes the mode of the file it
/// replaces, or 0644 for a new file.
#[cfg(unix)]
fn carry_permissions(temp: &NamedTempFile, path: &Path) -> io::Result<()> {
    use std::fs::{metadata, Permissions};
    use std::os::unix::fs::PermissionsExt;

    let permissions = match metadata(path) {
        Ok(existing) => existing.permissions(),
        Err(_) => Permissions::from_mode(0o644),
    };
    temp.as_file().set_permissions(permissions)
}

#[cfg(not(unix))]
fn carry_permissions(_temp: &NamedTempFile, _path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<(), FilesystemError> {
    use std::fs::{metadata, set_permissions};
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = metadata(path)
        .map_err(|err| FilesystemError::new(FsOperation::SetPermissions, path, err))?
        .permissions();

    if permissions.mode() & 0o111 == 0o111 {
        return Ok(());
    }

    permissions.set_mode(permissions.mode() | 0o755);
    set_permissions(path, permissions).map_err(|err| FilesystemError::new(FsOperation::SetPermissions, path, err))
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> Result<(), FilesystemError> {
    Ok(())
}

use crate::error::{FilesystemError, FsOperation, InstallationError};
use log::info;
use std::fs::{create_dir, read_dir};
use std::path::{absolute, Path, PathBuf};

pub const SERVER_BINARY_STEM: &str = "arma3server_x64";
pub const PROFILES_DIR: &str = "ServerProfiles";
/// Steam app id of the game client; workshop items live under it.
pub const CLIENT_APP_ID: &str = "107410";

/// An installed game client, laid out the way Steam installs it:
/// `<library>/steamapps/common/Arma 3` with workshop content in
/// `<library>/steamapps/workshop/content/107410/<id>`.
#[derive(Debug, Clone)]
pub struct Installation {
    pub root: PathBuf,
    pub server_binary: PathBuf,
    pub profiles_dir: PathBuf,
    pub workshop_dir: PathBuf,
}

impl Installation {
    pub fn open<P: AsRef<Path>>(root: P, workshop_override: Option<&Path>) -> Result<Self, InstallationError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(InstallationError::NotExist(root.to_path_buf()));
        }

        let root = absolute(root).map_err(|err| FilesystemError::new(FsOperation::Read, root, err))?;
        let server_binary = find_server_binary(&root)?;

        let workshop_dir = match workshop_override {
            Some(dir) => absolute(dir).map_err(|err| FilesystemError::new(FsOperation::Read, dir, err))?,
            None => default_workshop_dir(&root)
                .ok_or_else(|| InstallationError::NoWorkshopLocation(root.clone()))?,
        };

        Ok(Installation {
            profiles_dir: root.join(PROFILES_DIR),
            root,
            server_binary,
            workshop_dir,
        })
    }

    pub fn has_profiles_dir(&self) -> bool {
        self.profiles_dir.is_dir()
    }

    pub fn has_workshop_dir(&self) -> bool {
        self.workshop_dir.is_dir()
    }

    pub fn ensure_profiles_dir(&self) -> Result<(), FilesystemError> {
        if self.has_profiles_dir() {
            return Ok(());
        }

        create_dir(&self.profiles_dir)
            .map_err(|err| FilesystemError::new(FsOperation::CreateDir, &self.profiles_dir, err))?;
        info!("Created {}", self.profiles_dir.display());
        Ok(())
    }

    pub fn profile_dir(&self, profile_name: &str) -> PathBuf {
        self.profiles_dir.join(profile_name)
    }

    /// The workshop directory named after `workshop_id`, if the client has it.
    pub fn locate_mod(&self, workshop_id: &str) -> Option<PathBuf> {
        let path = self.workshop_dir.join(workshop_id);
        if path.is_dir() { Some(path) } else { None }
    }

    pub fn server_binary_name(&self) -> String {
        self.server_binary.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| SERVER_BINARY_STEM.to_string())
    }
}

/// Linux servers ship without an extension, Windows ones as `.exe`.
fn find_server_binary(root: &Path) -> Result<PathBuf, InstallationError> {
    let entries = read_dir(root).map_err(|err| FilesystemError::new(FsOperation::Read, root, err))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| FilesystemError::new(FsOperation::Read, root, err))?.path();
        let is_server = path.file_name()
            .map(|name| name.to_string_lossy().starts_with(SERVER_BINARY_STEM))
            .unwrap_or(false);

        if is_server && path.is_file() {
            candidates.push(path);
        }
    }

    candidates.sort();
    candidates.into_iter().next()
        .ok_or_else(|| InstallationError::ServerBinaryNotFound(root.to_path_buf()))
}

fn default_workshop_dir(root: &Path) -> Option<PathBuf> {
    root.ancestors().nth(2)
        .map(|steamapps| steamapps.join("workshop").join("content").join(CLIENT_APP_ID))
}

use crate::preset::ModDescriptor;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a document into a usable preset.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to read preset '{path}'")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse preset HTML: {0}")]
    Html(String),

    #[error("the document contains no mod entries, is it a launcher preset export?")]
    NoEntries,

    #[error("none of the {skipped} mod entries carry a valid workshop id")]
    NoValidEntries { skipped: usize },
}

/// Every mod that could not be located under the installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedModError {
    pub mods: Vec<ModDescriptor>,
}

impl Display for UnresolvedModError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} mod(s) could not be found locally: ", self.mods.len())?;
        let names: Vec<String> = self.mods.iter()
            .map(|m| format!("{} ({})", m.name, m.workshop_id))
            .collect();
        f.write_str(&names.join(", "))
    }
}

impl std::error::Error for UnresolvedModError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOperation {
    CreateDir,
    Copy,
    Write,
    Read,
    Persist,
    SetPermissions,
}

impl Display for FsOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FsOperation::CreateDir => "create directory",
            FsOperation::Copy => "copy",
            FsOperation::Write => "write",
            FsOperation::Read => "read",
            FsOperation::Persist => "move into place",
            FsOperation::SetPermissions => "set permissions on",
        })
    }
}

#[derive(Error, Debug)]
#[error("failed to {operation} '{path}'")]
pub struct FilesystemError {
    pub path: PathBuf,
    pub operation: FsOperation,
    #[source]
    pub source: io::Error,
}

impl FilesystemError {
    pub fn new(operation: FsOperation, path: impl Into<PathBuf>, source: io::Error) -> Self {
        FilesystemError { path: path.into(), operation, source }
    }
}

#[derive(Error, Debug)]
pub enum InstallationError {
    #[error("the installation directory '{0}' doesn't exist")]
    NotExist(PathBuf),

    #[error("could not find the 64 bit server binary in '{0}'")]
    ServerBinaryNotFound(PathBuf),

    #[error("could not derive the workshop content location from '{0}'")]
    NoWorkshopLocation(PathBuf),

    #[error("failed to inspect the installation")]
    Io(#[from] FilesystemError),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Unresolved(#[from] UnresolvedModError),

    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    #[error(transparent)]
    Installation(#[from] InstallationError),

    #[error("failed to serialize the profile manifest")]
    Manifest(#[from] toml::ser::Error),

    #[error("invalid profile name \"{0}\"")]
    InvalidProfileName(String),

    #[error("invalid server port {0}")]
    InvalidPort(u16),

    #[error("{0}")]
    Aborted(String),
}

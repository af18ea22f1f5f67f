use crate::error::Error;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 2302;

/// What to do when the profile directory already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingProfileAction {
    /// Don't touch the files.
    #[default]
    Keep,
    /// Rewrite the mod parameter only.
    RegenerateParams,
    /// Rewrite everything, discarding manual edits to the profile's configs.
    RegenerateAll,
}

/// Everything a run needs, gathered before any work starts.
#[derive(Debug, Clone)]
pub struct SetupConfig {
    pub install_root: PathBuf,
    pub preset_path: PathBuf,
    pub profile_name: String,
    pub workshop_dir: Option<PathBuf>,
    pub existing_profile: ExistingProfileAction,
    pub port: u16,
}

impl SetupConfig {
    pub fn new(install_root: PathBuf, preset_path: PathBuf, profile_name: String) -> Self {
        SetupConfig {
            install_root,
            preset_path,
            profile_name,
            workshop_dir: None,
            existing_profile: ExistingProfileAction::default(),
            port: DEFAULT_PORT,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !is_valid_profile_name(&self.profile_name) {
            return Err(Error::InvalidProfileName(self.profile_name.clone()));
        }
        if self.port == 0 {
            return Err(Error::InvalidPort(self.port));
        }

        Ok(())
    }
}

/// A profile name becomes a single directory under `ServerProfiles`.
pub fn is_valid_profile_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', ':'])
}

/// Reads a port typed by the user; an empty answer means the default.
pub fn parse_port(input: &str) -> Option<u16> {
    let input = input.trim();
    if input.is_empty() {
        return Some(DEFAULT_PORT);
    }

    input.parse().ok().filter(|port| *port != 0)
}

/// Profile name suggested for a preset: its file stem.
pub fn default_profile_name(preset_path: &std::path::Path) -> Option<String> {
    preset_path.file_stem()
        .map(|stem| stem.to_string_lossy().trim().to_string())
        .filter(|stem| is_valid_profile_name(stem))
}

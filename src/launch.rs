use crate::error::{Error, FilesystemError, FsOperation, UnresolvedModError};
use crate::install::Installation;
use crate::preset::{ModDescriptor, ModPreset};
use crate::templates::{base_config_path, BaseConfig};
use crate::utils::{ensure_dir, make_executable, write_atomic, WriteOutcome};
use log::{debug, info};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::read;
use std::path::{Path, PathBuf};

pub const PARAMS_FILE: &str = "params.txt";
pub const MANIFEST_FILE: &str = "preset.toml";
/// Passed to the server as `-profiles`, it keeps logs and `.Arma3Profile` files.
pub const STATE_DIR: &str = "Profiles";
pub const MOD_SEPARATOR: char = ';';

#[cfg(windows)]
pub const START_SCRIPT: &str = "start.bat";
#[cfg(not(windows))]
pub const START_SCRIPT: &str = "start.sh";

/// Drops later duplicates of a workshop id, keeping first-occurrence order.
pub fn dedupe(preset: &ModPreset) -> Vec<ModDescriptor> {
    let mut seen = HashSet::new();
    preset.mods.iter()
        .filter(|descriptor| seen.insert(descriptor.workshop_id.as_str()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Distinct mods with `local_path` set, in preset order.
    pub resolved: Vec<ModDescriptor>,
    pub unresolved: Vec<ModDescriptor>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    pub fn unresolved_error(&self) -> Option<UnresolvedModError> {
        if self.is_complete() {
            None
        } else {
            Some(UnresolvedModError { mods: self.unresolved.clone() })
        }
    }

    pub fn mod_argument(&self) -> String {
        let paths: Vec<String> = self.resolved.iter()
            .filter_map(|descriptor| descriptor.local_path.as_ref())
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        paths.join(&MOD_SEPARATOR.to_string())
    }
}

pub fn resolve_mods(preset: &ModPreset, installation: &Installation) -> Resolution {
    let mut resolution = Resolution::default();

    for descriptor in dedupe(preset) {
        match installation.locate_mod(&descriptor.workshop_id) {
            Some(path) => {
                debug!("{} ({}) -> {}", descriptor.name, descriptor.workshop_id, path.display());
                resolution.resolved.push(descriptor.with_local_path(path));
            }
            None => {
                debug!("{} ({}) is not in {}", descriptor.name, descriptor.workshop_id, installation.workshop_dir.display());
                resolution.unresolved.push(descriptor);
            }
        }
    }

    resolution
}

/// The parameter file handed to the server with `-par`; a mod list this long
/// does not fit on a command line.
pub fn render_params(mod_argument: &str) -> String {
    format!("-servermod=\"\"\n-mod=\"{}\"", mod_argument)
}

pub fn launch_command(installation: &Installation, profile_dir: &Path, port: u16) -> String {
    format!(
        "\"{}\" -cfg=\"{}\" -config=\"{}\" -profiles=\"{}\" -port={} -par=\"{}\"",
        installation.server_binary.display(),
        profile_dir.join(BaseConfig::Basic.profile_file_name()).display(),
        profile_dir.join(BaseConfig::Server.profile_file_name()).display(),
        profile_dir.join(STATE_DIR).display(),
        port,
        profile_dir.join(PARAMS_FILE).display(),
    )
}

fn start_script(binary: &str, port: u16) -> String {
    if cfg!(windows) {
        format!(
            "start \"\" \"%~dp0..\\..\\{binary}\" -cfg=\"%~dp0basic.cfg\" -config=\"%~dp0server.cfg\" \
             -profiles=\"%~dp0{STATE_DIR}\" -port={port} -par=\"%~dp0{PARAMS_FILE}\"\r\n"
        )
    } else {
        format!(
            "#!/bin/sh\n\
             DIR=\"$(cd \"$(dirname \"$0\")\" && pwd)\"\n\
             cd \"$DIR/../..\" || exit 1\n\
             exec \"./{binary}\" -cfg=\"$DIR/basic.cfg\" -config=\"$DIR/server.cfg\" \
             -profiles=\"$DIR/{STATE_DIR}\" -port={port} -par=\"$DIR/{PARAMS_FILE}\"\n"
        )
    }
}

#[derive(Serialize)]
struct ProfileManifest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    preset: Option<&'a str>,
    mod_argument: &'a str,
    mods: Vec<ManifestMod<'a>>,
}

#[derive(Serialize)]
struct ManifestMod<'a> {
    name: &'a str,
    workshop_id: &'a str,
    path: String,
}

fn render_manifest(preset_name: Option<&str>, resolution: &Resolution, mod_argument: &str) -> Result<String, toml::ser::Error> {
    let mods = resolution.resolved.iter()
        .map(|descriptor| ManifestMod {
            name: &descriptor.name,
            workshop_id: &descriptor.workshop_id,
            path: descriptor.local_path.as_ref()
                .map(|path| path.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })
        .collect();

    toml::to_string(&ProfileManifest { preset: preset_name, mod_argument, mods })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub outcome: WriteOutcome,
}

/// A provisioned profile directory and the mods it loads.
#[derive(Debug, Clone)]
pub struct ServerProfile {
    pub dir: PathBuf,
    pub mods: Vec<ModDescriptor>,
    pub mod_argument: String,
}

pub struct ProfileBuilder<'a> {
    installation: &'a Installation,
    dir: PathBuf,
    port: u16,
}

impl<'a> ProfileBuilder<'a> {
    pub fn new(installation: &'a Installation, profile_name: &str, port: u16) -> Self {
        ProfileBuilder {
            installation,
            dir: installation.profile_dir(profile_name),
            port,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Creates the profile layout. Existing directories are reused; existing
    /// configs and start script are only replaced when `overwrite` is set.
    pub fn scaffold(&self, overwrite: bool) -> Result<Vec<FileChange>, FilesystemError> {
        ensure_dir(&self.dir)?;
        ensure_dir(&self.dir.join(STATE_DIR))?;

        let mut changes = Vec::new();

        for config in BaseConfig::ALL {
            let target = self.dir.join(config.profile_file_name());
            if target.is_file() && !overwrite {
                continue
            }

            let source = base_config_path(&self.installation.profiles_dir, config);
            let contents = read(&source).map_err(|err| FilesystemError::new(FsOperation::Copy, &source, err))?;
            let outcome = write_atomic(&target, &contents)?;
            changes.push(FileChange { path: target, outcome });
        }

        let script = self.dir.join(START_SCRIPT);
        if !script.is_file() || overwrite {
            let contents = start_script(&self.installation.server_binary_name(), self.port);
            let outcome = write_atomic(&script, contents.as_bytes())?;
            make_executable(&script)?;
            changes.push(FileChange { path: script, outcome });
        }

        Ok(changes)
    }

    /// Writes `params.txt` and the manifest. Each file is replaced atomically.
    pub fn write_launch_config(&self, preset_name: Option<&str>, resolution: &Resolution) -> Result<(ServerProfile, Vec<FileChange>), Error> {
        ensure_dir(&self.dir)?;

        let mod_argument = resolution.mod_argument();
        let manifest = render_manifest(preset_name, resolution, &mod_argument)?;

        let params_path = self.dir.join(PARAMS_FILE);
        let params = write_atomic(&params_path, render_params(&mod_argument).as_bytes())?;
        info!("{} {}", describe(params), params_path.display());

        let manifest_path = self.dir.join(MANIFEST_FILE);
        let manifest = write_atomic(&manifest_path, manifest.as_bytes())?;

        let profile = ServerProfile {
            dir: self.dir.clone(),
            mods: resolution.resolved.clone(),
            mod_argument,
        };

        Ok((profile, vec![
            FileChange { path: params_path, outcome: params },
            FileChange { path: manifest_path, outcome: manifest },
        ]))
    }

    pub fn launch_command(&self) -> String {
        launch_command(self.installation, &self.dir, self.port)
    }
}

fn describe(outcome: WriteOutcome) -> &'static str {
    match outcome {
        WriteOutcome::Written => "Wrote",
        WriteOutcome::Unchanged => "Kept unchanged",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::tests::fake_library;
    use crate::templates::{ensure_base_configs, TemplateSource};
    use std::fs::{read_to_string, write};

    fn preset(mods: &[(&str, &str)]) -> ModPreset {
        ModPreset {
            name: Some("Test".to_string()),
            mods: mods.iter()
                .map(|(name, id)| ModDescriptor::new(*name, *id, format!("https://steamcommunity.com/sharedfiles/filedetails/?id={id}")))
                .collect(),
        }
    }

    fn ready_installation(ids: &[&str]) -> (tempfile::TempDir, Installation) {
        let (library, root) = fake_library(ids);
        let installation = Installation::open(&root, None).unwrap();
        installation.ensure_profiles_dir().unwrap();
        ensure_base_configs(&installation.profiles_dir, TemplateSource::Builtin).unwrap();
        (library, installation)
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let deduped = dedupe(&preset(&[("A", "111"), ("B", "222"), ("A again", "111"), ("C", "333")]));
        let ids: Vec<&str> = deduped.iter().map(|m| m.workshop_id.as_str()).collect();

        assert_eq!(ids, vec!["111", "222", "333"]);
        assert_eq!(deduped[0].name, "A");
    }

    #[test]
    fn duplicate_mod_appears_once_in_argument() {
        let (_library, installation) = ready_installation(&["111", "222"]);
        let resolution = resolve_mods(&preset(&[("A", "111"), ("B", "222"), ("A", "111")]), &installation);

        let expected = format!(
            "{};{}",
            installation.workshop_dir.join("111").display(),
            installation.workshop_dir.join("222").display()
        );
        assert!(resolution.is_complete());
        assert_eq!(resolution.mod_argument(), expected);
    }

    #[test]
    fn unresolved_mods_are_collected_and_left_out() {
        let (_library, installation) = ready_installation(&["111"]);
        let resolution = resolve_mods(&preset(&[("C", "333"), ("A", "111"), ("D", "444")]), &installation);

        let error = resolution.unresolved_error().unwrap();
        let missing: Vec<&str> = error.mods.iter().map(|m| m.workshop_id.as_str()).collect();

        assert_eq!(missing, vec!["333", "444"]);
        assert_eq!(resolution.mod_argument(), installation.workshop_dir.join("111").display().to_string());
        assert!(error.to_string().contains("C (333)"));
    }

    #[test]
    fn params_file_format() {
        assert_eq!(render_params("/a;/b"), "-servermod=\"\"\n-mod=\"/a;/b\"");
    }

    #[test]
    fn scaffold_creates_layout() {
        let (_library, installation) = ready_installation(&[]);
        let builder = ProfileBuilder::new(&installation, "ops", 2302);

        assert!(!builder.exists());
        let changes = builder.scaffold(false).unwrap();

        assert!(builder.exists());
        assert!(builder.dir().join(STATE_DIR).is_dir());
        assert!(builder.dir().join("basic.cfg").is_file());
        assert!(builder.dir().join("server.cfg").is_file());
        assert_eq!(changes.len(), 3);

        let script = read_to_string(builder.dir().join(START_SCRIPT)).unwrap();
        assert!(script.contains("arma3server_x64.exe"));
        assert!(script.contains("-port=2302"));
    }

    #[test]
    fn scaffold_keeps_edited_configs_unless_overwriting() {
        let (_library, installation) = ready_installation(&[]);
        let builder = ProfileBuilder::new(&installation, "ops", 2302);
        builder.scaffold(false).unwrap();

        let server_cfg = builder.dir().join("server.cfg");
        write(&server_cfg, "hostname = \"edited\";").unwrap();

        assert!(builder.scaffold(false).unwrap().is_empty());
        assert_eq!(read_to_string(&server_cfg).unwrap(), "hostname = \"edited\";");

        builder.scaffold(true).unwrap();
        assert!(read_to_string(&server_cfg).unwrap().contains("Arma 3 Dedicated Server"));
    }

    #[test]
    fn writing_twice_is_idempotent() {
        let (_library, installation) = ready_installation(&["111", "222"]);
        let resolution = resolve_mods(&preset(&[("A", "111"), ("B", "222")]), &installation);
        let builder = ProfileBuilder::new(&installation, "ops", 2302);

        builder.scaffold(false).unwrap();
        let (first, changes) = builder.write_launch_config(Some("Test"), &resolution).unwrap();
        assert!(changes.iter().all(|change| change.outcome == WriteOutcome::Written));
        let params = read(builder.dir().join(PARAMS_FILE)).unwrap();

        assert!(builder.scaffold(false).unwrap().is_empty());
        let (second, changes) = builder.write_launch_config(Some("Test"), &resolution).unwrap();

        assert_eq!(first.mod_argument, second.mod_argument);
        assert!(changes.iter().all(|change| change.outcome == WriteOutcome::Unchanged));
        assert_eq!(read(builder.dir().join(PARAMS_FILE)).unwrap(), params);
    }

    #[test]
    fn manifest_lists_resolved_mods() {
        let (_library, installation) = ready_installation(&["111"]);
        let resolution = resolve_mods(&preset(&[("A", "111"), ("Gone", "999")]), &installation);
        let builder = ProfileBuilder::new(&installation, "ops", 2302);

        let (profile, _) = builder.write_launch_config(Some("Test"), &resolution).unwrap();
        let manifest = read_to_string(builder.dir().join(MANIFEST_FILE)).unwrap();

        assert_eq!(profile.mods.len(), 1);
        assert!(manifest.contains("preset = \"Test\""));
        assert!(manifest.contains("workshop_id = \"111\""));
        assert!(!manifest.contains("Gone"));
    }

    #[test]
    fn launch_command_points_into_profile() {
        let (_library, installation) = ready_installation(&[]);
        let builder = ProfileBuilder::new(&installation, "ops", 2400);
        let command = builder.launch_command();

        assert!(command.contains("-port=2400"));
        assert!(command.contains(&builder.dir().join(PARAMS_FILE).display().to_string()));
    }
}

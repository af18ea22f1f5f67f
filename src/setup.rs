use crate::config::{ExistingProfileAction, SetupConfig};
use crate::error::{Error, UnresolvedModError};
use crate::install::Installation;
use crate::launch::{resolve_mods, FileChange, ProfileBuilder, ServerProfile};
use crate::preset::{read_preset, EntryWarning};
use crate::templates::{ensure_base_configs, TemplateSource};
use log::info;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ProvisionReport {
    /// The profile existed and was left as it was.
    Untouched { profile_dir: PathBuf },
    Provisioned {
        profile: ServerProfile,
        warnings: Vec<EntryWarning>,
        unresolved: Option<UnresolvedModError>,
        changes: Vec<FileChange>,
        launch_command: String,
    },
}

/// Provisions one profile from one preset.
///
/// `confirm_unresolved` sees the complete list of mods missing locally and
/// decides whether to go on without them; nothing is written if it refuses.
pub fn provision<F>(config: &SetupConfig, confirm_unresolved: F) -> Result<ProvisionReport, Error>
where
    F: FnOnce(&UnresolvedModError) -> bool,
{
    config.validate()?;

    let installation = Installation::open(&config.install_root, config.workshop_dir.as_deref())?;
    let builder = ProfileBuilder::new(&installation, config.profile_name.trim(), config.port);

    let existed = builder.exists();
    if existed && config.existing_profile == ExistingProfileAction::Keep {
        info!("Leaving {} untouched", builder.dir().display());
        return Ok(ProvisionReport::Untouched { profile_dir: builder.dir().to_path_buf() });
    }

    let parsed = read_preset(&config.preset_path)?;
    let resolution = resolve_mods(&parsed.preset, &installation);

    let unresolved = resolution.unresolved_error();
    if let Some(error) = &unresolved {
        if !confirm_unresolved(error) {
            return Err(Error::Unresolved(error.clone()));
        }
    }

    installation.ensure_profiles_dir()?;

    let mut changes = Vec::new();
    let regenerate_params_only = existed && config.existing_profile == ExistingProfileAction::RegenerateParams;
    if !regenerate_params_only {
        ensure_base_configs(&installation.profiles_dir, TemplateSource::Builtin)?;
        let overwrite = config.existing_profile == ExistingProfileAction::RegenerateAll;
        changes.extend(builder.scaffold(overwrite)?);
    }

    let (profile, written) = builder.write_launch_config(parsed.preset.name.as_deref(), &resolution)?;
    changes.extend(written);

    Ok(ProvisionReport::Provisioned {
        profile,
        warnings: parsed.warnings,
        unresolved,
        changes,
        launch_command: builder.launch_command(),
    })
}

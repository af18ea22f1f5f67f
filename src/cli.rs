use crate::config::{default_profile_name, is_valid_profile_name, parse_port, ExistingProfileAction, SetupConfig, DEFAULT_PORT};
use crate::error::{Error, FilesystemError, FsOperation, UnresolvedModError};
use crate::install::Installation;
use crate::launch::{ProfileBuilder, START_SCRIPT, STATE_DIR};
use crate::preset::{discover_presets, select_preset};
use crate::setup::{provision, ProvisionReport};
use crate::templates::{ensure_base_configs, missing_base_configs, TemplateSource};
use crate::utils::WriteOutcome;
use clap::Parser;
use colored::Colorize;
use std::env::current_dir;
use std::io::{stdin, stdout, Write};
use std::path::PathBuf;

/// Sets up a dedicated server profile from an Arma 3 Launcher mod preset,
/// reusing the client's installed workshop content. Run it from the game's
/// installation directory.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {}

fn read_input(msg: &str) -> Result<String, Error> {
    print!("{} ", msg);
    _ = stdout().flush();

    let mut input = String::new();
    match stdin().read_line(&mut input) {
        Ok(0) | Err(_) => Err(Error::Aborted("input closed".to_string())),
        Ok(_) => Ok(input.trim().to_string()),
    }
}

fn choose(msg: String, variants: &[&str], default: &str) -> Result<String, Error> {
    loop {
        let input = read_input(&msg)?.to_ascii_lowercase();
        if input.is_empty() {
            return Ok(default.to_string());
        }
        if variants.contains(&input.as_str()) {
            return Ok(input);
        }
    }
}

fn confirm(msg: &str, default_yes: bool) -> Result<bool, Error> {
    let hint = if default_yes {
        format!("({}/{})", "Y".bold(), "n")
    } else {
        format!("({}/{})", "y", "N".bold())
    };
    let answer = choose(format!("{} {}", msg, hint), &["y", "n"], if default_yes { "y" } else { "n" })?;
    Ok(answer == "y")
}

pub fn cli() -> Result<(), Error> {
    let _args = Args::parse();

    println!("\nWelcome to {} {}", "Dedi Helper".bold(), env!("CARGO_PKG_VERSION").bright_blue());

    let root = current_dir().map_err(|err| FilesystemError::new(FsOperation::Read, ".", err))?;

    println!("\nLooking for the dedicated server...");
    let mut installation = Installation::open(&root, None)?;
    println!("Found {}", installation.server_binary_name().bright_yellow());

    let mut workshop_dir = None;
    if !installation.has_workshop_dir() {
        println!("{} {}", "Could not find the workshop content directory at".bright_red(),
                 installation.workshop_dir.to_string_lossy().bright_yellow());
        let dir = prompt_workshop_dir()?;
        installation = Installation::open(&root, Some(&dir))?;
        workshop_dir = Some(dir);
    }

    println!("\nLooking for the ServerProfiles directory...");
    if !installation.has_profiles_dir() {
        println!("{}", "Could not find the ServerProfiles directory.".bright_red());
        if !confirm("Do you wish to create it now?", true)? {
            return Err(Error::Aborted("ServerProfiles directory is required".to_string()));
        }
        installation.ensure_profiles_dir()?;
    }
    println!("Using {}", installation.profiles_dir.to_string_lossy().bright_yellow());

    println!("\nLooking for base configs in ServerProfiles...");
    let missing = missing_base_configs(&installation.profiles_dir);
    if missing.is_empty() {
        println!("Found base_basic.cfg and base_server.cfg");
    } else {
        for config in &missing {
            println!("  missing {}", config.base_file_name().bright_yellow());
        }
        let source = if confirm("Download the default configs from the ArmaDediHelper repository? Otherwise built-in defaults are used.", false)? {
            TemplateSource::Upstream
        } else {
            TemplateSource::Builtin
        };
        for config in ensure_base_configs(&installation.profiles_dir, source)? {
            println!("  created {}", config.base_file_name().bright_green());
        }
    }

    println!("\nLooking for mod presets in ServerProfiles...");
    let presets = discover_presets(&installation.profiles_dir)?;
    if presets.is_empty() {
        println!("Could not find any mod presets in ServerProfiles!\n\
                  Export one from the Arma 3 Launcher and place it in that directory.");
        return Err(Error::Aborted("no presets to use".to_string()));
    }

    println!("Found {} presets:", presets.len().to_string().bright_blue());
    for preset in &presets {
        let name = preset.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
        println!("  {}", name.bright_yellow());
    }

    let query = read_input("\nType the name of the mod preset to use:")?;
    let preset_path = match select_preset(&presets, &query) {
        Some(path) => path.clone(),
        None => {
            println!("{}", "The name did not match any preset, check the capitalization.".bright_red());
            return Err(Error::Aborted("preset selection failed".to_string()));
        }
    };
    println!("Selected {}", preset_path.to_string_lossy().bright_yellow());

    let profile_name = prompt_profile_name(default_profile_name(&preset_path))?;

    let mut config = SetupConfig::new(installation.root.clone(), preset_path, profile_name);
    config.workshop_dir = workshop_dir;
    config.port = prompt_port()?;

    let builder = ProfileBuilder::new(&installation, &config.profile_name, config.port);
    if builder.exists() {
        config.existing_profile = prompt_existing_profile()?;
    }

    let report = provision(&config, |unresolved| {
        print_unresolved(unresolved);
        confirm("Continue without them?", false).unwrap_or(false)
    })?;

    print_report(&report);
    Ok(())
}

fn prompt_profile_name(default: Option<String>) -> Result<String, Error> {
    loop {
        let msg = match &default {
            Some(name) => format!("Profile name [{}]:", name.bright_yellow()),
            None => "Profile name:".to_string(),
        };

        let input = read_input(&msg)?;
        let name = match (&default, input.is_empty()) {
            (Some(name), true) => name.clone(),
            _ => input,
        };

        if is_valid_profile_name(&name) {
            return Ok(name);
        }
        println!("{}", "A profile name can't be empty or contain path separators.".bright_red());
    }
}

fn prompt_port() -> Result<u16, Error> {
    loop {
        let input = read_input(&format!("Server port [{}]:", DEFAULT_PORT.to_string().bright_yellow()))?;
        if let Some(port) = parse_port(&input) {
            return Ok(port);
        }
        println!("{}", "The port must be a number between 1 and 65535.".bright_red());
    }
}

/// Workshop items of app 107410, one directory per item id.
fn prompt_workshop_dir() -> Result<PathBuf, Error> {
    loop {
        let input = read_input("Path to the workshop content directory:")?;
        if input.is_empty() {
            return Err(Error::Aborted("workshop content directory is required".to_string()));
        }

        let dir = PathBuf::from(input);
        if dir.is_dir() {
            return Ok(dir);
        }
        println!("{}", "That directory does not exist.".bright_red());
    }
}

fn prompt_existing_profile() -> Result<ExistingProfileAction, Error> {
    println!("\nFound the profile's directory! What should be done with it?\n  \
              {} Nothing, don't touch the files (default)\n  \
              {} Regenerate the mod parameter\n  \
              {} Regenerate everything, this removes any changes you've made",
             "1".bold(), "2".bold(), "3".bold());

    let answer = choose("Action:".to_string(), &["1", "2", "3"], "1")?;
    Ok(match answer.as_str() {
        "2" => ExistingProfileAction::RegenerateParams,
        "3" => ExistingProfileAction::RegenerateAll,
        _ => ExistingProfileAction::Keep,
    })
}

fn print_unresolved(unresolved: &UnresolvedModError) {
    println!("\n{} mods are not downloaded by the client:", unresolved.mods.len().to_string().bright_red());
    for descriptor in &unresolved.mods {
        println!("  {} {}", descriptor.name.bright_yellow(), descriptor.link.bright_black());
    }
    println!("Subscribe to them in the workshop and let the launcher download them, or continue without them.");
}

fn print_report(report: &ProvisionReport) {
    match report {
        ProvisionReport::Untouched { profile_dir } => {
            println!("\nLeft {} as it was.", profile_dir.to_string_lossy().bright_yellow());
        }
        ProvisionReport::Provisioned { profile, warnings, unresolved, changes, launch_command } => {
            if !warnings.is_empty() {
                println!("\nSkipped {} preset entries:", warnings.len().to_string().bright_yellow());
                for warning in warnings {
                    println!("  {}", warning);
                }
            }

            println!("\nMods loaded ({}):", profile.mods.len().to_string().bright_green());
            for descriptor in &profile.mods {
                println!("  {} {}", descriptor.name.bright_yellow(), descriptor.workshop_id.bright_black());
            }
            if let Some(unresolved) = unresolved {
                println!("Left out ({}):", unresolved.mods.len().to_string().bright_red());
                for descriptor in &unresolved.mods {
                    println!("  {} {}", descriptor.name.bright_yellow(), descriptor.workshop_id.bright_black());
                }
            }

            println!("\nFiles:");
            for change in changes {
                let status = match change.outcome {
                    WriteOutcome::Written => "written".bright_green(),
                    WriteOutcome::Unchanged => "unchanged".bright_black(),
                };
                println!("  {} {}", change.path.to_string_lossy(), status);
            }

            println!("{}", "\nSetup finished!".bright_green().bold());
            println!("The server configuration lives in {}", profile.dir.to_string_lossy().bright_yellow());
            println!("Tweak basic.cfg and server.cfg there to your needs; server logs (.rpt) end up in its {} directory.", STATE_DIR);
            println!("\nStart the server with {} in that directory, or run:", START_SCRIPT.bright_yellow());
            println!("  {}", launch_command);
        }
    }
}

use crate::error::FilesystemError;
use crate::utils::write_atomic;
use log::{info, warn};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use ureq::Agent;
use url::Url;

const UPSTREAM_BASE: &str = "https://raw.githubusercontent.com/rekterakathom/ArmaDediHelper/main/configs/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseConfig {
    Basic,
    Server,
}

impl BaseConfig {
    pub const ALL: [BaseConfig; 2] = [BaseConfig::Basic, BaseConfig::Server];

    /// Name of the shared template inside `ServerProfiles`.
    pub fn base_file_name(&self) -> &'static str {
        match self {
            BaseConfig::Basic => "base_basic.cfg",
            BaseConfig::Server => "base_server.cfg",
        }
    }

    /// Name of the copy inside a profile directory.
    pub fn profile_file_name(&self) -> &'static str {
        match self {
            BaseConfig::Basic => "basic.cfg",
            BaseConfig::Server => "server.cfg",
        }
    }

    fn builtin(&self) -> &'static str {
        match self {
            BaseConfig::Basic => BUILTIN_BASIC,
            BaseConfig::Server => BUILTIN_SERVER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateSource {
    Builtin,
    Upstream,
}

pub fn base_config_path(profiles_dir: &Path, config: BaseConfig) -> PathBuf {
    profiles_dir.join(config.base_file_name())
}

pub fn missing_base_configs(profiles_dir: &Path) -> Vec<BaseConfig> {
    BaseConfig::ALL.into_iter()
        .filter(|config| !base_config_path(profiles_dir, *config).is_file())
        .collect()
}

/// Writes every missing base config. Existing ones are never touched.
/// Returns the configs that were created.
pub fn ensure_base_configs(profiles_dir: &Path, source: TemplateSource) -> Result<Vec<BaseConfig>, FilesystemError> {
    let missing = missing_base_configs(profiles_dir);

    for config in &missing {
        let contents = match source {
            TemplateSource::Builtin => config.builtin().to_string(),
            TemplateSource::Upstream => match fetch_upstream(*config) {
                Ok(text) => text,
                Err(err) => {
                    warn!("Failed to download {}, using the built-in default: {}", config.base_file_name(), err);
                    config.builtin().to_string()
                }
            },
        };

        let path = base_config_path(profiles_dir, *config);
        write_atomic(&path, contents.as_bytes())?;
        info!("Created {}", path.display());
    }

    Ok(missing)
}

fn fetch_upstream(config: BaseConfig) -> Result<String, Box<dyn Error>> {
    let url = Url::parse(UPSTREAM_BASE)?.join(config.base_file_name())?;

    let agent: Agent = Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(10)))
        .build()
        .into();

    let mut response = agent.get(url.as_str()).call()?;
    let text = response.body_mut().read_to_string()?;

    if text.trim().is_empty() {
        return Err(format!("{} is empty", url).into());
    }

    Ok(text)
}

const BUILTIN_BASIC: &str = r#"// Network tuning, see https://community.bistudio.com/wiki/Arma_3:_Basic_Server_Config_File
MaxMsgSend = 128;
MaxSizeGuaranteed = 512;
MaxSizeNonguaranteed = 256;
MinBandwidth = 131072;
MaxBandwidth = 10000000000;
MinErrorToSend = 0.001;
MinErrorToSendNear = 0.01;
MaxCustomFileSize = 0;
class sockets { maxPacketSize = 1400; };
"#;

const BUILTIN_SERVER: &str = r#"// See https://community.bistudio.com/wiki/Arma_3:_Server_Config_File
hostname = "Arma 3 Dedicated Server";
password = "";
passwordAdmin = "";
serverCommandPassword = "";
maxPlayers = 32;
persistent = 1;
voteThreshold = 0.33;
voteMissionPlayers = 1;
kickDuplicate = 1;
verifySignatures = 2;
allowedFilePatching = 0;
BattlEye = 1;
disableVoN = 0;
vonCodec = 1;
vonCodecQuality = 30;
timeStampFormat = "short";
logFile = "server_console.log";
motd[] = { "Welcome!" };
motdInterval = 5;

class Missions {};
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{read_to_string, write};
    use tempfile::tempdir;

    #[test]
    fn writes_builtin_defaults_when_missing() {
        let dir = tempdir().unwrap();

        assert_eq!(missing_base_configs(dir.path()), BaseConfig::ALL.to_vec());
        let created = ensure_base_configs(dir.path(), TemplateSource::Builtin).unwrap();

        assert_eq!(created, BaseConfig::ALL.to_vec());
        assert!(missing_base_configs(dir.path()).is_empty());
        assert!(read_to_string(dir.path().join("base_server.cfg")).unwrap().contains("hostname"));
    }

    #[test]
    fn never_overwrites_existing_base_configs() {
        let dir = tempdir().unwrap();
        write(dir.path().join("base_server.cfg"), "hostname = \"Mine\";").unwrap();

        let created = ensure_base_configs(dir.path(), TemplateSource::Builtin).unwrap();

        assert_eq!(created, vec![BaseConfig::Basic]);
        assert_eq!(read_to_string(dir.path().join("base_server.cfg")).unwrap(), "hostname = \"Mine\";");
    }
}

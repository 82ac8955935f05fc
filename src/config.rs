use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Connection details for a remote CRM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl CrmConfig {
    /// Read `CRM_URL` and `CRM_API_KEY`, loading `.env` first if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let url = std::env::var("CRM_URL").context("CRM_URL is not set")?;
        let api_key = std::env::var("CRM_API_KEY").context("CRM_API_KEY is not set")?;
        let timeout_secs = std::env::var("CRM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_timeout_secs);

        Ok(Self {
            url,
            api_key,
            timeout_secs,
        })
    }
}

/// Where uploaded files are kept locally
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSettings {
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
}

fn default_storage_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("crm-form-actions")
        .join("uploads")
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Contact type used when a Contact action does not map one
    #[serde(default = "default_contact_type")]
    pub default_contact_type: String,
    /// Write logs to this file instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_contact_type() -> String {
    crate::api::constants::defaults::CONTACT_TYPE.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_contact_type: default_contact_type(),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub crm: Option<CrmConfig>,
    #[serde(default)]
    pub files: FileSettings,
    #[serde(default)]
    pub settings: Settings,
}

impl Config {
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "linux") {
            // Use XDG config directory on Linux
            dirs::config_dir()
                .context("Failed to get XDG config directory")?
                .join("crm-form-actions")
        } else {
            dirs::home_dir()
                .context("Failed to get home directory")?
                .join(".crm-form-actions")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        if !config_path.exists() {
            info!("Config file doesn't exist, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from: {:?}", path);

        let config_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        debug!("Loaded config (remote CRM configured: {})", config.crm.is_some());
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        debug!("Saving config to: {:?}", path);

        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create config directory: {:?}", dir))?;
                info!("Created config directory: {:?}", dir);
            }
        }

        let config_content =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(path, config_content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        info!("Config saved successfully");
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    /// The CRM connection, preferring the environment over the file
    pub fn crm_connection(&self) -> Result<CrmConfig> {
        match CrmConfig::from_env() {
            Ok(config) => Ok(config),
            Err(env_error) => self
                .crm
                .clone()
                .with_context(|| format!("No [crm] section in config and {}", env_error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.crm.is_none());
        assert_eq!(config.settings.default_contact_type, "Individual");
        assert!(config.files.storage_dir.ends_with("uploads"));
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [crm]
            url = "https://crm.example.org"
            api_key = "secret"

            [files]
            storage_dir = "/var/lib/forms"

            [settings]
            default_contact_type = "Organization"
            "#,
        )
        .unwrap();

        let crm = config.crm.unwrap();
        assert_eq!(crm.url, "https://crm.example.org");
        assert_eq!(crm.timeout_secs, 30);
        assert_eq!(config.files.storage_dir, PathBuf::from("/var/lib/forms"));
        assert_eq!(config.settings.default_contact_type, "Organization");
    }

    #[test]
    fn test_save_and_load_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.settings.default_contact_type = "Household".to_string();

        config.save_to(&path)?;
        let loaded = Config::load_from(&path)?;
        assert_eq!(loaded.settings.default_contact_type, "Household");
        Ok(())
    }
}

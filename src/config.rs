use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{PrepareError, Result};
use crate::git::repository::Tagger;

/// File name looked up in the current directory and the user config directory
pub const CONFIG_FILE_NAME: &str = "conda-build-prepare.toml";

/// Represents the complete configuration for conda-build-prepare.
///
/// Contains the package-build tool to invoke, how the build environment is
/// created, and the identity used for tags written into source repositories.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Executable of the package-build tool
    #[serde(default = "default_conda")]
    pub conda: String,

    #[serde(default)]
    pub environment: EnvironmentConfig,

    #[serde(default)]
    pub tagger: TaggerConfig,
}

fn default_conda() -> String {
    "conda".to_string()
}

/// A `conda config` value: either a single value or a list of values
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum SettingValue {
    One(String),
    Many(Vec<String>),
}

impl SettingValue {
    pub fn values(&self) -> Vec<&str> {
        match self {
            SettingValue::One(value) => vec![value.as_str()],
            SettingValue::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

/// Settings applied with `conda config --env --<action> <key> <value>`,
/// keyed by action (`set`, `prepend`, `append`, ...) and then by key.
pub type EnvironmentSettings = BTreeMap<String, BTreeMap<String, SettingValue>>;

/// Returns the packages installed in every prepared environment.
fn default_packages() -> Vec<String> {
    let mut packages: Vec<String> = [
        "python=3.7",
        "conda-build",
        "conda-verify",
        "anaconda-client",
        "jinja2",
        "pexpect",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect();

    if cfg!(any(target_os = "linux", target_os = "macos")) {
        packages.push("ripgrep".to_string());
    }

    packages
}

/// Returns the default environment settings.
fn default_settings() -> EnvironmentSettings {
    let mut set = BTreeMap::new();
    set.insert(
        "safety_checks".to_string(),
        SettingValue::One("disabled".to_string()),
    );
    set.insert(
        "channel_priority".to_string(),
        SettingValue::One("strict".to_string()),
    );
    set.insert("always_yes".to_string(), SettingValue::One("yes".to_string()));

    let mut settings = BTreeMap::new();
    settings.insert("set".to_string(), set);
    settings
}

/// Configuration for the prepared build environment.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EnvironmentConfig {
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,

    #[serde(default = "default_settings")]
    pub settings: EnvironmentSettings,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        EnvironmentConfig {
            packages: default_packages(),
            settings: default_settings(),
        }
    }
}

fn default_tagger_name() -> String {
    "conda-build-prepare".to_string()
}

fn default_tagger_email() -> String {
    "conda-build-prepare@github.com".to_string()
}

/// Identity recorded on the annotated tags this tool creates.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TaggerConfig {
    #[serde(default = "default_tagger_name")]
    pub name: String,

    #[serde(default = "default_tagger_email")]
    pub email: String,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        TaggerConfig {
            name: default_tagger_name(),
            email: default_tagger_email(),
        }
    }
}

impl From<&TaggerConfig> for Tagger {
    fn from(config: &TaggerConfig) -> Self {
        Tagger {
            name: config.name.clone(),
            email: config.email.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            conda: default_conda(),
            environment: EnvironmentConfig::default(),
            tagger: TaggerConfig::default(),
        }
    }
}

/// Loads configuration from file or returns defaults.
///
/// Attempts to load configuration in the following order:
/// 1. Custom path provided as parameter
/// 2. `conda-build-prepare.toml` in current directory
/// 3. `conda-build-prepare.toml` in user config directory
/// 4. Default configuration if no file found
///
/// # Arguments
/// * `config_path` - Optional path to custom configuration file
///
/// # Returns
/// * `Ok(Config)` - Loaded or default configuration
/// * `Err` - If file exists but cannot be read or parsed
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config_str = if let Some(path) = config_path {
        fs::read_to_string(path)
            .map_err(|e| PrepareError::config(format!("Cannot read '{}': {}", path, e)))?
    } else if Path::new(CONFIG_FILE_NAME).exists() {
        fs::read_to_string(CONFIG_FILE_NAME)?
    } else if let Some(config_dir) = dirs::config_dir() {
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            fs::read_to_string(config_path)?
        } else {
            return Ok(Config::default());
        }
    } else {
        return Ok(Config::default());
    };

    parse_config(&config_str)
}

/// Parse configuration from TOML text
pub fn parse_config(config_str: &str) -> Result<Config> {
    toml::from_str(config_str).map_err(|e| PrepareError::config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let config = Config::default();
        let set = &config.environment.settings["set"];
        assert_eq!(set["channel_priority"], SettingValue::One("strict".to_string()));
        assert_eq!(set["always_yes"].values(), vec!["yes"]);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
[tagger]
name = "ci-bot"
"#,
        )
        .unwrap();

        assert_eq!(config.tagger.name, "ci-bot");
        assert_eq!(config.tagger.email, "conda-build-prepare@github.com");
        assert_eq!(config.conda, "conda");
        assert!(config.environment.packages.contains(&"conda-build".to_string()));
    }

    #[test]
    fn test_setting_lists() {
        let config = parse_config(
            r#"
[environment.settings.append]
channels = ["conda-forge", "bioconda"]
"#,
        )
        .unwrap();

        let append = &config.environment.settings["append"];
        assert_eq!(append["channels"].values(), vec!["conda-forge", "bioconda"]);
        assert!(!config.environment.settings.contains_key("set"));
    }

    #[test]
    fn test_invalid_toml() {
        let err = parse_config("conda = [").unwrap_err();
        assert!(matches!(err, PrepareError::Config(_)));
    }

    #[test]
    fn test_tagger_conversion() {
        let tagger = Tagger::from(&TaggerConfig::default());
        assert_eq!(tagger.name, "conda-build-prepare");
    }
}

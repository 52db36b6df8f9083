use crate::domain::policy::Policy;
use crate::domain::project::ProjectDefaults;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runtime configuration, read from a TOML file. Every field has a default,
/// so an empty file (or no file) is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub editor: EditorConfig,
    pub projects: ProjectsConfig,
    pub mail: MailConfig,
    pub log: LogConfig,
    pub storage: StorageConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Drop no-effect transactions instead of failing the whole edit.
    pub continue_on_no_effect: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            continue_on_no_effect: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectsConfig {
    pub depth_limit: u32,
    /// Who may lock and unlock project membership.
    pub lock_policy: Policy,
    pub defaults: ProjectDefaults,
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        Self {
            depth_limit: 16,
            lock_policy: Policy::Admin,
            defaults: ProjectDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub base_uri: String,
    /// Put the action (`[Renamed]`, `[Commented]`...) in mail subjects.
    pub vary_subjects: bool,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            base_uri: "http://localhost/".to_string(),
            vary_subjects: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive; `APPTX_LOG` wins.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.editor.continue_on_no_effect);
        assert_eq!(config.projects.depth_limit, 16);
        assert_eq!(config.projects.defaults.icon, "fa-briefcase");
        assert_eq!(config.projects.lock_policy, Policy::Admin);
    }

    #[test]
    fn test_partial_config_overrides() {
        let config = Config::from_toml(
            r#"
            [editor]
            continue_on_no_effect = false

            [projects]
            depth_limit = 4

            [projects.defaults]
            color = "red"
            join_policy = "no-one"

            [mail]
            vary_subjects = false
            "#,
        )
        .unwrap();
        assert!(!config.editor.continue_on_no_effect);
        assert_eq!(config.projects.depth_limit, 4);
        assert_eq!(config.projects.defaults.color, "red");
        assert_eq!(config.projects.defaults.icon, "fa-briefcase");
        assert_eq!(config.projects.defaults.join_policy, Policy::NoOne);
        assert!(!config.mail.vary_subjects);
        assert_eq!(config.mail.base_uri, "http://localhost/");
    }

    #[test]
    fn test_bad_policy_is_rejected() {
        assert!(Config::from_toml("[projects]\nlock_policy = \"nobody\"").is_err());
    }
}

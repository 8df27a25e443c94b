use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};

use crate::error::AssistantError;
use crate::format::RenderFormat;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_REPLY_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub format: RenderFormat,
    pub reply_timeout_secs: u64,
    pub store_path: Option<PathBuf>,
}

/// The part of the config the bridge needs to reach the completion API.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    pub endpoint: String,
    pub api_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            endpoint: Some(DEFAULT_ENDPOINT.to_string()),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            format: RenderFormat::default(),
            reply_timeout_secs: DEFAULT_REPLY_TIMEOUT_SECS,
            store_path: None,
        }
    }

    /// Load the config file, then let the environment override it.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        let config = Self::load_from(&config_path)?;
        Ok(config.with_env_overrides(|name| std::env::var(name).ok()))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// `OPENAI_API_KEY` and `LEETGPT_ENDPOINT` win over the file.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(endpoint) = lookup("LEETGPT_ENDPOINT").filter(|e| !e.trim().is_empty()) {
            self.endpoint = Some(endpoint);
        }
        self
    }

    /// Fails with `ConfigMissing` before any network attempt is made.
    pub fn relay_config(&self) -> Result<RelayConfig, AssistantError> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(AssistantError::ConfigMissing)?;
        let endpoint = self
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(AssistantError::ConfigMissing)?;

        Ok(RelayConfig {
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs.max(1))
    }

    /// Where chat transcripts live unless `store_path` says otherwise.
    pub fn resolved_store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::get_config_dir()?.join("sessions.db")),
        }
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join("config.json"))
    }

    fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("leetcode-gpt"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.model, "gpt-4o");
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::new();
        config.api_key = Some("sk-test".to_string());
        config.format = RenderFormat::Markdown;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"api_key": "sk-partial"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-partial"));
        assert_eq!(config.reply_timeout_secs, 60);
        assert_eq!(config.endpoint.as_deref(), Some(DEFAULT_ENDPOINT));
    }

    #[test]
    fn test_env_overrides_file() {
        let config = Config::new().with_env_overrides(|name| match name {
            "OPENAI_API_KEY" => Some("sk-env".to_string()),
            "LEETGPT_ENDPOINT" => Some("http://localhost:9999/v1".to_string()),
            _ => None,
        });
        let relay = config.relay_config().unwrap();
        assert_eq!(relay.api_key, "sk-env");
        assert_eq!(relay.endpoint, "http://localhost:9999/v1");
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let config = Config::new();
        assert_eq!(config.relay_config(), Err(AssistantError::ConfigMissing));

        let mut blank = Config::new();
        blank.api_key = Some("   ".to_string());
        assert_eq!(blank.relay_config(), Err(AssistantError::ConfigMissing));
    }
}

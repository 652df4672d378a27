//! Configuration types and loading for chatkeep.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::error::Result;
use crate::paths;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the persisted store records.
    pub data_dir: PathBuf,

    /// Length of a title derived from the first user message.
    pub title_max_chars: usize,

    /// Longest title accepted when renaming a conversation.
    pub rename_max_chars: usize,

    /// Label used for assistant turns in text exports.
    pub assistant_label: String,

    /// Generation backend configuration.
    pub generation: GenerationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: paths::data_dir(),
            title_max_chars: 30,
            rename_max_chars: 20,
            assistant_label: "Gemini AI".to_string(),
            generation: GenerationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            let mut config = Self::default();
            config.apply_env();
            Ok(config)
        }
    }

    /// Load configuration from a specific file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;
        config.expand_paths();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    pub fn default_config_path() -> PathBuf {
        paths::config_dir().join("config.toml")
    }

    /// Save configuration to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Ensure config exists at the given path, creating defaults if missing.
    pub fn ensure_at(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            let mut config = Self::default();
            config.expand_paths();
            config.save_to_path(path)?;
            config.apply_env();
            Ok(config)
        }
    }

    /// Expand a path, replacing ~ with home directory.
    pub fn expand_path(path: &str) -> PathBuf {
        let expanded = shellexpand::full(path)
            .map(std::borrow::Cow::into_owned)
            .unwrap_or_else(|_| path.to_string());
        PathBuf::from(expanded)
    }

    fn expand_paths(&mut self) {
        self.data_dir = Self::expand_path(&self.data_dir.to_string_lossy());
    }

    /// `CHATKEEP_DATA_DIR` takes precedence over the file.
    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(format!("{}_DATA_DIR", crate::env_prefix())) {
            if !dir.trim().is_empty() {
                self.data_dir = Self::expand_path(&dir);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.title_max_chars == 0 {
            return Err(Error::Config("title_max_chars must be at least 1".into()));
        }
        if self.rename_max_chars == 0 {
            return Err(Error::Config("rename_max_chars must be at least 1".into()));
        }
        Ok(())
    }
}

/// Settings for the text generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Model used when none is given on the command line.
    pub model: String,

    /// Models offered for selection.
    pub models: Vec<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Base URL of the generative language API.
    pub base_url: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            models: vec![
                "gemini-1.5-flash".to_string(),
                "gemini-1.5-pro".to_string(),
                "gemini-2.0-flash-thinking-exp".to_string(),
            ],
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

impl GenerationConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("{} is not set", self.api_key_env)))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

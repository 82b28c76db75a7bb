//! Server configuration
//!
//! Loaded from an optional YAML file named by `NOTEPAD_CONFIG`. Any field the
//! file leaves out keeps its default, so an empty file is a valid config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::NotepadError;

pub const CONFIG_ENV_VAR: &str = "NOTEPAD_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interface to listen on
    pub bind_address: String,
    pub port: u16,
    /// Directory holding one `<title>.txt` per note
    pub notes_dir: PathBuf,
    /// Directory holding `edit.html`, `view.html`, `list.html` and `add.html`
    pub template_dir: PathBuf,
    /// Heading shown on the note list
    pub list_title: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8686,
            notes_dir: PathBuf::from("notes"),
            template_dir: PathBuf::from("template"),
            list_title: "My notes list".to_string(),
        }
    }
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self, NotepadError> {
        // serde_yaml rejects an empty document, treat it as "all defaults"
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| NotepadError::Config(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Load from the file named by `NOTEPAD_CONFIG`, or fall back to defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => {
                let config = Self::load(Path::new(&path))?;
                tracing::info!("loaded config from {}", Path::new(&path).display());
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    fn validate(&self) -> Result<(), NotepadError> {
        if self.bind_address.trim().is_empty() {
            return Err(NotepadError::Config("bind_address must not be empty".to_string()));
        }
        if self.notes_dir.as_os_str().is_empty() {
            return Err(NotepadError::Config("notes_dir must not be empty".to_string()));
        }
        if self.template_dir.as_os_str().is_empty() {
            return Err(NotepadError::Config("template_dir must not be empty".to_string()));
        }
        Ok(())
    }
}

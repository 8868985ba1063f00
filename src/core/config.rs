use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::utils::url::normalize_base_url;

pub const DEFAULT_ACTION: &str = "/request";
pub const DEFAULT_SLOT: &str = "0";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// On-disk configuration, all fields optional.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct ConfigFile {
    pub node_url: Option<String>,
    pub slot: Option<String>,
    pub action: Option<String>,
    pub stream_base: Option<String>,
    pub default_model: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// No node base address from any source (file, environment, or flags).
    MissingNodeUrl,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse config at {}: {}", path.display(), source)
            }
            ConfigError::MissingNodeUrl => {
                write!(
                    f,
                    "No node URL configured. Set AIM_NODE_URL, pass --node-url, or add node_url to the config file."
                )
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::MissingNodeUrl => None,
        }
    }
}

impl ConfigFile {
    pub fn load_from_path(config_path: &Path) -> Result<ConfigFile, ConfigError> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
                path: config_path.to_path_buf(),
                source,
            })?;
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: config_path.to_path_buf(),
                source,
            })
        } else {
            Ok(ConfigFile::default())
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "permacommons", "aimchat")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolved configuration for one session: where the node lives, which slot
/// and action path to hit, and the origin streams are served from.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub node_url: String,
    pub slot: String,
    pub action: String,
    pub stream_base: String,
    pub system_prompt: String,
}

impl SessionConfig {
    /// Merge the config file with environment variables. Environment wins;
    /// CLI flags are applied on top by the caller.
    ///
    /// The environment lookup is injected so the precedence is testable
    /// without mutating process state.
    pub fn from_sources(
        file: &ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<SessionConfig, ConfigError> {
        let node_url = env("AIM_NODE_URL")
            .or_else(|| file.node_url.clone())
            .ok_or(ConfigError::MissingNodeUrl)?;
        let node_url = normalize_base_url(&node_url);

        let slot = env("AIM_SLOT")
            .or_else(|| file.slot.clone())
            .unwrap_or_else(|| DEFAULT_SLOT.to_string());
        let action = env("AIM_URI")
            .or_else(|| file.action.clone())
            .unwrap_or_else(|| DEFAULT_ACTION.to_string());

        // Empty stream base means "same origin as the node".
        let stream_base = env("AIM_STREAM_BASE")
            .or_else(|| file.stream_base.clone())
            .map(|base| normalize_base_url(&base))
            .filter(|base| !base.is_empty())
            .unwrap_or_else(|| node_url.clone());

        let system_prompt = file
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        Ok(SessionConfig {
            node_url,
            slot,
            action,
            stream_base,
            system_prompt,
        })
    }
}

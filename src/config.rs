use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
const CONFIG_FILE: &str = "config.toml";
const EXPORT_FILE: &str = "putty.reg";
const RECENT_FILE: &str = ".putty_recent_sessions";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The PuTTY registry export to read sessions from.
    pub export_path: PathBuf,
    pub recent_file: PathBuf,
    /// Connection logs land here, one file per connection.
    pub log_dir: PathBuf,
    /// Where Windows drives are mounted, so `C:\x` resolves to `<mount_root>/c/x`.
    pub mount_root: PathBuf,
    pub ssh_program: String,
    pub multiplexer_program: String,
    pub converter: ConverterConfig,
    pub recent: RecentConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub program: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecentConfig {
    /// Recent sessions shown at the top of the menu.
    pub display_limit: usize,
    /// Names kept in the recent file.
    pub retention: usize,
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| config_dir.clone());
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            export_path: config_dir.join(CRATE_NAME).join(EXPORT_FILE),
            recent_file: home.join(RECENT_FILE),
            log_dir: data_dir.join(CRATE_NAME).join("logs"),
            mount_root: PathBuf::from("/mnt"),
            ssh_program: "ssh".to_string(),
            multiplexer_program: "tmux".to_string(),
            converter: ConverterConfig::default(),
            recent: RecentConfig::default(),
        }
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: "puttygen".to_string(),
            timeout_secs: 45,
        }
    }
}

impl Default for RecentConfig {
    fn default() -> Self {
        Self {
            display_limit: 5,
            retention: 20,
        }
    }
}

impl Config {
    /// Loads `path`, or the default config file if it exists, or falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Directory holding the export; relative key paths are resolved against it.
    pub fn export_dir(&self) -> PathBuf {
        self.export_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    pub fn converter_timeout(&self) -> Duration {
        Duration::from_secs(self.converter.timeout_secs)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CRATE_NAME).join(CONFIG_FILE))
}

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    expand_user, state_file_path, write_json_atomic, DEFAULT_LOG_ROOT, DEFAULT_REMOTE_LOG_DIR,
};

const CONFIG_FILE: &str = "config.json";

pub const ENV_ADB_PATH: &str = "VFM_ADB_PATH";
pub const ENV_LOG_ROOT: &str = "VFM_LOG_ROOT";
pub const ENV_REMOTE_LOG_DIR: &str = "VFM_REMOTE_LOG_DIR";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Empty means "resolve adb from the environment".
    pub adb_path: String,
    pub log_root: String,
    pub remote_log_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            adb_path: String::new(),
            log_root: DEFAULT_LOG_ROOT.into(),
            remote_log_dir: DEFAULT_REMOTE_LOG_DIR.into(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Self {
        Self::load_from(&config_path(), |key| std::env::var(key).ok())
    }

    /// Reads `path` and layers environment overrides on top. Env wins over
    /// the file, the file wins over defaults.
    pub fn load_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = AppConfig::default();
        match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<AppConfig>(&data) {
                Ok(file_cfg) => {
                    if !file_cfg.adb_path.is_empty() {
                        cfg.adb_path = file_cfg.adb_path;
                    }
                    if !file_cfg.log_root.is_empty() {
                        cfg.log_root = file_cfg.log_root;
                    }
                    if !file_cfg.remote_log_dir.is_empty() {
                        cfg.remote_log_dir = file_cfg.remote_log_dir;
                    }
                }
                Err(err) => {
                    warn!("Failed to parse {}: {err}", path.display());
                }
            },
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}", path.display());
                }
            }
        }

        if let Some(value) = env(ENV_ADB_PATH).filter(|v| !v.trim().is_empty()) {
            cfg.adb_path = value;
        }
        if let Some(value) = env(ENV_LOG_ROOT).filter(|v| !v.trim().is_empty()) {
            cfg.log_root = value;
        }
        if let Some(value) = env(ENV_REMOTE_LOG_DIR).filter(|v| !v.trim().is_empty()) {
            cfg.remote_log_dir = value;
        }
        cfg
    }

    pub fn save(&self) -> io::Result<()> {
        write_json_atomic(&config_path(), self)
    }

    pub fn log_root_path(&self) -> PathBuf {
        expand_user(self.log_root.trim())
    }

    pub fn adb_override(&self) -> Option<PathBuf> {
        let trimmed = self.adb_path.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(expand_user(trimmed))
        }
    }
}

pub fn config_path() -> PathBuf {
    state_file_path(CONFIG_FILE)
}

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

pub mod config;

pub use config::AppConfig;

pub const DEFAULT_LOG_ROOT: &str = "~/VFM/logs";
pub const DEFAULT_REMOTE_LOG_DIR: &str = "/sdcard/VFM/logs";

pub fn data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local/share/vfm")
    } else {
        PathBuf::from("/tmp/vfm")
    }
}

pub fn state_dir() -> PathBuf {
    data_dir().join("state")
}

pub fn state_file_path(file_name: &str) -> PathBuf {
    state_dir().join(file_name)
}

pub fn expand_user(path: &str) -> PathBuf {
    expand_user_with(path, std::env::var("HOME").ok().as_deref())
}

fn expand_user_with(path: &str, home: Option<&str>) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = home {
            let rest = path.strip_prefix("~/").unwrap_or("");
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Installs the stderr subscriber. Stdout stays reserved for command output.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(directives.as_deref()))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| -> Box<dyn std::error::Error> { e })?;
    Ok(())
}

/// `RUST_LOG`-style directives, falling back to `info` when none are given.
fn env_filter(directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives.unwrap_or_default())
}

use std::{io, path::PathBuf};

use thiserror::Error;

/// The executable could not be started at all.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LaunchError {
    #[error("{program} not found (set VFM_ADB_PATH or ANDROID_SDK_ROOT)")]
    NotFound { program: String },
    #[error("failed to launch {program}: {message}")]
    Io { program: String, message: String },
}

#[derive(Debug, Error)]
pub enum AdbError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("adb {command} failed with exit {status}{}", detail_suffix(.detail))]
    CommandFailed {
        command: String,
        status: i32,
        detail: String,
    },
    #[error("{0}")]
    PullFailed(String),
    #[error("invalid device address {0:?} (expected ip:port)")]
    InvalidAddress(String),
    #[error("adb connect failed: {0}")]
    ConnectFailed(String),
    #[error("cannot create {}: {source}", .path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Terminal failure of one pipeline run. None of these are retried.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Launch(LaunchError),
    #[error("device check failed: {0}")]
    DeviceQuery(AdbError),
    #[error("no device connected")]
    NoDeviceConnected,
    #[error("remote directory {0} not found on the device")]
    RemotePathNotFound(String),
    #[error("pull failed: {0}")]
    PullFailed(String),
    #[error("a log retrieval is already running")]
    AlreadyRunning,
    #[error("invalid retrieval request: {0}")]
    InvalidRequest(&'static str),
}

impl RetrievalError {
    /// Errors raised before the pull stage. Launch errors stay distinct so the
    /// caller can point at the adb installation.
    pub(crate) fn from_check(err: AdbError) -> Self {
        match err {
            AdbError::Launch(err) => RetrievalError::Launch(err),
            other => RetrievalError::DeviceQuery(other),
        }
    }
}

fn detail_suffix(detail: &str) -> String {
    let detail = detail.trim();
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}

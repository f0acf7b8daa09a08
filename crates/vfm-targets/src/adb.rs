use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::{
    error::AdbError,
    ids::validate_connect_addr,
    process::{ProcessOutput, ProcessRunner, TokioProcessRunner},
};

const OFFLINE_MARKER: &str = "offline";
const NOT_FOUND_MARKER: &str = "No such file or directory";
const PULLED_MARKER: &str = "pulled";
const CONNECTED_MARKER: &str = "connected to";

/// Picks the adb executable: explicit configuration first, then the
/// environment, then the SDK platform-tools, then `adb` on `PATH`.
pub fn resolve_adb_path(configured: Option<PathBuf>) -> PathBuf {
    resolve_adb_path_with(configured, |key| std::env::var(key).ok())
}

fn resolve_adb_path_with(
    configured: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> PathBuf {
    if let Some(path) = configured {
        return path;
    }
    if let Some(path) = env(vfm_util::config::ENV_ADB_PATH) {
        return PathBuf::from(path);
    }
    if let Some(path) = env("ADB_PATH") {
        return PathBuf::from(path);
    }
    if let Some(sdk_root) = env("ANDROID_SDK_ROOT").or_else(|| env("ANDROID_HOME")) {
        let tools = PathBuf::from(&sdk_root).join("platform-tools");
        for name in ["adb", "adb.exe"] {
            let candidate = tools.join(name);
            if candidate.exists() {
                return candidate;
            }
        }
    }
    PathBuf::from("adb")
}

/// Renders captured output as labelled blocks, skipping empty streams.
pub fn format_adb_output(stdout: &str, stderr: &str) -> String {
    let stdout = stdout.trim();
    let stderr = stderr.trim();
    let mut out = String::new();

    if !stdout.is_empty() {
        out.push_str("stdout:\n");
        out.push_str(stdout);
        out.push('\n');
    }
    if !stderr.is_empty() {
        out.push_str("stderr:\n");
        out.push_str(stderr);
        out.push('\n');
    }

    out
}

fn command_failed(command: &str, output: &ProcessOutput) -> AdbError {
    AdbError::CommandFailed {
        command: command.to_string(),
        status: output.exit_code(),
        detail: format_adb_output(&output.stdout, &output.stderr),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceHandle {
    pub serial: String,
    pub state: String,
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serial)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteListing {
    Entries(String),
    NotFound,
    Empty,
}

impl RemoteListing {
    pub fn entry_count(&self) -> usize {
        match self {
            RemoteListing::Entries(text) => text.lines().filter(|l| !l.trim().is_empty()).count(),
            RemoteListing::NotFound | RemoteListing::Empty => 0,
        }
    }
}

/// Number of files adb reported. The count is scraped from free-form output,
/// so `Unknown` stands for "some files, count not reported".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileCount {
    Exact(u64),
    Unknown,
}

impl FileCount {
    pub fn exact(self) -> Option<u64> {
        match self {
            FileCount::Exact(count) => Some(count),
            FileCount::Unknown => None,
        }
    }
}

impl fmt::Display for FileCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileCount::Exact(1) => f.write_str("1 file"),
            FileCount::Exact(count) => write!(f, "{count} files"),
            FileCount::Unknown => f.write_str("multiple files"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullOutcome {
    pub files_pulled: FileCount,
    pub raw_output: String,
}

fn pulled_count_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d+)\s+file(s)?\s+pulled").expect("pulled-count pattern is valid")
    })
}

pub(crate) fn parse_pulled_count(output: &str) -> FileCount {
    pulled_count_pattern()
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .map(FileCount::Exact)
        .unwrap_or(FileCount::Unknown)
}

/// Parses `adb devices` output. Daemon notices (`* daemon ...`) come before
/// the header and are dropped with it.
pub(crate) fn parse_devices(output: &str) -> Vec<DeviceHandle> {
    output
        .lines()
        .filter(|line| !line.starts_with("* "))
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains(OFFLINE_MARKER))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next().unwrap_or("unknown");
            Some(DeviceHandle {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

pub(crate) fn classify_listing(output: &ProcessOutput) -> Result<RemoteListing, AdbError> {
    if output.stdout.contains(NOT_FOUND_MARKER) || output.stderr.contains(NOT_FOUND_MARKER) {
        return Ok(RemoteListing::NotFound);
    }
    if !output.success() {
        return Err(command_failed("shell ls", output));
    }
    let listing = output.stdout.trim();
    if listing.is_empty() {
        Ok(RemoteListing::Empty)
    } else {
        Ok(RemoteListing::Entries(listing.to_string()))
    }
}

pub(crate) fn interpret_pull(output: &ProcessOutput) -> Result<PullOutcome, AdbError> {
    let stdout = output.stdout.trim();
    let stderr = output.stderr.trim();
    let stderr_is_error = !stderr.is_empty() && !stderr.contains(PULLED_MARKER);
    if !output.success() || stderr_is_error {
        let reason = if !stderr.is_empty() {
            stderr.to_string()
        } else if !stdout.is_empty() {
            stdout.to_string()
        } else {
            format!("adb pull exited with {}", output.exit_code())
        };
        return Err(AdbError::PullFailed(reason));
    }

    let raw_output = match (stdout.is_empty(), stderr.is_empty()) {
        (false, false) => format!("{stdout}\n{stderr}"),
        (false, true) => stdout.to_string(),
        (true, _) => stderr.to_string(),
    };
    Ok(PullOutcome {
        files_pulled: parse_pulled_count(&raw_output),
        raw_output,
    })
}

pub(crate) fn interpret_connect(output: &ProcessOutput) -> Result<String, AdbError> {
    let text = format!("{}\n{}", output.stdout.trim(), output.stderr.trim())
        .trim()
        .to_string();
    if output.success() && text.contains(CONNECTED_MARKER) {
        Ok(text)
    } else if text.is_empty() {
        Err(AdbError::ConnectFailed("adb connect: no output".into()))
    } else {
        Err(AdbError::ConnectFailed(text))
    }
}

/// adb operations used by the toolkit.
#[derive(Clone)]
pub struct AdbBridge {
    runner: Arc<dyn ProcessRunner>,
    adb: PathBuf,
}

impl AdbBridge {
    pub fn new(runner: Arc<dyn ProcessRunner>, adb: PathBuf) -> Self {
        Self { runner, adb }
    }

    /// Bridge over real processes, resolving the adb path.
    pub fn system(configured_adb: Option<PathBuf>) -> Self {
        Self::new(
            Arc::new(TokioProcessRunner),
            resolve_adb_path(configured_adb),
        )
    }

    pub fn adb_path(&self) -> &Path {
        &self.adb
    }

    async fn run(&self, args: &[&str]) -> Result<ProcessOutput, AdbError> {
        debug!("adb {}", args.join(" "));
        Ok(self.runner.run(&self.adb, args).await?)
    }

    pub async fn list_connected_devices(&self) -> Result<Vec<DeviceHandle>, AdbError> {
        let output = self.run(&["devices"]).await?;
        if !output.success() {
            return Err(command_failed("devices", &output));
        }
        Ok(parse_devices(&output.stdout))
    }

    pub async fn remote_path_listing(
        &self,
        device: &DeviceHandle,
        remote: &str,
    ) -> Result<RemoteListing, AdbError> {
        let output = self
            .run(&["-s", device.serial.as_str(), "shell", "ls", remote])
            .await?;
        classify_listing(&output)
    }

    /// Pulls `remote` into `local`, creating `local` first.
    pub async fn pull_directory(
        &self,
        device: &DeviceHandle,
        remote: &str,
        local: &Path,
    ) -> Result<PullOutcome, AdbError> {
        tokio::fs::create_dir_all(local)
            .await
            .map_err(|source| AdbError::Destination {
                path: local.to_path_buf(),
                source,
            })?;
        let local_arg = local.to_string_lossy().into_owned();
        let output = self
            .run(&["-s", device.serial.as_str(), "pull", remote, local_arg.as_str()])
            .await?;
        let outcome = interpret_pull(&output)?;
        if outcome.files_pulled == FileCount::Unknown {
            warn!("adb pull succeeded but reported no file count");
        }
        Ok(outcome)
    }

    /// Connects a wireless device. Malformed addresses never reach adb.
    pub async fn connect(&self, addr: &str) -> Result<String, AdbError> {
        let addr = validate_connect_addr(addr)?;
        let output = self.run(&["connect", addr]).await?;
        let message = interpret_connect(&output)?;
        info!("adb connect {addr}: {message}");
        Ok(message)
    }
}

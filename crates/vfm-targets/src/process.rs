use std::{io, path::Path, process::Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::LaunchError;

/// Captured result of a process that ran to completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub status: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn exit_code(&self) -> i32 {
        self.status.unwrap_or(-1)
    }
}

/// Spawns one external process per call.
///
/// A non-zero exit is not an error here: it comes back in
/// [`ProcessOutput::status`]. Only a failure to start the program is.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &Path, args: &[&str]) -> Result<ProcessOutput, LaunchError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, program: &Path, args: &[&str]) -> Result<ProcessOutput, LaunchError> {
        debug!("spawning {} {}", program.display(), args.join(" "));
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                let program = program.display().to_string();
                if e.kind() == io::ErrorKind::NotFound {
                    LaunchError::NotFound { program }
                } else {
                    LaunchError::Io {
                        program,
                        message: e.to_string(),
                    }
                }
            })?;

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status.code(),
        })
    }
}

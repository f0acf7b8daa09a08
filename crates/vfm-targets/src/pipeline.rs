//! Device log retrieval.
//!
//! A run walks `CheckDevices -> CheckRemotePath -> Pulling` and ends in
//! `Done` or `Failed`. Every stage gates the next one: adb is never asked to
//! pull before a device is present and the remote directory is known to have
//! entries. Nothing is retried. External commands have no timeout, so a hung
//! adb blocks its run until it exits.

use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
};

use tokio::sync::watch;
use tracing::{info, warn};
use vfm_explorer::RefreshSignal;

use crate::{
    adb::{AdbBridge, DeviceHandle, FileCount, PullOutcome, RemoteListing},
    error::RetrievalError,
    history::{RetrievalHistory, RetrievalRecord, RetrievalStatus},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    CheckDevices,
    CheckRemotePath,
    Pulling,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }
}

/// Receives human-readable status lines while a run is in progress.
pub trait PipelineSink: Send + Sync {
    fn progress(&self, message: &str);
    fn error(&self, message: &str);
}

/// Sink that only logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl PipelineSink for TracingSink {
    fn progress(&self, message: &str) {
        info!("{message}");
    }

    fn error(&self, message: &str) {
        warn!("{message}");
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievalRequest {
    pub remote_dir: String,
    pub local_dir: PathBuf,
}

impl RetrievalRequest {
    pub fn new(remote_dir: impl Into<String>, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            remote_dir: remote_dir.into(),
            local_dir: local_dir.into(),
        }
    }

    fn validate(&self) -> Result<(), RetrievalError> {
        if self.remote_dir.trim().is_empty() {
            return Err(RetrievalError::InvalidRequest("remote directory is empty"));
        }
        if self.local_dir.as_os_str().is_empty() {
            return Err(RetrievalError::InvalidRequest("local directory is empty"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetrievalOutcome {
    Pulled {
        device: DeviceHandle,
        destination: PathBuf,
        pull: PullOutcome,
    },
    NothingToPull {
        device: DeviceHandle,
    },
}

impl RetrievalOutcome {
    pub fn device(&self) -> &DeviceHandle {
        match self {
            RetrievalOutcome::Pulled { device, .. } | RetrievalOutcome::NothingToPull { device } => {
                device
            }
        }
    }

    pub fn files_pulled(&self) -> FileCount {
        match self {
            RetrievalOutcome::Pulled { pull, .. } => pull.files_pulled,
            RetrievalOutcome::NothingToPull { .. } => FileCount::Exact(0),
        }
    }

    pub fn summary(&self) -> String {
        match self {
            RetrievalOutcome::Pulled {
                device,
                destination,
                pull,
            } => format!(
                "Pulled {} from {device} to {}",
                pull.files_pulled,
                destination.display()
            ),
            RetrievalOutcome::NothingToPull { device } => {
                format!("Nothing to pull: the log directory on {device} is empty")
            }
        }
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RetrievalPipeline {
    bridge: AdbBridge,
    refresh: Option<RefreshSignal>,
    history: Option<RetrievalHistory>,
    in_flight: AtomicBool,
    stage_tx: watch::Sender<Option<PipelineStage>>,
}

impl RetrievalPipeline {
    pub fn new(bridge: AdbBridge) -> Self {
        let (stage_tx, _stage_rx) = watch::channel(None);
        Self {
            bridge,
            refresh: None,
            history: None,
            in_flight: AtomicBool::new(false),
            stage_tx,
        }
    }

    /// Fires `signal` whenever a run reaches `Done`.
    pub fn with_refresh(mut self, signal: RefreshSignal) -> Self {
        self.refresh = Some(signal);
        self
    }

    pub fn with_history(mut self, history: RetrievalHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn bridge(&self) -> &AdbBridge {
        &self.bridge
    }

    /// Stage of the current or last run; `None` before the first run.
    pub fn stage(&self) -> Option<PipelineStage> {
        *self.stage_tx.borrow()
    }

    pub fn subscribe_stage(&self) -> watch::Receiver<Option<PipelineStage>> {
        self.stage_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Runs the pipeline once. A second call while a run is in flight fails
    /// with [`RetrievalError::AlreadyRunning`] without touching adb.
    pub async fn run(
        &self,
        request: &RetrievalRequest,
        sink: &dyn PipelineSink,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            let err = RetrievalError::AlreadyRunning;
            sink.error(&err.to_string());
            return Err(err);
        };

        if let Err(err) = request.validate() {
            sink.error(&err.to_string());
            return Err(err);
        }

        let result = self.drive(request, sink).await;
        match &result {
            Ok(outcome) => {
                self.enter(PipelineStage::Done);
                sink.progress(&outcome.summary());
                if let Some(refresh) = &self.refresh {
                    refresh.fire();
                }
            }
            Err(err) => {
                self.enter(PipelineStage::Failed);
                sink.error(&err.to_string());
            }
        }

        if let Some(history) = &self.history {
            history.append_best_effort(record_for(request, &result)).await;
        }
        result
    }

    async fn drive(
        &self,
        request: &RetrievalRequest,
        sink: &dyn PipelineSink,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        self.enter(PipelineStage::CheckDevices);
        sink.progress("Checking connected devices...");
        let devices = self
            .bridge
            .list_connected_devices()
            .await
            .map_err(RetrievalError::from_check)?;
        if devices.len() > 1 {
            info!(
                "{} devices connected, using {}",
                devices.len(),
                devices[0].serial
            );
        }
        let device = devices
            .into_iter()
            .next()
            .ok_or(RetrievalError::NoDeviceConnected)?;

        self.enter(PipelineStage::CheckRemotePath);
        sink.progress(&format!(
            "Checking {} on {device}...",
            request.remote_dir
        ));
        let listing = self
            .bridge
            .remote_path_listing(&device, &request.remote_dir)
            .await
            .map_err(RetrievalError::from_check)?;
        let entries = match listing {
            RemoteListing::NotFound => {
                return Err(RetrievalError::RemotePathNotFound(
                    request.remote_dir.clone(),
                ))
            }
            RemoteListing::Empty => return Ok(RetrievalOutcome::NothingToPull { device }),
            entries @ RemoteListing::Entries(_) => entries,
        };

        self.enter(PipelineStage::Pulling);
        sink.progress(&format!(
            "Pulling {} entries from {} to {}...",
            entries.entry_count(),
            request.remote_dir,
            request.local_dir.display()
        ));
        let pull = self
            .bridge
            .pull_directory(&device, &request.remote_dir, &request.local_dir)
            .await
            .map_err(|err| RetrievalError::PullFailed(err.to_string()))?;

        Ok(RetrievalOutcome::Pulled {
            device,
            destination: request.local_dir.clone(),
            pull,
        })
    }

    fn enter(&self, stage: PipelineStage) {
        info!("retrieval stage: {stage:?}");
        self.stage_tx.send_replace(Some(stage));
    }
}

fn record_for(
    request: &RetrievalRequest,
    result: &Result<RetrievalOutcome, RetrievalError>,
) -> RetrievalRecord {
    let mut record = RetrievalRecord {
        at_unix_millis: vfm_util::now_millis(),
        remote_dir: request.remote_dir.clone(),
        destination: request.local_dir.display().to_string(),
        ..RetrievalRecord::default()
    };
    match result {
        Ok(outcome) => {
            record.device = Some(outcome.device().serial.clone());
            record.files_pulled = outcome.files_pulled().exact();
            record.message = outcome.summary();
            record.status = match outcome {
                RetrievalOutcome::Pulled { .. } => RetrievalStatus::Pulled,
                RetrievalOutcome::NothingToPull { .. } => RetrievalStatus::NothingToPull,
            };
        }
        Err(err) => {
            record.status = RetrievalStatus::Failed;
            record.message = err.to_string();
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::{
        error::LaunchError,
        process::{scripted::ScriptedRunner, ProcessOutput, ProcessRunner},
    };

    const DEVICES: &str = "List of devices attached\nR58M123\tdevice\n";
    const REMOTE: &str = "/sdcard/VFM/logs";

    #[derive(Default)]
    struct RecordingSink {
        progress: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn progress_lines(&self) -> Vec<String> {
            self.progress.lock().unwrap().clone()
        }

        fn error_lines(&self) -> Vec<String> {
            self.errors.lock().unwrap().clone()
        }
    }

    impl PipelineSink for RecordingSink {
        fn progress(&self, message: &str) {
            self.progress.lock().unwrap().push(message.to_string());
        }

        fn error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }

    struct Harness {
        runner: Arc<ScriptedRunner>,
        pipeline: RetrievalPipeline,
        refresh: RefreshSignal,
        sink: RecordingSink,
        dest: tempfile::TempDir,
    }

    impl Harness {
        fn new(runner: ScriptedRunner) -> Self {
            let runner = Arc::new(runner);
            let refresh = RefreshSignal::new();
            let pipeline = RetrievalPipeline::new(AdbBridge::new(runner.clone(), "adb".into()))
                .with_refresh(refresh.clone());
            Self {
                runner,
                pipeline,
                refresh,
                sink: RecordingSink::default(),
                dest: tempfile::tempdir().unwrap(),
            }
        }

        fn request(&self) -> RetrievalRequest {
            RetrievalRequest::new(REMOTE, self.dest.path().join("logs"))
        }

        async fn run(&self) -> Result<RetrievalOutcome, RetrievalError> {
            self.pipeline.run(&self.request(), &self.sink).await
        }
    }

    #[tokio::test]
    async fn header_only_device_list_fails_without_further_commands() {
        let h = Harness::new(ScriptedRunner::default().on(
            "devices",
            "List of devices attached\n\n",
            "",
            0,
        ));
        let err = h.run().await.unwrap_err();
        assert!(matches!(err, RetrievalError::NoDeviceConnected));
        assert_eq!(h.pipeline.stage(), Some(PipelineStage::Failed));
        assert_eq!(h.sink.error_lines(), vec!["no device connected"]);
        assert_eq!(h.runner.calls().len(), 1);
        assert_eq!(h.refresh.generation(), 0);
    }

    #[tokio::test]
    async fn offline_devices_do_not_count() {
        let h = Harness::new(ScriptedRunner::default().on(
            "devices",
            "List of devices attached\nR58M123\toffline\n",
            "",
            0,
        ));
        assert!(matches!(
            h.run().await,
            Err(RetrievalError::NoDeviceConnected)
        ));
        assert!(!h.runner.called("shell"));
    }

    #[tokio::test]
    async fn missing_remote_directory_fails_before_pull() {
        let h = Harness::new(
            ScriptedRunner::default()
                .on("devices", DEVICES, "", 0)
                .on("shell", "", "ls: /sdcard/VFM/logs: No such file or directory", 1),
        );
        let err = h.run().await.unwrap_err();
        assert!(matches!(err, RetrievalError::RemotePathNotFound(ref p) if p == REMOTE));
        assert!(!h.runner.called("pull"));
        assert_eq!(h.pipeline.stage(), Some(PipelineStage::Failed));
    }

    #[tokio::test]
    async fn empty_remote_directory_is_done_with_zero_files() {
        let h = Harness::new(
            ScriptedRunner::default()
                .on("devices", DEVICES, "", 0)
                .on("shell", " \n", "", 0),
        );
        let outcome = h.run().await.unwrap();
        assert!(matches!(outcome, RetrievalOutcome::NothingToPull { .. }));
        assert_eq!(outcome.files_pulled(), FileCount::Exact(0));
        assert!(!h.runner.called("pull"));
        assert_eq!(h.pipeline.stage(), Some(PipelineStage::Done));
        assert_eq!(h.refresh.generation(), 1);
        assert!(h.sink.error_lines().is_empty());
    }

    #[tokio::test]
    async fn counted_pull_reaches_done_and_refreshes() {
        let h = Harness::new(
            ScriptedRunner::default()
                .on("devices", DEVICES, "", 0)
                .on("shell", "a.log\nb.log\nc.log\n", "", 0)
                .on("pull", "/sdcard/VFM/logs/: 3 files pulled, 0 skipped.", "", 0),
        );
        let outcome = h.run().await.unwrap();
        assert_eq!(outcome.files_pulled(), FileCount::Exact(3));
        assert_eq!(outcome.device().serial, "R58M123");
        assert_eq!(h.pipeline.stage(), Some(PipelineStage::Done));
        assert_eq!(h.refresh.generation(), 1);
        assert!(h.dest.path().join("logs").is_dir());

        let progress = h.sink.progress_lines();
        assert_eq!(progress.len(), 4);
        assert_eq!(progress[0], "Checking connected devices...");
        assert_eq!(progress[1], "Checking /sdcard/VFM/logs on R58M123...");
        assert!(progress[2].starts_with("Pulling 3 entries from /sdcard/VFM/logs"));
        assert!(progress[3].starts_with("Pulled 3 files from R58M123"));

        let calls = h.runner.calls();
        assert_eq!(calls[0], vec!["devices"]);
        assert_eq!(calls[1], vec!["-s", "R58M123", "shell", "ls", REMOTE]);
        assert_eq!(&calls[2][..4], &["-s", "R58M123", "pull", REMOTE]);
    }

    #[tokio::test]
    async fn uncounted_pull_still_succeeds() {
        let h = Harness::new(
            ScriptedRunner::default()
                .on("devices", DEVICES, "", 0)
                .on("shell", "a.log\n", "", 0)
                .on("pull", "[100%] /sdcard/VFM/logs/a.log", "", 0),
        );
        let outcome = h.run().await.unwrap();
        assert_eq!(outcome.files_pulled(), FileCount::Unknown);
        assert_eq!(h.pipeline.stage(), Some(PipelineStage::Done));
    }

    #[tokio::test]
    async fn bridge_reported_pull_error_fails_the_run() {
        let h = Harness::new(
            ScriptedRunner::default()
                .on("devices", DEVICES, "", 0)
                .on("shell", "a.log\n", "", 0)
                .on("pull", "", "adb: error: failed to copy 'a.log'", 1),
        );
        let err = h.run().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "pull failed: adb: error: failed to copy 'a.log'"
        );
        assert_eq!(h.pipeline.stage(), Some(PipelineStage::Failed));
        assert_eq!(h.refresh.generation(), 0);
    }

    #[tokio::test]
    async fn unusable_destination_fails_before_pull() {
        let h = Harness::new(
            ScriptedRunner::default()
                .on("devices", DEVICES, "", 0)
                .on("shell", "a.log\n", "", 0),
        );
        let blocker = h.dest.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let request = RetrievalRequest::new(REMOTE, blocker.join("logs"));

        let err = h.pipeline.run(&request, &h.sink).await.unwrap_err();
        assert!(matches!(err, RetrievalError::PullFailed(ref msg) if msg.contains("cannot create")));
        assert_eq!(h.pipeline.stage(), Some(PipelineStage::Failed));
        assert!(!h.runner.called("pull"));
        assert_eq!(h.refresh.generation(), 0);
        assert_eq!(h.sink.error_lines().len(), 1);
    }

    #[tokio::test]
    async fn launch_errors_are_distinguished_by_stage() {
        let not_found = LaunchError::NotFound {
            program: "adb".into(),
        };
        let h = Harness::new(ScriptedRunner::default().fail_launch("devices", not_found.clone()));
        assert!(matches!(h.run().await, Err(RetrievalError::Launch(_))));

        let h = Harness::new(
            ScriptedRunner::default()
                .on("devices", DEVICES, "", 0)
                .on("shell", "a.log\n", "", 0)
                .fail_launch("pull", not_found),
        );
        let err = h.run().await.unwrap_err();
        assert!(matches!(err, RetrievalError::PullFailed(ref msg) if msg.contains("adb not found")));
    }

    #[tokio::test]
    async fn empty_request_is_rejected_without_spawning() {
        let h = Harness::new(ScriptedRunner::default());
        let request = RetrievalRequest::new("  ", h.dest.path());
        let err = h.pipeline.run(&request, &h.sink).await.unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidRequest(_)));
        assert!(h.runner.calls().is_empty());
        assert_eq!(h.pipeline.stage(), None);
    }

    struct GatedRunner {
        gate: Arc<Notify>,
        inner: ScriptedRunner,
    }

    #[async_trait]
    impl ProcessRunner for GatedRunner {
        async fn run(
            &self,
            program: &std::path::Path,
            args: &[&str],
        ) -> Result<ProcessOutput, LaunchError> {
            if args.first() == Some(&"devices") {
                self.gate.notified().await;
            }
            self.inner.run(program, args).await
        }
    }

    #[tokio::test]
    async fn overlapping_runs_are_rejected() {
        let gate = Arc::new(Notify::new());
        let runner = GatedRunner {
            gate: gate.clone(),
            inner: ScriptedRunner::default().on("devices", "List of devices attached\n", "", 0),
        };
        let pipeline = RetrievalPipeline::new(AdbBridge::new(Arc::new(runner), "adb".into()));
        let dest = tempfile::tempdir().unwrap();
        let request = RetrievalRequest::new(REMOTE, dest.path());
        let sink = RecordingSink::default();

        let (first, second) = tokio::join!(pipeline.run(&request, &sink), async {
            assert!(pipeline.is_running());
            let second = pipeline.run(&request, &sink).await;
            gate.notify_one();
            second
        });

        assert!(matches!(second, Err(RetrievalError::AlreadyRunning)));
        assert!(matches!(first, Err(RetrievalError::NoDeviceConnected)));
        assert!(!pipeline.is_running());
        assert_eq!(
            sink.error_lines(),
            vec!["a log retrieval is already running", "no device connected"]
        );
    }

    #[tokio::test]
    async fn finished_runs_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let history = RetrievalHistory::new(dir.path().join("retrievals.json"));
        let runner = Arc::new(
            ScriptedRunner::default()
                .on("devices", DEVICES, "", 0)
                .on("shell", "", "", 0),
        );
        let pipeline = RetrievalPipeline::new(AdbBridge::new(runner, "adb".into()))
            .with_history(history.clone());
        let request = RetrievalRequest::new(REMOTE, dir.path().join("logs"));

        pipeline.run(&request, &TracingSink).await.unwrap();
        let records = history.load().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RetrievalStatus::NothingToPull);
        assert_eq!(records[0].files_pulled, Some(0));
        assert_eq!(records[0].device.as_deref(), Some("R58M123"));
    }

    #[tokio::test]
    async fn stage_subscribers_see_the_terminal_stage() {
        let h = Harness::new(ScriptedRunner::default().on(
            "devices",
            "List of devices attached\n",
            "",
            0,
        ));
        let mut rx = h.pipeline.subscribe_stage();
        h.run().await.unwrap_err();
        assert!(rx.has_changed().unwrap());
        let stage = *rx.borrow_and_update();
        assert!(stage.is_some_and(PipelineStage::is_terminal));
    }
}

//! Device side of the toolkit: spawning `adb`, interpreting its output and
//! running the log retrieval pipeline.

pub mod adb;
pub mod error;
pub mod history;
pub mod ids;
pub mod pipeline;
pub mod process;

pub use adb::{resolve_adb_path, AdbBridge, DeviceHandle, FileCount, PullOutcome, RemoteListing};
pub use error::{AdbError, LaunchError, RetrievalError};
pub use history::{RetrievalHistory, RetrievalRecord, RetrievalStatus};
pub use pipeline::{
    PipelineSink, PipelineStage, RetrievalOutcome, RetrievalPipeline, RetrievalRequest,
    TracingSink,
};
pub use process::{ProcessOutput, ProcessRunner, TokioProcessRunner};

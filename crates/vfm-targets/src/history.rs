use std::{
    io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

const HISTORY_FILE_NAME: &str = "retrievals.json";
const MAX_RECORDS: usize = 50;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStatus {
    Pulled,
    NothingToPull,
    #[default]
    Failed,
}

/// Summary of one finished pipeline run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalRecord {
    pub at_unix_millis: i64,
    pub device: Option<String>,
    pub remote_dir: String,
    pub destination: String,
    pub status: RetrievalStatus,
    /// `None` when adb did not report a count.
    pub files_pulled: Option<u64>,
    pub message: String,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(default)]
struct PersistedHistory {
    records: Vec<RetrievalRecord>,
}

/// Bounded, newest-last log of retrievals stored as JSON.
#[derive(Clone, Debug)]
pub struct RetrievalHistory {
    path: PathBuf,
}

impl RetrievalHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Self {
        Self::new(vfm_util::state_file_path(HISTORY_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Vec<RetrievalRecord> {
        match fs::read_to_string(&self.path).await {
            Ok(data) => match serde_json::from_str::<PersistedHistory>(&data) {
                Ok(parsed) => parsed.records,
                Err(err) => {
                    warn!("Failed to parse {}: {}", self.path.display(), err);
                    Vec::new()
                }
            },
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {}", self.path.display(), err);
                }
                Vec::new()
            }
        }
    }

    pub async fn append(&self, record: RetrievalRecord) -> io::Result<()> {
        let mut records = self.load().await;
        records.push(record);
        if records.len() > MAX_RECORDS {
            let excess = records.len() - MAX_RECORDS;
            records.drain(..excess);
        }
        self.store(&PersistedHistory { records }).await
    }

    pub async fn append_best_effort(&self, record: RetrievalRecord) {
        if let Err(err) = self.append(record).await {
            warn!("Failed to persist retrieval history: {}", err);
        }
    }

    // Same tmp-then-rename scheme as `vfm_util::write_json_atomic`.
    async fn store(&self, history: &PersistedHistory) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(history).map_err(io::Error::other)?;
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &self.path).await
    }
}

//! JSON file run store.
//!
//! One pretty-printed file per run under `<root>/runs/`, named by run id.

use crate::{Result, RunStore};
use salesman_core::{RunId, RunRecord};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// File-based JSON run store.
pub struct JsonRunStore {
    root: PathBuf,
}

impl JsonRunStore {
    /// Open a store rooted at `root`, creating the directory layout.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("runs")).await?;
        Ok(Self { root })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_path(&self, id: RunId) -> PathBuf {
        self.root.join("runs").join(format!("{}.json", id))
    }
}

#[async_trait::async_trait]
impl RunStore for JsonRunStore {
    async fn save_run(&self, record: &RunRecord) -> Result<RunId> {
        let path = self.run_path(record.id);
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json.as_bytes()).await?;
        debug!("Saved run {} to {}", record.id, path.display());
        Ok(record.id)
    }

    async fn load_run(&self, id: RunId) -> Result<Option<RunRecord>> {
        read_json(&self.run_path(id)).await
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = list_dir(&self.root.join("runs")).await?;
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit);
        Ok(runs)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(&path).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => warn!("Skipping unreadable run file {}: {}", path.display(), e),
        }
    }
    Ok(items)
}

//! JSON-file-backed checkpoint store.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::{fs, io::ErrorKind};

use crate::{Checkpoint, CheckpointStore, Result};

pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(checkpoint)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, body).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<Checkpoint>> {
        let body = match fs::read(&self.path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let checkpoint = serde_json::from_slice(&body)?;
        Ok(Some(checkpoint))
    }
}

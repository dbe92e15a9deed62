//! In-memory checkpoint store for tests. No persistence across process
//! restart.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Checkpoint, CheckpointStore, Result};

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    slot: Mutex<Option<Checkpoint>>,
}

impl InMemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(checkpoint.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<Checkpoint>> {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        Ok(slot.clone())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn empty_checkpoint() -> Checkpoint {
        Checkpoint {
            version: crate::CHECKPOINT_VERSION,
            checkpoint_id: "cp-1".to_string(),
            created_at_ms: 0,
            sessions: vec![],
            conversation_bindings: vec![],
            channel_bindings: vec![],
            pending_deliveries: std::collections::HashMap::new(),
        }
    }

    #[tokio::test]
    async fn load_before_save_is_none() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = InMemoryCheckpointStore::new();
        store.save(&empty_checkpoint()).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.checkpoint_id, "cp-1");
    }

    #[tokio::test]
    async fn save_overwrites_previous() {
        let store = InMemoryCheckpointStore::new();
        store.save(&empty_checkpoint()).await.unwrap();
        let mut second = empty_checkpoint();
        second.checkpoint_id = "cp-2".to_string();
        store.save(&second).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.checkpoint_id, "cp-2");
    }
}

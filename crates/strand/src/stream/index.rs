//! Indexing seam for completed blocks.
//!
//! The augmenter hands every completed block (with its augment) to a
//! [`BlockIndex`]. Failures are logged by the caller and never reach the
//! event stream.

use async_trait::async_trait;
use strand_protocol::{Augment, CompletedBlock};
use tokio::sync::RwLock;

/// Receives completed blocks for search or persistence.
#[async_trait]
pub trait BlockIndex: Send + Sync {
    async fn record(
        &self,
        session_id: &str,
        block: &CompletedBlock,
        augment: Option<&Augment>,
    ) -> anyhow::Result<()>;
}

/// Index that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndex;

#[async_trait]
impl BlockIndex for NoopIndex {
    async fn record(
        &self,
        _session_id: &str,
        _block: &CompletedBlock,
        _augment: Option<&Augment>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedBlock {
    pub session_id: String,
    pub block: CompletedBlock,
    pub augment: Option<Augment>,
}

/// In-memory index, mostly useful in tests and for replay summaries.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: RwLock<Vec<IndexedBlock>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<IndexedBlock> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl BlockIndex for MemoryIndex {
    async fn record(
        &self,
        session_id: &str,
        block: &CompletedBlock,
        augment: Option<&Augment>,
    ) -> anyhow::Result<()> {
        self.entries.write().await.push(IndexedBlock {
            session_id: session_id.to_string(),
            block: block.clone(),
            augment: augment.cloned(),
        });
        Ok(())
    }
}

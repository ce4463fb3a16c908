//! Watermark store implementations
//!
//! The object-storage store keeps one JSON document per entity type at
//! `state/{source}/{entity_type}.json`. A single object PUT is atomic, so a
//! reader sees either the previous document or the new one.

use super::types::Watermark;
use crate::error::{Error, Result};
use crate::output::CloudDestination;
use crate::types::Source;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Key of the watermark document of one entity type
pub fn watermark_key(source: Source, entity_type: &str) -> String {
    format!("state/{source}/{entity_type}.json")
}

/// Narrow get/set/clear interface over watermark persistence
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Stored watermark, `None` means initial sync
    async fn get(&self, source: Source, entity_type: &str) -> Result<Option<Watermark>>;

    /// Replace the watermark atomically
    async fn set(&self, source: Source, watermark: &Watermark) -> Result<()>;

    /// Remove the watermark so the next run is an initial sync
    async fn clear(&self, source: Source, entity_type: &str) -> Result<()>;
}

// ============================================================================
// Object storage
// ============================================================================

/// Watermarks stored next to the landing data
#[derive(Debug, Clone)]
pub struct ObjectWatermarkStore {
    destination: CloudDestination,
}

impl ObjectWatermarkStore {
    pub fn new(destination: CloudDestination) -> Self {
        Self { destination }
    }
}

#[async_trait]
impl WatermarkStore for ObjectWatermarkStore {
    async fn get(&self, source: Source, entity_type: &str) -> Result<Option<Watermark>> {
        let key = watermark_key(source, entity_type);
        let Some(bytes) = self.destination.get(&key).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::state(format!("Failed to parse {key}: {e}")))
    }

    async fn set(&self, source: Source, watermark: &Watermark) -> Result<()> {
        let key = watermark_key(source, &watermark.entity_type);
        let contents = serde_json::to_vec_pretty(watermark)
            .map_err(|e| Error::state(format!("Failed to serialize watermark: {e}")))?;
        self.destination
            .put(&key, Bytes::from(contents))
            .await
            .map_err(|e| Error::state(format!("Failed to write {key}: {e}")))?;
        debug!(%source, entity = %watermark.entity_type, cursor = %watermark.cursor, "Watermark saved");
        Ok(())
    }

    async fn clear(&self, source: Source, entity_type: &str) -> Result<()> {
        let key = watermark_key(source, entity_type);
        self.destination
            .delete(&key)
            .await
            .map_err(|e| Error::state(format!("Failed to remove {key}: {e}")))?;
        debug!(%source, entity = entity_type, "Watermark cleared");
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local store for tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct MemoryWatermarkStore {
    entries: Arc<RwLock<HashMap<(Source, String), Watermark>>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored watermarks
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn get(&self, source: Source, entity_type: &str) -> Result<Option<Watermark>> {
        Ok(self
            .entries
            .read()
            .await
            .get(&(source, entity_type.to_string()))
            .cloned())
    }

    async fn set(&self, source: Source, watermark: &Watermark) -> Result<()> {
        self.entries
            .write()
            .await
            .insert((source, watermark.entity_type.clone()), watermark.clone());
        Ok(())
    }

    async fn clear(&self, source: Source, entity_type: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .remove(&(source, entity_type.to_string()));
        Ok(())
    }
}

use rustc_hash::FxHashMap;
use strata_protocol::ChunkPos;
use thiserror::Error;
use tracing::debug;

use crate::{ChunkRecord, RegionError, RegionFolder};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error("failed to encode or decode chunk record: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Somewhere chunk records are persisted.
pub trait ChunkStorage: Send {
    fn read(&mut self, pos: ChunkPos) -> Result<Option<ChunkRecord>, StorageError>;

    fn write(&mut self, record: &ChunkRecord) -> Result<(), StorageError>;

    /// Returns whether a record was removed.
    fn delete(&mut self, pos: ChunkPos) -> Result<bool, StorageError>;
}

impl ChunkStorage for RegionFolder {
    fn read(&mut self, pos: ChunkPos) -> Result<Option<ChunkRecord>, StorageError> {
        let Some(payload) = self.read_payload(pos)? else {
            return Ok(None);
        };

        debug!(?pos, len = payload.bytes.len(), written_at = payload.written_at, "read chunk");
        Ok(Some(ChunkRecord::from_bytes(&payload.bytes)?))
    }

    fn write(&mut self, record: &ChunkRecord) -> Result<(), StorageError> {
        let bytes = record.to_bytes()?;
        self.write_payload(record.pos, &bytes)?;
        Ok(())
    }

    fn delete(&mut self, pos: ChunkPos) -> Result<bool, StorageError> {
        Ok(self.delete_payload(pos)?)
    }
}

/// Keeps encoded records in memory. Useful for tests and throwaway worlds.
#[derive(Clone, Default, Debug)]
pub struct MemoryStorage {
    records: FxHashMap<ChunkPos, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, pos: ChunkPos) -> bool {
        self.records.contains_key(&pos)
    }
}

impl ChunkStorage for MemoryStorage {
    fn read(&mut self, pos: ChunkPos) -> Result<Option<ChunkRecord>, StorageError> {
        self.records
            .get(&pos)
            .map(|bytes| ChunkRecord::from_bytes(bytes))
            .transpose()
            .map_err(StorageError::from)
    }

    fn write(&mut self, record: &ChunkRecord) -> Result<(), StorageError> {
        self.records.insert(record.pos, record.to_bytes()?);
        Ok(())
    }

    fn delete(&mut self, pos: ChunkPos) -> Result<bool, StorageError> {
        Ok(self.records.remove(&pos).is_some())
    }
}

use serde::{Deserialize, Serialize};
use strata_protocol::{BlockPos, ChunkPos};

/// An axis aligned box in block coordinates, inclusive on both ends.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: BlockPos,
    pub max: BlockPos,
}

impl BoundingBox {
    pub fn new(min: BlockPos, max: BlockPos) -> Self {
        Self { min, max }
    }

    pub fn intersects_chunk(&self, pos: ChunkPos) -> bool {
        let (x0, z0) = (pos.min_block_x(), pos.min_block_z());
        self.min.x <= x0 + 15 && self.max.x >= x0 && self.min.z <= z0 + 15 && self.max.z >= z0
    }
}

/// The origin record of a structure, stored in the chunk it starts in.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct StructureStart {
    /// Registry name of the structure.
    pub structure: String,
    pub chunk: ChunkPos,
    pub bounding_box: BoundingBox,
    /// How many chunks reference this start.
    pub references: u32,
    /// Serialized pieces. Opaque to chunk storage.
    pub pieces: Vec<u8>,
}

use std::fmt;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::{BlockPos, ChunkPos, Decode, Encode};

/// The position of a 16x16x16 chunk section.
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize,
)]
pub struct SectionPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl SectionPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn of(chunk: ChunkPos, y: i32) -> Self {
        Self::new(chunk.x, y, chunk.z)
    }

    pub const fn chunk(self) -> ChunkPos {
        ChunkPos::new(self.x, self.z)
    }

    pub const fn min_block_y(self) -> i32 {
        self.y * 16
    }

    /// Converts a block Y coordinate into a section Y coordinate.
    pub const fn block_to_section(y: i32) -> i32 {
        y >> 4
    }
}

impl fmt::Display for SectionPos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&(self.x, self.y, self.z), f)
    }
}

impl Encode for SectionPos {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.x.encode(&mut w)?;
        self.y.encode(&mut w)?;
        self.z.encode(w)
    }
}

impl Decode<'_> for SectionPos {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self::new(i32::decode(r)?, i32::decode(r)?, i32::decode(r)?))
    }
}

impl From<BlockPos> for SectionPos {
    fn from(pos: BlockPos) -> Self {
        Self {
            x: pos.x.div_euclid(16),
            y: pos.y.div_euclid(16),
            z: pos.z.div_euclid(16),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_of_negative_block() {
        let pos = SectionPos::from(BlockPos::new(-1, -64, 31));
        assert_eq!(pos, SectionPos::new(-1, -4, 1));
        assert_eq!(pos.chunk(), ChunkPos::new(-1, 1));
        assert_eq!(SectionPos::block_to_section(-1), -1);
    }
}

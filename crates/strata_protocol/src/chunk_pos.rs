use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::block_pos::BlockPos;
use crate::{Decode, Encode};

/// The X and Z position of a chunk.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash, Debug, Serialize, Deserialize,
)]
pub struct ChunkPos {
    /// The X position of the chunk.
    pub x: i32,
    /// The Z position of the chunk.
    pub z: i32,
}

impl ChunkPos {
    /// Constructs a new chunk position.
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub const fn from_block_pos(pos: BlockPos) -> Self {
        Self::new(pos.x.div_euclid(16), pos.z.div_euclid(16))
    }

    /// Packs this position into a single `i64` with X in the low half and Z
    /// in the high half.
    pub const fn to_long(self) -> i64 {
        (self.x as u32 as i64) | ((self.z as u32 as i64) << 32)
    }

    pub const fn from_long(packed: i64) -> Self {
        Self::new(packed as i32, (packed >> 32) as i32)
    }

    pub const fn distance_squared(self, other: Self) -> u64 {
        let diff_x = other.x as i64 - self.x as i64;
        let diff_z = other.z as i64 - self.z as i64;

        (diff_x * diff_x + diff_z * diff_z) as u64
    }

    /// The Chebyshev (chessboard) distance between two chunk positions.
    pub const fn chessboard_distance(self, other: Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dz = self.z.abs_diff(other.z);

        if dx > dz {
            dx
        } else {
            dz
        }
    }

    pub const fn min_block_x(self) -> i32 {
        self.x * 16
    }

    pub const fn min_block_z(self) -> i32 {
        self.z * 16
    }

    /// Iterates every position in the square of side `2 * radius + 1`
    /// centered on this one, row by row with Z increasing slowest.
    pub fn square(self, radius: u32) -> impl Iterator<Item = ChunkPos> {
        let r = radius as i32;
        (-r..=r).flat_map(move |dz| (-r..=r).map(move |dx| ChunkPos::new(self.x + dx, self.z + dz)))
    }
}

impl Encode for ChunkPos {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        self.x.encode(&mut w)?;
        self.z.encode(w)
    }
}

impl Decode<'_> for ChunkPos {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self::new(i32::decode(r)?, i32::decode(r)?))
    }
}

impl From<(i32, i32)> for ChunkPos {
    fn from((x, z): (i32, i32)) -> Self {
        Self { x, z }
    }
}

impl From<ChunkPos> for (i32, i32) {
    fn from(pos: ChunkPos) -> Self {
        (pos.x, pos.z)
    }
}

impl From<[i32; 2]> for ChunkPos {
    fn from([x, z]: [i32; 2]) -> Self {
        Self { x, z }
    }
}

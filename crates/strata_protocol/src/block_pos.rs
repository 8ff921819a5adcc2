use std::fmt;

use serde::{Deserialize, Serialize};

/// Represents an absolute block position in world space.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    /// Constructs a new block position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn offset(self, x: i32, y: i32, z: i32) -> Self {
        Self::new(self.x + x, self.y + y, self.z + z)
    }

    /// The position directly below this one.
    pub const fn below(self) -> Self {
        self.offset(0, -1, 0)
    }

    /// Offsets of this position within its 16x16 chunk column.
    pub const fn local_xz(self) -> (u32, u32) {
        (self.x.rem_euclid(16) as u32, self.z.rem_euclid(16) as u32)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&(self.x, self.y, self.z), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_offsets_wrap_negative_coordinates() {
        assert_eq!(BlockPos::new(-1, 5, -17).local_xz(), (15, 15));
        assert_eq!(BlockPos::new(16, 5, 3).local_xz(), (0, 3));
    }
}

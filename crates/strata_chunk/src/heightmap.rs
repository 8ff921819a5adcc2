//! Per-column height tracking.
//!
//! A heightmap stores, for each of the 256 columns of a chunk, the lowest Y
//! above every block matching the heightmap's predicate (the "first
//! available" height). `min_y` means the column has no matching block.

use strata_registry::{BlockRegistry, BlockState};

use crate::bit_storage::{BitStorage, BitStorageError};
use crate::paletted_container::ceil_log2;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum HeightmapKind {
    WorldSurfaceWg,
    WorldSurface,
    OceanFloorWg,
    OceanFloor,
    MotionBlocking,
    MotionBlockingNoLeaves,
}

impl HeightmapKind {
    pub const ALL: [Self; 6] = [
        Self::WorldSurfaceWg,
        Self::WorldSurface,
        Self::OceanFloorWg,
        Self::OceanFloor,
        Self::MotionBlocking,
        Self::MotionBlockingNoLeaves,
    ];

    /// Kinds maintained while terrain is generated.
    pub const PRE_FEATURES: &'static [Self] = &[Self::OceanFloorWg, Self::WorldSurfaceWg];

    /// Kinds maintained from the feature stage onwards.
    pub const POST_FEATURES: &'static [Self] = &[
        Self::OceanFloor,
        Self::WorldSurface,
        Self::MotionBlocking,
        Self::MotionBlockingNoLeaves,
    ];

    pub const fn serialization_key(self) -> &'static str {
        match self {
            Self::WorldSurfaceWg => "WORLD_SURFACE_WG",
            Self::WorldSurface => "WORLD_SURFACE",
            Self::OceanFloorWg => "OCEAN_FLOOR_WG",
            Self::OceanFloor => "OCEAN_FLOOR",
            Self::MotionBlocking => "MOTION_BLOCKING",
            Self::MotionBlockingNoLeaves => "MOTION_BLOCKING_NO_LEAVES",
        }
    }

    pub fn from_serialization_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.serialization_key() == key)
    }

    /// Whether the kind is only meaningful during generation.
    pub const fn is_worldgen_only(self) -> bool {
        matches!(self, Self::WorldSurfaceWg | Self::OceanFloorWg)
    }

    /// Whether `state` counts as an obstruction for this kind.
    pub fn is_opaque(self, blocks: &BlockRegistry, state: BlockState) -> bool {
        let info = blocks.info(state);
        let motion_blocking = info.flags.blocks_motion() || !info.fluid.is_empty();

        match self {
            Self::WorldSurfaceWg | Self::WorldSurface => !info.flags.air(),
            Self::OceanFloorWg | Self::OceanFloor => info.flags.blocks_motion(),
            Self::MotionBlocking => motion_blocking,
            Self::MotionBlockingNoLeaves => motion_blocking && !info.flags.leaves(),
        }
    }
}

/// Computes a column's new first available height after the block at
/// `changed_y` was replaced.
///
/// `opaque` tells whether the new block matches the heightmap predicate and
/// `opaque_at` checks the blocks below when the top block was removed.
/// Returns `None` if the height is unchanged.
///
/// Only changes at or directly below the current top can move it, so the
/// column is rescanned only when the top block itself stops matching.
pub fn update_column(
    first_available: i32,
    changed_y: i32,
    opaque: bool,
    min_y: i32,
    mut opaque_at: impl FnMut(i32) -> bool,
) -> Option<i32> {
    if changed_y <= first_available - 2 {
        return None;
    }

    if opaque {
        return (changed_y >= first_available).then_some(changed_y + 1);
    }

    if changed_y == first_available - 1 {
        let top = (min_y..changed_y)
            .rev()
            .find(|&y| opaque_at(y))
            .map_or(min_y, |y| y + 1);
        return Some(top);
    }

    None
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Heightmap {
    kind: HeightmapKind,
    data: BitStorage,
    min_y: i32,
}

impl Heightmap {
    pub fn new(kind: HeightmapKind, min_y: i32, height: u32) -> Self {
        Self {
            kind,
            data: BitStorage::new(Self::bits_for(height), 256),
            min_y,
        }
    }

    fn bits_for(height: u32) -> u8 {
        ceil_log2(height as usize + 1)
    }

    /// Restores a heightmap from its packed words.
    pub fn from_raw(
        kind: HeightmapKind,
        min_y: i32,
        height: u32,
        raw: Vec<u64>,
    ) -> Result<Self, BitStorageError> {
        Ok(Self {
            kind,
            data: BitStorage::from_raw(Self::bits_for(height), 256, raw)?,
            min_y,
        })
    }

    pub fn kind(&self) -> HeightmapKind {
        self.kind
    }

    #[inline]
    fn index(x: u32, z: u32) -> usize {
        debug_assert!(x < 16 && z < 16, "column ({x}, {z}) is out of bounds");
        (x + z * 16) as usize
    }

    pub fn first_available(&self, x: u32, z: u32) -> i32 {
        self.data.get(Self::index(x, z)) as i32 + self.min_y
    }

    pub fn highest_taken(&self, x: u32, z: u32) -> i32 {
        self.first_available(x, z) - 1
    }

    pub fn set_height(&mut self, x: u32, z: u32, y: i32) {
        self.data.set(Self::index(x, z), (y - self.min_y) as u32);
    }

    /// Applies a block change. `state_at` reads the chunk's current block at
    /// a Y in the same column. Returns whether the height changed.
    pub fn update(
        &mut self,
        blocks: &BlockRegistry,
        x: u32,
        y: i32,
        z: u32,
        state: BlockState,
        mut state_at: impl FnMut(i32) -> BlockState,
    ) -> bool {
        let kind = self.kind;
        let new = update_column(
            self.first_available(x, z),
            y,
            kind.is_opaque(blocks, state),
            self.min_y,
            |y| kind.is_opaque(blocks, state_at(y)),
        );

        match new {
            Some(top) => {
                self.set_height(x, z, top);
                true
            }
            None => false,
        }
    }

    pub fn raw(&self) -> &[u64] {
        self.data.raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placing_above_top_raises_it() {
        assert_eq!(update_column(10, 15, true, 0, |_| unreachable!()), Some(16));
        assert_eq!(update_column(10, 10, true, 0, |_| unreachable!()), Some(11));
    }

    #[test]
    fn changes_well_below_top_are_ignored() {
        assert_eq!(update_column(10, 8, true, 0, |_| unreachable!()), None);
        assert_eq!(update_column(10, 3, false, 0, |_| unreachable!()), None);
    }

    #[test]
    fn placing_just_below_top_keeps_it() {
        assert_eq!(update_column(10, 9, true, 0, |_| unreachable!()), None);
    }

    #[test]
    fn removing_top_rescans_down() {
        let column = [true, true, false, true, false, false];
        let mut checked = vec![];

        let top = update_column(6, 5, false, 0, |y| {
            checked.push(y);
            column[y as usize]
        });

        assert_eq!(top, Some(4));
        assert_eq!(checked, [4, 3]);
    }

    #[test]
    fn removing_last_block_empties_column() {
        assert_eq!(update_column(-63, -64, false, -64, |_| false), Some(-64));
    }

    #[test]
    fn predicates() {
        let blocks = BlockRegistry::default();
        let state = |n| blocks.state(n).unwrap();

        let water = state("water");
        let leaves = state("oak_leaves");
        let torch = state("torch");

        assert!(HeightmapKind::WorldSurface.is_opaque(&blocks, torch));
        assert!(!HeightmapKind::MotionBlocking.is_opaque(&blocks, torch));
        assert!(HeightmapKind::MotionBlocking.is_opaque(&blocks, water));
        assert!(!HeightmapKind::OceanFloor.is_opaque(&blocks, water));
        assert!(HeightmapKind::MotionBlocking.is_opaque(&blocks, leaves));
        assert!(!HeightmapKind::MotionBlockingNoLeaves.is_opaque(&blocks, leaves));
        assert!(!HeightmapKind::WorldSurfaceWg.is_opaque(&blocks, blocks.air()));
    }

    #[test]
    fn heightmap_storage() {
        let mut map = Heightmap::new(HeightmapKind::WorldSurface, -64, 384);
        // 385 distinct heights need 9 bits: 7 per word.
        assert_eq!(map.raw().len(), 256_usize.div_ceil(7));
        assert_eq!(map.first_available(3, 4), -64);

        map.set_height(3, 4, 320);
        assert_eq!(map.first_available(3, 4), 320);
        assert_eq!(map.highest_taken(3, 4), 319);

        let restored = Heightmap::from_raw(
            HeightmapKind::WorldSurface,
            -64,
            384,
            map.raw().to_vec(),
        )
        .unwrap();
        assert_eq!(restored, map);
    }

    #[test]
    fn serialization_keys() {
        for kind in HeightmapKind::ALL {
            assert_eq!(
                HeightmapKind::from_serialization_key(kind.serialization_key()),
                Some(kind)
            );
        }
        assert_eq!(HeightmapKind::from_serialization_key("LIGHT"), None);
    }
}

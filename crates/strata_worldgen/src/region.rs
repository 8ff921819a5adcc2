use std::ops::Deref;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use strata_chunk::{ChunkAccess, ChunkStatus, HeightmapKind, LevelChunkSection, SectionAccess};
use strata_protocol::{BlockPos, ChunkPos, SectionPos};
use strata_registry::{BiomeId, BlockState, FluidKind};
use tracing::error;

use crate::ChunkHandle;

enum Slot<'a> {
    Read(RwLockReadGuard<'a, ChunkAccess>),
    Write(RwLockWriteGuard<'a, ChunkAccess>),
}

impl Deref for Slot<'_> {
    type Target = ChunkAccess;

    fn deref(&self) -> &Self::Target {
        match self {
            Slot::Read(guard) => guard,
            Slot::Write(guard) => guard,
        }
    }
}

/// The side length of a square window of `len` chunks.
#[track_caller]
pub(crate) fn window_side(len: usize) -> usize {
    let mut side = 0;
    while (side + 1) * (side + 1) <= len {
        side += 1;
    }
    assert!(
        side * side == len && side % 2 == 1,
        "a window of {len} chunks is not an odd square"
    );
    side
}

/// The square of chunks a generation stage works on, locked for the
/// duration of the stage.
///
/// The center chunk and every chunk within the stage's write radius are
/// locked for writing. The rest are locked for reading. Locks are always
/// taken in chunk position order so overlapping regions on different threads
/// cannot deadlock.
pub struct WorldGenRegion<'a> {
    status: ChunkStatus,
    center: ChunkPos,
    radius: u32,
    write_radius: Option<u32>,
    chunks: Vec<Slot<'a>>,
}

impl<'a> WorldGenRegion<'a> {
    /// Locks `window`, a square of chunks laid out row by row with Z
    /// increasing slowest, centered on the chunk `status` is generated for.
    ///
    /// # Panics
    ///
    /// Panics if the window is not an odd square or a chunk is not where the
    /// layout says it should be.
    #[track_caller]
    pub fn lock(status: ChunkStatus, window: &'a [ChunkHandle]) -> Self {
        let side = window_side(window.len());
        let radius = (side / 2) as u32;
        let center = window[window.len() / 2].read().pos();
        let write_radius = status.write_radius();

        let pos_of = |i: usize| {
            ChunkPos::new(
                center.x - radius as i32 + (i % side) as i32,
                center.z - radius as i32 + (i / side) as i32,
            )
        };

        let mut order: Vec<usize> = (0..window.len()).collect();
        order.sort_unstable_by_key(|&i| pos_of(i));

        let mut locked: Vec<(usize, Slot<'a>)> = order
            .into_iter()
            .map(|i| {
                let distance = pos_of(i).chessboard_distance(center);
                let writable = distance == 0 || write_radius.is_some_and(|w| distance <= w);
                let slot = if writable {
                    Slot::Write(window[i].write())
                } else {
                    Slot::Read(window[i].read())
                };
                assert_eq!(
                    slot.pos(),
                    pos_of(i),
                    "chunk window for {center:?} is out of order"
                );
                (i, slot)
            })
            .collect();

        locked.sort_unstable_by_key(|(i, _)| *i);

        Self {
            status,
            center,
            radius,
            write_radius,
            chunks: locked.into_iter().map(|(_, slot)| slot).collect(),
        }
    }

    pub fn status(&self) -> ChunkStatus {
        self.status
    }

    pub fn center_pos(&self) -> ChunkPos {
        self.center
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    fn index_of(&self, pos: ChunkPos) -> Option<usize> {
        let r = self.radius as i32;
        let dx = pos.x - self.center.x + r;
        let dz = pos.z - self.center.z + r;
        let side = 2 * r + 1;

        ((0..side).contains(&dx) && (0..side).contains(&dz)).then(|| (dz * side + dx) as usize)
    }

    pub fn center(&self) -> &ChunkAccess {
        &self.chunks[self.chunks.len() / 2]
    }

    pub fn center_mut(&mut self) -> &mut ChunkAccess {
        let idx = self.chunks.len() / 2;
        match &mut self.chunks[idx] {
            Slot::Write(guard) => guard,
            Slot::Read(_) => unreachable!("the center chunk is always write locked"),
        }
    }

    pub fn chunk(&self, pos: ChunkPos) -> Option<&ChunkAccess> {
        self.index_of(pos).map(|i| &*self.chunks[i])
    }

    /// The chunk at `pos` if this region is allowed to modify it.
    pub fn chunk_mut(&mut self, pos: ChunkPos) -> Option<&mut ChunkAccess> {
        let idx = self.index_of(pos)?;
        match &mut self.chunks[idx] {
            Slot::Write(guard) => Some(&mut **guard),
            Slot::Read(_) => None,
        }
    }

    pub fn chunks(&self) -> impl Iterator<Item = &ChunkAccess> + '_ {
        self.chunks.iter().map(|slot| &**slot)
    }

    /// Whether blocks in `pos` may be written by this stage.
    pub fn is_writable(&self, pos: ChunkPos) -> bool {
        self.index_of(pos).is_some()
            && self
                .write_radius
                .is_some_and(|w| pos.chessboard_distance(self.center) <= w)
    }

    pub fn block_state(&self, pos: BlockPos) -> BlockState {
        match self.chunk(ChunkPos::from_block_pos(pos)) {
            Some(chunk) => chunk.block_state(pos),
            None => self.center().blocks().void_air(),
        }
    }

    pub fn fluid_kind(&self, pos: BlockPos) -> FluidKind {
        let state = self.block_state(pos);
        self.center().blocks().fluid(state)
    }

    /// Sets a block in a chunk within the stage's write radius. Writes
    /// anywhere else are dropped and logged. Returns whether the block
    /// changed.
    pub fn set_block_state(&mut self, pos: BlockPos, state: BlockState, moved: bool) -> bool {
        let chunk_pos = ChunkPos::from_block_pos(pos);
        if !self.is_writable(chunk_pos) {
            error!(
                ?pos,
                chunk = ?chunk_pos,
                status = %self.status,
                center = ?self.center,
                "detected a block write outside the write radius of the stage"
            );
            return false;
        }

        self.chunk_mut(chunk_pos)
            .and_then(|chunk| chunk.set_block_state(pos, state, moved))
            .is_some()
    }

    /// The first free Y above the column at `x`, `z` according to a primed
    /// heightmap. Columns without the heightmap report the bottom of the
    /// world.
    pub fn height(&self, kind: HeightmapKind, x: i32, z: i32) -> i32 {
        let pos = BlockPos::new(x, 0, z);
        let chunk = self
            .chunk(ChunkPos::from_block_pos(pos))
            .unwrap_or_else(|| self.center());
        let (lx, lz) = pos.local_xz();

        chunk
            .heightmap(kind)
            .map_or(chunk.min_y(), |map| map.first_available(lx, lz))
    }

    /// The biome at absolute quart coordinates.
    pub fn noise_biome(&self, quart_x: i32, quart_y: i32, quart_z: i32) -> BiomeId {
        let pos = ChunkPos::new(quart_x >> 2, quart_z >> 2);
        self.chunk(pos)
            .unwrap_or_else(|| self.center())
            .noise_biome(quart_x, quart_y, quart_z)
    }
}

impl SectionAccess for WorldGenRegion<'_> {
    fn section_at(&mut self, pos: SectionPos) -> Option<&mut LevelChunkSection> {
        if !self.is_writable(pos.chunk()) {
            return None;
        }
        self.chunk_mut(pos.chunk())?.section_at(pos)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::RwLock;
    use strata_chunk::BulkSectionAccess;
    use strata_registry::Registries;

    use super::*;

    fn window(center: ChunkPos, radius: u32) -> Vec<ChunkHandle> {
        let registries = Registries::default();
        center
            .square(radius)
            .map(|pos| Arc::new(RwLock::new(ChunkAccess::new(pos, registries.clone(), 0, 32))))
            .collect()
    }

    #[test]
    fn window_sides() {
        assert_eq!(window_side(1), 1);
        assert_eq!(window_side(9), 3);
        assert_eq!(window_side(289), 17);
    }

    #[test]
    #[should_panic]
    fn even_windows_are_rejected() {
        window_side(4);
    }

    #[test]
    fn writes_are_limited_to_the_write_radius() {
        let chunks = window(ChunkPos::new(5, 5), 1);
        let stone = chunks[0].read().blocks().state("stone").unwrap();

        {
            let mut region = WorldGenRegion::lock(ChunkStatus::Features, &chunks);
            assert!(region.set_block_state(BlockPos::new(80, 3, 80), stone, false));
            assert!(region.set_block_state(BlockPos::new(64, 3, 95), stone, false));
            assert!(!region.set_block_state(BlockPos::new(200, 3, 80), stone, false));
        }
        assert_eq!(chunks[4].read().block_state(BlockPos::new(80, 3, 80)), stone);
        assert_eq!(chunks[3].read().block_state(BlockPos::new(64, 3, 95)), stone);

        let mut region = WorldGenRegion::lock(ChunkStatus::Surface, &chunks);
        assert!(region.is_writable(ChunkPos::new(5, 5)));
        assert!(!region.is_writable(ChunkPos::new(4, 5)));
        assert!(!region.set_block_state(BlockPos::new(64, 4, 95), stone, false));
        assert!(region.chunk_mut(ChunkPos::new(4, 5)).is_none());
        assert_eq!(region.block_state(BlockPos::new(64, 3, 95)), stone);
        assert_eq!(
            region.block_state(BlockPos::new(0, 3, 0)),
            region.center().blocks().void_air()
        );
    }

    #[test]
    fn read_only_stages_reject_every_block_write() {
        let chunks = window(ChunkPos::new(0, 0), 0);
        let stone = chunks[0].read().blocks().state("stone").unwrap();

        let mut region = WorldGenRegion::lock(ChunkStatus::Spawn, &chunks);
        assert!(!region.set_block_state(BlockPos::new(1, 1, 1), stone, false));
        region.center_mut().set_inhabited_time(7);
        drop(region);

        assert_eq!(chunks[0].read().inhabited_time(), 7);
    }

    #[test]
    fn bulk_access_through_a_region() {
        let chunks = window(ChunkPos::new(0, 0), 1);
        let stone = chunks[0].read().blocks().state("stone").unwrap();

        let mut region = WorldGenRegion::lock(ChunkStatus::Features, &chunks);
        {
            let mut bulk = BulkSectionAccess::new(&mut region);
            for x in -4..20 {
                bulk.set_block_state(BlockPos::new(x, 17, 3), stone);
            }
            assert_eq!(bulk.acquired().len(), 3);
        }
        assert_eq!(region.block_state(BlockPos::new(-4, 17, 3)), stone);
        assert_eq!(region.block_state(BlockPos::new(19, 17, 3)), stone);
    }
}

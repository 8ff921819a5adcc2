//! Scoped access to many sections at once.

use strata_protocol::{BlockPos, SectionPos};
use strata_registry::BlockState;

use crate::chunk::ChunkAccess;
use crate::section::LevelChunkSection;

/// Something that can resolve sections by position.
pub trait SectionAccess {
    fn section_at(&mut self, pos: SectionPos) -> Option<&mut LevelChunkSection>;

    /// Takes ownership of a section for a multi step edit. Returns `false` if
    /// the section does not exist.
    fn acquire_section(&mut self, pos: SectionPos) -> bool {
        match self.section_at(pos) {
            Some(section) => {
                section.acquire();
                true
            }
            None => false,
        }
    }

    fn release_section(&mut self, pos: SectionPos) {
        if let Some(section) = self.section_at(pos) {
            section.release();
        }
    }
}

impl SectionAccess for ChunkAccess {
    fn section_at(&mut self, pos: SectionPos) -> Option<&mut LevelChunkSection> {
        if pos.chunk() != self.pos() {
            return None;
        }

        let idx = usize::try_from(pos.y - self.min_section()).ok()?;
        self.section_mut(idx)
    }
}

/// Acquires each section the first time one of its blocks is touched and
/// releases all of them when dropped.
pub struct BulkSectionAccess<'a, A: SectionAccess + ?Sized> {
    access: &'a mut A,
    acquired: Vec<SectionPos>,
    last: Option<SectionPos>,
}

impl<'a, A: SectionAccess + ?Sized> BulkSectionAccess<'a, A> {
    pub fn new(access: &'a mut A) -> Self {
        Self {
            access,
            acquired: vec![],
            last: None,
        }
    }

    /// The section containing `pos`, acquired on first use.
    pub fn section(&mut self, pos: BlockPos) -> Option<&mut LevelChunkSection> {
        let section_pos = SectionPos::from(pos);

        if self.last != Some(section_pos) {
            if !self.acquired.contains(&section_pos) {
                if !self.access.acquire_section(section_pos) {
                    return None;
                }
                self.acquired.push(section_pos);
            }
            self.last = Some(section_pos);
        }

        self.access.section_at(section_pos)
    }

    pub fn block_state(&mut self, pos: BlockPos) -> Option<BlockState> {
        let (x, z) = pos.local_xz();
        self.section(pos)
            .map(|s| s.block_state(x, (pos.y & 15) as u32, z))
    }

    /// Writes a block directly into its section. Heightmaps and block
    /// entities of the owning chunk are not updated.
    pub fn set_block_state(&mut self, pos: BlockPos, state: BlockState) -> Option<BlockState> {
        let (x, z) = pos.local_xz();
        self.section(pos)
            .map(|s| s.set_block_state_unchecked(x, (pos.y & 15) as u32, z, state))
    }

    pub fn acquired(&self) -> &[SectionPos] {
        &self.acquired
    }
}

impl<A: SectionAccess + ?Sized> Drop for BulkSectionAccess<'_, A> {
    fn drop(&mut self) {
        for pos in self.acquired.drain(..) {
            self.access.release_section(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use strata_protocol::ChunkPos;
    use strata_registry::Registries;

    use super::*;

    #[derive(Default)]
    struct CountingStore {
        sections: BTreeMap<SectionPos, LevelChunkSection>,
        acquires: Vec<SectionPos>,
        releases: Vec<SectionPos>,
    }

    impl SectionAccess for CountingStore {
        fn section_at(&mut self, pos: SectionPos) -> Option<&mut LevelChunkSection> {
            self.sections.get_mut(&pos)
        }

        fn acquire_section(&mut self, pos: SectionPos) -> bool {
            self.acquires.push(pos);
            let section = self.section_at(pos).unwrap();
            section.acquire();
            true
        }

        fn release_section(&mut self, pos: SectionPos) {
            self.releases.push(pos);
            self.section_at(pos).unwrap().release();
        }
    }

    #[test]
    fn acquires_and_releases_are_balanced() {
        let registries = Registries::default();
        let stone = registries.blocks.state("stone").unwrap();

        let mut store = CountingStore::default();
        for pos in [
            SectionPos::new(0, 0, 0),
            SectionPos::new(0, 1, 0),
            SectionPos::new(1, 0, 0),
        ] {
            store.sections.insert(pos, LevelChunkSection::new(&registries));
        }

        let positions = [
            BlockPos::new(1, 2, 3),
            BlockPos::new(17, 2, 3),
            BlockPos::new(1, 20, 3),
            BlockPos::new(2, 2, 3),
            BlockPos::new(18, 5, 0),
        ];

        {
            let mut bulk = BulkSectionAccess::new(&mut store);
            for pos in positions {
                assert!(bulk.set_block_state(pos, stone).is_some());
            }
            assert_eq!(bulk.block_state(positions[0]), Some(stone));
            assert_eq!(bulk.acquired().len(), 3);
        }

        assert_eq!(store.acquires.len(), 3);
        assert_eq!(store.releases.len(), 3);
        assert_eq!(store.acquires, store.releases);

        // Released sections can be taken again from another thread.
        let section = store.sections.remove(&SectionPos::new(0, 0, 0)).unwrap();
        std::thread::spawn(move || {
            section.acquire();
            section.release();
        })
        .join()
        .unwrap();
    }

    #[test]
    fn missing_sections_are_skipped() {
        let mut chunk = ChunkAccess::new(ChunkPos::new(0, 0), Registries::default(), 0, 32);
        let stone = chunk.blocks().state("stone").unwrap();

        let mut bulk = BulkSectionAccess::new(&mut chunk);
        assert_eq!(bulk.set_block_state(BlockPos::new(0, 40, 0), stone), None);
        assert_eq!(bulk.set_block_state(BlockPos::new(16, 0, 0), stone), None);
        assert!(bulk.set_block_state(BlockPos::new(3, 17, 4), stone).is_some());
        assert_eq!(bulk.acquired(), [SectionPos::new(0, 1, 0)]);
        drop(bulk);

        assert_eq!(chunk.block_state(BlockPos::new(3, 17, 4)), stone);
        assert_eq!(chunk.sections()[1].non_empty_block_count(), 1);
    }
}

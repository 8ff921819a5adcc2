//! The per-chunk aggregate shared by the generation pipeline and the live
//! world.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};
use strata_protocol::{BlockPos, ChunkPos, SectionPos};
use strata_registry::{BiomeId, BlockKind, BlockRegistry, BlockState, FluidKind, Registries};
use tracing::warn;

use crate::bit_storage::{BitStorage, BitStorageError};
use crate::block_entity::{BlockEntity, BlockEntityFactory, BlockEntityTag};
use crate::heightmap::{Heightmap, HeightmapKind};
use crate::section::{BiomeSource, LevelChunkSection};
use crate::status::{ChunkStatus, ChunkType};
use crate::structure::StructureStart;
use crate::ticks::TickSchedule;

/// Receives block changes that may affect lighting.
pub trait LightListener: Send + Sync {
    /// A section switched between containing only air and containing blocks.
    fn update_section_status(&self, pos: SectionPos, is_empty: bool);

    /// A block's light emission or opacity changed.
    fn check_block(&self, pos: BlockPos);
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum CarvingStep {
    Air,
    Liquid,
}

/// One bit per block of a chunk, set where a carver removed the block.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CarvingMask {
    bits: BitStorage,
    min_y: i32,
}

impl CarvingMask {
    pub fn new(min_y: i32, height: u32) -> Self {
        Self {
            bits: BitStorage::new(1, 256 * height as usize),
            min_y,
        }
    }

    pub fn from_raw(min_y: i32, height: u32, raw: Vec<u64>) -> Result<Self, BitStorageError> {
        Ok(Self {
            bits: BitStorage::from_raw(1, 256 * height as usize, raw)?,
            min_y,
        })
    }

    fn index(&self, x: u32, y: i32, z: u32) -> usize {
        (x | z << 4) as usize | ((y - self.min_y) as usize) << 8
    }

    pub fn get(&self, x: u32, y: i32, z: u32) -> bool {
        self.bits.get(self.index(x, y, z)) != 0
    }

    pub fn set(&mut self, x: u32, y: i32, z: u32) {
        let idx = self.index(x, y, z);
        self.bits.set(idx, 1);
    }

    pub fn raw(&self) -> &[u64] {
        self.bits.raw()
    }
}

/// State only present while a chunk is being generated.
#[derive(Clone, Debug, Default)]
pub struct BuildingData {
    lights: Vec<BlockPos>,
    carving_masks: BTreeMap<CarvingStep, CarvingMask>,
}

/// State only present once a chunk has been promoted into the live world.
pub struct LiveData {
    factory: Arc<dyn BlockEntityFactory>,
    tickers: BTreeSet<BlockPos>,
    listeners: BTreeMap<i32, BTreeSet<BlockPos>>,
}

impl fmt::Debug for LiveData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveData")
            .field("tickers", &self.tickers)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum ChunkPhase {
    Building(BuildingData),
    Live(LiveData),
}

/// A chunk column: sections spanning the world height plus heightmaps, block
/// entities, ticks, structure metadata and the generation status.
pub struct ChunkAccess {
    pos: ChunkPos,
    status: ChunkStatus,
    min_y: i32,
    sections: Box<[LevelChunkSection]>,
    heightmaps: BTreeMap<HeightmapKind, Heightmap>,
    block_entities: BTreeMap<BlockPos, BlockEntity>,
    pending_block_entities: BTreeMap<BlockPos, BlockEntityTag>,
    block_ticks: TickSchedule<BlockKind>,
    fluid_ticks: TickSchedule<FluidKind>,
    structure_starts: BTreeMap<String, StructureStart>,
    structure_references: BTreeMap<String, BTreeSet<i64>>,
    post_processing: Box<[Vec<u16>]>,
    unsaved: bool,
    light_correct: bool,
    inhabited_time: i64,
    light: Option<Arc<dyn LightListener>>,
    registries: Registries,
    phase: ChunkPhase,
}

/// Reads a block from a section array, treating positions outside it as
/// `outside`.
fn state_in(
    sections: &[LevelChunkSection],
    min_y: i32,
    x: u32,
    y: i32,
    z: u32,
    outside: BlockState,
) -> BlockState {
    let idx = (y - min_y).div_euclid(16);
    match usize::try_from(idx).ok().and_then(|i| sections.get(i)) {
        Some(section) => section.block_state(x, (y & 15) as u32, z),
        None => outside,
    }
}

impl ChunkAccess {
    /// Creates an empty chunk in the building phase. `min_y` and `height`
    /// must be multiples of 16.
    #[track_caller]
    pub fn new(pos: ChunkPos, registries: Registries, min_y: i32, height: u32) -> Self {
        assert!(
            min_y % 16 == 0 && height % 16 == 0 && height > 0,
            "invalid vertical bounds {min_y} + {height}"
        );

        let count = height as usize / 16;

        Self {
            pos,
            status: ChunkStatus::Empty,
            min_y,
            sections: (0..count)
                .map(|_| LevelChunkSection::new(&registries))
                .collect(),
            heightmaps: BTreeMap::new(),
            block_entities: BTreeMap::new(),
            pending_block_entities: BTreeMap::new(),
            block_ticks: TickSchedule::new(),
            fluid_ticks: TickSchedule::new(),
            structure_starts: BTreeMap::new(),
            structure_references: BTreeMap::new(),
            post_processing: vec![vec![]; count].into_boxed_slice(),
            unsaved: false,
            light_correct: false,
            inhabited_time: 0,
            light: None,
            registries,
            phase: ChunkPhase::Building(BuildingData::default()),
        }
    }

    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    pub fn status(&self) -> ChunkStatus {
        self.status
    }

    /// Raises the status. Lower statuses are ignored so the status never
    /// decreases. Returns whether it changed.
    pub fn set_status(&mut self, status: ChunkStatus) -> bool {
        if status > self.status {
            self.status = status;
            self.unsaved = true;
            true
        } else {
            false
        }
    }

    pub fn chunk_type(&self) -> ChunkType {
        match self.phase {
            ChunkPhase::Building(_) => ChunkType::ProtoChunk,
            ChunkPhase::Live(_) => ChunkType::LevelChunk,
        }
    }

    pub fn phase(&self) -> &ChunkPhase {
        &self.phase
    }

    pub fn is_live(&self) -> bool {
        matches!(self.phase, ChunkPhase::Live(_))
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn blocks(&self) -> &BlockRegistry {
        &self.registries.blocks
    }

    pub fn min_y(&self) -> i32 {
        self.min_y
    }

    pub fn height(&self) -> u32 {
        self.sections.len() as u32 * 16
    }

    /// One past the highest buildable Y.
    pub fn max_y(&self) -> i32 {
        self.min_y + self.height() as i32
    }

    pub fn min_section(&self) -> i32 {
        SectionPos::block_to_section(self.min_y)
    }

    pub fn section_index(&self, y: i32) -> Option<usize> {
        if (self.min_y..self.max_y()).contains(&y) {
            Some(((y - self.min_y) / 16) as usize)
        } else {
            None
        }
    }

    pub fn section_pos(&self, index: usize) -> SectionPos {
        SectionPos::of(self.pos, self.min_section() + index as i32)
    }

    pub fn sections(&self) -> &[LevelChunkSection] {
        &self.sections
    }

    /// Direct section access. Block writes made here bypass heightmaps, light
    /// notifications and block entity bookkeeping.
    pub fn sections_mut(&mut self) -> &mut [LevelChunkSection] {
        &mut self.sections
    }

    pub fn section(&self, index: usize) -> Option<&LevelChunkSection> {
        self.sections.get(index)
    }

    pub fn section_mut(&mut self, index: usize) -> Option<&mut LevelChunkSection> {
        self.sections.get_mut(index)
    }

    /// Replaces a section wholesale, e.g. when loading from storage.
    #[track_caller]
    pub fn replace_section(&mut self, index: usize, section: LevelChunkSection) {
        self.sections[index] = section;
    }

    /// Index of the highest section containing a non-air block.
    pub fn highest_section(&self) -> Option<usize> {
        self.sections.iter().rposition(|s| !s.has_only_air())
    }

    /// Minimum Y of the highest non-empty section, or the minimum build
    /// height if every section is empty.
    pub fn highest_section_position(&self) -> i32 {
        self.highest_section()
            .map_or(self.min_y, |i| self.min_y + i as i32 * 16)
    }

    /// Whether every section overlapping `start_y..=end_y` contains only air.
    pub fn is_y_space_empty(&self, start_y: i32, end_y: i32) -> bool {
        let start = start_y.max(self.min_y);
        let end = end_y.min(self.max_y() - 1);
        if start > end {
            return true;
        }

        let first = ((start - self.min_y) / 16) as usize;
        let last = ((end - self.min_y) / 16) as usize;
        self.sections[first..=last].iter().all(|s| s.has_only_air())
    }

    pub fn block_state(&self, pos: BlockPos) -> BlockState {
        let blocks = &*self.registries.blocks;
        let Some(idx) = self.section_index(pos.y) else {
            return blocks.void_air();
        };

        let section = &self.sections[idx];
        if section.has_only_air() {
            return blocks.air();
        }

        let (x, z) = pos.local_xz();
        section.block_state(x, (pos.y & 15) as u32, z)
    }

    pub fn fluid_kind(&self, pos: BlockPos) -> FluidKind {
        self.registries.blocks.fluid(self.block_state(pos))
    }

    /// Sets a block and returns the state it replaced, or `None` if nothing
    /// changed. Primed heightmaps, the light listener and block entities are
    /// kept in sync with the change.
    ///
    /// `moved` marks a block being relocated rather than destroyed and is
    /// handed to the block entity factory when an entity is torn down.
    pub fn set_block_state(
        &mut self,
        pos: BlockPos,
        state: BlockState,
        moved: bool,
    ) -> Option<BlockState> {
        let idx = self.section_index(pos.y)?;
        let blocks = self.registries.blocks.clone();
        let (x, z) = pos.local_xz();

        let section = &mut self.sections[idx];
        let was_empty = section.has_only_air();
        if was_empty && blocks.is_air(state) {
            return None;
        }

        let prev = section.set_block_state(x, (pos.y & 15) as u32, z, state);
        if prev == state {
            return None;
        }
        let now_empty = section.has_only_air();

        if let ChunkPhase::Building(data) = &mut self.phase {
            if blocks.light_emission(state) > 0 {
                data.lights.push(pos);
            }
        }

        let kinds = match self.phase {
            ChunkPhase::Building(_) => self.status.heightmaps_after(),
            ChunkPhase::Live(_) => HeightmapKind::POST_FEATURES,
        };
        let missing: ArrayVec<HeightmapKind, 6> = kinds
            .iter()
            .copied()
            .filter(|k| !self.heightmaps.contains_key(k))
            .collect();
        if !missing.is_empty() {
            self.prime_heightmaps(&missing);
        }

        let sections = &self.sections;
        let min_y = self.min_y;
        let void_air = blocks.void_air();
        for kind in kinds {
            if let Some(map) = self.heightmaps.get_mut(kind) {
                map.update(&blocks, x, pos.y, z, state, |y| {
                    state_in(sections, min_y, x, y, z, void_air)
                });
            }
        }

        if let Some(light) = &self.light {
            if was_empty != now_empty {
                light.update_section_status(self.section_pos(idx), now_empty);
            }
            if blocks.light_emission(state) != blocks.light_emission(prev)
                || blocks.blocks_motion(state) != blocks.blocks_motion(prev)
            {
                light.check_block(pos);
            }
        }

        let old_entity = blocks.block_entity(prev);
        let new_entity = blocks.block_entity(state);

        if old_entity.is_some()
            && (old_entity != new_entity || blocks.block_kind(prev) != blocks.block_kind(state))
        {
            self.pending_block_entities.remove(&pos);
            if let Some(entity) = self.remove_block_entity(pos) {
                if let ChunkPhase::Live(live) = &self.phase {
                    live.factory.removed(&entity, moved);
                }
            }
        }

        if let Some(kind) = new_entity {
            if let Some(entity) = self.block_entities.get_mut(&pos) {
                entity.state = state;
            } else {
                let created = match &self.phase {
                    ChunkPhase::Live(live) => live.factory.create(kind, pos, state),
                    ChunkPhase::Building(_) => None,
                };

                if let Some(entity) = created {
                    self.set_block_entity(entity);
                } else if !self.is_live() && !self.pending_block_entities.contains_key(&pos) {
                    let id = blocks
                        .block_entity_types()
                        .name(kind)
                        .unwrap_or_default()
                        .to_owned();
                    self.pending_block_entities.insert(
                        pos,
                        BlockEntityTag {
                            id,
                            pos,
                            data: vec![],
                        },
                    );
                }
            }
        }

        self.unsaved = true;
        Some(prev)
    }

    /// Rebuilds the given heightmaps by scanning each column top down once.
    pub fn prime_heightmaps(&mut self, kinds: &[HeightmapKind]) {
        let height = self.height();
        for &kind in kinds {
            self.heightmaps
                .insert(kind, Heightmap::new(kind, self.min_y, height));
        }

        let blocks = &*self.registries.blocks;
        let top = self.highest_section_position() + 16;
        let sections = &self.sections;
        let heightmaps = &mut self.heightmaps;
        let min_y = self.min_y;

        for z in 0..16 {
            for x in 0..16 {
                let mut remaining: ArrayVec<HeightmapKind, 6> = kinds.iter().copied().collect();

                for y in (min_y..top).rev() {
                    if remaining.is_empty() {
                        break;
                    }

                    let state = state_in(sections, min_y, x, y, z, blocks.void_air());
                    if blocks.is_air(state) {
                        continue;
                    }

                    remaining.retain(|kind| {
                        if kind.is_opaque(blocks, state) {
                            if let Some(map) = heightmaps.get_mut(kind) {
                                map.set_height(x, z, y + 1);
                            }
                            false
                        } else {
                            true
                        }
                    });
                }
            }
        }
    }

    pub fn heightmap(&self, kind: HeightmapKind) -> Option<&Heightmap> {
        self.heightmaps.get(&kind)
    }

    pub fn heightmaps(&self) -> impl Iterator<Item = &Heightmap> + '_ {
        self.heightmaps.values()
    }

    /// Restores a heightmap from its packed words.
    pub fn set_heightmap(
        &mut self,
        kind: HeightmapKind,
        raw: Vec<u64>,
    ) -> Result<(), BitStorageError> {
        let map = Heightmap::from_raw(kind, self.min_y, self.height(), raw)?;
        self.heightmaps.insert(kind, map);
        Ok(())
    }

    /// The first available Y of a column, priming the heightmap on first use.
    pub fn height_at(&mut self, kind: HeightmapKind, x: u32, z: u32) -> i32 {
        if !self.heightmaps.contains_key(&kind) {
            self.prime_heightmaps(&[kind]);
        }
        self.heightmaps
            .get(&kind)
            .map_or(self.min_y, |map| map.first_available(x, z))
    }

    /// The biome at absolute quart coordinates. The vertical coordinate is
    /// clamped to the chunk.
    pub fn noise_biome(&self, quart_x: i32, quart_y: i32, quart_z: i32) -> BiomeId {
        let min = self.min_y >> 2;
        let max = min + (self.height() >> 2) as i32 - 1;
        let y = quart_y.clamp(min, max);
        let idx = ((y - min) / 4) as usize;

        self.sections[idx].noise_biome(
            quart_x.rem_euclid(4) as u32,
            y.rem_euclid(4) as u32,
            quart_z.rem_euclid(4) as u32,
        )
    }

    pub fn fill_biomes_from_noise(&mut self, source: &dyn BiomeSource) {
        let quart_x = self.pos.x * 4;
        let quart_z = self.pos.z * 4;
        let min_section = self.min_section();

        for (i, section) in self.sections.iter_mut().enumerate() {
            section.fill_biomes_from_noise(source, quart_x, (min_section + i as i32) * 4, quart_z);
        }
    }

    pub fn block_entity(&self, pos: BlockPos) -> Option<&BlockEntity> {
        self.block_entities.get(&pos)
    }

    pub fn block_entity_mut(&mut self, pos: BlockPos) -> Option<&mut BlockEntity> {
        self.unsaved = true;
        self.block_entities.get_mut(&pos)
    }

    pub fn block_entities(&self) -> impl Iterator<Item = &BlockEntity> + '_ {
        self.block_entities.values()
    }

    /// Positions of realized and pending block entities.
    pub fn block_entity_positions(&self) -> BTreeSet<BlockPos> {
        self.block_entities
            .keys()
            .chain(self.pending_block_entities.keys())
            .copied()
            .collect()
    }

    /// Adds a block entity. Live chunks reject entities whose block does not
    /// carry one of the same kind and bind tickers and game event listeners.
    pub fn set_block_entity(&mut self, entity: BlockEntity) -> bool {
        let pos = entity.pos;
        let kind = entity.kind;

        if self.is_live() {
            let Some(idx) = self.section_index(pos.y) else {
                return false;
            };
            let (x, z) = pos.local_xz();
            let state = self.sections[idx].block_state(x, (pos.y & 15) as u32, z);

            let blocks = &*self.registries.blocks;
            if blocks.block_entity(state) != Some(kind) {
                warn!(
                    %pos,
                    state = blocks.state_name(state).unwrap_or_default(),
                    "refusing block entity for a block that does not carry it"
                );
                return false;
            }
        }

        if let ChunkPhase::Live(live) = &mut self.phase {
            if let Some(ty) = self.registries.blocks.block_entity_type(kind) {
                if ty.ticks {
                    live.tickers.insert(pos);
                }
                if ty.listens {
                    live.listeners
                        .entry(SectionPos::block_to_section(pos.y))
                        .or_default()
                        .insert(pos);
                }
            }
        }

        self.block_entities.insert(pos, entity);
        self.unsaved = true;
        true
    }

    pub fn remove_block_entity(&mut self, pos: BlockPos) -> Option<BlockEntity> {
        let entity = self.block_entities.remove(&pos)?;

        if let ChunkPhase::Live(live) = &mut self.phase {
            live.tickers.remove(&pos);
            let section_y = SectionPos::block_to_section(pos.y);
            if let Some(set) = live.listeners.get_mut(&section_y) {
                set.remove(&pos);
                if set.is_empty() {
                    live.listeners.remove(&section_y);
                }
            }
        }

        self.unsaved = true;
        Some(entity)
    }

    pub fn pending_block_entity(&self, pos: BlockPos) -> Option<&BlockEntityTag> {
        self.pending_block_entities.get(&pos)
    }

    pub fn pending_block_entities(&self) -> impl Iterator<Item = &BlockEntityTag> + '_ {
        self.pending_block_entities.values()
    }

    pub fn set_pending_block_entity(&mut self, tag: BlockEntityTag) {
        self.pending_block_entities.insert(tag.pos, tag);
    }

    /// All block entities in storage form, pending ones included.
    pub fn block_entity_tags(&self) -> Vec<BlockEntityTag> {
        let blocks = &*self.registries.blocks;
        self.block_entities
            .values()
            .map(|e| e.to_tag(blocks))
            .chain(self.pending_block_entities.values().cloned())
            .collect()
    }

    /// Block entities bound to the live tick loop.
    pub fn ticking_block_entities(&self) -> impl Iterator<Item = BlockPos> + '_ {
        match &self.phase {
            ChunkPhase::Live(live) => Some(live.tickers.iter().copied()),
            ChunkPhase::Building(_) => None,
        }
        .into_iter()
        .flatten()
    }

    /// Game event listeners registered in the given section.
    pub fn game_event_listeners(&self, section_y: i32) -> impl Iterator<Item = BlockPos> + '_ {
        match &self.phase {
            ChunkPhase::Live(live) => live.listeners.get(&section_y),
            ChunkPhase::Building(_) => None,
        }
        .into_iter()
        .flatten()
        .copied()
    }

    pub fn block_ticks(&self) -> &TickSchedule<BlockKind> {
        &self.block_ticks
    }

    pub fn block_ticks_mut(&mut self) -> &mut TickSchedule<BlockKind> {
        &mut self.block_ticks
    }

    pub fn fluid_ticks(&self) -> &TickSchedule<FluidKind> {
        &self.fluid_ticks
    }

    pub fn fluid_ticks_mut(&mut self) -> &mut TickSchedule<FluidKind> {
        &mut self.fluid_ticks
    }

    pub fn set_ticks(&mut self, blocks: TickSchedule<BlockKind>, fluids: TickSchedule<FluidKind>) {
        self.block_ticks = blocks;
        self.fluid_ticks = fluids;
    }

    pub fn structure_start(&self, structure: &str) -> Option<&StructureStart> {
        self.structure_starts.get(structure)
    }

    pub fn set_structure_start(&mut self, start: StructureStart) {
        self.structure_starts.insert(start.structure.clone(), start);
        self.unsaved = true;
    }

    pub fn structure_starts(&self) -> &BTreeMap<String, StructureStart> {
        &self.structure_starts
    }

    pub fn set_all_starts(&mut self, starts: BTreeMap<String, StructureStart>) {
        self.structure_starts = starts;
        self.unsaved = true;
    }

    /// Packed positions of the chunks holding starts of `structure` that
    /// overlap this chunk.
    pub fn references_for_structure(&self, structure: &str) -> Option<&BTreeSet<i64>> {
        self.structure_references.get(structure)
    }

    pub fn add_reference_for_structure(&mut self, structure: &str, chunk: ChunkPos) {
        self.structure_references
            .entry(structure.to_owned())
            .or_default()
            .insert(chunk.to_long());
        self.unsaved = true;
    }

    pub fn all_references(&self) -> &BTreeMap<String, BTreeSet<i64>> {
        &self.structure_references
    }

    pub fn set_all_references(&mut self, references: BTreeMap<String, BTreeSet<i64>>) {
        self.structure_references = references;
        self.unsaved = true;
    }

    pub fn has_any_structure_references(&self) -> bool {
        self.structure_references.values().any(|r| !r.is_empty())
    }

    /// Packs a position into the `x | z << 4 | y << 8` form used by
    /// post-processing lists, with `y` relative to its section.
    pub fn pack_offset_coordinates(pos: BlockPos) -> u16 {
        let (x, z) = pos.local_xz();
        (x | z << 4 | ((pos.y & 15) as u32) << 8) as u16
    }

    /// Records a position for a second pass once the chunk goes live.
    pub fn mark_pos_for_postprocessing(&mut self, pos: BlockPos) {
        if let Some(idx) = self.section_index(pos.y) {
            self.add_packed_post_process(Self::pack_offset_coordinates(pos), idx);
        }
    }

    pub fn add_packed_post_process(&mut self, packed: u16, section: usize) {
        if let Some(list) = self.post_processing.get_mut(section) {
            list.push(packed);
        }
    }

    pub fn post_processing(&self) -> &[Vec<u16>] {
        &self.post_processing
    }

    /// Runs `fixup` for every recorded position and applies the state it
    /// returns, then clears the lists.
    pub fn post_process_generation(
        &mut self,
        mut fixup: impl FnMut(&Self, BlockPos, BlockState) -> BlockState,
    ) {
        let lists = std::mem::replace(
            &mut self.post_processing,
            vec![vec![]; self.sections.len()].into_boxed_slice(),
        );

        for (idx, list) in lists.iter().enumerate() {
            let section_y = self.min_section() + idx as i32;
            for &packed in list {
                let pos = BlockPos::new(
                    self.pos.min_block_x() + (packed & 15) as i32,
                    section_y * 16 + (packed >> 8 & 15) as i32,
                    self.pos.min_block_z() + (packed >> 4 & 15) as i32,
                );

                let state = self.block_state(pos);
                let fixed = fixup(self, pos, state);
                if fixed != state {
                    self.set_block_state(pos, fixed, false);
                }
            }
        }
    }

    /// Positions of light emitting blocks placed during generation.
    pub fn light_sources(&self) -> &[BlockPos] {
        match &self.phase {
            ChunkPhase::Building(data) => &data.lights,
            ChunkPhase::Live(_) => &[],
        }
    }

    pub fn add_light_source(&mut self, pos: BlockPos) {
        if let ChunkPhase::Building(data) = &mut self.phase {
            data.lights.push(pos);
        }
    }

    pub fn carving_mask(&self, step: CarvingStep) -> Option<&CarvingMask> {
        match &self.phase {
            ChunkPhase::Building(data) => data.carving_masks.get(&step),
            ChunkPhase::Live(_) => None,
        }
    }

    /// The carving mask for `step`, created on first use. Live chunks have
    /// no carving masks.
    pub fn carving_mask_mut(&mut self, step: CarvingStep) -> Option<&mut CarvingMask> {
        let (min_y, height) = (self.min_y, self.height());
        match &mut self.phase {
            ChunkPhase::Building(data) => Some(
                data.carving_masks
                    .entry(step)
                    .or_insert_with(|| CarvingMask::new(min_y, height)),
            ),
            ChunkPhase::Live(_) => None,
        }
    }

    pub fn set_carving_mask(&mut self, step: CarvingStep, mask: CarvingMask) {
        if let ChunkPhase::Building(data) = &mut self.phase {
            data.carving_masks.insert(step, mask);
        }
    }

    pub fn light_listener(&self) -> Option<&Arc<dyn LightListener>> {
        self.light.as_ref()
    }

    pub fn set_light_listener(&mut self, light: Option<Arc<dyn LightListener>>) {
        self.light = light;
    }

    pub fn is_light_correct(&self) -> bool {
        self.light_correct
    }

    pub fn set_light_correct(&mut self, correct: bool) {
        self.light_correct = correct;
        self.unsaved = true;
    }

    pub fn is_unsaved(&self) -> bool {
        self.unsaved
    }

    pub fn set_unsaved(&mut self, unsaved: bool) {
        self.unsaved = unsaved;
    }

    pub fn inhabited_time(&self) -> i64 {
        self.inhabited_time
    }

    pub fn set_inhabited_time(&mut self, time: i64) {
        self.inhabited_time = time;
    }

    pub fn increment_inhabited_time(&mut self, delta: i64) {
        self.inhabited_time = self.inhabited_time.saturating_add(delta);
    }

    /// Converts a building chunk into a live one. Pending block entity tags
    /// are instantiated through `factory`, realized block entities are bound
    /// and worldgen-only heightmaps are dropped in favor of the final kinds.
    pub fn promote_to_live(&mut self, factory: Arc<dyn BlockEntityFactory>) {
        if self.is_live() {
            return;
        }

        self.phase = ChunkPhase::Live(LiveData {
            factory: factory.clone(),
            tickers: BTreeSet::new(),
            listeners: BTreeMap::new(),
        });

        self.heightmaps.retain(|kind, _| !kind.is_worldgen_only());
        let missing: ArrayVec<HeightmapKind, 6> = HeightmapKind::POST_FEATURES
            .iter()
            .copied()
            .filter(|k| !self.heightmaps.contains_key(k))
            .collect();
        if !missing.is_empty() {
            self.prime_heightmaps(&missing);
        }

        for entity in std::mem::take(&mut self.block_entities).into_values() {
            self.set_block_entity(entity);
        }

        for (pos, tag) in std::mem::take(&mut self.pending_block_entities) {
            let state = self.block_state(pos);
            let blocks = self.registries.blocks.clone();

            let Some(kind) = blocks.block_entity(state) else {
                warn!(
                    %pos,
                    id = %tag.id,
                    "dropping pending block entity for a block without one"
                );
                continue;
            };

            let known = blocks.block_entity_types().index_of(&tag.id) == Some(kind);
            let entity = if known {
                factory.load(kind, state, tag)
            } else {
                factory.create(kind, pos, state)
            };

            if let Some(entity) = entity {
                self.set_block_entity(entity);
            }
        }
    }
}

impl fmt::Debug for ChunkAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkAccess")
            .field("pos", &self.pos)
            .field("status", &self.status)
            .field("phase", &self.phase)
            .field("min_y", &self.min_y)
            .field("sections", &self.sections.len())
            .field("unsaved", &self.unsaved)
            .finish_non_exhaustive()
    }
}

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strata_chunk::{
    BitStorageError, BlockEntityTag, CarvingMask, CarvingStep, ChunkAccess, ChunkStatus,
    LevelChunkSection, PalettedContainer, PalettedData, PalettedDecodeError, SavedTick, Strategy,
    StructureStart, TickSchedule,
};
use strata_protocol::{BlockPos, ChunkPos};
use strata_registry::{IdMap, Registries, RegistryIdx};
use thiserror::Error;
use tracing::error;

/// The storage form of one section. Palettes list registry names.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SectionRecord {
    pub y: i32,
    pub block_states: PalettedData<String>,
    pub biomes: PalettedData<String>,
}

/// The storage form of a [`ChunkAccess`].
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub pos: ChunkPos,
    pub status: String,
    pub inhabited_time: i64,
    pub light_correct: bool,
    /// Whether the chunk should be written back even if it is not modified
    /// after loading.
    pub should_save: bool,
    pub sections: Vec<SectionRecord>,
    /// Packed heightmap words by serialization key.
    pub heightmaps: BTreeMap<String, Vec<u64>>,
    pub block_entities: Vec<BlockEntityTag>,
    pub structure_starts: Vec<StructureStart>,
    pub structure_references: BTreeMap<String, BTreeSet<i64>>,
    pub block_ticks: Vec<SavedTick<String>>,
    pub fluid_ticks: Vec<SavedTick<String>>,
    /// Packed positions per section, lowest section first.
    pub post_processing: Vec<Vec<u16>>,
    pub lights: Vec<BlockPos>,
    pub carving_masks: BTreeMap<CarvingStep, Vec<u64>>,
}

#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum RecordError {
    #[error("unknown chunk status \"{0}\"")]
    UnknownStatus(String),
    #[error("section Y {0} is out of bounds")]
    SectionYOutOfBounds(i32),
    #[error("unknown block state \"{0}\"")]
    UnknownBlockState(String),
    #[error("unknown biome \"{0}\"")]
    UnknownBiome(String),
    #[error("invalid block states in section {y}: {source}")]
    BlockStates {
        y: i32,
        #[source]
        source: PalettedDecodeError,
    },
    #[error("invalid biomes in section {y}: {source}")]
    Biomes {
        y: i32,
        #[source]
        source: PalettedDecodeError,
    },
    #[error("invalid heightmap {kind}: {source}")]
    Heightmap {
        kind: &'static str,
        #[source]
        source: BitStorageError,
    },
    #[error("invalid carving mask: {0}")]
    CarvingMask(#[source] BitStorageError),
    #[error("unknown block \"{0}\" in scheduled tick")]
    UnknownTickBlock(String),
    #[error("unknown fluid \"{0}\" in scheduled tick")]
    UnknownTickFluid(String),
}

fn to_names<I: RegistryIdx>(data: PalettedData<I>, registry: &impl IdMap<I>) -> PalettedData<String> {
    PalettedData {
        palette: data
            .palette
            .into_iter()
            .map(|v| registry.name_of(v).unwrap_or_default().to_owned())
            .collect(),
        data: data.data,
    }
}

fn to_ids<I: RegistryIdx>(
    data: PalettedData<String>,
    registry: &impl IdMap<I>,
    unknown: fn(String) -> RecordError,
) -> Result<PalettedData<I>, RecordError> {
    let palette = data
        .palette
        .into_iter()
        .map(|name| registry.id_of(&name).ok_or_else(|| unknown(name)))
        .collect::<Result<_, _>>()?;

    Ok(PalettedData {
        palette,
        data: data.data,
    })
}

fn ticks_to_ids<I>(
    ticks: Vec<SavedTick<String>>,
    lookup: impl Fn(&str) -> Option<I>,
    unknown: fn(String) -> RecordError,
) -> Result<Vec<SavedTick<I>>, RecordError> {
    ticks
        .into_iter()
        .map(|t| match lookup(&t.kind) {
            Some(kind) => Ok(t.map(|_| kind)),
            None => Err(unknown(t.kind)),
        })
        .collect()
}

impl ChunkRecord {
    /// Captures `chunk`. Scheduled ticks are stored relative to `game_time`.
    pub fn from_chunk(chunk: &ChunkAccess, game_time: i64) -> Self {
        let blocks = chunk.blocks();
        let biomes = &*chunk.registries().biomes;
        let min_section = chunk.min_section();

        Self {
            pos: chunk.pos(),
            status: chunk.status().name().to_owned(),
            inhabited_time: chunk.inhabited_time(),
            light_correct: chunk.is_light_correct(),
            should_save: false,
            sections: chunk
                .sections()
                .iter()
                .enumerate()
                .map(|(i, s)| SectionRecord {
                    y: min_section + i as i32,
                    block_states: to_names(s.states().to_data(), blocks),
                    biomes: to_names(s.biomes().to_data(), biomes),
                })
                .collect(),
            heightmaps: chunk
                .heightmaps()
                .map(|m| (m.kind().serialization_key().to_owned(), m.raw().to_vec()))
                .collect(),
            block_entities: chunk.block_entity_tags(),
            structure_starts: chunk.structure_starts().values().cloned().collect(),
            structure_references: chunk.all_references().clone(),
            block_ticks: chunk
                .block_ticks()
                .save(game_time)
                .into_iter()
                .map(|t| t.map(|k| blocks.block_kinds().name(k).unwrap_or_default().to_owned()))
                .collect(),
            fluid_ticks: chunk
                .fluid_ticks()
                .save(game_time)
                .into_iter()
                .map(|t| t.map(|k| blocks.fluids().name(k).unwrap_or_default().to_owned()))
                .collect(),
            post_processing: chunk.post_processing().to_vec(),
            lights: chunk.light_sources().to_vec(),
            carving_masks: [CarvingStep::Air, CarvingStep::Liquid]
                .into_iter()
                .filter_map(|step| chunk.carving_mask(step).map(|m| (step, m.raw().to_vec())))
                .collect(),
        }
    }

    /// Rebuilds the chunk at `pos`. A record stored under the wrong position
    /// is relocated and flagged unsaved.
    pub fn into_chunk(
        self,
        registries: &Registries,
        pos: ChunkPos,
        min_y: i32,
        height: u32,
        game_time: i64,
    ) -> Result<ChunkAccess, RecordError> {
        let Some(status) = ChunkStatus::by_name(&self.status) else {
            return Err(RecordError::UnknownStatus(self.status));
        };

        let relocated = self.pos != pos;
        if relocated {
            error!(
                expected = ?pos,
                found = ?self.pos,
                "chunk record stored at the wrong location, relocating"
            );
        }

        let mut chunk = ChunkAccess::new(pos, registries.clone(), min_y, height);
        let min_section = chunk.min_section();
        let section_count = chunk.sections().len();

        for section in self.sections {
            let y = section.y;
            let Some(idx) = usize::try_from(y - min_section)
                .ok()
                .filter(|&i| i < section_count)
            else {
                return Err(RecordError::SectionYOutOfBounds(y));
            };

            let states = to_ids(
                section.block_states,
                &*registries.blocks,
                RecordError::UnknownBlockState,
            )?;
            let states =
                PalettedContainer::from_data(states, Strategy::SectionStates, &*registries.blocks)
                    .map_err(|source| RecordError::BlockStates { y, source })?;

            let biomes = to_ids(section.biomes, &*registries.biomes, RecordError::UnknownBiome)?;
            let biomes =
                PalettedContainer::from_data(biomes, Strategy::SectionBiomes, &*registries.biomes)
                    .map_err(|source| RecordError::Biomes { y, source })?;

            chunk.replace_section(
                idx,
                LevelChunkSection::from_parts(states, biomes, registries.blocks.clone()),
            );
        }

        chunk.set_status(status);

        let mut heightmaps = self.heightmaps;
        let mut missing = vec![];
        for &kind in status.heightmaps_after() {
            match heightmaps.remove(kind.serialization_key()) {
                Some(raw) => chunk.set_heightmap(kind, raw).map_err(|source| {
                    RecordError::Heightmap {
                        kind: kind.serialization_key(),
                        source,
                    }
                })?,
                None => missing.push(kind),
            }
        }
        if !missing.is_empty() {
            chunk.prime_heightmaps(&missing);
        }

        for tag in self.block_entities {
            chunk.set_pending_block_entity(tag);
        }

        chunk.set_all_starts(
            self.structure_starts
                .into_iter()
                .map(|s| (s.structure.clone(), s))
                .collect(),
        );
        chunk.set_all_references(self.structure_references);

        let blocks = &*registries.blocks;
        let block_ticks = ticks_to_ids(
            self.block_ticks,
            |name| blocks.block_kinds().index_of(name),
            RecordError::UnknownTickBlock,
        )?;
        let fluid_ticks = ticks_to_ids(
            self.fluid_ticks,
            |name| blocks.fluids().index_of(name),
            RecordError::UnknownTickFluid,
        )?;
        chunk.set_ticks(
            TickSchedule::load(block_ticks, game_time),
            TickSchedule::load(fluid_ticks, game_time),
        );

        for (idx, list) in self.post_processing.into_iter().enumerate() {
            for packed in list {
                chunk.add_packed_post_process(packed, idx);
            }
        }

        for light in self.lights {
            chunk.add_light_source(light);
        }

        for (step, raw) in self.carving_masks {
            let mask = CarvingMask::from_raw(min_y, height, raw).map_err(RecordError::CarvingMask)?;
            chunk.set_carving_mask(step, mask);
        }

        chunk.set_inhabited_time(self.inhabited_time);
        chunk.set_light_correct(self.light_correct);
        chunk.set_unsaved(self.should_save || relocated);

        Ok(chunk)
    }

    pub fn to_bytes(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> bincode::Result<Self> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use strata_chunk::{HeightmapKind, TickPriority};
    use strata_registry::BiomeId;

    use super::*;

    fn sample() -> ChunkAccess {
        let registries = Registries::default();
        let mut chunk = ChunkAccess::new(ChunkPos::new(3, -7), registries, -64, 384);
        let blocks = chunk.registries().blocks.clone();
        let state = |name| blocks.state(name).unwrap();

        for x in 0..16 {
            for z in 0..16 {
                for y in -64..-60 {
                    chunk.set_block_state(BlockPos::new(48 + x, y, -112 + z), state("stone"), false);
                }
            }
        }
        chunk.set_block_state(BlockPos::new(50, -60, -110), state("chest"), false);
        chunk.set_block_state(BlockPos::new(51, -60, -110), state("torch"), false);
        chunk.set_block_state(BlockPos::new(52, 100, -100), state("lava"), false);
        chunk.sections_mut()[8].set_noise_biome(1, 2, 3, BiomeId(2));
        chunk.set_status(ChunkStatus::Carvers);

        chunk.block_ticks_mut().schedule(
            blocks.block_kind(state("sand")),
            BlockPos::new(49, -59, -111),
            110,
            TickPriority::High,
        );
        chunk.fluid_ticks_mut().schedule(
            blocks.fluid(state("lava")),
            BlockPos::new(52, 100, -100),
            130,
            TickPriority::Normal,
        );
        chunk.add_reference_for_structure("mineshaft", ChunkPos::new(2, -7));
        chunk.mark_pos_for_postprocessing(BlockPos::new(51, -60, -110));
        chunk.carving_mask_mut(CarvingStep::Air).unwrap().set(1, -62, 1);
        chunk.set_inhabited_time(1234);
        chunk
    }

    #[test]
    fn chunk_round_trip() {
        let chunk = sample();
        let record = ChunkRecord::from_chunk(&chunk, 100);
        let bytes = record.to_bytes().unwrap();
        let decoded = ChunkRecord::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, record);

        let loaded = decoded
            .into_chunk(chunk.registries(), chunk.pos(), -64, 384, 1000)
            .unwrap();

        assert_eq!(loaded.status(), ChunkStatus::Carvers);
        assert!(!loaded.is_unsaved());
        assert_eq!(loaded.inhabited_time(), 1234);
        for (a, b) in chunk.sections().iter().zip(loaded.sections()) {
            assert_eq!(a.non_empty_block_count(), b.non_empty_block_count());
            assert_eq!(a.ticking_fluid_count(), b.ticking_fluid_count());
        }
        for pos in [
            BlockPos::new(48, -64, -112),
            BlockPos::new(50, -60, -110),
            BlockPos::new(51, -60, -110),
            BlockPos::new(52, 100, -100),
            BlockPos::new(52, 101, -100),
        ] {
            assert_eq!(loaded.block_state(pos), chunk.block_state(pos));
        }
        assert_eq!(loaded.sections()[8].noise_biome(1, 2, 3), BiomeId(2));
        assert_eq!(
            loaded.heightmap(HeightmapKind::WorldSurfaceWg),
            chunk.heightmap(HeightmapKind::WorldSurfaceWg)
        );
        assert_eq!(
            loaded.pending_block_entity(BlockPos::new(50, -60, -110)).unwrap().id,
            "chest"
        );
        assert_eq!(loaded.block_ticks().save(1010)[0].delay, 0);
        assert_eq!(loaded.fluid_ticks().len(), 1);
        assert!(loaded.has_any_structure_references());
        assert_eq!(loaded.post_processing(), chunk.post_processing());
        assert_eq!(loaded.light_sources(), chunk.light_sources());
        assert!(loaded.carving_mask(CarvingStep::Air).unwrap().get(1, -62, 1));
    }

    #[test]
    fn palettes_are_stored_by_name() {
        let record = ChunkRecord::from_chunk(&sample(), 0);
        let bottom = &record.sections[0].block_states;
        assert_eq!(bottom.palette, ["stone"]);
        assert!(bottom.data.is_none());
        assert_eq!(record.sections[1].block_states.palette, ["air"]);
    }

    #[test]
    fn unknown_names_are_errors() {
        let chunk = sample();
        let mut record = ChunkRecord::from_chunk(&chunk, 0);
        record.sections[0].block_states.palette[0] = "unobtainium".into();

        let err = record
            .into_chunk(chunk.registries(), chunk.pos(), -64, 384, 0)
            .unwrap_err();
        assert!(matches!(err, RecordError::UnknownBlockState(name) if name == "unobtainium"));

        let mut record = ChunkRecord::from_chunk(&chunk, 0);
        record.status = "decorated".into();
        assert!(matches!(
            record.into_chunk(chunk.registries(), chunk.pos(), -64, 384, 0),
            Err(RecordError::UnknownStatus(_))
        ));
    }

    #[test]
    fn corrupt_storage_is_an_error() {
        let chunk = sample();

        let mut record = ChunkRecord::from_chunk(&chunk, 0);
        record.sections[16].block_states.data = Some(vec![0; 3]);
        assert!(matches!(
            record.into_chunk(chunk.registries(), chunk.pos(), -64, 384, 0),
            Err(RecordError::BlockStates { y: 12, .. })
        ));

        let mut record = ChunkRecord::from_chunk(&chunk, 0);
        record.sections[0].y = 40;
        assert!(matches!(
            record.into_chunk(chunk.registries(), chunk.pos(), -64, 384, 0),
            Err(RecordError::SectionYOutOfBounds(40))
        ));
    }

    #[test]
    fn misplaced_records_are_relocated() {
        let chunk = sample();
        let record = ChunkRecord::from_chunk(&chunk, 0);

        let loaded = record
            .into_chunk(chunk.registries(), ChunkPos::new(0, 0), -64, 384, 0)
            .unwrap();
        assert_eq!(loaded.pos(), ChunkPos::new(0, 0));
        assert!(loaded.is_unsaved());
    }
}

use std::sync::Arc;

use strata_chunk::{
    BiomeSource, BlockEntityFactory, CarvingStep, ChunkAccess, EmptyBlockEntityFactory,
    LightListener, StructureStart,
};
use strata_protocol::{BlockPos, ChunkPos, SectionPos};

use crate::region::WorldGenRegion;
use crate::settings::LevelInfo;
use crate::{ChunkFuture, ChunkHandle};

/// Supplies the terrain, biome and structure algorithms the stages invoke.
///
/// Every method except [`ChunkGenerator::fill_from_noise`] has a default
/// that leaves the chunk untouched (or, for references and biomes, does the
/// bookkeeping every generator needs).
pub trait ChunkGenerator: Send + Sync + 'static {
    fn biome_source(&self) -> &dyn BiomeSource;

    /// Decides which structures start in `chunk`.
    fn create_structures(
        &self,
        chunk: &mut ChunkAccess,
        structures: &dyn StructureFeatureManager,
        level: &LevelInfo,
    ) {
        #![allow(unused_variables)]
    }

    /// Records a reference in the center chunk for every start in the region
    /// whose bounding box covers it.
    fn create_references(
        &self,
        region: &mut WorldGenRegion<'_>,
        structures: &dyn StructureFeatureManager,
    ) {
        let center = region.center_pos();

        let found: Vec<_> = region
            .chunks()
            .flat_map(|chunk| {
                chunk
                    .structure_starts()
                    .values()
                    .filter(|start| start.bounding_box.intersects_chunk(center))
                    .map(|start| (start.structure.clone(), chunk.pos()))
            })
            .collect();

        let chunk = region.center_mut();
        for (structure, origin) in found {
            structures.add_reference(SectionPos::of(center, 0), &structure, origin, chunk);
        }
    }

    fn create_biomes(&self, chunk: &mut ChunkAccess) {
        chunk.fill_biomes_from_noise(self.biome_source());
    }

    /// Places the base terrain of the center chunk.
    fn fill_from_noise(
        &self,
        region: &mut WorldGenRegion<'_>,
        structures: &dyn StructureFeatureManager,
        level: &LevelInfo,
    ) -> anyhow::Result<()>;

    fn build_surface(&self, region: &mut WorldGenRegion<'_>, structures: &dyn StructureFeatureManager) {
        #![allow(unused_variables)]
    }

    fn apply_carvers(&self, region: &mut WorldGenRegion<'_>, seed: u64, step: CarvingStep) {
        #![allow(unused_variables)]
    }

    /// Places features. The region may write into the chunks adjacent to the
    /// center.
    fn apply_biome_decoration(
        &self,
        region: &mut WorldGenRegion<'_>,
        structures: &dyn StructureFeatureManager,
    ) {
        #![allow(unused_variables)]
    }

    fn spawn_original_mobs(&self, region: &mut WorldGenRegion<'_>) {
        #![allow(unused_variables)]
    }
}

/// Stores and finds structure starts and references, keyed by the section
/// they are recorded under.
///
/// # Default Implementation
///
/// Starts and references live in the chunk that owns the section.
pub trait StructureFeatureManager: Send + Sync + 'static {
    fn start_for(
        &self,
        section: SectionPos,
        structure: &str,
        chunk: &ChunkAccess,
    ) -> Option<StructureStart> {
        #![allow(unused_variables)]

        chunk.structure_start(structure).cloned()
    }

    fn set_start(&self, section: SectionPos, start: StructureStart, chunk: &mut ChunkAccess) {
        #![allow(unused_variables)]

        chunk.set_structure_start(start);
    }

    fn add_reference(
        &self,
        section: SectionPos,
        structure: &str,
        origin: ChunkPos,
        chunk: &mut ChunkAccess,
    ) {
        #![allow(unused_variables)]

        chunk.add_reference_for_structure(structure, origin);
    }

    /// The origins of every start of `structure` referenced by `chunk`.
    fn references_for(
        &self,
        section: SectionPos,
        structure: &str,
        chunk: &ChunkAccess,
    ) -> Vec<ChunkPos> {
        #![allow(unused_variables)]

        chunk
            .references_for_structure(structure)
            .map(|refs| refs.iter().map(|&packed| ChunkPos::from_long(packed)).collect())
            .unwrap_or_default()
    }
}

/// Keeps structure metadata in the chunks themselves.
#[derive(Copy, Clone, Default, Debug)]
pub struct ChunkStructures;

impl StructureFeatureManager for ChunkStructures {}

/// Computes light for generated chunks.
pub trait LightEngine: LightListener + 'static {
    /// Lights `chunk`. `already_lit` is true if the chunk's stored light is
    /// known to be correct and only needs to be registered.
    fn light_chunk(&self, chunk: ChunkHandle, already_lit: bool) -> ChunkFuture;

    fn as_listener(self: Arc<Self>) -> Arc<dyn LightListener>;
}

/// Marks chunks as lit without propagating any light.
#[derive(Copy, Clone, Default, Debug)]
pub struct ImmediateLight;

impl LightListener for ImmediateLight {
    fn update_section_status(&self, _pos: SectionPos, _is_empty: bool) {}

    fn check_block(&self, _pos: BlockPos) {}
}

impl LightEngine for ImmediateLight {
    fn light_chunk(&self, chunk: ChunkHandle, _already_lit: bool) -> ChunkFuture {
        chunk.write().set_light_correct(true);
        crate::ready(Ok(chunk))
    }

    fn as_listener(self: Arc<Self>) -> Arc<dyn LightListener> {
        self
    }
}

/// Turns a chunk that finished generating into a live chunk.
pub trait Promoter: Send + Sync + 'static {
    fn promote(&self, chunk: ChunkHandle) -> ChunkFuture;
}

/// Promotes chunks in place, instantiating block entities with a factory.
#[derive(Clone)]
pub struct LivePromoter {
    factory: Arc<dyn BlockEntityFactory>,
}

impl LivePromoter {
    pub fn new(factory: Arc<dyn BlockEntityFactory>) -> Self {
        Self { factory }
    }
}

impl Default for LivePromoter {
    fn default() -> Self {
        Self::new(Arc::new(EmptyBlockEntityFactory))
    }
}

impl Promoter for LivePromoter {
    fn promote(&self, chunk: ChunkHandle) -> ChunkFuture {
        {
            let mut access = chunk.write();
            if !access.is_live() {
                access.promote_to_live(self.factory.clone());
            }
        }
        crate::ready(Ok(chunk))
    }
}

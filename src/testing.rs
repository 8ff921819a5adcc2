//! Helpers for driving the generation pipeline in tests.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use strata_anvil::{ChunkStorage, MemoryStorage};
use strata_chunk::{BiomeSource, CarvingStep, ChunkAccess, ChunkStatus};
use strata_protocol::ChunkPos;
use strata_registry::Registries;
use strata_worldgen::{
    ChunkGenerator, ChunkHandle, ChunkMap, FlatGenerator, GenerationContext, GenerationPipeline,
    LevelInfo, StructureFeatureManager, WorldGenRegion,
};

/// The stages a [`RecordingGenerator`] was asked to run, in call order.
#[derive(Clone, Default, Debug)]
pub struct StageLog(Arc<Mutex<Vec<(ChunkPos, ChunkStatus)>>>);

impl StageLog {
    fn push(&self, pos: ChunkPos, status: ChunkStatus) {
        self.0.lock().push((pos, status));
    }

    pub fn calls(&self) -> Vec<(ChunkPos, ChunkStatus)> {
        self.0.lock().clone()
    }

    /// The stages run for the chunk at `pos`.
    pub fn stages_of(&self, pos: ChunkPos) -> Vec<ChunkStatus> {
        self.0
            .lock()
            .iter()
            .filter(|(p, _)| *p == pos)
            .map(|&(_, status)| status)
            .collect()
    }

    /// How many times `status` ran for any chunk.
    pub fn count(&self, status: ChunkStatus) -> usize {
        self.0.lock().iter().filter(|(_, s)| *s == status).count()
    }
}

/// Wraps a [`FlatGenerator`] and records every generator hook it receives.
pub struct RecordingGenerator {
    inner: FlatGenerator,
    log: StageLog,
}

impl RecordingGenerator {
    pub fn new(inner: FlatGenerator) -> Self {
        Self {
            inner,
            log: StageLog::default(),
        }
    }

    /// A handle to the log that stays valid after the generator is moved
    /// into a pipeline.
    pub fn log(&self) -> StageLog {
        self.log.clone()
    }
}

impl ChunkGenerator for RecordingGenerator {
    fn biome_source(&self) -> &dyn BiomeSource {
        self.inner.biome_source()
    }

    fn create_structures(
        &self,
        chunk: &mut ChunkAccess,
        structures: &dyn StructureFeatureManager,
        level: &LevelInfo,
    ) {
        self.log.push(chunk.pos(), ChunkStatus::StructureStarts);
        self.inner.create_structures(chunk, structures, level);
    }

    fn create_references(
        &self,
        region: &mut WorldGenRegion<'_>,
        structures: &dyn StructureFeatureManager,
    ) {
        self.log
            .push(region.center_pos(), ChunkStatus::StructureReferences);
        self.inner.create_references(region, structures);
    }

    fn create_biomes(&self, chunk: &mut ChunkAccess) {
        self.log.push(chunk.pos(), ChunkStatus::Biomes);
        self.inner.create_biomes(chunk);
    }

    fn fill_from_noise(
        &self,
        region: &mut WorldGenRegion<'_>,
        structures: &dyn StructureFeatureManager,
        level: &LevelInfo,
    ) -> anyhow::Result<()> {
        self.log.push(region.center_pos(), ChunkStatus::Noise);
        self.inner.fill_from_noise(region, structures, level)
    }

    fn build_surface(&self, region: &mut WorldGenRegion<'_>, structures: &dyn StructureFeatureManager) {
        self.log.push(region.center_pos(), ChunkStatus::Surface);
        self.inner.build_surface(region, structures);
    }

    fn apply_carvers(&self, region: &mut WorldGenRegion<'_>, seed: u64, step: CarvingStep) {
        let status = match step {
            CarvingStep::Air => ChunkStatus::Carvers,
            CarvingStep::Liquid => ChunkStatus::LiquidCarvers,
        };
        self.log.push(region.center_pos(), status);
        self.inner.apply_carvers(region, seed, step);
    }

    fn apply_biome_decoration(
        &self,
        region: &mut WorldGenRegion<'_>,
        structures: &dyn StructureFeatureManager,
    ) {
        self.log.push(region.center_pos(), ChunkStatus::Features);
        self.inner.apply_biome_decoration(region, structures);
    }

    fn spawn_original_mobs(&self, region: &mut WorldGenRegion<'_>) {
        self.log.push(region.center_pos(), ChunkStatus::Spawn);
        self.inner.spawn_original_mobs(region);
    }
}

/// A small world of classic flat chunks.
pub struct FlatWorld {
    pub map: Arc<ChunkMap>,
    pub log: StageLog,
    pub registries: Registries,
}

impl FlatWorld {
    /// The world spans `y` in `0..32`.
    pub fn new() -> Self {
        Self::with_storage(MemoryStorage::new())
    }

    pub fn with_storage(storage: impl ChunkStorage + 'static) -> Self {
        let registries = Registries::default();
        let generator = RecordingGenerator::new(
            FlatGenerator::classic(&registries.blocks).expect("classic layers are registered"),
        );
        let log = generator.log();

        let pipeline = GenerationPipeline::new(GenerationContext::new(
            Self::level(),
            registries.clone(),
            generator,
        ));

        Self {
            map: Arc::new(ChunkMap::new(pipeline, storage)),
            log,
            registries,
        }
    }

    pub fn level() -> LevelInfo {
        LevelInfo {
            min_y: 0,
            height: 32,
            ..Default::default()
        }
    }
}

impl Default for FlatWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the square window of fresh chunks around `center`, each already at
/// `status`. The rows are ordered the way the pipeline expects them.
pub fn window(
    registries: &Registries,
    center: ChunkPos,
    radius: u32,
    status: ChunkStatus,
) -> Vec<ChunkHandle> {
    let level = FlatWorld::level();

    center
        .square(radius)
        .map(|pos| {
            let mut chunk = ChunkAccess::new(pos, registries.clone(), level.min_y, level.height);
            chunk.set_status(status);
            Arc::new(RwLock::new(chunk))
        })
        .collect()
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use strata_chunk::ChunkStatus;
use strata_registry::Registries;
use tokio::task;
use tracing::{debug, trace};

use crate::collaborators::{
    ChunkGenerator, ChunkStructures, ImmediateLight, LightEngine, LivePromoter, Promoter,
    StructureFeatureManager,
};
use crate::region::{window_side, WorldGenRegion};
use crate::settings::LevelInfo;
use crate::tasks::{generate_locked, has_load_work, stage_kind, StageKind};
use crate::{ChunkHandle, ChunkLoadingFailure};

/// Everything generation stages have access to.
pub struct GenerationContext {
    pub level: LevelInfo,
    pub registries: Registries,
    pub generator: Arc<dyn ChunkGenerator>,
    pub structures: Arc<dyn StructureFeatureManager>,
    pub light: Arc<dyn LightEngine>,
    pub promoter: Arc<dyn Promoter>,
}

impl GenerationContext {
    /// A context with structure metadata kept in chunks, lighting that marks
    /// chunks lit immediately, and promotion with empty block entities.
    pub fn new(level: LevelInfo, registries: Registries, generator: impl ChunkGenerator) -> Self {
        Self {
            level,
            registries,
            generator: Arc::new(generator),
            structures: Arc::new(ChunkStructures),
            light: Arc::new(ImmediateLight),
            promoter: Arc::new(LivePromoter::default()),
        }
    }

    pub fn with_structures(mut self, structures: impl StructureFeatureManager) -> Self {
        self.structures = Arc::new(structures);
        self
    }

    pub fn with_light(mut self, light: impl LightEngine) -> Self {
        self.light = Arc::new(light);
        self
    }

    pub fn with_promoter(mut self, promoter: impl Promoter) -> Self {
        self.promoter = Arc::new(promoter);
        self
    }
}

/// Runs generation and load stages over windows of chunks.
#[derive(Clone)]
pub struct GenerationPipeline {
    ctx: Arc<GenerationContext>,
    shutdown: Arc<AtomicBool>,
}

/// The square of radius `radius` in the middle of `window`.
#[track_caller]
fn sub_window(window: &[ChunkHandle], radius: u32, status: ChunkStatus) -> Vec<ChunkHandle> {
    let side = window_side(window.len());
    let outer = side / 2;
    let inner = radius as usize;
    assert!(
        inner <= outer,
        "a window of radius {outer} is too small for {status} (range {radius})"
    );

    let start = outer - inner;
    (start..=outer + inner)
        .flat_map(|z| (start..=outer + inner).map(move |x| z * side + x))
        .map(|i| window[i].clone())
        .collect()
}

/// Asserts that every chunk in `window` has reached the status `status`
/// requires at its distance from the center.
#[track_caller]
fn check_neighbors(status: ChunkStatus, window: &[ChunkHandle]) {
    let center = window[window.len() / 2].read().pos();

    for handle in window {
        let chunk = handle.read();
        let distance = chunk.pos().chessboard_distance(center);
        let required = status.dependency(distance);

        assert!(
            chunk.status() >= required,
            "cannot generate {status} for {center:?}: chunk {:?} at distance {distance} is {} \
             but must be at least {required}",
            chunk.pos(),
            chunk.status(),
        );
    }
}

impl GenerationPipeline {
    pub fn new(ctx: GenerationContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn context(&self) -> &GenerationContext {
        &self.ctx
    }

    /// Fails every stage started from now on with
    /// [`ChunkLoadingFailure::Shutdown`].
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            debug!("shutting down chunk generation");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn check_shutdown(&self) -> Result<(), ChunkLoadingFailure> {
        if self.is_shut_down() {
            Err(ChunkLoadingFailure::Shutdown)
        } else {
            Ok(())
        }
    }

    /// Runs every stage after the center chunk's status up to and including
    /// `target`, in order. `window` must be large enough for the range of
    /// each of those stages.
    pub async fn generate(
        &self,
        target: ChunkStatus,
        window: &[ChunkHandle],
    ) -> Result<ChunkHandle, ChunkLoadingFailure> {
        let center = window[window.len() / 2].clone();
        let current = center.read().status();

        for &status in &ChunkStatus::ALL[current.index() + 1..=target.index().max(current.index())] {
            let stage_window = sub_window(window, status.range(), status);
            self.generate_stage(status, &stage_window, false).await?;
        }

        Ok(center)
    }

    /// Runs the generation task of one stage for the center of `window`,
    /// whose radius must be exactly the stage's range.
    ///
    /// A stage the chunk has already reached is skipped unless `force` is
    /// set.
    ///
    /// # Panics
    ///
    /// Panics if a chunk in the window has not reached the status the stage
    /// requires at its distance.
    #[track_caller]
    pub fn generate_stage<'a>(
        &'a self,
        status: ChunkStatus,
        window: &'a [ChunkHandle],
        force: bool,
    ) -> impl std::future::Future<Output = Result<ChunkHandle, ChunkLoadingFailure>> + Send + 'a
    {
        let center = window[window.len() / 2].clone();
        let reached = center.read().status() >= status;

        if !(reached && !force) {
            assert_eq!(
                window_side(window.len()),
                2 * status.range() as usize + 1,
                "the window for {status} must have radius {}",
                status.range()
            );
            check_neighbors(status, window);
        }

        async move {
            self.check_shutdown()?;

            let pos = center.read().pos();
            if reached && !force {
                trace!(?pos, %status, "stage already reached");
                return Ok(center);
            }

            debug!(?pos, %status, "running stage");

            match stage_kind(status) {
                StageKind::Passthrough => {}
                StageKind::Inline => {
                    run_locked(&self.ctx, status, window).map_err(ChunkLoadingFailure::Generator)?;
                }
                StageKind::Blocking => {
                    let ctx = self.ctx.clone();
                    let window = window.to_vec();
                    task::spawn_blocking(move || run_locked(&ctx, status, &window))
                        .await?
                        .map_err(ChunkLoadingFailure::Generator)?;
                }
                StageKind::Deferred => {
                    self.run_deferred(status, center.clone()).await?;
                }
            }

            {
                let mut chunk = center.write();
                chunk.set_status(status);
                chunk.set_unsaved(true);
            }

            debug!(?pos, %status, "finished stage");
            Ok(center)
        }
    }

    async fn run_deferred(
        &self,
        status: ChunkStatus,
        chunk: ChunkHandle,
    ) -> Result<ChunkHandle, ChunkLoadingFailure> {
        match status {
            ChunkStatus::Light => {
                let already_lit = {
                    let access = chunk.read();
                    access.status().is_or_after(ChunkStatus::Light) && access.is_light_correct()
                };
                self.ctx.light.light_chunk(chunk, already_lit).await
            }
            ChunkStatus::Full => self.ctx.promoter.promote(chunk).await,
            _ => Ok(chunk),
        }
    }

    /// Finishes a chunk read from storage at `target` or later. Light is
    /// recomputed if the stored light is not known to be correct, and full
    /// chunks are promoted. No generation work runs.
    pub async fn load(
        &self,
        target: ChunkStatus,
        chunk: ChunkHandle,
    ) -> Result<ChunkHandle, ChunkLoadingFailure> {
        self.check_shutdown()?;

        let pos = chunk.read().pos();
        trace!(?pos, %target, "loading stored chunk");

        let mut chunk = chunk;
        for &status in &ChunkStatus::ALL[..=target.index()] {
            if has_load_work(status) {
                chunk = self.run_deferred(status, chunk).await?;
            }
        }

        chunk.write().set_status(target);
        Ok(chunk)
    }
}

fn run_locked(
    ctx: &GenerationContext,
    status: ChunkStatus,
    window: &[ChunkHandle],
) -> anyhow::Result<()> {
    let mut region = WorldGenRegion::lock(status, window);
    generate_locked(ctx, status, &mut region)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use parking_lot::{Mutex, RwLock};
    use strata_chunk::{BiomeSource, ChunkAccess, HeightmapKind};
    use strata_protocol::{BlockPos, ChunkPos};

    use super::*;
    use crate::flat::{FixedBiome, FlatGenerator};

    fn handles(center: ChunkPos, radius: u32, status: ChunkStatus) -> Vec<ChunkHandle> {
        let registries = Registries::default();
        center
            .square(radius)
            .map(|pos| {
                let mut chunk = ChunkAccess::new(pos, registries.clone(), 0, 64);
                chunk.set_status(status);
                Arc::new(RwLock::new(chunk))
            })
            .collect()
    }

    fn flat_pipeline() -> GenerationPipeline {
        let registries = Registries::default();
        let generator = FlatGenerator::classic(&registries.blocks).unwrap();
        let level = LevelInfo {
            min_y: 0,
            height: 64,
            ..Default::default()
        };
        GenerationPipeline::new(GenerationContext::new(level, registries, generator))
    }

    /// Places one stone block per noise call and records surface calls.
    #[derive(Default)]
    struct Counting {
        biomes: FixedBiome,
        noise: AtomicUsize,
        surface: Mutex<Vec<ChunkPos>>,
    }

    impl ChunkGenerator for Arc<Counting> {
        fn biome_source(&self) -> &dyn BiomeSource {
            &self.biomes
        }

        fn fill_from_noise(
            &self,
            region: &mut WorldGenRegion<'_>,
            _: &dyn StructureFeatureManager,
            _: &LevelInfo,
        ) -> anyhow::Result<()> {
            self.noise.fetch_add(1, Ordering::SeqCst);
            let stone = region.center().blocks().state("stone").unwrap();
            let min = BlockPos::new(
                region.center_pos().min_block_x(),
                0,
                region.center_pos().min_block_z(),
            );
            region.set_block_state(min, stone, false);
            Ok(())
        }

        fn build_surface(&self, region: &mut WorldGenRegion<'_>, _: &dyn StructureFeatureManager) {
            self.surface.lock().push(region.center_pos());
        }
    }

    #[tokio::test]
    async fn runs_missing_stages_in_order() {
        let counting = Arc::new(Counting::default());
        let registries = Registries::default();
        let pipeline = GenerationPipeline::new(GenerationContext::new(
            LevelInfo::default(),
            registries,
            counting.clone(),
        ));

        let window = handles(ChunkPos::new(0, 0), 1, ChunkStatus::Biomes);
        let chunk = pipeline.generate(ChunkStatus::Surface, &window).await.unwrap();

        assert_eq!(chunk.read().status(), ChunkStatus::Surface);
        assert_eq!(counting.noise.load(Ordering::SeqCst), 1);
        assert_eq!(*counting.surface.lock(), [ChunkPos::new(0, 0)]);

        pipeline.generate(ChunkStatus::Biomes, &window).await.unwrap();
        pipeline.generate(ChunkStatus::Surface, &window).await.unwrap();
        assert_eq!(counting.noise.load(Ordering::SeqCst), 1);
        assert_eq!(counting.surface.lock().len(), 1);

        let center = &window[4..5];
        pipeline
            .generate_stage(ChunkStatus::Surface, center, true)
            .await
            .unwrap();
        assert_eq!(counting.surface.lock().len(), 2);
        assert_eq!(window[4].read().status(), ChunkStatus::Surface);
    }

    #[tokio::test]
    async fn flat_chunk_generates_to_full() {
        let pipeline = flat_pipeline();
        let center = ChunkPos::new(3, 3);
        let mut window = handles(center, ChunkStatus::max_distance() - 3, ChunkStatus::Features);
        let fresh = Arc::new(RwLock::new(ChunkAccess::new(
            center,
            pipeline.context().registries.clone(),
            0,
            64,
        )));
        let mid = window.len() / 2;
        window[mid] = fresh.clone();

        for status in ChunkStatus::ALL.into_iter().skip(1) {
            let stage_window = sub_window(&window, status.range(), status);
            pipeline
                .generate_stage(status, &stage_window, false)
                .await
                .unwrap();
        }

        let chunk = fresh.read();
        assert_eq!(chunk.status(), ChunkStatus::Full);
        assert!(chunk.is_live());
        assert!(chunk.is_light_correct());
        assert!(chunk.light_listener().is_some());

        let grass = chunk.blocks().state("grass_block").unwrap();
        assert_eq!(chunk.block_state(BlockPos::new(50, 3, 50)), grass);
        assert_eq!(
            chunk
                .heightmap(HeightmapKind::MotionBlocking)
                .unwrap()
                .first_available(2, 2),
            4
        );
        assert!(chunk.heightmap(HeightmapKind::WorldSurfaceWg).is_none());
    }

    #[tokio::test]
    #[should_panic(expected = "must be at least")]
    async fn generation_without_neighbors_panics() {
        let pipeline = flat_pipeline();
        let window = handles(ChunkPos::new(0, 0), 1, ChunkStatus::Empty);
        window[4].write().set_status(ChunkStatus::Biomes);

        let _ = pipeline.generate_stage(ChunkStatus::Noise, &window, false).await;
    }

    #[tokio::test]
    async fn shut_down_pipelines_fail() {
        let pipeline = flat_pipeline();
        let window = handles(ChunkPos::new(0, 0), 0, ChunkStatus::Empty);

        pipeline.shutdown();
        assert!(matches!(
            pipeline.generate(ChunkStatus::StructureStarts, &window).await,
            Err(ChunkLoadingFailure::Shutdown)
        ));
        assert_eq!(window[0].read().status(), ChunkStatus::Empty);
    }

    #[tokio::test]
    async fn loading_relights_and_promotes() {
        let pipeline = flat_pipeline();
        let window = handles(ChunkPos::new(0, 0), 0, ChunkStatus::Full);
        assert!(!window[0].read().is_light_correct());

        let chunk = pipeline
            .load(ChunkStatus::Full, window[0].clone())
            .await
            .unwrap();
        assert!(chunk.read().is_light_correct());
        assert!(chunk.read().is_live());

        let window = handles(ChunkPos::new(1, 0), 0, ChunkStatus::Surface);
        let chunk = pipeline
            .load(ChunkStatus::Surface, window[0].clone())
            .await
            .unwrap();
        assert!(!chunk.read().is_light_correct());
        assert!(!chunk.read().is_live());
    }
}

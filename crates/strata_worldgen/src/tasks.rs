//! What each generation stage does.
//!
//! The stage set is closed, so both dispatch tables are exhaustive matches
//! over [`ChunkStatus`].

use strata_chunk::{CarvingStep, ChunkStatus};

use crate::pipeline::GenerationContext;
use crate::region::WorldGenRegion;

/// How a stage's work is scheduled.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum StageKind {
    /// Nothing to do beyond stamping the status.
    Passthrough,
    /// Runs to completion on the calling task while the window is locked.
    Inline,
    /// Runs on the blocking pool while the window is locked.
    Blocking,
    /// Handed to a collaborator that returns its own future.
    Deferred,
}

pub const fn stage_kind(status: ChunkStatus) -> StageKind {
    match status {
        ChunkStatus::Empty | ChunkStatus::Heightmaps => StageKind::Passthrough,
        ChunkStatus::StructureStarts
        | ChunkStatus::StructureReferences
        | ChunkStatus::Surface
        | ChunkStatus::Carvers
        | ChunkStatus::LiquidCarvers
        | ChunkStatus::Features
        | ChunkStatus::Spawn => StageKind::Inline,
        ChunkStatus::Biomes | ChunkStatus::Noise => StageKind::Blocking,
        ChunkStatus::Light | ChunkStatus::Full => StageKind::Deferred,
    }
}

/// Runs the generation work of an inline or blocking stage.
pub(crate) fn generate_locked(
    ctx: &GenerationContext,
    status: ChunkStatus,
    region: &mut WorldGenRegion<'_>,
) -> anyhow::Result<()> {
    let generator = &*ctx.generator;
    let structures = &*ctx.structures;

    match status {
        ChunkStatus::Empty | ChunkStatus::Heightmaps | ChunkStatus::Light | ChunkStatus::Full => {}
        ChunkStatus::StructureStarts => {
            if ctx.level.generate_features {
                generator.create_structures(region.center_mut(), structures, &ctx.level);
            }
        }
        ChunkStatus::StructureReferences => generator.create_references(region, structures),
        ChunkStatus::Biomes => generator.create_biomes(region.center_mut()),
        ChunkStatus::Noise => generator.fill_from_noise(region, structures, &ctx.level)?,
        ChunkStatus::Surface => generator.build_surface(region, structures),
        ChunkStatus::Carvers => generator.apply_carvers(region, ctx.level.seed, CarvingStep::Air),
        ChunkStatus::LiquidCarvers => {
            generator.apply_carvers(region, ctx.level.seed, CarvingStep::Liquid)
        }
        ChunkStatus::Features => {
            region
                .center_mut()
                .prime_heightmaps(ChunkStatus::Features.heightmaps_after());
            generator.apply_biome_decoration(region, structures);
            region
                .center_mut()
                .set_light_listener(Some(ctx.light.clone().as_listener()));
        }
        ChunkStatus::Spawn => generator.spawn_original_mobs(region),
    }

    Ok(())
}

/// Whether loading a stored chunk to `status` needs more than a status
/// stamp.
pub(crate) const fn has_load_work(status: ChunkStatus) -> bool {
    matches!(status, ChunkStatus::Light | ChunkStatus::Full)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heavy_stages_leave_the_calling_task() {
        let kinds: Vec<_> = ChunkStatus::ALL.into_iter().map(stage_kind).collect();
        assert_eq!(
            kinds,
            [
                StageKind::Passthrough,
                StageKind::Inline,
                StageKind::Inline,
                StageKind::Blocking,
                StageKind::Blocking,
                StageKind::Inline,
                StageKind::Inline,
                StageKind::Inline,
                StageKind::Inline,
                StageKind::Deferred,
                StageKind::Inline,
                StageKind::Passthrough,
                StageKind::Deferred,
            ]
        );
    }

    #[test]
    fn only_light_and_full_do_load_work() {
        let with_work: Vec<_> = ChunkStatus::ALL
            .into_iter()
            .filter(|&s| has_load_work(s))
            .collect();
        assert_eq!(with_work, [ChunkStatus::Light, ChunkStatus::Full]);
    }
}

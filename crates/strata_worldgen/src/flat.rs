use anyhow::{ensure, Context};
use strata_chunk::BiomeSource;
use strata_protocol::BlockPos;
use strata_registry::{BiomeId, BlockRegistry, BlockState};

use crate::collaborators::{ChunkGenerator, StructureFeatureManager};
use crate::region::WorldGenRegion;
use crate::settings::LevelInfo;

/// The same biome everywhere.
#[derive(Copy, Clone, PartialEq, Eq, Default, Debug)]
pub struct FixedBiome(pub BiomeId);

impl BiomeSource for FixedBiome {
    fn noise_biome(&self, _quart_x: i32, _quart_y: i32, _quart_z: i32) -> BiomeId {
        self.0
    }
}

/// Generates horizontal layers of blocks starting at the bottom of the
/// world.
#[derive(Clone, Debug)]
pub struct FlatGenerator {
    layers: Vec<(BlockState, u32)>,
    biomes: FixedBiome,
}

impl FlatGenerator {
    pub fn new(biome: BiomeId) -> Self {
        Self {
            layers: vec![],
            biomes: FixedBiome(biome),
        }
    }

    /// Adds a layer on top of the existing ones.
    pub fn layer(mut self, state: BlockState, thickness: u32) -> Self {
        self.layers.push((state, thickness));
        self
    }

    /// Bedrock, two layers of dirt and grass on top.
    pub fn classic(blocks: &BlockRegistry) -> anyhow::Result<Self> {
        let state = |name| {
            blocks
                .state(name)
                .with_context(|| format!("missing block state \"{name}\""))
        };

        Ok(Self::new(BiomeId::default())
            .layer(state("bedrock")?, 1)
            .layer(state("dirt")?, 2)
            .layer(state("grass_block")?, 1))
    }

    /// The combined thickness of all layers.
    pub fn thickness(&self) -> u32 {
        self.layers.iter().map(|(_, t)| t).sum()
    }
}

impl ChunkGenerator for FlatGenerator {
    fn biome_source(&self) -> &dyn BiomeSource {
        &self.biomes
    }

    fn fill_from_noise(
        &self,
        region: &mut WorldGenRegion<'_>,
        _structures: &dyn StructureFeatureManager,
        level: &LevelInfo,
    ) -> anyhow::Result<()> {
        ensure!(
            i64::from(self.thickness()) <= i64::from(level.height),
            "flat layers ({}) are thicker than the world ({})",
            self.thickness(),
            level.height
        );

        let pos = region.center_pos();
        let chunk = region.center_mut();
        let (x0, z0) = (pos.min_block_x(), pos.min_block_z());
        let mut y = chunk.min_y();

        for &(state, thickness) in &self.layers {
            for _ in 0..thickness {
                for z in 0..16 {
                    for x in 0..16 {
                        chunk.set_block_state(BlockPos::new(x0 + x, y, z0 + z), state, false);
                    }
                }
                y += 1;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::RwLock;
    use strata_chunk::{ChunkAccess, ChunkStatus, HeightmapKind};
    use strata_protocol::ChunkPos;
    use strata_registry::Registries;

    use super::*;
    use crate::collaborators::ChunkStructures;

    #[test]
    fn fills_layers_from_the_bottom() {
        let registries = Registries::default();
        let generator = FlatGenerator::classic(&registries.blocks).unwrap();
        assert_eq!(generator.thickness(), 4);

        let chunk = ChunkAccess::new(ChunkPos::new(-1, 2), registries.clone(), -16, 48);
        let window = [Arc::new(RwLock::new(chunk))];
        let level = LevelInfo {
            min_y: -16,
            height: 48,
            ..Default::default()
        };

        {
            let mut region = WorldGenRegion::lock(ChunkStatus::Noise, &window);
            generator
                .fill_from_noise(&mut region, &ChunkStructures, &level)
                .unwrap();
        }

        let chunk = window[0].read();
        let blocks = &registries.blocks;
        assert_eq!(chunk.block_state(BlockPos::new(-16, -16, 32)), blocks.state("bedrock").unwrap());
        assert_eq!(chunk.block_state(BlockPos::new(-1, -14, 47)), blocks.state("dirt").unwrap());
        assert_eq!(chunk.block_state(BlockPos::new(-8, -13, 40)), blocks.state("grass_block").unwrap());
        assert_eq!(chunk.block_state(BlockPos::new(-8, -12, 40)), blocks.air());
        assert_eq!(
            chunk
                .heightmap(HeightmapKind::WorldSurfaceWg)
                .unwrap()
                .first_available(5, 5),
            -12
        );
    }

    #[test]
    fn layers_thicker_than_the_world_fail() {
        let registries = Registries::default();
        let stone = registries.blocks.state("stone").unwrap();
        let generator = FlatGenerator::new(BiomeId::default()).layer(stone, 17);

        let chunk = ChunkAccess::new(ChunkPos::new(0, 0), registries, 0, 16);
        let window = [Arc::new(RwLock::new(chunk))];
        let level = LevelInfo {
            min_y: 0,
            height: 16,
            ..Default::default()
        };

        let mut region = WorldGenRegion::lock(ChunkStatus::Noise, &window);
        assert!(generator
            .fill_from_noise(&mut region, &ChunkStructures, &level)
            .is_err());
    }
}

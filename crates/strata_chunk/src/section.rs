use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use strata_protocol::{Decode, Encode};
use strata_registry::{BiomeId, BlockRegistry, BlockState, FluidKind, Registries};
use tracing::trace;

use crate::paletted_container::{PalettedContainer, Strategy};

/// Supplies noise biomes by quart (4 block) coordinates.
pub trait BiomeSource: Send + Sync {
    fn noise_biome(&self, quart_x: i32, quart_y: i32, quart_z: i32) -> BiomeId;
}

impl<F> BiomeSource for F
where
    F: Fn(i32, i32, i32) -> BiomeId + Send + Sync,
{
    fn noise_biome(&self, quart_x: i32, quart_y: i32, quart_z: i32) -> BiomeId {
        self(quart_x, quart_y, quart_z)
    }
}

/// One 16x16x16 slice of a chunk: block states, 4x4x4 biomes, and counters
/// that always match the states.
#[derive(Clone, Debug)]
pub struct LevelChunkSection {
    states: PalettedContainer<BlockState>,
    biomes: PalettedContainer<BiomeId>,
    non_empty_block_count: u16,
    ticking_block_count: u16,
    ticking_fluid_count: u16,
    blocks: Arc<BlockRegistry>,
}

impl LevelChunkSection {
    pub const VOLUME: usize = 4096;

    /// An all-air section with the default biome.
    pub fn new(registries: &Registries) -> Self {
        Self {
            states: PalettedContainer::new(
                Strategy::SectionStates,
                &*registries.blocks,
                registries.blocks.air(),
            ),
            biomes: PalettedContainer::new(
                Strategy::SectionBiomes,
                &*registries.biomes,
                BiomeId::DEFAULT,
            ),
            non_empty_block_count: 0,
            ticking_block_count: 0,
            ticking_fluid_count: 0,
            blocks: registries.blocks.clone(),
        }
    }

    /// Wraps existing containers and recomputes the counters.
    pub fn from_parts(
        states: PalettedContainer<BlockState>,
        biomes: PalettedContainer<BiomeId>,
        blocks: Arc<BlockRegistry>,
    ) -> Self {
        let mut section = Self {
            states,
            biomes,
            non_empty_block_count: 0,
            ticking_block_count: 0,
            ticking_fluid_count: 0,
            blocks,
        };
        section.recalc_block_counts();
        section
    }

    pub fn block_state(&self, x: u32, y: u32, z: u32) -> BlockState {
        self.states.get(x, y, z)
    }

    pub fn fluid(&self, x: u32, y: u32, z: u32) -> FluidKind {
        self.blocks.fluid(self.block_state(x, y, z))
    }

    /// Replaces a block and returns the previous state.
    pub fn set_block_state(&mut self, x: u32, y: u32, z: u32, state: BlockState) -> BlockState {
        self.states.acquire();
        let prev = self.set_block_state_unchecked(x, y, z, state);
        self.states.release();
        prev
    }

    /// Like [`set_block_state`](Self::set_block_state) for callers that
    /// already hold the section via [`acquire`](Self::acquire).
    pub fn set_block_state_unchecked(
        &mut self,
        x: u32,
        y: u32,
        z: u32,
        state: BlockState,
    ) -> BlockState {
        let prev = self.states.swap_unchecked(x, y, z, state);
        if prev == state {
            return prev;
        }

        let blocks = &*self.blocks;

        if !blocks.is_air(prev) {
            self.non_empty_block_count -= 1;
            if blocks.is_randomly_ticking(prev) {
                self.ticking_block_count -= 1;
            }
        }
        if blocks.is_fluid_randomly_ticking(prev) {
            self.ticking_fluid_count -= 1;
        }

        if !blocks.is_air(state) {
            self.non_empty_block_count += 1;
            if blocks.is_randomly_ticking(state) {
                self.ticking_block_count += 1;
            }
        }
        if blocks.is_fluid_randomly_ticking(state) {
            self.ticking_fluid_count += 1;
        }

        prev
    }

    pub fn has_only_air(&self) -> bool {
        self.non_empty_block_count == 0
    }

    pub fn is_randomly_ticking(&self) -> bool {
        self.is_randomly_ticking_blocks() || self.is_randomly_ticking_fluids()
    }

    pub fn is_randomly_ticking_blocks(&self) -> bool {
        self.ticking_block_count > 0
    }

    pub fn is_randomly_ticking_fluids(&self) -> bool {
        self.ticking_fluid_count > 0
    }

    pub fn non_empty_block_count(&self) -> u16 {
        self.non_empty_block_count
    }

    pub fn ticking_block_count(&self) -> u16 {
        self.ticking_block_count
    }

    pub fn ticking_fluid_count(&self) -> u16 {
        self.ticking_fluid_count
    }

    /// Recomputes every counter with a full scan of the states.
    pub fn recalc_block_counts(&mut self) {
        let blocks = &*self.blocks;
        let (mut non_empty, mut ticking, mut fluids) = (0_usize, 0_usize, 0_usize);

        self.states.count(|state, n| {
            if !blocks.is_air(state) {
                non_empty += n;
                if blocks.is_randomly_ticking(state) {
                    ticking += n;
                }
            }
            if blocks.is_fluid_randomly_ticking(state) {
                fluids += n;
            }
        });

        self.non_empty_block_count = non_empty as u16;
        self.ticking_block_count = ticking as u16;
        self.ticking_fluid_count = fluids as u16;
    }

    pub fn states(&self) -> &PalettedContainer<BlockState> {
        &self.states
    }

    pub fn biomes(&self) -> &PalettedContainer<BiomeId> {
        &self.biomes
    }

    pub fn noise_biome(&self, quart_x: u32, quart_y: u32, quart_z: u32) -> BiomeId {
        self.biomes.get(quart_x, quart_y, quart_z)
    }

    pub fn set_noise_biome(&mut self, quart_x: u32, quart_y: u32, quart_z: u32, biome: BiomeId) {
        self.biomes.set(quart_x, quart_y, quart_z, biome);
    }

    /// Samples all 64 biome cells from `source`. The quart coordinates are
    /// those of the section's minimum corner.
    pub fn fill_biomes_from_noise(
        &mut self,
        source: &dyn BiomeSource,
        quart_x: i32,
        quart_y: i32,
        quart_z: i32,
    ) {
        self.biomes.acquire();
        for y in 0..4 {
            for z in 0..4 {
                for x in 0..4 {
                    let biome = source.noise_biome(
                        quart_x + x as i32,
                        quart_y + y as i32,
                        quart_z + z as i32,
                    );
                    self.biomes.swap_unchecked(x, y, z, biome);
                }
            }
        }
        self.biomes.release();
    }

    /// Takes ownership of the block states for a multi step edit.
    pub fn acquire(&self) {
        self.states.acquire();
    }

    pub fn release(&self) {
        self.states.release();
    }

    pub fn maybe_has(&self, pred: impl FnMut(BlockState) -> bool) -> bool {
        self.states.maybe_has(pred)
    }

    /// Number of bytes written by [`Encode::encode`].
    pub fn written_size(&self) -> usize {
        2 + self.states.written_size() + self.biomes.written_size()
    }

    /// Reads the wire form `[i16 non-empty count][states][biomes]`.
    pub fn decode(r: &mut &[u8], registries: &Registries) -> anyhow::Result<Self> {
        let count = i16::decode(r).context("failed to read block count")?;
        let states = PalettedContainer::decode(
            r,
            Strategy::SectionStates,
            &*registries.blocks,
            registries.blocks.air(),
        )
        .context("failed to read block states")?;
        let biomes = PalettedContainer::decode(
            r,
            Strategy::SectionBiomes,
            &*registries.biomes,
            BiomeId::DEFAULT,
        )
        .context("failed to read biomes")?;

        let section = Self::from_parts(states, biomes, registries.blocks.clone());
        if i32::from(count) != i32::from(section.non_empty_block_count) {
            trace!(
                sent = count,
                actual = section.non_empty_block_count,
                "section block count did not match its contents"
            );
        }

        Ok(section)
    }

    pub fn blocks(&self) -> &Arc<BlockRegistry> {
        &self.blocks
    }
}

impl Encode for LevelChunkSection {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        (self.non_empty_block_count as i16).encode(&mut w)?;
        self.states.encode(&mut w)?;
        self.biomes.encode(w)
    }
}

#[cfg(test)]
mod tests {
    use rand::seq::SliceRandom;
    use rand::{thread_rng, Rng};

    use super::*;

    fn counts(section: &LevelChunkSection) -> (u16, u16, u16) {
        (
            section.non_empty_block_count(),
            section.ticking_block_count(),
            section.ticking_fluid_count(),
        )
    }

    #[test]
    fn single_block_round_trip() {
        let registries = Registries::default();
        let stone = registries.blocks.state("stone").unwrap();
        let air = registries.blocks.air();

        let mut section = LevelChunkSection::new(&registries);
        assert!(section.has_only_air());

        assert_eq!(section.set_block_state(3, 10, 7, stone), air);
        assert_eq!(section.block_state(3, 10, 7), stone);
        assert_eq!(section.non_empty_block_count(), 1);

        for y in 0..16 {
            for z in 0..16 {
                for x in 0..16 {
                    if (x, y, z) != (3, 10, 7) {
                        assert_eq!(section.block_state(x, y, z), air);
                    }
                }
            }
        }
    }

    #[test]
    fn counters_match_rescan() {
        let registries = Registries::default();
        let blocks = &registries.blocks;
        let palette: Vec<_> = ["air", "stone", "grass_block", "oak_leaves", "water", "lava"]
            .into_iter()
            .map(|n| blocks.state(n).unwrap())
            .collect();

        let mut rng = thread_rng();
        let mut section = LevelChunkSection::new(&registries);

        for _ in 0..5000 {
            let state = *palette.choose(&mut rng).unwrap();
            section.set_block_state(rng.gen_range(0..16), rng.gen_range(0..16), rng.gen_range(0..16), state);
        }

        let incremental = counts(&section);
        section.recalc_block_counts();
        assert_eq!(incremental, counts(&section));
        assert!(section.is_randomly_ticking_blocks());
        assert!(section.is_randomly_ticking_fluids());
    }

    #[test]
    fn clearing_restores_only_air() {
        let registries = Registries::default();
        let grass = registries.blocks.state("grass_block").unwrap();
        let air = registries.blocks.air();

        let mut section = LevelChunkSection::new(&registries);
        section.set_block_state(0, 0, 0, grass);
        section.set_block_state(0, 0, 0, grass);
        assert_eq!(counts(&section), (1, 1, 0));

        section.set_block_state(0, 0, 0, air);
        assert!(section.has_only_air());
        assert!(!section.is_randomly_ticking());
    }

    #[test]
    fn wire_round_trip() {
        let registries = Registries::default();
        let stone = registries.blocks.state("stone").unwrap();
        let lava = registries.blocks.state("lava").unwrap();

        let mut section = LevelChunkSection::new(&registries);
        for i in 0..16 {
            section.set_block_state(i, i, i, stone);
            section.set_block_state(15 - i, i, 0, lava);
        }
        section.set_noise_biome(1, 2, 3, BiomeId(2));

        let mut buf = vec![];
        section.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), section.written_size());
        assert_eq!(i16::decode(&mut &buf[..2]).unwrap(), 32);

        let mut r = buf.as_slice();
        let decoded = LevelChunkSection::decode(&mut r, &registries).unwrap();
        assert!(r.is_empty());

        assert_eq!(counts(&decoded), counts(&section));
        assert_eq!(decoded.block_state(4, 4, 4), stone);
        assert_eq!(decoded.block_state(11, 4, 0), lava);
        assert_eq!(decoded.noise_biome(1, 2, 3), BiomeId(2));
        assert_eq!(decoded.noise_biome(0, 0, 0), BiomeId::DEFAULT);
    }

    #[test]
    fn biomes_from_noise() {
        let registries = Registries::default();
        let mut section = LevelChunkSection::new(&registries);

        section.fill_biomes_from_noise(
            &|x: i32, y: i32, _z: i32| BiomeId(((x + y).rem_euclid(3)) as u32),
            -4,
            8,
            0,
        );

        assert_eq!(section.noise_biome(0, 0, 0), BiomeId(1));
        assert_eq!(section.noise_biome(1, 0, 3), BiomeId(2));
        assert_eq!(section.noise_biome(3, 1, 0), BiomeId(2));
    }
}

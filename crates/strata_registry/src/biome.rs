//! Biomes and the biome registry. A biome named `plains` always exists and
//! has id 0, which makes [`BiomeId::DEFAULT`] the fallback for unknown or
//! missing biome data.

use std::ops::Deref;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{IdMap, Registry, RegistryIdx};

#[derive(Clone, Debug)]
pub struct BiomeRegistry {
    reg: Registry<BiomeId, Biome>,
}

impl BiomeRegistry {
    pub const PLAINS: &'static str = "plains";

    /// Creates a registry from `(name, biome)` pairs. `plains` is added if it
    /// is missing and moved to the front.
    pub fn new(biomes: impl IntoIterator<Item = (String, Biome)>) -> Self {
        let mut reg = Registry::new();

        for (name, biome) in biomes {
            if let Err(e) = reg.insert(name, biome) {
                warn!("skipping biome: {e}");
            }
        }

        if !reg.swap_to_front(Self::PLAINS) {
            let _ = reg.insert(Self::PLAINS, Biome::default());
            reg.swap_to_front(Self::PLAINS);
        }

        Self { reg }
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let biomes: Vec<(String, Biome)> = serde_json::from_str(json)?;
        Ok(Self::new(biomes))
    }
}

impl Deref for BiomeRegistry {
    type Target = Registry<BiomeId, Biome>;

    fn deref(&self) -> &Self::Target {
        &self.reg
    }
}

impl IdMap<BiomeId> for BiomeRegistry {
    fn id_count(&self) -> usize {
        self.reg.len()
    }

    fn name_of(&self, id: BiomeId) -> Option<&str> {
        self.reg.name(id)
    }

    fn id_of(&self, name: &str) -> Option<BiomeId> {
        self.reg.index_of(name)
    }
}

impl Default for BiomeRegistry {
    fn default() -> Self {
        let biome = |name: &str, temperature, downfall, has_precipitation| {
            (name.to_owned(), Biome {
                temperature,
                downfall,
                has_precipitation,
            })
        };

        Self::new([
            biome("plains", 0.8, 0.4, true),
            biome("desert", 2.0, 0.0, false),
            biome("forest", 0.7, 0.8, true),
            biome("ocean", 0.5, 0.5, true),
            biome("snowy_plains", 0.0, 0.5, true),
            biome("the_void", 0.5, 0.5, false),
        ])
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BiomeId(pub u32);

impl BiomeId {
    pub const DEFAULT: Self = BiomeId(0);
}

impl RegistryIdx for BiomeId {
    const MAX: usize = u32::MAX as usize;

    #[inline]
    fn to_index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    fn from_index(idx: usize) -> Self {
        Self(idx as u32)
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Biome {
    pub temperature: f32,
    pub downfall: f32,
    pub has_precipitation: bool,
}

impl Default for Biome {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            downfall: 0.4,
            has_precipitation: true,
        }
    }
}

//! The fixed sequence of generation stages.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::heightmap::HeightmapKind;

/// Whether a chunk is still under construction or playable.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ChunkType {
    ProtoChunk,
    LevelChunk,
}

#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    #[default]
    Empty,
    StructureStarts,
    StructureReferences,
    Biomes,
    Noise,
    Surface,
    Carvers,
    LiquidCarvers,
    Features,
    Light,
    Spawn,
    Heightmaps,
    Full,
}

const COUNT: usize = 13;

/// Distance from a fully loaded chunk at which each status is sufficient.
/// Walks the stages from last to first accumulating their ranges.
const DISTANCES: [u32; COUNT] = {
    let mut d = [0; COUNT];
    let mut i = COUNT - 1;
    while i > 0 {
        d[i - 1] = d[i] + ChunkStatus::ALL[i].range();
        i -= 1;
    }
    d
};

impl ChunkStatus {
    pub const ALL: [Self; COUNT] = [
        Self::Empty,
        Self::StructureStarts,
        Self::StructureReferences,
        Self::Biomes,
        Self::Noise,
        Self::Surface,
        Self::Carvers,
        Self::LiquidCarvers,
        Self::Features,
        Self::Light,
        Self::Spawn,
        Self::Heightmaps,
        Self::Full,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::StructureStarts => "structure_starts",
            Self::StructureReferences => "structure_references",
            Self::Biomes => "biomes",
            Self::Noise => "noise",
            Self::Surface => "surface",
            Self::Carvers => "carvers",
            Self::LiquidCarvers => "liquid_carvers",
            Self::Features => "features",
            Self::Light => "light",
            Self::Spawn => "spawn",
            Self::Heightmaps => "heightmaps",
            Self::Full => "full",
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// The previous stage. The first stage is its own parent.
    pub const fn parent(self) -> Self {
        match self.index() {
            0 => self,
            i => Self::ALL[i - 1],
        }
    }

    /// The following stage, or `None` for [`ChunkStatus::Full`].
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Full => None,
            _ => Some(Self::ALL[self.index() + 1]),
        }
    }

    pub const fn is_or_after(self, other: Self) -> bool {
        self.index() >= other.index()
    }

    /// Chebyshev distance of neighbors that must be loaded for this stage to
    /// run.
    pub const fn range(self) -> u32 {
        // A stage's range is the widest window its task reads, not a fixed
        // margin. Only structure references scan far (for starts up to 8
        // chunks away). Stages that look at direct neighbors get 1 and the
        // rest are chunk-local. This keeps the pyramid at 11 chunks.
        match self {
            Self::StructureReferences => 8,
            Self::Noise | Self::Features | Self::Light => 1,
            _ => 0,
        }
    }

    /// Chebyshev distance of neighbors this stage is allowed to write to.
    /// `None` means the stage only reads its neighborhood.
    pub const fn write_radius(self) -> Option<u32> {
        match self {
            Self::StructureReferences | Self::Biomes | Self::Spawn => None,
            Self::Features => Some(1),
            _ => Some(0),
        }
    }

    pub const fn chunk_type(self) -> ChunkType {
        match self {
            Self::Full => ChunkType::LevelChunk,
            _ => ChunkType::ProtoChunk,
        }
    }

    /// The heightmaps maintained once a chunk has reached this status.
    pub const fn heightmaps_after(self) -> &'static [HeightmapKind] {
        if self.index() <= Self::Carvers.index() {
            HeightmapKind::PRE_FEATURES
        } else {
            HeightmapKind::POST_FEATURES
        }
    }

    /// How far from a fully loaded chunk a chunk with this status may be.
    pub const fn distance(self) -> u32 {
        DISTANCES[self.index()]
    }

    pub const fn max_distance() -> u32 {
        DISTANCES[0]
    }

    /// The highest status sufficient for a chunk `distance` away from a
    /// fully loaded one.
    pub const fn status_around_full_chunk(distance: u32) -> Self {
        if distance > Self::max_distance() {
            return Self::Empty;
        }

        let mut i = COUNT - 1;
        while DISTANCES[i] < distance {
            i -= 1;
        }
        Self::ALL[i]
    }

    /// The minimum status a neighbor `distance` away must have before this
    /// stage can run.
    pub const fn dependency(self, distance: u32) -> Self {
        if distance == 0 {
            self.parent()
        } else {
            Self::status_around_full_chunk(self.distance() + distance)
        }
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

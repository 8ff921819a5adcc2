#![doc = include_str!("../README.md")]
#![deny(
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links,
    rustdoc::missing_crate_level_docs,
    rustdoc::invalid_codeblock_attributes,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::bare_urls,
    rustdoc::invalid_html_tags
)]
#![warn(
    trivial_casts,
    trivial_numeric_casts,
    unused_lifetimes,
    unused_import_braces,
    unreachable_pub,
    clippy::dbg_macro
)]

#[cfg(feature = "testing")]
pub mod testing;


#[cfg(feature = "anvil")]
pub use strata_anvil as anvil;
pub use {
    strata_chunk as chunk, strata_protocol as protocol, strata_registry as registry,
    strata_worldgen as worldgen,
};

/// Contains the most frequently used items.
pub mod prelude {
    #[cfg(feature = "anvil")]
    pub use strata_anvil::{ChunkStorage, MemoryStorage, RegionFolder};
    pub use strata_chunk::{
        BulkSectionAccess, ChunkAccess, ChunkStatus, HeightmapKind, LevelChunkSection,
        PalettedContainer, Strategy,
    };
    pub use strata_protocol::{BlockPos, ChunkPos, SectionPos};
    pub use strata_registry::{BiomeId, BlockState, Registries};
    #[cfg(feature = "bevy_plugin")]
    pub use strata_worldgen::{ChunkGeneratedEvent, WorldGen, WorldGenPlugin};
    pub use strata_worldgen::{
        ChunkGenerator, ChunkHandle, ChunkLoadingFailure, ChunkMap, FlatGenerator,
        GenerationContext, GenerationPipeline, GenerationSettings, LevelInfo, WorldGenRegion,
    };
}

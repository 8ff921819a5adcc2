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

pub mod bit_storage;
mod block_entity;
mod bulk;
mod chunk;
pub mod heightmap;
pub mod palette;
pub mod paletted_container;
mod section;
mod status;
mod structure;
pub mod threading;
pub mod ticks;

pub use bit_storage::{BitStorage, BitStorageError};
pub use block_entity::{BlockEntity, BlockEntityFactory, BlockEntityTag, EmptyBlockEntityFactory};
pub use bulk::{BulkSectionAccess, SectionAccess};
pub use chunk::{
    BuildingData, CarvingMask, CarvingStep, ChunkAccess, ChunkPhase, LightListener, LiveData,
};
pub use heightmap::{Heightmap, HeightmapKind};
pub use palette::{Palette, PaletteKind};
pub use paletted_container::{PalettedContainer, PalettedData, PalettedDecodeError, Strategy};
pub use section::{BiomeSource, LevelChunkSection};
pub use status::{ChunkStatus, ChunkType};
pub use structure::{BoundingBox, StructureStart};
pub use threading::ThreadingDetector;
pub use ticks::{SavedTick, ScheduledTick, TickPriority, TickSchedule};

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

pub mod biome;
pub mod block;
mod registry;

use std::sync::Arc;

pub use biome::{Biome, BiomeId, BiomeRegistry};
pub use block::{
    BlockCatalog, BlockEntityKind, BlockKind, BlockRegistry, BlockState, BlockStateInfo, FluidKind,
    StateFlags,
};
pub use registry::{Registry, RegistryError};

/// Types that can be used as dense indices into a [`Registry`].
pub trait RegistryIdx: Copy + Eq + std::hash::Hash + Send + Sync + 'static {
    /// The largest index representable by this type.
    const MAX: usize;

    fn to_index(self) -> usize;
    fn from_index(idx: usize) -> Self;
}

/// Something that knows how many ids of type `I` exist.
///
/// Paletted containers use this to size the global (direct id) strategy.
pub trait IdMap<I: RegistryIdx> {
    /// Number of valid ids. Valid ids are `0..id_count()`.
    fn id_count(&self) -> usize;

    fn contains(&self, id: I) -> bool {
        id.to_index() < self.id_count()
    }

    /// The registry name of `id`, if it exists.
    fn name_of(&self, id: I) -> Option<&str>;

    fn id_of(&self, name: &str) -> Option<I>;
}

/// The bundle of registries that chunk storage is parameterized over.
#[derive(Clone, Debug)]
pub struct Registries {
    pub blocks: Arc<BlockRegistry>,
    pub biomes: Arc<BiomeRegistry>,
}

impl Registries {
    pub fn new(blocks: BlockRegistry, biomes: BiomeRegistry) -> Self {
        Self {
            blocks: Arc::new(blocks),
            biomes: Arc::new(biomes),
        }
    }
}

/// The built-in catalog. Suitable for tests and tools.
impl Default for Registries {
    fn default() -> Self {
        Self::new(BlockRegistry::default(), BiomeRegistry::default())
    }
}

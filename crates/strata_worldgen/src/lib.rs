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

#[cfg(feature = "bevy_plugin")]
pub mod bevy;
mod chunk_map;
mod collaborators;
mod flat;
mod pipeline;
mod region;
mod settings;
mod tasks;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

#[cfg(feature = "bevy_plugin")]
pub use bevy::{ChunkGeneratedEvent, WorldGen, WorldGenPlugin};
pub use chunk_map::ChunkMap;
pub use collaborators::{
    ChunkGenerator, ChunkStructures, ImmediateLight, LightEngine, LivePromoter, Promoter,
    StructureFeatureManager,
};
pub use flat::{FixedBiome, FlatGenerator};
use parking_lot::RwLock;
pub use pipeline::{GenerationContext, GenerationPipeline};
pub use region::WorldGenRegion;
pub use settings::{GenerationSettings, LevelInfo};
use strata_anvil::StorageError;
use strata_chunk::ChunkAccess;
pub use tasks::{stage_kind, StageKind};
use thiserror::Error;
use tokio::task::JoinError;

/// A chunk shared between the generation pipeline and its users.
pub type ChunkHandle = Arc<RwLock<ChunkAccess>>;

/// The eventual result of bringing a chunk to some status.
pub type ChunkFuture = Pin<Box<dyn Future<Output = Result<ChunkHandle, ChunkLoadingFailure>> + Send>>;

/// Wraps a finished result in a [`ChunkFuture`].
pub fn ready(result: Result<ChunkHandle, ChunkLoadingFailure>) -> ChunkFuture {
    Box::pin(std::future::ready(result))
}

/// Why a chunk could not be brought to the requested status.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChunkLoadingFailure {
    #[error("chunk generation was shut down")]
    Shutdown,
    #[error("generation task did not complete: {0}")]
    Cancelled(#[from] JoinError),
    #[error("chunk generator failed: {0:#}")]
    Generator(anyhow::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

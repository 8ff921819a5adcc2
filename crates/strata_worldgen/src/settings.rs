use std::path::{Path, PathBuf};

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use strata_anvil::{Compression, RegionFolder};
use tokio::runtime::{Builder, Runtime};

/// The properties of the world every generation stage sees.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct LevelInfo {
    pub seed: u64,
    pub min_y: i32,
    pub height: u32,
    /// Whether structures and features are placed.
    pub generate_features: bool,
}

impl LevelInfo {
    pub fn max_y(&self) -> i32 {
        self.min_y + self.height as i32
    }
}

impl Default for LevelInfo {
    fn default() -> Self {
        GenerationSettings::default().level_info()
    }
}

/// Settings for chunk generation and storage. Usually read from a TOML file
/// where every field is optional.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// The world seed handed to the generator.
    ///
    /// # Default Value
    ///
    /// `0`
    pub seed: u64,
    /// The lowest buildable Y. Must be a multiple of 16.
    ///
    /// # Default Value
    ///
    /// `-64`
    pub min_y: i32,
    /// The number of buildable blocks above `min_y`. Must be a positive
    /// multiple of 16.
    ///
    /// # Default Value
    ///
    /// `384`
    pub height: u32,
    /// # Default Value
    ///
    /// `true`
    pub generate_features: bool,
    /// The number of tokio worker threads running generation stages. `None`
    /// uses one per core.
    ///
    /// # Default Value
    ///
    /// `None`
    pub worker_threads: Option<usize>,
    /// Ignore stored chunks and generate everything from scratch. Chunks
    /// saved afterwards overwrite the stored ones.
    ///
    /// # Default Value
    ///
    /// `false`
    pub force_regeneration: bool,
    /// The directory containing the region files.
    ///
    /// # Default Value
    ///
    /// `world/region`
    pub region_root: PathBuf,
    /// The compression used when writing chunks.
    ///
    /// # Default Value
    ///
    /// [`Compression::Zlib`]
    pub compression: Compression,
    /// Fail to write chunks that do not fit in a region file instead of
    /// storing them in separate files.
    ///
    /// # Default Value
    ///
    /// `false`
    pub skip_oversized_chunks: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            min_y: -64,
            height: 384,
            generate_features: true,
            worker_threads: None,
            force_regeneration: false,
            region_root: PathBuf::from("world/region"),
            compression: Compression::default(),
            skip_oversized_chunks: false,
        }
    }
}

impl GenerationSettings {
    pub fn from_toml(toml: &str) -> anyhow::Result<Self> {
        let settings: Self = toml::from_str(toml).context("invalid generation settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let toml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&toml)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.min_y % 16 == 0,
            "min_y must be a multiple of 16 (got {})",
            self.min_y
        );
        ensure!(
            self.height > 0 && self.height % 16 == 0,
            "height must be a positive multiple of 16 (got {})",
            self.height
        );
        ensure!(
            i64::from(self.min_y) + i64::from(self.height) <= i64::from(i32::MAX),
            "world top exceeds the coordinate range"
        );
        ensure!(
            self.worker_threads != Some(0),
            "worker_threads must be at least 1"
        );
        Ok(())
    }

    pub fn level_info(&self) -> LevelInfo {
        LevelInfo {
            seed: self.seed,
            min_y: self.min_y,
            height: self.height,
            generate_features: self.generate_features,
        }
    }

    /// Opens the configured region directory with the configured write
    /// options.
    pub fn region_folder(&self) -> RegionFolder {
        RegionFolder::new(&self.region_root)
            .with_compression(self.compression)
            .with_external_payloads(!self.skip_oversized_chunks)
    }

    /// Builds the runtime that generation stages run on.
    pub fn build_runtime(&self) -> std::io::Result<Runtime> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name("strata-worldgen");
        if let Some(threads) = self.worker_threads {
            builder.worker_threads(threads);
        }
        builder.build()
    }
}

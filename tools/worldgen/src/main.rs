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
    clippy::dbg_macro
)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use strata::prelude::*;
use tokio::task::JoinSet;
use tracing::{info, Level};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// A TOML settings file. Missing fields use their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write region files. Overrides `region_root` from the
    /// settings.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// How many chunks to generate in every direction around the center.
    #[arg(short, long, default_value_t = 2)]
    radius: u32,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    center_x: i32,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    center_z: i32,

    /// The status every chunk in the square is brought to.
    #[arg(short, long, default_value = "full", value_parser = parse_status)]
    status: ChunkStatus,

    #[arg(long, default_value = "info")]
    log_level: Level,
}

fn parse_status(name: &str) -> Result<ChunkStatus, String> {
    ChunkStatus::by_name(name).ok_or_else(|| {
        let names: Vec<_> = ChunkStatus::ALL.iter().map(|s| s.name()).collect();
        format!("expected one of {}", names.join(", "))
    })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).init();

    let mut settings = match &cli.config {
        Some(path) => GenerationSettings::load(path)?,
        None => GenerationSettings::default(),
    };
    if let Some(output) = cli.output {
        settings.region_root = output;
    }
    settings.validate()?;

    let registries = Registries::default();
    let generator = FlatGenerator::classic(&registries.blocks)?;
    let ctx = GenerationContext::new(settings.level_info(), registries, generator);

    let map = Arc::new(
        ChunkMap::new(GenerationPipeline::new(ctx), settings.region_folder())
            .with_force_regeneration(settings.force_regeneration),
    );
    let runtime = settings
        .build_runtime()
        .context("failed to start the generation runtime")?;

    let center = ChunkPos::new(cli.center_x, cli.center_z);
    let start = Instant::now();

    runtime.block_on(async {
        let mut requests = JoinSet::new();
        for pos in center.square(cli.radius) {
            requests.spawn(map.get_chunk(pos, cli.status));
        }

        while let Some(result) = requests.join_next().await {
            result??;
        }

        anyhow::Ok(())
    })?;

    info!(
        requested = (2 * cli.radius + 1).pow(2),
        loaded = map.loaded_count(),
        elapsed = ?start.elapsed(),
        "generated chunks"
    );

    let saved = map.save_all()?;
    info!(saved, root = %settings.region_root.display(), "saved chunks");

    Ok(())
}

use std::collections::BTreeSet;
use std::sync::Arc;

use strata_chunk::ChunkStatus;
use strata_protocol::{BlockPos, ChunkPos};

use crate::testing::{window, FlatWorld};

/// Stages that call into the generator.
fn has_hook(status: ChunkStatus) -> bool {
    !matches!(
        status,
        ChunkStatus::Empty | ChunkStatus::Light | ChunkStatus::Heightmaps | ChunkStatus::Full
    )
}

#[tokio::test]
async fn stages_run_in_order() {
    let world = FlatWorld::new();
    let pos = ChunkPos::new(4, 7);

    let chunk = world.map.get_chunk(pos, ChunkStatus::Full).await.unwrap();
    assert_eq!(chunk.read().status(), ChunkStatus::Full);

    let expected: Vec<_> = ChunkStatus::ALL
        .into_iter()
        .filter(|&status| has_hook(status))
        .collect();
    assert_eq!(world.log.stages_of(pos), expected);
}

#[tokio::test]
async fn neighbors_are_ready_before_a_stage_runs() {
    let world = FlatWorld::new();
    let center = ChunkPos::new(0, 0);

    world
        .map
        .get_chunk(center, ChunkStatus::Features)
        .await
        .unwrap();

    let calls = world.log.calls();
    let index_of = |pos, status| calls.iter().position(|&call| call == (pos, status));
    let features = index_of(center, ChunkStatus::Features).unwrap();

    for neighbor in center.square(ChunkStatus::Features.range()) {
        let distance = neighbor.chessboard_distance(center);
        if distance == 0 {
            continue;
        }

        let required = ChunkStatus::Features.dependency(distance);
        if has_hook(required) {
            let ran = index_of(neighbor, required)
                .unwrap_or_else(|| panic!("{required} never ran for {neighbor:?}"));
            assert!(ran < features, "{required} ran late for {neighbor:?}");
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_requests_run_each_stage_once() {
    let world = FlatWorld::new();

    let (a, b) = tokio::join!(
        world.map.get_chunk(ChunkPos::new(0, 0), ChunkStatus::Full),
        world.map.get_chunk(ChunkPos::new(1, 0), ChunkStatus::Full),
    );
    a.unwrap();
    b.unwrap();

    let positions: BTreeSet<_> = world.log.calls().into_iter().map(|(pos, _)| pos).collect();
    for pos in positions {
        let stages = world.log.stages_of(pos);
        let unique: BTreeSet<_> = stages.iter().copied().collect();
        assert_eq!(unique.len(), stages.len(), "{pos:?} ran {stages:?}");
    }
}

#[tokio::test]
async fn status_never_goes_backwards() {
    let world = FlatWorld::new();
    let pos = ChunkPos::new(-2, 3);

    let full = world.map.get_chunk(pos, ChunkStatus::Full).await.unwrap();
    let calls = world.log.calls().len();

    let again = world.map.get_chunk(pos, ChunkStatus::Noise).await.unwrap();
    assert!(Arc::ptr_eq(&full, &again));
    assert_eq!(again.read().status(), ChunkStatus::Full);
    assert_eq!(world.log.calls().len(), calls);
}

#[tokio::test]
async fn pipeline_advances_a_prepared_window() {
    let world = FlatWorld::new();
    let center = ChunkPos::new(5, 5);
    let handles = window(
        &world.registries,
        center,
        ChunkStatus::Noise.range(),
        ChunkStatus::Biomes,
    );

    let chunk = world
        .map
        .pipeline()
        .generate(ChunkStatus::Noise, &handles)
        .await
        .unwrap();

    assert_eq!(world.log.calls(), [(center, ChunkStatus::Noise)]);

    let chunk = chunk.read();
    let blocks = &world.registries.blocks;
    let (x, z) = (center.min_block_x() + 3, center.min_block_z() + 9);
    assert_eq!(chunk.status(), ChunkStatus::Noise);
    assert_eq!(chunk.block_state(BlockPos::new(x, 0, z)), blocks.state("bedrock").unwrap());
    assert_eq!(chunk.block_state(BlockPos::new(x, 3, z)), blocks.state("grass_block").unwrap());
    assert_eq!(chunk.block_state(BlockPos::new(x, 4, z)), blocks.air());
}

use std::sync::Arc;
use std::thread;

use bevy_app::prelude::*;
use bevy_ecs::prelude::*;
use flume::{Receiver, Sender};
use rustc_hash::FxHashMap;
use strata_chunk::ChunkStatus;
use strata_protocol::ChunkPos;
use tokio::runtime::Runtime;
use tracing::{error, warn};

use crate::{
    ChunkHandle, ChunkLoadingFailure, ChunkMap, GenerationContext, GenerationPipeline,
    GenerationSettings,
};

type WorkerResult = Result<ChunkHandle, ChunkLoadingFailure>;

/// Runs a [`ChunkMap`] on a worker thread. Insert this resource and add
/// [`WorldGenPlugin`] to generate chunks in the background.
#[derive(Resource)]
pub struct WorldGen {
    /// Worker state to be moved to the worker thread.
    worker_state: Option<WorkerState>,
    map: Arc<ChunkMap>,
    /// Requests that have not been sent to the worker yet, with the highest
    /// status requested for each position.
    pending: FxHashMap<ChunkPos, ChunkStatus>,
    /// Sender for the worker thread.
    sender: Sender<(ChunkPos, ChunkStatus)>,
    /// Receiver for the worker thread.
    receiver: Receiver<(ChunkPos, ChunkStatus, WorkerResult)>,
}

struct WorkerState {
    map: Arc<ChunkMap>,
    // The stages run on this runtime, so it lives as long as the worker.
    runtime: Runtime,
    sender: Sender<(ChunkPos, ChunkStatus, WorkerResult)>,
    receiver: Receiver<(ChunkPos, ChunkStatus)>,
}

impl WorldGen {
    pub fn new(map: ChunkMap, runtime: Runtime) -> Self {
        let (pending_sender, pending_receiver) = flume::unbounded();
        let (finished_sender, finished_receiver) = flume::bounded(4096);
        let map = Arc::new(map);

        Self {
            worker_state: Some(WorkerState {
                map: map.clone(),
                runtime,
                sender: finished_sender,
                receiver: pending_receiver,
            }),
            map,
            pending: FxHashMap::default(),
            sender: pending_sender,
            receiver: finished_receiver,
        }
    }

    /// Builds the runtime and the region storage described by `settings`.
    pub fn from_settings(settings: &GenerationSettings, ctx: GenerationContext) -> anyhow::Result<Self> {
        settings.validate()?;

        let map = ChunkMap::new(GenerationPipeline::new(ctx), settings.region_folder())
            .with_force_regeneration(settings.force_regeneration);

        Ok(Self::new(map, settings.build_runtime()?))
    }

    pub fn map(&self) -> &Arc<ChunkMap> {
        &self.map
    }

    /// Requests the chunk at `pos` at `status` or later. A
    /// [`ChunkGeneratedEvent`] is sent once it is ready.
    pub fn request(&mut self, pos: ChunkPos, status: ChunkStatus) {
        let entry = self.pending.entry(pos).or_insert(status);
        *entry = (*entry).max(status);
    }
}

pub struct WorldGenPlugin;

impl Plugin for WorldGenPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<ChunkGeneratedEvent>().add_systems(
            PostUpdate,
            (start_worker, send_recv_chunks)
                .chain()
                .run_if(resource_exists::<WorldGen>),
        );
    }
}

fn start_worker(mut world_gen: ResMut<WorldGen>) {
    if let Some(state) = world_gen.worker_state.take() {
        thread::spawn(move || worldgen_worker(state));
    }
}

fn send_recv_chunks(world_gen: ResMut<WorldGen>, mut events: EventWriter<ChunkGeneratedEvent>) {
    let world_gen = world_gen.into_inner();

    for (pos, status, result) in world_gen.receiver.drain() {
        if let Err(e) = &result {
            warn!(?pos, %status, "failed to generate chunk: {e}");
        }

        events.send(ChunkGeneratedEvent {
            pos,
            status,
            result,
        });
    }

    for (pos, status) in world_gen.pending.drain() {
        let _ = world_gen.sender.try_send((pos, status));
    }
}

fn worldgen_worker(state: WorkerState) {
    let WorkerState {
        map,
        runtime,
        sender,
        receiver,
    } = state;

    while let Ok((pos, status)) = receiver.recv() {
        let map = map.clone();
        let sender = sender.clone();

        runtime.spawn(async move {
            let result = map.get_chunk(pos, status).await;
            let _ = sender.send((pos, status, result));
        });
    }

    // The resource was dropped.
    map.shutdown();
    if let Err(e) = map.save_all() {
        error!("failed to save chunks after shutting down: {e}");
    }
}

/// Sent after a requested chunk reached its status or failed to.
#[derive(Event, Debug)]
pub struct ChunkGeneratedEvent {
    pub pos: ChunkPos,
    /// The status that was requested.
    pub status: ChunkStatus,
    pub result: Result<ChunkHandle, ChunkLoadingFailure>,
}

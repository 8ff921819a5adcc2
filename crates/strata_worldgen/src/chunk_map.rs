use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use strata_anvil::{ChunkRecord, ChunkStorage, StorageError};
use strata_chunk::{ChunkAccess, ChunkStatus};
use strata_protocol::ChunkPos;
use tokio::sync::OnceCell;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, warn};

use crate::pipeline::GenerationPipeline;
use crate::{ChunkFuture, ChunkHandle, ChunkLoadingFailure};

/// A map entry. It is inserted before the chunk is read or created, so every
/// request for the position waits on the same load.
#[derive(Default)]
struct ChunkSlot {
    /// Empty until the load finishes. A failed load leaves it empty and the
    /// next request retries.
    handle: OnceCell<ChunkHandle>,
    /// Held while a stage runs for this chunk so one stage runs at a time.
    stage: tokio::sync::Mutex<()>,
}

/// Decrements the outstanding request count when a request finishes or is
/// dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn new(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        Self(count)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Owns every loaded chunk and brings chunks to requested statuses.
///
/// Before a stage runs for a chunk, every neighbor within the stage's range
/// is brought to the status the stage needs at that distance. Neighbors are
/// requested concurrently on the runtime, so generating one chunk to
/// [`ChunkStatus::Full`] partially generates the pyramid of chunks around
/// it.
pub struct ChunkMap {
    pipeline: GenerationPipeline,
    chunks: Mutex<FxHashMap<ChunkPos, Arc<ChunkSlot>>>,
    storage: Arc<Mutex<Box<dyn ChunkStorage>>>,
    force_regeneration: bool,
    game_time: AtomicI64,
    in_flight: AtomicUsize,
}

impl ChunkMap {
    pub fn new(pipeline: GenerationPipeline, storage: impl ChunkStorage + 'static) -> Self {
        Self {
            pipeline,
            chunks: Mutex::new(FxHashMap::default()),
            storage: Arc::new(Mutex::new(Box::new(storage))),
            force_regeneration: false,
            game_time: AtomicI64::new(0),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Ignore stored chunks and generate every chunk from scratch.
    pub fn with_force_regeneration(mut self, force: bool) -> Self {
        self.force_regeneration = force;
        self
    }

    pub fn pipeline(&self) -> &GenerationPipeline {
        &self.pipeline
    }

    /// The game time scheduled ticks are saved and loaded relative to.
    pub fn game_time(&self) -> i64 {
        self.game_time.load(Ordering::Relaxed)
    }

    pub fn set_game_time(&self, time: i64) {
        self.game_time.store(time, Ordering::Relaxed);
    }

    /// The number of requests that have not finished yet, including the
    /// neighbor requests made on their behalf.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn loaded_count(&self) -> usize {
        self.chunks
            .lock()
            .values()
            .filter(|slot| slot.handle.initialized())
            .count()
    }

    /// The chunk at `pos` if it is in memory, at whatever status it has.
    pub fn get_if_loaded(&self, pos: ChunkPos) -> Option<ChunkHandle> {
        self.chunks
            .lock()
            .get(&pos)
            .and_then(|slot| slot.handle.get().cloned())
    }

    /// Brings the chunk at `pos` to at least `target`, loading it from
    /// storage or generating it as needed.
    ///
    /// This must be polled within a tokio runtime.
    pub fn get_chunk(self: &Arc<Self>, pos: ChunkPos, target: ChunkStatus) -> ChunkFuture {
        let this = self.clone();
        Box::pin(async move {
            let _in_flight = InFlight::new(&this.in_flight);
            this.ensure(pos, target).await
        })
    }

    /// Fails requests made from now on as well as the stages of requests in
    /// progress.
    pub fn shutdown(&self) {
        self.pipeline.shutdown();
    }

    async fn ensure(
        self: &Arc<Self>,
        pos: ChunkPos,
        target: ChunkStatus,
    ) -> Result<ChunkHandle, ChunkLoadingFailure> {
        let (slot, handle) = self.slot(pos).await?;

        loop {
            if self.pipeline.is_shut_down() {
                return Err(ChunkLoadingFailure::Shutdown);
            }

            let current = handle.read().status();
            if current >= target {
                return Ok(handle);
            }
            let Some(next) = current.next() else {
                return Ok(handle);
            };

            self.ensure_neighbors(pos, next).await?;

            let _stage = slot.stage.lock().await;
            if handle.read().status() >= next {
                continue;
            }

            let window = self.window(pos, next);
            self.pipeline.generate_stage(next, &window, false).await?;
        }
    }

    async fn ensure_neighbors(
        self: &Arc<Self>,
        pos: ChunkPos,
        status: ChunkStatus,
    ) -> Result<(), ChunkLoadingFailure> {
        let range = status.range();
        if range == 0 {
            return Ok(());
        }

        let mut requests = JoinSet::new();
        for neighbor in pos.square(range) {
            let distance = neighbor.chessboard_distance(pos);
            if distance == 0 {
                continue;
            }

            let required = status.dependency(distance);
            let satisfied = self
                .get_if_loaded(neighbor)
                .is_some_and(|handle| handle.read().status() >= required);

            if !satisfied {
                requests.spawn(self.get_chunk(neighbor, required));
            }
        }

        while let Some(result) = requests.join_next().await {
            result??;
        }

        Ok(())
    }

    /// The window of loaded chunks `status` runs over for `pos`.
    fn window(&self, pos: ChunkPos, status: ChunkStatus) -> Vec<ChunkHandle> {
        let chunks = self.chunks.lock();
        let window: Option<Vec<_>> = pos
            .square(status.range())
            .map(|p| chunks.get(&p).and_then(|slot| slot.handle.get().cloned()))
            .collect();

        let Some(window) = window else {
            unreachable!("neighbors of {pos:?} are loaded before {status} runs")
        };
        window
    }

    async fn slot(
        &self,
        pos: ChunkPos,
    ) -> Result<(Arc<ChunkSlot>, ChunkHandle), ChunkLoadingFailure> {
        let slot = self.chunks.lock().entry(pos).or_default().clone();

        let handle = slot
            .handle
            .get_or_try_init(|| self.load_or_create(pos))
            .await?
            .clone();

        Ok((slot, handle))
    }

    async fn load_or_create(&self, pos: ChunkPos) -> Result<ChunkHandle, ChunkLoadingFailure> {
        let ctx = self.pipeline.context();
        let level = ctx.level;

        if !self.force_regeneration {
            let storage = self.storage.clone();
            let record = task::spawn_blocking(move || storage.lock().read(pos)).await?;

            match record {
                Ok(Some(record)) => {
                    match record.into_chunk(
                        &ctx.registries,
                        pos,
                        level.min_y,
                        level.height,
                        self.game_time(),
                    ) {
                        Ok(chunk) => {
                            let status = chunk.status();
                            debug!(?pos, %status, "loaded stored chunk");
                            let handle = Arc::new(RwLock::new(chunk));
                            return self.pipeline.load(status, handle).await;
                        }
                        Err(e) => warn!(?pos, "discarding invalid chunk record: {e}"),
                    }
                }
                Ok(None) => {}
                Err(StorageError::Encoding(e)) => {
                    warn!(?pos, "discarding undecodable chunk record: {e}")
                }
                Err(e) => {
                    error!(?pos, "failed to read chunk: {e}");
                    return Err(e.into());
                }
            }
        }

        Ok(Arc::new(RwLock::new(ChunkAccess::new(
            pos,
            ctx.registries.clone(),
            level.min_y,
            level.height,
        ))))
    }

    /// Writes every chunk with unsaved changes to storage and returns how
    /// many were written. This blocks on storage I/O.
    pub fn save_all(&self) -> Result<usize, StorageError> {
        let handles: Vec<_> = self
            .chunks
            .lock()
            .values()
            .filter_map(|slot| slot.handle.get().cloned())
            .collect();

        let mut storage = self.storage.lock();
        let time = self.game_time();
        let mut saved = 0;

        for handle in handles {
            let record = {
                let chunk = handle.read();
                if !chunk.is_unsaved() {
                    continue;
                }
                ChunkRecord::from_chunk(&chunk, time)
            };

            if let Err(e) = storage.write(&record) {
                error!(pos = ?record.pos, "failed to save chunk: {e}");
                return Err(e);
            }
            handle.write().set_unsaved(false);
            saved += 1;
        }

        debug!(saved, "saved chunks");
        Ok(saved)
    }

    /// Saves the chunk at `pos` if needed and drops it from memory. Returns
    /// whether it was loaded. Chunks that are still being read are kept.
    pub fn unload(&self, pos: ChunkPos) -> Result<bool, StorageError> {
        let handle = {
            let mut chunks = self.chunks.lock();
            let Some(handle) = chunks.get(&pos).and_then(|slot| slot.handle.get().cloned()) else {
                return Ok(false);
            };
            chunks.remove(&pos);
            handle
        };

        let record = {
            let chunk = handle.read();
            chunk
                .is_unsaved()
                .then(|| ChunkRecord::from_chunk(&chunk, self.game_time()))
        };

        if let Some(record) = record {
            self.storage.lock().write(&record)?;
            handle.write().set_unsaved(false);
        }

        Ok(true)
    }
}

//! # Chunk Provider Module
//!
//! The orchestrator: accepts raw chunks (from local generation or a network
//! peer), feeds them into the processing pipeline, maintains the ready-chunk
//! cache, processes invalidation requests, and notifies a listener when
//! chunks become ready or are about to unload.
//!
//! ## Threading contract
//!
//! `update()` must be called by the owning game-loop thread only; it is the
//! sole mutator of the chunk cache. Worker threads hand chunks over through
//! the ready queue, and any thread may queue an invalidation — those two
//! structures are the only concurrently mutated state.
//!
//! ## Invalidation policy
//!
//! Invalidation only cancels already-ready cache entries. A position still
//! mid-pipeline is unaffected: if it later completes, it is cached normally.
//! Unloading therefore never blocks future (re)generation at a position.

pub mod config;

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use cgmath::Point3;

use crate::core::MtResource;
use crate::lighting::internal_light::generate_internal_lighting;
use crate::lighting::light_merger::{merge_light, required_neighbors, MergeOutcome};
use crate::monitoring::{ChunkMonitor, LogMonitor};
use crate::pipeline::stage::{ChunkHandle, StageDef, StageOutcome};
use crate::pipeline::{CacheLookupFn, ChunkPipeline, PriorityFn};
use crate::voxels::chunk::Chunk;

use config::ProviderConfig;

/// Receives chunk lifecycle notifications.
///
/// These events are the only way external systems (rendering, gameplay) learn
/// about chunk transitions; the provider never calls back into them
/// otherwise. A consumer reacting to `on_chunk_ready` looks the chunk up via
/// `ChunkProvider::get_chunk`.
pub trait ChunkEventListener: Send + Sync {
    /// A chunk completed all stages and is now in the cache.
    fn on_chunk_ready(&self, position: Point3<i32>);

    /// A chunk is about to be disposed; release dependent state now.
    fn on_before_chunk_unload(&self, position: Point3<i32>);
}

/// Provides ready chunks to the rest of the engine.
///
/// Per-position lifecycle: unloaded → loading (in pipeline) → ready (in
/// cache) → unloaded again on invalidation; a reload replaces and disposes
/// the stale instance.
pub struct ChunkProvider {
    pipeline: ChunkPipeline,
    /// Ready chunks by position. Written only by `update()`; the pipeline
    /// coordinator reads it through a lookup closure to satisfy merges.
    cache: MtResource<HashMap<Point3<i32>, ChunkHandle>>,
    ready_receiver: Receiver<ChunkHandle>,
    invalidation: MtResource<HashSet<Point3<i32>>>,
    listener: Arc<dyn ChunkEventListener>,
    player_chunk: MtResource<Option<Point3<i32>>>,
    config: ProviderConfig,
}

impl ChunkProvider {
    /// Creates a provider with the default logging monitor.
    pub fn new(config: ProviderConfig, listener: Arc<dyn ChunkEventListener>) -> Self {
        Self::with_monitor(config, listener, Arc::new(LogMonitor))
    }

    /// Creates a provider with an injected monitor (tests use a fake).
    pub fn with_monitor(
        config: ProviderConfig,
        listener: Arc<dyn ChunkEventListener>,
        monitor: Arc<dyn ChunkMonitor>,
    ) -> Self {
        let cache: MtResource<HashMap<Point3<i32>, ChunkHandle>> = MtResource::new(HashMap::new());
        let (ready_sender, ready_receiver) = channel::<ChunkHandle>();
        let ready_sender = Mutex::new(ready_sender);

        let lookup_cache = cache.clone();
        let cache_lookup: CacheLookupFn = Arc::new(move |position| {
            lookup_cache
                .get()
                .get(&position)
                .filter(|handle| handle.get().is_ready())
                .cloned()
        });

        let player_chunk: MtResource<Option<Point3<i32>>> = MtResource::new(None);
        let priority_player = player_chunk.clone();
        let priority_fn: PriorityFn = Arc::new(move |position| match *priority_player.get() {
            Some(player) => {
                let dx = (position.x - player.x) as i64;
                let dy = (position.y - player.y) as i64;
                let dz = (position.z - player.z) as i64;
                dx * dx + dy * dy + dz * dz
            }
            None => i64::MAX,
        });

        let extent = config.extent.clone();
        let pipeline = ChunkPipeline::builder()
            .add_stage(StageDef::mutating(
                "internal lighting",
                generate_internal_lighting,
            ))
            .add_stage(StageDef::mutating("deflate", Chunk::deflate))
            .add_stage(StageDef::fan_in(
                "light merge",
                |inputs: &[(Point3<i32>, ChunkHandle)]| match merge_light(inputs) {
                    MergeOutcome::Merged => StageOutcome::Done,
                    MergeOutcome::NotReady => StageOutcome::Deferred,
                },
                move |position| required_neighbors(position, &extent),
            ))
            .add_stage(StageDef::single("chunk ready", move |handle| {
                let _ = ready_sender.lock().unwrap().send(handle.clone());
            }))
            .with_workers(config.worker_threads)
            .with_priority_fn(priority_fn)
            .with_cache_lookup(cache_lookup)
            .with_monitor(monitor)
            .with_shutdown_timeout(config.shutdown_timeout())
            .build();

        ChunkProvider {
            pipeline,
            cache,
            ready_receiver,
            invalidation: MtResource::new(HashSet::new()),
            listener,
            player_chunk,
            config,
        }
    }

    /// Hands a raw chunk to the pipeline. Non-blocking.
    pub fn receive_chunk(&self, chunk: Chunk) {
        self.pipeline.invoke_pipeline(chunk);
    }

    /// Queues a position for unload. Non-blocking; processed on the next
    /// `update()` tick.
    pub fn invalidate_chunks(&self, position: Point3<i32>) {
        self.invalidation.get_mut().insert(position);
    }

    /// Sets the player's chunk position used by the default priority
    /// function. `None` makes every submission sort last.
    pub fn set_player_position(&self, position: Option<Point3<i32>>) {
        *self.player_chunk.get_mut() = position;
    }

    /// The provider's once-per-tick heartbeat. Game-loop thread only.
    ///
    /// Drains the invalidation set, then the ready queue (bounded by the
    /// configured deadline), and escalates any fatal worker fault.
    ///
    /// # Panics
    /// Panics if a worker hit an unrecoverable fault, terminating on the
    /// game thread instead of swallowing it.
    pub fn update(&mut self) {
        if self.pipeline.is_fatal() {
            panic!("unrecoverable fault in a chunk worker; terminating");
        }
        self.drain_invalidations();
        self.drain_ready_chunks();
    }

    /// Returns the cached chunk only if present and ready. Never triggers
    /// loading.
    pub fn get_chunk(&self, position: Point3<i32>) -> Option<ChunkHandle> {
        self.cache
            .get()
            .get(&position)
            .filter(|handle| handle.get().is_ready())
            .cloned()
    }

    /// Returns whether a ready chunk is cached at the position.
    pub fn is_chunk_ready(&self, position: Point3<i32>) -> bool {
        self.get_chunk(position).is_some()
    }

    /// Returns whether the position is still travelling through the pipeline.
    pub fn is_position_processing(&self, position: Point3<i32>) -> bool {
        self.pipeline.is_position_processing(position)
    }

    /// Returns the number of ready chunks in the cache.
    pub fn cached_chunk_count(&self) -> usize {
        self.cache.get().len()
    }

    /// Tears down the pipeline and releases the cache, notifying the
    /// listener for every cached chunk before disposal.
    pub fn dispose(mut self) {
        self.pipeline.shutdown(false);
        let positions: Vec<Point3<i32>> = self.cache.get().keys().cloned().collect();
        for position in positions {
            self.listener.on_before_chunk_unload(position);
            if let Some(handle) = self.cache.get_mut().remove(&position) {
                handle.get_mut().dispose();
            }
        }
    }

    fn drain_invalidations(&mut self) {
        let drained: Vec<Point3<i32>> = {
            let mut pending = self.invalidation.get_mut();
            if pending.is_empty() {
                return;
            }
            let batch: Vec<Point3<i32>> = pending
                .iter()
                .take(self.config.max_unloads_per_update)
                .cloned()
                .collect();
            for position in &batch {
                pending.remove(position);
            }
            batch
        };

        let mut unloaded = 0;
        for position in drained {
            let is_ready_entry = self
                .cache
                .get()
                .get(&position)
                .map(|handle| handle.get().is_ready())
                .unwrap_or(false);
            if !is_ready_entry {
                // Not yet ready (or never loaded): nothing to cancel. If the
                // position completes later it will be cached normally.
                continue;
            }
            self.listener.on_before_chunk_unload(position);
            if let Some(handle) = self.cache.get_mut().remove(&position) {
                handle.get_mut().dispose();
            }
            unloaded += 1;
        }
        if unloaded > 0 {
            log::debug!("unloaded {} chunks", unloaded);
        }
    }

    fn drain_ready_chunks(&mut self) {
        let deadline = self.config.update_deadline();
        let start = Instant::now();
        let mut inserted = false;

        while let Ok(handle) = self.ready_receiver.try_recv() {
            let position = {
                let mut chunk = handle.get_mut();
                chunk.mark_ready();
                chunk.position
            };
            let stale = self.cache.get_mut().insert(position, handle);
            if let Some(stale) = stale {
                log::debug!(
                    "chunk {:?} reloaded; disposing the previous instance",
                    position
                );
                stale.get_mut().dispose();
            }
            inserted = true;
            self.listener.on_chunk_ready(position);

            if start.elapsed() > deadline {
                log::warn!(
                    "ready-chunk processing exceeded {:?} this tick; deferring the rest",
                    deadline
                );
                break;
            }
        }

        if inserted {
            // Fresh cache entries can satisfy parked merges.
            self.pipeline.recheck();
        }
    }
}

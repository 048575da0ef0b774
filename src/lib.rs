#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Pipeline
//!
//! A chunk processing pipeline for voxel worlds: raw, newly-generated (or
//! network-received) chunks go in; fully lit, gameplay-ready chunks come out,
//! with chunks near the player processed first and unloads handled safely at
//! any point of a chunk's journey.
//!
//! ## Key Modules
//!
//! * `voxels` - Block types and the 16x16x16 `Chunk` store with its packed
//!   light field
//! * `lighting` - The internal lighting pass and the cross-chunk light merger
//! * `task_management` - A generic bounded worker pool with priority
//!   scheduling
//! * `pipeline` - The staged pipeline and its coordinator thread
//! * `provider` - The orchestrator: cache, invalidation, ready notifications
//! * `monitoring` - Injected observability for logs and tests
//!
//! ## Architecture
//!
//! Chunks flow through an ordered stage list: internal lighting → deflate →
//! light merge (a fan-in stage that waits for the face-adjacent neighbors) →
//! ready. Stage tasks run on a fixed worker pool ordered by distance to the
//! player; a single coordinator thread owns all per-position bookkeeping, so
//! fan-in synchronization needs no shared locks. The provider drains the
//! ready queue once per game tick, publishes chunks to its cache, and emits
//! ready/unload notifications.
//!
//! ## Usage
//!
//! ```rust,no_run
//! // Demo world: generate a small region and process it to readiness.
//! voxel_pipeline::run();
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cgmath::Point3;
use log::info;

use lighting::light_merger::WorldExtent;
use provider::config::ProviderConfig;
use provider::{ChunkEventListener, ChunkProvider};
use voxels::chunk::Chunk;

pub mod core;
pub mod lighting;
pub mod monitoring;
pub mod pipeline;
pub mod provider;
pub mod task_management;
pub mod voxels;

/// Side length, in chunks, of the demo region processed by `run()`.
const DEMO_REGION: i32 = 4;

/// Runs the demo: generates a small Perlin-terrain region, feeds it through
/// the provider, and ticks until every chunk is ready.
pub fn run() {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();
    info!("Logger initialized");

    struct DemoListener {
        ready: AtomicUsize,
    }

    impl ChunkEventListener for DemoListener {
        fn on_chunk_ready(&self, position: Point3<i32>) {
            self.ready.fetch_add(1, Ordering::SeqCst);
            log::debug!("chunk ready at {:?}", position);
        }

        fn on_before_chunk_unload(&self, position: Point3<i32>) {
            log::debug!("chunk unloading at {:?}", position);
        }
    }

    let config = ProviderConfig {
        extent: WorldExtent {
            min: [0, 0, 0],
            max: [DEMO_REGION - 1, DEMO_REGION - 1, DEMO_REGION - 1],
        },
        ..ProviderConfig::default()
    };
    let listener = Arc::new(DemoListener {
        ready: AtomicUsize::new(0),
    });
    let mut provider = ChunkProvider::new(config, listener.clone());
    provider.set_player_position(Some(Point3::new(0, 0, 0)));

    let generation_start = Instant::now();
    for x in 0..DEMO_REGION {
        for y in 0..DEMO_REGION {
            for z in 0..DEMO_REGION {
                provider.receive_chunk(Chunk::perlin(&Point3::new(x, y, z)));
            }
        }
    }
    let total = (DEMO_REGION * DEMO_REGION * DEMO_REGION) as usize;
    info!(
        "submitted {} chunks in {:?}",
        total,
        generation_start.elapsed()
    );

    let processing_start = Instant::now();
    let deadline = Instant::now() + Duration::from_secs(30);
    while listener.ready.load(Ordering::SeqCst) < total && Instant::now() < deadline {
        provider.update();
        thread::sleep(Duration::from_millis(5));
    }
    info!(
        "{} of {} chunks ready after {:?}",
        listener.ready.load(Ordering::SeqCst),
        total,
        processing_start.elapsed()
    );

    provider.dispose();
}

//! # Monitoring Module
//!
//! Observability for the chunk pipeline. Instead of process-wide statics, the
//! monitor is an explicitly constructed trait object handed to the pipeline
//! at build time, so tests can inject a fake and production code gets the
//! logging implementation.
//!
//! The monitor is also what distinguishes a chunk that failed processing
//! (a persistent hole in the world) from one that is merely still queued.

use cgmath::Point3;

/// Receives pipeline lifecycle events for logging or metrics.
///
/// All methods have empty defaults so a fake only overrides what it records.
pub trait ChunkMonitor: Send + Sync {
    /// A stage task started executing on a worker.
    fn stage_started(&self, _position: Point3<i32>, _stage: &str) {}

    /// A stage task finished normally.
    fn stage_finished(&self, _position: Point3<i32>, _stage: &str) {}

    /// A stage task failed; the position will never reach ready.
    fn stage_failed(&self, _position: Point3<i32>, _stage: &str, _error: &str) {}

    /// A position completed every stage.
    fn position_completed(&self, _position: Point3<i32>) {}

    /// A position was cancelled and dropped from the pipeline.
    fn position_cancelled(&self, _position: Point3<i32>) {}
}

/// A monitor that records nothing.
pub struct NullMonitor;

impl ChunkMonitor for NullMonitor {}

/// The default monitor: forwards events to the `log` crate.
///
/// Stage failures log at error level so a hole in the world is visible in the
/// log stream; routine progress stays at trace.
pub struct LogMonitor;

impl ChunkMonitor for LogMonitor {
    fn stage_started(&self, position: Point3<i32>, stage: &str) {
        log::trace!("stage '{}' started for chunk {:?}", stage, position);
    }

    fn stage_finished(&self, position: Point3<i32>, stage: &str) {
        log::trace!("stage '{}' finished for chunk {:?}", stage, position);
    }

    fn stage_failed(&self, position: Point3<i32>, stage: &str, error: &str) {
        log::error!(
            "stage '{}' failed for chunk {:?}: {}; dropping the position",
            stage,
            position,
            error
        );
    }

    fn position_completed(&self, position: Point3<i32>) {
        log::debug!("chunk {:?} completed all stages", position);
    }

    fn position_cancelled(&self, position: Point3<i32>) {
        log::debug!("chunk {:?} cancelled while processing", position);
    }
}

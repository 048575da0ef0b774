//! # Pipeline Stage Module
//!
//! A stage is a named transform over chunk data; the pipeline owns all
//! scheduling, priority, and chaining around it. Two shapes exist:
//!
//! - **Single** stages consume one chunk and advance it to the next stage.
//! - **Fan-in** stages declare the set of positions they need via
//!   `required_inputs_for` and run once the whole set is available.
//!
//! Stages are plain closures behind a tagged variant; the pipeline never
//! inspects what a stage does, only which shape it has.

use std::sync::Arc;

use cgmath::Point3;

use crate::core::MtResource;
use crate::voxels::chunk::Chunk;

/// A shared handle to a chunk moving through the pipeline.
pub type ChunkHandle = MtResource<Chunk>;

/// What a stage reported back to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage completed; the chunk may advance.
    Done,
    /// A prerequisite was missing; re-run the stage later. Only fan-in stages
    /// defer — it is a scheduling signal, not a failure.
    Deferred,
}

/// The work carried by a stage, in its two shapes.
pub(crate) enum StageWork {
    /// Transforms the single chunk at the task's position.
    Single(Arc<dyn Fn(&ChunkHandle) + Send + Sync>),
    /// Consumes a set of chunks once they are all available.
    FanIn {
        /// The transform, given `(position, chunk)` pairs with the task's own
        /// position first.
        apply: Arc<dyn Fn(&[(Point3<i32>, ChunkHandle)]) -> StageOutcome + Send + Sync>,
        /// The positions whose chunks must be collected before `apply` runs.
        required_inputs: Arc<dyn Fn(Point3<i32>) -> Vec<Point3<i32>> + Send + Sync>,
    },
}

/// A named stage in the chunk processing pipeline.
pub struct StageDef {
    name: String,
    pub(crate) work: StageWork,
}

impl StageDef {
    /// Creates a single-chunk stage from a mutating function.
    ///
    /// The chunk is locked for writing around the call; this is the shape of
    /// the lighting and deflate stages.
    pub fn mutating(
        name: impl Into<String>,
        func: impl Fn(&mut Chunk) + Send + Sync + 'static,
    ) -> Self {
        StageDef {
            name: name.into(),
            work: StageWork::Single(Arc::new(move |handle: &ChunkHandle| {
                let mut chunk = handle.get_mut();
                func(&mut chunk);
            })),
        }
    }

    /// Creates a single-chunk stage that receives the shared handle itself.
    ///
    /// Used when the stage needs to pass the handle onward, like the final
    /// stage that publishes the chunk to the ready queue.
    pub fn single(
        name: impl Into<String>,
        func: impl Fn(&ChunkHandle) + Send + Sync + 'static,
    ) -> Self {
        StageDef {
            name: name.into(),
            work: StageWork::Single(Arc::new(func)),
        }
    }

    /// Creates a fan-in stage.
    ///
    /// # Arguments
    /// * `apply` - The transform over the collected input set
    /// * `required_inputs` - Which positions must be available for a given
    ///   task position (the position itself included)
    pub fn fan_in(
        name: impl Into<String>,
        apply: impl Fn(&[(Point3<i32>, ChunkHandle)]) -> StageOutcome + Send + Sync + 'static,
        required_inputs: impl Fn(Point3<i32>) -> Vec<Point3<i32>> + Send + Sync + 'static,
    ) -> Self {
        StageDef {
            name: name.into(),
            work: StageWork::FanIn {
                apply: Arc::new(apply),
                required_inputs: Arc::new(required_inputs),
            },
        }
    }

    /// The stage's name, used in logs and monitor events.
    pub fn name(&self) -> &str {
        &self.name
    }
}

//! # Chunk Processing Pipeline
//!
//! An ordered sequence of stages that raw chunks flow through on their way to
//! ready. The pipeline owns a priority worker pool and a coordinator thread:
//!
//! - The **coordinator** owns all per-position bookkeeping. External calls
//!   (`invoke_pipeline`, `stop_processing_at`, `recheck`, `shutdown`) are
//!   messages; workers report stage completions the same way. Because a single
//!   thread owns the table, the fan-in "already scheduled" guard needs no
//!   atomics.
//! - **Workers** execute stage tasks. A task's priority is computed once at
//!   submission from the configured priority function and reused for every
//!   stage of that position.
//!
//! ## Per-position state machine
//!
//! A position enters at stage 0 and advances one stage per completed task.
//! At a fan-in stage the position parks (it is simply not resubmitted) until
//! every required input is available — either from the provider's cache or
//! from a position in this pipeline that has reached the fan-in stage itself.
//! Every completion and every `recheck` re-evaluates parked positions.
//!
//! ## Failure semantics
//!
//! A panic inside a stage is caught at the task boundary: the monitor is
//! notified and the position is dropped, leaving other in-flight work
//! untouched. A fault that escapes past that boundary flags the worker pool
//! fatal, which the provider escalates on the game thread.

pub mod stage;

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cgmath::Point3;

use crate::core::MtResource;
use crate::monitoring::{ChunkMonitor, LogMonitor};
use crate::task_management::task::Task;
use crate::task_management::TaskManager;
use crate::voxels::chunk::{Chunk, ChunkState};

use stage::{ChunkHandle, StageDef, StageOutcome, StageWork};

/// Computes a task priority for a chunk position; lower runs sooner.
pub type PriorityFn = Arc<dyn Fn(Point3<i32>) -> i64 + Send + Sync>;

/// Resolves a position to an already-ready chunk outside the pipeline
/// (the provider's cache).
pub type CacheLookupFn = Arc<dyn Fn(Point3<i32>) -> Option<ChunkHandle> + Send + Sync>;

/// How a stage task ended, as reported back to the coordinator.
enum StageRunResult {
    /// The stage ran; the position advances.
    Completed,
    /// A fan-in prerequisite was missing at execution time; the position
    /// stays parked at the same stage.
    Deferred,
    /// The stage panicked; the position is dropped.
    Failed(String),
    /// The chunk was disposed before the stage ran.
    Cancelled,
}

/// Messages handled by the coordinator thread.
enum PipelineMessage {
    /// A raw chunk entering the pipeline.
    Invoke(Chunk),
    /// A worker finished a stage task.
    StageDone {
        position: Point3<i32>,
        stage_index: usize,
        result: StageRunResult,
    },
    /// Re-evaluate parked positions (sent after cache inserts).
    Recheck,
    /// Cancel and dispose an in-flight position.
    Cancel(Point3<i32>),
    /// Stop the pipeline.
    Shutdown { await_completion: bool },
}

/// Per-position bookkeeping while a chunk is in flight.
struct ChunkProcessingInfo {
    chunk: ChunkHandle,
    /// Index of the next stage to run (== a completed prefix of the stage list).
    stage_index: usize,
    /// Priority computed once at submission.
    priority: i64,
    /// Whether a task for the current stage is queued or running. Doubles as
    /// the fan-in "already scheduled" guard.
    in_flight: bool,
}

/// Configures and starts a `ChunkPipeline`.
pub struct PipelineBuilder {
    stages: Vec<StageDef>,
    num_workers: usize,
    priority_fn: PriorityFn,
    cache_lookup: CacheLookupFn,
    monitor: Arc<dyn ChunkMonitor>,
    shutdown_timeout: Duration,
}

impl PipelineBuilder {
    fn new() -> Self {
        PipelineBuilder {
            stages: Vec::new(),
            num_workers: 4,
            priority_fn: Arc::new(|_| 0),
            cache_lookup: Arc::new(|_| None),
            monitor: Arc::new(LogMonitor),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    /// Appends a stage; stages execute in append order.
    pub fn add_stage(mut self, stage: StageDef) -> Self {
        self.stages.push(stage);
        self
    }

    /// Sets the worker thread count.
    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Sets the priority function evaluated once per submission.
    pub fn with_priority_fn(mut self, priority_fn: PriorityFn) -> Self {
        self.priority_fn = priority_fn;
        self
    }

    /// Sets the external chunk lookup used to satisfy fan-in inputs.
    pub fn with_cache_lookup(mut self, cache_lookup: CacheLookupFn) -> Self {
        self.cache_lookup = cache_lookup;
        self
    }

    /// Sets the monitor receiving pipeline events.
    pub fn with_monitor(mut self, monitor: Arc<dyn ChunkMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Sets the bounded wait used when stopping workers.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Starts the coordinator thread and worker pool.
    ///
    /// # Panics
    /// Panics if no stages were added.
    pub fn build(self) -> ChunkPipeline {
        assert!(
            !self.stages.is_empty(),
            "chunk pipeline must have at least one stage"
        );

        let (sender, receiver) = channel();
        let executor = TaskManager::new(self.num_workers);
        let fatal = executor.fatal_flag();
        let processing = MtResource::new(HashSet::new());

        let coordinator = Coordinator {
            stages: self.stages,
            executor,
            table: HashMap::new(),
            processing: processing.clone(),
            priority_fn: self.priority_fn,
            cache_lookup: self.cache_lookup,
            monitor: self.monitor,
            completion: sender.clone(),
            shutdown_timeout: self.shutdown_timeout,
        };
        let handle = thread::Builder::new()
            .name("chunk-pipeline".to_owned())
            .spawn(move || coordinator.run(receiver))
            .expect("failed to spawn pipeline coordinator");

        ChunkPipeline {
            sender,
            coordinator: Some(handle),
            processing,
            fatal,
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

/// The chunk processing pipeline. See the module docs for the model.
pub struct ChunkPipeline {
    sender: Sender<PipelineMessage>,
    coordinator: Option<JoinHandle<()>>,
    processing: MtResource<HashSet<Point3<i32>>>,
    fatal: Arc<AtomicBool>,
    shutdown_timeout: Duration,
}

impl ChunkPipeline {
    /// Starts configuring a pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Submits a raw chunk at stage 0. Non-blocking.
    ///
    /// A position already in flight ignores the duplicate; the chunk at that
    /// position keeps its current journey.
    pub fn invoke_pipeline(&self, chunk: Chunk) {
        let _ = self.sender.send(PipelineMessage::Invoke(chunk));
    }

    /// Cancels processing at a position; its chunk is disposed.
    pub fn stop_processing_at(&self, position: Point3<i32>) {
        let _ = self.sender.send(PipelineMessage::Cancel(position));
    }

    /// Asks the coordinator to re-evaluate parked fan-in positions.
    ///
    /// The provider calls this after inserting ready chunks into its cache,
    /// since those inserts can satisfy merge requirements.
    pub fn recheck(&self) {
        let _ = self.sender.send(PipelineMessage::Recheck);
    }

    /// Returns whether a position is currently in flight.
    pub fn is_position_processing(&self, position: Point3<i32>) -> bool {
        self.processing.get().contains(&position)
    }

    /// Returns a snapshot of the in-flight positions.
    pub fn processing_positions(&self) -> Vec<Point3<i32>> {
        self.processing.get().iter().cloned().collect()
    }

    /// Returns whether a worker hit an unrecoverable fault.
    pub fn is_fatal(&self) -> bool {
        self.fatal.load(AtomicOrdering::SeqCst)
    }

    /// Stops the pipeline: no new work, drain or abandon per
    /// `await_completion`, bounded worker join with forced abandonment on
    /// timeout.
    pub fn shutdown(&mut self, await_completion: bool) {
        if let Some(handle) = self.coordinator.take() {
            let _ = self
                .sender
                .send(PipelineMessage::Shutdown { await_completion });
            // The coordinator itself bounds the worker join; give it that
            // long plus a grace period before abandoning it too.
            let deadline = Instant::now() + self.shutdown_timeout + Duration::from_secs(1);
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                log::error!("pipeline coordinator failed to stop in time; abandoning it");
            }
        }
    }
}

impl Drop for ChunkPipeline {
    fn drop(&mut self) {
        self.shutdown(false);
    }
}

/// The coordinator thread's state: the stage list, the executor, and the
/// per-position table. Only this thread touches the table.
struct Coordinator {
    stages: Vec<StageDef>,
    executor: TaskManager,
    table: HashMap<Point3<i32>, ChunkProcessingInfo>,
    processing: MtResource<HashSet<Point3<i32>>>,
    priority_fn: PriorityFn,
    cache_lookup: CacheLookupFn,
    monitor: Arc<dyn ChunkMonitor>,
    completion: Sender<PipelineMessage>,
    shutdown_timeout: Duration,
}

impl Coordinator {
    fn run(mut self, receiver: Receiver<PipelineMessage>) {
        while let Ok(message) = receiver.recv() {
            match message {
                PipelineMessage::Invoke(chunk) => self.handle_invoke(chunk),
                PipelineMessage::StageDone {
                    position,
                    stage_index,
                    result,
                } => self.handle_stage_done(position, stage_index, result),
                PipelineMessage::Recheck => self.schedule_runnable(),
                PipelineMessage::Cancel(position) => self.handle_cancel(position),
                PipelineMessage::Shutdown { await_completion } => {
                    self.handle_shutdown(await_completion);
                    return;
                }
            }
        }
        // Every sender is gone; nothing can reach the pipeline anymore.
        self.handle_shutdown(false);
    }

    fn handle_invoke(&mut self, mut chunk: Chunk) {
        let position = chunk.position;
        if self.table.contains_key(&position) {
            log::debug!(
                "chunk {:?} is already processing; ignoring duplicate submission",
                position
            );
            return;
        }
        chunk.set_state(ChunkState::InternalLightPending);
        let priority = (self.priority_fn)(position);
        self.table.insert(
            position,
            ChunkProcessingInfo {
                chunk: MtResource::new(chunk),
                stage_index: 0,
                priority,
                in_flight: false,
            },
        );
        self.processing.get_mut().insert(position);
        self.try_schedule(position);
    }

    fn handle_stage_done(
        &mut self,
        position: Point3<i32>,
        stage_index: usize,
        result: StageRunResult,
    ) {
        let info = match self.table.get_mut(&position) {
            Some(info) => info,
            // Cancelled while the task was running.
            None => return,
        };
        if info.stage_index != stage_index || !info.in_flight {
            return;
        }
        match result {
            StageRunResult::Completed => {
                info.in_flight = false;
                info.stage_index += 1;
                if info.stage_index >= self.stages.len() {
                    self.table.remove(&position);
                    self.processing.get_mut().remove(&position);
                    self.monitor.position_completed(position);
                }
                // This completion may have unparked a fan-in elsewhere.
                self.schedule_runnable();
            }
            StageRunResult::Deferred => {
                // Stay parked at the same stage; a later completion or a
                // provider recheck will retry.
                info.in_flight = false;
            }
            StageRunResult::Failed(_) => {
                // The task already notified the monitor. The chunk's lock may
                // be poisoned, so it is dropped rather than disposed.
                self.table.remove(&position);
                self.processing.get_mut().remove(&position);
                self.schedule_runnable();
            }
            StageRunResult::Cancelled => {
                self.table.remove(&position);
                self.processing.get_mut().remove(&position);
            }
        }
    }

    fn handle_cancel(&mut self, position: Point3<i32>) {
        if let Some(info) = self.table.remove(&position) {
            self.processing.get_mut().remove(&position);
            if !info.chunk.is_poisoned() {
                info.chunk.get_mut().dispose();
            }
            self.monitor.position_cancelled(position);
        }
    }

    fn handle_shutdown(&mut self, await_completion: bool) {
        let clean = self
            .executor
            .shutdown(await_completion, self.shutdown_timeout);
        if !clean {
            log::error!("chunk pipeline forced worker termination after timeout");
        }
        self.table.clear();
        self.processing.get_mut().clear();
    }

    /// Attempts to schedule every position without an in-flight task.
    fn schedule_runnable(&mut self) {
        let runnable: Vec<Point3<i32>> = self
            .table
            .iter()
            .filter(|(_, info)| !info.in_flight)
            .map(|(position, _)| *position)
            .collect();
        for position in runnable {
            self.try_schedule(position);
        }
    }

    /// Schedules the next stage task for a position, or parks it if a fan-in
    /// requirement is unmet. No-op for in-flight or completed positions.
    fn try_schedule(&mut self, position: Point3<i32>) {
        let (stage_index, priority, chunk) = match self.table.get(&position) {
            Some(info) if !info.in_flight && info.stage_index < self.stages.len() => {
                (info.stage_index, info.priority, info.chunk.clone())
            }
            _ => return,
        };

        let stage = &self.stages[stage_index];
        let job = match &stage.work {
            StageWork::Single(func) => StageJob::Single {
                func: func.clone(),
                chunk,
            },
            StageWork::FanIn {
                apply,
                required_inputs,
            } => {
                let mut inputs = Vec::new();
                for required in required_inputs(position) {
                    let handle = if required == position {
                        Some(chunk.clone())
                    } else {
                        self.eligible_input(required, stage_index)
                    };
                    match handle {
                        Some(handle) => inputs.push((required, handle)),
                        // Parked: a sibling's completion or a provider
                        // recheck triggers the next attempt.
                        None => return,
                    }
                }
                StageJob::FanIn {
                    apply: apply.clone(),
                    inputs,
                }
            }
        };

        let task = StageTask {
            position,
            stage_index,
            stage_name: stage.name().to_owned(),
            job,
            completion: self.completion.clone(),
            monitor: self.monitor.clone(),
        };
        self.executor.submit(priority, Box::new(task));
        self.table.get_mut(&position).unwrap().in_flight = true;
    }

    /// Resolves a fan-in input: a ready chunk from the provider's cache, or a
    /// position in this pipeline that has reached the fan-in stage itself.
    fn eligible_input(&self, position: Point3<i32>, min_stage: usize) -> Option<ChunkHandle> {
        if let Some(handle) = (self.cache_lookup)(position) {
            return Some(handle);
        }
        self.table.get(&position).and_then(|info| {
            if info.stage_index >= min_stage {
                Some(info.chunk.clone())
            } else {
                None
            }
        })
    }
}

/// A stage execution bound to one position, run on a worker thread.
struct StageTask {
    position: Point3<i32>,
    stage_index: usize,
    stage_name: String,
    job: StageJob,
    completion: Sender<PipelineMessage>,
    monitor: Arc<dyn ChunkMonitor>,
}

enum StageJob {
    Single {
        func: Arc<dyn Fn(&ChunkHandle) + Send + Sync>,
        chunk: ChunkHandle,
    },
    FanIn {
        apply: Arc<dyn Fn(&[(Point3<i32>, ChunkHandle)]) -> StageOutcome + Send + Sync>,
        inputs: Vec<(Point3<i32>, ChunkHandle)>,
    },
}

impl Task for StageTask {
    fn name(&self) -> &str {
        &self.stage_name
    }

    fn run(self: Box<Self>) {
        let StageTask {
            position,
            stage_index,
            stage_name,
            job,
            completion,
            monitor,
        } = *self;

        monitor.stage_started(position, &stage_name);
        let outcome = catch_unwind(AssertUnwindSafe(|| match &job {
            StageJob::Single { func, chunk } => {
                if chunk.get().is_disposed() {
                    return StageRunResult::Cancelled;
                }
                func(chunk);
                StageRunResult::Completed
            }
            StageJob::FanIn { apply, inputs } => match apply(inputs) {
                StageOutcome::Done => StageRunResult::Completed,
                StageOutcome::Deferred => StageRunResult::Deferred,
            },
        }));

        let result = match outcome {
            Ok(result) => {
                if matches!(result, StageRunResult::Completed) {
                    monitor.stage_finished(position, &stage_name);
                }
                result
            }
            Err(payload) => {
                let message = panic_message(payload);
                monitor.stage_failed(position, &stage_name, &message);
                StageRunResult::Failed(message)
            }
        };
        let _ = completion.send(PipelineMessage::StageDone {
            position,
            stage_index,
            result,
        });
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::stage::StageDef;
    use super::*;
    use crate::lighting::internal_light::generate_internal_lighting;
    use crate::lighting::light_merger::{merge_light, required_neighbors, MergeOutcome, WorldExtent};
    use crate::monitoring::NullMonitor;
    use std::sync::mpsc::channel;
    use std::sync::Mutex;

    fn p(x: i32, y: i32, z: i32) -> Point3<i32> {
        Point3::new(x, y, z)
    }

    fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    fn publish_stage(sink: Arc<Mutex<Vec<Point3<i32>>>>) -> StageDef {
        StageDef::single("publish", move |handle| {
            sink.lock().unwrap().push(handle.get().position);
        })
    }

    #[test]
    fn chunk_completes_every_stage_exactly_once() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = ChunkPipeline::builder()
            .add_stage(StageDef::mutating(
                "internal lighting",
                generate_internal_lighting,
            ))
            .add_stage(StageDef::mutating("deflate", Chunk::deflate))
            .add_stage(publish_stage(sink.clone()))
            .with_workers(2)
            .with_monitor(Arc::new(NullMonitor))
            .build();

        pipeline.invoke_pipeline(Chunk::empty(&p(0, 0, 0)));
        assert!(wait_until(Duration::from_secs(5), || sink
            .lock()
            .unwrap()
            .len()
            == 1));
        assert!(wait_until(Duration::from_secs(5), || !pipeline
            .is_position_processing(p(0, 0, 0))));

        thread::sleep(Duration::from_millis(50));
        assert_eq!(sink.lock().unwrap().len(), 1);
        pipeline.shutdown(true);
    }

    #[test]
    fn duplicate_submissions_are_ignored_while_in_flight() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let (release, gate) = channel::<()>();
        let gate = Mutex::new(gate);
        let mut pipeline = ChunkPipeline::builder()
            .add_stage(StageDef::single("gate", move |_| {
                gate.lock().unwrap().recv().unwrap();
            }))
            .add_stage(publish_stage(sink.clone()))
            .with_workers(1)
            .with_monitor(Arc::new(NullMonitor))
            .build();

        pipeline.invoke_pipeline(Chunk::empty(&p(0, 0, 0)));
        assert!(wait_until(Duration::from_secs(5), || pipeline
            .is_position_processing(p(0, 0, 0))));
        pipeline.invoke_pipeline(Chunk::empty(&p(0, 0, 0)));
        release.send(()).unwrap();

        assert!(wait_until(Duration::from_secs(5), || !pipeline
            .is_position_processing(p(0, 0, 0))));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(sink.lock().unwrap().len(), 1);
        pipeline.shutdown(true);
    }

    #[test]
    fn failing_stage_drops_only_its_position() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = ChunkPipeline::builder()
            .add_stage(StageDef::mutating("explode on x=1", |chunk: &mut Chunk| {
                if chunk.position.x == 1 {
                    panic!("stage blew up");
                }
            }))
            .add_stage(publish_stage(sink.clone()))
            .with_workers(2)
            .with_monitor(Arc::new(NullMonitor))
            .build();

        pipeline.invoke_pipeline(Chunk::empty(&p(0, 0, 0)));
        pipeline.invoke_pipeline(Chunk::empty(&p(1, 0, 0)));

        assert!(wait_until(Duration::from_secs(5), || {
            !pipeline.is_position_processing(p(0, 0, 0))
                && !pipeline.is_position_processing(p(1, 0, 0))
        }));
        assert_eq!(*sink.lock().unwrap(), vec![p(0, 0, 0)]);
        // A stage panic is a failure, not an executor fault.
        assert!(!pipeline.is_fatal());
        pipeline.shutdown(true);
    }

    #[test]
    fn fan_in_waits_for_its_sibling() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let extent = WorldExtent {
            min: [0, 0, 0],
            max: [1, 0, 0],
        };
        let mut pipeline = ChunkPipeline::builder()
            .add_stage(StageDef::mutating(
                "internal lighting",
                generate_internal_lighting,
            ))
            .add_stage(StageDef::fan_in(
                "light merge",
                |inputs: &[(Point3<i32>, stage::ChunkHandle)]| match merge_light(inputs) {
                    MergeOutcome::Merged => StageOutcome::Done,
                    MergeOutcome::NotReady => StageOutcome::Deferred,
                },
                move |position| required_neighbors(position, &extent),
            ))
            .add_stage(publish_stage(sink.clone()))
            .with_workers(2)
            .with_monitor(Arc::new(NullMonitor))
            .build();

        pipeline.invoke_pipeline(Chunk::empty(&p(0, 0, 0)));
        // The lone chunk parks at the merge stage waiting for (1,0,0).
        thread::sleep(Duration::from_millis(100));
        assert!(pipeline.is_position_processing(p(0, 0, 0)));
        assert!(sink.lock().unwrap().is_empty());

        pipeline.invoke_pipeline(Chunk::empty(&p(1, 0, 0)));
        assert!(wait_until(Duration::from_secs(5), || sink
            .lock()
            .unwrap()
            .len()
            == 2));
        pipeline.shutdown(true);
    }

    #[test]
    fn closer_chunks_run_before_farther_ones() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (release, gate) = channel::<()>();
        let gate = Mutex::new(gate);
        let record = order.clone();
        let mut pipeline = ChunkPipeline::builder()
            .add_stage(StageDef::single("record", move |handle| {
                let position = handle.get().position;
                if position.x < 0 {
                    // The gate chunk parks the single worker so the other
                    // two submissions are ordered purely by priority.
                    gate.lock().unwrap().recv().unwrap();
                }
                record.lock().unwrap().push(position);
            }))
            .with_workers(1)
            .with_priority_fn(Arc::new(|position| position.x as i64))
            .with_monitor(Arc::new(NullMonitor))
            .build();

        pipeline.invoke_pipeline(Chunk::empty(&p(-1, 0, 0)));
        assert!(wait_until(Duration::from_secs(5), || pipeline
            .is_position_processing(p(-1, 0, 0))));
        pipeline.invoke_pipeline(Chunk::empty(&p(100, 0, 0)));
        pipeline.invoke_pipeline(Chunk::empty(&p(1, 0, 0)));
        assert!(wait_until(Duration::from_secs(5), || {
            pipeline.is_position_processing(p(100, 0, 0))
                && pipeline.is_position_processing(p(1, 0, 0))
        }));
        release.send(()).unwrap();

        pipeline.shutdown(true);
        assert_eq!(
            *order.lock().unwrap(),
            vec![p(-1, 0, 0), p(1, 0, 0), p(100, 0, 0)]
        );
    }

    #[test]
    fn cancelled_position_never_publishes() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let (release, gate) = channel::<()>();
        let gate = Mutex::new(gate);
        let mut pipeline = ChunkPipeline::builder()
            .add_stage(StageDef::single("gate", move |_| {
                gate.lock().unwrap().recv().unwrap();
            }))
            .add_stage(publish_stage(sink.clone()))
            .with_workers(1)
            .with_monitor(Arc::new(NullMonitor))
            .build();

        pipeline.invoke_pipeline(Chunk::empty(&p(0, 0, 0)));
        assert!(wait_until(Duration::from_secs(5), || pipeline
            .is_position_processing(p(0, 0, 0))));
        pipeline.stop_processing_at(p(0, 0, 0));
        release.send(()).unwrap();

        assert!(wait_until(Duration::from_secs(5), || !pipeline
            .is_position_processing(p(0, 0, 0))));
        thread::sleep(Duration::from_millis(50));
        assert!(sink.lock().unwrap().is_empty());
        pipeline.shutdown(true);
    }
}

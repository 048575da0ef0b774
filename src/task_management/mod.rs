//! # Task Management System
//!
//! A bounded worker pool executing prioritized tasks. The pool knows nothing
//! about chunks: the pipeline submits chunk-stage tasks, and unit tests drive
//! it with synthetic closures.
//!
//! ## Architecture Overview
//!
//! - `TaskManager`: owns the worker threads and the shared priority queue
//! - `Task`: a unit of work (see `task`)
//! - Workers pop the lowest-priority-value task first; excess submissions
//!   queue rather than spawning threads
//!
//! ## Scheduling
//!
//! Priority is an `i64` computed once at submission — lower runs sooner, with
//! submission order breaking ties. Chunk stages use squared player distance,
//! so nearby chunks come first and positions with no player reference
//! (`i64::MAX`) sort last.
//!
//! ## Failure and Shutdown
//!
//! A panic that reaches a worker is an unrecoverable fault: it is logged and
//! the pool's fatal flag is raised for the owner to escalate on the game
//! thread. `shutdown` supports draining (await completion) or abandoning
//! queued work, and joins workers with a bounded wait — a stuck worker is
//! logged and abandoned rather than hanging the process.

pub mod task;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use task::Task;

/// How the pool currently treats its queue.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum PoolMode {
    /// Accepting and executing tasks.
    Running,
    /// No new submissions; workers exit once the queue is empty.
    Draining,
    /// No new submissions; the queue was discarded and workers exit as soon
    /// as their current task finishes.
    Abandoning,
}

/// A task waiting in the priority queue.
struct QueuedTask {
    priority: i64,
    seq: u64,
    task: Box<dyn Task>,
}

// BinaryHeap is a max-heap; the reversed ordering pops the lowest priority
// value first, with submission order (seq) breaking ties.
impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

/// Queue state shared between the owner and the workers.
struct PoolState {
    queue: BinaryHeap<QueuedTask>,
    mode: PoolMode,
    next_seq: u64,
}

struct PoolShared {
    state: Mutex<PoolState>,
    signal: Condvar,
}

/// A fixed-size pool of worker threads executing prioritized tasks.
pub struct TaskManager {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
    fatal: Arc<AtomicBool>,
}

impl TaskManager {
    /// Creates a pool with the given number of worker threads.
    ///
    /// # Arguments
    /// * `num_workers` - Worker thread count; typically bound to CPU cores.
    ///
    /// # Panics
    /// Panics if thread creation fails.
    pub fn new(num_workers: usize) -> Self {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                queue: BinaryHeap::new(),
                mode: PoolMode::Running,
                next_seq: 0,
            }),
            signal: Condvar::new(),
        });
        let fatal = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(num_workers);
        for index in 0..num_workers {
            let shared = shared.clone();
            let fatal = fatal.clone();
            let worker = thread::Builder::new()
                .name(format!("chunk-worker-{}", index))
                .spawn(move || worker_loop(shared, fatal))
                .expect("failed to spawn worker thread");
            workers.push(worker);
        }

        TaskManager {
            shared,
            workers,
            fatal,
        }
    }

    /// Submits a task with the given priority (lower runs sooner).
    ///
    /// # Returns
    /// `true` if the task was queued; `false` if the pool is shutting down
    /// and no longer accepts work.
    pub fn submit(&self, priority: i64, task: Box<dyn Task>) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if state.mode != PoolMode::Running {
            return false;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(QueuedTask {
            priority,
            seq,
            task,
        });
        drop(state);
        self.shared.signal.notify_one();
        true
    }

    /// Returns the number of tasks waiting in the queue (not running).
    pub fn queued_task_count(&self) -> usize {
        self.shared.state.lock().unwrap().queue.len()
    }

    /// Returns whether a worker has hit an unrecoverable fault.
    pub fn is_fatal(&self) -> bool {
        self.fatal.load(AtomicOrdering::SeqCst)
    }

    /// Returns a handle to the fatal flag, for owners that outlive the pool's
    /// thread of control (the pipeline hands one to the provider).
    pub fn fatal_flag(&self) -> Arc<AtomicBool> {
        self.fatal.clone()
    }

    /// Stops the pool.
    ///
    /// With `await_completion` the queue is drained first; otherwise queued
    /// tasks are discarded and workers stop after their current task. Workers
    /// are joined with a bounded wait.
    ///
    /// # Returns
    /// `true` if every worker terminated within `timeout`; `false` if some
    /// had to be abandoned (logged as a warning).
    pub fn shutdown(&mut self, await_completion: bool, timeout: Duration) -> bool {
        {
            let mut state = self.shared.state.lock().unwrap();
            if await_completion {
                state.mode = PoolMode::Draining;
            } else {
                state.mode = PoolMode::Abandoning;
                state.queue.clear();
            }
        }
        self.shared.signal.notify_all();

        let deadline = Instant::now() + timeout;
        let mut clean = true;
        for worker in std::mem::take(&mut self.workers) {
            while !worker.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            if worker.is_finished() {
                let _ = worker.join();
            } else {
                clean = false;
            }
        }
        if !clean {
            log::warn!(
                "worker pool failed to stop within {:?}; abandoning remaining workers",
                timeout
            );
        }
        clean
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            let mut state = self.shared.state.lock().unwrap();
            state.mode = PoolMode::Abandoning;
            state.queue.clear();
            drop(state);
            self.shared.signal.notify_all();
        }
    }
}

fn worker_loop(shared: Arc<PoolShared>, fatal: Arc<AtomicBool>) {
    loop {
        let queued = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if state.mode == PoolMode::Abandoning {
                    return;
                }
                if let Some(queued) = state.queue.pop() {
                    break queued;
                }
                if state.mode == PoolMode::Draining {
                    return;
                }
                state = shared.signal.wait(state).unwrap();
            }
        };

        let name = queued.task.name().to_owned();
        let task = queued.task;
        if catch_unwind(AssertUnwindSafe(move || task.run())).is_err() {
            log::error!(
                "task '{}' panicked past its failure boundary; flagging the pool fatal",
                name
            );
            fatal.store(true, AtomicOrdering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::task::TaskFn;
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::channel;

    #[test]
    fn runs_lower_priority_values_first() {
        let mut manager = TaskManager::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let (release, gate) = channel::<()>();

        manager.submit(
            0,
            Box::new(TaskFn::new("blocker", move || {
                gate.recv().unwrap();
            })),
        );
        // Both tasks are queued while the single worker is parked on the gate,
        // so priority alone decides the order.
        let far_order = order.clone();
        manager.submit(
            100,
            Box::new(TaskFn::new("far", move || {
                far_order.lock().unwrap().push("far");
            })),
        );
        let near_order = order.clone();
        manager.submit(
            1,
            Box::new(TaskFn::new("near", move || {
                near_order.lock().unwrap().push("near");
            })),
        );

        release.send(()).unwrap();
        assert!(manager.shutdown(true, Duration::from_secs(5)));
        assert_eq!(*order.lock().unwrap(), vec!["near", "far"]);
    }

    #[test]
    fn abandoning_shutdown_discards_queued_tasks() {
        let mut manager = TaskManager::new(1);
        let executed = Arc::new(AtomicUsize::new(0));
        let (release, gate) = channel::<()>();

        manager.submit(
            0,
            Box::new(TaskFn::new("blocker", move || {
                gate.recv().unwrap();
            })),
        );
        while manager.queued_task_count() > 0 {
            thread::sleep(Duration::from_millis(1));
        }
        for _ in 0..5 {
            let executed = executed.clone();
            manager.submit(
                10,
                Box::new(TaskFn::new("queued", move || {
                    executed.fetch_add(1, AtomicOrdering::SeqCst);
                })),
            );
        }

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            release.send(()).unwrap();
        });
        let clean = manager.shutdown(false, Duration::from_secs(5));
        releaser.join().unwrap();

        assert!(clean);
        assert_eq!(executed.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(manager.queued_task_count(), 0);
    }

    #[test]
    fn escaped_panic_flags_the_pool_fatal() {
        let mut manager = TaskManager::new(1);
        manager.submit(
            0,
            Box::new(TaskFn::new("exploding", || panic!("worker fault"))),
        );
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        manager.submit(
            1,
            Box::new(TaskFn::new("survivor", move || {
                ran_clone.store(true, AtomicOrdering::SeqCst);
            })),
        );

        assert!(manager.shutdown(true, Duration::from_secs(5)));
        assert!(manager.is_fatal());
        assert!(ran.load(AtomicOrdering::SeqCst));
    }
}

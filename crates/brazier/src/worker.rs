//! # Engine Workers
//!
//! An [`EngineWorker`] owns one OS thread and, on that thread, one inference
//! engine. The thread loops over three stages, timing each:
//!
//! 1. **fetch**: pop a work item from the request queue
//! 2. **process**: run the engine on it
//! 3. **submit**: push it to the response queue
//!
//! The loop ends when the request queue reports [`Closed`], when a stop was
//! requested, or when the engine fails. On the way out the worker logs one
//! summary line with its average stage latencies.
//!
//! Lifecycle: `Created → Running → Stopped`.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use crate::backend::{EngineFactory, InferEngine};
use crate::config::FaultPolicy;
use crate::error::{EngineError, PipelineError, Result};
use crate::item::WorkItem;
use crate::queue::{BlockingQueue, Closed};
use crate::stats::{millis, RunningAverage};

/// Queue type moving work items between stages.
pub type WorkQueue = BlockingQueue<WorkItem>;

/// The request/response queue pair shared by every worker of a pool.
#[derive(Debug, Clone)]
pub struct Channels {
    pub request: Arc<WorkQueue>,
    pub response: Arc<WorkQueue>,
}

impl Channels {
    /// Builds both queues; `None` means unbounded.
    pub fn new(request_capacity: Option<usize>, response_capacity: Option<usize>) -> Self {
        Self {
            request: Arc::new(WorkQueue::with_capacity(request_capacity)),
            response: Arc::new(WorkQueue::with_capacity(response_capacity)),
        }
    }
}

/// Identity of a worker within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId {
    index: usize,
    pool_size: usize,
}

impl WorkerId {
    pub fn new(index: usize, pool_size: usize) -> Self {
        Self { index, pool_size }
    }

    /// Zero-based position in the pool
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:02}", self.index, self.pool_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Running,
    Stopped,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Created,
            1 => WorkerState::Running,
            _ => WorkerState::Stopped,
        }
    }
}

/// Why a worker left its loop without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Request queue closed and drained
    QueueClosed,
    /// [`EngineWorker::request_stop`] was observed between items
    StopRequested,
    /// Response queue closed while submitting; the in-flight item was dropped
    ResponseClosed,
}

/// Average latency of each stage, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageStats {
    pub fetch: RunningAverage,
    pub process: RunningAverage,
    pub submit: RunningAverage,
}

impl fmt::Display for StageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{fetch:{:.5}}}-->--[process:{:.5}]-->--{{submit:{:.5}}}",
            self.fetch.value(),
            self.process.value(),
            self.submit.value()
        )
    }
}

/// What a worker hands back to its supervisor on a clean exit.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub worker: WorkerId,
    pub stats: StageStats,
    pub exit: ExitReason,
}

impl WorkerReport {
    /// Number of work items the engine processed.
    pub fn processed(&self) -> u64 {
        self.stats.process.num_steps()
    }
}

/// `worker 01/02: {fetch:..}-->--[process:..]-->--{submit:..} (10 samples)`
impl fmt::Display for WorkerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&summary_line(self.worker, &self.stats))
    }
}

fn summary_line(id: WorkerId, stats: &StageStats) -> String {
    format!("worker {}: {} ({} samples)", id, stats, stats.process.num_steps())
}

struct WorkerShared {
    stop: AtomicBool,
    state: AtomicU8,
    /// Set between taking an item from the request queue and handing it on
    holding: AtomicBool,
}

impl WorkerShared {
    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Marks the worker stopped however its thread ends, unwinding included.
///
/// On a panic it also applies the fault policy, since the panicking thread
/// never reaches the normal error path.
struct ExitGuard {
    shared: Arc<WorkerShared>,
    request: Arc<WorkQueue>,
    fault_policy: FaultPolicy,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if thread::panicking() && self.fault_policy == FaultPolicy::ClosePipeline {
            self.request.close();
        }
        self.shared.set_state(WorkerState::Stopped);
    }
}

/// A thread-confined unit pairing one engine with the shared queues.
pub struct EngineWorker {
    id: WorkerId,
    shared: Arc<WorkerShared>,
    handle: Option<JoinHandle<Result<WorkerReport>>>,
}

impl EngineWorker {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            shared: Arc::new(WorkerShared {
                stop: AtomicBool::new(false),
                state: AtomicU8::new(WorkerState::Created as u8),
                holding: AtomicBool::new(false),
            }),
            handle: None,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Spawns the worker thread. The engine is built by `factory` on that thread.
    ///
    /// A worker can only be started once.
    pub fn start<F>(&mut self, factory: Arc<F>, channels: Channels, fault_policy: FaultPolicy) -> Result<()>
    where
        F: EngineFactory,
    {
        if self.state() != WorkerState::Created || self.handle.is_some() {
            return Err(PipelineError::AlreadyStarted { worker: self.id });
        }

        let id = self.id;
        let shared = self.shared.clone();
        shared.set_state(WorkerState::Running);

        let spawned = thread::Builder::new()
            .name(format!("brazier-worker-{:02}", id.index))
            .spawn(move || {
                let _guard = ExitGuard {
                    shared: shared.clone(),
                    request: channels.request.clone(),
                    fault_policy,
                };
                worker_main(id, &shared, &channels, factory.as_ref(), fault_policy)
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(source) => {
                self.shared.set_state(WorkerState::Created);
                Err(PipelineError::Spawn { worker: id, source })
            }
        }
    }

    /// True if the worker stopped while holding a work item, which is then lost.
    ///
    /// Happens when the engine fails or panics mid-item, or when the response
    /// queue was closed under it. Always false while the worker is running.
    pub fn lost_item(&self) -> bool {
        self.state() == WorkerState::Stopped && self.shared.holding.load(Ordering::Acquire)
    }

    /// Asks the worker to stop after its current item.
    ///
    /// Advisory only: a worker blocked waiting on an empty request queue keeps
    /// waiting until an item arrives or the queue is closed.
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    /// Waits for the worker thread to exit.
    ///
    /// Returns `Ok(None)` if the worker was never started or was already
    /// joined. Engine faults and panics come back as errors.
    pub fn join(&mut self) -> Result<Option<WorkerReport>> {
        let Some(handle) = self.handle.take() else {
            return Ok(None);
        };
        match handle.join() {
            Ok(result) => result.map(Some),
            Err(payload) => Err(PipelineError::WorkerPanicked {
                worker: self.id,
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for EngineWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineWorker")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for EngineWorker {
    /// A dropped worker that is still running is detached; it stops at the
    /// next item boundary or when its request queue closes.
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.request_stop();
        }
    }
}

fn worker_main<F: EngineFactory>(
    id: WorkerId,
    shared: &WorkerShared,
    channels: &Channels,
    factory: &F,
    fault_policy: FaultPolicy,
) -> Result<WorkerReport> {
    let mut stats = StageStats::default();
    let outcome = run_loop(id, shared, channels, factory, &mut stats);

    info!(
        worker = id.index,
        pool_size = id.pool_size,
        fetch_ms = stats.fetch.value(),
        process_ms = stats.process.value(),
        submit_ms = stats.submit.value(),
        samples = stats.process.num_steps(),
        "{}",
        summary_line(id, &stats)
    );

    match outcome {
        Ok(exit) => Ok(WorkerReport {
            worker: id,
            stats,
            exit,
        }),
        Err(source) => {
            error!(worker = id.index, error = %source, "worker {} stopped on engine fault", id);
            if fault_policy == FaultPolicy::ClosePipeline {
                channels.request.close();
            }
            Err(PipelineError::Engine { worker: id, source })
        }
    }
}

fn run_loop<F: EngineFactory>(
    id: WorkerId,
    shared: &WorkerShared,
    channels: &Channels,
    factory: &F,
    stats: &mut StageStats,
) -> std::result::Result<ExitReason, EngineError> {
    let mut engine = factory.create(id)?;
    engine.init_device()?;
    debug!(worker = id.index, "worker {} running", id);

    loop {
        if shared.stop.load(Ordering::Acquire) {
            return Ok(ExitReason::StopRequested);
        }

        let clock = Instant::now();
        let mut item = match channels.request.pop() {
            Ok(item) => item,
            Err(Closed) => return Ok(ExitReason::QueueClosed),
        };
        shared.holding.store(true, Ordering::Release);
        stats.fetch.update(millis(clock.elapsed()));

        let clock = Instant::now();
        engine.infer(&mut item)?;
        stats.process.update(millis(clock.elapsed()));

        let clock = Instant::now();
        if let Err(rejected) = channels.response.push(item) {
            let dropped = rejected.into_inner();
            warn!(
                worker = id.index,
                item = %dropped.id(),
                "response queue closed, dropping completed item"
            );
            return Ok(ExitReason::ResponseClosed);
        }
        shared.holding.store(false, Ordering::Release);
        stats.submit.update(millis(clock.elapsed()));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

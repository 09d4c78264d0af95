//! # Worker Pool
//!
//! The pipeline supervisor. A [`WorkerPool`] owns the request/response queue
//! pair and N [`EngineWorker`]s, starts them together and shuts them down by
//! closing the request queue and joining every thread.
//!
//! ```ignore
//! use std::sync::Arc;
//! use brazier::{PipelineConfig, WorkerPool, WorkerId, FakeEngine, EngineError};
//!
//! let config = PipelineConfig::new(2, 8, 784, 10);
//! let mut pool = WorkerPool::new(config, |_: WorkerId| Ok::<_, EngineError>(FakeEngine::new()))?;
//! pool.start_all()?;
//!
//! let requests = pool.request_queue();
//! let factory = pool.item_factory();
//! for _ in 0..10 {
//!     requests.push(factory.create(true)).ok();
//! }
//!
//! let report = pool.shutdown();
//! assert_eq!(report.processed(), 10);
//! ```

use std::sync::Arc;
use tracing::{debug, error, info};
use crate::backend::EngineFactory;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::item::WorkItemFactory;
use crate::worker::{Channels, EngineWorker, WorkQueue, WorkerId, WorkerReport, WorkerState};

/// Outcome of [`WorkerPool::shutdown`].
#[derive(Debug, Default)]
pub struct PoolReport {
    /// Reports of workers that exited cleanly, in pool order
    pub workers: Vec<WorkerReport>,
    /// Fatal errors of workers that did not
    pub failures: Vec<PipelineError>,
}

impl PoolReport {
    /// Work items processed across every cleanly exited worker.
    pub fn processed(&self) -> u64 {
        self.workers.iter().map(WorkerReport::processed).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turns the first failure, if any, into an error.
    pub fn into_result(mut self) -> Result<Vec<WorkerReport>> {
        if self.failures.is_empty() {
            Ok(self.workers)
        } else {
            Err(self.failures.swap_remove(0))
        }
    }
}

/// Fixed pool of engine workers sharing one request and one response queue.
pub struct WorkerPool<F: EngineFactory> {
    config: PipelineConfig,
    factory: Arc<F>,
    channels: Channels,
    workers: Vec<EngineWorker>,
    shut_down: bool,
}

impl<F: EngineFactory> WorkerPool<F> {
    /// Validates `config` and prepares the queues and workers.
    ///
    /// No thread is started here; misconfiguration is rejected up front.
    pub fn new(config: PipelineConfig, factory: F) -> Result<Self> {
        config.validate()?;

        let channels = Channels::new(config.request_capacity, config.response_capacity);
        let workers = (0..config.num_workers)
            .map(|index| EngineWorker::new(WorkerId::new(index, config.num_workers)))
            .collect();

        Ok(Self {
            config,
            factory: Arc::new(factory),
            channels,
            workers,
            shut_down: false,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Queue producers push work items into.
    pub fn request_queue(&self) -> Arc<WorkQueue> {
        self.channels.request.clone()
    }

    /// Queue consumers pop completed work items from.
    pub fn response_queue(&self) -> Arc<WorkQueue> {
        self.channels.response.clone()
    }

    /// Builds work items shaped for this pool.
    pub fn item_factory(&self) -> WorkItemFactory {
        WorkItemFactory::new(self.config.item_shape())
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.workers.iter().map(EngineWorker::state).collect()
    }

    /// Number of work items lost with workers that stopped while holding one.
    pub fn lost_items(&self) -> usize {
        self.workers.iter().filter(|worker| worker.lost_item()).count()
    }

    /// Starts every worker against the shared queue pair.
    ///
    /// Fails without side effects if the pool was already started. If a
    /// thread cannot be spawned, the workers already running are shut down
    /// before the error is returned.
    pub fn start_all(&mut self) -> Result<()> {
        if self.shut_down {
            return Err(PipelineError::Closed);
        }
        if let Some(worker) = self.workers.iter().find(|w| w.state() != WorkerState::Created) {
            return Err(PipelineError::AlreadyStarted { worker: worker.id() });
        }
        info!("starting pool: {}", self.config);

        for index in 0..self.workers.len() {
            let started = self.workers[index].start(
                self.factory.clone(),
                self.channels.clone(),
                self.config.fault_policy,
            );
            if let Err(err) = started {
                self.abort_start(&err);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Tears down a partially started pool, logging what the started workers reported.
    fn abort_start(&mut self, cause: &PipelineError) -> PoolReport {
        error!(error = %cause, "pool failed to start, shutting down");
        let report = self.shutdown();
        for failure in &report.failures {
            error!(error = %failure, "worker failed before the pool finished starting");
        }
        report
    }

    /// Closes the request queue and joins every worker.
    ///
    /// Workers drain whatever is still queued before they stop. The response
    /// queue is closed afterwards when configured to, so consumers see the
    /// closed signal once they have drained it. Calling this again returns an
    /// empty report.
    pub fn shutdown(&mut self) -> PoolReport {
        let mut report = PoolReport::default();
        if self.shut_down {
            return report;
        }
        self.shut_down = true;

        debug!("closing request queue");
        self.channels.request.close();

        for worker in self.workers.iter_mut() {
            match worker.join() {
                Ok(Some(worker_report)) => report.workers.push(worker_report),
                Ok(None) => {}
                Err(err) => report.failures.push(err),
            }
        }

        if self.config.close_response_on_shutdown {
            self.channels.response.close();
        }

        info!(
            processed = report.processed(),
            failures = report.failures.len(),
            "pool shut down"
        );
        report
    }
}

impl<F: EngineFactory> Drop for WorkerPool<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! # Benchmark Driver
//!
//! Runs a [`WorkerPool`] as a closed-loop benchmark: a fixed set of work
//! items circulates between the calling thread and the workers. The calling
//! thread plays both producer and consumer, recycling every completed item
//! into the request queue until `num_warmup_batches + num_batches` batches
//! have completed. Only batches completed after warmup are timed.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;
use crate::backend::EngineFactory;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::pool::WorkerPool;
use crate::queue::TryPopError;
use crate::stats::{millis, RunningAverage};
use crate::worker::{WorkerReport, WorkerState};

/// How often the driver re-checks worker liveness while waiting for results.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Results of [`run_benchmark`].
#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub config: PipelineConfig,
    /// Batches completed during warmup
    pub warmup_batches: usize,
    /// Batches completed after warmup
    pub batches: usize,
    /// Samples in the measured batches
    pub samples: usize,
    /// Wall time of the measured batches
    pub elapsed: Duration,
    /// Submit-to-completion time of measured batches, in milliseconds
    pub batch_latency: RunningAverage,
    pub workers: Vec<WorkerReport>,
}

impl BenchmarkReport {
    pub fn batches_per_sec(&self) -> f64 {
        per_second(self.batches, self.elapsed)
    }

    pub fn samples_per_sec(&self) -> f64 {
        per_second(self.samples, self.elapsed)
    }
}

fn per_second(count: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.config)?;
        writeln!(
            f,
            "[benchmark]: warmup_batches={}, batches={}, samples={}, elapsed_ms={:.3}",
            self.warmup_batches,
            self.batches,
            self.samples,
            millis(self.elapsed)
        )?;
        writeln!(
            f,
            "[benchmark]: throughput={:.2} batches/s ({:.2} samples/s), batch_latency_ms={:.5}",
            self.batches_per_sec(),
            self.samples_per_sec(),
            self.batch_latency.value()
        )?;
        for worker in &self.workers {
            writeln!(f, "{}", worker)?;
        }
        Ok(())
    }
}

/// Number of work items kept circulating.
///
/// Two per worker keeps every worker busy while the driver recycles, capped so
/// that bounded queues can always absorb every item without the driver's own
/// pushes deadlocking against full queues.
fn in_flight_limit(config: &PipelineConfig) -> usize {
    let total = config.num_warmup_batches + config.num_batches;
    let mut limit = (config.num_workers * 2).min(total);
    if let (Some(request), Some(response)) = (config.request_capacity, config.response_capacity) {
        limit = limit.min(request + response + config.num_workers);
    }
    limit.max(1)
}

/// Runs a closed-loop benchmark with one engine per worker built by `factory`.
pub fn run_benchmark<F: EngineFactory>(config: PipelineConfig, factory: F) -> Result<BenchmarkReport> {
    config.validate_benchmark()?;
    let total = config.num_warmup_batches + config.num_batches;

    let mut pool = WorkerPool::new(config.clone(), factory)?;
    pool.start_all()?;

    let requests = pool.request_queue();
    let responses = pool.response_queue();
    let items = pool.item_factory();

    let mut submitted_at: HashMap<Uuid, Instant> = HashMap::new();
    let mut issued = 0;
    for _ in 0..in_flight_limit(&config) {
        let item = items.create(true);
        submitted_at.insert(item.id(), Instant::now());
        if requests.push(item).is_err() {
            break;
        }
        issued += 1;
    }
    debug!(in_flight = issued, total, "benchmark primed");

    let mut completed = 0;
    let mut batch_latency = RunningAverage::new();
    let mut measure_start = (config.num_warmup_batches == 0).then(Instant::now);

    while completed < total {
        let item = match responses.pop_timeout(POLL_INTERVAL) {
            Ok(item) => item,
            Err(TryPopError::Empty) => {
                let lost = pool.lost_items();
                if lost > 0 {
                    warn!(completed, total, lost, "work items lost with a failed worker, stopping benchmark");
                    break;
                }
                if pool.worker_states().iter().all(|state| *state == WorkerState::Stopped) {
                    warn!(completed, total, "every worker stopped before the benchmark finished");
                    break;
                }
                continue;
            }
            Err(TryPopError::Closed) => break,
        };

        let round_trip = submitted_at.remove(&item.id()).map(|at| at.elapsed());
        completed += 1;
        if completed > config.num_warmup_batches {
            if let Some(round_trip) = round_trip {
                batch_latency.update(millis(round_trip));
            }
        }
        if completed == config.num_warmup_batches {
            info!(warmup_batches = completed, "warmup done");
            measure_start = Some(Instant::now());
        }

        if issued < total {
            submitted_at.insert(item.id(), Instant::now());
            if requests.push(item).is_err() {
                warn!("request queue closed, no longer recycling work items");
                continue;
            }
            issued += 1;
        }
    }

    let elapsed = measure_start.map(|start| start.elapsed()).unwrap_or_default();
    let workers = pool.shutdown().into_result()?;
    if completed < total {
        return Err(PipelineError::Closed);
    }

    let batches = completed - config.num_warmup_batches;
    let report = BenchmarkReport {
        warmup_batches: config.num_warmup_batches,
        batches,
        samples: batches * config.batch_size,
        elapsed,
        batch_latency,
        workers,
        config,
    };
    info!(
        batches = report.batches,
        batches_per_sec = report.batches_per_sec(),
        samples_per_sec = report.samples_per_sec(),
        "benchmark finished"
    );
    Ok(report)
}

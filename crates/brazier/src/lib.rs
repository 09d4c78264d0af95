//! # Brazier
//!
//! A pipelined, multi-worker inference execution harness.
//!
//! ## Overview
//!
//! Brazier runs a fixed pool of worker threads, each owning one inference
//! engine. Workers drain work items from a shared request queue, run the
//! engine on each, and push the completed items to a shared response queue,
//! timing every stage on the way.
//!
//! Key components include:
//!
//! - A blocking, closable FIFO queue ([`BlockingQueue`])
//! - Reusable batch buffers moved through the pipeline ([`WorkItem`])
//! - Per-thread engine workers ([`EngineWorker`]) and their supervisor ([`WorkerPool`])
//! - Streaming latency statistics ([`RunningAverage`])
//! - A closed-loop benchmark driver ([`run_benchmark`])
//!
//! ## Architecture
//!
//! ### Ownership
//! A work item has exactly one owner at a time. Pushing moves it into a queue,
//! popping moves it out, so no two stages can ever touch the same buffers.
//!
//! ### Shutdown
//! Shutdown is driven by closing queues, not by polling. Closing the request
//! queue lets workers drain what is left; once it is empty every worker's
//! `pop` returns [`Closed`] and the worker exits, logging its average fetch,
//! process and submit latencies.
//!
//! ### Engines
//! The [`InferEngine`] trait is the only contact point with a compute backend.
//! Engines are built by an [`EngineFactory`] on the worker thread that will own
//! them and are never shared, so thread-affine device contexts are safe.
//! Engine faults are fatal to their worker and are reported to the pool,
//! which applies its [`FaultPolicy`].
//!
//! ## Features
//!
//! - **candle** - Enables the candle engine
//! - **burn** - Enables the burn engine
//!

mod error;
mod config;
mod item;
mod stats;

pub mod backend;
pub mod bench;
pub mod pool;
pub mod queue;
pub mod stream;
pub mod worker;

pub use backend::{EngineFactory, FakeEngine, InferEngine};
pub use bench::{run_benchmark, BenchmarkReport};
pub use config::{FaultPolicy, PipelineConfig};
pub use error::{BoxError, ConfigError, EngineError, PipelineError, Result};
pub use item::{ItemShape, WorkItem, WorkItemFactory};
pub use pool::{PoolReport, WorkerPool};
pub use queue::{BlockingQueue, Closed, PushError, TryPopError, TryPushError};
pub use stats::RunningAverage;
pub use stream::{submit, ResponseStream, Submitter};
pub use worker::{Channels, EngineWorker, ExitReason, StageStats, WorkQueue, WorkerId, WorkerReport, WorkerState};

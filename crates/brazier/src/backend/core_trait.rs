use crate::error::EngineError;
use crate::item::WorkItem;
use crate::worker::WorkerId;

/// The infer capability every backend engine must provide.
///
/// An engine is owned by exactly one worker and only ever touched from that
/// worker's thread, so it need not be `Send` or `Sync`. Device handles and
/// contexts that are bound to the thread that created them are fine here.
pub trait InferEngine {
    /// One-time device/context setup on the worker thread.
    ///
    /// Called once, before the first [`infer`](Self::infer).
    fn init_device(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Computes the output buffer of `item` from its input buffer.
    ///
    /// Synchronous. An error is treated as unrecoverable for this engine: the
    /// worker stops and reports it, nothing is retried.
    fn infer(&mut self, item: &mut WorkItem) -> Result<(), EngineError>;
}

/// Builds one engine per worker.
///
/// [`create`](Self::create) runs on the thread of the worker that will own
/// the engine, which keeps thread-affine backend resources on that thread.
///
/// Implemented for every `Fn(WorkerId) -> Result<E, EngineError>` closure.
pub trait EngineFactory: Send + Sync + 'static {
    type Engine: InferEngine;

    fn create(&self, worker: WorkerId) -> Result<Self::Engine, EngineError>;
}

impl<F, E> EngineFactory for F
where
    F: Fn(WorkerId) -> Result<E, EngineError> + Send + Sync + 'static,
    E: InferEngine,
{
    type Engine = E;

    fn create(&self, worker: WorkerId) -> Result<E, EngineError> {
        self(worker)
    }
}

impl<E: InferEngine + ?Sized> InferEngine for Box<E> {
    fn init_device(&mut self) -> Result<(), EngineError> {
        (**self).init_device()
    }

    fn infer(&mut self, item: &mut WorkItem) -> Result<(), EngineError> {
        (**self).infer(item)
    }
}

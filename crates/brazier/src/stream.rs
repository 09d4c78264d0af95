//! # Async Bridge
//!
//! Lets async producers and consumers talk to a pipeline whose queues block.
//! Blocking queue operations run on tokio's blocking thread pool, never on
//! the async workers.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;
use crate::error::{PipelineError, Result};
use crate::item::WorkItem;
use crate::queue::{TryPopError, TryPushError};
use crate::worker::WorkQueue;

/// How often the pump notices that its stream was dropped.
const PUMP_POLL: Duration = Duration::from_millis(20);

/// # ResponseStream
///
/// A [`Stream`] of completed work items read from a response queue.
///
/// A blocking pump task pops from the queue and forwards into an unbounded
/// tokio channel. The stream yields `None` once the queue has been closed and
/// drained.
///
/// Dropping the stream stops the pump. Items the stream had taken but not yet
/// yielded go back to the tail of the response queue, so they come out after
/// anything queued in the meantime. An item that cannot go back without
/// blocking, because the queue is closed or full, is dropped with a warning.
///
/// Must be created inside a tokio runtime.
pub struct ResponseStream {
    queue: Arc<WorkQueue>,
    receiver: mpsc::UnboundedReceiver<WorkItem>,
    pump: JoinHandle<()>,
}

impl ResponseStream {
    pub fn new(queue: Arc<WorkQueue>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pump = {
            let queue = queue.clone();
            tokio::task::spawn_blocking(move || pump(queue, sender))
        };
        Self { queue, receiver, pump }
    }

    /// True once the pump has stopped forwarding.
    pub fn is_finished(&self) -> bool {
        self.pump.is_finished()
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        self.receiver.close();
        while let Ok(item) = self.receiver.try_recv() {
            requeue(&self.queue, item);
        }
    }
}

fn pump(queue: Arc<WorkQueue>, sender: mpsc::UnboundedSender<WorkItem>) {
    loop {
        match queue.pop_timeout(PUMP_POLL) {
            Ok(item) => {
                if let Err(unsent) = sender.send(item) {
                    requeue(&queue, unsent.0);
                    return;
                }
            }
            Err(TryPopError::Empty) if sender.is_closed() => return,
            Err(TryPopError::Empty) => {}
            Err(TryPopError::Closed) => return,
        }
    }
}

fn requeue(queue: &WorkQueue, item: WorkItem) {
    if let Err(rejected) = queue.try_push(item) {
        let reason = match &rejected {
            TryPushError::Full(_) => "full",
            TryPushError::Closed(_) => "closed",
        };
        let dropped = rejected.into_inner();
        warn!(item = %dropped.id(), reason, "response stream dropped, cannot requeue completed item");
    }
}

impl Stream for ResponseStream {
    type Item = WorkItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

/// Async handle for pushing work items into a request queue.
#[derive(Debug, Clone)]
pub struct Submitter {
    queue: Arc<WorkQueue>,
}

impl Submitter {
    pub fn new(queue: Arc<WorkQueue>) -> Self {
        Self { queue }
    }

    pub async fn submit(&self, item: WorkItem) -> Result<()> {
        submit(&self.queue, item).await
    }
}

/// Pushes `item`, waiting off the async executor while the queue is full.
///
/// Fails with [`PipelineError::Closed`] once the queue is closed; the item
/// is dropped in that case.
pub async fn submit(queue: &Arc<WorkQueue>, item: WorkItem) -> Result<()> {
    let queue = queue.clone();
    tokio::task::spawn_blocking(move || queue.push(item))
        .await
        .map_err(|_| PipelineError::Closed)?
        .map_err(|_| PipelineError::Closed)
}

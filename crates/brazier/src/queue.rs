//! # Blocking Queue
//!
//! A FIFO channel shared between producers, workers and consumers.
//!
//! The queue can be bounded or unbounded, supports blocking `push`/`pop`, and
//! can be closed. Closing is the only shutdown mechanism of the pipeline:
//!
//! - `push` on a closed queue fails and hands the value back
//! - `pop` keeps returning queued values after close until the queue is
//!   drained, then returns [`Closed`]
//! - every thread blocked in `push` or `pop` is woken on close
//!
//! Values are moved in and out, so a value has exactly one owner at any time.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Returned by [`BlockingQueue::pop`] once the queue is closed and drained.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("queue is closed")]
pub struct Closed;

/// Returned by [`BlockingQueue::push`] when the queue is closed.
///
/// Carries the rejected value so the caller keeps ownership of it.
#[derive(Error, PartialEq, Eq)]
#[error("queue is closed")]
pub struct PushError<T>(pub T);

impl<T> PushError<T> {
    /// Recovers the value that could not be pushed.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PushError(..)")
    }
}

/// Returned by [`BlockingQueue::try_push`]; carries the rejected value.
#[derive(Error, PartialEq, Eq)]
pub enum TryPushError<T> {
    #[error("queue is full")]
    Full(T),
    #[error("queue is closed")]
    Closed(T),
}

impl<T> TryPushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TryPushError::Full(item) | TryPushError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryPushError::Full(_) => f.write_str("Full(..)"),
            TryPushError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

/// Outcome of a non-blocking or timed pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryPopError {
    /// Nothing available right now (or before the deadline), queue still open
    Empty,
    /// Queue is closed and drained
    Closed,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Multi-producer, multi-consumer closable FIFO queue.
pub struct BlockingQueue<T> {
    state: Mutex<State<T>>,
    /// Signalled when an item is pushed or the queue closes
    not_empty: Condvar,
    /// Signalled when an item is popped or the queue closes
    not_full: Condvar,
    capacity: Option<usize>,
}

impl<T> BlockingQueue<T> {
    /// Creates a queue with no capacity limit. `push` never blocks.
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    /// Creates a queue holding at most `capacity` items.
    ///
    /// A capacity of zero is clamped to one; configuration validation rejects
    /// it before a pool ever builds such a queue.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    /// Creates a bounded queue for `Some(capacity)`, otherwise unbounded.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.map(|c| c.max(1)),
        }
    }

    /// Appends `item`, blocking while a bounded queue is full.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(PushError(item));
            }
            match self.capacity {
                Some(capacity) if state.items.len() >= capacity => {
                    self.not_full.wait(&mut state);
                }
                _ => break,
            }
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Appends `item` only if that can be done without waiting.
    pub fn try_push(&self, item: T) -> Result<(), TryPushError<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TryPushError::Closed(item));
        }
        if self.capacity.is_some_and(|capacity| state.items.len() >= capacity) {
            return Err(TryPushError::Full(item));
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest item, blocking while the queue is empty and open.
    pub fn pop(&self) -> Result<T, Closed> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Ok(item);
            }
            if state.closed {
                return Err(Closed);
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Removes the oldest item without blocking.
    pub fn try_pop(&self) -> Result<T, TryPopError> {
        let mut state = self.state.lock();
        match state.items.pop_front() {
            Some(item) => {
                drop(state);
                self.not_full.notify_one();
                Ok(item)
            }
            None if state.closed => Err(TryPopError::Closed),
            None => Err(TryPopError::Empty),
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, TryPopError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Ok(item);
            }
            if state.closed {
                return Err(TryPopError::Closed);
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                // one last look: an item may have raced in with the timeout
                return match state.items.pop_front() {
                    Some(item) => {
                        drop(state);
                        self.not_full.notify_one();
                        Ok(item)
                    }
                    None if state.closed => Err(TryPopError::Closed),
                    None => Err(TryPopError::Empty),
                };
            }
        }
    }

    /// Closes the queue and wakes every blocked producer and consumer.
    ///
    /// Idempotent. Items already queued stay poppable.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Capacity limit, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T> fmt::Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BlockingQueue")
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = BlockingQueue::unbounded();
        for i in 0..100 {
            queue.push(i).unwrap();
        }
        let popped: Vec<_> = (0..100).map(|_| queue.pop().unwrap()).collect();
        assert_eq!(popped, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_pop_on_closed_empty_queue_does_not_block() {
        let queue = BlockingQueue::<u32>::unbounded();
        queue.close();
        assert_eq!(queue.pop(), Err(Closed));
        assert_eq!(queue.pop(), Err(Closed), "closed signal should repeat");
    }

    #[test]
    fn test_close_drains_remaining_items_first() {
        let queue = BlockingQueue::unbounded();
        queue.push("a").unwrap();
        queue.push("b").unwrap();
        queue.close();

        assert_eq!(queue.pop(), Ok("a"));
        assert_eq!(queue.pop(), Ok("b"));
        assert_eq!(queue.pop(), Err(Closed));
    }

    #[test]
    fn test_push_after_close_returns_item() {
        let queue = BlockingQueue::unbounded();
        queue.close();
        let err = queue.push(String::from("late")).unwrap_err();
        assert_eq!(err.into_inner(), "late");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let queue = BlockingQueue::<u8>::bounded(2);
        queue.close();
        queue.close();
        assert!(queue.is_closed());
    }

    #[test]
    fn test_close_wakes_blocked_popper() {
        let queue = Arc::new(BlockingQueue::<u32>::unbounded());
        let popper = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();

        assert_eq!(popper.join().unwrap(), Err(Closed));
    }

    #[test]
    fn test_bounded_push_blocks_until_pop() {
        let queue = Arc::new(BlockingQueue::bounded(1));
        queue.push(1).unwrap();

        let pushed = Arc::new(AtomicBool::new(false));
        let pusher = {
            let queue = queue.clone();
            let pushed = pushed.clone();
            thread::spawn(move || {
                queue.push(2).unwrap();
                pushed.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!pushed.load(Ordering::SeqCst), "push should block on a full queue");

        assert_eq!(queue.pop(), Ok(1));
        pusher.join().unwrap();
        assert!(pushed.load(Ordering::SeqCst));
        assert_eq!(queue.pop(), Ok(2));
    }

    #[test]
    fn test_close_wakes_blocked_pusher() {
        let queue = Arc::new(BlockingQueue::bounded(1));
        queue.push(1).unwrap();

        let pusher = {
            let queue = queue.clone();
            thread::spawn(move || queue.push(2))
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();

        let rejected = pusher.join().unwrap().unwrap_err();
        assert_eq!(rejected.into_inner(), 2);
        assert_eq!(queue.pop(), Ok(1));
        assert_eq!(queue.pop(), Err(Closed));
    }

    #[test]
    fn test_try_pop_and_timeout() {
        let queue = BlockingQueue::unbounded();
        assert_eq!(queue.try_pop(), Err(TryPopError::Empty));
        assert_eq!(
            queue.pop_timeout(Duration::from_millis(10)),
            Err(TryPopError::Empty)
        );

        queue.push(7).unwrap();
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)), Ok(7));

        queue.close();
        assert_eq!(queue.try_pop(), Err(TryPopError::Closed));
        assert_eq!(
            queue.pop_timeout(Duration::from_millis(10)),
            Err(TryPopError::Closed)
        );
    }

    fn spawn_producers(queue: &Arc<BlockingQueue<(u32, u32)>>, count: u32, per_producer: u32) -> Vec<thread::JoinHandle<()>> {
        (0..count)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for seq in 0..per_producer {
                        queue.push((p, seq)).unwrap();
                    }
                })
            })
            .collect()
    }

    fn spawn_consumer(queue: &Arc<BlockingQueue<(u32, u32)>>) -> thread::JoinHandle<Vec<(u32, u32)>> {
        let queue = queue.clone();
        thread::spawn(move || {
            let mut seen = Vec::new();
            while let Ok(item) = queue.pop() {
                seen.push(item);
            }
            seen
        })
    }

    #[test]
    fn test_per_producer_order_single_consumer() {
        let queue = Arc::new(BlockingQueue::bounded(4));
        let producers = spawn_producers(&queue, 3, 200);
        let consumer = spawn_consumer(&queue);

        for producer in producers {
            producer.join().unwrap();
        }
        queue.close();

        let seen = consumer.join().unwrap();
        assert_eq!(seen.len(), 600);
        for p in 0..3 {
            let seqs: Vec<_> = seen.iter().filter(|(id, _)| *id == p).map(|(_, s)| *s).collect();
            assert_eq!(seqs, (0..200).collect::<Vec<_>>(), "producer {} out of order", p);
        }
    }

    #[test]
    fn test_per_producer_order_with_many_consumers() {
        let queue = Arc::new(BlockingQueue::bounded(4));
        let producers = spawn_producers(&queue, 3, 200);
        let consumers: Vec<_> = (0..4).map(|_| spawn_consumer(&queue)).collect();

        for producer in producers {
            producer.join().unwrap();
        }
        queue.close();

        let mut merged = vec![Vec::new(); 3];
        for consumer in consumers {
            let seen = consumer.join().unwrap();
            for p in 0..3 {
                let seqs: Vec<_> = seen.iter().filter(|(id, _)| *id == p).map(|(_, s)| *s).collect();
                assert!(
                    seqs.windows(2).all(|pair| pair[0] < pair[1]),
                    "a consumer saw producer {} out of order",
                    p
                );
                merged[p as usize].extend(seqs);
            }
        }
        for (p, mut seqs) in merged.into_iter().enumerate() {
            seqs.sort_unstable();
            assert_eq!(seqs, (0..200).collect::<Vec<_>>(), "producer {} lost or duplicated items", p);
        }
    }

    #[test]
    fn test_try_push() {
        let queue = BlockingQueue::bounded(1);
        assert_eq!(queue.try_push(1), Ok(()));
        assert_eq!(queue.try_push(2), Err(TryPushError::Full(2)));

        queue.close();
        let err = queue.try_push(3).unwrap_err();
        assert_eq!(err, TryPushError::Closed(3));
        assert_eq!(err.into_inner(), 3);
        assert_eq!(queue.pop(), Ok(1));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = BlockingQueue::<u8>::bounded(0);
        assert_eq!(queue.capacity(), Some(1));
        assert_eq!(BlockingQueue::<u8>::unbounded().capacity(), None);
    }
}

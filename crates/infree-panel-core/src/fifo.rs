//! Bounded byte queue between frame ingestion and dispatch.
//!
//! The producer (the frame parser, running in the receive task) never blocks:
//! a put that would overflow discards everything buffered first. The consumer
//! (the dispatch loop) reads in all-or-nothing chunks and waits on
//! [`ByteQueue::readable`] when it runs dry.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Single-producer, single-consumer byte FIFO.
pub struct ByteQueue {
    inner: Mutex<Inner>,
    capacity: usize,
    readable: Notify,
}

struct Inner {
    bytes: VecDeque<u8>,
    /// Bumped on every reset, including overflow resets.
    generation: u64,
}

impl Inner {
    fn clear(&mut self) {
        self.bytes.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    fn take(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len();
        if self.bytes.len() < n {
            return 0;
        }
        for (dst, src) in buf.iter_mut().zip(self.bytes.drain(..n)) {
            *dst = src;
        }
        n
    }
}

impl ByteQueue {
    /// Creates an empty queue holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                bytes: VecDeque::with_capacity(capacity),
                generation: 0,
            }),
            capacity,
            readable: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of bytes the queue can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.lock().bytes.len()
    }

    /// Checks for queue emptiness.
    pub fn is_empty(&self) -> bool {
        self.lock().bytes.is_empty()
    }

    /// Number of resets so far.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Appends `data`, returning the number of bytes written.
    ///
    /// If `data` does not fit in the free space the whole queue is reset
    /// first. A chunk larger than the capacity is dropped and 0 is returned.
    pub fn put(&self, data: &[u8]) -> usize {
        if data.len() > self.capacity {
            warn!(
                "Dropping {} bytes: larger than queue capacity {}",
                data.len(),
                self.capacity
            );
            return 0;
        }

        {
            let mut inner = self.lock();
            if inner.bytes.len() + data.len() > self.capacity {
                debug!("Queue overflow, discarding {} buffered bytes", inner.bytes.len());
                inner.clear();
            }
            inner.bytes.extend(data);
        }

        self.readable.notify_one();
        data.len()
    }

    /// Fills `buf` completely, or takes nothing.
    ///
    /// Returns `buf.len()` when enough bytes were buffered, else 0 with the
    /// queue left untouched.
    pub fn get(&self, buf: &mut [u8]) -> usize {
        self.lock().take(buf)
    }

    /// Like [`get`](Self::get), also returning the generation the bytes
    /// were read in.
    pub fn get_marked(&self, buf: &mut [u8]) -> (usize, u64) {
        let mut inner = self.lock();
        let got = inner.take(buf);
        (got, inner.generation)
    }

    /// Like [`get`](Self::get), but only while the queue has not been reset
    /// since `generation`. Returns `None` after a reset, taking nothing.
    pub fn get_since(&self, buf: &mut [u8], generation: u64) -> Option<usize> {
        let mut inner = self.lock();
        if inner.generation != generation {
            return None;
        }
        Some(inner.take(buf))
    }

    /// Discards every buffered byte.
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// Waits until the producer has put data since the last wake-up.
    ///
    /// A put that happened while nobody was waiting is remembered, so the
    /// consumer cannot miss it between a failed `get` and this call.
    pub async fn readable(&self) {
        self.readable.notified().await;
    }
}

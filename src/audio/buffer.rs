//! Audio buffers
//!
//! [`SampleQueue`] is a lock-free single-producer single-consumer queue
//! between a cpal callback thread and the controller. [`PcmFrame`] is the
//! controller's reusable capture buffer.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Fixed-capacity byte buffer of little-endian 16-bit PCM.
///
/// The filled length is tracked apart from the capacity because device
/// reads may return partial frames.
pub struct PcmFrame {
    data: Box<[u8]>,
    filled: usize,
}

impl PcmFrame {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// The filled part of the frame
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    /// Whole buffer for a device read. Call [`Self::set_filled`] afterwards.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Record how many bytes the last read produced (clamped to capacity)
    pub fn set_filled(&mut self, len: usize) {
        self.filled = len.min(self.data.len());
    }

    pub fn clear(&mut self) {
        self.filled = 0;
    }
}

/// Lock-free queue of PCM samples
pub struct SampleQueue {
    queue: ArrayQueue<i16>,
    overflow_count: AtomicUsize,
    underrun_count: AtomicUsize,
}

impl SampleQueue {
    /// Create a new queue holding up to `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            overflow_count: AtomicUsize::new(0),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Push one sample, counting an overflow when the queue is full
    pub fn push(&self, sample: i16) -> bool {
        if self.queue.push(sample).is_err() {
            self.overflow_count.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Push whole little-endian samples from `bytes` until the queue is full.
    ///
    /// Returns the number of bytes consumed. A trailing odd byte is never
    /// consumed. Does not count overflow: the writer decides whether to wait.
    pub fn push_le_bytes(&self, bytes: &[u8]) -> usize {
        let mut consumed = 0;
        for pair in bytes.chunks_exact(2) {
            if self.queue.push(i16::from_le_bytes([pair[0], pair[1]])).is_err() {
                break;
            }
            consumed += 2;
        }
        consumed
    }

    pub fn pop(&self) -> Option<i16> {
        self.queue.pop()
    }

    /// Note a device period that ran short of queued audio
    pub fn record_underrun(&self) {
        self.underrun_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Pop as many whole samples as fit into `out` as little-endian bytes.
    ///
    /// Returns the number of bytes written, always even.
    pub fn pop_le_bytes(&self, out: &mut [u8]) -> usize {
        let mut written = 0;
        for pair in out.chunks_exact_mut(2) {
            match self.queue.pop() {
                Some(sample) => {
                    pair.copy_from_slice(&sample.to_le_bytes());
                    written += 2;
                }
                None => break,
            }
        }
        written
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Drop everything queued
    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to a sample queue
pub type SharedSampleQueue = Arc<SampleQueue>;

/// Create a new shared sample queue
pub fn create_shared_queue(capacity: usize) -> SharedSampleQueue {
    Arc::new(SampleQueue::new(capacity))
}

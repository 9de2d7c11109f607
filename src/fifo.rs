//! Bounded single producer, single consumer byte queues.
//!
//! These are the three queues a modem instance runs on: decoded bytes
//! from the receive interrupt to the foreground, outgoing bytes from
//! the foreground to the transmit interrupt. Exclusive producer and
//! consumer sides are enforced by handing out one [`FifoWriter`] and
//! one [`FifoReader`] per queue, so the interrupt side never takes a
//! lock and never blocks.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// One slot is kept empty to distinguish full from empty.
struct Inner {
    buf: Box<[UnsafeCell<u8>]>,
    // Next slot to read. Written only by the reader.
    head: AtomicUsize,
    // Next slot to write. Written only by the writer.
    tail: AtomicUsize,
}

// The writer only ever dereferences the slot at `tail`, the reader
// only the slot at `head`, and the index stores order those accesses.
unsafe impl Sync for Inner {}

impl Inner {
    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (tail + self.buf.len() - head) % self.buf.len()
    }
}

/// Producer side of a byte queue.
pub struct FifoWriter {
    inner: Arc<Inner>,
}

/// Consumer side of a byte queue.
pub struct FifoReader {
    inner: Arc<Inner>,
}

/// Create a queue holding up to `capacity` bytes.
pub fn new_fifo(capacity: usize) -> (FifoWriter, FifoReader) {
    assert!(capacity > 0);
    let buf = (0..capacity + 1)
        .map(|_| UnsafeCell::new(0))
        .collect::<Vec<_>>()
        .into_boxed_slice();
    let inner = Arc::new(Inner {
        buf,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
    });
    (
        FifoWriter {
            inner: inner.clone(),
        },
        FifoReader { inner },
    )
}

impl FifoWriter {
    /// Append one byte. Returns false, dropping the byte, if the
    /// queue is full.
    #[must_use]
    pub fn push(&mut self, b: u8) -> bool {
        let n = self.inner.buf.len();
        let tail = self.inner.tail.load(Ordering::Relaxed);
        let next = (tail + 1) % n;
        if next == self.inner.head.load(Ordering::Acquire) {
            return false;
        }
        // SAFETY: the slot at `tail` is outside the readable range
        // until the store below publishes it, and we are the only
        // writer.
        unsafe {
            *self.inner.buf[tail].get() = b;
        }
        self.inner.tail.store(next, Ordering::Release);
        true
    }

    /// True if a push would fail.
    pub fn is_full(&self) -> bool {
        self.inner.len() == self.capacity()
    }

    /// Bytes currently queued.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    /// Maximum number of queued bytes.
    pub fn capacity(&self) -> usize {
        self.inner.buf.len() - 1
    }
}

impl FifoReader {
    /// Remove and return the oldest byte, if any.
    pub fn pop(&mut self) -> Option<u8> {
        let n = self.inner.buf.len();
        let head = self.inner.head.load(Ordering::Relaxed);
        if head == self.inner.tail.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: the Acquire load above proves the writer published
        // this slot, and we are the only reader.
        let b = unsafe { *self.inner.buf[head].get() };
        self.inner.head.store((head + 1) % n, Ordering::Release);
        Some(b)
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    /// Bytes currently queued.
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

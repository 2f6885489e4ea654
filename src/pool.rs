//! A bounded free-list of fixed-capacity input buffers.
//!
//! This is the writer's only source of backpressure: `write()` blocks only
//! when every buffer is either being filled by the slicer, in flight to a
//! worker, or awaiting emission.

use bytes::BytesMut;
use crossbeam_channel::{Receiver, Sender};

/// A pool of `2 * blocks` fixed-capacity buffers.
pub(crate) struct BufferPool {
    capacity: usize,
    free_tx: Sender<BytesMut>,
    free_rx: Receiver<BytesMut>,
}

impl BufferPool {
    /// Creates a pool of `2 * blocks` buffers, each pre-allocated to
    /// `block_size` bytes of capacity.
    pub(crate) fn new(block_size: usize, blocks: usize) -> Self {
        let slots = 2 * blocks;
        let (free_tx, free_rx) = crossbeam_channel::bounded(slots);
        for _ in 0..slots {
            free_tx
                .send(BytesMut::with_capacity(block_size))
                .expect("pool channel has room for its own prefill");
        }
        Self {
            capacity: block_size,
            free_tx,
            free_rx,
        }
    }

    /// Acquires a buffer, blocking if every buffer is currently checked out.
    pub(crate) fn acquire(&self) -> BytesMut {
        let mut buf = self.free_rx.recv().expect("buffer pool outlives its writer");
        buf.clear();
        if buf.capacity() < self.capacity {
            buf.reserve(self.capacity - buf.capacity());
        }
        buf
    }

    /// Returns a buffer to the pool. Never blocks: the pool never holds more
    /// in-flight buffers than the `2 * blocks` it was built with.
    pub(crate) fn release(&self, buf: BytesMut) {
        let _ = self.free_tx.try_send(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefills_exactly_two_per_block() {
        let pool = BufferPool::new(1024, 3);
        let mut held = Vec::new();
        for _ in 0..6 {
            held.push(pool.acquire());
        }
        assert!(pool.free_rx.try_recv().is_err());

        for buf in held {
            pool.release(buf);
        }
        assert_eq!(pool.free_rx.len(), 6);
    }

    #[test]
    fn acquired_buffers_are_cleared() {
        let pool = BufferPool::new(16, 1);
        let mut buf = pool.acquire();
        buf.extend_from_slice(b"hello");
        pool.release(buf);

        let buf = pool.acquire();
        assert!(buf.is_empty());
    }
}

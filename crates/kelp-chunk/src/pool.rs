//! Process-wide pool of chunk-sized byte buffers.
//!
//! The writer's accumulation buffer and every downloaded chunk body pass
//! through here, so steady-state chunk traffic reuses a small set of
//! allocations instead of churning the allocator at 4 MiB a piece.

use bytes::BytesMut;
use lazy_static::lazy_static;
use parking_lot::Mutex;

use crate::chunk::CHUNK_SIZE;

/// Buffers above this capacity are dropped instead of recycled.
const MAX_POOLED_CAPACITY: usize = CHUNK_SIZE;

/// Upper bound on idle buffers held by the pool.
const MAX_POOLED_BUFFERS: usize = 64;

lazy_static! {
    static ref POOL: BufferPool = BufferPool::new(MAX_POOLED_BUFFERS);
}

struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
    max_buffers: usize,
}

impl BufferPool {
    fn new(max_buffers: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_buffers,
        }
    }

    fn acquire(&self, capacity: usize) -> BytesMut {
        if capacity > 0 && capacity <= MAX_POOLED_CAPACITY {
            let mut free = self.free.lock();
            if let Some(idx) = free.iter().position(|b| b.capacity() >= capacity) {
                return free.swap_remove(idx);
            }
        }
        BytesMut::with_capacity(capacity)
    }

    fn release(&self, mut buf: BytesMut) {
        buf.clear();
        if buf.capacity() == 0 || buf.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        let mut free = self.free.lock();
        if free.len() < self.max_buffers {
            free.push(buf);
        }
    }
}

/// Returns a cleared buffer with at least `capacity` bytes of room.
pub(crate) fn acquire(capacity: usize) -> BytesMut {
    POOL.acquire(capacity)
}

/// Hands a buffer back for reuse. Buffers with no capacity, or larger than a
/// chunk, are dropped.
pub(crate) fn release(buf: BytesMut) {
    POOL.release(buf)
}

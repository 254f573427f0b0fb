use std::sync::{Mutex, MutexGuard};

/// Fixed-length byte buffer, either borrowed from a [`PixelBufferPool`] or allocated ad hoc.
#[derive(Debug)]
pub struct PixelBuffer {
    data: Vec<u8>,
    pooled: bool,
}

impl PixelBuffer {
    /// Zeroed buffer that does not count against any pool.
    pub fn ad_hoc(len: usize) -> Self {
        Self {
            data: vec![0; len],
            pooled: false,
        }
    }

    /// Whether the buffer came from a pool.
    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    /// Byte length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Return `true` for a zero-length buffer.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Mutable contents.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Counters reported by [`PixelBufferPool::stats`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PixelBufferPoolStats {
    /// Buffers sitting in the pool.
    pub retained_buffers: usize,
    /// Bytes sitting in the pool.
    pub retained_bytes: usize,
    /// Pool buffers currently handed out.
    pub outstanding: usize,
    /// Fresh allocations made by the pool.
    pub alloc_buffers: u64,
    /// Bytes of fresh allocations.
    pub alloc_bytes: u64,
    /// Acquires refused because `capacity` buffers were out.
    pub exhausted: u64,
    /// Returned buffers that were not retained.
    pub dropped_on_release: u64,
}

#[derive(Debug, Default)]
struct PoolInner {
    free: Vec<Vec<u8>>,
    stats: PixelBufferPoolStats,
}

/// Bounded, thread-safe pool of equally sized pixel buffers.
///
/// At most `capacity` pooled buffers exist at once; past that [`PixelBufferPool::acquire`] returns
/// `None` and callers fall back to [`PixelBuffer::ad_hoc`].
#[derive(Debug)]
pub struct PixelBufferPool {
    buffer_len: usize,
    capacity: usize,
    inner: Mutex<PoolInner>,
}

impl PixelBufferPool {
    /// Pool of `capacity` buffers of `buffer_len` bytes each, allocated lazily.
    pub fn new(buffer_len: usize, capacity: usize) -> Self {
        Self {
            buffer_len,
            capacity,
            inner: Mutex::new(PoolInner::default()),
        }
    }

    /// Length of every pooled buffer.
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Counter snapshot.
    pub fn stats(&self) -> PixelBufferPoolStats {
        self.lock().stats.clone()
    }

    /// Borrow a buffer, reusing a returned one when possible.
    pub fn acquire(&self) -> Option<PixelBuffer> {
        let mut inner = self.lock();
        if let Some(data) = inner.free.pop() {
            inner.stats.retained_buffers = inner.stats.retained_buffers.saturating_sub(1);
            inner.stats.retained_bytes = inner.stats.retained_bytes.saturating_sub(self.buffer_len);
            inner.stats.outstanding += 1;
            return Some(PixelBuffer { data, pooled: true });
        }
        if inner.stats.outstanding + inner.free.len() >= self.capacity {
            inner.stats.exhausted = inner.stats.exhausted.saturating_add(1);
            return None;
        }

        inner.stats.outstanding += 1;
        inner.stats.alloc_buffers = inner.stats.alloc_buffers.saturating_add(1);
        inner.stats.alloc_bytes = inner.stats.alloc_bytes.saturating_add(self.buffer_len as u64);
        Some(PixelBuffer {
            data: vec![0; self.buffer_len],
            pooled: true,
        })
    }

    /// [`PixelBufferPool::acquire`], falling back to [`PixelBuffer::ad_hoc`] when exhausted.
    pub fn acquire_or_ad_hoc(&self) -> PixelBuffer {
        self.acquire()
            .unwrap_or_else(|| PixelBuffer::ad_hoc(self.buffer_len))
    }

    /// Give a buffer back. Ad-hoc and wrongly sized buffers are dropped.
    pub fn recycle(&self, buffer: PixelBuffer) {
        let mut inner = self.lock();
        if !buffer.pooled {
            inner.stats.dropped_on_release = inner.stats.dropped_on_release.saturating_add(1);
            return;
        }
        inner.stats.outstanding = inner.stats.outstanding.saturating_sub(1);
        if buffer.data.len() != self.buffer_len || inner.free.len() >= self.capacity {
            inner.stats.dropped_on_release = inner.stats.dropped_on_release.saturating_add(1);
            return;
        }
        inner.free.push(buffer.data);
        inner.stats.retained_buffers += 1;
        inner.stats.retained_bytes = inner.stats.retained_bytes.saturating_add(self.buffer_len);
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/buffer_pool.rs"]
mod tests;

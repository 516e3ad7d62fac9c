//! Fixed pool of reusable read buffers.
//!
//! The pool size bounds the number of concurrent readers per store. Running
//! out is expected under load and reported as a plain `None`.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

pub struct ReadBufferPool {
    buffers: Vec<Mutex<Vec<u8>>>,
    claimed: Vec<AtomicBool>,
}

impl std::fmt::Debug for ReadBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadBufferPool")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

impl ReadBufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: (0..capacity).map(|_| Mutex::new(Vec::new())).collect(),
            claimed: (0..capacity).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.claimed.len()
    }

    pub fn available(&self) -> usize {
        self.claimed.iter().filter(|c| !c.load(Ordering::Relaxed)).count()
    }

    /// Claim a free slot.
    pub fn acquire(&self) -> Option<usize> {
        self.claimed.iter().position(|slot| {
            slot.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        })
    }

    /// Return a slot. Releasing a free slot is a no-op.
    pub fn release(&self, slot: usize) {
        if let Some(flag) = self.claimed.get(slot) {
            flag.store(false, Ordering::Release);
        }
    }

    /// Run `f` on the slot's buffer, sized to exactly `len` bytes.
    pub fn with_buffer<R>(
        &self,
        slot: usize,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Option<R> {
        let mut buffer = self.buffers.get(slot)?.lock();
        buffer.resize(len, 0);
        Some(f(&mut buffer[..len]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustion_and_release() {
        let pool = ReadBufferPool::new(2);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.acquire(), None);
        assert_eq!(pool.available(), 0);

        pool.release(a);
        assert_eq!(pool.acquire(), Some(a));
    }

    #[test]
    fn test_with_buffer_sizes() {
        let pool = ReadBufferPool::new(1);
        let slot = pool.acquire().unwrap();
        assert_eq!(pool.with_buffer(slot, 16, |buf| buf.len()), Some(16));
        assert_eq!(pool.with_buffer(slot, 4, |buf| buf.len()), Some(4));
        assert_eq!(pool.with_buffer(7, 4, |buf| buf.len()), None);
    }

    #[test]
    fn test_empty_pool() {
        let pool = ReadBufferPool::new(0);
        assert_eq!(pool.acquire(), None);
    }
}

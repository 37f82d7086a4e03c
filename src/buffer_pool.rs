//! Fixed-size recyclable byte buffers, used for per-connection receive buffers.

use std::sync::Mutex;

/// Free list of fixed-size buffers. `acquire` hands out a recycled buffer if one is free,
/// otherwise allocates fresh. `release` returns a buffer to the list, capped at `2 * count`;
/// buffers released past the cap are dropped instead of retained.
pub struct BufferPool {
    buffer_size: usize,
    cap: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new(buffer_size: usize, count: usize) -> Self {
        let free = (0..count).map(|_| vec![0u8; buffer_size]).collect();
        Self {
            buffer_size,
            cap: count.saturating_mul(2),
            free: Mutex::new(free),
        }
    }

    pub fn acquire(&self) -> Vec<u8> {
        let mut free = self.free.lock().expect("buffer pool lock poisoned");
        free.pop().unwrap_or_else(|| vec![0u8; self.buffer_size])
    }

    pub fn release(&self, mut buffer: Vec<u8>) {
        let mut free = self.free.lock().expect("buffer pool lock poisoned");
        if free.len() < self.cap {
            buffer.clear();
            buffer.resize(self.buffer_size, 0);
            free.push(buffer);
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_returns_correctly_sized_buffer() {
        let pool = BufferPool::new(256, 2);
        let buf = pool.acquire();
        assert_eq!(buf.len(), 256);
    }

    #[test]
    fn release_reuses_buffers_up_to_acquire_count() {
        let pool = BufferPool::new(64, 1);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.free.lock().unwrap().len(), 0);
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.free.lock().unwrap().len(), 2);
    }

    #[test]
    fn release_past_cap_is_dropped() {
        let pool = BufferPool::new(32, 1);
        for _ in 0..10 {
            pool.release(vec![0u8; 32]);
        }
        assert_eq!(pool.free.lock().unwrap().len(), 2);
    }
}

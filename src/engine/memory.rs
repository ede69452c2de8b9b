// src/engine/memory.rs
//
// Byte-weighted admission control for concurrent resize calls.
//
// Each call reserves its estimated peak pixel memory before decoding and gives
// it back when its scope ends. Callers beyond the budget wait instead of
// pushing the process into OOM.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Default admission budget: 16 concurrent 100MB operations.
pub const DEFAULT_MEMORY_BUDGET: u64 = 16 * 100 * 1024 * 1024;

/// Lower bound for any estimate to avoid zero-ish weights
const MIN_ESTIMATE_BYTES: u64 = 1024 * 1024;

/// Decoder/resampler scratch on top of the pixel buffers (heuristic)
const WORKING_OVERHEAD_BYTES: u64 = 4 * 1024 * 1024;

/// Decoded buffers never exceed 4 bands.
const MAX_BANDS: u64 = 4;

/// In-memory weighted semaphore for byte-based backpressure
#[derive(Debug)]
pub struct WeightedSemaphore {
    capacity: u64,
    state: Mutex<u64>, // available bytes
    cvar: Condvar,
}

#[derive(Debug)]
pub struct MemoryPermit {
    sem: Arc<WeightedSemaphore>,
    weight: u64,
}

impl MemoryPermit {
    pub fn weight(&self) -> u64 {
        self.weight
    }
}

impl WeightedSemaphore {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            state: Mutex::new(capacity),
            cvar: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn available(&self) -> u64 {
        *self.state.lock()
    }

    /// Block until `weight` bytes are free. Weights above capacity are clamped
    /// so a single oversized call still runs (alone) instead of deadlocking.
    pub fn acquire(self: &Arc<Self>, weight: u64) -> MemoryPermit {
        let mut available = self.state.lock();
        let need = weight.min(self.capacity);
        while *available < need {
            self.cvar.wait(&mut available);
        }
        *available -= need;
        MemoryPermit {
            sem: Arc::clone(self),
            weight: need,
        }
    }

    /// Non-blocking variant of `acquire`.
    pub fn try_acquire(self: &Arc<Self>, weight: u64) -> Option<MemoryPermit> {
        let mut available = self.state.lock();
        let need = weight.min(self.capacity);
        if *available < need {
            return None;
        }
        *available -= need;
        Some(MemoryPermit {
            sem: Arc::clone(self),
            weight: need,
        })
    }

    fn release(&self, weight: u64) {
        let mut available = self.state.lock();
        *available = (*available).saturating_add(weight).min(self.capacity);
        // waiters have different weights; wake all and let them re-contend
        self.cvar.notify_all();
    }
}

impl Drop for MemoryPermit {
    fn drop(&mut self) {
        self.sem.release(self.weight);
    }
}

/// Estimated peak bytes for resizing a `width` x `height` source decoded at
/// 1/`decode_shrink` scale. A stage holds its input and output at once, so the
/// decoded size counts twice.
pub fn estimate_call_bytes(width: u32, height: u32, decode_shrink: u32) -> u64 {
    let divisor = decode_shrink.max(1) as u64;
    let w = (width as u64).div_ceil(divisor);
    let h = (height as u64).div_ceil(divisor);
    w.saturating_mul(h)
        .saturating_mul(MAX_BANDS)
        .saturating_mul(2)
        .saturating_add(WORKING_OVERHEAD_BYTES)
        .max(MIN_ESTIMATE_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_weighted_semaphore_acquire_release() {
        let sem = Arc::new(WeightedSemaphore::new(100));
        let permit = sem.acquire(60);
        assert_eq!(sem.available(), 40);
        assert_eq!(permit.weight(), 60);
        drop(permit);
        assert_eq!(sem.available(), 100);
    }

    #[test]
    fn test_oversized_weight_is_clamped() {
        let sem = Arc::new(WeightedSemaphore::new(100));
        let permit = sem.acquire(10_000);
        assert_eq!(permit.weight(), 100);
        assert_eq!(sem.available(), 0);
        drop(permit);
        assert_eq!(sem.available(), 100);
    }

    #[test]
    fn test_try_acquire_fails_when_exhausted() {
        let sem = Arc::new(WeightedSemaphore::new(100));
        let held = sem.try_acquire(80).unwrap();
        assert!(sem.try_acquire(30).is_none());
        drop(held);
        assert!(sem.try_acquire(30).is_some());
    }

    #[test]
    fn test_weighted_semaphore_wakes_waiter_after_drop() {
        let sem = Arc::new(WeightedSemaphore::new(100));
        let (tx_started, rx_started) = std::sync::mpsc::channel();
        let (tx_done, rx_done) = std::sync::mpsc::channel();

        // Hold full capacity so the spawned thread must block.
        let permit = sem.acquire(100);

        let sem_wait = Arc::clone(&sem);
        let handle = thread::spawn(move || {
            tx_started.send(()).unwrap();
            let _permit = sem_wait.acquire(10);
            tx_done.send(()).unwrap();
        });

        rx_started
            .recv_timeout(Duration::from_secs(1))
            .expect("waiter should signal start");
        drop(permit);

        rx_done
            .recv_timeout(Duration::from_secs(1))
            .expect("waiter should acquire after release");
        handle.join().unwrap();
        assert_eq!(sem.available(), 100);
    }

    #[test]
    fn test_estimate_shrinks_with_decode_shrink() {
        let full = estimate_call_bytes(4000, 4000, 1);
        let eighth = estimate_call_bytes(4000, 4000, 8);
        assert!(full > eighth);
        assert_eq!(full, 4000 * 4000 * 4 * 2 + WORKING_OVERHEAD_BYTES);
    }

    #[test]
    fn test_estimate_has_floor() {
        assert!(estimate_call_bytes(1, 1, 1) >= MIN_ESTIMATE_BYTES);
        assert!(estimate_call_bytes(0, 0, 0) >= MIN_ESTIMATE_BYTES);
    }
}

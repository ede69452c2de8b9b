// src/engine/pool.rs
//
// Worker lanes for pixel primitives.
//
// **Architecture Decision**: every calling thread gets its own small rayon
// pool (a "lane") sized from `BackendConfig::concurrency`, instead of one
// pool shared by all callers or rayon's global pool. `concurrency` bounds
// the parallelism of a single operation; it must never cap how many callers
// make progress at once.
//
// - A lane is tagged with the runtime generation that built it
// - A lane from an older generation is rebuilt on next use
// - The lane dies with its calling thread

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::cell::RefCell;
use std::sync::Arc;

/// Minimum number of rayon threads to ensure at least some parallelism
pub const MIN_THREADS: usize = 1;

/// Upper bound on configured concurrency
pub const MAX_THREADS: usize = 1024;

struct Lane {
    generation: u64,
    pool: Arc<ThreadPool>,
}

thread_local! {
    static LANE: RefCell<Option<Lane>> = const { RefCell::new(None) };
}

/// Clamp a requested concurrency into the supported range.
pub fn effective_threads(requested: usize) -> usize {
    requested.clamp(MIN_THREADS, MAX_THREADS)
}

/// Build a pool, falling back to a single thread if the preferred size
/// cannot be spawned.
pub fn build_pool(concurrency: usize) -> Result<ThreadPool, rayon::ThreadPoolBuildError> {
    let threads = effective_threads(concurrency);
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("lazy-resize-{i}"))
        .build()
        .or_else(|err| {
            tracing::warn!(
                target: "lazy_resize::runtime",
                threads,
                error = %err,
                "falling back to a single worker thread"
            );
            ThreadPoolBuilder::new().num_threads(MIN_THREADS).build()
        })
}

/// The calling thread's lane for `generation`, building it if missing or stale.
fn lane(generation: u64, concurrency: usize) -> Option<Arc<ThreadPool>> {
    LANE.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(lane) = slot.as_ref().filter(|l| l.generation == generation) {
            return Some(Arc::clone(&lane.pool));
        }
        match build_pool(concurrency) {
            Ok(pool) => {
                let pool = Arc::new(pool);
                *slot = Some(Lane {
                    generation,
                    pool: Arc::clone(&pool),
                });
                Some(pool)
            }
            Err(err) => {
                tracing::warn!(target: "lazy_resize::runtime", error = %err, "no worker lane, running inline");
                *slot = None;
                None
            }
        }
    })
}

/// Run `f` on the calling thread's lane. Other callers' work never shares
/// these workers.
pub fn run_on_lane<T: Send>(generation: u64, concurrency: usize, f: impl FnOnce() -> T + Send) -> T {
    // the borrow is released before install so a re-entrant call cannot
    // observe it
    match lane(generation, concurrency) {
        Some(pool) => pool.install(f),
        None => f(),
    }
}

/// Run `f` once on every worker of the calling thread's lane, if it has one.
/// A lane from another generation is dropped instead.
pub fn broadcast_on_lane(generation: Option<u64>, f: impl Fn() + Sync) {
    let pool = LANE.with(|slot| {
        let mut slot = slot.borrow_mut();
        match slot.as_ref() {
            Some(lane) if Some(lane.generation) == generation => Some(Arc::clone(&lane.pool)),
            _ => {
                *slot = None;
                None
            }
        }
    });
    if let Some(pool) = pool {
        pool.broadcast(|_| f());
    }
}

#[cfg(test)]
pub(crate) fn lane_generation() -> Option<u64> {
    LANE.with(|slot| slot.borrow().as_ref().map(|l| l.generation))
}

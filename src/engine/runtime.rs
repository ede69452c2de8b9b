// src/engine/runtime.rs
//
// Process-wide runtime: lifecycle, startup configuration and the per-call scope.
//
// Lifecycle:
//   Uninitialized --init / first call--> Running --shutdown--> ShutDown --init--> Running
//
// A first call with no prior init starts the runtime from the environment.
// After an explicit shutdown nothing starts implicitly; every call fails with
// NotInitialized until init runs again.

use crate::engine::backend::ImageBackend;
use crate::engine::cache::{CacheStats, OperationCache};
use crate::engine::memory::{MemoryPermit, WeightedSemaphore, DEFAULT_MEMORY_BUDGET};
use crate::engine::pool;
use crate::engine::raster::Raster;
use crate::error::{LazyResizeError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Worker threads per operation
pub const DEFAULT_CONCURRENCY: usize = 1;
/// Decode cache byte ceiling (100MB)
pub const DEFAULT_CACHE_MAX_MEM: u64 = 100 * 1024 * 1024;
/// Decode cache entry ceiling
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 500;

pub const ENV_CONCURRENCY: &str = "LAZY_RESIZE_CONCURRENCY";
pub const ENV_CACHE_MAX_MEM: &str = "LAZY_RESIZE_CACHE_MAX_MEM";
pub const ENV_CACHE_MAX: &str = "LAZY_RESIZE_CACHE_MAX";
pub const ENV_MEMORY_BUDGET: &str = "LAZY_RESIZE_MEMORY_BUDGET";

/// Tuning fixed for the lifetime of one runtime generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendConfig {
    /// Worker threads a single primitive may use
    pub concurrency: usize,
    /// Decode cache ceiling in bytes
    pub cache_max_mem: u64,
    /// Decode cache ceiling in entries; 0 disables the cache
    pub cache_max_entries: usize,
    /// Admission budget in bytes across concurrent calls
    pub memory_budget: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            cache_max_mem: DEFAULT_CACHE_MAX_MEM,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            memory_budget: DEFAULT_MEMORY_BUDGET,
        }
    }
}

impl BackendConfig {
    /// Defaults overridden by `LAZY_RESIZE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    /// Unparsable values keep the default and log a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            concurrency: parse_var(&lookup, ENV_CONCURRENCY, defaults.concurrency),
            cache_max_mem: parse_var(&lookup, ENV_CACHE_MAX_MEM, defaults.cache_max_mem),
            cache_max_entries: parse_var(&lookup, ENV_CACHE_MAX, defaults.cache_max_entries),
            memory_budget: parse_var(&lookup, ENV_MEMORY_BUDGET, defaults.memory_budget),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_cache_max_mem(mut self, bytes: u64) -> Self {
        self.cache_max_mem = bytes;
        self
    }

    pub fn with_cache_max_entries(mut self, entries: usize) -> Self {
        self.cache_max_entries = entries;
        self
    }

    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = bytes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 || self.concurrency > pool::MAX_THREADS {
            return Err(LazyResizeError::invalid_argument(
                "concurrency",
                self.concurrency.to_string(),
                format!("Must be between 1 and {}", pool::MAX_THREADS),
            ));
        }
        if self.memory_budget == 0 {
            return Err(LazyResizeError::invalid_argument(
                "memory_budget",
                "0",
                "Must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr + Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> T {
    match lookup(name) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(target: "lazy_resize::runtime", var = name, value = %raw, "ignoring unparsable setting");
                default
            }
        },
    }
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Everything one runtime generation owns.
#[derive(Debug)]
pub struct RuntimeState {
    config: BackendConfig,
    generation: u64,
    admission: Arc<WeightedSemaphore>,
    cache: OperationCache<Raster>,
}

impl RuntimeState {
    fn start(config: BackendConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            admission: Arc::new(WeightedSemaphore::new(config.memory_budget)),
            cache: OperationCache::new(config.cache_max_mem, config.cache_max_entries),
            config,
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Distinguishes this runtime from earlier ones; worker lanes built
    /// for another generation are rebuilt.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Run `f` on the calling thread's worker lane.
    pub fn install<T: Send>(&self, f: impl FnOnce() -> T + Send) -> T {
        pool::run_on_lane(self.generation, self.config.concurrency, f)
    }

    pub fn admission(&self) -> &Arc<WeightedSemaphore> {
        &self.admission
    }

    pub fn cache(&self) -> &OperationCache<Raster> {
        &self.cache
    }
}

/// Point-in-time view of runtime resources.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeStats {
    pub config: BackendConfig,
    pub cache: CacheStats,
    pub admission_available: u64,
    pub admission_capacity: u64,
}

#[derive(Debug)]
enum Lifecycle {
    Uninitialized,
    Running(Arc<RuntimeState>),
    ShutDown,
}

/// Lifecycle state machine behind a single lock.
#[derive(Debug)]
pub struct RuntimeCell {
    state: Mutex<Lifecycle>,
}

impl Default for RuntimeCell {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeCell {
    pub const fn new() -> Self {
        Self {
            state: parking_lot::const_mutex(Lifecycle::Uninitialized),
        }
    }

    /// Start with `config`. Returns `Ok(false)` when already running; the
    /// running config is kept.
    pub fn init(&self, config: BackendConfig) -> Result<bool> {
        let mut state = self.state.lock();
        if matches!(*state, Lifecycle::Running(_)) {
            return Ok(false);
        }
        let started = RuntimeState::start(config)?;
        tracing::debug!(
            target: "lazy_resize::runtime",
            concurrency = started.config.concurrency,
            cache_max_mem = started.config.cache_max_mem,
            cache_max_entries = started.config.cache_max_entries,
            "runtime started"
        );
        *state = Lifecycle::Running(Arc::new(started));
        Ok(true)
    }

    /// Stop the runtime. Returns false when it was not running.
    /// Calls already in flight finish on the state they captured.
    pub fn shutdown(&self) -> bool {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, Lifecycle::ShutDown) {
            Lifecycle::Running(running) => {
                running.cache.clear();
                tracing::debug!(target: "lazy_resize::runtime", "runtime shut down");
                true
            }
            Lifecycle::Uninitialized => {
                // never started: stay startable on first use
                *state = Lifecycle::Uninitialized;
                false
            }
            Lifecycle::ShutDown => false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.state.lock(), Lifecycle::Running(_))
    }

    /// Running state, if any. Never starts the runtime.
    pub fn snapshot(&self) -> Option<Arc<RuntimeState>> {
        match &*self.state.lock() {
            Lifecycle::Running(running) => Some(Arc::clone(running)),
            _ => None,
        }
    }

    /// Running state, starting it from `config` on first use.
    pub fn acquire(&self, config: impl FnOnce() -> BackendConfig) -> Result<Arc<RuntimeState>> {
        let mut state = self.state.lock();
        match &*state {
            Lifecycle::Running(running) => Ok(Arc::clone(running)),
            Lifecycle::ShutDown => Err(LazyResizeError::not_initialized()),
            Lifecycle::Uninitialized => {
                let running = Arc::new(RuntimeState::start(config())?);
                tracing::debug!(target: "lazy_resize::runtime", "runtime started on first use");
                *state = Lifecycle::Running(Arc::clone(&running));
                Ok(running)
            }
        }
    }
}

static RUNTIME: RuntimeCell = RuntimeCell::new();

/// Start the process-wide runtime. Idempotent: returns `Ok(false)` if it is
/// already running.
pub fn init(config: BackendConfig) -> Result<bool> {
    RUNTIME.init(config)
}

/// Stop the process-wide runtime. Idempotent.
pub fn shutdown() -> bool {
    RUNTIME.shutdown()
}

pub fn is_initialized() -> bool {
    RUNTIME.is_initialized()
}

/// Running state without starting it.
pub fn snapshot() -> Option<Arc<RuntimeState>> {
    RUNTIME.snapshot()
}

/// Resource usage of the running runtime.
pub fn stats() -> Option<RuntimeStats> {
    RUNTIME.snapshot().map(|state| RuntimeStats {
        config: state.config.clone(),
        cache: state.cache.stats(),
        admission_available: state.admission.available(),
        admission_capacity: state.admission.capacity(),
    })
}

/// Scope of one public call.
///
/// Holds the runtime generation the call runs against and the call's memory
/// reservation. Dropping it, on success or error, releases the reservation
/// and the backend's per-thread state.
pub struct CallScope<'b, B: ImageBackend + ?Sized> {
    state: Arc<RuntimeState>,
    permit: Option<MemoryPermit>,
    backend: &'b B,
}

impl<'b, B: ImageBackend + ?Sized> CallScope<'b, B> {
    /// Enter the process-wide runtime.
    pub fn enter(backend: &'b B) -> Result<Self> {
        Self::enter_in(&RUNTIME, backend)
    }

    /// Enter a specific runtime cell.
    pub fn enter_in(cell: &RuntimeCell, backend: &'b B) -> Result<Self> {
        let state = cell.acquire(BackendConfig::from_env)?;
        Ok(Self {
            state,
            permit: None,
            backend,
        })
    }

    pub fn state(&self) -> &Arc<RuntimeState> {
        &self.state
    }

    pub fn backend(&self) -> &'b B {
        self.backend
    }

    /// Reserve `bytes` of the admission budget for the rest of the call,
    /// waiting if other calls hold it. Replaces any earlier reservation.
    pub fn reserve(&mut self, bytes: u64) {
        self.permit.take();
        self.permit = Some(self.state.admission.acquire(bytes));
    }

    pub fn reserved(&self) -> u64 {
        self.permit.as_ref().map_or(0, MemoryPermit::weight)
    }
}

impl<B: ImageBackend + ?Sized> Drop for CallScope<'_, B> {
    fn drop(&mut self) {
        self.permit.take();
        self.backend.release_thread_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    mod config_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = BackendConfig::default();
            assert_eq!(config.concurrency, 1);
            assert_eq!(config.cache_max_mem, 100 * 1048576);
            assert_eq!(config.cache_max_entries, 500);
        }

        #[test]
        fn test_lookup_overrides() {
            let vars: HashMap<&str, &str> = [
                (ENV_CONCURRENCY, "4"),
                (ENV_CACHE_MAX_MEM, "1024"),
                (ENV_CACHE_MAX, " 7 "),
            ]
            .into_iter()
            .collect();
            let config = BackendConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
            assert_eq!(config.concurrency, 4);
            assert_eq!(config.cache_max_mem, 1024);
            assert_eq!(config.cache_max_entries, 7);
            assert_eq!(config.memory_budget, DEFAULT_MEMORY_BUDGET);
        }

        #[test]
        fn test_unparsable_keeps_default() {
            let config = BackendConfig::from_lookup(|name| {
                (name == ENV_CONCURRENCY).then(|| "lots".to_string())
            });
            assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        }

        #[test]
        fn test_validate() {
            assert!(BackendConfig::default().validate().is_ok());
            assert!(BackendConfig::default().with_concurrency(0).validate().is_err());
            assert!(BackendConfig::default().with_memory_budget(0).validate().is_err());
            assert!(BackendConfig::default().with_cache_max_entries(0).validate().is_ok());
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn test_init_is_idempotent() {
            let cell = RuntimeCell::new();
            assert!(cell.init(BackendConfig::default()).unwrap());
            assert!(!cell.init(BackendConfig::default().with_concurrency(2)).unwrap());
            let state = cell.snapshot().unwrap();
            assert_eq!(state.config().concurrency, 1);
        }

        #[test]
        fn test_shutdown_is_idempotent() {
            let cell = RuntimeCell::new();
            assert!(!cell.shutdown());
            cell.init(BackendConfig::default()).unwrap();
            assert!(cell.shutdown());
            assert!(!cell.shutdown());
            assert!(!cell.is_initialized());
        }

        #[test]
        fn test_first_use_starts_runtime() {
            let cell = RuntimeCell::new();
            assert!(cell.snapshot().is_none());
            let state = cell.acquire(|| BackendConfig::default().with_cache_max_entries(3)).unwrap();
            assert_eq!(state.cache().max_entries(), 3);
            assert!(cell.is_initialized());
        }

        #[test]
        fn test_shutdown_before_start_keeps_lazy_start() {
            let cell = RuntimeCell::new();
            cell.shutdown();
            assert!(cell.acquire(BackendConfig::default).is_ok());
        }

        #[test]
        fn test_use_after_shutdown_is_not_initialized() {
            let cell = RuntimeCell::new();
            cell.init(BackendConfig::default()).unwrap();
            cell.shutdown();
            let err = cell.acquire(BackendConfig::default).unwrap_err();
            assert!(matches!(err, LazyResizeError::NotInitialized));

            // explicit init restores service
            assert!(cell.init(BackendConfig::default()).unwrap());
            assert!(cell.acquire(BackendConfig::default).is_ok());
        }

        #[test]
        fn test_invalid_config_leaves_runtime_stopped() {
            let cell = RuntimeCell::new();
            assert!(cell.init(BackendConfig::default().with_concurrency(0)).is_err());
            assert!(!cell.is_initialized());
        }
    }
}

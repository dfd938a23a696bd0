use crate::error::ConfigError;
use std::sync::atomic::{AtomicUsize, Ordering};

// PARALLEL_THRESHOLD, calibrated by build.rs for the build machine.
include!(concat!(env!("OUT_DIR"), "/tuned_constants.rs"));

// Default split granularity for rayon work over reference particles.
const DEFAULT_TASKS_PER_THREAD: usize = 64;

static PARALLEL_THRESHOLD_VALUE: AtomicUsize = AtomicUsize::new(PARALLEL_THRESHOLD);
static TASKS_PER_THREAD: AtomicUsize = AtomicUsize::new(DEFAULT_TASKS_PER_THREAD);

/// Particle count below which per-particle loops run on the calling thread.
pub fn get_parallel_threshold() -> usize {
    PARALLEL_THRESHOLD_VALUE.load(Ordering::Relaxed)
}

pub fn set_parallel_threshold(val: usize) {
    PARALLEL_THRESHOLD_VALUE.store(val, Ordering::Relaxed);
}

pub fn get_tasks_per_thread() -> usize {
    TASKS_PER_THREAD.load(Ordering::Relaxed)
}

pub fn set_tasks_per_thread(val: usize) {
    TASKS_PER_THREAD.store(val.max(1), Ordering::Relaxed);
}

/// Minimum number of consecutive reference particles handed to one rayon task.
pub(crate) fn min_chunk_len(n_items: usize) -> usize {
    let num_threads = rayon::current_num_threads();
    (n_items / (num_threads * get_tasks_per_thread())).max(1)
}

pub fn get_num_threads() -> usize {
    rayon::current_num_threads()
}

/// Sizes the global worker pool. Returns whether the size took effect.
///
/// The global pool can only be built once; later calls leave it unchanged.
/// Use [`with_num_threads`] to run work on a different thread count.
pub fn set_num_threads(n: usize) -> bool {
    match rayon::ThreadPoolBuilder::new().num_threads(n).build_global() {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(requested = n, %err, "global thread pool already initialized");
            false
        }
    }
}

/// Runs `op` on a dedicated pool of `n` workers.
///
/// Every parallel loop started inside `op` uses that pool. The global pool
/// is untouched and applies again once `op` returns.
pub fn with_num_threads<R, F>(n: usize, op: F) -> Result<R, ConfigError>
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .build()
        .map_err(|err| ConfigError::ThreadPool(err.to_string()))?;
    Ok(pool.install(op))
}

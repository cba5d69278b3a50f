use crate::error::PoolError;
use crate::handle::CompletionHandle;
use crate::task::{self, ManagedTaskInternal, Task};

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use futures::FutureExt;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

const SHARED_POOL_NAME: &str = "shared-pool";

lazy_static::lazy_static! {
  static ref SHARED_POOL: Result<SharedPool, PoolError> = SharedPool::build();
}

/// The process-wide default pool.
///
/// Built on first use and sized by the machine's available parallelism. Its lifecycle is
/// owned by the process: nothing in this crate shuts it down, and callers only submit to it.
pub struct SharedPool {
  runtime: Runtime,
  worker_threads: usize,
  threads_started: Arc<AtomicUsize>,
  threads_stopped: Arc<AtomicUsize>,
}

impl SharedPool {
  /// Returns the shared pool, building it on first call.
  ///
  /// # Errors
  /// Returns `PoolError::ThreadSpawn` if the pool could not be built. The failure is cached.
  pub fn global() -> Result<&'static SharedPool, PoolError> {
    SHARED_POOL.as_ref().map_err(Clone::clone)
  }

  fn build() -> Result<Self, PoolError> {
    let worker_threads = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let next_ordinal = Arc::new(AtomicUsize::new(1));
    let threads_started = Arc::new(AtomicUsize::new(0));
    let threads_stopped = Arc::new(AtomicUsize::new(0));

    let started = threads_started.clone();
    let stopped = threads_stopped.clone();
    let runtime = Builder::new_multi_thread()
      .worker_threads(worker_threads)
      .thread_name_fn(move || format!("{}-worker-{}", SHARED_POOL_NAME, next_ordinal.fetch_add(1, Ordering::Relaxed)))
      .on_thread_start(move || {
        started.fetch_add(1, Ordering::SeqCst);
      })
      .on_thread_stop(move || {
        stopped.fetch_add(1, Ordering::SeqCst);
      })
      .build()
      .map_err(|build_error| {
        error!(pool_name = SHARED_POOL_NAME, "Failed to build shared pool: {}", build_error);
        PoolError::ThreadSpawn(build_error.to_string())
      })?;

    info!(pool_name = SHARED_POOL_NAME, worker_threads, "Shared pool started.");
    Ok(Self {
      runtime,
      worker_threads,
      threads_started,
      threads_stopped,
    })
  }

  pub fn name(&self) -> &str {
    SHARED_POOL_NAME
  }

  /// Number of worker threads the pool was sized with.
  pub fn worker_threads(&self) -> usize {
    self.worker_threads
  }

  /// Total threads the pool has ever started.
  pub fn threads_started(&self) -> usize {
    self.threads_started.load(Ordering::SeqCst)
  }

  /// Threads currently running.
  pub fn threads_alive(&self) -> usize {
    // The two counters are read separately, so a thread may stop between the loads.
    self.threads_started().saturating_sub(self.threads_stopped.load(Ordering::SeqCst))
  }

  /// Runs `job` on one of the shared workers.
  pub fn submit(&self, job: Task) -> CompletionHandle {
    let (managed_task, handle) = ManagedTaskInternal::new(job);
    let ManagedTaskInternal {
      task_id,
      job,
      token,
      result_sender,
    } = managed_task;

    debug!(pool_name = SHARED_POOL_NAME, %task_id, "Submitting task.");

    self.runtime.spawn(
      async move {
        let execution_outcome = if token.is_cancelled() {
          debug!(pool_name = SHARED_POOL_NAME, %task_id, "Task cancelled before it started.");
          Err(PoolError::TaskCancelled)
        } else {
          match AssertUnwindSafe(async { task::run_with_token(&token, job) }).catch_unwind().await {
            Ok(()) => {
              trace!(pool_name = SHARED_POOL_NAME, %task_id, "Task executed successfully.");
              Ok(())
            }
            Err(_panic_payload) => {
              error!(pool_name = SHARED_POOL_NAME, %task_id, "Task panicked during execution.");
              Err(PoolError::TaskPanicked)
            }
          }
        };

        if let Some(tx_result) = result_sender {
          if tx_result.send(execution_outcome).is_err() {
            warn!(pool_name = SHARED_POOL_NAME, %task_id, "Result receiver for task was dropped.");
          }
        }
      }
      .instrument(info_span!("shared_task", pool_name = SHARED_POOL_NAME, %task_id)),
    );

    handle
  }
}

impl std::fmt::Debug for SharedPool {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SharedPool")
      .field("worker_threads", &self.worker_threads)
      .field("threads_alive", &self.threads_alive())
      .finish_non_exhaustive()
  }
}

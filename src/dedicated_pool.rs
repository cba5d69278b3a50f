use crate::error::{PoolError, WaitError};
use crate::handle::CompletionHandle;
use crate::interrupt;
use crate::shutdown::Terminate;
use crate::task::{self, ManagedTaskInternal, Task};
use crate::thread_factory::ThreadFactory;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn};

/// How often an interruptible wait re-checks the caller's interrupt flag.
const INTERRUPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Tracks live worker threads so owners can block until all of them have exited.
#[derive(Debug, Default)]
struct Termination {
  live_workers: Mutex<usize>,
  all_exited: Condvar,
}

/// Decrements the live worker count when a worker thread leaves its loop, even by panic.
struct WorkerExitGuard {
  pool_name: Arc<String>,
  termination: Arc<Termination>,
}

impl Drop for WorkerExitGuard {
  fn drop(&mut self) {
    let mut live = self.termination.live_workers.lock();
    *live = live.saturating_sub(1);
    debug!(pool_name = %*self.pool_name, remaining = *live, "Worker thread exiting.");
    if *live == 0 {
      self.termination.all_exited.notify_all();
    }
  }
}

/// A fixed-size pool of named OS threads with an explicit drain-then-cancel lifecycle.
///
/// Queued tasks run in FIFO order on whichever worker is free. `shutdown` stops accepting
/// submissions but lets queued and running tasks finish; `shutdown_now` additionally
/// discards everything still queued and signals running tasks to stop.
pub struct DedicatedPool {
  pool_name: Arc<String>,
  task_queue_tx: Mutex<Option<flume::Sender<ManagedTaskInternal>>>,
  task_queue_rx: flume::Receiver<ManagedTaskInternal>,
  active_task_info: Arc<DashMap<u64, CancellationToken>>,
  shutdown_token: CancellationToken,
  stop_token: CancellationToken,
  termination: Arc<Termination>,
  worker_names: Vec<String>,
  worker_join_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DedicatedPool {
  /// Starts `worker_count` threads obtained from `thread_factory`.
  ///
  /// The factory is consumed here; nothing else can create threads for this pool later.
  ///
  /// # Errors
  /// Returns `PoolError::NoWorkers` if `worker_count` is zero, and `PoolError::ThreadSpawn` if
  /// any worker fails to start. Workers that did start are told to exit before returning.
  pub fn new<F: ThreadFactory>(pool_name: &str, worker_count: usize, mut thread_factory: F) -> Result<Self, PoolError> {
    if worker_count == 0 {
      error!(pool_name, "Refusing to build a pool with zero workers.");
      return Err(PoolError::NoWorkers);
    }

    let (tx, rx) = flume::unbounded::<ManagedTaskInternal>();
    let pool_name = Arc::new(pool_name.to_string());
    let active_task_info = Arc::new(DashMap::new());
    let stop_token = CancellationToken::new();
    let termination = Arc::new(Termination::default());

    let mut worker_names = Vec::with_capacity(worker_count);
    let mut worker_join_handles = Vec::with_capacity(worker_count);

    for _ in 0..worker_count {
      *termination.live_workers.lock() += 1;

      let worker_pool_name = pool_name.clone();
      let worker_rx = rx.clone();
      let worker_active_task_info = active_task_info.clone();
      let worker_stop_token = stop_token.clone();
      let exit_guard = WorkerExitGuard {
        pool_name: pool_name.clone(),
        termination: termination.clone(),
      };

      let spawned = thread_factory.new_thread(Box::new(move || {
        let _exit_guard = exit_guard;
        Self::run_worker_loop(worker_pool_name, worker_rx, worker_active_task_info, worker_stop_token);
      }));

      match spawned {
        Ok(handle) => {
          let name = handle.thread().name().unwrap_or("<unnamed>").to_string();
          debug!(pool_name = %*pool_name, thread = %name, "Worker thread started.");
          worker_names.push(name);
          worker_join_handles.push(handle);
        }
        Err(spawn_error) => {
          // The closure (and its exit guard) was dropped with the failed spawn, which already
          // gave back this worker's slot in the live count.
          error!(pool_name = %*pool_name, "Failed to spawn worker thread: {}", spawn_error);
          drop(tx);
          for handle in worker_join_handles {
            let _ = handle.join();
          }
          return Err(PoolError::ThreadSpawn(spawn_error.to_string()));
        }
      }
    }

    info!(pool_name = %*pool_name, workers = ?worker_names, "Dedicated pool started.");

    Ok(Self {
      pool_name,
      task_queue_tx: Mutex::new(Some(tx)),
      task_queue_rx: rx,
      active_task_info,
      shutdown_token: CancellationToken::new(),
      stop_token,
      termination,
      worker_names,
      worker_join_handles: Mutex::new(worker_join_handles),
    })
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  /// Names of the worker threads, in creation order.
  pub fn worker_names(&self) -> &[String] {
    &self.worker_names
  }

  pub fn active_task_count(&self) -> usize {
    self.active_task_info.len()
  }

  /// Returns the current number of tasks in the pending queue.
  pub fn queued_task_count(&self) -> usize {
    self.task_queue_rx.len()
  }

  pub fn live_worker_count(&self) -> usize {
    *self.termination.live_workers.lock()
  }

  /// `true` once `shutdown` or `shutdown_now` has been called.
  pub fn is_shutdown(&self) -> bool {
    self.shutdown_token.is_cancelled()
  }

  /// `true` once shutdown was requested and every worker thread has exited.
  pub fn is_terminated(&self) -> bool {
    self.is_shutdown() && self.live_worker_count() == 0
  }

  /// Queues `job` for execution on one of the workers.
  ///
  /// # Errors
  /// Returns `PoolError::PoolShuttingDown` once shutdown has been requested.
  pub fn submit(&self, job: Task) -> Result<CompletionHandle, PoolError> {
    if self.shutdown_token.is_cancelled() {
      warn!(pool_name = %self.pool_name, "Submit: Attempted to submit task to a pool that is shutting down or closed.");
      return Err(PoolError::PoolShuttingDown);
    }

    let (managed_task_internal, handle) = ManagedTaskInternal::new(job);
    let task_id = managed_task_internal.task_id;

    let guard = self.task_queue_tx.lock();
    let Some(tx) = guard.as_ref() else {
      return Err(PoolError::PoolShuttingDown);
    };

    debug!(pool_name = %self.pool_name, %task_id, "Submitting task to queue.");
    match tx.send(managed_task_internal) {
      Ok(()) => Ok(handle),
      Err(send_error) => {
        // Every worker is gone; only possible after all of them panicked outside a task.
        error!(pool_name = %self.pool_name, %task_id, "Submit: Failed to send task to queue: {}", send_error);
        Err(PoolError::PoolShuttingDown)
      }
    }
  }

  /// Stops accepting new tasks. Queued and running tasks are left to finish.
  pub fn shutdown(&self) {
    if self.shutdown_token.is_cancelled() {
      info!(pool_name = %self.pool_name, "Shutdown already in progress.");
      return;
    }
    info!(pool_name = %self.pool_name, "Initiating pool shutdown: no new tasks accepted, draining queue.");
    self.shutdown_token.cancel();
    // Dropping the only sender lets workers see a disconnected queue once it is empty.
    drop(self.task_queue_tx.lock().take());
  }

  /// Stops accepting new tasks, discards queued ones and signals running ones to stop.
  ///
  /// Running tasks only stop if they poll [`crate::is_cancellation_requested`]. Handles of
  /// discarded tasks resolve to `PoolError::TaskCancelled`. Returns the number discarded.
  pub fn shutdown_now(&self) -> usize {
    self.shutdown();
    info!(pool_name = %self.pool_name, "Forceful shutdown: cancelling all active tasks.");
    self.stop_token.cancel();

    let mut discarded = 0;
    for mut queued in self.task_queue_rx.drain() {
      debug!(pool_name = %self.pool_name, task_id = queued.task_id, "Discarding queued task.");
      queued.token.cancel();
      queued.complete(Err(PoolError::TaskCancelled));
      discarded += 1;
    }

    let tasks_to_cancel: Vec<(u64, CancellationToken)> = self
      .active_task_info
      .iter()
      .map(|entry| (*entry.key(), entry.value().clone()))
      .collect();

    if tasks_to_cancel.is_empty() {
      info!(pool_name = %self.pool_name, "No active tasks to cancel forcefully.");
    } else {
      for (task_id, token) in tasks_to_cancel {
        debug!(pool_name = %self.pool_name, %task_id, "Forcefully cancelling active task during shutdown.");
        token.cancel();
      }
    }
    discarded
  }

  /// Blocks until every worker has exited, `timeout` elapses, or the calling thread is
  /// interrupted.
  ///
  /// Returns `Ok(true)` when terminated and `Ok(false)` on timeout. A raised interrupt flag is
  /// consumed and reported as `WaitError::Interrupted`. An already terminated pool returns
  /// `Ok(true)` without looking at the flag.
  pub fn await_termination(&self, timeout: Duration) -> Result<bool, WaitError> {
    let _span = info_span!("await_termination", pool_name = %*self.pool_name).entered();
    let deadline = Instant::now() + timeout;
    let interrupt_flag = interrupt::current();

    {
      let mut live = self.termination.live_workers.lock();
      loop {
        if *live == 0 && self.shutdown_token.is_cancelled() {
          break;
        }
        if interrupt_flag.take() {
          warn!(pool_name = %self.pool_name, "Interrupted while awaiting termination.");
          return Err(WaitError::Interrupted);
        }
        let now = Instant::now();
        if now >= deadline {
          debug!(pool_name = %self.pool_name, live_workers = *live, "Timed out awaiting termination.");
          return Ok(false);
        }
        let slice = (deadline - now).min(INTERRUPT_POLL_INTERVAL);
        self.termination.all_exited.wait_for(&mut live, slice);
      }
    }

    let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.worker_join_handles.lock());
    for handle in handles {
      if handle.join().is_err() {
        error!(pool_name = %self.pool_name, "Worker thread panicked outside of a task.");
      }
    }
    trace!(pool_name = %self.pool_name, "All worker threads joined.");
    Ok(true)
  }

  fn run_worker_loop(
    pool_name: Arc<String>,
    task_queue_rx: flume::Receiver<ManagedTaskInternal>,
    active_task_info_map: Arc<DashMap<u64, CancellationToken>>,
    stop_token: CancellationToken,
  ) {
    let thread_name = thread::current().name().unwrap_or("<unnamed>").to_string();
    let _span = info_span!("dedicated_pool_worker", name = %*pool_name, thread = %thread_name).entered();
    info!(name = %*pool_name, "Worker loop started.");

    // recv() only fails once the queue is empty and the pool has dropped its sender.
    while let Ok(mut managed_task) = task_queue_rx.recv() {
      let task_id = managed_task.task_id;
      // Register before checking the stop signal: `shutdown_now` cancels `stop_token` before it
      // scans the map, so either this check sees the stop or the scan sees this entry.
      active_task_info_map.insert(task_id, managed_task.token.clone());

      if stop_token.is_cancelled() || managed_task.token.is_cancelled() {
        active_task_info_map.remove(&task_id);
        debug!(name = %*pool_name, %task_id, "Dequeued task already cancelled.");
        managed_task.complete(Err(PoolError::TaskCancelled));
        continue;
      }

      let ManagedTaskInternal {
        job,
        token,
        result_sender,
        ..
      } = managed_task;

      debug!(name = %*pool_name, %task_id, "Dequeued task. Running.");

      let execution_outcome = match panic::catch_unwind(AssertUnwindSafe(|| task::run_with_token(&token, job))) {
        Ok(()) => {
          trace!(name = %*pool_name, %task_id, "Task executed successfully.");
          Ok(())
        }
        Err(_panic_payload) => {
          error!(name = %*pool_name, %task_id, "Task panicked during execution.");
          Err(PoolError::TaskPanicked)
        }
      };

      active_task_info_map.remove(&task_id);

      if let Some(tx_result) = result_sender {
        if tx_result.send(execution_outcome).is_err() {
          warn!(name = %*pool_name, %task_id, "Result receiver for task was dropped. Task outcome may have been lost.");
        }
      }
    }

    info!(name = %*pool_name, "Worker loop stopped.");
  }
}

impl Terminate for DedicatedPool {
  fn name(&self) -> &str {
    DedicatedPool::name(self)
  }

  fn shutdown(&self) {
    DedicatedPool::shutdown(self)
  }

  fn shutdown_now(&self) -> usize {
    DedicatedPool::shutdown_now(self)
  }

  fn await_termination(&self, timeout: Duration) -> Result<bool, WaitError> {
    DedicatedPool::await_termination(self, timeout)
  }
}

impl std::fmt::Debug for DedicatedPool {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DedicatedPool")
      .field("pool_name", &self.pool_name)
      .field("worker_names", &self.worker_names)
      .field("active_tasks", &self.active_task_count())
      .field("queued_tasks", &self.queued_task_count())
      .field("shutdown", &self.is_shutdown())
      .finish_non_exhaustive()
  }
}

impl Drop for DedicatedPool {
  fn drop(&mut self) {
    if !self.shutdown_token.is_cancelled() {
      // Workers are signalled but not joined; they exit once the queue is drained.
      info!(
        pool_name = %*self.pool_name,
        "DedicatedPool dropped without shutdown. Initiating implicit shutdown."
      );
      self.shutdown();
    } else {
      trace!(pool_name = %*self.pool_name, "Drop: Shutdown already in progress or completed.");
    }
  }
}

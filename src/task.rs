use crate::error::PoolError;
use crate::handle::CompletionHandle;

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

lazy_static::lazy_static! {
  static ref NEXT_POOL_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Allocates a process-wide unique task id.
pub(crate) fn next_task_id() -> u64 {
  NEXT_POOL_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed)
}

/// A unit of work the pools execute: no arguments, no return value.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Internal representation of a task waiting for, or running on, a worker.
pub(crate) struct ManagedTaskInternal {
  pub(crate) task_id: u64,
  pub(crate) job: Task,
  pub(crate) token: CancellationToken,
  pub(crate) result_sender: Option<oneshot::Sender<Result<(), PoolError>>>, // Option to allow taking
}

impl ManagedTaskInternal {
  /// Wraps `job` for submission and returns the matching completion handle.
  pub(crate) fn new(job: Task) -> (Self, CompletionHandle) {
    let task_id = next_task_id();
    let token = CancellationToken::new();
    let (result_tx, result_rx) = oneshot::channel::<Result<(), PoolError>>();
    let handle = CompletionHandle::new(task_id, token.clone(), result_rx);
    let internal = Self {
      task_id,
      job,
      token,
      result_sender: Some(result_tx),
    };
    (internal, handle)
  }

  /// Reports the outcome to the completion handle, if anyone is still listening.
  pub(crate) fn complete(&mut self, outcome: Result<(), PoolError>) -> bool {
    match self.result_sender.take() {
      Some(tx) => tx.send(outcome).is_ok(),
      None => false,
    }
  }
}

thread_local! {
  static CURRENT_TASK_TOKEN: RefCell<Option<CancellationToken>> = const { RefCell::new(None) };
}

/// Returns `true` if the task running on the current worker thread has been asked to stop.
///
/// Long-running tasks should poll this to honour a forceful shutdown. Outside a pool task
/// it always returns `false`.
pub fn is_cancellation_requested() -> bool {
  CURRENT_TASK_TOKEN.with(|slot| slot.borrow().as_ref().is_some_and(CancellationToken::is_cancelled))
}

/// Runs `job` with `token` installed as the current task's cancellation token.
pub(crate) fn run_with_token<F: FnOnce()>(token: &CancellationToken, job: F) {
  struct Reset;
  impl Drop for Reset {
    fn drop(&mut self) {
      CURRENT_TASK_TOKEN.with(|slot| slot.borrow_mut().take());
    }
  }

  CURRENT_TASK_TOKEN.with(|slot| *slot.borrow_mut() = Some(token.clone()));
  let _reset = Reset;
  job();
}

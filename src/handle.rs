use crate::error::PoolError;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing;

/// A handle to a task submitted to a [`SharedPool`](crate::SharedPool) or
/// [`DedicatedPool`](crate::DedicatedPool).
///
/// Completion is reported exactly once; both `join` and `await_result` consume the handle.
#[derive(Debug)]
pub struct CompletionHandle {
  pub(crate) task_id: u64,
  pub(crate) cancellation_token: CancellationToken,
  pub(crate) result_receiver: Option<oneshot::Receiver<Result<(), PoolError>>>,
}

impl CompletionHandle {
  pub(crate) fn new(
    task_id: u64,
    cancellation_token: CancellationToken,
    result_receiver: oneshot::Receiver<Result<(), PoolError>>,
  ) -> Self {
    Self {
      task_id,
      cancellation_token,
      result_receiver: Some(result_receiver),
    }
  }

  /// Returns the unique ID of this task.
  pub fn id(&self) -> u64 {
    self.task_id
  }

  /// Checks if cancellation has been requested for this task via its token.
  pub fn is_cancellation_requested(&self) -> bool {
    self.cancellation_token.is_cancelled()
  }

  /// Requests cancellation of this specific task.
  ///
  /// A task that has not started yet is skipped by the worker. A running task only
  /// stops if it cooperatively checks [`crate::is_cancellation_requested`].
  pub fn cancel(&self) {
    tracing::debug!(task_id = %self.task_id, "CompletionHandle: Cancellation requested.");
    self.cancellation_token.cancel();
  }

  /// Blocks the calling thread until the task has finished.
  ///
  /// Must not be called from inside an async runtime; use [`Self::await_result`] there.
  ///
  /// # Errors
  /// Returns `PoolError::TaskPanicked` if the task panicked,
  /// `PoolError::TaskCancelled` if it was discarded before running, and
  /// `PoolError::ResultChannelError` if the worker dropped the channel without reporting.
  pub fn join(mut self) -> Result<(), PoolError> {
    match self.result_receiver.take() {
      Some(rx) => rx.blocking_recv().unwrap_or_else(|recv_error| Err(self.channel_error(recv_error))),
      None => Err(PoolError::ResultUnavailable),
    }
  }

  /// Awaits the completion of the task.
  ///
  /// # Errors
  /// Same as [`Self::join`].
  pub async fn await_result(mut self) -> Result<(), PoolError> {
    match self.result_receiver.take() {
      Some(rx) => match rx.await {
        Ok(task_outcome) => task_outcome,
        Err(recv_error) => Err(self.channel_error(recv_error)),
      },
      None => Err(PoolError::ResultUnavailable),
    }
  }

  fn channel_error(&self, recv_error: oneshot::error::RecvError) -> PoolError {
    // The sender side was dropped without sending, e.g. the pool went away mid-task.
    tracing::warn!(task_id = %self.task_id, "Result channel receive error: {}", recv_error);
    PoolError::ResultChannelError(format!(
      "Task (id: {}) result channel unexpectedly closed: {}",
      self.task_id, recv_error
    ))
  }
}

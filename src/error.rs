use thiserror::Error;

/// Errors that can occur while submitting to or waiting on a worker pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("A pool needs at least one worker thread")]
  NoWorkers,

  #[error("Failed to spawn worker thread: {0}")]
  ThreadSpawn(String),

  #[error("Task completion channel error (worker dropped the sender before reporting): {0}")]
  ResultChannelError(String),

  #[error("Task result already taken or channel was not available")]
  ResultUnavailable,

  #[error("Submitted task panicked")]
  TaskPanicked,

  #[error("Task was cancelled before it could run")]
  TaskCancelled,

  #[error("Pool is shutting down or already shut down, cannot accept new tasks")]
  PoolShuttingDown,
}

/// Reasons an interruptible blocking wait returned without reaching its goal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
  #[error("Waiting thread was interrupted")]
  Interrupted,
}

//! Drain-then-cancel shutdown for pools whose lifecycle the caller owns.

use crate::error::WaitError;
use crate::interrupt;

use std::fmt;
use std::time::Duration;

use tracing::{debug, error, info, warn};

/// Default bound for each of the two termination waits.
pub const DEFAULT_TERMINATION_TIMEOUT: Duration = Duration::from_secs(30);

/// The lifecycle operations the shutdown protocol needs from a pool.
pub trait Terminate {
  fn name(&self) -> &str;

  /// Stop accepting new work; let queued and running work finish.
  fn shutdown(&self);

  /// Stop accepting new work, discard queued work and signal running work to stop.
  /// Returns the number of queued tasks discarded.
  fn shutdown_now(&self) -> usize;

  /// Block up to `timeout` for every worker to exit. `Ok(false)` means the time ran out.
  fn await_termination(&self, timeout: Duration) -> Result<bool, WaitError>;
}

/// Where a pool is in its shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownState {
  Running,
  DrainRequested,
  CancelRequested,
  Terminated,
  TimedOutAfterCancel,
}

impl ShutdownState {
  /// Whether `next` is a legal successor of `self`.
  pub fn can_transition_to(self, next: ShutdownState) -> bool {
    use ShutdownState::*;
    matches!(
      (self, next),
      (Running, DrainRequested)
        | (DrainRequested, Terminated)
        | (DrainRequested, CancelRequested)
        | (CancelRequested, Terminated)
        | (CancelRequested, TimedOutAfterCancel)
    )
  }

  /// `true` for states no further transition leaves.
  pub fn is_final(self) -> bool {
    matches!(self, ShutdownState::Terminated | ShutdownState::TimedOutAfterCancel)
  }
}

impl fmt::Display for ShutdownState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      ShutdownState::Running => "running",
      ShutdownState::DrainRequested => "drain requested",
      ShutdownState::CancelRequested => "cancel requested",
      ShutdownState::Terminated => "terminated",
      ShutdownState::TimedOutAfterCancel => "timed out after cancel",
    };
    f.write_str(label)
  }
}

/// Bounds for the two waits of the shutdown protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownConfig {
  pub drain_timeout: Duration,
  pub cancel_timeout: Duration,
}

impl Default for ShutdownConfig {
  fn default() -> Self {
    Self {
      drain_timeout: DEFAULT_TERMINATION_TIMEOUT,
      cancel_timeout: DEFAULT_TERMINATION_TIMEOUT,
    }
  }
}

/// Non-fatal conditions noticed during shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownDiagnostic {
  /// Workers were still alive after the cancel wait expired.
  DidNotTerminate { pool_name: String, waited: Duration },
}

impl fmt::Display for ShutdownDiagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ShutdownDiagnostic::DidNotTerminate { pool_name, waited } => {
        write!(f, "Pool '{}' did not terminate ({:?} after cancel)", pool_name, waited)
      }
    }
  }
}

/// What [`graceful_shutdown`] did and where it left the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
  pub pool_name: String,
  pub state: ShutdownState,
  /// How many times `shutdown_now` was issued. Never more than one.
  pub cancel_requests: usize,
  /// Queued tasks dropped by `shutdown_now`.
  pub discarded_tasks: usize,
  /// The waiting thread was interrupted; its interrupt flag has been raised again.
  pub interrupted: bool,
  pub diagnostics: Vec<ShutdownDiagnostic>,
}

impl ShutdownReport {
  fn new(pool_name: &str) -> Self {
    Self {
      pool_name: pool_name.to_string(),
      state: ShutdownState::Running,
      cancel_requests: 0,
      discarded_tasks: 0,
      interrupted: false,
      diagnostics: Vec::new(),
    }
  }

  fn advance(&mut self, next: ShutdownState) {
    debug_assert!(
      self.state.can_transition_to(next),
      "illegal shutdown transition {:?} -> {:?}",
      self.state,
      next
    );
    debug!(pool_name = %self.pool_name, from = %self.state, to = %next, "Shutdown state transition.");
    self.state = next;
  }

  fn request_cancel<P: Terminate + ?Sized>(&mut self, pool: &P) {
    self.advance(ShutdownState::CancelRequested);
    self.discarded_tasks += pool.shutdown_now();
    self.cancel_requests += 1;
  }

  /// `true` when the pool is known to have fully stopped.
  pub fn terminated(&self) -> bool {
    self.state == ShutdownState::Terminated
  }
}

/// Shuts `pool` down: drain, wait, cancel if needed, wait again, then give up.
///
/// Never fails. A pool still alive after the second wait is logged and recorded as a
/// [`ShutdownDiagnostic`]. If the calling thread is interrupted during either wait, the pool
/// is cancelled immediately, the thread's interrupt flag is raised again, and the function
/// returns without waiting further.
pub fn graceful_shutdown<P: Terminate + ?Sized>(pool: &P, config: &ShutdownConfig) -> ShutdownReport {
  let mut report = ShutdownReport::new(pool.name());

  report.advance(ShutdownState::DrainRequested);
  pool.shutdown();

  match pool.await_termination(config.drain_timeout) {
    Ok(true) => {
      info!(pool_name = %report.pool_name, "Pool terminated after drain.");
      report.advance(ShutdownState::Terminated);
      return report;
    }
    Ok(false) => {
      warn!(
        pool_name = %report.pool_name,
        timeout = ?config.drain_timeout,
        "Pool did not drain in time; cancelling running tasks."
      );
      report.request_cancel(pool);
    }
    Err(WaitError::Interrupted) => {
      return interrupted(pool, report);
    }
  }

  match pool.await_termination(config.cancel_timeout) {
    Ok(true) => {
      info!(pool_name = %report.pool_name, "Pool terminated after cancel.");
      report.advance(ShutdownState::Terminated);
    }
    Ok(false) => {
      let diagnostic = ShutdownDiagnostic::DidNotTerminate {
        pool_name: report.pool_name.clone(),
        waited: config.cancel_timeout,
      };
      error!(pool_name = %report.pool_name, "{}", diagnostic);
      report.advance(ShutdownState::TimedOutAfterCancel);
      report.diagnostics.push(diagnostic);
    }
    Err(WaitError::Interrupted) => {
      return interrupted(pool, report);
    }
  }

  report
}

fn interrupted<P: Terminate + ?Sized>(pool: &P, mut report: ShutdownReport) -> ShutdownReport {
  warn!(pool_name = %report.pool_name, "Interrupted during shutdown; cancelling pool and restoring interrupt flag.");
  // Interrupted during the cancel wait means the cancel signal is already out.
  if report.state != ShutdownState::CancelRequested {
    report.request_cancel(pool);
  }
  report.interrupted = true;
  interrupt::current().raise();
  report
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn happy_path_transitions_are_legal() {
    use ShutdownState::*;
    assert!(Running.can_transition_to(DrainRequested));
    assert!(DrainRequested.can_transition_to(Terminated));
    assert!(DrainRequested.can_transition_to(CancelRequested));
    assert!(CancelRequested.can_transition_to(TimedOutAfterCancel));
  }

  #[test]
  fn states_cannot_be_skipped_or_reversed() {
    use ShutdownState::*;
    assert!(!Running.can_transition_to(Terminated));
    assert!(!Running.can_transition_to(CancelRequested));
    assert!(!DrainRequested.can_transition_to(TimedOutAfterCancel));
    assert!(!Terminated.can_transition_to(Running));
    assert!(!TimedOutAfterCancel.can_transition_to(CancelRequested));
  }

  #[test]
  fn only_terminated_and_timed_out_are_final() {
    assert!(ShutdownState::Terminated.is_final());
    assert!(ShutdownState::TimedOutAfterCancel.is_final());
    assert!(!ShutdownState::CancelRequested.is_final());
    assert!(!ShutdownState::DrainRequested.is_final());
  }

  #[test]
  fn default_config_waits_thirty_seconds_twice() {
    let config = ShutdownConfig::default();
    assert_eq!(config.drain_timeout, Duration::from_secs(30));
    assert_eq!(config.cancel_timeout, Duration::from_secs(30));
  }
}

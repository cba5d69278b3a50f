//! Per-thread interrupt status.
//!
//! Every thread owns one [`InterruptFlag`]. Any holder of a clone can raise it; interruptible
//! blocking waits in this crate notice it, consume it and report [`WaitError::Interrupted`].
//!
//! [`WaitError::Interrupted`]: crate::WaitError::Interrupted

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

thread_local! {
  static CURRENT: InterruptFlag = InterruptFlag::new();
}

/// Returns the interrupt flag of the calling thread.
pub fn current() -> InterruptFlag {
  CURRENT.with(InterruptFlag::clone)
}

#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
  raised: Arc<AtomicBool>,
}

impl InterruptFlag {
  pub fn new() -> Self {
    Self::default()
  }

  /// Raises the flag. Safe to call from any thread.
  pub fn raise(&self) {
    self.raised.store(true, Ordering::SeqCst);
  }

  pub fn is_raised(&self) -> bool {
    self.raised.load(Ordering::SeqCst)
  }

  /// Clears the flag, returning whether it was raised.
  pub fn take(&self) -> bool {
    self.raised.swap(false, Ordering::SeqCst)
  }
}

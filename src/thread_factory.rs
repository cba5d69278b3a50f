use std::io;
use std::thread::{self, JoinHandle};

/// Creates the OS threads backing a [`DedicatedPool`](crate::DedicatedPool).
pub trait ThreadFactory {
  /// Spawns a new thread running `body`. Called once per worker during pool construction.
  fn new_thread(&mut self, body: Box<dyn FnOnce() + Send + 'static>) -> io::Result<JoinHandle<()>>;
}

/// Builds the name of the `ordinal`-th thread created under `prefix`.
pub fn thread_name(prefix: &str, ordinal: u64) -> String {
  format!("{}-{}", prefix, ordinal)
}

/// Names threads `<prefix>-1`, `<prefix>-2`, ... in creation order.
///
/// The counter advances per thread created, never per task submitted.
#[derive(Debug, Clone)]
pub struct NamedThreadFactory {
  prefix: String,
  next_ordinal: u64,
}

impl NamedThreadFactory {
  pub fn new(prefix: impl Into<String>) -> Self {
    Self {
      prefix: prefix.into(),
      next_ordinal: 1,
    }
  }

  pub fn prefix(&self) -> &str {
    &self.prefix
  }

  /// Number of threads this factory has created so far.
  pub fn created(&self) -> u64 {
    self.next_ordinal - 1
  }
}

impl ThreadFactory for NamedThreadFactory {
  fn new_thread(&mut self, body: Box<dyn FnOnce() + Send + 'static>) -> io::Result<JoinHandle<()>> {
    let name = thread_name(&self.prefix, self.next_ordinal);
    let handle = thread::Builder::new().name(name).spawn(body)?;
    self.next_ordinal += 1;
    Ok(handle)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn thread_name_joins_prefix_and_ordinal() {
    assert_eq!(thread_name("FixedThreadPool-executor", 1), "FixedThreadPool-executor-1");
    assert_eq!(thread_name("p", 12), "p-12");
  }

  #[test]
  fn ordinals_start_at_one_and_follow_creation_order() {
    let mut factory = NamedThreadFactory::new("factory-test");
    let mut names = Vec::new();
    for _ in 0..3 {
      let handle = factory
        .new_thread(Box::new(|| {}))
        .expect("spawn should succeed");
      names.push(handle.thread().name().map(str::to_owned));
      handle.join().unwrap();
    }

    assert_eq!(
      names,
      vec![
        Some("factory-test-1".to_string()),
        Some("factory-test-2".to_string()),
        Some("factory-test-3".to_string()),
      ]
    );
    assert_eq!(factory.created(), 3);
  }
}

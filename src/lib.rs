//! Runs a single task two ways and waits for it: on a shared default pool owned by the
//! process, and on a dedicated fixed-size pool of named threads that is drained, cancelled
//! if necessary, and terminated before the call returns.

mod console;
mod dedicated_pool;
mod error;
mod handle;
pub mod interrupt;
mod runner;
mod shared_pool;
mod shutdown;
mod task;
mod thread_factory;

pub use console::{Console, ConsoleConfig};
pub use dedicated_pool::DedicatedPool;
pub use error::{PoolError, WaitError};
pub use handle::CompletionHandle;
pub use runner::{DefaultPoolRunner, ManagedPoolConfig, ManagedPoolRunner, RunReport};
pub use shared_pool::SharedPool;
pub use shutdown::{
  graceful_shutdown, ShutdownConfig, ShutdownDiagnostic, ShutdownReport, ShutdownState, Terminate,
  DEFAULT_TERMINATION_TIMEOUT,
};
pub use task::{is_cancellation_requested, Task};
pub use thread_factory::{thread_name, NamedThreadFactory, ThreadFactory};

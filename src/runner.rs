use crate::console::Console;
use crate::dedicated_pool::DedicatedPool;
use crate::error::PoolError;
use crate::handle::CompletionHandle;
use crate::shared_pool::SharedPool;
use crate::shutdown::{graceful_shutdown, ShutdownConfig, ShutdownReport};
use crate::task::Task;
use crate::thread_factory::NamedThreadFactory;

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{info, info_span, warn};

/// What a runner observed while executing its task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
  /// Thread that executed the task.
  pub worker_thread: String,
  /// Thread that submitted the task and waited for it.
  pub caller_thread: String,
  /// Threads created for this run, in creation order. Empty when nothing was created.
  pub created_threads: Vec<String>,
  /// Present only for runners that own their pool.
  pub shutdown: Option<ShutdownReport>,
}

fn current_thread_label() -> String {
  let current = thread::current();
  match current.name() {
    Some(name) => name.to_string(),
    None => format!("{:?}", current.id()),
  }
}

/// Builds the task both runners submit: it records and reports which thread ran it.
fn identify_worker(console: Option<Console>, seen_on: Arc<Mutex<Option<String>>>) -> Task {
  Box::new(move || {
    let worker = current_thread_label();
    info!(thread = %worker, "Task running.");
    if let Some(console) = &console {
      console.active_thread(&worker);
    }
    *seen_on.lock() = Some(worker);
  })
}

fn take_worker(seen_on: &Mutex<Option<String>>) -> Result<String, PoolError> {
  seen_on.lock().take().ok_or(PoolError::ResultUnavailable)
}

/// Runs one task on the process-wide [`SharedPool`] and waits for it.
///
/// The shared pool is never created-for or shut down by this runner.
#[derive(Debug, Clone, Default)]
pub struct DefaultPoolRunner {
  console: Option<Console>,
}

impl DefaultPoolRunner {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_console(console: Console) -> Self {
    Self { console: Some(console) }
  }

  /// Submits the task, blocks until it completes, and reports who ran it.
  ///
  /// # Errors
  /// Propagates task faults (`PoolError::TaskPanicked`) and shared pool build failures.
  pub fn run(&self) -> Result<RunReport, PoolError> {
    let _span = info_span!("default_pool_runner").entered();
    let pool = SharedPool::global()?;
    if let Some(console) = &self.console {
      console.section_begins("DefaultPoolRunner::run()");
    }

    let seen_on = Arc::new(Mutex::new(None));
    let handle = pool.submit(identify_worker(self.console.clone(), seen_on.clone()));
    handle.join()?;

    let caller_thread = current_thread_label();
    info!(pool_name = pool.name(), thread = %caller_thread, "Caller resumed after task completion.");
    if let Some(console) = &self.console {
      console.thread_exits(&caller_thread);
      console.section_completes("DefaultPoolRunner::run()");
    }

    Ok(RunReport {
      worker_thread: take_worker(&seen_on)?,
      caller_thread,
      created_threads: Vec::new(),
      shutdown: None,
    })
  }
}

/// Settings for the pool [`ManagedPoolRunner`] builds on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedPoolConfig {
  pub pool_name: String,
  pub thread_name_prefix: String,
  pub worker_count: usize,
  pub shutdown: ShutdownConfig,
}

impl Default for ManagedPoolConfig {
  fn default() -> Self {
    Self {
      pool_name: "managed_pool".to_string(),
      thread_name_prefix: "FixedThreadPool-executor".to_string(),
      worker_count: 3,
      shutdown: ShutdownConfig::default(),
    }
  }
}

/// Runs one task on a freshly built [`DedicatedPool`], waits for it, then shuts the pool down.
#[derive(Debug, Clone, Default)]
pub struct ManagedPoolRunner {
  config: ManagedPoolConfig,
  console: Option<Console>,
}

impl ManagedPoolRunner {
  pub fn new(config: ManagedPoolConfig) -> Self {
    Self { config, console: None }
  }

  pub fn with_console(mut self, console: Console) -> Self {
    self.console = Some(console);
    self
  }

  pub fn config(&self) -> &ManagedPoolConfig {
    &self.config
  }

  /// Builds the pool, runs the task to completion, then drives [`graceful_shutdown`].
  ///
  /// Shutdown problems never fail the run; they are returned in the report.
  ///
  /// # Errors
  /// Propagates worker spawn failures and task faults. The pool is still shut down before a
  /// task fault is returned.
  pub fn run(&self) -> Result<RunReport, PoolError> {
    let _span = info_span!("managed_pool_runner", pool_name = %self.config.pool_name).entered();
    if let Some(console) = &self.console {
      console.section_begins("ManagedPoolRunner::run()");
    }

    let pool = DedicatedPool::new(
      &self.config.pool_name,
      self.config.worker_count,
      NamedThreadFactory::new(self.config.thread_name_prefix.as_str()),
    )?;
    let created_threads = pool.worker_names().to_vec();

    let seen_on = Arc::new(Mutex::new(None));
    let completion = pool
      .submit(identify_worker(self.console.clone(), seen_on.clone()))
      .and_then(CompletionHandle::join);

    if let Err(task_error) = completion {
      warn!(pool_name = pool.name(), "Task failed: {}. Shutting pool down before propagating.", task_error);
      graceful_shutdown(&pool, &self.config.shutdown);
      return Err(task_error);
    }

    let caller_thread = current_thread_label();
    info!(pool_name = pool.name(), thread = %caller_thread, "Caller resumed after task completion.");
    if let Some(console) = &self.console {
      console.thread_exits(&caller_thread);
    }

    let shutdown = graceful_shutdown(&pool, &self.config.shutdown);
    if let Some(console) = &self.console {
      for diagnostic in &shutdown.diagnostics {
        console.diagnostic(&diagnostic.to_string());
      }
      console.section_completes("ManagedPoolRunner::run()");
    }

    Ok(RunReport {
      worker_thread: take_worker(&seen_on)?,
      caller_thread,
      created_threads,
      shutdown: Some(shutdown),
    })
  }
}

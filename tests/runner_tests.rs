use pool_compare::{
  Console, ConsoleConfig, DefaultPoolRunner, ManagedPoolConfig, ManagedPoolRunner, SharedPool, ShutdownConfig,
  ShutdownState,
};
use std::thread;
use std::time::{Duration, Instant};

fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,pool_compare=debug"));
    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

fn managed_config(prefix: &str) -> ManagedPoolConfig {
  ManagedPoolConfig {
    pool_name: format!("{}_pool", prefix),
    thread_name_prefix: prefix.to_string(),
    shutdown: ShutdownConfig {
      drain_timeout: Duration::from_secs(5),
      cancel_timeout: Duration::from_secs(5),
    },
    ..ManagedPoolConfig::default()
  }
}

#[test]
fn test_default_runner_runs_on_a_shared_worker() {
  setup_tracing_for_test();
  let report = DefaultPoolRunner::new().run().unwrap();

  assert!(
    report.worker_thread.starts_with("shared-pool-worker-"),
    "ran on {}",
    report.worker_thread
  );
  assert_ne!(report.worker_thread, report.caller_thread);
  assert!(report.created_threads.is_empty());
  assert!(report.shutdown.is_none());
}

#[test]
fn test_default_runner_never_creates_or_destroys_shared_threads() {
  setup_tracing_for_test();
  let pool = SharedPool::global().unwrap();

  // Worker threads register asynchronously after the pool is built.
  let deadline = Instant::now() + Duration::from_secs(5);
  while pool.threads_alive() < pool.worker_threads() && Instant::now() < deadline {
    thread::sleep(Duration::from_millis(5));
  }
  let started_before = pool.threads_started();
  let alive_before = pool.threads_alive();

  for _ in 0..3 {
    DefaultPoolRunner::new().run().unwrap();
  }

  assert_eq!(pool.threads_started(), started_before);
  assert_eq!(pool.threads_alive(), alive_before);
}

#[test]
fn test_managed_runner_creates_three_named_threads() {
  setup_tracing_for_test();
  let runner = ManagedPoolRunner::new(managed_config("runner-names"));

  let report = runner.run().unwrap();

  assert_eq!(
    report.created_threads,
    vec![
      "runner-names-1".to_string(),
      "runner-names-2".to_string(),
      "runner-names-3".to_string(),
    ]
  );
  assert!(report.created_threads.contains(&report.worker_thread));
  assert_ne!(report.worker_thread, report.caller_thread);
}

#[test]
fn test_managed_runner_terminates_pool_without_cancelling() {
  setup_tracing_for_test();
  let report = ManagedPoolRunner::new(managed_config("runner-shutdown")).run().unwrap();

  let shutdown = report.shutdown.expect("managed runner reports its shutdown");
  assert_eq!(shutdown.state, ShutdownState::Terminated);
  assert!(shutdown.state.is_final());
  assert_eq!(shutdown.cancel_requests, 0);
  assert!(shutdown.diagnostics.is_empty());
  assert!(!shutdown.interrupted);
}

#[test]
fn test_each_managed_run_starts_ordinals_at_one() {
  setup_tracing_for_test();
  let runner = ManagedPoolRunner::new(managed_config("runner-repeat"));

  let first = runner.run().unwrap();
  let second = runner.run().unwrap();

  assert_eq!(first.created_threads, second.created_threads);
  assert_eq!(second.created_threads[0], "runner-repeat-1");
}

#[test]
fn test_default_config_matches_documented_values() {
  let config = ManagedPoolConfig::default();
  assert_eq!(config.worker_count, 3);
  assert_eq!(config.thread_name_prefix, "FixedThreadPool-executor");
  assert_eq!(config.shutdown, ShutdownConfig::default());
  assert_eq!(ManagedPoolRunner::default().config(), &config);
}

#[test]
fn test_runners_run_back_to_back() {
  setup_tracing_for_test();
  let default_report = DefaultPoolRunner::new().run().unwrap();
  let managed_report = ManagedPoolRunner::new(managed_config("runner-sequence")).run().unwrap();

  assert!(default_report.worker_thread.starts_with("shared-pool-worker-"));
  assert!(managed_report.worker_thread.starts_with("runner-sequence-"));
}

#[test]
fn test_runners_accept_a_plain_console() {
  setup_tracing_for_test();
  let console = Console::new(ConsoleConfig::plain());

  let default_report = DefaultPoolRunner::with_console(console.clone()).run().unwrap();
  let managed_report = ManagedPoolRunner::new(managed_config("runner-console"))
    .with_console(console)
    .run()
    .unwrap();

  assert!(default_report.shutdown.is_none());
  assert_eq!(managed_report.created_threads.len(), 3);
}

#[test]
fn test_shared_pool_thread_counters_stay_consistent() {
  setup_tracing_for_test();
  let pool = SharedPool::global().unwrap();
  DefaultPoolRunner::new().run().unwrap();

  let alive = pool.threads_alive();
  assert!(alive <= pool.threads_started());
  assert!(format!("{:?}", pool).contains("threads_alive"));
}

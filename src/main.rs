use pool_compare::{Console, ConsoleConfig, DefaultPoolRunner, ManagedPoolConfig, ManagedPoolRunner, PoolError};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn run(console: &Console) -> Result<(), PoolError> {
  DefaultPoolRunner::with_console(console.clone()).run()?;
  ManagedPoolRunner::new(ManagedPoolConfig::default())
    .with_console(console.clone())
    .run()?;
  Ok(())
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_thread_names(true)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();

  let console = Console::new(ConsoleConfig::default());
  console.banner("App begins");

  let outcome = run(&console);

  console.banner("App completes\n");
  match outcome {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      error!("Run failed: {}", e);
      ExitCode::FAILURE
    }
  }
}

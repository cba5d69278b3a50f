use std::io::{self, Write};

/// Escape sequences wrapped around section banners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
  pub accent: String,
  pub reset: String,
}

impl Default for ConsoleConfig {
  fn default() -> Self {
    Self {
      accent: "\u{1b}[32m".to_string(),
      reset: "\u{1b}[0m".to_string(),
    }
  }
}

impl ConsoleConfig {
  /// No styling at all.
  pub fn plain() -> Self {
    Self {
      accent: String::new(),
      reset: String::new(),
    }
  }
}

/// Human-readable progress output on stderr.
#[derive(Debug, Clone, Default)]
pub struct Console {
  config: ConsoleConfig,
}

impl Console {
  pub fn new(config: ConsoleConfig) -> Self {
    Self { config }
  }

  pub fn banner(&self, text: &str) {
    self.write(&format!("\n{}\n", text));
  }

  pub fn section_begins(&self, section: &str) {
    self.write(&format!("{}\n  {} begins\n{}", self.config.accent, section, self.config.reset));
  }

  pub fn section_completes(&self, section: &str) {
    self.write(&format!(
      "{}\n  {} completes{}\n        ...  ...  ...\n",
      self.config.accent, section, self.config.reset
    ));
  }

  pub fn active_thread(&self, thread_name: &str) {
    self.write(&format!("    Active Thread: {}", thread_name));
  }

  pub fn thread_exits(&self, thread_name: &str) {
    self.write(&format!("    Active Thread Exits: {}", thread_name));
  }

  pub fn diagnostic(&self, text: &str) {
    self.write(&format!("    {}", text));
  }

  fn write(&self, line: &str) {
    // Presentation only; a closed stderr is not worth failing over.
    let _ = writeln!(io::stderr().lock(), "{}", line);
  }
}

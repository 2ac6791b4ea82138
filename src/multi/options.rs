// src/multi/options.rs

use crate::transfer::DEFAULT_MONITOR_CAPACITY;

use std::time::Duration;

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct MultiOptions {
  /// Maximum number of transfers started at once. Further transfers wait in
  /// `Phase::Pending`, first come first served. `None` is unlimited.
  pub max_active: Option<usize>,
  /// How long `Multi::term` waits for the reactor to confirm teardowns.
  pub term_timeout: Duration,
  /// Upper bound of a single reactor turn while terminating.
  pub term_poll_interval: Duration,
  /// Capacity of the channel returned by `Multi::monitor`.
  pub monitor_capacity: usize,
}

impl Default for MultiOptions {
  fn default() -> Self {
    Self {
      max_active: None,
      term_timeout: Duration::from_secs(5),
      term_poll_interval: Duration::from_millis(50),
      monitor_capacity: DEFAULT_MONITOR_CAPACITY,
    }
  }
}

impl MultiOptions {
  pub fn with_max_active(mut self, max_active: usize) -> Self {
    self.max_active = Some(max_active.max(1));
    self
  }

  pub fn with_term_timeout(mut self, timeout: Duration) -> Self {
    self.term_timeout = timeout;
    self
  }
}

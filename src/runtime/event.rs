// src/runtime/event.rs

use crate::reactor::Token;
use crate::socket::Interest;

use std::os::unix::io::RawFd;

/// Notifications flowing from a reactor back into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactorEvent {
  /// The reactor observed readiness on a watched descriptor.
  Readiness { fd: RawFd, ready: Interest },
  /// The engine's single timer fired.
  TimerFired,
  /// The reactor has fully stopped watching `fd` under `token`.
  Deregistered { fd: RawFd, token: Token },
}

impl ReactorEvent {
  pub fn variant_name(&self) -> &'static str {
    match self {
      ReactorEvent::Readiness { .. } => "Readiness",
      ReactorEvent::TimerFired => "TimerFired",
      ReactorEvent::Deregistered { .. } => "Deregistered",
    }
  }
}

// src/reactor/mod.rs

//! The external I/O reactor as seen by the engine.
//!
//! The engine never polls anything itself. It asks a [`Reactor`] to watch
//! descriptors and a [`ReactorTimer`] to fire once, and the reactor reports
//! back through the [`EventSender`] it was attached to.

pub mod queued;
#[cfg(feature = "mio-poll")]
pub mod mio_poll;

use crate::runtime::EventSender;
use crate::socket::Interest;

use std::fmt;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

pub use queued::{QueuedReactor, ReactorOp};
#[cfg(feature = "mio-poll")]
pub use mio_poll::MioReactor;

/// Identifies one registration of a descriptor with the reactor.
///
/// A descriptor that is deregistered and registered again receives a new
/// token, so a late teardown confirmation can be told apart from the live
/// registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub usize);

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// Registration half of the reactor contract.
pub trait Reactor {
  /// Gives the reactor the channel it reports readiness, timer fires and
  /// teardown confirmations on. Called once by `Multi::new`.
  fn attach(&mut self, events: EventSender);

  /// Starts watching `fd` for `interest`. `interest` is never empty.
  fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<Token>;

  /// Changes the watched directions of a live registration.
  fn update(&mut self, token: Token, interest: Interest) -> io::Result<()>;

  /// Requests removal of a registration.
  ///
  /// Removal is asynchronous: the reactor must later report
  /// `ReactorEvent::Deregistered` for this token, and may still deliver
  /// readiness it had already queued for the descriptor before that.
  fn deregister(&mut self, token: Token) -> io::Result<()>;

  /// Waits for events for at most `max_wait` (`None` waits until something
  /// happens) and pushes them onto the attached channel.
  fn turn(&mut self, max_wait: Option<Duration>) -> io::Result<()>;
}

/// Timer half of the reactor contract: one timer per engine.
pub trait ReactorTimer {
  /// Arms (or re-arms) the timer to fire once after `after`.
  fn arm(&mut self, after: Duration);

  /// Cancels a pending fire, if any.
  fn disarm(&mut self);
}

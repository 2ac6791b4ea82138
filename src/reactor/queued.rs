// src/reactor/queued.rs

use crate::reactor::{Reactor, ReactorTimer, Token};
use crate::runtime::{EventSender, ReactorEvent};
use crate::socket::Interest;

use std::collections::{HashMap, HashSet};
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// A request the engine made of its reactor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactorOp {
  Register { token: Token, fd: RawFd, interest: Interest },
  Update { token: Token, interest: Interest },
  Deregister { token: Token },
  Arm(Duration),
  Disarm,
}

/// A reactor that only records what it is asked to do.
///
/// For embedding the engine into an event loop it does not own: the host
/// drains [`take_ops`](Self::take_ops) after every engine call, applies them
/// to its own loop, and feeds readiness, timer fires and teardown
/// confirmations back (directly on `Multi`, or through the attached channel
/// with [`confirm_deregistered`](Self::confirm_deregistered) and friends).
#[derive(Debug, Default)]
pub struct QueuedReactor {
  ops: Vec<ReactorOp>,
  next_token: usize,
  live: HashMap<Token, RawFd>,
  retiring: HashMap<Token, RawFd>,
  failing: HashSet<RawFd>,
  confirm_on_turn: bool,
  events: Option<EventSender>,
}

impl QueuedReactor {
  pub fn new() -> Self {
    Self {
      next_token: 1,
      ..Default::default()
    }
  }

  /// Makes every [`turn`](Reactor::turn) confirm the removals requested
  /// before it, the way a polling reactor would.
  pub fn confirm_on_turn(mut self, enabled: bool) -> Self {
    self.confirm_on_turn = enabled;
    self
  }

  /// Drains the recorded requests.
  pub fn take_ops(&mut self) -> Vec<ReactorOp> {
    std::mem::take(&mut self.ops)
  }

  /// Requests recorded so far, without draining.
  pub fn ops(&self) -> &[ReactorOp] {
    &self.ops
  }

  /// Makes every register/update/deregister for `fd` fail.
  pub fn fail_registration_for(&mut self, fd: RawFd) {
    self.failing.insert(fd);
  }

  /// Pushes `Deregistered` for every pending removal onto the attached channel.
  /// Returns how many confirmations were queued.
  pub fn confirm_deregistered(&mut self) -> usize {
    let pending: Vec<_> = self.retiring.drain().collect();
    let count = pending.len();
    if let Some(events) = &self.events {
      for (token, fd) in pending {
        let _ = events.try_send(ReactorEvent::Deregistered { fd, token });
      }
    }
    count
  }

  /// Pushes a readiness event onto the attached channel.
  pub fn inject_readiness(&self, fd: RawFd, ready: Interest) {
    if let Some(events) = &self.events {
      let _ = events.try_send(ReactorEvent::Readiness { fd, ready });
    }
  }

  /// Pushes a timer fire onto the attached channel.
  pub fn inject_timer_fire(&self) {
    if let Some(events) = &self.events {
      let _ = events.try_send(ReactorEvent::TimerFired);
    }
  }

  fn check(&self, fd: RawFd) -> io::Result<()> {
    if self.failing.contains(&fd) {
      Err(io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("registration refused for descriptor {}", fd),
      ))
    } else {
      Ok(())
    }
  }

  fn live_fd(&self, token: Token) -> io::Result<RawFd> {
    self
      .live
      .get(&token)
      .copied()
      .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no live registration {}", token)))
  }
}

impl Reactor for QueuedReactor {
  fn attach(&mut self, events: EventSender) {
    self.events = Some(events);
  }

  fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<Token> {
    self.check(fd)?;
    let token = Token(self.next_token);
    self.next_token += 1;
    self.live.insert(token, fd);
    self.ops.push(ReactorOp::Register { token, fd, interest });
    Ok(token)
  }

  fn update(&mut self, token: Token, interest: Interest) -> io::Result<()> {
    let fd = self.live_fd(token)?;
    self.check(fd)?;
    self.ops.push(ReactorOp::Update { token, interest });
    Ok(())
  }

  fn deregister(&mut self, token: Token) -> io::Result<()> {
    let fd = self.live_fd(token)?;
    self.check(fd)?;
    self.live.remove(&token);
    self.retiring.insert(token, fd);
    self.ops.push(ReactorOp::Deregister { token });
    Ok(())
  }

  fn turn(&mut self, _max_wait: Option<Duration>) -> io::Result<()> {
    if self.confirm_on_turn {
      self.confirm_deregistered();
    }
    Ok(())
  }
}

impl ReactorTimer for QueuedReactor {
  fn arm(&mut self, after: Duration) {
    self.ops.push(ReactorOp::Arm(after));
  }

  fn disarm(&mut self) {
    self.ops.push(ReactorOp::Disarm);
  }
}

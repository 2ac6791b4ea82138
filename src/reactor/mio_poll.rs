// src/reactor/mio_poll.rs

use crate::reactor::{Reactor, ReactorTimer, Token};
use crate::runtime::{EventSender, ReactorEvent};
use crate::socket::Interest;

use mio::unix::SourceFd;
use mio::{Events, Poll};

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

/// Default number of readiness events collected per turn.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// A reactor backed by `mio::Poll` (epoll / kqueue).
///
/// Descriptors are watched through `SourceFd`, so the reactor never owns a
/// socket. Removal happens immediately at the OS level, but is confirmed only
/// at the end of the following [`turn`](Reactor::turn), after the readiness
/// that turn collected has been queued. The engine timer is folded into the
/// poll timeout.
pub struct MioReactor {
  poll: Poll,
  events: Events,
  sources: HashMap<Token, RawFd>,
  retiring: Vec<(Token, RawFd)>,
  next_token: usize,
  timer_deadline: Option<Instant>,
  tx: Option<EventSender>,
}

impl MioReactor {
  pub fn new() -> io::Result<Self> {
    Self::with_capacity(DEFAULT_EVENT_CAPACITY)
  }

  pub fn with_capacity(event_capacity: usize) -> io::Result<Self> {
    let poll = Poll::new()?;
    tracing::debug!(event_capacity, "Created mio reactor");
    Ok(Self {
      poll,
      events: Events::with_capacity(event_capacity.max(1)),
      sources: HashMap::new(),
      retiring: Vec::new(),
      next_token: 0,
      timer_deadline: None,
      tx: None,
    })
  }

  /// Number of descriptors currently watched.
  pub fn watched(&self) -> usize {
    self.sources.len()
  }

  fn send(&self, event: ReactorEvent) {
    if let Some(tx) = &self.tx {
      if tx.try_send(event).is_err() {
        tracing::trace!("Engine event queue closed, reactor event dropped");
      }
    }
  }

  fn live_fd(&self, token: Token) -> io::Result<RawFd> {
    self
      .sources
      .get(&token)
      .copied()
      .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no live registration {}", token)))
  }

  /// Poll timeout: the caller's bound, shortened by the timer deadline.
  fn effective_timeout(&self, max_wait: Option<Duration>, now: Instant) -> Option<Duration> {
    let until_timer = self.timer_deadline.map(|d| d.saturating_duration_since(now));
    match (max_wait, until_timer) {
      (Some(w), Some(t)) => Some(w.min(t)),
      (Some(w), None) => Some(w),
      (None, t) => t,
    }
  }
}

fn to_mio(interest: Interest) -> io::Result<mio::Interest> {
  match (interest.contains(Interest::READ), interest.contains(Interest::WRITE)) {
    (true, true) => Ok(mio::Interest::READABLE | mio::Interest::WRITABLE),
    (true, false) => Ok(mio::Interest::READABLE),
    (false, true) => Ok(mio::Interest::WRITABLE),
    (false, false) => Err(io::Error::new(
      io::ErrorKind::InvalidInput,
      "cannot watch a descriptor for no direction",
    )),
  }
}

impl Reactor for MioReactor {
  fn attach(&mut self, events: EventSender) {
    self.tx = Some(events);
  }

  fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<Token> {
    let mio_interest = to_mio(interest)?;
    let token = Token(self.next_token);
    self
      .poll
      .registry()
      .register(&mut SourceFd(&fd), mio::Token(token.0), mio_interest)?;
    self.next_token = self.next_token.wrapping_add(1);
    self.sources.insert(token, fd);
    tracing::trace!(fd, %token, interest = interest.as_str(), "mio register");
    Ok(token)
  }

  fn update(&mut self, token: Token, interest: Interest) -> io::Result<()> {
    let fd = self.live_fd(token)?;
    let mio_interest = to_mio(interest)?;
    self
      .poll
      .registry()
      .reregister(&mut SourceFd(&fd), mio::Token(token.0), mio_interest)?;
    tracing::trace!(fd, %token, interest = interest.as_str(), "mio reregister");
    Ok(())
  }

  fn deregister(&mut self, token: Token) -> io::Result<()> {
    let fd = self.live_fd(token)?;
    self.sources.remove(&token);
    self.poll.registry().deregister(&mut SourceFd(&fd))?;
    self.retiring.push((token, fd));
    tracing::trace!(fd, %token, "mio deregister, confirmation deferred");
    Ok(())
  }

  fn turn(&mut self, max_wait: Option<Duration>) -> io::Result<()> {
    let confirming = std::mem::take(&mut self.retiring);
    let now = Instant::now();
    let timeout = if confirming.is_empty() {
      self.effective_timeout(max_wait, now)
    } else {
      Some(Duration::ZERO)
    };

    match self.poll.poll(&mut self.events, timeout) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
      Err(e) => {
        self.retiring = confirming;
        return Err(e);
      }
    }

    let mut readiness = Vec::new();
    for event in self.events.iter() {
      let token = Token(event.token().0);
      let Some(fd) = self.sources.get(&token).copied() else {
        continue;
      };
      let mut ready = Interest::empty();
      if event.is_readable() || event.is_read_closed() {
        ready |= Interest::READ;
      }
      if event.is_writable() || event.is_write_closed() {
        ready |= Interest::WRITE;
      }
      if event.is_error() {
        ready |= Interest::READ | Interest::WRITE;
      }
      if !ready.is_empty() {
        readiness.push(ReactorEvent::Readiness { fd, ready });
      }
    }
    for event in readiness {
      self.send(event);
    }

    if let Some(deadline) = self.timer_deadline {
      if Instant::now() >= deadline {
        self.timer_deadline = None;
        self.send(ReactorEvent::TimerFired);
      }
    }

    for (token, fd) in confirming {
      self.send(ReactorEvent::Deregistered { fd, token });
    }
    Ok(())
  }
}

impl ReactorTimer for MioReactor {
  fn arm(&mut self, after: Duration) {
    self.timer_deadline = Some(Instant::now() + after);
  }

  fn disarm(&mut self) {
    self.timer_deadline = None;
  }
}

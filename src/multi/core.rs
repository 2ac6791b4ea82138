// src/multi/core.rs

//! Internal mechanics of `Multi`: advancing exchanges and reconciling the
//! reactor with what they want afterwards.

use super::drain::PendingCompletion;
use super::Multi;
use crate::error::{MultiError, TransportError};
use crate::reactor::{Reactor, ReactorTimer};
use crate::socket::Interest;
use crate::transfer::{
  Completion, Connector, Exchange, ExchangeCx, Phase, Progress, Step, TransferEvent, TransferHandle,
  TransferMetadata, TransferStatus,
};

use std::io::Write;
use std::os::unix::io::RawFd;
use std::time::Instant;

/// A live (non-terminal) transfer owned by the engine.
pub(crate) struct TransferEntry {
  pub(crate) exchange: Box<dyn Exchange>,
  pub(crate) sink: Box<dyn Write + Send>,
  pub(crate) target: String,
  pub(crate) label: Option<String>,
  pub(crate) phase: Phase,
  /// Descriptor and mask last reconciled with the registry.
  pub(crate) bound: Option<(RawFd, Interest)>,
  pub(crate) last_fd: Option<RawFd>,
  pub(crate) deadline: Option<Instant>,
  pub(crate) progress: Progress,
  pub(crate) added_at: Instant,
}

impl TransferEntry {
  pub(crate) fn new(
    exchange: Box<dyn Exchange>,
    sink: Box<dyn Write + Send>,
    target: String,
    label: Option<String>,
    now: Instant,
  ) -> Self {
    Self {
      exchange,
      sink,
      target,
      label,
      phase: Phase::Pending,
      bound: None,
      last_fd: None,
      deadline: None,
      progress: Progress::default(),
      added_at: now,
    }
  }
}

impl<R: Reactor + ReactorTimer, C: Connector> Multi<R, C> {
  /// Common tail of every mutating entry point: start waiting transfers that
  /// now fit, then bring the timer in line with the earliest deadline.
  pub(super) fn after_action(&mut self, now: Instant) {
    self.promote_waiting(now);
    self.sync_timer(now);
  }

  pub(super) fn is_bound_to(&self, handle: TransferHandle, fd: RawFd) -> bool {
    self
      .transfers
      .get(&handle)
      .map_or(false, |entry| matches!(entry.bound, Some((bound_fd, _)) if bound_fd == fd))
  }

  fn promote_waiting(&mut self, now: Instant) {
    loop {
      if let Some(max) = self.options.max_active {
        if self.active_count() >= max {
          return;
        }
      }
      let Some(handle) = self.waiting.pop_front() else {
        return;
      };
      let Some(entry) = self.transfers.get_mut(&handle) else {
        continue;
      };
      entry.phase = Phase::Connecting;
      tracing::debug!(%handle, "Transfer started");
      self.emit(TransferEvent::Started { handle });
      self.drive(handle, now, |exchange, cx| exchange.start(cx));
    }
  }

  /// Runs one exchange callback and settles the outcome.
  pub(super) fn drive<F>(&mut self, handle: TransferHandle, now: Instant, f: F)
  where
    F: FnOnce(&mut dyn Exchange, &mut ExchangeCx<'_>) -> Step,
  {
    let Some(entry) = self.transfers.get_mut(&handle) else {
      return;
    };
    let mut cx = ExchangeCx {
      now,
      sink: &mut *entry.sink,
    };
    let step = f(entry.exchange.as_mut(), &mut cx);
    match step {
      Step::Finished(status) => self.finish(handle, status),
      Step::Pending => self.sync_registration(handle),
    }
  }

  /// Issues at most one reconcile per descriptor whose wanted mask changed.
  fn sync_registration(&mut self, handle: TransferHandle) {
    let Some(entry) = self.transfers.get_mut(&handle) else {
      return;
    };
    let mut events = Vec::new();

    let socket = entry.exchange.socket();
    let desired = match socket {
      Some(_) => entry.exchange.interest(),
      None => Interest::empty(),
    };
    entry.deadline = entry.exchange.deadline();
    if socket.is_some() {
      entry.last_fd = socket;
    }
    if entry.phase == Phase::Connecting && entry.exchange.is_connected() {
      entry.phase = Phase::Active;
      if let Some(fd) = socket {
        tracing::debug!(%handle, fd, "Transfer connected");
        events.push(TransferEvent::Connected { handle, fd });
      }
    }
    let progress = entry.exchange.progress();
    if progress != entry.progress {
      entry.progress = progress;
      events.push(TransferEvent::Progress { handle, progress });
    }

    let mut plan: Vec<(RawFd, Interest)> = Vec::with_capacity(2);
    match (entry.bound, socket) {
      (Some((old_fd, _)), Some(fd)) if old_fd != fd => {
        plan.push((old_fd, Interest::empty()));
        if !desired.is_empty() {
          plan.push((fd, desired));
        }
      }
      (Some((old_fd, _)), None) => plan.push((old_fd, Interest::empty())),
      (Some((fd, current)), Some(_)) if current != desired => plan.push((fd, desired)),
      (None, Some(fd)) if !desired.is_empty() => plan.push((fd, desired)),
      _ => {}
    }
    entry.bound = match socket {
      Some(fd) if !desired.is_empty() => Some((fd, desired)),
      _ => None,
    };

    for event in events {
      self.emit(event);
    }
    for (fd, mask) in plan {
      if let Err(e) = self.registry.reconcile(&mut self.reactor, fd, handle, mask) {
        self.fail_descriptor(fd, e);
      }
    }
  }

  /// Makes a transfer terminal: removes its registration, then queues it for
  /// draining.
  pub(super) fn finish(&mut self, handle: TransferHandle, status: TransferStatus) {
    let Some(mut entry) = self.transfers.remove(&handle) else {
      return;
    };
    if entry.phase == Phase::Pending {
      self.waiting.retain(|h| *h != handle);
    }
    if let Some((fd, _)) = entry.bound.take() {
      if let Err(e) = self.registry.reconcile(&mut self.reactor, fd, handle, Interest::empty()) {
        self.fail_descriptor(fd, e);
      }
    }
    if status == TransferStatus::Cancelled {
      entry.exchange.abort();
    }

    let TransferEntry {
      exchange,
      sink,
      target,
      label,
      last_fd,
      added_at,
      ..
    } = entry;
    let elapsed = added_at.elapsed();
    tracing::debug!(%handle, status = %status, ?elapsed, "Transfer finished");
    self.emit(TransferEvent::Completed {
      handle,
      status: status.clone(),
    });
    self.completions.push_back(PendingCompletion {
      completion: Completion {
        handle,
        status,
        metadata: TransferMetadata {
          target,
          label,
          descriptor: last_fd,
          progress: exchange.progress(),
          elapsed,
        },
      },
      exchange: Some(exchange),
      sink,
    });
  }

  /// The reactor refused a request for `fd`: every transfer still bound to it fails.
  fn fail_descriptor(&mut self, fd: RawFd, error: MultiError) {
    tracing::warn!(fd, error = %error, "Registration failed, failing transfers bound to descriptor");
    let reason = TransportError::Registration(error.to_string());
    let bound: Vec<TransferHandle> = self
      .transfers
      .iter()
      .filter(|(_, entry)| {
        matches!(entry.bound, Some((bound_fd, _)) if bound_fd == fd) || entry.exchange.socket() == Some(fd)
      })
      .map(|(handle, _)| *handle)
      .collect();
    for handle in bound {
      self.finish(handle, TransferStatus::TransportFailure(reason.clone()));
    }
  }

  /// Re-arms or disarms the timer when the earliest deadline moved.
  pub(super) fn sync_timer(&mut self, now: Instant) {
    let next = self.transfers.values().filter_map(|entry| entry.deadline).min();
    if next == self.last_deadline {
      return;
    }
    self.last_deadline = next;
    let after = next.map(|deadline| deadline.saturating_duration_since(now));
    self.timer.request_deadline(&mut self.reactor, after, now);
  }
}

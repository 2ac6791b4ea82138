// src/multi/mod.rs

//! The transfer manager.

mod core;
pub mod drain;
pub mod options;

use crate::error::MultiError;
use crate::reactor::{Reactor, ReactorTimer, Token};
use crate::runtime::{event_queue, EventReceiver, ReactorEvent, TimerBridge};
use crate::socket::{Interest, SocketRegistry};
use crate::transfer::{
  Completion, Connector, MonitorReceiver, MonitorSender, OpenError, Phase, Progress, TransferEvent, TransferHandle,
  TransferMetadata, TransferRequest, TransferStatus,
};

use self::core::TransferEntry;
use self::drain::PendingCompletion;

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

pub use drain::Drain;
pub use options::MultiOptions;

/// Drives any number of transfers to completion on readiness reported by an
/// external reactor.
///
/// All state belongs to this instance; several engines can coexist. Every
/// mutating call leaves the reactor registrations and the timer consistent
/// with what the transfers want before it returns, and queues any transfer
/// that became terminal for [`poll_completions`](Self::poll_completions).
pub struct Multi<R, C> {
  reactor: R,
  connector: C,
  options: MultiOptions,
  events: EventReceiver,
  registry: SocketRegistry,
  timer: TimerBridge,
  transfers: BTreeMap<TransferHandle, TransferEntry>,
  waiting: VecDeque<TransferHandle>,
  completions: VecDeque<PendingCompletion>,
  last_deadline: Option<Instant>,
  next_handle: u64,
  monitor_tx: Option<MonitorSender>,
}

impl<R, C> fmt::Debug for Multi<R, C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Multi")
      .field("transfers", &self.transfers.len())
      .field("waiting", &self.waiting.len())
      .field("completions", &self.completions.len())
      .field("contexts", &self.registry.len())
      .field("timer_armed", &self.timer.is_armed())
      .finish_non_exhaustive()
  }
}

impl<R: Reactor + ReactorTimer, C: Connector> Multi<R, C> {
  /// Creates an engine on `reactor`, attaching the reactor to the engine's
  /// event queue.
  pub fn new(mut reactor: R, connector: C, options: MultiOptions) -> Self {
    let (events_tx, events_rx) = event_queue();
    reactor.attach(events_tx);
    tracing::debug!(?options, "Creating new transfer engine");
    Self {
      reactor,
      connector,
      options,
      events: events_rx,
      registry: SocketRegistry::new(),
      timer: TimerBridge::new(),
      transfers: BTreeMap::new(),
      waiting: VecDeque::new(),
      completions: VecDeque::new(),
      last_deadline: None,
      next_handle: 1,
      monitor_tx: None,
    }
  }

  /// Accepts a new transfer and returns at once.
  ///
  /// The transfer starts immediately when an active slot is free, which may
  /// register its socket before this returns. A request the connector
  /// rejects is returned as an error and no transfer is created; a local
  /// failure to open still yields a handle whose completion is already queued.
  pub fn add(&mut self, request: TransferRequest) -> Result<TransferHandle, MultiError> {
    if request.target.trim().is_empty() {
      return Err(MultiError::InvalidArgument("transfer target is empty".into()));
    }
    let opened = match self.connector.open(&request.spec()) {
      Ok(exchange) => Ok(exchange),
      Err(OpenError::Failed(reason)) => Err(reason),
      Err(OpenError::Rejected(e)) => {
        tracing::debug!(url = %request.target, error = %e, "Transfer rejected by connector");
        return Err(e);
      }
    };

    let now = Instant::now();
    let handle = TransferHandle::from_raw(self.next_handle);
    self.next_handle += 1;
    let TransferRequest { target, sink, label, .. } = request;
    tracing::debug!(%handle, url = %target, "Transfer added");
    self.emit(TransferEvent::Added {
      handle,
      target: target.clone(),
    });

    match opened {
      Ok(exchange) => {
        self
          .transfers
          .insert(handle, TransferEntry::new(exchange, sink, target, label, now));
        self.waiting.push_back(handle);
      }
      Err(reason) => {
        tracing::debug!(%handle, error = %reason, "Transfer failed before acquiring a socket");
        let status = TransferStatus::TransportFailure(reason);
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
              descriptor: None,
              progress: Progress::default(),
              elapsed: Duration::ZERO,
            },
          },
          exchange: None,
          sink,
        });
      }
    }

    self.after_action(now);
    Ok(handle)
  }

  /// The reactor observed `ready` on `fd`.
  ///
  /// Readiness for a descriptor without a live context (already released, or
  /// retired and awaiting confirmation) is ignored.
  pub fn notify_readiness(&mut self, fd: RawFd, ready: Interest) {
    let owner = match self.registry.resolve(fd) {
      None => {
        tracing::trace!(fd, ready = ready.as_str(), "Readiness for unknown descriptor ignored");
        return;
      }
      Some(ctx) if !ctx.is_active() => {
        tracing::trace!(fd, ready = ready.as_str(), "Readiness for retired descriptor ignored");
        return;
      }
      Some(ctx) => ctx.owner(),
    };
    if !self.is_bound_to(owner, fd) {
      tracing::trace!(fd, %owner, "Readiness for descriptor no longer bound to its owner ignored");
      return;
    }
    tracing::trace!(fd, %owner, ready = ready.as_str(), "Dispatching readiness");
    let now = Instant::now();
    self.drive(owner, now, |exchange, cx| exchange.on_ready(ready, cx));
    self.after_action(now);
  }

  /// The engine timer fired.
  pub fn notify_timeout(&mut self) {
    self.timer.on_fire();
    self.last_deadline = None;
    let now = Instant::now();
    let due: Vec<TransferHandle> = self
      .transfers
      .iter()
      .filter(|(_, entry)| entry.deadline.map_or(false, |d| d <= now))
      .map(|(handle, _)| *handle)
      .collect();
    tracing::trace!(due = due.len(), "Timer fired");
    for handle in due {
      self.drive(handle, now, |exchange, cx| exchange.on_timeout(cx));
    }
    self.after_action(now);
  }

  /// The reactor confirmed it stopped watching `fd` under `token`.
  pub fn on_deregistered(&mut self, fd: RawFd, token: Token) {
    self.registry.on_deregistered(fd, token);
  }

  /// Cancels a transfer.
  ///
  /// On return the transfer is terminal with status `Cancelled` and removal
  /// of its socket registration, if any, has been requested. Cancelling a
  /// transfer that is already terminal is a no-op; a handle this engine never
  /// issued is an error.
  pub fn cancel(&mut self, handle: TransferHandle) -> Result<(), MultiError> {
    if !self.was_issued(handle) {
      return Err(MultiError::UnknownHandle(handle));
    }
    if !self.transfers.contains_key(&handle) {
      tracing::trace!(%handle, "Cancel of terminal transfer ignored");
      return Ok(());
    }
    let now = Instant::now();
    self.finish(handle, TransferStatus::Cancelled);
    self.after_action(now);
    Ok(())
  }

  /// Finished transfers since the last call, each reported exactly once.
  pub fn poll_completions(&mut self) -> Drain<'_> {
    Drain::new(&mut self.completions)
  }

  /// Dispatches every event the reactor has queued. Returns how many were handled.
  pub fn step(&mut self) -> usize {
    let mut handled = 0;
    while let Ok(event) = self.events.try_recv() {
      handled += 1;
      tracing::trace!(event = event.variant_name(), "Reactor event");
      match event {
        ReactorEvent::Readiness { fd, ready } => self.notify_readiness(fd, ready),
        ReactorEvent::TimerFired => self.notify_timeout(),
        ReactorEvent::Deregistered { fd, token } => self.on_deregistered(fd, token),
      }
    }
    handled
  }

  /// Lets the reactor wait for at most `max_wait`, then dispatches what it queued.
  pub fn run_once(&mut self, max_wait: Option<Duration>) -> Result<usize, MultiError> {
    self.reactor.turn(max_wait)?;
    Ok(self.step())
  }

  /// Cancels every live transfer and waits until the reactor has confirmed
  /// the teardown of every socket. Returns the completions not yet drained.
  pub fn term(mut self) -> Result<Vec<Completion>, MultiError> {
    let live: Vec<TransferHandle> = self.transfers.keys().copied().collect();
    tracing::info!(live = live.len(), "Transfer engine terminating");
    let now = Instant::now();
    for handle in live {
      self.finish(handle, TransferStatus::Cancelled);
    }
    self.sync_timer(now);

    let deadline = Instant::now() + self.options.term_timeout;
    while !self.registry.is_empty() {
      let now = Instant::now();
      if now >= deadline {
        tracing::warn!(
          contexts = self.registry.len(),
          "Timeout while waiting for socket teardown confirmations"
        );
        return Err(MultiError::Timeout);
      }
      let wait = self.options.term_poll_interval.min(deadline - now);
      self.run_once(Some(wait))?;
    }
    tracing::info!("Transfer engine terminated");
    Ok(self.poll_completions().collect())
  }

  /// Subscribes to transfer events. Replaces any previous subscription.
  pub fn monitor(&mut self) -> MonitorReceiver {
    let (tx, rx) = async_channel::bounded(self.options.monitor_capacity.max(1));
    self.monitor_tx = Some(tx);
    rx
  }

  // --- Introspection ---

  /// Current phase, or `None` for a handle this engine never issued.
  pub fn phase(&self, handle: TransferHandle) -> Option<Phase> {
    if let Some(entry) = self.transfers.get(&handle) {
      return Some(entry.phase);
    }
    if self.completions.iter().any(|p| p.completion.handle == handle) {
      return Some(Phase::Draining);
    }
    self.was_issued(handle).then_some(Phase::Done)
  }

  pub fn progress(&self, handle: TransferHandle) -> Option<Progress> {
    self.transfers.get(&handle).map(|entry| entry.progress)
  }

  /// Transfers started and not yet terminal.
  pub fn active_count(&self) -> usize {
    self.transfers.len() - self.waiting.len()
  }

  /// Transfers waiting for an active slot.
  pub fn pending_count(&self) -> usize {
    self.waiting.len()
  }

  /// Completions queued and not yet drained.
  pub fn completed_count(&self) -> usize {
    self.completions.len()
  }

  /// Socket contexts not yet released, retired ones included.
  pub fn context_count(&self) -> usize {
    self.registry.len()
  }

  /// No live transfers and no socket context awaiting release.
  pub fn is_idle(&self) -> bool {
    self.transfers.is_empty() && self.registry.is_empty()
  }

  pub fn registry(&self) -> &SocketRegistry {
    &self.registry
  }

  pub fn timer(&self) -> &TimerBridge {
    &self.timer
  }

  pub fn reactor(&self) -> &R {
    &self.reactor
  }

  pub fn reactor_mut(&mut self) -> &mut R {
    &mut self.reactor
  }

  pub fn options(&self) -> &MultiOptions {
    &self.options
  }

  fn was_issued(&self, handle: TransferHandle) -> bool {
    handle.as_raw() != 0 && handle.as_raw() < self.next_handle
  }

  fn emit(&self, event: TransferEvent) {
    if let Some(tx) = &self.monitor_tx {
      match tx.try_send(event) {
        Ok(()) => {}
        Err(async_channel::TrySendError::Full(event)) => {
          tracing::warn!(?event, "Monitor channel full, event dropped");
        }
        Err(async_channel::TrySendError::Closed(_)) => {
          tracing::trace!("Monitor receiver dropped");
        }
      }
    }
  }
}

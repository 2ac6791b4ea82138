// src/transfer/mod.rs

//! Transfers: the opaque units of work the engine schedules.

pub mod events;
pub mod exchange;

use crate::error::{ProtocolError, TransportError};

use std::fmt;
use std::io::Write;
use std::os::unix::io::RawFd;
use std::time::Duration;

pub use events::{MonitorReceiver, MonitorSender, TransferEvent, DEFAULT_MONITOR_CAPACITY};
pub use exchange::{Connector, Exchange, ExchangeCx, OpenError, Step};

/// Opaque identifier of a transfer, unique within one `Multi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferHandle(u64);

impl TransferHandle {
  pub fn from_raw(raw: u64) -> Self {
    TransferHandle(raw)
  }

  pub fn as_raw(self) -> u64 {
    self.0
  }
}

impl fmt::Display for TransferHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "xfer-{}", self.0)
  }
}

/// Lifecycle phase of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
  /// Accepted but not started (waiting for an active slot).
  Pending,
  /// Started; connection setup has not finished.
  Connecting,
  /// Connected and exchanging data.
  Active,
  /// Terminal, waiting in the completion queue.
  Draining,
  /// Reported to the caller.
  Done,
}

/// Terminal outcome of a transfer. The kinds are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
  Success,
  TransportFailure(TransportError),
  ProtocolFailure(ProtocolError),
  Cancelled,
}

impl TransferStatus {
  pub fn is_success(&self) -> bool {
    matches!(self, TransferStatus::Success)
  }

  pub fn kind(&self) -> &'static str {
    match self {
      TransferStatus::Success => "success",
      TransferStatus::TransportFailure(_) => "transport-failure",
      TransferStatus::ProtocolFailure(_) => "protocol-failure",
      TransferStatus::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for TransferStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TransferStatus::Success => f.write_str("success"),
      TransferStatus::TransportFailure(e) => write!(f, "transport failure: {}", e),
      TransferStatus::ProtocolFailure(e) => write!(f, "protocol failure: {}", e),
      TransferStatus::Cancelled => f.write_str("cancelled"),
    }
  }
}

/// Byte counters reported by an exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
  pub downloaded: u64,
  /// Expected body size, when the peer announced one.
  pub total: Option<u64>,
  pub uploaded: u64,
}

/// A transfer to be handed to `Multi::add`.
pub struct TransferRequest {
  pub(crate) target: String,
  pub(crate) sink: Box<dyn Write + Send>,
  pub(crate) label: Option<String>,
  pub(crate) stall_timeout: Option<Duration>,
}

impl TransferRequest {
  /// `sink` receives the response body as it arrives.
  pub fn new(target: impl Into<String>, sink: impl Write + Send + 'static) -> Self {
    Self {
      target: target.into(),
      sink: Box::new(sink),
      label: None,
      stall_timeout: None,
    }
  }

  /// Caller metadata carried through to the completion.
  pub fn label(mut self, label: impl Into<String>) -> Self {
    self.label = Some(label.into());
    self
  }

  /// Overrides the connector's default stall timeout for this transfer.
  pub fn stall_timeout(mut self, timeout: Duration) -> Self {
    self.stall_timeout = Some(timeout);
    self
  }

  pub fn target(&self) -> &str {
    &self.target
  }

  pub(crate) fn spec(&self) -> TransferSpec<'_> {
    TransferSpec {
      target: &self.target,
      label: self.label.as_deref(),
      stall_timeout: self.stall_timeout,
    }
  }
}

impl fmt::Debug for TransferRequest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TransferRequest")
      .field("target", &self.target)
      .field("label", &self.label)
      .field("stall_timeout", &self.stall_timeout)
      .finish_non_exhaustive()
  }
}

/// The parts of a request a [`Connector`] needs to open an exchange.
#[derive(Debug, Clone, Copy)]
pub struct TransferSpec<'a> {
  pub target: &'a str,
  pub label: Option<&'a str>,
  pub stall_timeout: Option<Duration>,
}

/// Caller-facing metadata of a finished transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferMetadata {
  pub target: String,
  pub label: Option<String>,
  /// Last socket descriptor the transfer used, if it ever got one.
  pub descriptor: Option<RawFd>,
  pub progress: Progress,
  pub elapsed: Duration,
}

/// One finished transfer, as yielded by `Multi::poll_completions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
  pub handle: TransferHandle,
  pub status: TransferStatus,
  pub metadata: TransferMetadata,
}

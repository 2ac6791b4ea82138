// src/transfer/exchange.rs

use crate::error::{MultiError, TransportError};
use crate::socket::Interest;
use crate::transfer::{Progress, TransferSpec, TransferStatus};

use std::io::Write;
use std::os::unix::io::RawFd;
use std::time::Instant;

/// Result of advancing an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
  /// Still in flight; the engine re-reads socket, interest and deadline.
  Pending,
  Finished(TransferStatus),
}

/// Context handed to an exchange on every callback.
pub struct ExchangeCx<'a> {
  pub now: Instant,
  /// Destination for response body bytes.
  pub sink: &'a mut (dyn Write + Send),
}

/// Why a connector could not open an exchange.
#[derive(Debug)]
pub enum OpenError {
  /// The request itself is unusable; `Multi::add` returns this error and no
  /// transfer is created.
  Rejected(MultiError),
  /// Opening failed locally; the transfer is created and completes at once
  /// with a transport failure.
  Failed(TransportError),
}

/// Creates exchanges for requests. The transfer-execution side of the engine.
pub trait Connector {
  fn open(&mut self, spec: &TransferSpec<'_>) -> Result<Box<dyn Exchange>, OpenError>;
}

/// One transfer's protocol state machine.
///
/// After each callback the engine reads [`socket`](Self::socket),
/// [`interest`](Self::interest) and [`deadline`](Self::deadline) and
/// reconciles reactor registrations and the timer with them. An exchange
/// must keep its socket open until it is dropped: the engine deregisters it
/// first.
pub trait Exchange {
  /// Called once when the transfer gets an active slot.
  fn start(&mut self, cx: &mut ExchangeCx<'_>) -> Step;

  /// The reactor reported `ready` on this exchange's socket.
  fn on_ready(&mut self, ready: Interest, cx: &mut ExchangeCx<'_>) -> Step;

  /// The engine timer fired; `cx.now` may be past [`deadline`](Self::deadline).
  fn on_timeout(&mut self, cx: &mut ExchangeCx<'_>) -> Step;

  /// Socket descriptor, once connection setup produced one.
  fn socket(&self) -> Option<RawFd>;

  /// Directions wanted on [`socket`](Self::socket); empty for none.
  fn interest(&self) -> Interest;

  /// Next instant the exchange needs `on_timeout` by.
  fn deadline(&self) -> Option<Instant>;

  /// Whether connection setup has finished.
  fn is_connected(&self) -> bool;

  fn progress(&self) -> Progress {
    Progress::default()
  }

  /// The transfer was cancelled. Called after its registration was removed.
  fn abort(&mut self) {}
}

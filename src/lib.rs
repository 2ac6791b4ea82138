//! rmulti - drive many network transfers concurrently on an externally owned
//! event loop.
//!
//! [`Multi`] never polls anything itself. It asks a [`Reactor`] to watch
//! socket descriptors and to arm a single timer, and advances its transfers
//! when the reactor reports readiness or the timer fires.

pub mod error;
pub mod multi;
pub mod reactor;
pub mod runtime;
pub mod socket;
pub mod transfer;
pub mod transport;

// Re-export core types for user convenience
pub use error::{MultiError, ProtocolError, TransportError};
pub use multi::{Drain, Multi, MultiOptions};
pub use reactor::{QueuedReactor, Reactor, ReactorOp, ReactorTimer, Token};
#[cfg(feature = "mio-poll")]
pub use reactor::MioReactor;
pub use runtime::{ReactorEvent, MIN_TIMER_DELAY};
pub use socket::{Interest, SocketRegistry};
pub use transfer::{
  Completion, Connector, Exchange, ExchangeCx, OpenError, Phase, Progress, Step, TransferEvent, TransferHandle,
  TransferMetadata, TransferRequest, TransferSpec, TransferStatus,
};
#[cfg(feature = "mio-poll")]
pub use transport::{HttpConnector, HttpOptions};

// --- Top-Level Functions ---

const VERSION_MAJOR: i32 = 0;
const VERSION_MINOR: i32 = 1;
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

/// Returns the major version number of the library.
pub fn version_major() -> i32 {
  VERSION_MAJOR
}

/// Creates an engine driving HTTP transfers on a `mio` poller.
#[cfg(feature = "mio-poll")]
pub fn http_multi(
  options: MultiOptions,
  http: HttpOptions,
) -> Result<Multi<MioReactor, HttpConnector>, MultiError> {
  let reactor = MioReactor::new()?;
  Ok(Multi::new(reactor, HttpConnector::new(http), options))
}

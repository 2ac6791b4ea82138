use std::io;
use std::os::unix::io::RawFd;

use thiserror::Error;

use crate::transfer::TransferHandle;

/// Errors reported to the caller of the engine itself.
///
/// These cover programming misuse and engine-level faults. Failures of an
/// individual transfer never surface here; they become that transfer's
/// [`TransferStatus`](crate::TransferStatus).
#[derive(Error, Debug)]
#[non_exhaustive] // Allows adding more variants later without breaking change
pub enum MultiError {
  // --- I/O Errors ---
  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  #[error("Invalid argument provided: {0}")]
  InvalidArgument(String),

  // --- Target Errors ---
  #[error("Invalid transfer target: {0}")]
  InvalidTarget(String),
  #[error("Target scheme not supported: {0}")]
  UnsupportedScheme(String),

  // --- Handle Errors ---
  #[error("Unknown transfer handle: {0}")]
  UnknownHandle(TransferHandle),

  // --- Reactor Errors ---
  #[error("Reactor rejected {op} for descriptor {fd}: {source}")]
  Registration {
    fd: RawFd,
    op: &'static str,
    #[source]
    source: io::Error,
  },

  // --- Timeouts ---
  #[error("Timed out waiting for engine shutdown")]
  Timeout,
}

impl MultiError {
  pub(crate) fn registration(fd: RawFd, op: &'static str, source: io::Error) -> Self {
    MultiError::Registration { fd, op, source }
  }
}

/// Transport-level reasons a single transfer failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
  #[error("Connection refused by peer: {0}")]
  ConnectionRefused(String),
  #[error("Host is unreachable: {0}")]
  HostUnreachable(String),
  #[error("Network is unreachable: {0}")]
  NetworkUnreachable(String),
  #[error("Operation timed out")]
  TimedOut,
  #[error("Connection closed by peer before the transfer completed")]
  ConnectionClosed,
  #[error("Name resolution failed: {0}")]
  Resolve(String),
  #[error("Reactor registration failed: {0}")]
  Registration(String),
  #[error("Write sink rejected response data: {0}")]
  Sink(String),
  #[error("I/O error ({kind:?}): {message}")]
  Io { kind: io::ErrorKind, message: String },
}

impl TransportError {
  /// Maps common `std::io::Error` kinds onto transport failures.
  pub fn from_io(e: &io::Error, target: &str) -> Self {
    match e.kind() {
      io::ErrorKind::ConnectionRefused => TransportError::ConnectionRefused(target.to_string()),
      io::ErrorKind::TimedOut => TransportError::TimedOut,
      io::ErrorKind::ConnectionReset
      | io::ErrorKind::ConnectionAborted
      | io::ErrorKind::BrokenPipe
      | io::ErrorKind::UnexpectedEof => TransportError::ConnectionClosed,
      _ => match e.raw_os_error() {
        Some(code) if code == libc::EHOSTUNREACH => TransportError::HostUnreachable(target.to_string()),
        Some(code) if code == libc::ENETUNREACH => TransportError::NetworkUnreachable(target.to_string()),
        _ => TransportError::Io {
          kind: e.kind(),
          message: e.to_string(),
        },
      },
    }
  }
}

/// Protocol-level reasons a single transfer failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
  #[error("Peer answered with non-success status {0}")]
  Status(u16),
  #[error("Malformed response: {0}")]
  Malformed(String),
}

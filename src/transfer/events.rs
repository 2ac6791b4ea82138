// src/transfer/events.rs

use crate::transfer::{Progress, TransferHandle, TransferStatus};

use std::os::unix::io::RawFd;

/// Significant events in a transfer's life, reported on the monitor channel.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransferEvent {
  /// Accepted by `Multi::add`.
  Added { handle: TransferHandle, target: String },
  /// Got an active slot and was started.
  Started { handle: TransferHandle },
  /// Connection setup finished on `fd`.
  Connected { handle: TransferHandle, fd: RawFd },
  /// Byte counters changed.
  Progress { handle: TransferHandle, progress: Progress },
  /// Reached a terminal status and was queued for draining.
  Completed { handle: TransferHandle, status: TransferStatus },
}

// Type alias for the channel sender used for monitor events
pub type MonitorSender = async_channel::Sender<TransferEvent>;
// Type alias for the channel receiver used for monitor events
pub type MonitorReceiver = async_channel::Receiver<TransferEvent>;

// Default capacity for monitor channel
pub const DEFAULT_MONITOR_CAPACITY: usize = 100;

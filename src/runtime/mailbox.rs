// src/runtime/mailbox.rs

//! Type aliases for the reactor event queue based on `async-channel`.

use crate::runtime::event::ReactorEvent;

/// The sending end held by a reactor. Cloneable.
pub type EventSender = async_channel::Sender<ReactorEvent>;

/// The receiving end drained by `Multi::step`.
pub type EventReceiver = async_channel::Receiver<ReactorEvent>;

/// Creates a new event queue.
///
/// Unbounded: a dropped teardown confirmation would leak its socket context,
/// and a dropped readiness event would stall a transfer.
pub fn event_queue() -> (EventSender, EventReceiver) {
  async_channel::unbounded()
}

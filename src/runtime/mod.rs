// src/runtime/mod.rs

//! Reactor-facing plumbing: the event queue and the timer bridge.

pub mod event;
pub mod mailbox;
pub mod timer;

pub use event::ReactorEvent;
pub use mailbox::{event_queue, EventReceiver, EventSender};
pub use timer::{TimerAction, TimerBridge, MIN_TIMER_DELAY};

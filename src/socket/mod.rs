// src/socket/mod.rs

//! Per-descriptor reactor registration state.

pub mod context;
pub mod interest;
pub mod registry;

pub use context::{ContextState, SocketContext};
pub use interest::Interest;
pub use registry::{Reconciled, SocketRegistry};

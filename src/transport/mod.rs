// src/transport/mod.rs

//! Connectors the engine can drive out of the box.

pub mod endpoint;
#[cfg(feature = "mio-poll")]
pub mod http;

pub use endpoint::{parse_target, Target};
#[cfg(feature = "mio-poll")]
pub use http::{HttpConnector, HttpExchange, HttpOptions};

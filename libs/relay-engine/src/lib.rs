//! # Parley Relay Engine
//!
//! The connection broker and the per-connection readiness loop: spec
//! §4.4 and §4.5, the hardest and largest part of the system.

pub mod broker;
pub mod engine;
pub mod tls;

pub use broker::ConnectionBroker;
pub use engine::{AsyncStream, BoxedStream, RelayEngine};

//! # Parley Relay Core
//!
//! Shared infrastructure for the Parley proxy: configuration, the error
//! taxonomy, the connection/message data model, the module contract and
//! its static registry, and the append-only log sink.

pub mod config;
pub mod error;
pub mod log_sink;
pub mod module;
pub mod types;

pub use config::{CliArgs, Config};
pub use error::{ConfigError, ModuleLoadError, RelayError};
pub use log_sink::{global as global_log_sink, install_global as install_global_log_sink, LogSink};
pub use module::{Module, ModuleRegistry, RegisteredModule};
pub use types::{ConnectionContext, Direction, FourTuple, MessageContext};

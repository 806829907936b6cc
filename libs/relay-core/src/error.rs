//! Error taxonomy for the Parley relay (spec §7).
//!
//! Startup errors (`ConfigError`, `ModuleLoadError`, `RelayError::Bind`)
//! are fatal and bubble up to `main`. Per-connection errors
//! (`RelayError::Connect`/`Handshake`/`Stream`) are caught at the worker
//! boundary, logged, and never propagate further.

use std::path::PathBuf;

/// Invalid CLI flag combination or value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("--use_tls_client requires both --certfile and --keyfile")]
    MissingInboundCert,

    #[error("--client_certfile and --client_keyfile must be supplied together")]
    IncompleteClientCert,

    #[error("could not read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid certificate/key material in {path}: {reason}")]
    InvalidPem { path: PathBuf, reason: String },
}

/// A module named by an enabled-directory marker file was never compiled
/// in, or the directory itself could not be read.
#[derive(Debug, thiserror::Error)]
pub enum ModuleLoadError {
    #[error("could not read module directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("module '{0}' is enabled but no such module was compiled in")]
    UnregisteredModule(String),
}

/// Per-connection relay failures (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to connect to upstream: {0}")]
    Connect(#[source] std::io::Error),

    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("stream error: {0}")]
    Stream(#[source] std::io::Error),
}

//! CLI surface and structured configuration (spec §6, SPEC_FULL §3/§9).
//!
//! `CliArgs` is the literal flag table from spec §6, parsed the way the
//! teacher's binary parses its flags (`relays/bin/relay.rs::Args`).
//! `Config::try_from_args` is the validation step
//! (`SignalRelayConfig::validate`'s counterpart) that turns a raw CLI
//! parse into the structured, by-value config the broker consumes.

use std::path::PathBuf;

use clap::Parser;

use crate::error::ConfigError;

/// Default filesystem layout (spec §6); not CLI-configurable.
pub const DEFAULT_MODULES_CLIENT_DIR: &str = "modules_client/enabled";
pub const DEFAULT_MODULES_SERVER_DIR: &str = "modules_server/enabled";
pub const DEFAULT_LOGS_DIR: &str = "logs";

/// `TLSv1` / `TLSv1.1` / `TLSv1.2`, pinned per SPEC_FULL §9: selecting a
/// version enables only that version and disables the others.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SslVersion {
    #[value(name = "TLSv1")]
    Tls1_0,
    #[value(name = "TLSv1.1")]
    Tls1_1,
    #[value(name = "TLSv1.2")]
    Tls1_2,
}

/// The CLI surface, exactly spec §6's table plus the ambient logging
/// flags carried from the teacher's binary (`--log-level`/`--json-logs`,
/// logging is not a Non-goal's named feature).
#[derive(Parser, Debug, Clone)]
#[command(name = "parley", version, about = "Multi-threaded modular TCP MITM proxy with TLS support")]
pub struct CliArgs {
    #[arg(long, default_value = "localhost")]
    pub listen_host: String,

    #[arg(long, default_value_t = 8080)]
    pub listen_port: u16,

    #[arg(long)]
    pub target_host: String,

    #[arg(long, default_value_t = 80)]
    pub target_port: u16,

    /// Wraps the inbound (client-facing) socket as a TLS server.
    #[arg(long, default_value_t = false)]
    pub use_tls_client: bool,

    /// Wraps the outbound (upstream-facing) socket as a TLS client.
    #[arg(long, default_value_t = false)]
    pub use_tls_server: bool,

    #[arg(long)]
    pub certfile: Option<PathBuf>,

    #[arg(long)]
    pub keyfile: Option<PathBuf>,

    #[arg(long)]
    pub client_certfile: Option<PathBuf>,

    #[arg(long)]
    pub client_keyfile: Option<PathBuf>,

    #[arg(long)]
    pub cipher: Option<String>,

    #[arg(long, value_enum)]
    pub ssl_version: Option<SslVersion>,

    #[arg(long, default_value_t = false)]
    pub no_verify: bool,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long, default_value_t = false)]
    pub json_logs: bool,
}

#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub host: String,
    pub port: u16,
}

/// Inbound TLS: wrap the listener-facing socket as a TLS server.
#[derive(Debug, Clone)]
pub struct InboundTlsConfig {
    pub certfile: PathBuf,
    pub keyfile: PathBuf,
}

/// Outbound TLS: wrap the upstream-facing socket as a TLS client, with
/// optional mutual TLS, cipher pinning, and certificate-verification
/// bypass.
#[derive(Debug, Clone)]
pub struct OutboundTlsConfig {
    pub client_cert: Option<(PathBuf, PathBuf)>,
    pub cipher: Option<String>,
    pub ssl_version: Option<SslVersion>,
    pub no_verify: bool,
}

/// Structured, validated configuration assembled once from `CliArgs` and
/// passed by value into [`relay_engine::ConnectionBroker`] (spec §2/§3).
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: ListenConfig,
    pub target: TargetConfig,
    pub inbound_tls: Option<InboundTlsConfig>,
    pub outbound_tls: Option<OutboundTlsConfig>,
    pub modules_client_dir: PathBuf,
    pub modules_server_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Config {
    pub fn try_from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let inbound_tls = if args.use_tls_client {
            match (args.certfile, args.keyfile) {
                (Some(certfile), Some(keyfile)) => Some(InboundTlsConfig { certfile, keyfile }),
                _ => return Err(ConfigError::MissingInboundCert),
            }
        } else {
            None
        };

        let client_cert = match (args.client_certfile, args.client_keyfile) {
            (Some(cert), Some(key)) => Some((cert, key)),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteClientCert),
        };

        let outbound_tls = if args.use_tls_server {
            Some(OutboundTlsConfig {
                client_cert,
                cipher: args.cipher,
                ssl_version: args.ssl_version,
                no_verify: args.no_verify,
            })
        } else {
            None
        };

        Ok(Config {
            listen: ListenConfig {
                host: args.listen_host,
                port: args.listen_port,
            },
            target: TargetConfig {
                host: args.target_host,
                port: args.target_port,
            },
            inbound_tls,
            outbound_tls,
            modules_client_dir: PathBuf::from(DEFAULT_MODULES_CLIENT_DIR),
            modules_server_dir: PathBuf::from(DEFAULT_MODULES_SERVER_DIR),
            logs_dir: PathBuf::from(DEFAULT_LOGS_DIR),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs {
            listen_host: "localhost".into(),
            listen_port: 8080,
            target_host: "example.com".into(),
            target_port: 80,
            use_tls_client: false,
            use_tls_server: false,
            certfile: None,
            keyfile: None,
            client_certfile: None,
            client_keyfile: None,
            cipher: None,
            ssl_version: None,
            no_verify: false,
            log_level: "info".into(),
            json_logs: false,
        }
    }

    #[test]
    fn plain_config_has_no_tls() {
        let cfg = Config::try_from_args(base_args()).unwrap();
        assert!(cfg.inbound_tls.is_none());
        assert!(cfg.outbound_tls.is_none());
    }

    #[test]
    fn inbound_tls_without_cert_pair_is_rejected() {
        let mut args = base_args();
        args.use_tls_client = true;
        let err = Config::try_from_args(args).unwrap_err();
        assert!(matches!(err, ConfigError::MissingInboundCert));
    }

    #[test]
    fn lopsided_client_cert_pair_is_rejected() {
        let mut args = base_args();
        args.use_tls_server = true;
        args.client_certfile = Some("client.pem".into());
        let err = Config::try_from_args(args).unwrap_err();
        assert!(matches!(err, ConfigError::IncompleteClientCert));
    }

    #[test]
    fn outbound_tls_carries_pinned_version_and_no_verify() {
        let mut args = base_args();
        args.use_tls_server = true;
        args.no_verify = true;
        args.ssl_version = Some(SslVersion::Tls1_2);
        let cfg = Config::try_from_args(args).unwrap();
        let tls = cfg.outbound_tls.unwrap();
        assert!(tls.no_verify);
        assert_eq!(tls.ssl_version, Some(SslVersion::Tls1_2));
    }
}

//! Accepts inbound connections and spawns one worker per connection
//! (spec §4.4).
//!
//! Grounded on
//! `libs/messaging/relays/domains/signal/src/relay.rs::{start,handle_new_connection}`
//! for the accept-loop / `Arc::clone`-into-`tokio::spawn` shape,
//! generalized from a Unix-socket pub/sub hub to a TCP-to-TCP relay, and
//! on `other_examples/ecc5d43b_Hilmernator-mTLS-Sidecar-Proxy__mtls-proxy-src-proxy.rs.rs`
//! for the "never let one accept failure end the loop" idiom.

use std::net::SocketAddr;
use std::sync::Arc;

use socket2::{Domain, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{error, info, warn};

use relay_core::config::Config;
use relay_core::error::{ConfigError, RelayError};
use relay_core::{ConnectionContext, LogSink, ModuleRegistry};

use crate::engine::{BoxedStream, RelayEngine};
use crate::tls;

/// Listen backlog from spec §4.4.
const LISTEN_BACKLOG: i32 = 5;

/// Owns the two immutable module pipelines, the shared log sink, and the
/// optional TLS machinery for both sides; accepts connections and spawns
/// an independent worker per connection.
pub struct ConnectionBroker {
    config: Config,
    modules_client: Arc<ModuleRegistry>,
    modules_server: Arc<ModuleRegistry>,
    log_sink: Arc<LogSink>,
    inbound_acceptor: Option<TlsAcceptor>,
    outbound_connector: Option<TlsConnector>,
}

impl ConnectionBroker {
    /// Assemble the broker: build the TLS acceptor/connector (if
    /// configured) once, and install the process-wide log sink so
    /// built-in modules can reach it (spec §4.3, relay-core's
    /// `global_log_sink`).
    pub fn new(
        config: Config,
        modules_client: ModuleRegistry,
        modules_server: ModuleRegistry,
    ) -> Result<Self, ConfigError> {
        let inbound_acceptor = config
            .inbound_tls
            .as_ref()
            .map(tls::build_inbound_acceptor)
            .transpose()?;
        let outbound_connector = config
            .outbound_tls
            .as_ref()
            .map(tls::build_outbound_connector)
            .transpose()?;

        let log_sink = Arc::new(LogSink::new(&config.logs_dir));
        relay_core::install_global_log_sink((*log_sink).clone());

        Ok(Self {
            config,
            modules_client: Arc::new(modules_client),
            modules_server: Arc::new(modules_server),
            log_sink,
            inbound_acceptor,
            outbound_connector,
        })
    }

    /// Bind the listener with address reuse and the spec'd backlog, then
    /// accept forever (spec §4.4: "never terminates except by process
    /// shutdown"). Each accepted connection is handed to an independent
    /// `tokio::spawn`ed worker; the broker keeps no reference to its
    /// sockets after handoff.
    pub async fn run(&self) -> Result<(), RelayError> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    /// The accept loop over an already-bound listener, split out from
    /// [`run`](Self::run) so tests can bind to an ephemeral port, read it
    /// back, and then drive the loop without a race.
    async fn serve(&self, listener: TcpListener) -> Result<(), RelayError> {
        let local_addr = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| format!("{}:{}", self.config.listen.host, self.config.listen.port));
        info!(
            listen = %local_addr,
            target = %format!("{}:{}", self.config.target.host, self.config.target.port),
            "parley listening"
        );

        loop {
            let (client_socket, client_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "failed to accept connection, continuing");
                    continue;
                }
            };

            let modules_client = self.modules_client.clone();
            let modules_server = self.modules_server.clone();
            let target_host = self.config.target.host.clone();
            let target_port = self.config.target.port;
            let inbound_acceptor = self.inbound_acceptor.clone();
            let outbound_connector = self.outbound_connector.clone();

            tokio::spawn(async move {
                Self::handle_connection(
                    client_socket,
                    client_addr,
                    target_host,
                    target_port,
                    inbound_acceptor,
                    outbound_connector,
                    modules_client,
                    modules_server,
                )
                .await;
            });
        }
    }

    fn bind(&self) -> Result<TcpListener, RelayError> {
        let addr: SocketAddr = format!("{}:{}", self.config.listen.host, self.config.listen.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| {
                RelayError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
            })?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)
            .map_err(RelayError::Bind)?;
        socket.set_reuse_address(true).map_err(RelayError::Bind)?;
        socket.set_nonblocking(true).map_err(RelayError::Bind)?;
        socket.bind(&addr.into()).map_err(RelayError::Bind)?;
        socket.listen(LISTEN_BACKLOG).map_err(RelayError::Bind)?;

        TcpListener::from_std(socket.into()).map_err(RelayError::Bind)
    }

    /// One inbound connection end to end: open the matching outbound
    /// connection, negotiate TLS on both sides (spec §4.5.1), then hand
    /// off to the readiness loop.
    #[allow(clippy::too_many_arguments)]
    async fn handle_connection(
        client_socket: TcpStream,
        client_addr: SocketAddr,
        target_host: String,
        target_port: u16,
        inbound_acceptor: Option<TlsAcceptor>,
        outbound_connector: Option<TlsConnector>,
        modules_client: Arc<ModuleRegistry>,
        modules_server: Arc<ModuleRegistry>,
    ) {
        if let Err(e) = client_socket.set_nodelay(true) {
            warn!(peer = %client_addr, error = %e, "failed to set TCP_NODELAY");
        }

        let upstream_socket = match TcpStream::connect((target_host.as_str(), target_port)).await
        {
            Ok(s) => s,
            Err(e) => {
                let e = RelayError::Connect(e);
                warn!(peer = %client_addr, target = %target_host, error = %e, "dropping inbound connection");
                return;
            }
        };
        if let Err(e) = upstream_socket.set_nodelay(true) {
            warn!(target = %target_host, error = %e, "failed to set TCP_NODELAY");
        }
        let upstream_addr = match upstream_socket.peer_addr() {
            Ok(a) => a,
            Err(e) => {
                error!(error = %e, "could not read upstream peer address");
                return;
            }
        };

        let client: BoxedStream = match inbound_acceptor {
            Some(acceptor) => match acceptor.accept(client_socket).await {
                Ok(s) => Box::new(s),
                Err(e) => {
                    let e = RelayError::Handshake(e);
                    warn!(peer = %client_addr, error = %e, "closing both sockets");
                    return;
                }
            },
            None => Box::new(client_socket),
        };

        let upstream: BoxedStream = match outbound_connector {
            Some(connector) => {
                let name = match tls::server_name(&target_host) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(error = %e, "invalid target host for TLS SNI");
                        return;
                    }
                };
                match connector.connect(name, upstream_socket).await {
                    Ok(s) => Box::new(s),
                    Err(e) => {
                        let e = RelayError::Handshake(e);
                        warn!(peer = %upstream_addr, error = %e, "closing both sockets");
                        return;
                    }
                }
            }
            None => Box::new(upstream_socket),
        };

        info!(client = %client_addr, upstream = %upstream_addr, "connection established");

        let ctx = ConnectionContext::new(client_addr, upstream_addr);
        if let Err(e) = RelayEngine::run(client, upstream, ctx, modules_client, modules_server).await {
            warn!(client = %client_addr, upstream = %upstream_addr, error = %e, "relay ended with error");
        }
    }

    pub fn log_sink(&self) -> &Arc<LogSink> {
        &self.log_sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::config::{ListenConfig, TargetConfig};
    use std::path::PathBuf;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::{timeout, Duration};

    fn test_config(target_port: u16, logs_dir: PathBuf) -> Config {
        Config {
            listen: ListenConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            target: TargetConfig {
                host: "127.0.0.1".to_string(),
                port: target_port,
            },
            inbound_tls: None,
            outbound_tls: None,
            modules_client_dir: PathBuf::from("modules_client/enabled"),
            modules_server_dir: PathBuf::from("modules_server/enabled"),
            logs_dir,
        }
    }

    /// An unused loopback port, suitable for a guaranteed `ConnectError`.
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
        // dropped here: nothing is listening on this port anymore.
    }

    /// S5: an outbound connect failure is logged and the inbound socket
    /// closed, but the broker keeps accepting subsequent connections.
    #[tokio::test]
    async fn connect_failure_does_not_stop_the_accept_loop() {
        let logs = tempfile::tempdir().unwrap();
        let target_port = closed_port().await;
        let config = test_config(target_port, logs.path().to_path_buf());

        let broker =
            ConnectionBroker::new(config, ModuleRegistry::empty(), ModuleRegistry::empty()).unwrap();
        let listener = broker.bind().unwrap();
        let listen_addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let _ = broker.serve(listener).await;
        });

        // First connection: upstream refuses, the broker should close the
        // inbound socket without crashing.
        let mut first = timeout(Duration::from_secs(1), TcpStream::connect(listen_addr))
            .await
            .unwrap()
            .unwrap();
        let mut buf = [0u8; 16];
        let n = timeout(Duration::from_secs(1), first.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0, "inbound socket should be closed after connect failure");

        // The broker must still be accepting.
        let second = timeout(Duration::from_secs(1), TcpStream::connect(listen_addr)).await;
        assert!(second.is_ok());
    }

    /// S1: echo upstream, no modules, no TLS.
    #[tokio::test]
    async fn echo_upstream_relays_both_directions() {
        let logs = tempfile::tempdir().unwrap();

        let upstream_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_port = upstream_listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut sock, _)) = upstream_listener.accept().await {
                let mut buf = [0u8; 64];
                if let Ok(n) = sock.read(&mut buf).await {
                    assert_eq!(&buf[..n], b"HELLO\n");
                    let _ = sock.write_all(b"HI\n").await;
                }
            }
        });

        let config = test_config(upstream_port, logs.path().to_path_buf());
        let broker =
            ConnectionBroker::new(config, ModuleRegistry::empty(), ModuleRegistry::empty()).unwrap();
        let listener = broker.bind().unwrap();
        let listen_addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = broker.serve(listener).await;
        });

        let mut client = timeout(Duration::from_secs(1), TcpStream::connect(listen_addr))
            .await
            .unwrap()
            .unwrap();
        client.write_all(b"HELLO\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = timeout(Duration::from_secs(1), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"HI\n");
    }
}

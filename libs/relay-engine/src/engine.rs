//! The readiness loop (spec §4.5.2–§4.5.4) — the heart of the relay.
//!
//! Grounded on `libs/network/src/transports/tcp.rs` for the tokio
//! `AsyncReadExt`/`AsyncWriteExt` idiom and `tracing` field style, and on
//! `original_source/parley.py::handle_client`'s `select.select` loop for
//! the exact control flow, translated to `tokio::select!`.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use relay_core::{ConnectionContext, Direction, MessageContext, ModuleRegistry, RelayError};

/// Reference chunk size from spec §4.5.2.
const CHUNK_SIZE: usize = 4096;

/// A half-duplex endpoint the engine drives: a plain `TcpStream` or
/// either side of a `tokio_rustls` `TlsStream`. Never cloned or shared —
/// each worker owns its pair exclusively (spec §4.4, §5).
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Boxed so the engine isn't generic over which side (if either) is
/// TLS-wrapped; built once per connection by the broker after TLS
/// negotiation completes.
pub type BoxedStream = Box<dyn AsyncStream>;

/// Drives one connection's bidirectional relay until both peers close.
pub struct RelayEngine;

impl RelayEngine {
    /// Run the readiness loop for one connection. TLS, if configured, has
    /// already been negotiated on both `client` and `upstream` by the
    /// caller (spec §4.5.1 happens entirely before this call).
    pub async fn run(
        mut client: BoxedStream,
        mut upstream: BoxedStream,
        mut ctx: ConnectionContext,
        modules_client: Arc<ModuleRegistry>,
        modules_server: Arc<ModuleRegistry>,
    ) -> Result<(), RelayError> {
        let mut client_open = true;
        let mut upstream_open = true;

        while client_open || upstream_open {
            tokio::select! {
                result = read_message(&mut client), if client_open => {
                    match result.map_err(RelayError::Stream)? {
                        Some(payload) => {
                            let message_num = ctx.next_counter(Direction::ClientToServer);
                            let msg_ctx = MessageContext::new(
                                message_num,
                                ctx.client_endpoint,
                                ctx.upstream_endpoint,
                            );
                            let out = modules_client.run_pipeline(&msg_ctx, payload);
                            write_message(&mut upstream, &out).await.map_err(RelayError::Stream)?;
                        }
                        None => {
                            debug!(peer = %ctx.client_endpoint, "client half-closed");
                            client_open = false;
                        }
                    }
                }
                result = read_message(&mut upstream), if upstream_open => {
                    match result.map_err(RelayError::Stream)? {
                        Some(payload) => {
                            let message_num = ctx.next_counter(Direction::ServerToClient);
                            let msg_ctx = MessageContext::new(
                                message_num,
                                ctx.upstream_endpoint,
                                ctx.client_endpoint,
                            );
                            let out = modules_server.run_pipeline(&msg_ctx, payload);
                            write_message(&mut client, &out).await.map_err(RelayError::Stream)?;
                        }
                        None => {
                            debug!(peer = %ctx.upstream_endpoint, "upstream half-closed");
                            upstream_open = false;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// One message read (spec §4.5.2): accumulate fixed-size chunks until a
/// short read signals the OS buffer is drained for now, or a zero-byte
/// read signals half-close. Returns `None` only when no bytes were
/// collected — a short read that *did* collect bytes is a message.
async fn read_message(stream: &mut BoxedStream) -> io::Result<Option<Vec<u8>>> {
    let mut full = Vec::new();
    loop {
        let mut chunk = [0u8; CHUNK_SIZE];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        full.extend_from_slice(&chunk[..n]);
        if n < CHUNK_SIZE {
            break;
        }
    }
    Ok(if full.is_empty() { None } else { Some(full) })
}

/// Write the final post-pipeline payload to the opposite peer. Any
/// failure (SPEC_FULL §9's resolved Open Question 3) terminates the
/// worker rather than being silently dropped.
async fn write_message(stream: &mut BoxedStream, payload: &[u8]) -> io::Result<()> {
    stream.write_all(payload).await?;
    stream.flush().await
}

//! Byte-repr display modules, grounded directly on
//! `original_source/modules_client/enabled/Display_Client_Python.py` and
//! `modules_server/enabled/Display_Server_Python.py` — the two modules
//! `original_source/` ships enabled by default.

use relay_core::{register_module, Module, MessageContext};

fn repr_bytes(payload: &[u8]) -> String {
    let mut out = String::with_capacity(payload.len() + 2);
    out.push('b');
    out.push('"');
    for &byte in payload {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\x{:02x}", byte)),
        }
    }
    out.push('"');
    out
}

/// Prints client→server payloads to stdout and the log sink, unchanged.
pub struct DisplayClient;

impl DisplayClient {
    pub fn new() -> Box<dyn Module> {
        Box::new(Self)
    }
}

impl Module for DisplayClient {
    fn description(&self) -> &'static str {
        "print binary data on the screen from the client"
    }

    fn transform(&self, ctx: &MessageContext, payload: Vec<u8>) -> Vec<u8> {
        let header = format!(
            "[{}:{}->{}:{}] {} ------- Client to Server ({}) -------",
            ctx.src_addr,
            ctx.src_port,
            ctx.dst_addr,
            ctx.dst_port,
            chrono::Local::now().to_rfc3339(),
            ctx.message_num
        );
        let full_output = format!("{}\n{}", header, repr_bytes(&payload));

        println!("{full_output}");
        if let Some(sink) = relay_core::global_log_sink() {
            sink.write(ctx.log_tuple(), &full_output);
        }

        payload
    }
}

register_module!("display_client", DisplayClient::new);

/// Prints server→client payloads to stdout and the log sink, unchanged.
pub struct DisplayServer;

impl DisplayServer {
    pub fn new() -> Box<dyn Module> {
        Box::new(Self)
    }
}

impl Module for DisplayServer {
    fn description(&self) -> &'static str {
        "print binary data on the screen from the server"
    }

    fn transform(&self, ctx: &MessageContext, payload: Vec<u8>) -> Vec<u8> {
        let header = format!(
            "[{}:{}->{}:{}] {} ------- Server to Client ({}) -------",
            ctx.src_addr,
            ctx.src_port,
            ctx.dst_addr,
            ctx.dst_port,
            chrono::Local::now().to_rfc3339(),
            ctx.message_num
        );
        let full_output = format!("{}\n{}", header, repr_bytes(&payload));

        println!("{full_output}");
        if let Some(sink) = relay_core::global_log_sink() {
            // Log routed from the client's perspective: swap src/dst.
            sink.write(ctx.log_tuple().swapped(), &full_output);
        }

        payload
    }
}

register_module!("display_server", DisplayServer::new);

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn ctx() -> MessageContext {
        let src: SocketAddr = "127.0.0.1:4444".parse().unwrap();
        let dst: SocketAddr = "127.0.0.1:80".parse().unwrap();
        MessageContext::new(1, src, dst)
    }

    #[test]
    fn repr_bytes_escapes_non_printables() {
        assert_eq!(repr_bytes(b"ab\x00c"), "b\"ab\\x00c\"");
        assert_eq!(repr_bytes(b"quote\""), "b\"quote\\\"\"");
    }

    #[test]
    fn display_modules_return_payload_unchanged() {
        let client = DisplayClient;
        let server = DisplayServer;
        let payload = b"HELLO".to_vec();

        assert_eq!(client.transform(&ctx(), payload.clone()), payload);
        assert_eq!(server.transform(&ctx(), payload.clone()), payload);
    }
}

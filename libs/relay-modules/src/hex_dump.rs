//! Hex-dump display modules, grounded on
//! `original_source/modules_client/disabled/Display_Client_HEX.py` (and
//! the server-side counterpart implied by `modules_server/disabled/Display_Server_HEX.py`).
//! Shipped here as compiled-in alternates to [`crate::display`]'s byte-repr
//! dump; not enabled by default (no `.module` marker ships for them),
//! matching the "disabled" state of their originals.

use relay_core::{register_module, Module, MessageContext};

fn hex_dump(payload: &[u8]) -> String {
    let mut lines = Vec::with_capacity(payload.len() / 16 + 1);
    for chunk in payload.chunks(16) {
        let hex_part = chunk
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" ");
        let ascii_part: String = chunk
            .iter()
            .map(|&b| if (0x20..=0x7e).contains(&b) { b as char } else { '.' })
            .collect();
        lines.push(format!("{:<48} | {}", hex_part, ascii_part));
    }
    lines.join("\n")
}

/// Hex-dumps client→server payloads to stdout and the log sink, unchanged.
pub struct HexDumpClient;

impl HexDumpClient {
    pub fn new() -> Box<dyn Module> {
        Box::new(Self)
    }
}

impl Module for HexDumpClient {
    fn description(&self) -> &'static str {
        "print HEX data on the screen from the client in hex dump format"
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
        let full_output = format!("{}\n{}", header, hex_dump(&payload));

        println!("{full_output}");
        if let Some(sink) = relay_core::global_log_sink() {
            sink.write(ctx.log_tuple(), &full_output);
        }

        payload
    }
}

register_module!("hex_dump_client", HexDumpClient::new);

/// Hex-dumps server→client payloads to stdout and the log sink, unchanged.
pub struct HexDumpServer;

impl HexDumpServer {
    pub fn new() -> Box<dyn Module> {
        Box::new(Self)
    }
}

impl Module for HexDumpServer {
    fn description(&self) -> &'static str {
        "print HEX data on the screen from the server in hex dump format"
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
        let full_output = format!("{}\n{}", header, hex_dump(&payload));

        println!("{full_output}");
        if let Some(sink) = relay_core::global_log_sink() {
            sink.write(ctx.log_tuple().swapped(), &full_output);
        }

        payload
    }
}

register_module!("hex_dump_server", HexDumpServer::new);

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
    fn hex_dump_formats_sixteen_bytes_per_line() {
        let dump = hex_dump(b"0123456789abcdefg");
        let mut lines = dump.lines();
        let first = lines.next().unwrap();
        assert!(first.starts_with("30 31 32 33 34 35 36 37 38 39 61 62 63 64 65 66"));
        assert!(first.ends_with("| 0123456789abcdef"));

        let second = lines.next().unwrap();
        let (hex_part, ascii_part) = second.split_once('|').unwrap();
        assert_eq!(hex_part.trim(), "67");
        assert_eq!(ascii_part.trim(), "g");
    }

    #[test]
    fn hex_dump_modules_return_payload_unchanged() {
        let client = HexDumpClient;
        let server = HexDumpServer;
        let payload = b"\x00\x01\xffHELLO".to_vec();

        assert_eq!(client.transform(&ctx(), payload.clone()), payload);
        assert_eq!(server.transform(&ctx(), payload.clone()), payload);
    }
}

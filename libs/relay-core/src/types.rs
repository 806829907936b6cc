//! Core data model (spec §3): connection state, message context, and the
//! routing tuple that names a log file.

use std::net::{IpAddr, SocketAddr};

/// Direction of a message relative to the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client → server (upstream-bound).
    ClientToServer,
    /// Server → client (client-bound).
    ServerToClient,
}

/// Per-connection state that lives for the duration of one relayed
/// connection. Counters are strictly monotonic and independent per
/// direction (spec §3 invariants).
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub client_endpoint: SocketAddr,
    pub upstream_endpoint: SocketAddr,
    client_side_counter: u64,
    server_side_counter: u64,
}

impl ConnectionContext {
    pub fn new(client_endpoint: SocketAddr, upstream_endpoint: SocketAddr) -> Self {
        Self {
            client_endpoint,
            upstream_endpoint,
            client_side_counter: 0,
            server_side_counter: 0,
        }
    }

    /// Increment-then-use: the first message of a direction is numbered 1
    /// (spec §4.5.4).
    pub fn next_counter(&mut self, direction: Direction) -> u64 {
        let counter = match direction {
            Direction::ClientToServer => &mut self.client_side_counter,
            Direction::ServerToClient => &mut self.server_side_counter,
        };
        *counter += 1;
        *counter
    }
}

/// Everything a `Module::transform` call needs besides the payload itself
/// (spec §4.2's `(message_num, src_addr, src_port, dst_addr, dst_port)`).
#[derive(Debug, Clone, Copy)]
pub struct MessageContext {
    pub message_num: u64,
    pub src_addr: IpAddr,
    pub src_port: u16,
    pub dst_addr: IpAddr,
    pub dst_port: u16,
}

impl MessageContext {
    pub fn new(
        message_num: u64,
        src: SocketAddr,
        dst: SocketAddr,
    ) -> Self {
        Self {
            message_num,
            src_addr: src.ip(),
            src_port: src.port(),
            dst_addr: dst.ip(),
            dst_port: dst.port(),
        }
    }

    /// The routing tuple used to name a log file (spec §3, §4.3).
    pub fn log_tuple(&self) -> FourTuple {
        FourTuple {
            src_addr: self.src_addr,
            src_port: self.src_port,
            dst_addr: self.dst_addr,
            dst_port: self.dst_port,
        }
    }
}

/// A routing tuple. Client-direction records and server-direction records
/// for the same flow deliberately swap src/dst so both land in one file
/// named from the client's perspective (spec §3, §8 property 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourTuple {
    pub src_addr: IpAddr,
    pub src_port: u16,
    pub dst_addr: IpAddr,
    pub dst_port: u16,
}

impl FourTuple {
    pub fn file_stem(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.src_addr, self.src_port, self.dst_addr, self.dst_port
        )
    }

    /// Swap src/dst. A server-direction module calls this on its message
    /// context's tuple so that both directions of one flow land in the
    /// same log file, named from the client's perspective (spec §3, §8
    /// property 6).
    pub fn swapped(&self) -> FourTuple {
        FourTuple {
            src_addr: self.dst_addr,
            src_port: self.dst_port,
            dst_addr: self.src_addr,
            dst_port: self.src_port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_one_and_are_independent() {
        let mut ctx = ConnectionContext::new(
            "127.0.0.1:1".parse().unwrap(),
            "127.0.0.1:2".parse().unwrap(),
        );
        assert_eq!(ctx.next_counter(Direction::ClientToServer), 1);
        assert_eq!(ctx.next_counter(Direction::ClientToServer), 2);
        assert_eq!(ctx.next_counter(Direction::ServerToClient), 1);
        assert_eq!(ctx.next_counter(Direction::ClientToServer), 3);
    }

    #[test]
    fn log_tuple_stem_matches_spec_format() {
        let ctx = MessageContext::new(
            1,
            "10.0.0.1:4444".parse().unwrap(),
            "10.0.0.2:80".parse().unwrap(),
        );
        assert_eq!(ctx.log_tuple().file_stem(), "10.0.0.1-4444-10.0.0.2-80");
    }

    #[test]
    fn swapped_tuple_reverses_src_and_dst() {
        let ctx = MessageContext::new(
            1,
            "10.0.0.2:80".parse().unwrap(),
            "10.0.0.1:4444".parse().unwrap(),
        );
        assert_eq!(
            ctx.log_tuple().swapped().file_stem(),
            "10.0.0.1-4444-10.0.0.2-80"
        );
    }
}

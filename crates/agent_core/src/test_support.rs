//! In-memory duplex "peer" used by unit tests across this crate to drive a
//! [`crate::transport::Transport`] (or a [`crate::client::Client`] built on
//! one) without a real child process, mirroring the teacher crate's own
//! `mcp::test_support` harness.
#![cfg(test)]

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

use crate::transport::Transport;

pub(crate) struct Peer {
    write_half: WriteHalf<DuplexStream>,
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
}

impl Peer {
    pub(crate) async fn send(&mut self, value: Value) {
        let mut text = serde_json::to_string(&value).expect("serialize");
        text.push('\n');
        self.write_half
            .write_all(text.as_bytes())
            .await
            .expect("write to peer pipe");
    }

    pub(crate) async fn send_raw(&mut self, line: &str) {
        let mut text = line.to_string();
        text.push('\n');
        self.write_half
            .write_all(text.as_bytes())
            .await
            .expect("write to peer pipe");
    }

    pub(crate) async fn recv(&mut self) -> Value {
        let line = self
            .lines
            .next_line()
            .await
            .expect("read from peer pipe")
            .expect("peer pipe closed");
        serde_json::from_str(&line).expect("peer received non-JSON line")
    }
}

/// Spawns a `Transport` wired to an in-memory duplex pipe, handing back the
/// peer end so a test can act as the "other side" of the wire.
pub(crate) fn duplex_transport(max_frame_len: usize) -> (Transport, Peer) {
    duplex_transport_with_capacity(max_frame_len, 8 * 1024 * 1024)
}

pub(crate) fn duplex_transport_with_capacity(
    max_frame_len: usize,
    capacity: usize,
) -> (Transport, Peer) {
    let (client_io, peer_io) = tokio::io::duplex(capacity);
    let (client_read, client_write) = tokio::io::split(client_io);
    let (peer_read, peer_write) = tokio::io::split(peer_io);
    let transport = Transport::spawn_io(client_read, client_write, max_frame_len);
    let peer = Peer {
        write_half: peer_write,
        lines: BufReader::new(peer_read).lines(),
    };
    (transport, peer)
}

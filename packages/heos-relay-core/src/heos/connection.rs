//! TCP connection to a HEOS device.
//!
//! The socket is split on connect: the write half is owned by a dedicated
//! writer task fed through an unbounded channel, so callers never block and
//! commands reach the device in the order they were handed off. The read half
//! is exposed as an [`EventReader`] yielding annotated envelopes.

use std::net::SocketAddr;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};

use super::traits::CommandSink;
use super::{EventEnvelope, HeosCommand, HeosError, HeosResult};
use crate::protocol_constants::{
    HEOS_LINE_TERMINATOR, MAX_HEOS_LINE_BYTES, UPSTREAM_CONNECT_TIMEOUT_SECS,
};

/// Write handle for a live upstream connection.
///
/// Dropping the handle stops the writer task, which half-closes the socket.
pub struct HeosConnection {
    addr: SocketAddr,
    tx: mpsc::UnboundedSender<HeosCommand>,
}

impl HeosConnection {
    /// Connects to a device and returns the write handle and event reader.
    pub async fn connect(addr: SocketAddr) -> HeosResult<(Self, EventReader)> {
        let stream = timeout(
            Duration::from_secs(UPSTREAM_CONNECT_TIMEOUT_SECS),
            TcpStream::connect(addr),
        )
        .await
        .map_err(|_| HeosError::ConnectTimeout(addr.to_string()))??;

        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("[Upstream] Failed to set TCP_NODELAY on {}: {}", addr, e);
        }

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(addr, write_half, rx));

        log::info!("[Upstream] Connected to {}", addr);
        Ok((Self { addr, tx }, EventReader::new(read_half)))
    }

    /// Address of the connected device.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl CommandSink for HeosConnection {
    fn write(&self, command: HeosCommand) -> HeosResult<()> {
        self.tx.send(command).map_err(|_| HeosError::ConnectionClosed)
    }
}

async fn write_loop(
    addr: SocketAddr,
    mut half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<HeosCommand>,
) {
    while let Some(command) = rx.recv().await {
        log::debug!("[Upstream] -> {}", command);
        if let Err(e) = half.write_all(command.encode().as_bytes()).await {
            log::warn!("[Upstream] Write to {} failed: {}", addr, e);
            break;
        }
    }
    let _ = half.shutdown().await;
    log::debug!("[Upstream] Writer for {} stopped", addr);
}

/// Read side of an upstream connection.
///
/// Lines are framed as raw bytes so a line that is not valid UTF-8 surfaces
/// as a per-line decode error instead of breaking the stream.
pub struct EventReader {
    lines: FramedRead<OwnedReadHalf, AnyDelimiterCodec>,
}

impl EventReader {
    fn new(half: OwnedReadHalf) -> Self {
        Self {
            lines: FramedRead::new(
                half,
                AnyDelimiterCodec::new_with_max_length(
                    b"\n".to_vec(),
                    HEOS_LINE_TERMINATOR.as_bytes().to_vec(),
                    MAX_HEOS_LINE_BYTES,
                ),
            ),
        }
    }

    /// Returns the next record, or `None` once the device closes the connection.
    ///
    /// Decode failures are returned per line; the reader stays usable after them.
    pub async fn next(&mut self) -> Option<HeosResult<EventEnvelope>> {
        loop {
            match self.lines.next().await? {
                Ok(line) if line.iter().all(u8::is_ascii_whitespace) => continue,
                Ok(line) => return Some(EventEnvelope::from_upstream_bytes(&line)),
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                    return Some(Err(HeosError::Framing(format!(
                        "line longer than {} bytes",
                        MAX_HEOS_LINE_BYTES
                    ))))
                }
                Err(AnyDelimiterCodecError::Io(e)) => return Some(Err(HeosError::Io(e))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn writes_commands_in_order_and_reads_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let device = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();

            let first = lines.next_line().await.unwrap().unwrap();
            let second = lines.next_line().await.unwrap().unwrap();

            write
                .write_all(b"{\"heos\": {\"command\": \"event/player_state_changed\", \"message\": \"pid=5&state=pause\"}}\r\n")
                .await
                .unwrap();
            write.write_all(b"garbage\r\n\r\n").await.unwrap();
            write
                .write_all(b"{\"heos\": {\"command\": \"player/get_volume\", \"result\": \"success\", \"message\": \"pid=5&level=12\"}}\r\n")
                .await
                .unwrap();
            (first, second)
        });

        let (conn, mut reader) = HeosConnection::connect(addr).await.unwrap();
        conn.write(HeosCommand::new("player", "get_players")).unwrap();
        conn.write(HeosCommand::new("player", "get_volume").param("pid", "5"))
            .unwrap();

        let first = reader.next().await.unwrap().unwrap();
        assert!(first.command().is("event", "player_state_changed"));
        assert_eq!(first.heos.message.get("state"), Some("pause"));

        assert!(matches!(
            reader.next().await,
            Some(Err(HeosError::Decode(_)))
        ));

        let third = reader.next().await.unwrap().unwrap();
        assert!(third.command().is("player", "get_volume"));

        let (first_line, second_line) = device.await.unwrap();
        assert_eq!(first_line, "heos://player/get_players");
        assert_eq!(second_line, "heos://player/get_volume?pid=5");

        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn non_utf8_line_is_skippable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let device = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"{\"heos\": {\"command\": \"event/x\", \"message\": \"a=\xff\xfe\"}}\r\n")
                .await
                .unwrap();
            socket
                .write_all(b"{\"heos\": {\"command\": \"event/player_state_changed\", \"message\": \"pid=5&state=play\"}}\r\n")
                .await
                .unwrap();
        });

        let (_conn, mut reader) = HeosConnection::connect(addr).await.unwrap();

        assert!(matches!(
            reader.next().await,
            Some(Err(HeosError::Decode(_)))
        ));
        let next = reader.next().await.unwrap().unwrap();
        assert!(next.command().is("event", "player_state_changed"));
        assert_eq!(next.heos.message.get("state"), Some("play"));

        device.await.unwrap();
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn write_after_writer_stops_reports_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let conn = HeosConnection {
            addr: "127.0.0.1:1255".parse().unwrap(),
            tx,
        };
        assert!(matches!(
            conn.write(HeosCommand::new("player", "get_players")),
            Err(HeosError::ConnectionClosed)
        ));
    }
}

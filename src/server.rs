//! Inbound thermostat state stream.

use crate::events::{emit, ConnectionChange, EventSender, SimEvent};
use crate::protocol::{self, CodecError, CodecErrorKind, MAX_LINE_SIZE};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Blank,
    Accepted,
    Rejected(CodecErrorKind),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub accepted: u64,
    pub rejected: u64,
}

/// Listens for devices reporting their state as JSON lines.
pub struct TelemetryServer {
    listener: TcpListener,
    events: EventSender,
}

impl TelemetryServer {
    pub async fn bind(addr: &str, events: EventSender) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("🌐 Thermostat state server listening on {}", listener.local_addr()?);
        Ok(Self { listener, events })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    info!("🔗 Device connected: {}", peer);
                    emit(
                        &self.events,
                        SimEvent::Connection {
                            peer,
                            change: ConnectionChange::Connected,
                        },
                    );
                    tokio::spawn(handle_client(stream, peer, self.events.clone()));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

async fn handle_client(stream: TcpStream, peer: SocketAddr, events: EventSender) {
    match serve_lines(BufReader::new(stream), peer, &events).await {
        Ok(stats) => debug!(%peer, accepted = stats.accepted, rejected = stats.rejected, "connection closed"),
        Err(e) => warn!("Client {} error: {}", peer, e),
    }
    emit(
        &events,
        SimEvent::Connection {
            peer,
            change: ConnectionChange::Disconnected,
        },
    );
    info!("🔌 Device {} disconnected", peer);
}

/// Decode every line from `reader` until EOF. Bad lines are reported and
/// skipped; only an I/O error ends the stream early.
///
/// At most [`MAX_LINE_SIZE`] bytes of a line are buffered. Longer lines are
/// drained up to their newline and rejected as too large.
pub async fn serve_lines<R>(mut reader: R, peer: SocketAddr, events: &EventSender) -> io::Result<ConnectionStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ConnectionStats::default();
    let mut buf = Vec::with_capacity(512);

    loop {
        buf.clear();
        let limit = (MAX_LINE_SIZE + 1) as u64;
        if (&mut reader).take(limit).read_until(b'\n', &mut buf).await? == 0 {
            return Ok(stats);
        }

        let outcome = if buf.len() > MAX_LINE_SIZE && buf.last() != Some(&b'\n') {
            let size = buf.len() + skip_line(&mut reader).await?;
            reject(
                CodecError::MessageTooLarge {
                    size,
                    max: MAX_LINE_SIZE,
                },
                peer,
                events,
            )
        } else {
            handle_line(&String::from_utf8_lossy(&buf), peer, events)
        };

        match outcome {
            LineOutcome::Blank => {}
            LineOutcome::Accepted => stats.accepted += 1,
            LineOutcome::Rejected(_) => stats.rejected += 1,
        }
    }
}

/// Consume through the next newline (or EOF) without keeping the bytes.
async fn skip_line<R>(reader: &mut R) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut skipped = 0;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(skipped);
        }

        match available.iter().position(|&b| b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(skipped + end + 1);
            }
            None => {
                let len = available.len();
                reader.consume(len);
                skipped += len;
            }
        }
    }
}

pub fn handle_line(line: &str, peer: SocketAddr, events: &EventSender) -> LineOutcome {
    if line.trim().is_empty() {
        return LineOutcome::Blank;
    }

    match protocol::decode_state(line) {
        Ok(record) => {
            debug!(%peer, current = record.value().current_temp, "state received");
            emit(events, SimEvent::StateReceived { peer, record });
            LineOutcome::Accepted
        }
        Err(error) => reject(error, peer, events),
    }
}

fn reject(error: CodecError, peer: SocketAddr, events: &EventSender) -> LineOutcome {
    warn!(%peer, "rejected line: {}", error);
    let kind = error.kind();
    emit(events, SimEvent::ParseError { peer, error });
    LineOutcome::Rejected(kind)
}

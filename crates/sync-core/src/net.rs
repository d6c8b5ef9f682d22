//! Concrete TCP implementations of the pipeline's transport traits.
//!
//! Both Master and Slave configure their own Time Controller and talk
//! to their own co-located DLT the same way (spec.md §2), so the real
//! socket plumbing lives once here instead of once per service binary.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use socket2::SockRef;

use tc_scpi::dlt::DltError;
use tc_scpi::scpi::TcError;

use crate::models::ChannelId;
use crate::pipeline::{DltLink, StreamSourceFactory, TcLink};

/// Every TC/DLT request/reply round trip times out after this long
/// (spec.md §4.1).
const TIMEOUT: Duration = Duration::from_secs(5);

/// Every socket in this protocol closes with a zero linger (spec.md
/// §4.1, §4.6): the FIN/RST goes out immediately on drop rather than
/// lingering with unsent data, since a stalled TC/DLT peer has nothing
/// worth waiting to flush.
fn set_linger_zero(stream: &TcpStream) {
    let _ = SockRef::from(stream).set_linger(Some(Duration::ZERO));
}

struct LineSession {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write_half: OwnedWriteHalf,
}

impl LineSession {
    async fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let _ = stream.set_nodelay(true);
        set_linger_zero(&stream);
        let (read_half, write_half) = stream.into_split();
        Ok(Self { lines: BufReader::new(read_half).lines(), write_half })
    }

    /// `Ok(None)` covers both a clean close and a round trip that never
    /// replies within [`TIMEOUT`]; callers map that to their own
    /// timeout error variant.
    async fn request(&mut self, command: &str) -> std::io::Result<Option<String>> {
        self.write_half.write_all(command.as_bytes()).await?;
        self.write_half.write_all(b"\n").await?;
        match tokio::time::timeout(TIMEOUT, self.lines.next_line()).await {
            Ok(Ok(line)) => Ok(line),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }
}

/// A [`TcLink`] talking SCPI tokens to the Time Controller over a plain
/// TCP socket.
pub struct TcpTcLink(LineSession);

impl TcpTcLink {
    pub async fn connect(addr: &str) -> std::io::Result<Self> {
        Ok(Self(LineSession::connect(addr).await?))
    }
}

impl TcLink for TcpTcLink {
    async fn send(&mut self, command: &str) -> Result<String, TcError> {
        match self.0.request(command).await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(TcError::Timeout(command.to_owned())),
            Err(e) => Err(TcError::Io(e.to_string())),
        }
    }
}

/// A [`DltLink`] talking the JSON command protocol to the co-located
/// DLT over a plain TCP socket.
pub struct TcpDltLink(LineSession);

impl TcpDltLink {
    pub async fn connect(addr: &str) -> std::io::Result<Self> {
        Ok(Self(LineSession::connect(addr).await?))
    }
}

impl DltLink for TcpDltLink {
    async fn send(&mut self, command: &str) -> Result<String, DltError> {
        match self.0.request(command).await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(DltError::Timeout(command.to_owned())),
            Err(e) => Err(DltError::Io(e.to_string())),
        }
    }
}

/// Opens the per-channel TCP listener the DLT's `start-stream` endpoint
/// connects back to (spec.md §4.2.2: "a per-channel, well-known local
/// endpoint derived from `c`").
pub struct TcpStreamSources {
    pub bind_address: String,
    pub base_port: u16,
}

impl StreamSourceFactory for TcpStreamSources {
    type Source = OwnedReadHalf;

    async fn open(&mut self, channel: ChannelId) -> std::io::Result<Self::Source> {
        let port = self.base_port + u16::try_from(channel).unwrap_or(0);
        let listener = TcpListener::bind((self.bind_address.as_str(), port)).await?;
        let (stream, peer) = listener.accept().await?;
        tracing::debug!(channel, %peer, port, "dlt connected to per-channel stream socket");
        set_linger_zero(&stream);
        let (read_half, _write_half) = stream.into_split();
        Ok(read_half)
    }
}

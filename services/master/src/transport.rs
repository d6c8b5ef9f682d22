//! Master-side transport: the control link (every control envelope kind
//! multiplexed over one length-delimited socket) and the file link
//! (opaque byte payloads). Master binds both; the Slave connects out
//! (spec.md §4.1).

use std::time::Duration;

use socket2::SockRef;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use sync_wire::{PeerMessage, SequenceCounter, WireError, recv_message, send_message};

/// Every socket operation times out after this long (spec.md §4.1).
pub const LINK_TIMEOUT: Duration = Duration::from_secs(5);

/// Every socket closes with a zero linger (spec.md §4.1, §4.6): drop the
/// connection immediately on shutdown rather than lingering on unsent
/// bytes to a peer that may already be gone.
fn set_linger_zero(stream: &TcpStream) {
    let _ = SockRef::from(stream).set_linger(Some(Duration::ZERO));
}

type ControlReader = FramedRead<OwnedReadHalf, LengthDelimitedCodec>;
type ControlWriter = FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>;

/// The accepted control connection from the Slave, carrying trigger,
/// sync, command, and status envelopes over one socket (spec.md §4.1
/// describes these as logical links, not separate sockets).
pub struct ControlLink {
    reader: ControlReader,
    writer: ControlWriter,
    sequence: SequenceCounter,
}

impl ControlLink {
    /// Bind `bind_addr` and accept exactly one Slave connection.
    /// Reconnection is not attempted (spec.md §4.1): a dropped Slave
    /// surfaces as a recoverable transport error to the caller.
    pub async fn accept(bind_addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        let (stream, peer) = listener.accept().await?;
        tracing::info!(%peer, "slave connected on control link");
        let _ = stream.set_nodelay(true);
        set_linger_zero(&stream);
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: FramedRead::new(read_half, LengthDelimitedCodec::new()),
            writer: FramedWrite::new(write_half, LengthDelimitedCodec::new()),
            sequence: SequenceCounter::new(),
        })
    }

    pub async fn send(&mut self, msg: &PeerMessage) -> Result<(), WireError> {
        send_message(&mut self.writer, msg).await
    }

    /// Receive the next envelope, bounded by [`LINK_TIMEOUT`]. A timeout
    /// is reported the same as `Ok(None)`: the caller retries its own
    /// wait loop rather than treating a single slow tick as fatal.
    pub async fn recv_timeout(&mut self) -> Result<Option<PeerMessage>, WireError> {
        match tokio::time::timeout(LINK_TIMEOUT, recv_message(&mut self.reader)).await {
            Ok(result) => result,
            Err(_) => Ok(None),
        }
    }

    #[must_use]
    pub fn next_sequence(&self) -> u32 {
        self.sequence.next()
    }
}

type FileReader = FramedRead<OwnedReadHalf, LengthDelimitedCodec>;

/// The accepted file connection from the Slave. Payloads here are
/// opaque bytes, not `PeerMessage` envelopes (spec.md §4.1).
pub struct FileLink {
    reader: FileReader,
}

impl FileLink {
    pub async fn accept(bind_addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        Self::accept_from(listener).await
    }

    pub(crate) async fn accept_from(listener: TcpListener) -> std::io::Result<Self> {
        let (stream, peer) = listener.accept().await?;
        tracing::info!(%peer, "slave connected on file link");
        set_linger_zero(&stream);
        let (read_half, _write_half) = stream.into_split();
        Ok(Self { reader: FramedRead::new(read_half, LengthDelimitedCodec::new()) })
    }

    /// Read one file payload. A per-recv timeout resolves to `Ok(None)`
    /// rather than an error: the file-receiver's policy is to continue
    /// its loop on a timeout, not abort it (spec.md §4.4).
    pub async fn recv_timeout(&mut self, timeout: Duration) -> std::io::Result<Option<Vec<u8>>> {
        use futures_util::StreamExt;
        match tokio::time::timeout(timeout, self.reader.next()).await {
            Ok(Some(Ok(bytes))) => Ok(Some(bytes.to_vec())),
            Ok(Some(Err(e))) => Err(e),
            Ok(None) => Ok(None),
            Err(_) => Ok(None),
        }
    }
}

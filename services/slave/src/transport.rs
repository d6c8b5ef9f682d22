//! Slave-side transport: the Slave connects out to both of the
//! Master's listening sockets (spec.md §4.1). The control link carries
//! every `PeerMessage` envelope kind; the file link carries opaque
//! bytes, one whole file per push.

use std::time::Duration;

use socket2::SockRef;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use sync_wire::{PeerMessage, SequenceCounter, WireError, recv_message, send_message};

pub const LINK_TIMEOUT: Duration = Duration::from_secs(5);

/// Every socket closes with a zero linger (spec.md §4.1, §4.6): drop the
/// connection immediately on shutdown rather than lingering on unsent
/// bytes to a peer that may already be gone.
fn set_linger_zero(stream: &TcpStream) {
    let _ = SockRef::from(stream).set_linger(Some(Duration::ZERO));
}

type ControlReader = FramedRead<OwnedReadHalf, LengthDelimitedCodec>;
type ControlWriter = FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>;

pub struct ControlLink {
    reader: ControlReader,
    writer: ControlWriter,
    sequence: SequenceCounter,
}

impl ControlLink {
    pub async fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
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

/// The outgoing file connection to the Master. One whole file is pushed
/// per [`FileLink::send`] call; the Slave never sends unsolicited
/// (spec.md §5: "MUST NOT send any file before it receives an explicit
/// request").
pub struct FileLink {
    writer: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
}

impl FileLink {
    pub async fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        set_linger_zero(&stream);
        let (_read_half, write_half) = stream.into_split();
        Ok(Self { writer: FramedWrite::new(write_half, LengthDelimitedCodec::new()) })
    }

    pub async fn send(&mut self, bytes: Vec<u8>) -> std::io::Result<()> {
        use bytes::Bytes;
        use futures_util::SinkExt;
        self.writer.send(Bytes::from(bytes)).await
    }
}

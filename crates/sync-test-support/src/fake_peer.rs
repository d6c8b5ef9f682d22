//! Thin helpers for standing up a peer-link TCP endpoint in tests,
//! wrapping `sync-wire`'s length-delimited framing so Master/Slave
//! integration tests don't each re-derive the `FramedRead`/`FramedWrite`
//! plumbing.

use tokio::net::{TcpListener, TcpStream};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

pub type PeerReader = FramedRead<OwnedReadHalf, LengthDelimitedCodec>;
pub type PeerWriter = FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>;

/// Bind a listener on a random local port and return it alongside the
/// address a peer should connect to.
pub async fn bind() -> std::io::Result<TcpListener> {
    TcpListener::bind("127.0.0.1:0").await
}

/// Accept one connection and split it into framed halves.
pub async fn accept_framed(listener: &TcpListener) -> std::io::Result<(PeerReader, PeerWriter)> {
    let (stream, _) = listener.accept().await?;
    Ok(framed(stream))
}

/// Connect to `addr` and split the stream into framed halves.
pub async fn connect_framed(addr: std::net::SocketAddr) -> std::io::Result<(PeerReader, PeerWriter)> {
    let stream = TcpStream::connect(addr).await?;
    Ok(framed(stream))
}

fn framed(stream: TcpStream) -> (PeerReader, PeerWriter) {
    let (read_half, write_half) = stream.into_split();
    (
        FramedRead::new(read_half, LengthDelimitedCodec::new()),
        FramedWrite::new(write_half, LengthDelimitedCodec::new()),
    )
}

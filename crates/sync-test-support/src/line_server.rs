//! A generic newline-delimited request/reply TCP fake, shared by
//! [`crate::fake_tc`] and [`crate::fake_dlt`]. Grounded on
//! `rt_test_utils::mock_ws_server`'s bind-to-port-0 / background
//! accept-loop shape, restyled around line framing instead of WebSocket
//! frames (spec.md §4.1: TC/DLT exchanges are request/reply over a local
//! socket, not peer envelopes).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Accepts connections on a random local port and answers every
/// newline-terminated request with whatever `respond` returns.
pub struct FakeLineServer {
    addr: SocketAddr,
    _task: tokio::task::JoinHandle<()>,
}

impl FakeLineServer {
    pub async fn start<F>(respond: F) -> std::io::Result<Self>
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let respond = Arc::new(respond);

        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let respond = respond.clone();
                tokio::spawn(async move {
                    let (read_half, mut write_half) = stream.into_split();
                    let mut lines = BufReader::new(read_half).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let reply = respond(&line);
                        if write_half.write_all(reply.as_bytes()).await.is_err() {
                            return;
                        }
                        if write_half.write_all(b"\n").await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        Ok(Self { addr, _task: task })
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

//! Connection to the aggregator, owned by one driver at a time.
//!
//! Drivers open a `Connection`, run their exchange against `&mut` it, and
//! call `close` on every exit path. Dropping it also closes the socket.

use crate::error::{peer_label, ClientError, ProtocolError};
use crate::protocol::{framing, LoadAck, QueryResult, Request};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

pub struct Connection {
    stream: TcpStream,
    peer: String,
}

impl Connection {
    /// Connect with a bounded wait so an unreachable aggregator cannot hang
    /// the caller.
    pub async fn open(addr: &str, timeout: Duration) -> Result<Self, ClientError> {
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ClientError::connect(addr, e)),
            Err(_) => {
                return Err(ClientError::ConnectTimeout {
                    addr: addr.to_string(),
                    timeout,
                })
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(addr, error = %e, "could not set TCP_NODELAY");
        }

        let peer = peer_label(stream.peer_addr().ok());
        tracing::debug!(peer = %peer, "connected");
        Ok(Self { stream, peer })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        framing::write_full(&mut self.stream, bytes).await
    }

    pub async fn send_request(&mut self, request: &Request) -> Result<(), ProtocolError> {
        let encoded = request.encode()?;
        self.send(&encoded).await?;
        tracing::debug!(peer = %self.peer, kind = request.kind().as_str(), "request sent");
        Ok(())
    }

    pub async fn recv_load_ack(&mut self) -> Result<Option<LoadAck>, ProtocolError> {
        LoadAck::read(&mut self.stream).await
    }

    pub async fn recv_query_result(&mut self) -> Result<QueryResult, ProtocolError> {
        QueryResult::read(&mut self.stream).await
    }

    /// Shut down the write half and release the socket.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(peer = %self.peer, error = %e, "shutdown failed, dropping socket");
        }
        tracing::debug!(peer = %self.peer, "connection closed");
    }
}

//! Outbound peer calls: one request, one response, one connection.

use super::codec::{read_frame, write_frame};
use super::message::Message;
use crate::error::{NodeError, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Time allowed for a TCP connect to a peer.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Time allowed for one full request/response exchange with a peer.
/// Redirection chains apply this bound at every hop.
pub const HOP_TIMEOUT: Duration = Duration::from_secs(5);

/// One request/response exchange with another node.
///
/// Implementations do not retry. An unreachable peer surfaces as
/// [`NodeError::PeerUnreachable`] so the failure handler can repair the
/// ring; whether to try again is the caller's decision.
pub trait PeerTransport: Send + Sync + 'static {
    fn call(
        &self,
        addr: SocketAddr,
        msg: Message,
    ) -> impl Future<Output = Result<Message>> + Send;
}

/// Production transport: a fresh TCP connection per exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpPeerTransport;

impl PeerTransport for TcpPeerTransport {
    async fn call(&self, addr: SocketAddr, msg: Message) -> Result<Message> {
        let mut stream = match timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => return Err(NodeError::unreachable(addr, err)),
            Err(_) => return Err(NodeError::unreachable(addr, "connect timed out")),
        };
        debug!("calling {} with {:?}", addr, msg.kind);

        let exchange = async {
            write_frame(&mut stream, &msg).await?;
            read_frame(&mut stream).await
        };
        match timeout(HOP_TIMEOUT, exchange).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err)) => Err(NodeError::unreachable(addr, err)),
            Err(_) => Err(NodeError::unreachable(addr, "no response within the hop timeout")),
        }
    }
}

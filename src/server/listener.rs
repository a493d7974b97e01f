//! Connection Listener
//!
//! One task per accepted connection reads frames; a bounded worker pool
//! gates how many frames are in flight across the whole node. The write
//! half of every connection is owned by a dedicated task fed over a
//! channel, so synchronous answers and asynchronous session pushes
//! interleave without tearing frames.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info};

use crate::error::{NodeError, Result};
use crate::net::codec::{read_frame, write_frame};
use crate::net::message::Message;
use crate::net::session::ClientSender;
use crate::net::transport::PeerTransport;
use crate::server::context::ChatServer;

/// Per-connection state the dispatcher may bind a session to.
pub struct ConnCtx {
    /// Writer channel of this connection.
    pub outbox: ClientSender,
    /// Ring key of the user signed in over this connection, if any.
    pub user_key: Option<u32>,
}

impl<T: PeerTransport> ChatServer<T> {
    /// Accept loop. Runs until the listener itself fails.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let workers = Arc::new(Semaphore::new(self.max_workers()));
        info!(
            "node {} listening on {}",
            self.local().id,
            listener.local_addr()?
        );
        loop {
            let (stream, remote) = listener.accept().await?;
            let server = self.clone();
            let workers = workers.clone();
            tokio::spawn(async move {
                server.serve_connection(stream, remote, workers).await;
            });
        }
    }

    /// Reads frames until the peer hangs up, answering each through the
    /// writer task. The worker permit is held only while a frame is being
    /// handled, not while waiting for the next one.
    async fn serve_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote: SocketAddr,
        workers: Arc<Semaphore>,
    ) {
        debug!("connection accepted from {}", remote);
        let (mut reader, mut writer) = stream.into_split();
        let (outbox, mut inbox) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Some(frame) = inbox.recv().await {
                if let Err(err) = write_frame(&mut writer, &frame).await {
                    debug!("writer for {} closed: {}", remote, err);
                    break;
                }
            }
        });

        let mut ctx = ConnCtx {
            outbox,
            user_key: None,
        };
        loop {
            let msg = match read_frame(&mut reader).await {
                Ok(msg) => msg,
                Err(NodeError::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(err) => {
                    debug!("dropping connection from {}: {}", remote, err);
                    break;
                }
            };
            let permit = match workers.acquire().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let response = self.handle_frame(msg, Some(&mut ctx)).await;
            drop(permit);
            if ctx.outbox.send(response).is_err() {
                break;
            }
        }

        // A session bound to this connection dies with it; one bound to a
        // newer connection of the same user is left alone.
        if let Some(key) = ctx.user_key {
            self.sessions().remove_if_same(key, &ctx.outbox);
            debug!("session of user key {} untied from {}", key, remote);
        }
    }
}

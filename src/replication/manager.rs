//! Successor replication of user records.

use crate::error::{NodeError, Result};
use crate::net::message::{Body, Message, MessageKind};
use crate::net::transport::PeerTransport;
use crate::ring::router::DhtRouter;
use crate::ring::types::NodeInfo;
use crate::store::types::User;
use crate::store::users::UserStore;
use std::sync::Arc;
use tracing::debug;

/// Pushes mutated records to the ring successor and accepts the copies the
/// predecessor pushes here.
///
/// Replication is per write: a mutating operation is only answered after
/// the successor acknowledged the fresh copy, which is what keeps the
/// backup equal to the primary between operations. The push target is
/// resolved per call, so a ring repair immediately redirects replication
/// to the new successor.
pub struct ReplicationManager<T: PeerTransport> {
    local: NodeInfo,
    router: Arc<DhtRouter>,
    store: Arc<UserStore>,
    transport: Arc<T>,
}

impl<T: PeerTransport> ReplicationManager<T> {
    pub fn new(
        local: NodeInfo,
        router: Arc<DhtRouter>,
        store: Arc<UserStore>,
        transport: Arc<T>,
    ) -> Self {
        Self {
            local,
            router,
            store,
            transport,
        }
    }

    /// The node the next push will go to.
    pub async fn target(&self) -> NodeInfo {
        self.router.successor().await
    }

    /// Pushes `user` to the ring successor and waits for the ack. A lone
    /// node has nowhere to replicate to and succeeds trivially.
    pub async fn push(&self, user: &User) -> Result<()> {
        let successor = self.router.successor().await;
        if successor.id == self.local.id {
            return Ok(());
        }

        let msg = Message::new(
            MessageKind::BackupUser,
            self.local.id,
            Body::User(user.clone()),
        )
        .responsible();

        let reply = self.transport.call(successor.addr, msg).await?;
        match reply.kind {
            MessageKind::ServerSuccess => {
                debug!("user {} backed up by node {}", user.email, successor.id);
                Ok(())
            }
            other => Err(NodeError::Internal(format!(
                "unexpected replication ack {other:?} from node {}",
                successor.id
            ))),
        }
    }

    /// Stores a replica pushed by the predecessor.
    pub fn accept(&self, user: User) {
        debug!("holding backup of user {}", user.email);
        self.store.put_backup(user);
    }

    /// Promotes the replicas held for the ring interval `(from, to]` to
    /// primary records. Called when the predecessor is confirmed down;
    /// this node then serves the inherited range.
    pub fn promote(&self, from: u32, to: u32) -> usize {
        self.store.promote_backups(from, to)
    }
}

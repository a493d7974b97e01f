//! Failure Handling
//!
//! There is no heartbeat. A node learns that a peer is dead when an
//! exchange with it fails. It then drops the peer from its own view and
//! notifies the node that inherits the dead peer's key range; the heir
//! promotes the replicas it already holds, so the range stays served
//! without the lost node.

use std::sync::Arc;

use tracing::{info, warn};

use crate::net::message::{Body, Message, MessageKind};
use crate::net::transport::PeerTransport;
use crate::ring::types::NodeInfo;
use crate::server::context::ChatServer;

impl<T: PeerTransport> ChatServer<T> {
    /// Ring repair after an exchange with `dead` failed.
    ///
    /// The heir of the dead node's range is the live owner of
    /// `dead.id + 1`. The notice is fire-and-forget: whatever request
    /// exposed the failure gets its answer without waiting on the repair,
    /// and a lost notice is not cascaded further.
    pub(crate) async fn peer_failed(self: &Arc<Self>, dead: &NodeInfo) {
        warn!("peer node {} is unreachable; repairing the ring", dead.id);
        self.router().remove_node(dead.id).await;

        let heir = self.router().lookup(dead.id.wrapping_add(1)).await;
        if heir.id == self.local().id {
            self.handle_server_down(dead.id).await;
            return;
        }
        let notice = Message::new(
            MessageKind::ServerDown,
            self.local().id,
            Body::DeadNode(dead.id),
        )
        .responsible();
        let server = self.clone();
        tokio::spawn(async move {
            if let Err(err) = server.transport().call(heir.addr, notice).await {
                warn!("failure notice to node {} undeliverable: {}", heir.id, err);
            }
        });
    }

    /// A peer (or this node itself) established that node `dead_id` is
    /// down. When the dead node was our predecessor we inherit exactly its
    /// key range: the predecessor pointer moves back to the closest live
    /// node before the dead one, and the replicas held for
    /// `(new predecessor, dead_id]` become primaries. Keys before the new
    /// predecessor keep their current owners.
    pub(crate) async fn handle_server_down(self: &Arc<Self>, dead_id: u32) {
        self.router().remove_node(dead_id).await;
        if let Some(pred) = self.router().predecessor().await
            && pred.id == dead_id
        {
            let new_pred = self.router().closest_predecessor_of(dead_id).await;
            // without another live node the degenerate interval is the
            // whole ring
            let from = new_pred.as_ref().map(|n| n.id).unwrap_or(dead_id);
            self.router().set_predecessor(new_pred).await;
            let promoted = self.replication().promote(from, dead_id);
            info!(
                "predecessor {} is down; inherited ({}, {}] and promoted {} replicas",
                dead_id, from, dead_id, promoted
            );
        }
    }
}

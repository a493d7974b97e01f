//! Server Context
//!
//! [`ChatServer`] owns everything a node needs to serve its slice of the
//! ring: the routing state, the user records, the client sessions and the
//! replication link to the successor. It is created once in `main` and
//! shared as `Arc<ChatServer>`; there is no process-global instance.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::error::{NodeError, Result};
use crate::net::message::{Body, Message, MessageKind};
use crate::net::session::SessionRegistry;
use crate::net::transport::PeerTransport;
use crate::replication::manager::ReplicationManager;
use crate::ring::router::DhtRouter;
use crate::ring::types::{JoinState, NodeInfo};
use crate::store::users::UserStore;

/// One chat server node. Generic over the peer transport so the whole
/// request path can be driven in-process by the tests.
pub struct ChatServer<T: PeerTransport> {
    local: NodeInfo,
    router: Arc<DhtRouter>,
    store: Arc<UserStore>,
    sessions: Arc<SessionRegistry>,
    replication: ReplicationManager<T>,
    transport: Arc<T>,
    join_state: RwLock<JoinState>,
    max_workers: usize,
}

/// Point-in-time view of a node for the periodic status report.
#[derive(Debug, Clone)]
pub struct RingStatus {
    pub state: JoinState,
    pub predecessor: Option<u32>,
    pub successor: u32,
    pub primary_users: usize,
    pub backup_users: usize,
    pub live_sessions: usize,
}

impl<T: PeerTransport> ChatServer<T> {
    /// Creates a node that considers itself a complete one-node ring.
    /// Call [`ChatServer::join`] afterwards to enter an existing ring.
    pub fn new(local: NodeInfo, transport: Arc<T>, max_workers: usize) -> Arc<Self> {
        let router = Arc::new(DhtRouter::new(local.clone()));
        let store = Arc::new(UserStore::new());
        let replication = ReplicationManager::new(
            local.clone(),
            router.clone(),
            store.clone(),
            transport.clone(),
        );
        Arc::new(Self {
            local,
            router,
            store,
            sessions: Arc::new(SessionRegistry::new()),
            replication,
            transport,
            join_state: RwLock::new(JoinState::Integrated),
            max_workers,
        })
    }

    pub fn local(&self) -> &NodeInfo {
        &self.local
    }

    pub fn router(&self) -> &Arc<DhtRouter> {
        &self.router
    }

    pub fn store(&self) -> &Arc<UserStore> {
        &self.store
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub(crate) fn replication(&self) -> &ReplicationManager<T> {
        &self.replication
    }

    pub(crate) fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub(crate) fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub async fn join_state(&self) -> JoinState {
        *self.join_state.read().await
    }

    /// Announces this node to an existing ring through `seed`. The
    /// announcement is redirected inside the ring until it reaches the
    /// node that owns our identifier; that node drives the integration
    /// and calls us back with ring pointers and our share of records.
    pub async fn join(self: &Arc<Self>, seed: std::net::SocketAddr) -> Result<()> {
        {
            let mut state = self.join_state.write().await;
            *state = JoinState::Joining;
        }
        info!("joining the ring through {}", seed);
        let announce = Message::new(
            MessageKind::NewNode,
            self.local.id,
            Body::Node(self.local.clone()),
        );
        let reply = self.transport.call(seed, announce).await?;
        match reply.kind {
            MessageKind::ServerSuccess => Ok(()),
            MessageKind::ClientError => {
                let reason = match reply.body {
                    Body::Text(text) => text,
                    _ => "join rejected".to_string(),
                };
                Err(NodeError::Client(reason))
            }
            other => Err(NodeError::Internal(format!(
                "unexpected join reply {other:?}"
            ))),
        }
    }

    /// Sends `msg` to `peer` and requires a server-level acknowledgement.
    pub(crate) async fn call_checked(&self, peer: &NodeInfo, msg: Message) -> Result<Message> {
        let reply = self.transport.call(peer.addr, msg).await?;
        match reply.kind {
            MessageKind::ServerSuccess => Ok(reply),
            MessageKind::ClientError => {
                let reason = match reply.body {
                    Body::Text(text) => text,
                    _ => "rejected by peer".to_string(),
                };
                Err(NodeError::Client(reason))
            }
            other => Err(NodeError::Internal(format!(
                "unexpected ack {other:?} from node {}",
                peer.id
            ))),
        }
    }

    /// First ring snapshot received while joining: the ring knows us now.
    pub(crate) async fn note_ring_pointers_received(&self) {
        let mut state = self.join_state.write().await;
        if *state == JoinState::Joining {
            *state = JoinState::Announced;
            info!("announced to the ring; awaiting record transfer");
        }
    }

    /// Record batch received: this node now serves its key range.
    pub(crate) async fn note_records_received(&self) {
        let mut state = self.join_state.write().await;
        if *state != JoinState::Integrated {
            *state = JoinState::Integrated;
            info!("fully integrated into the ring");
        }
    }

    pub async fn status(&self) -> RingStatus {
        RingStatus {
            state: self.join_state().await,
            predecessor: self.router.predecessor().await.map(|p| p.id),
            successor: self.router.successor().await.id,
            primary_users: self.store.primary_count(),
            backup_users: self.store.backup_count(),
            live_sessions: self.sessions.count(),
        }
    }
}

//! Request Redirection
//!
//! A request may arrive at any node of the ring. The node that owns the
//! request key answers it; every other node forwards the request one hop
//! closer and keeps the inbound exchange open until the answer comes
//! back, so the client sees one synchronous round trip no matter how
//! many hops the request travelled.
//!
//! ## Hop bound
//! A lookup over converged finger tables resolves in at most
//! `log2(ring size) + 1` hops. Anything past [`MAX_FORWARD_HOPS`] is a
//! routing loop and the request is failed instead of forwarded again.

use tracing::{debug, error};

use crate::error::{NodeError, Result};
use crate::net::message::{Message, MessageKind, Responsibility};
use crate::net::transport::PeerTransport;
use crate::ring::types::{KEY_SPACE_BITS, in_interval};
use crate::server::context::ChatServer;
use crate::server::listener::ConnCtx;

/// Upper bound on redirects for one request, one above the worst case of
/// a correct lookup over this key space.
pub const MAX_FORWARD_HOPS: u8 = (KEY_SPACE_BITS + 1) as u8;

/// Message kinds that are always meant for the node that receives them
/// and never ride the redirect chain.
fn addressed_to_receiver(kind: MessageKind) -> bool {
    matches!(
        kind,
        MessageKind::Predecessor
            | MessageKind::SuccessorFt
            | MessageKind::TransferUsers
            | MessageKind::BackupUser
            | MessageKind::ServerDown
    )
}

impl<T: PeerTransport> ChatServer<T> {
    /// Entry point for every inbound frame. Errors never cross the wire
    /// as transport failures; they are folded into an error response so
    /// the requester always gets an answer frame.
    pub async fn handle_frame(
        self: &std::sync::Arc<Self>,
        msg: Message,
        conn: Option<&mut ConnCtx>,
    ) -> Message {
        let kind = msg.kind;
        match self.route(msg, conn).await {
            Ok(response) => response,
            Err(NodeError::Client(reason)) => {
                debug!("{:?} rejected: {}", kind, reason);
                Message::client_error(self.local(), &reason)
            }
            Err(err) => {
                error!("failed to handle {:?}: {}", kind, err);
                Message::client_error(self.local(), &err.to_string())
            }
        }
    }

    /// Decides whether this node answers `msg` or forwards it.
    async fn route(
        self: &std::sync::Arc<Self>,
        msg: Message,
        conn: Option<&mut ConnCtx>,
    ) -> Result<Message> {
        if msg.is_response() {
            return Err(NodeError::Internal(format!(
                "response frame {:?} arrived as a request",
                msg.kind
            )));
        }
        if addressed_to_receiver(msg.kind) {
            return self.handle_peer(msg).await;
        }
        if msg.responsibility == Responsibility::Responsible {
            return self.dispatch(msg, conn).await;
        }
        let key = msg.routing_key();
        if self.router().is_responsible_for(key).await {
            return self.dispatch(msg, conn).await;
        }
        self.forward(msg, key).await
    }

    /// Forwards `msg` one hop toward the owner of `key` and relays the
    /// answer verbatim to the caller.
    pub(crate) async fn forward(
        self: &std::sync::Arc<Self>,
        mut msg: Message,
        key: u32,
    ) -> Result<Message> {
        if msg.hops >= MAX_FORWARD_HOPS {
            return Err(NodeError::Routing(format!(
                "hop limit reached while routing {:?} for key {}",
                msg.kind, key
            )));
        }
        msg.hops += 1;

        let successor = self.router().successor().await;
        if successor.id == self.local().id {
            return Err(NodeError::Routing(format!("no route for key {key}")));
        }
        let mut next = self.router().lookup(key).await;
        if next.id == self.local().id {
            next = successor.clone();
        }
        // Only stamp the message as answerable when the next hop provably
        // owns the key; a fallback hop through a sparse table must not
        // short-circuit the lookup.
        msg.responsibility = if next.id == successor.id
            && in_interval(key, self.local().id, successor.id)
        {
            Responsibility::Responsible
        } else {
            Responsibility::NotResponsible
        };
        debug!(
            "forwarding {:?} for key {} to node {} (hop {})",
            msg.kind, key, next.id, msg.hops
        );
        match self.transport().call(next.addr, msg).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                self.peer_failed(&next).await;
                Err(err)
            }
        }
    }
}

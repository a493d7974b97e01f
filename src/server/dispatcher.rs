//! Request Dispatcher
//!
//! The operations a node performs once a message has reached the node
//! responsible for its key: the client-facing account and chat calls,
//! the node-to-node join and replication handlers, and the fan-out that
//! spreads chat events to every participant's owner.
//!
//! ## Fan-out
//! Invitations and message copies leave as one independent task per
//! participant. A participant whose owner is unreachable costs that one
//! delivery; the others proceed.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{NodeError, Result};
use crate::net::message::{
    Body, DUPLICATE_NODE_ID, EMAIL_ALREADY_USED, EMAIL_NOT_FOUND, Message, MessageKind,
    SENT_MESSAGE, UNKNOWN_CHAT, USER_ADDED, WRONG_PASSWORD,
};
use crate::net::transport::PeerTransport;
use crate::ring::types::{NodeInfo, ring_key};
use crate::server::context::ChatServer;
use crate::server::listener::ConnCtx;
use crate::store::types::{Chat, ChatMessage, User};

impl<T: PeerTransport> ChatServer<T> {
    /// Handles a message this node is responsible for.
    pub(crate) async fn dispatch(
        self: &Arc<Self>,
        msg: Message,
        conn: Option<&mut ConnCtx>,
    ) -> Result<Message> {
        match msg.kind {
            MessageKind::Signup => self.signup(msg, conn).await,
            MessageKind::Signin => self.signin(msg, conn).await,
            MessageKind::CreateChat => self.create_chat(msg).await,
            MessageKind::NewMessage => self.send_message(msg).await,
            MessageKind::GetChat => self.get_chat(msg).await,
            MessageKind::Signout => self.sign_out(msg, conn).await,
            MessageKind::CreateChatByInvitation => self.invite_participant(msg).await,
            MessageKind::NewMessageToParticipant => self.deliver_to_participant(msg).await,
            MessageKind::NewNode => self.integrate_node(msg).await,
            other => Err(NodeError::Internal(format!(
                "kind {other:?} cannot be dispatched locally"
            ))),
        }
    }

    /// A session may only bind to the connection the user opened herself.
    /// A frame that arrived over a redirect hop carries another node's
    /// socket, never the client's.
    fn client_binding(hops: u8, conn: Option<&mut ConnCtx>) -> Option<&mut ConnCtx> {
        if hops == 0 { conn } else { None }
    }

    async fn signup(
        self: &Arc<Self>,
        msg: Message,
        conn: Option<&mut ConnCtx>,
    ) -> Result<Message> {
        let Body::Credentials { email, password } = &msg.body else {
            return Err(NodeError::Client("malformed credentials".into()));
        };
        let user = User::new(email, password);
        let key = user.key();
        if !self.store().insert_new(user.clone()) {
            return Err(NodeError::Client(EMAIL_ALREADY_USED.to_string()));
        }
        info!("user {} signed up under key {}", email, key);
        self.replicate(&user).await;
        if let Some(ctx) = Self::client_binding(msg.hops, conn) {
            self.sessions().install(key, ctx.outbox.clone());
            ctx.user_key = Some(key);
        }
        Ok(Message::client_success(
            self.local(),
            Body::Text(USER_ADDED.to_string()),
        ))
    }

    async fn signin(
        self: &Arc<Self>,
        msg: Message,
        conn: Option<&mut ConnCtx>,
    ) -> Result<Message> {
        let Body::Credentials { email, password } = &msg.body else {
            return Err(NodeError::Client("malformed credentials".into()));
        };
        let key = ring_key(email);
        let user = self
            .store()
            .get(key)
            .ok_or_else(|| NodeError::Client(EMAIL_NOT_FOUND.to_string()))?;
        if !user.verify_password(password) {
            return Err(NodeError::Client(WRONG_PASSWORD.to_string()));
        }
        // Invitations that arrived while the user was offline become part
        // of the chat list handed back, and each one is also pushed over
        // the fresh session.
        let mut delivered: Vec<Chat> = Vec::new();
        let updated = self
            .store()
            .update(key, |record| {
                for pending in record.pending_chats.drain(..) {
                    delivered.push(pending.clone());
                    record.chats.insert(pending.id.clone(), pending);
                }
            })
            .ok_or_else(|| NodeError::Client(EMAIL_NOT_FOUND.to_string()))?;
        if let Some(ctx) = Self::client_binding(msg.hops, conn) {
            self.sessions().install(key, ctx.outbox.clone());
            ctx.user_key = Some(key);
        }
        if !delivered.is_empty() {
            info!("delivered {} pending invitations to {}", delivered.len(), email);
            for chat in delivered {
                let push = Message::new(
                    MessageKind::CreateChatByInvitation,
                    ring_key(&chat.creator),
                    Body::Chat(chat),
                )
                .with_receiver(key)
                .responsible();
                self.sessions().push(key, push);
            }
            self.replicate(&updated).await;
        }
        info!("user {} signed in", email);
        Ok(Message::client_success(
            self.local(),
            Body::ChatList(updated.chats.values().cloned().collect()),
        ))
    }

    async fn create_chat(self: &Arc<Self>, msg: Message) -> Result<Message> {
        let Body::ChatRequest { name, participants } = &msg.body else {
            return Err(NodeError::Client("malformed chat request".into()));
        };
        let key = msg.sender_id;
        let creator = self
            .store()
            .get(key)
            .ok_or_else(|| NodeError::Client(EMAIL_NOT_FOUND.to_string()))?;
        let chat = Chat::new(name, &creator.email, participants.clone());
        let updated = self
            .store()
            .update(key, |record| {
                record.chats.insert(chat.id.clone(), chat.clone());
            })
            .ok_or_else(|| NodeError::Client(EMAIL_NOT_FOUND.to_string()))?;
        info!("chat {} ({}) created by {}", chat.id, chat.name, creator.email);
        self.replicate(&updated).await;
        self.scatter_invitations(&chat);
        Ok(Message::client_success(self.local(), Body::Chat(chat)))
    }

    async fn send_message(self: &Arc<Self>, msg: Message) -> Result<Message> {
        let Body::ChatMessage(note) = &msg.body else {
            return Err(NodeError::Client("malformed message payload".into()));
        };
        // On the sender's owner the message anchors on the sender; a copy
        // arriving at a participant's owner anchors on the receiver.
        let key = msg.receiver_id.unwrap_or(msg.sender_id);
        let mut appended = false;
        let updated = self
            .store()
            .update(key, |record| {
                if let Some(chat) = record.chats.get_mut(&note.chat_id) {
                    chat.messages.push(note.clone());
                    appended = true;
                }
            })
            .ok_or_else(|| NodeError::Client(EMAIL_NOT_FOUND.to_string()))?;
        if !appended {
            return Err(NodeError::Client(UNKNOWN_CHAT.to_string()));
        }
        debug!("user {} posted to chat {}", note.sender, note.chat_id);
        self.replicate(&updated).await;
        if let Some(chat) = updated.chats.get(&note.chat_id) {
            self.scatter_message(chat.participants.clone(), note.clone());
        }
        Ok(Message::client_success(
            self.local(),
            Body::Text(SENT_MESSAGE.to_string()),
        ))
    }

    async fn get_chat(self: &Arc<Self>, msg: Message) -> Result<Message> {
        let Body::ChatId(chat_id) = &msg.body else {
            return Err(NodeError::Client("malformed chat lookup".into()));
        };
        let user = self
            .store()
            .get(msg.sender_id)
            .ok_or_else(|| NodeError::Client(EMAIL_NOT_FOUND.to_string()))?;
        let chat = user
            .chats
            .get(chat_id)
            .cloned()
            .ok_or_else(|| NodeError::Client(UNKNOWN_CHAT.to_string()))?;
        Ok(Message::client_success(self.local(), Body::Chat(chat)))
    }

    async fn sign_out(
        self: &Arc<Self>,
        msg: Message,
        conn: Option<&mut ConnCtx>,
    ) -> Result<Message> {
        let key = msg.sender_id;
        self.sessions().remove(key);
        if let Some(ctx) = Self::client_binding(msg.hops, conn) {
            ctx.user_key = None;
        }
        info!("user key {} signed out", key);
        Ok(Message::client_success(self.local(), Body::Empty))
    }

    // ---- join integration -------------------------------------------------

    /// A node announced itself and the announcement was routed here, which
    /// makes this node its successor. Wire it in as our new predecessor,
    /// hand it its pointers and its share of the records.
    async fn integrate_node(self: &Arc<Self>, msg: Message) -> Result<Message> {
        let Body::Node(joiner) = &msg.body else {
            return Err(NodeError::Client("malformed join announcement".into()));
        };
        let joiner = joiner.clone();
        if joiner.id == self.local().id || self.router().knows(joiner.id).await {
            return Err(NodeError::Client(DUPLICATE_NODE_ID.to_string()));
        }
        info!("integrating node {} as the new predecessor", joiner);

        let prev_pred = self.router().predecessor().await;
        self.router().set_predecessor(Some(joiner.clone())).await;
        self.router().add_node(joiner.clone()).await;

        if let Err(err) = self.announce_to_joiner(&joiner, prev_pred.as_ref()).await {
            warn!("join of node {} aborted: {}", joiner.id, err);
            self.router().set_predecessor(prev_pred).await;
            self.router().remove_node(joiner.id).await;
            return Err(err);
        }

        // The old predecessor absorbs its new successor from our view.
        if let Some(prev) = prev_pred.clone().filter(|p| p.id != joiner.id) {
            let snapshot = Message::new(
                MessageKind::SuccessorFt,
                self.local().id,
                Body::Nodes(self.router().known_nodes().await),
            )
            .responsible();
            if let Err(err) = self.call_checked(&prev, snapshot).await {
                warn!("could not hand node {} its new successor: {}", prev.id, err);
                self.peer_failed(&prev).await;
            }
        }

        // The record hand-off runs in its own task; the joiner flips to
        // integrated when the batch lands, while its join call returns now.
        let range_start = prev_pred.map(|p| p.id).unwrap_or(self.local().id);
        let (primaries, replicas) = self.store().split_off(range_start, joiner.id);
        let server = self.clone();
        tokio::spawn(async move {
            server.transfer_records(joiner, primaries, replicas).await;
        });

        Ok(Message::server_success(self.local()))
    }

    /// Hands a joining node its ring pointers: first its predecessor, then
    /// a snapshot of every node known here (its successor included).
    async fn announce_to_joiner(
        &self,
        joiner: &NodeInfo,
        prev_pred: Option<&NodeInfo>,
    ) -> Result<()> {
        let pred = prev_pred.unwrap_or(self.local()).clone();
        let intro =
            Message::new(MessageKind::Predecessor, self.local().id, Body::Node(pred)).responsible();
        self.call_checked(joiner, intro).await?;

        let snapshot = Message::new(
            MessageKind::SuccessorFt,
            self.local().id,
            Body::Nodes(self.router().known_nodes().await),
        )
        .responsible();
        self.call_checked(joiner, snapshot).await?;
        Ok(())
    }

    /// Pushes the handed-off partition to the joiner. The batch goes out
    /// even when empty: receiving it is what tells the joiner it now
    /// serves its range. On failure the records are reinstalled here.
    async fn transfer_records(
        self: Arc<Self>,
        joiner: NodeInfo,
        primaries: Vec<User>,
        replicas: Vec<User>,
    ) {
        let moved = (primaries.len(), replicas.len());
        let batch = Message::new(
            MessageKind::TransferUsers,
            self.local().id,
            Body::UserBatch {
                primaries: primaries.clone(),
                replicas: replicas.clone(),
            },
        )
        .responsible();
        match self.call_checked(&joiner, batch).await {
            Ok(_) => info!(
                "transferred {} users and {} backups to node {}",
                moved.0, moved.1, joiner.id
            ),
            Err(err) => {
                error!(
                    "partition transfer to node {} failed: {}; keeping the records",
                    joiner.id, err
                );
                self.store().install(primaries, replicas);
                self.peer_failed(&joiner).await;
            }
        }
    }

    // ---- peer traffic -----------------------------------------------------

    /// Messages addressed to this node directly, outside the redirect
    /// chain.
    pub(crate) async fn handle_peer(self: &Arc<Self>, msg: Message) -> Result<Message> {
        let sender = msg.sender_id;
        match msg.kind {
            MessageKind::Predecessor => {
                let Body::Node(node) = msg.body else {
                    return Err(NodeError::Client("malformed predecessor update".into()));
                };
                debug!("predecessor set to node {}", node.id);
                self.router().set_predecessor(Some(node)).await;
                Ok(Message::server_success(self.local()))
            }
            MessageKind::SuccessorFt => {
                let Body::Nodes(nodes) = msg.body else {
                    return Err(NodeError::Client("malformed ring snapshot".into()));
                };
                debug!("ring snapshot of {} nodes from node {}", nodes.len(), sender);
                self.router().install_snapshot(&nodes).await;
                self.note_ring_pointers_received().await;
                Ok(Message::server_success(self.local()))
            }
            MessageKind::TransferUsers => {
                let Body::UserBatch { primaries, replicas } = msg.body else {
                    return Err(NodeError::Client("malformed record batch".into()));
                };
                info!(
                    "received {} users and {} backups from node {}",
                    primaries.len(),
                    replicas.len(),
                    sender
                );
                self.store().install(primaries, replicas);
                self.note_records_received().await;
                Ok(Message::server_success(self.local()))
            }
            MessageKind::BackupUser => {
                let Body::User(user) = msg.body else {
                    return Err(NodeError::Client("malformed replica".into()));
                };
                self.replication().accept(user);
                Ok(Message::server_success(self.local()))
            }
            MessageKind::ServerDown => {
                let Body::DeadNode(dead_id) = msg.body else {
                    return Err(NodeError::Client("malformed failure notice".into()));
                };
                self.handle_server_down(dead_id).await;
                Ok(Message::server_success(self.local()))
            }
            other => Err(NodeError::Internal(format!(
                "kind {other:?} is not peer traffic"
            ))),
        }
    }

    // ---- fan-out ----------------------------------------------------------

    fn scatter_invitations(self: &Arc<Self>, chat: &Chat) {
        for participant in chat.participants.clone() {
            if participant == chat.creator {
                continue;
            }
            let server = self.clone();
            let chat = chat.clone();
            tokio::spawn(async move {
                if let Err(err) = server.deliver_invitation(&participant, chat).await {
                    warn!("invitation for {} failed: {}", participant, err);
                }
            });
        }
    }

    fn scatter_message(self: &Arc<Self>, participants: Vec<String>, note: ChatMessage) {
        for participant in participants {
            if participant == note.sender {
                continue;
            }
            let server = self.clone();
            let note = note.clone();
            tokio::spawn(async move {
                if let Err(err) = server.deliver_message(&participant, note).await {
                    warn!("message copy for {} failed: {}", participant, err);
                }
            });
        }
    }

    /// Brings a chat to one participant, locally when this node owns her,
    /// over the ring otherwise.
    async fn deliver_invitation(self: &Arc<Self>, email: &str, chat: Chat) -> Result<()> {
        let key = ring_key(email);
        if self.router().is_responsible_for(key).await {
            return self.invite_local(key, chat).await;
        }
        let origin = ring_key(&chat.creator);
        let msg = Message::new(MessageKind::CreateChatByInvitation, origin, Body::Chat(chat))
            .with_receiver(key);
        let reply = self.forward(msg, key).await?;
        match reply.kind {
            MessageKind::ServerSuccess => Ok(()),
            _ => Err(NodeError::Internal(format!(
                "participant owner rejected the invitation for {email}"
            ))),
        }
    }

    /// Brings one message copy to one participant.
    async fn deliver_message(self: &Arc<Self>, email: &str, note: ChatMessage) -> Result<()> {
        let key = ring_key(email);
        if self.router().is_responsible_for(key).await {
            return self.deliver_local(key, note).await;
        }
        let origin = ring_key(&note.sender);
        let msg = Message::new(
            MessageKind::NewMessageToParticipant,
            origin,
            Body::ChatMessage(note),
        )
        .with_receiver(key);
        let reply = self.forward(msg, key).await?;
        match reply.kind {
            MessageKind::ServerSuccess => Ok(()),
            _ => Err(NodeError::Internal(format!(
                "participant owner rejected the message copy for {email}"
            ))),
        }
    }

    /// An invitation routed here from the chat creator's owner.
    async fn invite_participant(self: &Arc<Self>, msg: Message) -> Result<Message> {
        let Body::Chat(chat) = msg.body else {
            return Err(NodeError::Client("malformed invitation payload".into()));
        };
        let key = msg
            .receiver_id
            .ok_or_else(|| NodeError::Client("invitation without a receiver".into()))?;
        self.invite_local(key, chat).await?;
        Ok(Message::server_success(self.local()))
    }

    /// A message copy routed here from the posting user's owner.
    async fn deliver_to_participant(self: &Arc<Self>, msg: Message) -> Result<Message> {
        let Body::ChatMessage(note) = msg.body else {
            return Err(NodeError::Client("malformed delivery payload".into()));
        };
        let key = msg
            .receiver_id
            .ok_or_else(|| NodeError::Client("delivery without a receiver".into()))?;
        self.deliver_local(key, note).await?;
        Ok(Message::server_success(self.local()))
    }

    /// Stores an invited chat under a user owned here. Online users get it
    /// pushed and into the chat list at once; offline users find it on the
    /// next sign-in.
    async fn invite_local(self: &Arc<Self>, key: u32, chat: Chat) -> Result<()> {
        let online = self.sessions().is_online(key);
        let updated = self.store().update(key, |record| {
            if online {
                record.chats.insert(chat.id.clone(), chat.clone());
            } else {
                record.pending_chats.push(chat.clone());
            }
        });
        let Some(updated) = updated else {
            warn!("dropping invitation to {} for unknown user key {}", chat.name, key);
            return Ok(());
        };
        if online {
            let push = Message::new(
                MessageKind::CreateChatByInvitation,
                ring_key(&chat.creator),
                Body::Chat(chat),
            )
            .with_receiver(key)
            .responsible();
            self.sessions().push(key, push);
        }
        self.replicate(&updated).await;
        Ok(())
    }

    /// Appends a message copy to a chat of a user owned here and pushes it
    /// over the live session if there is one.
    async fn deliver_local(self: &Arc<Self>, key: u32, note: ChatMessage) -> Result<()> {
        let mut appended = false;
        let updated = self.store().update(key, |record| {
            if let Some(chat) = record.chats.get_mut(&note.chat_id) {
                chat.messages.push(note.clone());
                appended = true;
            } else if let Some(pending) = record
                .pending_chats
                .iter_mut()
                .find(|chat| chat.id == note.chat_id)
            {
                pending.messages.push(note.clone());
                appended = true;
            }
        });
        let Some(updated) = updated else {
            warn!("dropping message for unknown user key {}", key);
            return Ok(());
        };
        if !appended {
            warn!(
                "dropping message for chat {} unknown to user key {}",
                note.chat_id, key
            );
            return Ok(());
        }
        if self.sessions().is_online(key) {
            let push = Message::new(
                MessageKind::NewMessage,
                ring_key(&note.sender),
                Body::ChatMessage(note.clone()),
            )
            .with_receiver(key)
            .responsible();
            self.sessions().push(key, push);
        }
        self.replicate(&updated).await;
        Ok(())
    }

    /// Pushes an updated record to the successor. A replication failure is
    /// never surfaced to the client; the write already landed on the
    /// primary and an unreachable successor goes through ring repair.
    async fn replicate(self: &Arc<Self>, user: &User) {
        let target = self.replication().target().await;
        if let Err(err) = self.replication().push(user).await {
            error!(
                "replication of {} to node {} failed: {}",
                user.email, target.id, err
            );
            if matches!(err, NodeError::PeerUnreachable { .. }) {
                self.peer_failed(&target).await;
            }
        }
    }
}

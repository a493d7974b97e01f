//! The message envelope: every request, peer notification and response.

use crate::ring::types::NodeInfo;
use crate::store::types::{Chat, ChatId, ChatMessage, User};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Reason codes carried by `ClientSuccess` / `ClientError` responses.
pub const USER_ADDED: &str = "USER_ADDED";
pub const EMAIL_ALREADY_USED: &str = "EMAIL_ALREADY_USED";
pub const EMAIL_NOT_FOUND: &str = "EMAIL_NOT_FOUND";
pub const WRONG_PASSWORD: &str = "WRONG_PASSWORD";
pub const UNKNOWN_CHAT: &str = "UNKNOWN_CHAT";
pub const DUPLICATE_NODE_ID: &str = "DUPLICATE_NODE_ID";
pub const SENT_MESSAGE: &str = "SENT_MESSAGE";

/// Every kind of traffic on the ring.
///
/// The first block is client-facing, the second is node-to-node, the last
/// three are responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Signin,
    Signup,
    CreateChat,
    Signout,
    GetChat,
    NewMessage,

    CreateChatByInvitation,
    NewMessageToParticipant,
    NewNode,
    Predecessor,
    SuccessorFt,
    TransferUsers,
    BackupUser,
    ServerDown,

    ClientSuccess,
    ClientError,
    ServerSuccess,
}

/// Marks whether the receiver of a forwarded message is already known to
/// own the routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Responsibility {
    /// The receiver owns the key: process, do not re-route.
    Responsible,
    /// The receiver must resolve the key again and keep forwarding.
    NotResponsible,
}

/// Typed payload of a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Body {
    Empty,
    /// Sign-in / sign-up credentials.
    Credentials { email: String, password: String },
    /// Chat creation request: chat name plus participant emails.
    ChatRequest { name: String, participants: Vec<String> },
    Chat(Chat),
    ChatMessage(ChatMessage),
    ChatId(ChatId),
    /// The user's chats, returned on a successful sign-in.
    ChatList(Vec<Chat>),
    Node(NodeInfo),
    /// Node-set snapshot of a finger table.
    Nodes(Vec<NodeInfo>),
    User(User),
    /// Join partition batch: the records the new node now owns, plus the
    /// replica copies that travel with them.
    UserBatch { primaries: Vec<User>, replicas: Vec<User> },
    /// Ring id of a failed node.
    DeadNode(u32),
    Text(String),
}

/// The envelope.
///
/// `sender_id` is the ring key of the acting user (or the node id for
/// topology traffic); `receiver_id` is set when a message is addressed to
/// a particular user's owner. Responses carry `served_by`, the address of
/// the node that actually produced the answer, so a client can talk to the
/// owner of its data directly from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub sender_id: u32,
    pub receiver_id: Option<u32>,
    pub responsibility: Responsibility,
    pub served_by: Option<SocketAddr>,
    /// Times this message has been forwarded between nodes.
    pub hops: u8,
    pub body: Body,
}

impl Message {
    pub fn new(kind: MessageKind, sender_id: u32, body: Body) -> Self {
        Self {
            kind,
            sender_id,
            receiver_id: None,
            responsibility: Responsibility::NotResponsible,
            served_by: None,
            hops: 0,
            body,
        }
    }

    pub fn with_receiver(mut self, receiver_id: u32) -> Self {
        self.receiver_id = Some(receiver_id);
        self
    }

    pub fn responsible(mut self) -> Self {
        self.responsibility = Responsibility::Responsible;
        self
    }

    /// Successful response to a client.
    pub fn client_success(node: &NodeInfo, body: Body) -> Self {
        Self {
            kind: MessageKind::ClientSuccess,
            sender_id: node.id,
            receiver_id: None,
            responsibility: Responsibility::Responsible,
            served_by: Some(node.addr),
            hops: 0,
            body,
        }
    }

    /// Error response to a client, carrying one of the reason codes.
    pub fn client_error(node: &NodeInfo, reason: &str) -> Self {
        Self {
            kind: MessageKind::ClientError,
            sender_id: node.id,
            receiver_id: None,
            responsibility: Responsibility::Responsible,
            served_by: Some(node.addr),
            hops: 0,
            body: Body::Text(reason.to_string()),
        }
    }

    /// Acknowledgement between nodes.
    pub fn server_success(node: &NodeInfo) -> Self {
        Self {
            kind: MessageKind::ServerSuccess,
            sender_id: node.id,
            receiver_id: None,
            responsibility: Responsibility::Responsible,
            served_by: Some(node.addr),
            hops: 0,
            body: Body::Empty,
        }
    }

    /// The ring key that decides which node must handle this message.
    ///
    /// Delivery kinds route on the receiver (the participant being
    /// reached), a joining node routes on its announced id, and everything
    /// else routes on the sender.
    pub fn routing_key(&self) -> u32 {
        match self.kind {
            MessageKind::CreateChatByInvitation
            | MessageKind::NewMessageToParticipant
            | MessageKind::NewMessage => self.receiver_id.unwrap_or(self.sender_id),
            MessageKind::NewNode => match &self.body {
                Body::Node(node) => node.id,
                _ => self.sender_id,
            },
            _ => self.sender_id,
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(
            self.kind,
            MessageKind::ClientSuccess | MessageKind::ClientError | MessageKind::ServerSuccess
        )
    }
}

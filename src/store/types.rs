//! Chat domain records.
//!
//! These are the values that live in the user store and travel in message
//! bodies. Every participant's owning node keeps its own copy of a chat;
//! message fan-out keeps the copies converging.

use crate::ring::types::{credential_digest, ring_key};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Unique chat identifier, assigned by the node that creates the chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ChatId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user account together with everything the owning node keeps for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub password_digest: u64,
    pub chats: HashMap<ChatId, Chat>,
    /// Invitations that arrived while the user was offline, delivered on
    /// the next sign-in.
    pub pending_chats: Vec<Chat>,
}

impl User {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            password_digest: credential_digest(password),
            chats: HashMap::new(),
            pending_chats: Vec::new(),
        }
    }

    pub fn verify_password(&self, password: &str) -> bool {
        self.password_digest == credential_digest(password)
    }

    /// Ring position of this user's key.
    pub fn key(&self) -> u32 {
        ring_key(&self.email)
    }
}

/// A chat room as stored under each participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub name: String,
    pub creator: String,
    /// Participant emails, the creator included.
    pub participants: Vec<String>,
    /// Ordered, append-only message log.
    pub messages: Vec<ChatMessage>,
}

impl Chat {
    pub fn new(name: &str, creator: &str, mut participants: Vec<String>) -> Self {
        if participants.iter().all(|p| p != creator) {
            participants.insert(0, creator.to_string());
        }
        Self {
            id: ChatId::new(),
            name: name.to_string(),
            creator: creator.to_string(),
            participants,
            messages: Vec::new(),
        }
    }
}

/// A single message within a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub chat_id: ChatId,
    pub sender: String,
    pub body: String,
    pub sent_at_ms: u64,
}

impl ChatMessage {
    pub fn new(chat_id: ChatId, sender: &str, body: &str) -> Self {
        Self {
            chat_id,
            sender: sender.to_string(),
            body: body.to_string(),
            sent_at_ms: now_ms(),
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

//! Live client connections. A user key resolves to the writer channel of
//! one connection and nothing else; ring state never holds sockets.

use super::message::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Writer handle of one accepted client connection. The connection's
/// writer task drains this channel onto the socket.
pub type ClientSender = mpsc::UnboundedSender<Message>;

/// Registry of signed-in users, keyed by the ring key of their email.
///
/// Sign-in and sign-up install the mapping, sign-out and connection
/// teardown remove it. Push delivery of new messages and invitations goes
/// through here; a user without an entry is simply offline.
pub struct SessionRegistry {
    sessions: DashMap<u32, ClientSender>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Installs (or replaces) the live connection of a user.
    pub fn install(&self, user_key: u32, sender: ClientSender) {
        debug!("user {} signed in", user_key);
        self.sessions.insert(user_key, sender);
    }

    pub fn remove(&self, user_key: u32) {
        self.sessions.remove(&user_key);
    }

    /// Removes the session only when it still belongs to `sender`. Used on
    /// connection teardown so a newer sign-in on a fresh connection is not
    /// wiped by the old connection closing.
    pub fn remove_if_same(&self, user_key: u32, sender: &ClientSender) {
        self.sessions
            .remove_if(&user_key, |_, current| current.same_channel(sender));
    }

    pub fn is_online(&self, user_key: u32) -> bool {
        self.sessions.contains_key(&user_key)
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Pushes a message to a signed-in user. Returns `false` when the user
    /// is offline; a dead channel unregisters the session on the spot.
    pub fn push(&self, user_key: u32, msg: Message) -> bool {
        let Some(sender) = self.sessions.get(&user_key).map(|e| e.value().clone()) else {
            return false;
        };
        if sender.send(msg).is_err() {
            debug!("dropping dead session of user {}", user_key);
            self.sessions.remove(&user_key);
            return false;
        }
        true
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

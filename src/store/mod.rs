//! User State Module
//!
//! Holds everything a node keeps for the users it owns: accounts, chats,
//! message logs and pending invitations, plus the replica copies it holds
//! on behalf of its ring predecessor.
//!
//! ## Responsibilities
//! - Primary records for the node's own key range (`users`).
//! - Replica records for the predecessor's key range (`backups`), promoted
//!   into the inherited interval when the predecessor is confirmed down.
//! - The partition split that moves a joining node's share of records out.

pub mod types;
pub mod users;

#[cfg(test)]
mod tests;

//! Key space primitives and node identity.

use serde::{Deserialize, Serialize};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::net::SocketAddr;

/// Width of the ring key space in bits. Keys and node ids are `u32`, so
/// wrapping arithmetic is exactly arithmetic modulo the ring size.
pub const KEY_SPACE_BITS: u32 = 32;

/// Number of finger table entries, one per power of two of the key space.
pub const FINGER_COUNT: usize = KEY_SPACE_BITS as usize;

/// Identity of a server node on the ring.
///
/// Plain data: no live connection is ever embedded here, so identities can
/// be freely copied into finger tables and wire messages. Connections are
/// tracked separately by the session registry and the peer transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: u32,
    pub addr: SocketAddr,
}

impl NodeInfo {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self { id, addr }
    }
}

impl std::fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node {} @ {}", self.id, self.addr)
    }
}

/// Lifecycle of a node between process start and full ring membership.
///
/// A founding node is `Integrated` from the start. A joining node moves
/// `Joining` -> `Announced` once its ring pointers arrive and `Announced` ->
/// `Integrated` once its share of user records is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinState {
    Joining,
    Announced,
    Integrated,
}

impl std::fmt::Display for JoinState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinState::Joining => write!(f, "joining"),
            JoinState::Announced => write!(f, "announced"),
            JoinState::Integrated => write!(f, "integrated"),
        }
    }
}

/// Hashes an arbitrary string, usually an email, onto the ring.
///
/// `DefaultHasher` with its fixed initial state is deterministic across
/// processes, which is what makes every node agree on key placement.
pub fn ring_key(value: &str) -> u32 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish() as u32
}

/// 64-bit digest under which credentials are stored. Not a hardened
/// password hash; credential security is outside this system's scope.
pub fn credential_digest(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// True when `key` lies in the ring interval `(from, to]`, accounting for
/// wraparound. `from == to` denotes the full ring.
pub fn in_interval(key: u32, from: u32, to: u32) -> bool {
    if from == to {
        return true;
    }
    if from < to {
        key > from && key <= to
    } else {
        key > from || key <= to
    }
}

/// Clockwise distance from `from` to `to`.
pub fn ring_distance(from: u32, to: u32) -> u32 {
    to.wrapping_sub(from)
}

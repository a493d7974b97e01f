//! Ring Chat Cluster Library
//!
//! This library crate defines the core modules of a peer-to-peer chat
//! backend. It serves as the foundation for the node binary (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of five loosely coupled subsystems:
//!
//! - **`ring`**: the consistent-hashing layer. A Chord-style ring of nodes
//!   with finger-table routing, predecessor/successor maintenance and the
//!   join protocol that decides which node owns which user key.
//! - **`store`**: the per-node state layer. Primary user records (accounts,
//!   chats, messages, pending invitations) plus the replica copies held for
//!   the ring predecessor, with the partition moves between them.
//! - **`net`**: the wire layer. The message envelope, length-prefixed
//!   bincode framing over TCP, the one-shot peer transport and the registry
//!   of live client sessions.
//! - **`replication`**: per-write backup. Every acknowledged mutation pushes
//!   the full user record to the ring successor; on predecessor failure the
//!   replicas are promoted into the primary range.
//! - **`server`**: the node itself. The server context, the request
//!   dispatcher, synchronous multi-hop redirection, the failure handler and
//!   the bounded accept loop.

pub mod config;
pub mod error;
pub mod net;
pub mod replication;
pub mod ring;
pub mod server;
pub mod store;

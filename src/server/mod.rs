//! Server Module
//!
//! Ties the ring, the user store, replication and the network together
//! into one node process.
//!
//! ## Responsibilities
//! - **`context`**: the [`context::ChatServer`] object every other piece
//!   hangs off. One instance per process, no global state.
//! - **`redirect`**: decides per message whether to handle locally or to
//!   forward along the ring, holding the inbound request open until the
//!   answer travels back.
//! - **`dispatcher`**: the business operations (sign-up, sign-in, chats,
//!   messages) and the node-to-node handlers (join, snapshots, backups).
//! - **`failure`**: ring repair when a peer stops answering.
//! - **`listener`**: the accept loop and per-connection lifecycle.

pub mod context;
pub mod dispatcher;
pub mod failure;
pub mod listener;
pub mod redirect;

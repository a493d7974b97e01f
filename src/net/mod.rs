//! Networking Module
//!
//! Everything that crosses a socket: the message envelope the whole system
//! speaks, the length-prefixed bincode framing, the outbound peer transport
//! and the registry of live client connections.
//!
//! ## Wire shape
//! One TCP frame carries one [`message::Message`]. Clients keep their
//! connection open for the whole session so the server can push new
//! messages and invitations; node-to-node exchanges open a fresh
//! connection per request and close it after the response.

pub mod codec;
pub mod message;
pub mod session;
pub mod transport;

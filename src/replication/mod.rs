//! Replication Module
//!
//! Keeps every user record alive on two nodes: the owner, and the owner's
//! ring successor. The owner pushes the full record after every mutation
//! and blocks for the acknowledgement; the successor holds the copy in its
//! backups map and serves it only after a promotion.

pub mod manager;

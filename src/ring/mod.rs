//! Ring Topology Module
//!
//! Implements the consistent-hashing ring the cluster is built on: the key
//! space, node identities, the finger table used to accelerate lookups and
//! the router that answers "who owns this key" from local state.
//!
//! ## Core Concepts
//! - **Ring**: the circular `2^32` key space. Every user email and every
//!   node id is a position on it.
//! - **Ownership**: a key belongs to the first node found walking clockwise
//!   from it. A node therefore owns the interval between its predecessor
//!   (exclusive) and itself (inclusive).
//! - **Finger table**: per node, one entry per power of two of the key
//!   space. It turns a linear walk around the ring into a logarithmic one.

pub mod finger;
pub mod router;
pub mod types;

#[cfg(test)]
mod tests;

//! The finger table: per-node routing accelerator.

use super::types::{FINGER_COUNT, NodeInfo, in_interval, ring_distance};

/// Routing table with one entry per power of two of the key space.
///
/// Entry `i` holds the best known owner of `owner.id + 2^i`; entry `0` is
/// by definition the ring successor. A table is immutable once built:
/// every update constructs a fresh table from a node set and the router
/// swaps it in whole, so readers never observe a half-applied update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerTable {
    owner: NodeInfo,
    entries: Vec<NodeInfo>,
}

impl FingerTable {
    /// Table of a lone node: every entry points back at the owner.
    pub fn solitary(owner: NodeInfo) -> Self {
        let entries = vec![owner.clone(); FINGER_COUNT];
        Self { owner, entries }
    }

    /// Builds the table for `owner` from every node it currently knows.
    ///
    /// For each slot the ideal position `owner.id + 2^i` is computed and
    /// the known node closest to it clockwise is chosen. The owner itself
    /// always participates, so a slot whose ideal position falls past every
    /// known node wraps back around correctly.
    pub fn rebuild(owner: NodeInfo, known: &[NodeInfo]) -> Self {
        let mut candidates: Vec<NodeInfo> = vec![owner.clone()];
        for node in known {
            if candidates.iter().all(|c| c.id != node.id) {
                candidates.push(node.clone());
            }
        }

        let mut entries = Vec::with_capacity(FINGER_COUNT);
        for i in 0..FINGER_COUNT {
            let ideal = owner.id.wrapping_add(1u32 << i);
            let entry = candidates
                .iter()
                .min_by_key(|c| ring_distance(ideal, c.id))
                .cloned()
                .unwrap_or_else(|| owner.clone());
            entries.push(entry);
        }
        Self { owner, entries }
    }

    /// The ring successor of the owner.
    pub fn successor(&self) -> &NodeInfo {
        &self.entries[0]
    }

    /// Distinct nodes present in the table, the owner included. This is
    /// what travels in a finger table snapshot.
    pub fn node_set(&self) -> Vec<NodeInfo> {
        let mut nodes = vec![self.owner.clone()];
        for entry in &self.entries {
            if nodes.iter().all(|n| n.id != entry.id) {
                nodes.push(entry.clone());
            }
        }
        nodes
    }

    /// Closest finger that precedes `key` clockwise from the owner.
    ///
    /// Walks the entries from the farthest offset down and returns the
    /// first node lying strictly between the owner and the key: the longest
    /// jump toward the key's owner that cannot overshoot it. `None` when
    /// every finger lands on or past the key.
    pub fn closest_preceding(&self, key: u32) -> Option<NodeInfo> {
        let upper = key.wrapping_sub(1);
        if upper == self.owner.id {
            // nothing lies strictly between the owner and owner+1
            return None;
        }
        self.entries
            .iter()
            .rev()
            .find(|e| e.id != self.owner.id && in_interval(e.id, self.owner.id, upper))
            .cloned()
    }
}

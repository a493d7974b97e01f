//! Routing state of one node: predecessor pointer plus finger table.

use super::finger::FingerTable;
use super::types::{NodeInfo, in_interval, ring_distance};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Answers ownership and next-hop questions from local state only.
///
/// Reads take a cheap `Arc` snapshot of the current finger table. Every
/// mutation snapshots the node set, rebuilds a fresh table and swaps it in
/// whole, holding the write lock across all three steps; concurrent
/// membership updates serialize rather than overwrite one another. The
/// distributed part of a lookup, hopping from node to node, lives in the
/// redirection layer; this type never touches the network.
pub struct DhtRouter {
    local: NodeInfo,
    fingers: RwLock<Arc<FingerTable>>,
    predecessor: RwLock<Option<NodeInfo>>,
}

impl DhtRouter {
    pub fn new(local: NodeInfo) -> Self {
        Self {
            fingers: RwLock::new(Arc::new(FingerTable::solitary(local.clone()))),
            predecessor: RwLock::new(None),
            local,
        }
    }

    pub fn local(&self) -> &NodeInfo {
        &self.local
    }

    pub async fn successor(&self) -> NodeInfo {
        self.fingers.read().await.successor().clone()
    }

    pub async fn predecessor(&self) -> Option<NodeInfo> {
        self.predecessor.read().await.clone()
    }

    pub async fn set_predecessor(&self, node: Option<NodeInfo>) {
        let mut guard = self.predecessor.write().await;
        debug!(
            "predecessor of node {} set to {:?}",
            self.local.id,
            node.as_ref().map(|n| n.id)
        );
        *guard = node;
    }

    /// Every node this router currently knows about, itself included.
    pub async fn known_nodes(&self) -> Vec<NodeInfo> {
        let table = self.fingers.read().await.clone();
        self.with_predecessor(table.node_set()).await
    }

    pub async fn knows(&self, id: u32) -> bool {
        self.known_nodes().await.iter().any(|n| n.id == id)
    }

    /// The known node closest counter-clockwise of `key`, skipping this
    /// node and any node sitting on `key` itself. This is the predecessor
    /// to re-anchor on when the owner of `key` is lost; `None` when no
    /// other node is known.
    pub async fn closest_predecessor_of(&self, key: u32) -> Option<NodeInfo> {
        self.known_nodes()
            .await
            .into_iter()
            .filter(|n| n.id != self.local.id && n.id != key)
            .min_by_key(|n| ring_distance(n.id, key))
    }

    /// Merges a newly learned node into the finger table.
    pub async fn add_node(&self, node: NodeInfo) {
        if node.id == self.local.id {
            return;
        }
        let mut guard = self.fingers.write().await;
        let mut known = self.with_predecessor(guard.node_set()).await;
        if known.iter().all(|n| n.id != node.id) {
            known.push(node);
        }
        *guard = Arc::new(FingerTable::rebuild(self.local.clone(), &known));
    }

    /// Drops a dead node from the table. The predecessor pointer is left to
    /// the failure handler, which knows whether a promotion is due.
    pub async fn remove_node(&self, id: u32) {
        let mut guard = self.fingers.write().await;
        let known: Vec<NodeInfo> = self
            .with_predecessor(guard.node_set())
            .await
            .into_iter()
            .filter(|n| n.id != id)
            .collect();
        *guard = Arc::new(FingerTable::rebuild(self.local.clone(), &known));
    }

    /// Merges a received node-set snapshot into the local view and rebuilds
    /// the table. Nodes already known locally are kept, so a snapshot from
    /// a peer with a narrower view never erases knowledge.
    pub async fn install_snapshot(&self, nodes: &[NodeInfo]) {
        let mut guard = self.fingers.write().await;
        let mut known = self.with_predecessor(guard.node_set()).await;
        for node in nodes {
            if known.iter().all(|n| n.id != node.id) {
                known.push(node.clone());
            }
        }
        *guard = Arc::new(FingerTable::rebuild(self.local.clone(), &known));
    }

    /// The table's node set extended with the predecessor pointer.
    async fn with_predecessor(&self, mut nodes: Vec<NodeInfo>) -> Vec<NodeInfo> {
        if let Some(pred) = self.predecessor.read().await.clone()
            && nodes.iter().all(|n| n.id != pred.id)
        {
            nodes.push(pred);
        }
        nodes
    }

    /// True when this node owns `key`: the key falls between the
    /// predecessor and this node walking clockwise. A node without a
    /// predecessor owns the entire ring.
    pub async fn is_responsible_for(&self, key: u32) -> bool {
        match self.predecessor.read().await.as_ref() {
            Some(pred) => in_interval(key, pred.id, self.local.id),
            None => true,
        }
    }

    /// Local best-known owner of `key`.
    ///
    /// Returns this node when it owns the key, the successor when the key
    /// falls in the successor's interval, and otherwise the closest finger
    /// preceding the key: the longest safe jump toward the owner. The
    /// caller forwards the message there and the next node repeats the
    /// computation with its own, closer view.
    pub async fn lookup(&self, key: u32) -> NodeInfo {
        if self.is_responsible_for(key).await {
            return self.local.clone();
        }
        let fingers = self.fingers.read().await.clone();
        let successor = fingers.successor().clone();
        if successor.id == self.local.id {
            // lone node
            return self.local.clone();
        }
        if in_interval(key, self.local.id, successor.id) {
            return successor;
        }
        fingers.closest_preceding(key).unwrap_or(successor)
    }
}

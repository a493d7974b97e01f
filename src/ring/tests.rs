use super::finger::FingerTable;
use super::router::DhtRouter;
use super::types::{
    FINGER_COUNT, NodeInfo, in_interval, ring_distance, ring_key,
};
use std::collections::HashMap;
use std::sync::Arc;

fn node(id: u32) -> NodeInfo {
    let port = 5000 + (id % 60_000) as u16;
    NodeInfo::new(id, format!("127.0.0.1:{port}").parse().unwrap())
}

/// Builds a fully converged router per node id: every router knows every
/// node and has its true ring predecessor set.
async fn converged_ring(ids: &[u32]) -> HashMap<u32, Arc<DhtRouter>> {
    let nodes: Vec<NodeInfo> = ids.iter().map(|id| node(*id)).collect();
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();

    let mut routers = HashMap::new();
    for (i, id) in sorted.iter().enumerate() {
        let router = Arc::new(DhtRouter::new(node(*id)));
        router.install_snapshot(&nodes).await;
        let pred = sorted[(i + sorted.len() - 1) % sorted.len()];
        if pred != *id {
            router.set_predecessor(Some(node(pred))).await;
        }
        routers.insert(*id, router);
    }
    routers
}

/// The clockwise-nearest node id at or after `key`.
fn expected_owner(ids: &[u32], key: u32) -> u32 {
    *ids.iter()
        .min_by_key(|id| ring_distance(key, **id))
        .expect("ring is never empty")
}

/// Simulates the distributed lookup walk and returns (owner, hops taken).
async fn walk_to_owner(
    routers: &HashMap<u32, Arc<DhtRouter>>,
    start: u32,
    key: u32,
) -> (u32, usize) {
    let mut current = start;
    let mut hops = 0usize;
    loop {
        let router = &routers[&current];
        if router.is_responsible_for(key).await {
            return (current, hops);
        }
        let next = router.lookup(key).await;
        let next_id = if next.id == current {
            router.successor().await.id
        } else {
            next.id
        };
        assert_ne!(next_id, current, "walk stuck at node {current} for key {key}");
        current = next_id;
        hops += 1;
        assert!(
            hops <= FINGER_COUNT + 1,
            "lookup for key {key} took more than {} hops",
            FINGER_COUNT + 1
        );
    }
}

// ============ KEY SPACE TESTS ============

#[test]
fn test_interval_plain_and_wrapping() {
    assert!(in_interval(15, 10, 20), "15 lies in (10, 20]");
    assert!(in_interval(20, 10, 20), "upper bound is inclusive");
    assert!(!in_interval(10, 10, 20), "lower bound is exclusive");
    assert!(!in_interval(25, 10, 20), "25 lies outside (10, 20]");

    // Interval wrapping through zero.
    assert!(in_interval(u32::MAX, u32::MAX - 5, 3));
    assert!(in_interval(1, u32::MAX - 5, 3));
    assert!(!in_interval(100, u32::MAX - 5, 3));

    // Degenerate interval covers the whole ring.
    assert!(in_interval(0, 7, 7));
    assert!(in_interval(u32::MAX, 7, 7));
}

#[test]
fn test_ring_key_is_deterministic() {
    let a = ring_key("alice@example.com");
    let b = ring_key("alice@example.com");
    assert_eq!(a, b, "the same email must always map to the same key");
    assert_ne!(
        ring_key("alice@example.com"),
        ring_key("bob@example.com"),
        "distinct emails should land on distinct keys"
    );
}

// ============ FINGER TABLE TESTS ============

#[test]
fn test_solitary_table_points_home() {
    let table = FingerTable::solitary(node(42));
    assert_eq!(table.successor().id, 42, "a lone node is its own successor");
    assert_eq!(table.node_set().len(), 1);
}

#[test]
fn test_rebuild_picks_clockwise_owner_per_slot() {
    let known = vec![node(100), node(2_000_000_000), node(3_000_000_000)];
    let table = FingerTable::rebuild(node(100), &known);

    // Small offsets fall between 100 and 2_000_000_000.
    assert_eq!(
        table.successor().id, 2_000_000_000,
        "the first slot must hold the ring successor"
    );
    // An ideal position past the last node wraps back to the lowest id.
    let far = FingerTable::rebuild(node(3_000_000_000), &known);
    assert_eq!(
        far.successor().id, 100,
        "the highest node's successor wraps around to the lowest"
    );
}

#[test]
fn test_rebuild_ignores_duplicate_candidates() {
    let known = vec![node(50), node(50), node(700)];
    let table = FingerTable::rebuild(node(10), &known);
    assert_eq!(table.node_set().len(), 3, "owner plus two distinct peers");
}

#[test]
fn test_closest_preceding_takes_longest_safe_jump() {
    let known = vec![node(10), node(20), node(30), node(1_000_000)];
    let table = FingerTable::rebuild(node(10), &known);

    let hop = table
        .closest_preceding(900_000)
        .expect("a finger precedes key 900_000");
    assert_eq!(hop.id, 30, "30 is the closest node strictly before 900_000");

    assert!(
        table.closest_preceding(15).is_none(),
        "no finger lies strictly between 10 and 15"
    );
}

// ============ ROUTER TESTS ============

#[tokio::test]
async fn test_lone_node_owns_everything() {
    let router = DhtRouter::new(node(7));
    assert!(router.is_responsible_for(7).await);
    assert!(router.is_responsible_for(0).await);
    assert!(router.is_responsible_for(u32::MAX).await);
    assert_eq!(router.lookup(123456).await.id, 7);
}

#[tokio::test]
async fn test_every_key_has_exactly_one_owner() {
    let ids: Vec<u32> = (0..16).map(|i| ring_key(&format!("node-{i}"))).collect();
    let routers = converged_ring(&ids).await;

    for sample in 0..200 {
        let key = ring_key(&format!("sample-{sample}"));
        let mut owners = 0;
        for router in routers.values() {
            if router.is_responsible_for(key).await {
                owners += 1;
            }
        }
        assert_eq!(owners, 1, "key {key} must have exactly one responsible node");
    }
}

#[tokio::test]
async fn test_walk_reaches_clockwise_owner_within_hop_bound() {
    let ids: Vec<u32> = (0..16).map(|i| ring_key(&format!("node-{i}"))).collect();
    let routers = converged_ring(&ids).await;

    for sample in 0..100 {
        let key = ring_key(&format!("walk-{sample}"));
        let start = ids[sample % ids.len()];
        let (owner, hops) = walk_to_owner(&routers, start, key).await;
        assert_eq!(
            owner,
            expected_owner(&ids, key),
            "walk for key {key} ended at the wrong node after {hops} hops"
        );
    }
}

#[tokio::test]
async fn test_two_node_ring_routes_both_ways() {
    let routers = converged_ring(&[1_000, 3_000_000_000]).await;
    let low = &routers[&1_000];
    let high = &routers[&3_000_000_000];

    assert!(low.is_responsible_for(500).await, "wrapped keys belong to the low node");
    assert!(high.is_responsible_for(2_000).await);
    assert_eq!(low.successor().await.id, 3_000_000_000);
    assert_eq!(high.successor().await.id, 1_000);
}

#[tokio::test]
async fn test_remove_node_routes_around_it() {
    let routers = converged_ring(&[100, 200, 300]).await;
    let router = &routers[&100];

    assert_eq!(router.lookup(150).await.id, 200);
    router.remove_node(200).await;
    assert_eq!(
        router.lookup(150).await.id,
        300,
        "after removal the next node clockwise takes over"
    );
    assert!(!router.knows(200).await);
}

#[tokio::test]
async fn test_snapshot_merge_keeps_local_knowledge() {
    let router = DhtRouter::new(node(10));
    router.add_node(node(500)).await;
    router.install_snapshot(&[node(10), node(900)]).await;

    assert!(router.knows(500).await, "a narrower peer snapshot must not erase node 500");
    assert!(router.knows(900).await);
}

#[tokio::test]
async fn test_closest_predecessor_of_skips_self_and_the_key() {
    let routers = converged_ring(&[100, 200, 300]).await;
    let router = &routers[&300];

    assert_eq!(
        router.closest_predecessor_of(200).await.map(|n| n.id),
        Some(100),
        "100 sits right before 200"
    );
    assert_eq!(
        router.closest_predecessor_of(250).await.map(|n| n.id),
        Some(200)
    );
    assert_eq!(
        router.closest_predecessor_of(100).await.map(|n| n.id),
        Some(200),
        "the node on the key and this node itself are skipped"
    );

    let lone = DhtRouter::new(node(7));
    assert!(
        lone.closest_predecessor_of(5).await.is_none(),
        "a lone node has no re-anchor candidate"
    );
}

#[tokio::test]
async fn test_concurrent_updates_keep_every_node() {
    let router = Arc::new(DhtRouter::new(node(10)));
    // ids sitting exactly on the owner's finger offsets, so each one
    // holds its own table slot once added
    let ids: Vec<u32> = (4..=30).map(|i| 10u32.wrapping_add(1u32 << i)).collect();

    let mut updates = Vec::new();
    for id in &ids {
        let router = router.clone();
        let id = *id;
        updates.push(tokio::spawn(async move {
            router.add_node(node(id)).await;
        }));
    }
    for update in updates {
        update.await.expect("membership update must not panic");
    }

    for id in &ids {
        assert!(router.knows(*id).await, "node {id} was lost by a concurrent update");
    }
}

use super::types::{Chat, ChatId, User};
use super::users::UserStore;
use crate::ring::types::ring_key;

fn sample_user(email: &str) -> User {
    User::new(email, "hunter2")
}

// ============ RECORD TESTS ============

#[test]
fn test_password_digest_roundtrip() {
    let user = sample_user("alice@example.com");
    assert!(user.verify_password("hunter2"));
    assert!(!user.verify_password("hunter3"), "wrong password must not verify");
}

#[test]
fn test_chat_always_contains_its_creator() {
    let chat = Chat::new("reading-group", "alice@example.com", vec!["bob@example.com".into()]);
    assert_eq!(chat.participants[0], "alice@example.com");
    assert_eq!(chat.participants.len(), 2);

    let explicit = Chat::new(
        "pairs",
        "alice@example.com",
        vec!["alice@example.com".into(), "bob@example.com".into()],
    );
    assert_eq!(explicit.participants.len(), 2, "creator must not be duplicated");
}

#[test]
fn test_chat_ids_are_unique() {
    assert_ne!(ChatId::new(), ChatId::new());
}

// ============ STORE TESTS ============

#[test]
fn test_insert_new_rejects_taken_key() {
    let store = UserStore::new();
    assert!(store.insert_new(sample_user("alice@example.com")));
    assert!(
        !store.insert_new(sample_user("alice@example.com")),
        "second signup with the same email must be rejected"
    );
    assert_eq!(store.primary_count(), 1);
}

#[test]
fn test_update_returns_replication_copy() {
    let store = UserStore::new();
    let user = sample_user("alice@example.com");
    let key = user.key();
    store.put(user);

    let chat = Chat::new("plans", "alice@example.com", vec![]);
    let chat_id = chat.id.clone();
    let updated = store
        .update(key, |u| {
            u.chats.insert(chat.id.clone(), chat.clone());
        })
        .expect("user is owned here");

    assert!(updated.chats.contains_key(&chat_id));
    let stored = store.get(key).expect("still stored");
    assert_eq!(stored, updated, "the returned copy must match the stored record");

    assert!(store.update(9999, |_| {}).is_none(), "unknown keys update nothing");
}

#[test]
fn test_pending_chats_queue_and_drain() {
    let store = UserStore::new();
    let user = sample_user("carol@example.com");
    let key = user.key();
    store.put(user);

    let chat = Chat::new("later", "alice@example.com", vec!["carol@example.com".into()]);
    store.update(key, |u| u.pending_chats.push(chat.clone()));

    let mut delivered = Vec::new();
    store.update(key, |u| {
        for pending in u.pending_chats.drain(..) {
            delivered.push(pending.clone());
            u.chats.insert(pending.id.clone(), pending);
        }
    });

    assert_eq!(delivered.len(), 1);
    let drained = store.get(key).expect("user");
    assert!(drained.pending_chats.is_empty());
    assert!(drained.chats.contains_key(&chat.id));
}

#[test]
fn test_split_off_moves_exactly_the_interval() {
    let store = UserStore::new();
    let emails: Vec<String> = (0..6).map(|i| format!("user{i}@example.com")).collect();
    for email in &emails {
        let user = sample_user(email);
        store.put_backup(user.clone());
        store.put(user);
    }

    let mut keys: Vec<u32> = emails.iter().map(|e| ring_key(e)).collect();
    keys.sort_unstable();
    let from = keys[5];
    let to = keys[2];

    // (max, keys[2]] wraps through zero and covers the three lowest keys.
    let (moved_users, moved_backups) = store.split_off(from, to);
    let mut moved_keys: Vec<u32> = moved_users.iter().map(|u| u.key()).collect();
    moved_keys.sort_unstable();

    assert_eq!(moved_keys, &keys[0..3], "exactly the wrapped interval moves");
    assert_eq!(moved_backups.len(), 3, "backups move with their primaries");
    assert_eq!(store.primary_count(), 3);
    assert_eq!(store.backup_count(), 3);
}

#[test]
fn test_install_does_not_clobber_owned_records() {
    let store = UserStore::new();
    let mut owned = sample_user("alice@example.com");
    owned.pending_chats.push(Chat::new("kept", "alice@example.com", vec![]));
    store.put(owned.clone());

    let stale = sample_user("alice@example.com");
    store.install(vec![stale], vec![]);

    let stored = store.get(owned.key()).expect("user");
    assert_eq!(
        stored.pending_chats.len(),
        1,
        "an installed batch must not overwrite a live primary"
    );
}

#[test]
fn test_promote_backups_inherits_the_range() {
    let store = UserStore::new();
    store.put(sample_user("mine@example.com"));
    store.put_backup(sample_user("theirs-1@example.com"));
    store.put_backup(sample_user("theirs-2@example.com"));

    // the degenerate interval is the whole ring: a last survivor
    // inherits everything
    let promoted = store.promote_backups(0, 0);

    assert_eq!(promoted, 2);
    assert_eq!(store.backup_count(), 0, "promotion drains the backup map");
    assert_eq!(store.primary_count(), 3);
    assert!(store.contains(ring_key("theirs-1@example.com")));
}

#[test]
fn test_promote_backups_is_bounded_to_the_interval() {
    let store = UserStore::new();
    let inherited = sample_user("inherited@example.com");
    let foreign = sample_user("foreign@example.com");
    let key = inherited.key();
    store.put_backup(inherited);
    store.put_backup(foreign.clone());

    // only the single-key interval (key - 1, key] is inherited
    let promoted = store.promote_backups(key.wrapping_sub(1), key);

    assert_eq!(promoted, 1);
    assert!(store.contains(key), "the inherited replica became primary");
    assert_eq!(store.backup_count(), 1, "the foreign replica stays a backup");
    assert!(!store.contains(foreign.key()));
}

#[test]
fn test_promote_backups_prefers_live_primary() {
    let store = UserStore::new();
    let mut fresh = sample_user("alice@example.com");
    let chat = Chat::new("recent", "alice@example.com", vec![]);
    fresh.chats.insert(chat.id.clone(), chat);
    store.put(fresh.clone());

    store.put_backup(sample_user("alice@example.com"));
    store.promote_backups(0, 0);

    let stored = store.get(fresh.key()).expect("user");
    assert_eq!(stored.chats.len(), 1, "the live primary copy wins over a stale backup");
}

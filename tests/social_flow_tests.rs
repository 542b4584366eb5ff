//! End-to-end social flows straight through the storage layer: the
//! engagement, follow-graph, and messaging/notification contracts.

use agora::storage::{
    EntryKind, LikeTarget, NewEntry, NewUser, Storage, UNREAD_MESSAGE_COUNT,
};

fn test_storage() -> Storage {
    let storage = Storage::open_in_memory().unwrap();
    storage.seed_roles().unwrap();
    storage
}

fn register(storage: &Storage, name: &str) -> i64 {
    storage
        .create_user(
            &NewUser {
                username: name.to_string(),
                email: format!("{name}@example.com"),
                password_hash: "00$ff".to_string(),
                first_name: None,
                last_name: None,
            },
            None,
        )
        .unwrap()
        .id
}

#[test]
fn message_flow_drives_unread_counter() {
    let storage = test_storage();
    let a = register(&storage, "a");
    let b = register(&storage, "b");

    // A sends "hello" to B: B's unread count becomes 1 and the counter
    // notification reflects it.
    storage.send_message(a, b, "hello").unwrap();
    assert_eq!(storage.unread_count(b).unwrap(), 1);

    let feed = storage.notifications_since(b, 0.0).unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].name, UNREAD_MESSAGE_COUNT);
    assert_eq!(feed[0].data(), serde_json::json!(1));

    // B reads the feed: count and notification drop to zero together.
    storage.mark_messages_read(b).unwrap();
    assert_eq!(storage.unread_count(b).unwrap(), 0);
    let feed = storage.notifications_since(b, 0.0).unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].data(), serde_json::json!(0));
}

#[test]
fn double_like_leaves_one_fact() {
    let storage = test_storage();
    let a = register(&storage, "a");
    let post = storage
        .insert_entry(&NewEntry {
            kind: EntryKind::Post,
            author_id: a,
            city: "Utrecht".to_string(),
            category: "travel".to_string(),
            title: "P".to_string(),
            body: "body".to_string(),
            summary: None,
        })
        .unwrap();

    storage.like(a, LikeTarget::Post, post.id).unwrap();
    storage.like(a, LikeTarget::Post, post.id).unwrap();
    assert_eq!(storage.count_likes(LikeTarget::Post, post.id).unwrap(), 1);
    assert!(storage.has_liked(a, LikeTarget::Post, post.id).unwrap());

    storage.unlike(a, LikeTarget::Post, post.id).unwrap();
    assert_eq!(storage.count_likes(LikeTarget::Post, post.id).unwrap(), 0);
    assert!(!storage.has_liked(a, LikeTarget::Post, post.id).unwrap());
}

#[test]
fn follow_restores_prior_state_on_round_trip() {
    let storage = test_storage();
    let a = register(&storage, "a");
    let b = register(&storage, "b");

    // Self-follow holds from creation.
    assert!(storage.is_following(a, a).unwrap());
    assert!(storage.is_following(b, b).unwrap());

    let before = storage.is_following(a, b).unwrap();
    storage.follow(a, b).unwrap();
    storage.unfollow(a, b).unwrap();
    assert_eq!(storage.is_following(a, b).unwrap(), before);
}

#[test]
fn notification_updates_replace_prior_value() {
    let storage = test_storage();
    let a = register(&storage, "a");

    storage
        .set_notification(a, UNREAD_MESSAGE_COUNT, &serde_json::json!(3))
        .unwrap();
    storage
        .set_notification(a, UNREAD_MESSAGE_COUNT, &serde_json::json!(5))
        .unwrap();

    assert_eq!(storage.count_notifications(a, UNREAD_MESSAGE_COUNT).unwrap(), 1);
    let feed = storage.notifications_since(a, 0.0).unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].data(), serde_json::json!(5));
}

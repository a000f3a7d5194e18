//! Parley Store Integration Tests

use futures_util::TryStreamExt;

use parley_store::{
    ChatStore, Error,
    delivery::MessageRef,
    identity::ProfilePatch,
    messages::MessageKind,
    notify,
    presence::ConnectedSet,
    storage::DEFAULT_ID_FLOOR,
};

async fn store() -> ChatStore {
    ChatStore::in_memory().await.unwrap()
}

async fn user(store: &ChatStore, name: &str) -> i64 {
    store.users().register(name, "hash").await.unwrap()
}

#[tokio::test]
async fn test_register_and_fetch_user() {
    let store = store().await;
    let id = user(&store, "alice").await;
    assert!(id > DEFAULT_ID_FLOOR);

    let alice = store.users().get(id).await.unwrap().unwrap();
    assert_eq!(alice.username, "alice");
    assert_eq!(alice.friends_updated_at, 0);
    assert_eq!(alice.groups_updated_at, 0);

    assert!(store.users().get(404).await.unwrap().is_none());
}

#[tokio::test]
async fn test_profile_patch_keeps_unset_fields() {
    let store = store().await;
    let id = user(&store, "alice").await;

    store
        .users()
        .update_profile(
            id,
            ProfilePatch {
                bio: Some("hi".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let alice = store.users().get(id).await.unwrap().unwrap();
    assert_eq!(alice.username, "alice");
    assert_eq!(alice.bio.as_deref(), Some("hi"));

    let err = store
        .users()
        .update_profile(
            404,
            ProfilePatch {
                bio: Some("x".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UserNotFound(404)));
}

#[tokio::test]
async fn test_password_round_trip() {
    let store = store().await;
    let id = user(&store, "alice").await;

    store.users().update_password(id, "hash2").await.unwrap();
    assert_eq!(
        store.users().password_hash(id).await.unwrap().as_deref(),
        Some("hash2")
    );
}

#[tokio::test]
async fn test_friendship_is_symmetric_and_unique() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;

    store.social().add_friend(a, b).await.unwrap();
    assert!(store.social().are_friends(a, b).await.unwrap());
    assert!(store.social().are_friends(b, a).await.unwrap());

    let err = store.social().add_friend(a, b).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyFriends(..)));
    // the reverse orientation hits the same canonical row
    let err = store.social().add_friend(b, a).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyFriends(..)));

    let friends_of_a = store.social().list_friends(a).await.unwrap();
    assert_eq!(friends_of_a.len(), 1);
    assert_eq!(friends_of_a[0].id, b);
    let friends_of_b = store.social().list_friends(b).await.unwrap();
    assert_eq!(friends_of_b.len(), 1);
    assert_eq!(friends_of_b[0].id, a);
}

#[tokio::test]
async fn test_self_friendship_is_rejected() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let err = store.social().add_friend(a, a).await.unwrap_err();
    assert!(matches!(err, Error::SelfFriendship(_)));
}

#[tokio::test]
async fn test_friend_mutations_stamp_both_endpoints() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;
    let pool = store.database().pool();

    store.social().add_friend(a, b).await.unwrap();
    let a_after_add = notify::freshness(pool, a).await.unwrap();
    let b_after_add = notify::freshness(pool, b).await.unwrap();
    assert!(a_after_add.friends_updated_at > 0);
    assert!(b_after_add.friends_updated_at > 0);
    assert_eq!(a_after_add.groups_updated_at, 0);

    store.social().remove_friend(b, a).await.unwrap();
    let a_after_remove = notify::freshness(pool, a).await.unwrap();
    assert!(a_after_remove.friends_updated_at > a_after_add.friends_updated_at);
    assert!(!store.social().are_friends(a, b).await.unwrap());

    let err = store.social().remove_friend(a, b).await.unwrap_err();
    assert!(matches!(err, Error::FriendshipNotFound(..)));
}

#[tokio::test]
async fn test_group_creation_enrolls_roster() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;
    let c = user(&store, "carol").await;
    let pool = store.database().pool();

    // duplicate and creator entries in the roster are dropped
    let group = store
        .groups()
        .create(a, "climbing", Some("weekend plans"), &[b, c, b, a])
        .await
        .unwrap();
    assert!(group > DEFAULT_ID_FLOOR);

    let record = store.groups().get(group).await.unwrap().unwrap();
    assert_eq!(record.name, "climbing");
    assert_eq!(record.creator_id, a);

    let members = store.social().members(group).await.unwrap();
    assert_eq!(members.len(), 3);

    let groups_of_b = store.social().list_groups(b).await.unwrap();
    assert_eq!(groups_of_b.len(), 1);
    assert_eq!(groups_of_b[0].id, group);

    for enrolled in [a, b, c] {
        let marks = notify::freshness(pool, enrolled).await.unwrap();
        assert!(marks.groups_updated_at > 0);
        assert_eq!(marks.friends_updated_at, 0);
    }
}

#[tokio::test]
async fn test_group_membership_lifecycle() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;
    let group = store.groups().create(a, "g", None, &[]).await.unwrap();

    store.social().join_group(group, b).await.unwrap();
    let err = store.social().join_group(group, b).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyMember(..)));

    store.social().leave_group(group, b).await.unwrap();
    let err = store.social().leave_group(group, b).await.unwrap_err();
    assert!(matches!(err, Error::MembershipNotFound(..)));

    let err = store.social().join_group(404, b).await.unwrap_err();
    assert!(matches!(err, Error::GroupNotFound(404)));
    let err = store.social().members(404).await.unwrap_err();
    assert!(matches!(err, Error::GroupNotFound(404)));
}

#[tokio::test]
async fn test_membership_mutations_stamp_the_acting_user() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;
    let pool = store.database().pool();
    let group = store.groups().create(a, "g", None, &[]).await.unwrap();

    store.social().join_group(group, b).await.unwrap();
    let after_join = notify::freshness(pool, b).await.unwrap();
    assert!(after_join.groups_updated_at > 0);

    store.social().leave_group(group, b).await.unwrap();
    let after_leave = notify::freshness(pool, b).await.unwrap();
    assert!(after_leave.groups_updated_at > after_join.groups_updated_at);
    assert_eq!(after_leave.friends_updated_at, 0);
}

#[tokio::test]
async fn test_duplicate_enqueue_produces_duplicate_delivery() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;
    let m = store.messages().send_direct(a, b, MessageKind::Text, "hi", 1).await.unwrap();

    // the queue does not dedupe; callers own that responsibility
    store.delivery().enqueue(b, MessageRef::Direct(m)).await.unwrap();
    store.delivery().enqueue(b, MessageRef::Direct(m)).await.unwrap();
    assert_eq!(store.delivery().pending_count(b).await.unwrap(), 2);
}

#[tokio::test]
async fn test_direct_history_is_ordered_and_scoped_to_the_pair() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;
    let c = user(&store, "carol").await;
    let messages = store.messages();

    // two sends share sent_at = 100; ids break the tie
    let m1 = messages.send_direct(a, b, MessageKind::Text, "one", 100).await.unwrap();
    let m2 = messages.send_direct(b, a, MessageKind::Text, "two", 100).await.unwrap();
    let m3 = messages.send_direct(a, b, MessageKind::Image, "blob:3", 50).await.unwrap();
    messages.send_direct(a, c, MessageKind::Text, "other pair", 10).await.unwrap();

    let history = messages.direct_history(b, a, 10, 0).await.unwrap();
    let ids: Vec<_> = history.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![m3, m1, m2]);
    assert_eq!(history[0].kind, MessageKind::Image);

    let page = messages.direct_history(a, b, 2, 1).await.unwrap();
    let ids: Vec<_> = page.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![m1, m2]);

    let err = messages
        .send_direct(a, 404, MessageKind::Text, "x", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UserNotFound(404)));
}

#[tokio::test]
async fn test_history_after_timestamp_resumes_without_overlap() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;
    let messages = store.messages();

    messages.send_direct(a, b, MessageKind::Text, "seen", 100).await.unwrap();
    let m2 = messages.send_direct(b, a, MessageKind::Text, "new", 150).await.unwrap();
    let m3 = messages.send_direct(a, b, MessageKind::Text, "newer", 200).await.unwrap();

    // records at exactly `since` are excluded; the client already has them
    let fresh = messages.direct_history_after(a, b, 100).await.unwrap();
    let ids: Vec<_> = fresh.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![m2, m3]);

    assert!(messages.direct_history_after(a, b, 200).await.unwrap().is_empty());
    assert_eq!(messages.latest_direct_timestamp(a, b).await.unwrap(), Some(200));
    assert_eq!(messages.latest_direct_timestamp(b, a).await.unwrap(), Some(200));

    let c = user(&store, "carol").await;
    assert_eq!(messages.latest_direct_timestamp(a, c).await.unwrap(), None);
}

#[tokio::test]
async fn test_group_history_after_timestamp() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;
    let group = store.groups().create(a, "g", None, &[b]).await.unwrap();
    let messages = store.messages();
    let online = ConnectedSet::new([a, b]);

    messages.send_group(a, group, MessageKind::Text, "old", 10, &online).await.unwrap();
    let m2 = messages.send_group(b, group, MessageKind::Text, "new", 20, &online).await.unwrap();

    let fresh = messages.group_history_after(group, 10).await.unwrap();
    let ids: Vec<_> = fresh.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![m2]);

    assert_eq!(messages.latest_group_timestamp(group).await.unwrap(), Some(20));

    let empty = store.groups().create(a, "empty", None, &[]).await.unwrap();
    assert_eq!(messages.latest_group_timestamp(empty).await.unwrap(), None);
    assert!(messages.group_history_after(empty, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_group_send_fans_out_to_offline_members_only() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;
    let c = user(&store, "carol").await;
    let group = store.groups().create(a, "g", None, &[b, c]).await.unwrap();

    let presence = ConnectedSet::new([a, b]);
    let id = store
        .messages()
        .send_group(a, group, MessageKind::Text, "hello", 100, &presence)
        .await
        .unwrap();

    // only carol was offline; the sender is never a fan-out target
    assert_eq!(store.delivery().pending_count(a).await.unwrap(), 0);
    assert_eq!(store.delivery().pending_count(b).await.unwrap(), 0);
    assert_eq!(store.delivery().pending_count(c).await.unwrap(), 1);

    let pending: Vec<_> = store.delivery().pending_for(c).try_collect().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].message, MessageRef::Group(id));
    assert_eq!(pending[0].sent_at, 100);

    let history = store.messages().group_history(group, 10, 0).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].body, "hello");
}

#[tokio::test]
async fn test_non_member_cannot_post_to_group() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;
    let group = store.groups().create(a, "g", None, &[]).await.unwrap();

    let err = store
        .messages()
        .send_group(b, group, MessageKind::Text, "hi", 1, &ConnectedSet::nobody())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotAMember(..)));
}

#[tokio::test]
async fn test_delivery_queue_drains_in_message_order() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;
    let queue = store.delivery();

    // two sends tied at timestamp 10, one at 20; enqueued newest-first
    let tied_1 = store.messages().send_direct(a, b, MessageKind::Text, "t1", 10).await.unwrap();
    let tied_2 = store.messages().send_direct(a, b, MessageKind::Text, "t2", 10).await.unwrap();
    let late = store.messages().send_direct(a, b, MessageKind::Text, "late", 20).await.unwrap();
    let d_late = queue.enqueue(b, MessageRef::Direct(late)).await.unwrap();
    let d_tied_2 = queue.enqueue(b, MessageRef::Direct(tied_2)).await.unwrap();
    let d_tied_1 = queue.enqueue(b, MessageRef::Direct(tied_1)).await.unwrap();

    // drained oldest-message-first with message id breaking the tie,
    // regardless of enqueue order
    let pending: Vec<_> = queue.pending_for(b).try_collect().await.unwrap();
    let ids: Vec<_> = pending.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![d_tied_1, d_tied_2, d_late]);
    assert!(pending.iter().all(|r| !r.delivered));
}

#[tokio::test]
async fn test_acknowledge_is_a_one_way_latch() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;

    let m = store.messages().send_direct(a, b, MessageKind::Text, "hi", 1).await.unwrap();
    let d = store.delivery().enqueue(b, MessageRef::Direct(m)).await.unwrap();

    store.delivery().acknowledge(d).await.unwrap();
    assert_eq!(store.delivery().pending_count(b).await.unwrap(), 0);

    let err = store.delivery().acknowledge(d).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyDelivered(_)));

    let err = store.delivery().acknowledge(404).await.unwrap_err();
    assert!(matches!(err, Error::DeliveryNotFound(404)));
}

#[tokio::test]
async fn test_enqueue_validates_recipient_and_message() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;
    let m = store.messages().send_direct(a, b, MessageKind::Text, "hi", 1).await.unwrap();

    let err = store
        .delivery()
        .enqueue(404, MessageRef::Direct(m))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UserNotFound(404)));

    let err = store
        .delivery()
        .enqueue(b, MessageRef::Direct(999_999_999))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MessageNotFound(_)));

    // a direct-message id is not valid in the group log
    let err = store
        .delivery()
        .enqueue(b, MessageRef::Group(m))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MessageNotFound(_)));
}

#[tokio::test]
async fn test_deleting_a_user_cascades() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;
    store.social().add_friend(a, b).await.unwrap();
    let m = store.messages().send_direct(a, b, MessageKind::Text, "hi", 1).await.unwrap();
    store.delivery().enqueue(b, MessageRef::Direct(m)).await.unwrap();

    store.users().delete(a).await.unwrap();

    assert!(store.users().get(a).await.unwrap().is_none());
    assert!(!store.social().are_friends(a, b).await.unwrap());
    assert!(store.messages().direct_history(a, b, 10, 0).await.unwrap().is_empty());
    assert_eq!(store.delivery().pending_count(b).await.unwrap(), 0);

    let err = store.users().delete(a).await.unwrap_err();
    assert!(matches!(err, Error::UserNotFound(_)));
}

#[tokio::test]
async fn test_deleting_a_group_cascades() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;
    let group = store.groups().create(a, "g", None, &[b]).await.unwrap();

    store
        .messages()
        .send_group(a, group, MessageKind::Text, "hi", 1, &ConnectedSet::new([a]))
        .await
        .unwrap();
    assert_eq!(store.delivery().pending_count(b).await.unwrap(), 1);

    store.groups().delete(group).await.unwrap();

    assert!(store.groups().get(group).await.unwrap().is_none());
    assert!(store.social().list_groups(b).await.unwrap().is_empty());
    assert!(store.messages().group_history(group, 10, 0).await.unwrap().is_empty());
    assert_eq!(store.delivery().pending_count(b).await.unwrap(), 0);

    let err = store.groups().delete(group).await.unwrap_err();
    assert!(matches!(err, Error::GroupNotFound(_)));
}

#[tokio::test]
async fn test_error_kinds_surface_failure_modes() {
    let store = store().await;
    let a = user(&store, "alice").await;
    let b = user(&store, "bob").await;
    store.social().add_friend(a, b).await.unwrap();

    let err = store.social().add_friend(a, b).await.unwrap_err();
    assert_eq!(err.kind(), parley_store::ErrorKind::AlreadyExists);

    let err = store.users().delete(404).await.unwrap_err();
    assert_eq!(err.kind(), parley_store::ErrorKind::NotFound);
}

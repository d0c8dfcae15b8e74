mod common;

use collection_sync::collection::{CollectionEventKind, CollectionStatus};
use collection_sync::error::CollectionError;
use collection_sync::store::{DocumentStore, keys};
use serde_json::{Value, json};

use common::{copy_of, harness, holders, ids, without_stamps};

#[tokio::test]
async fn create_writes_only_the_owner_copy() {
    let h = harness();
    let c = h.manager.create("Coffee", "u1", None).await.unwrap();

    assert_eq!(c.members, ids(&["u1"]));
    assert!(c.is_owner);
    assert_eq!(c.status, CollectionStatus::Active);
    assert!(c.places.is_empty());
    assert_eq!(holders(&h, &c.id), ids(&["u1"]));
    assert_eq!(copy_of(&h, "u1", &c.id).await.unwrap(), c);
}

#[tokio::test]
async fn create_without_identity_fails() {
    let h = harness();
    let err = h.manager.create("Coffee", "", None).await.unwrap_err();
    assert!(matches!(err, CollectionError::Authentication));
    assert!(h.store.snapshot().is_empty());
}

#[tokio::test]
async fn share_then_shrink_membership() {
    let h = harness();
    let c = h.manager.create("Brunch", "u1", Some("fork".into())).await.unwrap();

    h.manager
        .share(&c.id, "u1", &ids(&["u1"]), &ids(&["u1", "u2", "u3"]))
        .await
        .unwrap();

    assert_eq!(holders(&h, &c.id), ids(&["u1", "u2", "u3"]));
    let owner = copy_of(&h, "u1", &c.id).await.unwrap();
    assert_eq!(owner.members, ids(&["u1", "u2", "u3"]));
    assert!(owner.shared_at.is_some());

    let mirror = copy_of(&h, "u2", &c.id).await.unwrap();
    assert!(!mirror.is_owner);
    assert_eq!(mirror.user_id, "u1");
    assert_eq!(mirror.shared_by.as_deref(), Some("u1"));
    assert_eq!(mirror.icon_name.as_deref(), Some("fork"));
    assert_eq!(mirror.members, ids(&["u1", "u2", "u3"]));
    assert_eq!(mirror.created_at, c.created_at);

    let diff = h
        .manager
        .share(&c.id, "u1", &ids(&["u1", "u2", "u3"]), &ids(&["u1", "u3"]))
        .await
        .unwrap();
    assert_eq!(diff.to_remove, ids(&["u2"]));
    assert_eq!(diff.to_update, ids(&["u3"]));

    assert_eq!(holders(&h, &c.id), ids(&["u1", "u3"]));
    assert_eq!(copy_of(&h, "u3", &c.id).await.unwrap().members, ids(&["u1", "u3"]));
    assert_eq!(copy_of(&h, "u1", &c.id).await.unwrap().members, ids(&["u1", "u3"]));
}

#[tokio::test]
async fn resharing_the_same_members_changes_only_stamps() {
    let h = harness();
    let c = h.manager.create("Bars", "u1", None).await.unwrap();
    h.manager
        .share(&c.id, "u1", &ids(&["u1"]), &ids(&["u1", "u2", "u4"]))
        .await
        .unwrap();
    let before = without_stamps(h.store.snapshot());

    let diff = h
        .manager
        .share(&c.id, "u1", &ids(&["u1", "u2", "u4"]), &ids(&["u1", "u2", "u4"]))
        .await
        .unwrap();

    assert!(diff.to_add.is_empty());
    assert!(diff.to_remove.is_empty());
    assert_eq!(without_stamps(h.store.snapshot()), before);
}

#[tokio::test]
async fn mirrors_match_requested_members_after_every_share() {
    let h = harness();
    let c = h.manager.create("Parks", "u1", None).await.unwrap();

    let steps: [&[&str]; 5] = [
        &["u2", "u3"],
        &["u3", "u4", "u5"],
        &[],
        &["u1", "u5", "u2"],
        &["u2", "u3", "u4", "u5"],
    ];

    let mut current = ids(&["u1"]);
    for step in steps {
        let requested = ids(step);
        h.manager
            .share(&c.id, "u1", &current, &requested)
            .await
            .unwrap();

        let mut expected: Vec<String> = requested.iter().filter(|m| *m != "u1").cloned().collect();
        expected.push("u1".into());
        expected.sort();
        assert_eq!(holders(&h, &c.id), expected);

        // 每个副本的成员列表一致，且所有者在首位
        let owner = copy_of(&h, "u1", &c.id).await.unwrap();
        assert_eq!(owner.members[0], "u1");
        for holder in holders(&h, &c.id) {
            let copy = copy_of(&h, &holder, &c.id).await.unwrap();
            assert_eq!(copy.members, owner.members);
            assert_eq!(copy.members[0], "u1");
        }

        current = owner.members;
    }
}

#[tokio::test]
async fn failed_commit_leaves_every_copy_untouched() {
    let h = harness();
    let c = h.manager.create("Museums", "u1", None).await.unwrap();
    h.manager
        .share(&c.id, "u1", &ids(&["u1"]), &ids(&["u2", "u3"]))
        .await
        .unwrap();
    let before = h.store.snapshot();

    h.store.fail_next_commit();
    let err = h
        .manager
        .share(&c.id, "u1", &ids(&["u1", "u2", "u3"]), &ids(&["u4"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CollectionError::StoreWrite(_)));
    assert_eq!(h.store.snapshot(), before);

    h.store.fail_next_commit();
    let err = h.manager.complete_collection(&c.id, "u1").await.unwrap_err();
    assert!(matches!(err, CollectionError::StoreWrite(_)));
    assert_eq!(h.store.snapshot(), before);

    h.store.fail_next_commit();
    let err = h.manager.delete_collection(&c.id, "u1").await.unwrap_err();
    assert!(matches!(err, CollectionError::StoreWrite(_)));
    assert_eq!(h.store.snapshot(), before);
}

#[tokio::test]
async fn status_reaches_every_copy() {
    let h = harness();
    let c = h.manager.create("Hikes", "u1", None).await.unwrap();
    h.manager
        .share(&c.id, "u1", &ids(&["u1"]), &ids(&["u2", "u3"]))
        .await
        .unwrap();

    h.manager.complete_collection(&c.id, "u1").await.unwrap();
    for user in ["u1", "u2", "u3"] {
        let copy = copy_of(&h, user, &c.id).await.unwrap();
        assert_eq!(copy.status, CollectionStatus::Completed);
    }

    h.manager.put_back_collection(&c.id, "u1").await.unwrap();
    for user in ["u1", "u2", "u3"] {
        let copy = copy_of(&h, user, &c.id).await.unwrap();
        assert_eq!(copy.status, CollectionStatus::Active);
    }
}

#[tokio::test]
async fn completing_a_missing_collection_is_not_found() {
    let h = harness();
    let err = h.manager.complete_collection("nope", "u1").await.unwrap_err();
    assert!(matches!(err, CollectionError::NotFound(_)));
}

#[tokio::test]
async fn delete_removes_copies_for_any_member_count() {
    let all = ["u2", "u3", "u4", "u5"];
    for n in 0..=all.len() {
        let h = harness();
        let c = h.manager.create("Tmp", "u1", None).await.unwrap();
        if n > 0 {
            h.manager
                .share(&c.id, "u1", &ids(&["u1"]), &ids(&all[..n]))
                .await
                .unwrap();
        }
        assert_eq!(holders(&h, &c.id).len(), n + 1);

        h.manager.delete_collection(&c.id, "u1").await.unwrap();
        assert!(holders(&h, &c.id).is_empty(), "copies left for n = {}", n);
    }
}

#[tokio::test]
async fn delete_succeeds_when_thumbnail_cleanup_fails() {
    let h = harness();
    let c = h.manager.create("Art", "u1", None).await.unwrap();
    h.manager
        .set_thumbnail(&c.id, "u1", vec![0x89, 0x50, 0x4e, 0x47])
        .await
        .unwrap();
    h.blobs.fail_deletes(true);

    h.manager.delete_collection(&c.id, "u1").await.unwrap();

    assert!(holders(&h, &c.id).is_empty());
    assert!(h.blobs.contains(&keys::thumbnail_path("u1", &c.id)));
}

#[tokio::test]
async fn delete_cleans_thumbnail_and_profile_field() {
    let h = harness();
    let c = h.manager.create("Art", "u1", None).await.unwrap();
    let url = h
        .manager
        .set_thumbnail(&c.id, "u1", vec![1, 2, 3])
        .await
        .unwrap();

    let profile = h.store.get(&keys::profile_key("u1")).await.unwrap().unwrap();
    assert_eq!(profile["avatarThumbnailURL"], json!(url));

    h.manager.delete_collection(&c.id, "u1").await.unwrap();

    assert!(!h.blobs.contains(&keys::thumbnail_path("u1", &c.id)));
    let profile = h.store.get(&keys::profile_key("u1")).await.unwrap().unwrap();
    assert_eq!(profile["avatarThumbnailURL"], Value::Null);
}

#[tokio::test]
async fn concurrent_writer_makes_share_conflict() {
    let h = harness();
    let c = h.manager.create("Food", "u1", None).await.unwrap();
    let owner_key = keys::collection_key("u1", &c.id);

    // 在读取和提交之间，另一个写入者修改了权威副本
    let key = owner_key.clone();
    h.store.before_next_commit(move |docs| {
        if let Some(Value::Object(doc)) = docs.get_mut(&key) {
            doc.insert("revision".into(), json!(99));
        }
    });

    let err = h
        .manager
        .share(&c.id, "u1", &ids(&["u1"]), &ids(&["u2"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CollectionError::Conflict(_)));
    assert_eq!(holders(&h, &c.id), ids(&["u1"]));
    assert_eq!(copy_of(&h, "u1", &c.id).await.unwrap().members, ids(&["u1"]));
}

#[tokio::test]
async fn stale_member_view_is_rejected() {
    let h = harness();
    let c = h.manager.create("Food", "u1", None).await.unwrap();
    h.manager
        .share(&c.id, "u1", &ids(&["u1"]), &ids(&["u2"]))
        .await
        .unwrap();

    // 调用方仍以为只有所有者
    let err = h
        .manager
        .share(&c.id, "u1", &ids(&["u1"]), &ids(&["u3"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CollectionError::Conflict(_)));
    assert_eq!(holders(&h, &c.id), ids(&["u1", "u2"]));
}

#[tokio::test]
async fn sharing_with_blocked_or_unknown_users_writes_nothing() {
    let h = harness();
    let c = h.manager.create("Food", "u1", None).await.unwrap();
    let before = h.store.snapshot();

    h.users.block("u3", "u1");
    let err = h
        .manager
        .share(&c.id, "u1", &ids(&["u1"]), &ids(&["u2", "u3"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CollectionError::InvalidState(_)));

    let err = h
        .manager
        .share(&c.id, "u1", &ids(&["u1"]), &ids(&["ghost"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CollectionError::NotFound(_)));

    assert_eq!(h.store.snapshot(), before);
}

#[tokio::test]
async fn only_the_owner_can_share_complete_or_delete() {
    let h = harness();
    let c = h.manager.create("Food", "u1", None).await.unwrap();
    h.manager
        .share(&c.id, "u1", &ids(&["u1"]), &ids(&["u2"]))
        .await
        .unwrap();

    let err = h
        .manager
        .share(&c.id, "u2", &ids(&["u1", "u2"]), &ids(&["u2", "u3"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CollectionError::PermissionDenied(_)));

    let err = h.manager.complete_collection(&c.id, "u2").await.unwrap_err();
    assert!(matches!(err, CollectionError::PermissionDenied(_)));

    let err = h.manager.delete_collection(&c.id, "u2").await.unwrap_err();
    assert!(matches!(err, CollectionError::PermissionDenied(_)));
    assert_eq!(holders(&h, &c.id), ids(&["u1", "u2"]));
}

#[tokio::test]
async fn orphaned_collections_become_inactive_everywhere() {
    let h = harness();
    let c = h.manager.create("Old", "u1", None).await.unwrap();
    h.manager
        .share(&c.id, "u1", &ids(&["u1"]), &ids(&["u2"]))
        .await
        .unwrap();

    assert!(!h.manager.deactivate_orphaned(&c.id, "u1").await.unwrap());

    h.users.remove_account("u1");
    assert!(h.manager.deactivate_orphaned(&c.id, "u1").await.unwrap());
    for user in ["u1", "u2"] {
        let copy = copy_of(&h, user, &c.id).await.unwrap();
        assert_eq!(copy.status, CollectionStatus::Inactive);
    }

    // inactive 不能再被用户操作改回
    let err = h.manager.put_back_collection(&c.id, "u1").await.unwrap_err();
    assert!(matches!(err, CollectionError::InvalidState(_)));
    assert!(!h.manager.deactivate_orphaned(&c.id, "u1").await.unwrap());
}

#[tokio::test]
async fn orphan_without_owner_copy_deactivates_surviving_mirrors() {
    let h = harness();
    let c = h.manager.create("Gone", "u1", None).await.unwrap();
    h.manager
        .share(&c.id, "u1", &ids(&["u1"]), &ids(&["u2", "u3"]))
        .await
        .unwrap();

    h.users.remove_account("u1");
    h.store
        .delete(&keys::collection_key("u1", &c.id))
        .await
        .unwrap();
    let mut events = h.hub.subscribe();

    assert!(h.manager.deactivate_orphaned(&c.id, "u1").await.unwrap());
    for user in ["u2", "u3"] {
        let copy = copy_of(&h, user, &c.id).await.unwrap();
        assert_eq!(copy.status, CollectionStatus::Inactive);
    }
    assert!(copy_of(&h, "u1", &c.id).await.is_none());

    let event = events.recv().await.unwrap();
    assert_eq!(event.kind, CollectionEventKind::Deactivated);
    assert_eq!(event.members, ids(&["u2", "u3"]));
}

#[tokio::test]
async fn orphan_with_a_missing_mirror_deactivates_the_rest() {
    let h = harness();
    let c = h.manager.create("Gone", "u1", None).await.unwrap();
    h.manager
        .share(&c.id, "u1", &ids(&["u1"]), &ids(&["u2", "u3"]))
        .await
        .unwrap();

    h.users.remove_account("u1");
    h.store
        .delete(&keys::collection_key("u3", &c.id))
        .await
        .unwrap();

    assert!(h.manager.deactivate_orphaned(&c.id, "u1").await.unwrap());
    for user in ["u1", "u2"] {
        let copy = copy_of(&h, user, &c.id).await.unwrap();
        assert_eq!(copy.status, CollectionStatus::Inactive);
    }
    assert_eq!(holders(&h, &c.id), ids(&["u1", "u2"]));
}

#[tokio::test]
async fn orphan_with_no_copies_left_is_not_found() {
    let h = harness();
    h.users.remove_account("u1");
    let err = h
        .manager
        .deactivate_orphaned("nope", "u1")
        .await
        .unwrap_err();
    assert!(matches!(err, CollectionError::NotFound(_)));
}

#[tokio::test]
async fn repeating_complete_or_put_back_rewrites_every_copy() {
    let h = harness();
    let c = h.manager.create("Again", "u1", None).await.unwrap();
    h.manager
        .share(&c.id, "u1", &ids(&["u1"]), &ids(&["u2"]))
        .await
        .unwrap();

    // 进行中的收藏夹也可以放回
    let commits = h.store.commit_count();
    h.manager.put_back_collection(&c.id, "u1").await.unwrap();
    assert_eq!(h.store.commit_count(), commits + 1);
    assert_eq!(h.store.last_commit_keys().len(), 2);

    h.manager.complete_collection(&c.id, "u1").await.unwrap();
    h.manager.complete_collection(&c.id, "u1").await.unwrap();
    assert_eq!(h.store.commit_count(), commits + 3);
    assert_eq!(h.store.last_commit_keys().len(), 2);
    for user in ["u1", "u2"] {
        let copy = copy_of(&h, user, &c.id).await.unwrap();
        assert_eq!(copy.status, CollectionStatus::Completed);
    }
}

#[tokio::test]
async fn thumbnail_keeps_concurrent_profile_edits() {
    let h = harness();
    let c = h.manager.create("Art", "u1", None).await.unwrap();
    let profile_key = keys::profile_key("u1");
    h.store
        .set(&profile_key, json!({ "userId": "u1", "displayName": "Ann" }))
        .await
        .unwrap();

    // 读取资料之后、提交之前，另一个写入者修改了显示名
    let key = profile_key.clone();
    h.store.before_next_commit(move |docs| {
        if let Some(Value::Object(doc)) = docs.get_mut(&key) {
            doc.insert("displayName".into(), json!("Bea"));
        }
    });

    let url = h
        .manager
        .set_thumbnail(&c.id, "u1", vec![1, 2, 3])
        .await
        .unwrap();

    let profile = h.store.get(&profile_key).await.unwrap().unwrap();
    assert_eq!(profile["displayName"], json!("Bea"));
    assert_eq!(profile["avatarThumbnailURL"], json!(url));
}

#[tokio::test]
async fn successful_operations_publish_refresh_events() {
    let h = harness();
    let mut events = h.hub.subscribe();

    let c = h.manager.create("Events", "u1", None).await.unwrap();
    h.manager
        .share(&c.id, "u1", &ids(&["u1"]), &ids(&["u2"]))
        .await
        .unwrap();
    h.manager
        .share(&c.id, "u1", &ids(&["u1", "u2"]), &ids(&["u3"]))
        .await
        .unwrap();
    h.store.fail_next_commit();
    let _ = h.manager.complete_collection(&c.id, "u1").await;
    h.manager.delete_collection(&c.id, "u1").await.unwrap();

    let created = events.recv().await.unwrap();
    assert_eq!(created.kind, CollectionEventKind::Created);

    let shared = events.recv().await.unwrap();
    assert_eq!(shared.kind, CollectionEventKind::Shared);
    assert_eq!(shared.members, ids(&["u1", "u2"]));

    // 被移除的 u2 也收到刷新
    let reshared = events.recv().await.unwrap();
    assert_eq!(reshared.members, ids(&["u1", "u3", "u2"]));

    // 失败的 complete 不广播
    let deleted = events.recv().await.unwrap();
    assert_eq!(deleted.kind, CollectionEventKind::Deleted);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn list_returns_owned_and_shared_collections() {
    let h = harness();
    let mine = h.manager.create("Mine", "u2", None).await.unwrap();
    let theirs = h.manager.create("Theirs", "u1", None).await.unwrap();
    h.manager
        .share(&theirs.id, "u1", &ids(&["u1"]), &ids(&["u2"]))
        .await
        .unwrap();

    let listed = h.manager.list_collections("u2").await.unwrap();
    let mut names: Vec<&str> = listed.iter().map(|c| c.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["Mine", "Theirs"]);
    assert!(listed.iter().any(|c| c.id == mine.id && c.is_owner));
    assert!(listed.iter().any(|c| c.id == theirs.id && !c.is_owner));

    assert!(h.manager.list_collections("u5").await.unwrap().is_empty());
}

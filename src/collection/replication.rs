use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::error::CollectionError;
use crate::store::{DocKey, DocumentStore, WriteBatch, keys};
use crate::users::UserDirectory;

use super::{
    Collection, CollectionEvent, CollectionEventKind, CollectionStatus, PlaceFanout, RefreshHub,
};

/// 一次共享操作对成员集合的调整
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MembershipDiff {
    /// 共享后的完整成员列表，所有者在首位
    pub members: Vec<String>,
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
    pub to_update: Vec<String>,
}

impl MembershipDiff {
    pub fn compute(owner_id: &str, current: &[String], requested: &[String]) -> Self {
        let members = normalize_members(owner_id, requested);

        let current_set: HashSet<&str> = current
            .iter()
            .map(String::as_str)
            .filter(|m| *m != owner_id)
            .collect();
        let new_set: HashSet<&str> = members
            .iter()
            .map(String::as_str)
            .filter(|m| *m != owner_id)
            .collect();

        let (to_update, to_add): (Vec<String>, Vec<String>) = members
            .iter()
            .filter(|m| m.as_str() != owner_id)
            .cloned()
            .partition(|m| current_set.contains(m.as_str()));

        let mut seen = HashSet::new();
        let to_remove = current
            .iter()
            .filter(|m| m.as_str() != owner_id && !new_set.contains(m.as_str()))
            .filter(|m| seen.insert(m.as_str()))
            .cloned()
            .collect();

        Self {
            members,
            to_add,
            to_remove,
            to_update,
        }
    }
}

/// 所有者放在首位，去重并保持请求中的顺序
fn normalize_members(owner_id: &str, requested: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    seen.insert(owner_id);

    let mut members = vec![owner_id.to_string()];
    for m in requested {
        let m = m.trim();
        if !m.is_empty() && seen.insert(m) {
            members.push(m.to_string());
        }
    }
    members
}

pub(super) fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub(super) fn require_identity(user_id: &str) -> Result<(), CollectionError> {
    if user_id.trim().is_empty() {
        return Err(CollectionError::Authentication);
    }
    Ok(())
}

pub(super) fn ensure_mutable(collection: &Collection) -> Result<(), CollectionError> {
    if collection.status == CollectionStatus::Inactive {
        return Err(CollectionError::InvalidState(format!(
            "collection {} is inactive",
            collection.id
        )));
    }
    Ok(())
}

fn to_doc(collection: &Collection) -> Result<Value, CollectionError> {
    serde_json::to_value(collection).map_err(|e| CollectionError::StoreWrite(e.to_string()))
}

/// 收藏夹复制管理器
///
/// 每个收藏夹在所有者名下有一份权威副本，在其他成员名下各有一份镜像。
/// 整体操作（共享、完成、恢复、删除）在一个批次中写入所有副本，
/// 批次携带权威副本的 revision 作为前置条件，并发写入会以冲突失败。
pub struct ReplicationManager {
    pub(super) store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    users: Arc<dyn UserDirectory>,
    hub: RefreshHub,
    pub(super) place_fanout: PlaceFanout,
}

impl ReplicationManager {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        users: Arc<dyn UserDirectory>,
        hub: RefreshHub,
    ) -> Self {
        Self {
            store,
            blobs,
            users,
            hub,
            place_fanout: PlaceFanout::default(),
        }
    }

    pub fn with_place_fanout(mut self, place_fanout: PlaceFanout) -> Self {
        self.place_fanout = place_fanout;
        self
    }

    pub fn hub(&self) -> &RefreshHub {
        &self.hub
    }

    /// 创建收藏夹，只写所有者名下的一份
    pub async fn create(
        &self,
        name: &str,
        owner_id: &str,
        icon_name: Option<String>,
    ) -> Result<Collection, CollectionError> {
        require_identity(owner_id)?;

        let collection = Collection {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            places: Vec::new(),
            events: Vec::new(),
            user_id: owner_id.to_string(),
            is_owner: true,
            status: CollectionStatus::Active,
            members: vec![owner_id.to_string()],
            place_hearts: Default::default(),
            created_at: Utc::now(),
            shared_by: None,
            icon_name,
            icon_url: None,
            shared_at: None,
            avatar_thumbnail_url: None,
            revision: 1,
        };

        let key = keys::collection_key(owner_id, &collection.id);
        self.store
            .set(&key, to_doc(&collection)?)
            .await
            .map_err(CollectionError::write)?;

        tracing::info!("Collection {} created by {}", collection.id, owner_id);
        self.publish(CollectionEventKind::Created, &collection, collection.members.clone());
        Ok(collection)
    }

    /// 把成员列表从 current_members 调整为 new_member_list
    ///
    /// 权威副本的 members 和所有镜像的增删改在同一个批次中提交。
    /// current_members 与已存储的成员不一致时返回冲突。
    pub async fn share(
        &self,
        collection_id: &str,
        owner_id: &str,
        current_members: &[String],
        new_member_list: &[String],
    ) -> Result<MembershipDiff, CollectionError> {
        require_identity(owner_id)?;
        let authoritative = self.load_authoritative(collection_id, owner_id).await?;
        ensure_mutable(&authoritative)?;

        let stored: HashSet<&str> = authoritative.mirror_members().map(String::as_str).collect();
        let claimed: HashSet<&str> = current_members
            .iter()
            .map(String::as_str)
            .filter(|m| *m != owner_id)
            .collect();
        if stored != claimed {
            return Err(CollectionError::Conflict(format!(
                "members of collection {} changed since they were read",
                collection_id
            )));
        }

        let diff = MembershipDiff::compute(owner_id, current_members, new_member_list);

        // 检查新成员：账号必须存在，且双方都没有屏蔽对方
        for member in &diff.to_add {
            if !self
                .users
                .account_exists(member)
                .await
                .map_err(CollectionError::read)?
            {
                return Err(CollectionError::NotFound(format!("user {}", member)));
            }

            let blocked = self
                .users
                .is_blocked(owner_id, member)
                .await
                .map_err(CollectionError::read)?
                || self
                    .users
                    .is_blocked(member, owner_id)
                    .await
                    .map_err(CollectionError::read)?;
            if blocked {
                return Err(CollectionError::InvalidState(format!(
                    "cannot share with blocked user {}",
                    member
                )));
            }
        }

        let now = Utc::now();
        let revision = authoritative.revision + 1;
        let owner_key = keys::collection_key(owner_id, collection_id);

        let mut batch = WriteBatch::new();
        batch.expect_revision(owner_key.clone(), authoritative.revision).update(
            owner_key,
            object(json!({
                "members": diff.members,
                "sharedAt": now,
                "revision": revision,
            })),
        );

        for member in &diff.to_add {
            let mirror = authoritative.mirror_for(&diff.members, now, revision);
            batch.set(keys::collection_key(member, collection_id), to_doc(&mirror)?);
        }

        for member in &diff.to_remove {
            batch.delete(keys::collection_key(member, collection_id));
        }

        for member in &diff.to_update {
            batch.update(
                keys::collection_key(member, collection_id),
                object(json!({
                    "members": diff.members,
                    "sharedAt": now,
                    "revision": revision,
                })),
            );
        }

        self.store
            .commit(batch)
            .await
            .map_err(CollectionError::write)?;

        tracing::info!(
            "Collection {} shared by {}: +{} -{} ~{}",
            collection_id,
            owner_id,
            diff.to_add.len(),
            diff.to_remove.len(),
            diff.to_update.len()
        );

        // 被移除的成员也需要刷新
        let mut notified = diff.members.clone();
        notified.extend(diff.to_remove.iter().cloned());
        self.publish(CollectionEventKind::Shared, &authoritative, notified);

        Ok(diff)
    }

    /// 把所有副本标记为已完成
    pub async fn complete_collection(
        &self,
        collection_id: &str,
        owner_id: &str,
    ) -> Result<(), CollectionError> {
        self.set_status(
            collection_id,
            owner_id,
            CollectionStatus::Completed,
            CollectionEventKind::Completed,
        )
        .await
    }

    /// 把所有副本恢复为进行中
    pub async fn put_back_collection(
        &self,
        collection_id: &str,
        owner_id: &str,
    ) -> Result<(), CollectionError> {
        self.set_status(
            collection_id,
            owner_id,
            CollectionStatus::Active,
            CollectionEventKind::PutBack,
        )
        .await
    }

    async fn set_status(
        &self,
        collection_id: &str,
        owner_id: &str,
        status: CollectionStatus,
        kind: CollectionEventKind,
    ) -> Result<(), CollectionError> {
        require_identity(owner_id)?;
        let authoritative = self.load_authoritative(collection_id, owner_id).await?;
        ensure_mutable(&authoritative)?;

        self.commit_status(&authoritative, status).await?;

        tracing::info!("Collection {} status set to {:?}", collection_id, status);
        self.publish(kind, &authoritative, authoritative.members.clone());
        Ok(())
    }

    async fn commit_status(
        &self,
        authoritative: &Collection,
        status: CollectionStatus,
    ) -> Result<(), CollectionError> {
        let revision = authoritative.revision + 1;
        let fields = object(json!({ "status": status, "revision": revision }));
        let owner_key = keys::collection_key(&authoritative.user_id, &authoritative.id);

        let mut batch = WriteBatch::new();
        batch
            .expect_revision(owner_key.clone(), authoritative.revision)
            .update(owner_key, fields.clone());
        for member in authoritative.mirror_members() {
            batch.update(keys::collection_key(member, &authoritative.id), fields.clone());
        }

        self.store
            .commit(batch)
            .await
            .map_err(CollectionError::write)
    }

    /// 删除所有成员名下的副本，提交成功后再尽力清理缩略图
    pub async fn delete_collection(
        &self,
        collection_id: &str,
        owner_id: &str,
    ) -> Result<(), CollectionError> {
        require_identity(owner_id)?;
        let authoritative = self.load_authoritative(collection_id, owner_id).await?;
        let owner_key = keys::collection_key(owner_id, collection_id);

        let mut batch = WriteBatch::new();
        batch
            .expect_revision(owner_key.clone(), authoritative.revision)
            .delete(owner_key);
        for member in authoritative.mirror_members() {
            batch.delete(keys::collection_key(member, collection_id));
        }

        self.store
            .commit(batch)
            .await
            .map_err(CollectionError::write)?;

        tracing::info!(
            "Collection {} deleted with {} copies",
            collection_id,
            authoritative.members.len().max(1)
        );
        self.publish(
            CollectionEventKind::Deleted,
            &authoritative,
            authoritative.members.clone(),
        );

        // 元数据删除已生效，清理失败只记录日志
        self.cleanup_thumbnail(&authoritative).await;
        Ok(())
    }

    async fn cleanup_thumbnail(&self, collection: &Collection) {
        let path = keys::thumbnail_path(&collection.user_id, &collection.id);
        if let Err(e) = self.blobs.delete(&path).await {
            tracing::warn!("Failed to delete thumbnail {}: {}", path, e);
        }

        let Some(url) = collection.avatar_thumbnail_url.as_deref() else {
            return;
        };

        let profile_key = keys::profile_key(&collection.user_id);
        match self.store.get(&profile_key).await {
            Ok(Some(profile))
                if profile.get("avatarThumbnailURL").and_then(Value::as_str) == Some(url) =>
            {
                if let Err(e) = self
                    .store
                    .update(&profile_key, object(json!({ "avatarThumbnailURL": Value::Null })))
                    .await
                {
                    tracing::warn!("Failed to clear avatarThumbnailURL on {}: {}", profile_key, e);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to read profile {}: {}", profile_key, e),
        }
    }

    /// 上传缩略图并记录到权威副本和所有者资料
    pub async fn set_thumbnail(
        &self,
        collection_id: &str,
        owner_id: &str,
        png: Vec<u8>,
    ) -> Result<String, CollectionError> {
        require_identity(owner_id)?;
        let authoritative = self.load_authoritative(collection_id, owner_id).await?;
        ensure_mutable(&authoritative)?;

        let path = keys::thumbnail_path(owner_id, collection_id);
        let url = self
            .blobs
            .put(&path, png, "image/png")
            .await
            .map_err(|e| CollectionError::StoreWrite(e.to_string()))?;

        let profile_key = keys::profile_key(owner_id);
        let profile_exists = self
            .store
            .get(&profile_key)
            .await
            .map_err(CollectionError::read)?
            .is_some();

        let owner_key = keys::collection_key(owner_id, collection_id);
        let mut batch = WriteBatch::new();
        batch
            .expect_revision(owner_key.clone(), authoritative.revision)
            .update(
                owner_key,
                object(json!({
                    "avatarThumbnailURL": url,
                    "revision": authoritative.revision + 1,
                })),
            );
        // 资料已存在时只改这一个字段
        if profile_exists {
            batch.update(profile_key, object(json!({ "avatarThumbnailURL": url })));
        } else {
            batch.set(profile_key, json!({ "userId": owner_id, "avatarThumbnailURL": url }));
        }

        self.store
            .commit(batch)
            .await
            .map_err(CollectionError::write)?;

        self.publish(
            CollectionEventKind::ThumbnailChanged,
            &authoritative,
            vec![owner_id.to_string()],
        );
        Ok(url)
    }

    /// 所有者账号已删除时，把仍然存在的副本全部标记为 inactive
    ///
    /// 所有者副本可能已经不在，所以按 id 查找副本而不是依赖成员列表。
    /// 返回是否有副本被修改。
    pub async fn deactivate_orphaned(
        &self,
        collection_id: &str,
        owner_id: &str,
    ) -> Result<bool, CollectionError> {
        require_identity(owner_id)?;
        if self
            .users
            .account_exists(owner_id)
            .await
            .map_err(CollectionError::read)?
        {
            return Ok(false);
        }

        let copies: Vec<(DocKey, Collection)> = self
            .store
            .list_by_id(keys::COLLECTIONS_PREFIX, collection_id)
            .await
            .map_err(CollectionError::read)?
            .into_iter()
            .filter_map(|(key, doc)| match serde_json::from_value::<Collection>(doc) {
                Ok(c) if c.user_id == owner_id => Some((key, c)),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("Skipping malformed copy {}: {}", key, e);
                    None
                }
            })
            .collect();

        let Some((_, first)) = copies.first() else {
            return Err(CollectionError::NotFound(format!(
                "collection {} of {}",
                collection_id, owner_id
            )));
        };

        let mut batch = WriteBatch::new();
        for (key, copy) in copies
            .iter()
            .filter(|(_, c)| c.status != CollectionStatus::Inactive)
        {
            batch.expect_revision(key.clone(), copy.revision).update(
                key.clone(),
                object(json!({
                    "status": CollectionStatus::Inactive,
                    "revision": copy.revision + 1,
                })),
            );
        }
        if batch.ops().is_empty() {
            return Ok(false);
        }
        let written = batch.ops().len();

        self.store
            .commit(batch)
            .await
            .map_err(CollectionError::write)?;

        tracing::info!(
            "Collection {} deactivated on {} copies, owner {} no longer exists",
            collection_id,
            written,
            owner_id
        );
        let holders = copies
            .iter()
            .filter_map(|(key, _)| keys::collection_holder(key))
            .map(String::from)
            .collect();
        self.publish(CollectionEventKind::Deactivated, first, holders);
        Ok(true)
    }

    /// 读取某个用户名下的副本
    pub async fn get_collection(
        &self,
        user_id: &str,
        collection_id: &str,
    ) -> Result<Collection, CollectionError> {
        require_identity(user_id)?;
        self.load_copy(user_id, collection_id).await
    }

    /// 用户名下的全部收藏夹（自己创建的和共享给自己的），按创建时间倒序
    pub async fn list_collections(
        &self,
        user_id: &str,
    ) -> Result<Vec<Collection>, CollectionError> {
        require_identity(user_id)?;
        let docs = self
            .store
            .list(&keys::collections_namespace(user_id))
            .await
            .map_err(CollectionError::read)?;

        let mut collections: Vec<Collection> = docs
            .into_iter()
            .filter_map(|doc| match serde_json::from_value::<Collection>(doc) {
                Ok(c) => Some(c),
                Err(e) => {
                    tracing::warn!("Skipping malformed collection for {}: {}", user_id, e);
                    None
                }
            })
            .collect();

        collections.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(collections)
    }

    pub(super) async fn load_copy(
        &self,
        user_id: &str,
        collection_id: &str,
    ) -> Result<Collection, CollectionError> {
        let key = keys::collection_key(user_id, collection_id);
        let doc = self
            .store
            .get(&key)
            .await
            .map_err(CollectionError::read)?
            .ok_or_else(|| CollectionError::NotFound(format!("collection {}", key)))?;

        serde_json::from_value(doc)
            .map_err(|e| CollectionError::StoreRead(format!("malformed collection {}: {}", key, e)))
    }

    /// 读取所有者名下的权威副本
    pub(super) async fn load_authoritative(
        &self,
        collection_id: &str,
        owner_id: &str,
    ) -> Result<Collection, CollectionError> {
        let collection = self.load_copy(owner_id, collection_id).await?;
        if !collection.is_owner || collection.user_id != owner_id {
            return Err(CollectionError::PermissionDenied(format!(
                "{} does not own collection {}",
                owner_id, collection_id
            )));
        }
        Ok(collection)
    }

    pub(super) fn publish(
        &self,
        kind: CollectionEventKind,
        collection: &Collection,
        members: Vec<String>,
    ) {
        self.hub.publish(CollectionEvent {
            kind,
            collection_id: collection.id.clone(),
            owner_id: collection.user_id.clone(),
            members,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn diff_splits_add_remove_update() {
        let diff = MembershipDiff::compute(
            "u1",
            &ids(&["u1", "u2", "u3"]),
            &ids(&["u1", "u3", "u4"]),
        );
        assert_eq!(diff.members, ids(&["u1", "u3", "u4"]));
        assert_eq!(diff.to_add, ids(&["u4"]));
        assert_eq!(diff.to_remove, ids(&["u2"]));
        assert_eq!(diff.to_update, ids(&["u3"]));
    }

    #[test]
    fn owner_is_always_first_and_never_diffed() {
        let diff = MembershipDiff::compute("u1", &ids(&["u2"]), &ids(&["u3", "u1", "u3", " "]));
        assert_eq!(diff.members, ids(&["u1", "u3"]));
        assert_eq!(diff.to_add, ids(&["u3"]));
        assert_eq!(diff.to_remove, ids(&["u2"]));
        assert!(diff.to_update.is_empty());
    }

    #[test]
    fn empty_request_removes_everyone_but_owner() {
        let diff = MembershipDiff::compute("u1", &ids(&["u1", "u2", "u2"]), &[]);
        assert_eq!(diff.members, ids(&["u1"]));
        assert_eq!(diff.to_remove, ids(&["u2"]));
    }

    #[test]
    fn blank_identity_is_rejected() {
        assert!(matches!(
            require_identity("  "),
            Err(CollectionError::Authentication)
        ));
        assert!(require_identity("u1").is_ok());
    }
}

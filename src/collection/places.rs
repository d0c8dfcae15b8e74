// 地点、爱心、活动的单项修改
// 默认只写所有者副本和操作者副本，PlaceFanout::AllMembers 时写入全部副本

use chrono::Utc;
use serde_json::json;

use crate::error::CollectionError;
use crate::store::{WriteBatch, keys};

use super::replication::{ensure_mutable, object, require_identity};
use super::{Collection, CollectionEventKind, Event, Place, PlaceFanout, ReplicationManager};

impl ReplicationManager {
    /// 读取权威副本，应用修改，再按扇出策略写回
    async fn mutate<T, F>(
        &self,
        collection_id: &str,
        owner_id: &str,
        actor_id: &str,
        kind: CollectionEventKind,
        apply: F,
    ) -> Result<(Collection, T), CollectionError>
    where
        F: FnOnce(&mut Collection) -> Result<T, CollectionError>,
    {
        require_identity(actor_id)?;
        let mut collection = self.load_authoritative(collection_id, owner_id).await?;
        if !collection.is_member(actor_id) {
            return Err(CollectionError::PermissionDenied(format!(
                "{} is not a member of collection {}",
                actor_id, collection_id
            )));
        }
        ensure_mutable(&collection)?;

        let base_revision = collection.revision;
        let output = apply(&mut collection)?;
        collection.revision = base_revision + 1;

        let fields = object(json!({
            "places": collection.places,
            "events": collection.events,
            "placeHearts": collection.place_hearts,
            "revision": collection.revision,
        }));

        let targets: Vec<&str> = match self.place_fanout {
            PlaceFanout::OwnerAndActor if actor_id == owner_id => vec![owner_id],
            PlaceFanout::OwnerAndActor => vec![owner_id, actor_id],
            PlaceFanout::AllMembers => std::iter::once(owner_id)
                .chain(collection.mirror_members().map(String::as_str))
                .collect(),
        };

        let owner_key = keys::collection_key(owner_id, collection_id);
        let mut batch = WriteBatch::new();
        batch.expect_revision(owner_key, base_revision);
        for target in &targets {
            batch.update(keys::collection_key(target, collection_id), fields.clone());
        }

        self.store
            .commit(batch)
            .await
            .map_err(CollectionError::write)?;

        tracing::debug!(
            "Collection {} {:?} by {}, {} copies written",
            collection_id,
            kind,
            actor_id,
            targets.len()
        );
        let notified = targets.iter().map(|t| t.to_string()).collect();
        self.publish(kind, &collection, notified);

        Ok((collection, output))
    }

    /// 添加地点，已存在同一 place_id 时不重复添加
    pub async fn add_place(
        &self,
        collection_id: &str,
        owner_id: &str,
        actor_id: &str,
        place: Place,
    ) -> Result<Collection, CollectionError> {
        let (collection, _) = self
            .mutate(
                collection_id,
                owner_id,
                actor_id,
                CollectionEventKind::PlacesChanged,
                |c| {
                    if c.place(&place.place_id).is_none() {
                        c.places.push(place);
                    }
                    Ok(())
                },
            )
            .await?;
        Ok(collection)
    }

    /// 删除地点以及它的爱心记录
    pub async fn delete_place(
        &self,
        collection_id: &str,
        owner_id: &str,
        actor_id: &str,
        place_id: &str,
    ) -> Result<Collection, CollectionError> {
        let (collection, _) = self
            .mutate(
                collection_id,
                owner_id,
                actor_id,
                CollectionEventKind::PlacesChanged,
                |c| {
                    let before = c.places.len();
                    c.places.retain(|p| p.place_id != place_id);
                    if c.places.len() == before {
                        return Err(CollectionError::NotFound(format!("place {}", place_id)));
                    }
                    c.place_hearts.remove(place_id);
                    Ok(())
                },
            )
            .await?;
        Ok(collection)
    }

    /// 切换操作者对地点的爱心，返回切换后的状态
    pub async fn toggle_heart(
        &self,
        collection_id: &str,
        owner_id: &str,
        actor_id: &str,
        place_id: &str,
    ) -> Result<bool, CollectionError> {
        let (_, hearted) = self
            .mutate(
                collection_id,
                owner_id,
                actor_id,
                CollectionEventKind::HeartsChanged,
                |c| {
                    if c.place(place_id).is_none() {
                        return Err(CollectionError::NotFound(format!("place {}", place_id)));
                    }

                    let hearts = c.place_hearts.entry(place_id.to_string()).or_default();
                    let hearted = match hearts.iter().position(|u| u == actor_id) {
                        Some(i) => {
                            hearts.remove(i);
                            false
                        }
                        None => {
                            hearts.push(actor_id.to_string());
                            true
                        }
                    };
                    if hearts.is_empty() {
                        c.place_hearts.remove(place_id);
                    }
                    Ok(hearted)
                },
            )
            .await?;
        Ok(hearted)
    }

    pub async fn set_visited(
        &self,
        collection_id: &str,
        owner_id: &str,
        actor_id: &str,
        place_id: &str,
        visited: bool,
    ) -> Result<Collection, CollectionError> {
        let (collection, _) = self
            .mutate(
                collection_id,
                owner_id,
                actor_id,
                CollectionEventKind::PlacesChanged,
                |c| {
                    let place = c
                        .place_mut(place_id)
                        .ok_or_else(|| CollectionError::NotFound(format!("place {}", place_id)))?;
                    place.visited = visited;
                    Ok(())
                },
            )
            .await?;
        Ok(collection)
    }

    /// 把一个收藏夹中的地点复制到另一个收藏夹
    ///
    /// 操作者必须同时是两个收藏夹的成员。复制出的地点重置为未去过。
    pub async fn copy_place(
        &self,
        source_collection_id: &str,
        source_owner_id: &str,
        target_collection_id: &str,
        target_owner_id: &str,
        actor_id: &str,
        place_id: &str,
    ) -> Result<Collection, CollectionError> {
        require_identity(actor_id)?;
        let source = self
            .load_authoritative(source_collection_id, source_owner_id)
            .await?;
        if !source.is_member(actor_id) {
            return Err(CollectionError::PermissionDenied(format!(
                "{} is not a member of collection {}",
                actor_id, source_collection_id
            )));
        }

        let mut place = source
            .place(place_id)
            .cloned()
            .ok_or_else(|| CollectionError::NotFound(format!("place {}", place_id)))?;
        place.visited = false;
        place.added_at = Utc::now();

        self.add_place(target_collection_id, target_owner_id, actor_id, place)
            .await
    }

    /// 添加活动，已存在同一 event_id 时不重复添加
    pub async fn add_event(
        &self,
        collection_id: &str,
        owner_id: &str,
        actor_id: &str,
        event: Event,
    ) -> Result<Collection, CollectionError> {
        let (collection, _) = self
            .mutate(
                collection_id,
                owner_id,
                actor_id,
                CollectionEventKind::EventsChanged,
                |c| {
                    if !c.events.iter().any(|e| e.event_id == event.event_id) {
                        c.events.push(event);
                    }
                    Ok(())
                },
            )
            .await?;
        Ok(collection)
    }

    pub async fn delete_event(
        &self,
        collection_id: &str,
        owner_id: &str,
        actor_id: &str,
        event_id: &str,
    ) -> Result<Collection, CollectionError> {
        let (collection, _) = self
            .mutate(
                collection_id,
                owner_id,
                actor_id,
                CollectionEventKind::EventsChanged,
                |c| {
                    let before = c.events.len();
                    c.events.retain(|e| e.event_id != event_id);
                    if c.events.len() == before {
                        return Err(CollectionError::NotFound(format!("event {}", event_id)));
                    }
                    Ok(())
                },
            )
            .await?;
        Ok(collection)
    }
}

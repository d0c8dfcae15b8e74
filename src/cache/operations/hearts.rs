use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::cache::keys::place_hearts_key;
use crate::cache::models::hearts::CachedHearts;
use crate::collection::{Collection, CollectionEvent, CollectionEventKind};

/// 收藏夹爱心缓存
///
/// 缓存的是权威副本的 placeHearts，收到刷新事件前允许过期。
#[async_trait]
pub trait HeartsCache: Send + Sync {
    /// 缓存收藏夹的爱心记录
    async fn cache_hearts(&self, collection: &Collection) -> Result<(), redis::RedisError>;

    /// 获取缓存的爱心记录
    async fn get_hearts(
        &self,
        owner_id: &str,
        collection_id: &str,
    ) -> Result<Option<CachedHearts>, redis::RedisError>;

    /// 清除收藏夹的爱心缓存
    async fn invalidate(
        &self,
        owner_id: &str,
        collection_id: &str,
    ) -> Result<(), redis::RedisError>;
}

fn cached_from(collection: &Collection) -> CachedHearts {
    CachedHearts {
        collection_id: collection.id.clone(),
        owner_id: collection.user_id.clone(),
        place_hearts: collection.place_hearts.clone(),
        cached_at: chrono::Utc::now().timestamp(),
    }
}

/// 基于 Redis 的爱心缓存操作
#[derive(Clone)]
pub struct HeartCacheOperations {
    redis_client: Arc<RedisClient>,
    expire: Duration,
}

impl HeartCacheOperations {
    /// 创建新的爱心缓存操作实例
    pub fn new(redis_client: Arc<RedisClient>, expire: Duration) -> Self {
        Self {
            redis_client,
            expire,
        }
    }
}

#[async_trait]
impl HeartsCache for HeartCacheOperations {
    async fn cache_hearts(&self, collection: &Collection) -> Result<(), redis::RedisError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        // 序列化并保存到Redis
        let json = serde_json::to_string(&cached_from(collection)).map_err(|e| {
            redis::RedisError::from((redis::ErrorKind::IoError, "序列化错误", e.to_string()))
        })?;

        let key = place_hearts_key(&collection.user_id, &collection.id);
        let _: () = conn.set_ex(&key, json, self.expire.as_secs()).await?;
        tracing::debug!("Set hearts to cache: {}", key);

        Ok(())
    }

    async fn get_hearts(
        &self,
        owner_id: &str,
        collection_id: &str,
    ) -> Result<Option<CachedHearts>, redis::RedisError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        let key = place_hearts_key(owner_id, collection_id);
        let result: Option<String> = conn.get(&key).await?;

        match result {
            Some(json) => match serde_json::from_str::<CachedHearts>(&json) {
                Ok(cached) => {
                    tracing::debug!("Get hearts from cache: {}", key);
                    Ok(Some(cached))
                }
                Err(e) => {
                    // 格式不对就当作未命中
                    tracing::warn!("Discarding malformed hearts cache {}: {}", key, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn invalidate(
        &self,
        owner_id: &str,
        collection_id: &str,
    ) -> Result<(), redis::RedisError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(place_hearts_key(owner_id, collection_id)).await?;
        Ok(())
    }
}

/// 进程内爱心缓存，用于测试，不过期
#[derive(Default)]
pub struct MemoryHeartsCache {
    entries: Mutex<HashMap<String, CachedHearts>>,
}

impl MemoryHeartsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入一条缓存记录
    pub fn insert(&self, cached: CachedHearts) {
        let key = place_hearts_key(&cached.owner_id, &cached.collection_id);
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key, cached);
    }

    pub fn contains(&self, owner_id: &str, collection_id: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(&place_hearts_key(owner_id, collection_id))
    }
}

#[async_trait]
impl HeartsCache for MemoryHeartsCache {
    async fn cache_hearts(&self, collection: &Collection) -> Result<(), redis::RedisError> {
        self.insert(cached_from(collection));
        Ok(())
    }

    async fn get_hearts(
        &self,
        owner_id: &str,
        collection_id: &str,
    ) -> Result<Option<CachedHearts>, redis::RedisError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&place_hearts_key(owner_id, collection_id))
            .cloned())
    }

    async fn invalidate(
        &self,
        owner_id: &str,
        collection_id: &str,
    ) -> Result<(), redis::RedisError> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&place_hearts_key(owner_id, collection_id));
        Ok(())
    }
}

/// 需要清除爱心缓存的事件
pub fn invalidates_hearts(kind: CollectionEventKind) -> bool {
    matches!(
        kind,
        CollectionEventKind::HeartsChanged
            | CollectionEventKind::PlacesChanged
            | CollectionEventKind::Deleted
            | CollectionEventKind::Deactivated
    )
}

/// 订阅刷新事件，收到相关事件时清除对应的爱心缓存
pub fn spawn_invalidator(
    cache: Arc<dyn HeartsCache>,
    mut events: broadcast::Receiver<CollectionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if invalidates_hearts(event.kind) => {
                    if let Err(e) = cache
                        .invalidate(&event.owner_id, &event.collection_id)
                        .await
                    {
                        tracing::warn!(
                            "Failed to invalidate hearts cache for {}: {}",
                            event.collection_id,
                            e
                        );
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    // 丢失的事件无法逐个补清，缓存依靠过期时间兜底
                    tracing::warn!("Hearts invalidator lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::collection::RefreshHub;

    fn cached(owner_id: &str, collection_id: &str) -> CachedHearts {
        CachedHearts {
            collection_id: collection_id.to_string(),
            owner_id: owner_id.to_string(),
            place_hearts: BTreeMap::from([("p1".to_string(), vec!["u2".to_string()])]),
            cached_at: 0,
        }
    }

    fn event(kind: CollectionEventKind, owner_id: &str, collection_id: &str) -> CollectionEvent {
        CollectionEvent {
            kind,
            collection_id: collection_id.to_string(),
            owner_id: owner_id.to_string(),
            members: vec![owner_id.to_string()],
        }
    }

    #[test]
    fn only_place_level_and_removal_events_invalidate() {
        assert!(invalidates_hearts(CollectionEventKind::HeartsChanged));
        assert!(invalidates_hearts(CollectionEventKind::Deleted));
        assert!(!invalidates_hearts(CollectionEventKind::Shared));
        assert!(!invalidates_hearts(CollectionEventKind::Completed));
    }

    #[tokio::test]
    async fn invalidator_clears_entries_named_by_events() {
        let cache = Arc::new(MemoryHeartsCache::new());
        cache.insert(cached("u1", "c1"));
        cache.insert(cached("u1", "c2"));
        cache.insert(cached("u1", "c3"));

        let hub = RefreshHub::default();
        let handle = spawn_invalidator(cache.clone(), hub.subscribe());

        hub.publish(event(CollectionEventKind::HeartsChanged, "u1", "c1"));
        hub.publish(event(CollectionEventKind::Shared, "u1", "c2"));
        hub.publish(event(CollectionEventKind::Deleted, "u1", "c3"));
        // 关闭通道后任务处理完剩余事件再退出
        drop(hub);
        handle.await.unwrap();

        assert!(!cache.contains("u1", "c1"));
        assert!(cache.contains("u1", "c2"));
        assert!(!cache.contains("u1", "c3"));
    }

    #[tokio::test]
    async fn memory_cache_round_trips_collection_hearts() {
        let cache = MemoryHeartsCache::new();
        assert!(cache.get_hearts("u1", "c1").await.unwrap().is_none());

        cache.insert(cached("u1", "c1"));
        let hit = cache.get_hearts("u1", "c1").await.unwrap().unwrap();
        assert_eq!(hit.place_hearts["p1"], vec!["u2".to_string()]);

        cache.invalidate("u1", "c1").await.unwrap();
        assert!(!cache.contains("u1", "c1"));
    }
}

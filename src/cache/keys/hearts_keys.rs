/// 收藏夹爱心缓存键前缀
const PLACE_HEARTS_PREFIX: &str = "collection:hearts:";

/// 生成收藏夹爱心缓存键，以所有者和收藏夹ID定位权威副本
pub fn place_hearts_key(owner_id: &str, collection_id: &str) -> String {
    format!("{}{}:{}", PLACE_HEARTS_PREFIX, owner_id, collection_id)
}

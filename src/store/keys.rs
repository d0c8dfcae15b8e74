/// 文档键生成函数
use super::DocKey;

/// 收藏夹命名空间前缀
pub const COLLECTIONS_PREFIX: &str = "collections/";

/// 用户资料命名空间
pub const PROFILES_NAMESPACE: &str = "profiles";

/// 生成用户的收藏夹命名空间
pub fn collections_namespace(user_id: &str) -> String {
    format!("{}{}", COLLECTIONS_PREFIX, user_id)
}

/// 生成某个用户名下的收藏夹文档键
pub fn collection_key(user_id: &str, collection_id: &str) -> DocKey {
    DocKey::new(collections_namespace(user_id), collection_id)
}

/// 收藏夹文档键所属的用户
pub fn collection_holder(key: &DocKey) -> Option<&str> {
    key.namespace.strip_prefix(COLLECTIONS_PREFIX)
}

/// 生成用户资料文档键
pub fn profile_key(user_id: &str) -> DocKey {
    DocKey::new(PROFILES_NAMESPACE, user_id)
}

/// 收藏夹缩略图在对象存储中的路径
pub fn thumbnail_path(owner_id: &str, collection_id: &str) -> String {
    format!("thumbnails/{}/{}.png", owner_id, collection_id)
}

/// 头像分类清单在对象存储中的路径
pub fn avatar_manifest_path(category: &str) -> String {
    format!("avatars/{}.json", category)
}

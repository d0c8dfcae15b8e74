use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 收藏夹爱心缓存模型
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CachedHearts {
    pub collection_id: String,
    pub owner_id: String,
    pub place_hearts: BTreeMap<String, Vec<String>>,
    pub cached_at: i64, // Unix timestamp
}


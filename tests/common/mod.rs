#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use collection_sync::blob::MemoryBlobStore;
use collection_sync::collection::{Collection, Place, PlaceFanout, RefreshHub, ReplicationManager};
use collection_sync::store::{DocumentStore, MemoryDocumentStore, keys, memory::Documents};
use collection_sync::users::MemoryUserDirectory;

pub struct Harness {
    pub store: Arc<MemoryDocumentStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub users: Arc<MemoryUserDirectory>,
    pub hub: RefreshHub,
    pub manager: ReplicationManager,
}

pub fn harness() -> Harness {
    harness_with(PlaceFanout::OwnerAndActor)
}

pub fn harness_with(fanout: PlaceFanout) -> Harness {
    let store = Arc::new(MemoryDocumentStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let users = Arc::new(MemoryUserDirectory::with_accounts([
        "u1", "u2", "u3", "u4", "u5",
    ]));
    let hub = RefreshHub::default();
    let manager = ReplicationManager::new(store.clone(), blobs.clone(), users.clone(), hub.clone())
        .with_place_fanout(fanout);

    Harness {
        store,
        blobs,
        users,
        hub,
        manager,
    }
}

pub fn ids(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

pub fn place(id: &str) -> Place {
    Place {
        place_id: id.to_string(),
        name: format!("Place {}", id),
        formatted_address: "1 Main St".into(),
        rating: 4.5,
        phone_number: "555-0100".into(),
        visited: false,
        added_at: Utc::now(),
    }
}

/// 读取某个用户名下的副本
pub async fn copy_of(h: &Harness, user: &str, collection_id: &str) -> Option<Collection> {
    h.store
        .get(&keys::collection_key(user, collection_id))
        .await
        .unwrap()
        .map(|v| serde_json::from_value(v).unwrap())
}

/// 某个收藏夹现有副本所属的用户
pub fn holders(h: &Harness, collection_id: &str) -> Vec<String> {
    let mut users: Vec<String> = h
        .store
        .snapshot()
        .keys()
        .filter(|k| k.id == collection_id && k.namespace.starts_with("collections/"))
        .map(|k| k.namespace.trim_start_matches("collections/").to_string())
        .collect();
    users.sort();
    users
}

/// 去掉时间戳和版本号后的快照，用于比较内容是否变化
pub fn without_stamps(docs: Documents) -> Documents {
    docs.into_iter()
        .map(|(k, mut v)| {
            if let Value::Object(map) = &mut v {
                map.remove("sharedAt");
                map.remove("revision");
            }
            (k, v)
        })
        .collect()
}

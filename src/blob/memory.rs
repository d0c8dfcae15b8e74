use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{BlobError, BlobStore};

/// 进程内对象存储，记录读取次数并可注入删除失败
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    gets: AtomicUsize,
    fail_deletes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(path.to_string(), bytes.into());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(path)
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, BlobError> {
        self.insert(path, bytes);
        Ok(format!("memory://{}", path))
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, BlobError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        // 让出调度，便于测试并发加载的合并
        tokio::task::yield_now().await;
        Ok(self
            .objects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(path)
            .cloned())
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BlobError::Unavailable(format!("delete {} rejected", path)));
        }
        self.objects
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(path);
        Ok(())
    }
}

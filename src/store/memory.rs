use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{BatchOp, DocKey, DocumentStore, StoreError, WriteBatch, merge_fields, revision_of};

pub type Documents = BTreeMap<DocKey, Value>;
type CommitHook = Box<dyn FnOnce(&mut Documents) + Send>;

/// 进程内文档存储，用于测试和本地开发
///
/// 支持注入提交失败，以及在下一次提交前插入其他写入者的修改。
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<Documents>,
    fail_next_commit: AtomicBool,
    before_commit: Mutex<Option<CommitHook>>,
    last_commit: Mutex<Vec<DocKey>>,
    commits: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 下一次 commit 直接返回错误，不修改任何文档
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// 在下一次 commit 检查前置条件之前执行一次，模拟并发写入
    pub fn before_next_commit<F>(&self, hook: F)
    where
        F: FnOnce(&mut Documents) + Send + 'static,
    {
        *lock(&self.before_commit) = Some(Box::new(hook));
    }

    /// 成功提交的批次数量
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// 最近一次成功提交写到的文档键
    pub fn last_commit_keys(&self) -> Vec<DocKey> {
        lock(&self.last_commit).clone()
    }

    pub fn snapshot(&self) -> Documents {
        lock(&self.docs).clone()
    }

    pub fn contains(&self, key: &DocKey) -> bool {
        lock(&self.docs).contains_key(key)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, key: &DocKey) -> Result<Option<Value>, StoreError> {
        Ok(lock(&self.docs).get(key).cloned())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<Value>, StoreError> {
        Ok(lock(&self.docs)
            .iter()
            .filter(|(k, _)| k.namespace == namespace)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn list_by_id(
        &self,
        namespace_prefix: &str,
        id: &str,
    ) -> Result<Vec<(DocKey, Value)>, StoreError> {
        Ok(lock(&self.docs)
            .iter()
            .filter(|(k, _)| k.id == id && k.namespace.starts_with(namespace_prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn set(&self, key: &DocKey, doc: Value) -> Result<(), StoreError> {
        lock(&self.docs).insert(key.clone(), doc);
        Ok(())
    }

    async fn update(&self, key: &DocKey, fields: Map<String, Value>) -> Result<(), StoreError> {
        let mut docs = lock(&self.docs);
        let doc = docs
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        merge_fields(doc, &fields);
        Ok(())
    }

    async fn delete(&self, key: &DocKey) -> Result<(), StoreError> {
        lock(&self.docs).remove(key);
        Ok(())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }

        let hook = lock(&self.before_commit).take();
        let mut docs = lock(&self.docs);
        if let Some(hook) = hook {
            hook(&mut docs);
        }

        for (key, expected) in batch.preconditions() {
            let found = docs.get(key).map(revision_of);
            if found != Some(*expected) {
                return Err(StoreError::Conflict {
                    key: key.clone(),
                    expected: *expected,
                    found,
                });
            }
        }

        // 在副本上应用，全部成功后再替换，保证原子性
        let mut staged = docs.clone();
        for op in batch.ops() {
            match op {
                BatchOp::Set { key, doc } => {
                    staged.insert(key.clone(), doc.clone());
                }
                BatchOp::Update { key, fields } => {
                    let doc = staged
                        .get_mut(key)
                        .ok_or_else(|| StoreError::NotFound(key.clone()))?;
                    merge_fields(doc, fields);
                }
                BatchOp::Delete { key } => {
                    staged.remove(key);
                }
            }
        }

        *docs = staged;
        *lock(&self.last_commit) = batch.ops().iter().map(|op| op.key().clone()).collect();
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

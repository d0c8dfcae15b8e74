// 文档存储模块
// 以 (namespace, id) 寻址的 JSON 文档，支持原子批量提交

pub mod keys;
pub mod memory;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;

/// 文档中保存乐观并发版本号的字段
pub const REVISION_FIELD: &str = "revision";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocKey {
    pub namespace: String,
    pub id: String,
}

impl DocKey {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.id)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {0} not found")]
    NotFound(DocKey),
    #[error("revision mismatch on {key}: expected {expected}, found {found:?}")]
    Conflict {
        key: DocKey,
        expected: u64,
        found: Option<u64>,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// 批量提交中的单个写操作
#[derive(Debug, Clone)]
pub enum BatchOp {
    /// 整个文档覆盖写入
    Set { key: DocKey, doc: Value },
    /// 合并顶层字段，文档不存在时整个批次失败
    Update {
        key: DocKey,
        fields: Map<String, Value>,
    },
    /// 删除文档，不存在时视为成功
    Delete { key: DocKey },
}

impl BatchOp {
    pub fn key(&self) -> &DocKey {
        match self {
            BatchOp::Set { key, .. } | BatchOp::Update { key, .. } | BatchOp::Delete { key } => {
                key
            }
        }
    }
}

/// 原子批量写入：前置条件全部满足且所有操作都成功时才生效
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    preconditions: Vec<(DocKey, u64)>,
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// 要求提交时文档的 revision 仍等于读取时的值
    pub fn expect_revision(&mut self, key: DocKey, revision: u64) -> &mut Self {
        self.preconditions.push((key, revision));
        self
    }

    pub fn set(&mut self, key: DocKey, doc: Value) -> &mut Self {
        self.ops.push(BatchOp::Set { key, doc });
        self
    }

    pub fn update(&mut self, key: DocKey, fields: Map<String, Value>) -> &mut Self {
        self.ops.push(BatchOp::Update { key, fields });
        self
    }

    pub fn delete(&mut self, key: DocKey) -> &mut Self {
        self.ops.push(BatchOp::Delete { key });
        self
    }

    pub fn preconditions(&self) -> &[(DocKey, u64)] {
        &self.preconditions
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &DocKey) -> Result<Option<Value>, StoreError>;

    /// 返回命名空间下的全部文档
    async fn list(&self, namespace: &str) -> Result<Vec<Value>, StoreError>;

    /// 返回命名空间以 namespace_prefix 开头、id 相同的全部文档
    async fn list_by_id(
        &self,
        namespace_prefix: &str,
        id: &str,
    ) -> Result<Vec<(DocKey, Value)>, StoreError>;

    async fn set(&self, key: &DocKey, doc: Value) -> Result<(), StoreError>;

    async fn update(&self, key: &DocKey, fields: Map<String, Value>) -> Result<(), StoreError>;

    async fn delete(&self, key: &DocKey) -> Result<(), StoreError>;

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// 读取文档中的 revision 字段，缺失时视为 0
pub fn revision_of(doc: &Value) -> u64 {
    doc.get(REVISION_FIELD).and_then(Value::as_u64).unwrap_or(0)
}

/// 把字段合并到 JSON 对象的顶层
pub(crate) fn merge_fields(doc: &mut Value, fields: &Map<String, Value>) {
    if let Value::Object(obj) = doc {
        for (k, v) in fields {
            obj.insert(k.clone(), v.clone());
        }
    }
}

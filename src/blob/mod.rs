// 对象存储模块
// 按路径存取二进制对象，上传后返回可访问的 URL

pub mod http;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpBlobStore;
pub use memory::MemoryBlobStore;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("blob store returned status {status} for {path}")]
    Status { path: String, status: u16 },
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 上传对象，返回可访问的 URL
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str)
    -> Result<String, BlobError>;

    /// 读取对象，不存在时返回 None
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, BlobError>;

    /// 删除对象，不存在时视为成功
    async fn delete(&self, path: &str) -> Result<(), BlobError>;
}

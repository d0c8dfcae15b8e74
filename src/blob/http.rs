use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::CONTENT_TYPE};

use super::{BlobError, BlobStore};

/// 通过 HTTP 访问的对象存储桶，路径直接拼接在 base_url 之后
#[derive(Clone)]
pub struct HttpBlobStore {
    client: Client,
    base_url: String,
}

impl HttpBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BlobError> {
        let url = self.url(path);
        let resp = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BlobError::Status {
                path: path.to_string(),
                status: resp.status().as_u16(),
            });
        }

        tracing::debug!("Uploaded blob: {}", url);
        Ok(url)
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let resp = self.client.get(self.url(path)).send().await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(resp.bytes().await?.to_vec())),
            s => Err(BlobError::Status {
                path: path.to_string(),
                status: s.as_u16(),
            }),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        let resp = self.client.delete(self.url(path)).send().await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(()),
            s if s.is_success() => Ok(()),
            s => Err(BlobError::Status {
                path: path.to_string(),
                status: s.as_u16(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let store = HttpBlobStore::new("https://bucket.example.com/");
        assert_eq!(
            store.url("/avatars/hats.json"),
            "https://bucket.example.com/avatars/hats.json"
        );
    }
}

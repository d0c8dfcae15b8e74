// 头像资源目录
// 每个分类一个 JSON 清单：{ "子分类": ["模型ID", ...] }

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::OnceCell;

use crate::blob::BlobStore;
use crate::store::keys::avatar_manifest_path;

/// 子分类 -> 模型ID列表
pub type Manifest = HashMap<String, Vec<String>>;

/// 头像模型清单的只读缓存
///
/// 第一次 `load` 并发下载所有分类的清单，并发调用共享同一次下载。
/// 清单缺失或格式错误时该分类按空清单处理，不影响其他分类。
pub struct AvatarCatalog {
    blobs: Arc<dyn BlobStore>,
    categories: Vec<String>,
    manifests: OnceCell<HashMap<String, Manifest>>,
}

impl AvatarCatalog {
    pub fn new(blobs: Arc<dyn BlobStore>, categories: Vec<String>) -> Self {
        Self {
            blobs,
            categories,
            manifests: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.manifests.initialized()
    }

    pub async fn load(&self) -> &HashMap<String, Manifest> {
        self.manifests.get_or_init(|| self.fetch_all()).await
    }

    /// 内存查询，未加载或不存在时返回空列表
    pub fn get(&self, category: &str, subcategory: &str) -> Vec<String> {
        self.manifests
            .get()
            .and_then(|m| m.get(category))
            .and_then(|m| m.get(subcategory))
            .cloned()
            .unwrap_or_default()
    }

    async fn fetch_all(&self) -> HashMap<String, Manifest> {
        let fetches = self.categories.iter().map(|category| async move {
            (category.clone(), self.fetch_manifest(category).await)
        });

        let manifests: HashMap<String, Manifest> = join_all(fetches).await.into_iter().collect();
        tracing::info!("Loaded {} avatar categories", manifests.len());
        manifests
    }

    async fn fetch_manifest(&self, category: &str) -> Manifest {
        let path = avatar_manifest_path(category);
        match self.blobs.get(&path).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Manifest>(&bytes) {
                Ok(manifest) => manifest,
                Err(e) => {
                    tracing::warn!("Malformed avatar manifest {}: {}", path, e);
                    Manifest::new()
                }
            },
            Ok(None) => {
                tracing::warn!("Avatar manifest {} not found", path);
                Manifest::new()
            }
            Err(e) => {
                tracing::warn!("Failed to fetch avatar manifest {}: {}", path, e);
                Manifest::new()
            }
        }
    }
}

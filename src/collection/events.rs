use serde::Serialize;
use tokio::sync::broadcast;

/// 刷新事件的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionEventKind {
    Created,
    Shared,
    Completed,
    PutBack,
    Deleted,
    Deactivated,
    PlacesChanged,
    HeartsChanged,
    EventsChanged,
    ThumbnailChanged,
}

/// 每次写操作成功后广播，观察者据此刷新本地缓存
#[derive(Debug, Clone, Serialize)]
pub struct CollectionEvent {
    pub kind: CollectionEventKind,
    pub collection_id: String,
    pub owner_id: String,
    pub members: Vec<String>,
}

/// 刷新广播
#[derive(Clone)]
pub struct RefreshHub {
    tx: broadcast::Sender<CollectionEvent>,
}

impl RefreshHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: CollectionEvent) {
        // 没有订阅者时 send 返回错误，忽略即可
        if self.tx.send(event).is_err() {
            tracing::trace!("No refresh subscribers");
        }
    }
}

impl Default for RefreshHub {
    fn default() -> Self {
        Self::new(256)
    }
}

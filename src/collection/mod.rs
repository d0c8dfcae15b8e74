// 收藏夹模块
// 权威副本 + 成员镜像的复制与共享逻辑

pub mod events;
pub mod model;
mod places;
pub mod replication;

pub use events::{CollectionEvent, CollectionEventKind, RefreshHub};
pub use model::{Collection, CollectionStatus, Event, Place};
pub use replication::{MembershipDiff, ReplicationManager};

use serde::{Deserialize, Serialize};

/// 单个地点修改时写入哪些副本
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceFanout {
    /// 只写所有者副本和操作者自己的副本
    #[default]
    OwnerAndActor,
    /// 写入所有成员的副本
    AllMembers,
}

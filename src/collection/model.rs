use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    Active,
    Completed,
    Inactive,
}

/// 收藏夹中保存的地点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub formatted_address: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub visited: bool,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: String,
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub location_name: String,
    #[serde(default)]
    pub location_address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub user_id: String,
}

/// 收藏夹文档，每个成员名下各保存一份
///
/// 所有者名下的一份是权威副本（`is_owner == true`），其余为镜像。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub places: Vec<Place>,
    #[serde(default)]
    pub events: Vec<Event>,
    pub user_id: String,
    pub is_owner: bool,
    pub status: CollectionStatus,
    pub members: Vec<String>,
    #[serde(default)]
    pub place_hearts: BTreeMap<String, Vec<String>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        rename = "avatarThumbnailURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar_thumbnail_url: Option<String>,
    #[serde(default)]
    pub revision: u64,
}

impl Collection {
    pub fn is_member(&self, user_id: &str) -> bool {
        user_id == self.user_id || self.members.iter().any(|m| m == user_id)
    }

    /// 除所有者外的成员
    pub fn mirror_members(&self) -> impl Iterator<Item = &String> {
        self.members.iter().filter(move |m| **m != self.user_id)
    }

    pub fn place(&self, place_id: &str) -> Option<&Place> {
        self.places.iter().find(|p| p.place_id == place_id)
    }

    pub fn place_mut(&mut self, place_id: &str) -> Option<&mut Place> {
        self.places.iter_mut().find(|p| p.place_id == place_id)
    }

    /// 为新成员生成镜像副本
    pub fn mirror_for(&self, members: &[String], shared_at: DateTime<Utc>, revision: u64) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            places: self.places.clone(),
            events: self.events.clone(),
            user_id: self.user_id.clone(),
            is_owner: false,
            status: self.status,
            members: members.to_vec(),
            place_hearts: self.place_hearts.clone(),
            created_at: self.created_at,
            shared_by: Some(self.user_id.clone()),
            icon_name: self.icon_name.clone(),
            icon_url: None,
            shared_at: Some(shared_at),
            avatar_thumbnail_url: None,
            revision,
        }
    }
}

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::collection::{Event, Place};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCollectionRequest {
    pub name: String,
    pub icon_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionIdRequest {
    pub collection_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShareRequest {
    pub collection_id: String,
    /// 客户端看到的当前成员
    pub current_members: Vec<String>,
    /// 期望的新成员列表
    pub members: Vec<String>,
}

/// 客户端提交的地点，added_at 由服务端填写
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceInput {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub formatted_address: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub phone_number: String,
}

impl From<PlaceInput> for Place {
    fn from(input: PlaceInput) -> Self {
        Self {
            place_id: input.place_id,
            name: input.name,
            formatted_address: input.formatted_address,
            rating: input.rating,
            phone_number: input.phone_number,
            visited: false,
            added_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddPlaceRequest {
    pub collection_id: String,
    pub owner_id: String,
    pub place: PlaceInput,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlaceRequest {
    pub collection_id: String,
    pub owner_id: String,
    pub place_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VisitedRequest {
    pub collection_id: String,
    pub owner_id: String,
    pub place_id: String,
    pub visited: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CopyPlaceRequest {
    pub source_collection_id: String,
    pub source_owner_id: String,
    pub target_collection_id: String,
    pub target_owner_id: String,
    pub place_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddEventRequest {
    pub collection_id: String,
    pub owner_id: String,
    pub event: Event,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventRequest {
    pub collection_id: String,
    pub owner_id: String,
    pub event_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartsQuery {
    pub collection_id: String,
    pub owner_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartResponse {
    pub hearted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartsResponse {
    pub place_hearts: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThumbnailResponse {
    pub url: String,
}

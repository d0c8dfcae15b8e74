use axum::{
    body::Bytes,
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::AppState;
use crate::collection::Collection;
use crate::error::CollectionError;
use crate::middleware::CurrentUser;
use crate::utils::{
    collection_error_response, error_codes, error_to_api_response, success_to_api_response,
};

use super::model::{
    AddEventRequest, AddPlaceRequest, CollectionIdRequest, CopyPlaceRequest,
    CreateCollectionRequest, EventRequest, HeartResponse, HeartsQuery, HeartsResponse,
    PlaceRequest, ShareRequest, ThumbnailResponse, VisitedRequest,
};

#[axum::debug_handler]
pub async fn create_collection(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<CreateCollectionRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "收藏夹名称不能为空".to_string(),
            ),
        );
    }

    match state.manager.create(&req.name, &user_id, req.icon_name).await {
        Ok(collection) => (StatusCode::CREATED, success_to_api_response(collection)),
        Err(e) => collection_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn list_collections(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> impl IntoResponse {
    match state.manager.list_collections(&user_id).await {
        Ok(collections) => (StatusCode::OK, success_to_api_response(collections)),
        Err(e) => collection_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn get_collection(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<CollectionIdRequest>,
) -> impl IntoResponse {
    match state
        .manager
        .get_collection(&user_id, &query.collection_id)
        .await
    {
        Ok(collection) => (StatusCode::OK, success_to_api_response(collection)),
        Err(e) => collection_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn share_collection(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<ShareRequest>,
) -> impl IntoResponse {
    match state
        .manager
        .share(
            &req.collection_id,
            &user_id,
            &req.current_members,
            &req.members,
        )
        .await
    {
        Ok(diff) => (StatusCode::OK, success_to_api_response(diff)),
        Err(e) => collection_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn complete_collection(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<CollectionIdRequest>,
) -> impl IntoResponse {
    match state
        .manager
        .complete_collection(&req.collection_id, &user_id)
        .await
    {
        Ok(_) => (
            StatusCode::OK,
            success_to_api_response(serde_json::json!({ "success": true })),
        ),
        Err(e) => collection_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn put_back_collection(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<CollectionIdRequest>,
) -> impl IntoResponse {
    match state
        .manager
        .put_back_collection(&req.collection_id, &user_id)
        .await
    {
        Ok(_) => (
            StatusCode::OK,
            success_to_api_response(serde_json::json!({ "success": true })),
        ),
        Err(e) => collection_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn delete_collection(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<CollectionIdRequest>,
) -> impl IntoResponse {
    match state
        .manager
        .delete_collection(&req.collection_id, &user_id)
        .await
    {
        Ok(_) => (
            StatusCode::OK,
            success_to_api_response(serde_json::json!({ "success": true })),
        ),
        Err(e) => collection_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn set_thumbnail(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<CollectionIdRequest>,
    body: Bytes,
) -> impl IntoResponse {
    if body.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_to_api_response(error_codes::VALIDATION_ERROR, "缩略图不能为空".to_string()),
        );
    }

    match state
        .manager
        .set_thumbnail(&query.collection_id, &user_id, body.to_vec())
        .await
    {
        Ok(url) => (StatusCode::OK, success_to_api_response(ThumbnailResponse { url })),
        Err(e) => collection_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn add_place(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<AddPlaceRequest>,
) -> impl IntoResponse {
    match state
        .manager
        .add_place(&req.collection_id, &req.owner_id, &user_id, req.place.into())
        .await
    {
        Ok(collection) => (StatusCode::OK, success_to_api_response(collection)),
        Err(e) => collection_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn delete_place(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<PlaceRequest>,
) -> impl IntoResponse {
    match state
        .manager
        .delete_place(&req.collection_id, &req.owner_id, &user_id, &req.place_id)
        .await
    {
        Ok(collection) => (StatusCode::OK, success_to_api_response(collection)),
        Err(e) => collection_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn toggle_heart(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<PlaceRequest>,
) -> impl IntoResponse {
    match state
        .manager
        .toggle_heart(&req.collection_id, &req.owner_id, &user_id, &req.place_id)
        .await
    {
        Ok(hearted) => (StatusCode::OK, success_to_api_response(HeartResponse { hearted })),
        Err(e) => collection_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn set_visited(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<VisitedRequest>,
) -> impl IntoResponse {
    match state
        .manager
        .set_visited(
            &req.collection_id,
            &req.owner_id,
            &user_id,
            &req.place_id,
            req.visited,
        )
        .await
    {
        Ok(collection) => (StatusCode::OK, success_to_api_response(collection)),
        Err(e) => collection_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn copy_place(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<CopyPlaceRequest>,
) -> impl IntoResponse {
    match state
        .manager
        .copy_place(
            &req.source_collection_id,
            &req.source_owner_id,
            &req.target_collection_id,
            &req.target_owner_id,
            &user_id,
            &req.place_id,
        )
        .await
    {
        Ok(collection) => (StatusCode::OK, success_to_api_response(collection)),
        Err(e) => collection_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn add_event(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<AddEventRequest>,
) -> impl IntoResponse {
    match state
        .manager
        .add_event(&req.collection_id, &req.owner_id, &user_id, req.event)
        .await
    {
        Ok(collection) => (StatusCode::OK, success_to_api_response(collection)),
        Err(e) => collection_error_response(e),
    }
}

#[axum::debug_handler]
pub async fn delete_event(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<EventRequest>,
) -> impl IntoResponse {
    match state
        .manager
        .delete_event(&req.collection_id, &req.owner_id, &user_id, &req.event_id)
        .await
    {
        Ok(collection) => (StatusCode::OK, success_to_api_response(collection)),
        Err(e) => collection_error_response(e),
    }
}

/// 读取权威副本的爱心记录，优先走缓存
#[axum::debug_handler]
pub async fn get_hearts(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<HeartsQuery>,
) -> impl IntoResponse {
    // 用户自己名下有副本才算成员
    let own_copy = match state
        .manager
        .get_collection(&user_id, &query.collection_id)
        .await
    {
        Ok(c) => c,
        Err(e) => return collection_error_response(e),
    };
    if own_copy.user_id != query.owner_id {
        return collection_error_response(CollectionError::NotFound(format!(
            "collection {} of {}",
            query.collection_id, query.owner_id
        )));
    }
    if own_copy.is_owner {
        return hearts_response(own_copy);
    }

    match state
        .hearts
        .get_hearts(&query.owner_id, &query.collection_id)
        .await
    {
        Ok(Some(cached)) => {
            return (
                StatusCode::OK,
                success_to_api_response(HeartsResponse {
                    place_hearts: cached.place_hearts,
                }),
            );
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Hearts cache unavailable: {}", e),
    }

    match state
        .manager
        .get_collection(&query.owner_id, &query.collection_id)
        .await
    {
        Ok(authoritative) => {
            if let Err(e) = state.hearts.cache_hearts(&authoritative).await {
                tracing::warn!("Failed to cache hearts: {}", e);
            }
            hearts_response(authoritative)
        }
        Err(e) => collection_error_response(e),
    }
}

fn hearts_response(
    collection: Collection,
) -> (StatusCode, axum::Json<crate::result::ApiResponse<HeartsResponse>>) {
    (
        StatusCode::OK,
        success_to_api_response(HeartsResponse {
            place_hearts: collection.place_hearts,
        }),
    )
}

use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};

use crate::AppState;
use crate::middleware::{RateLimiter, auth_middleware, log_errors, rate_limit};
use crate::routes;

// 收藏夹相关的路由
pub fn collection_routes() -> Router<AppState> {
    Router::new()
        .route("/collections/create", post(routes::collection::create_collection))
        .route("/collections/list", get(routes::collection::list_collections))
        .route("/collections/by-id", get(routes::collection::get_collection))
        .route("/collections/share", post(routes::collection::share_collection))
        .route("/collections/complete", post(routes::collection::complete_collection))
        .route("/collections/put-back", post(routes::collection::put_back_collection))
        .route("/collections/delete", post(routes::collection::delete_collection))
        .route("/collections/thumbnail", post(routes::collection::set_thumbnail))
        .route("/collections/hearts", get(routes::collection::get_hearts))
        // 地点相关
        .route("/collections/places/add", post(routes::collection::add_place))
        .route("/collections/places/delete", post(routes::collection::delete_place))
        .route("/collections/places/heart", post(routes::collection::toggle_heart))
        .route("/collections/places/copy", post(routes::collection::copy_place))
        .route("/collections/places/visited", post(routes::collection::set_visited))
        // 活动相关
        .route("/collections/events/add", post(routes::collection::add_event))
        .route("/collections/events/delete", post(routes::collection::delete_event))
}

// 头像资源相关的路由
pub fn avatar_routes() -> Router<AppState> {
    Router::new().route("/avatars/models", get(routes::avatar::get_models))
}

async fn health() -> &'static str {
    "ok"
}

// 创建主路由，所有业务路由都需要认证
pub fn create_router(state: AppState, rate_limiter: Option<Arc<RateLimiter>>) -> Router {
    let mut protected = Router::new()
        .merge(collection_routes())
        .merge(avatar_routes());

    // 限流放在认证之后，才能按用户计数
    if let Some(limiter) = rate_limiter {
        protected = protected.layer(from_fn_with_state(limiter, rate_limit));
    }

    let protected = protected.layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(from_fn(log_errors))
        .with_state(state)
}

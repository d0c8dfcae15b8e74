use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::utils::success_to_api_response;

#[derive(Debug, Deserialize)]
pub struct AvatarQuery {
    pub category: String,
    pub subcategory: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AvatarModelsResponse {
    pub category: String,
    pub subcategory: String,
    pub models: Vec<String>,
}

#[axum::debug_handler]
pub async fn get_models(
    State(state): State<AppState>,
    Query(query): Query<AvatarQuery>,
) -> impl IntoResponse {
    // 首次请求时加载清单，之后都是内存查询
    state.catalog.load().await;
    let models = state.catalog.get(&query.category, &query.subcategory);

    (
        StatusCode::OK,
        success_to_api_response(AvatarModelsResponse {
            category: query.category,
            subcategory: query.subcategory,
            models,
        }),
    )
}

use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::result::ApiResponse;
use crate::store::StoreError;
use crate::utils::error_codes;

/// 收藏夹操作的错误类型
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("no authenticated user")]
    Authentication,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store read failed: {0}")]
    StoreRead(String),
    #[error("store write failed: {0}")]
    StoreWrite(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl CollectionError {
    /// 读取路径上的存储错误
    pub fn read(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => CollectionError::Conflict(err.to_string()),
            other => CollectionError::StoreRead(other.to_string()),
        }
    }

    /// 写入路径上的存储错误，批量提交冲突单独上报
    pub fn write(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => CollectionError::Conflict(err.to_string()),
            other => CollectionError::StoreWrite(other.to_string()),
        }
    }

    pub fn status_and_code(&self) -> (StatusCode, i32) {
        match self {
            CollectionError::Authentication => (StatusCode::UNAUTHORIZED, error_codes::AUTH_FAILED),
            CollectionError::NotFound(_) => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND),
            CollectionError::StoreRead(_) | CollectionError::StoreWrite(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_ERROR)
            }
            CollectionError::InvalidState(_) => (StatusCode::CONFLICT, error_codes::INVALID_STATE),
            CollectionError::Conflict(_) => (StatusCode::CONFLICT, error_codes::CONFLICT),
            CollectionError::PermissionDenied(_) => {
                (StatusCode::FORBIDDEN, error_codes::PERMISSION_DENIED)
            }
        }
    }
}

/// 中间件和提取器使用的错误
#[derive(Debug)]
pub enum AppError {
    Unauthorized,
    RateLimited(u64),
    Collection(CollectionError),
}

impl From<CollectionError> for AppError {
    fn from(err: CollectionError) -> Self {
        AppError::Collection(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, msg) = match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                error_codes::AUTH_FAILED,
                "未授权访问".to_string(),
            ),
            AppError::RateLimited(window) => (
                StatusCode::TOO_MANY_REQUESTS,
                error_codes::RATE_LIMIT,
                format!("请求过于频繁，请在{}秒后重试", window),
            ),
            AppError::Collection(err) => {
                let (status, code) = err.status_and_code();
                (status, code, err.to_string())
            }
        };

        let body = Json(ApiResponse::<()>::error(code, &msg));

        (status, body).into_response()
    }
}

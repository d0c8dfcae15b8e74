use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    cache::{RateLimitCacheOperations, keys::rate_limit_key},
    config::Config,
    error::AppError,
    utils::Claims,
};

#[derive(Clone)]
pub struct RateLimiter {
    redis: Arc<redis::Client>,
    config: Arc<Config>,
}

impl RateLimiter {
    pub fn new(redis: Arc<redis::Client>, config: Config) -> Self {
        Self {
            redis,
            config: Arc::new(config),
        }
    }

    pub async fn check_rate_limit(&self, req: Request<Body>, next: Next) -> Response {
        // 已认证请求按用户计数，否则按来源IP
        let user_id = req.extensions().get::<Claims>().map(|c| c.sub.clone());
        let remote_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string());
        let ip = req
            .headers()
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .or_else(|| {
                req.headers()
                    .get("x-forwarded-for")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
            })
            .or(remote_ip.as_deref())
            .unwrap_or("unknown")
            .trim()
            .to_string();

        let key = rate_limit_key(user_id.as_deref(), &ip);
        let window = self.config.rate_limit_window().as_secs();

        match RateLimitCacheOperations::hit(&self.redis, &key, window).await {
            Ok(count) if count > self.config.rate_limit_requests => {
                tracing::info!("Rate limited {}", key);
                AppError::RateLimited(window).into_response()
            }
            Ok(_) => next.run(req).await,
            Err(e) => {
                // Redis 不可用时放行
                tracing::warn!("Rate limit check failed for {}: {}", key, e);
                next.run(req).await
            }
        }
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    limiter.check_rate_limit(req, next).await
}

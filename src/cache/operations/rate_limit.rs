use std::sync::Arc;

use redis::{AsyncCommands, Client as RedisClient};

/// 速率限制计数操作
pub struct RateLimitCacheOperations;

impl RateLimitCacheOperations {
    /// 计数加一，第一次计数时设置窗口过期时间，返回窗口内的请求数
    pub async fn hit(
        redis: &Arc<RedisClient>,
        key: &str,
        window_secs: u64,
    ) -> Result<u32, redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;

        // 使用 Redis 的 INCR 和 EXPIRE 命令实现计数器
        let count: u32 = conn.incr(key, 1).await?;
        if count == 1 {
            let _: () = conn.expire(key, window_secs as i64).await?;
        }

        Ok(count)
    }
}

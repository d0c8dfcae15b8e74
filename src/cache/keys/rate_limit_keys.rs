/// 限流计数键前缀
const RATE_LIMIT_PREFIX: &str = "rate_limit:";

/// 生成限流计数键，已登录用户按用户ID计数，否则按IP
pub fn rate_limit_key(user_id: Option<&str>, ip: &str) -> String {
    match user_id {
        Some(uid) => format!("{}user:{}", RATE_LIMIT_PREFIX, uid),
        None => format!("{}ip:{}", RATE_LIMIT_PREFIX, ip),
    }
}

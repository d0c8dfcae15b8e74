/// 缓存操作
/// 提供缓存操作的功能实现

// 爱心缓存操作
pub mod hearts;

// 限流计数操作
pub mod rate_limit;

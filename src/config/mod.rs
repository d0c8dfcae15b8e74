use std::env;
use std::time::Duration;

use crate::collection::PlaceFanout;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub blob_base_url: String,
    pub avatar_categories: Vec<String>,
    pub place_fanout: PlaceFanout,
    pub hearts_cache_expire_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .unwrap_or_else(|_| "24h".into())
            .trim_end_matches('h')
            .parse::<u64>()
            .unwrap_or(24);

        // 逗号分隔的头像分类列表
        let avatar_categories = env::var("AVATAR_CATEGORIES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();

        let place_fanout = match env::var("PLACE_FANOUT").as_deref() {
            Ok("all_members") => PlaceFanout::AllMembers,
            Ok("owner_and_actor") | Err(_) => PlaceFanout::OwnerAndActor,
            Ok(other) => {
                tracing::warn!("Unknown PLACE_FANOUT {:?}, using owner_and_actor", other);
                PlaceFanout::OwnerAndActor
            }
        };

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")?.parse().unwrap_or(3000),
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration * 3600,
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW")?.parse().unwrap_or(60),
            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")?.parse().unwrap_or(100),
            blob_base_url: env::var("BLOB_BASE_URL")?,
            avatar_categories,
            place_fanout,
            hearts_cache_expire_secs: env::var("HEARTS_CACHE_EXPIRE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn hearts_cache_expire(&self) -> Duration {
        Duration::from_secs(self.hearts_cache_expire_secs)
    }
}

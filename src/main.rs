use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use collection_sync::{
    AppState,
    assets::AvatarCatalog,
    blob::HttpBlobStore,
    cache::{HeartCacheOperations, HeartsCache, spawn_invalidator},
    collection::{RefreshHub, ReplicationManager},
    config::Config,
    middleware::RateLimiter,
    router::create_router,
    store::PgDocumentStore,
    users::PgUserDirectory,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
#[cfg(debug_assertions)]
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'collection_sync';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let pool = Arc::new(pool);

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let redis = Arc::new(redis_client);

    // 组装存储和复制管理器
    let hub = RefreshHub::default();
    let blobs = Arc::new(HttpBlobStore::new(config.blob_base_url.clone()));
    let manager = ReplicationManager::new(
        Arc::new(PgDocumentStore::new(pool.clone())),
        blobs.clone(),
        Arc::new(PgUserDirectory::new(pool.clone())),
        hub.clone(),
    )
    .with_place_fanout(config.place_fanout);
    tracing::info!("Place fan-out: {:?}", config.place_fanout);

    let catalog = Arc::new(AvatarCatalog::new(blobs, config.avatar_categories.clone()));
    // 后台预加载头像清单
    {
        let catalog = catalog.clone();
        tokio::spawn(async move {
            catalog.load().await;
        });
    }

    let hearts: Arc<dyn HeartsCache> = Arc::new(HeartCacheOperations::new(
        redis.clone(),
        config.hearts_cache_expire(),
    ));
    spawn_invalidator(hearts.clone(), hub.subscribe());

    // 设置应用状态
    let state = AppState {
        config: config.clone(),
        manager: Arc::new(manager),
        catalog,
        hearts,
    };

    let rate_limiter = Arc::new(RateLimiter::new(redis, config.clone()));
    let router = create_router(state.clone(), Some(rate_limiter));

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}

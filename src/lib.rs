use std::sync::Arc;

use config::Config;

pub mod assets;
pub mod blob;
pub mod cache;
pub mod collection;
pub mod config;
pub mod error;
pub mod middleware;
pub mod result;
pub mod router;
pub mod routes;
pub mod store;
pub mod users;
pub mod utils;

use assets::AvatarCatalog;
use cache::HeartsCache;
use collection::ReplicationManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub manager: Arc<ReplicationManager>,
    pub catalog: Arc<AvatarCatalog>,
    pub hearts: Arc<dyn HeartsCache>,
}

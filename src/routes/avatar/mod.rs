mod handler;

pub use handler::{AvatarQuery, AvatarModelsResponse, get_models};

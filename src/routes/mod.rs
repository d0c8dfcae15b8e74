pub mod avatar;
pub mod collection;

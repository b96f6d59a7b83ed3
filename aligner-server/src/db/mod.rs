//! Database layer: pool, schema and repositories

pub mod pool;
pub mod repos;
pub mod schema;

pub use pool::{close_pool, create_pool, create_pool_with_options};
pub use repos::{DbError, ImageRepo, PreferenceRepo, UserRepo};

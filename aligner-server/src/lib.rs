//! aligner-server: storage and HTTP API for the drawer-outline aligner
//!
//! Persists users, uploaded images with their perspective geometry and
//! edge-detection parameters, and per-user edge-detection preferences.

pub mod config;
pub mod db;
pub mod http;
pub mod models;
pub mod store;

pub use config::DatabaseConfig;
pub use db::DbError;
pub use http::{build_router, run_server, ApiError, AppState, ServerConfig, ServerError};
pub use store::{MemoryStore, PgStore, Store};

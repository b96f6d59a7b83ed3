//! HTTP layer
//!
//! Axum server with:
//! - CORS (permissive unless origins are configured)
//! - Request tracing
//! - Body size limit
//! - Graceful shutdown followed by a pool drain
//! - JSON error responses

pub mod error;
pub mod extractors;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, run_server, AppState, ServerConfig, ServerError};

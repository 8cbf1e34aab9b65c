//! HTTP server for the dispatch engine.
//!
//! - `error`: `AppError` and the mapping from engine errors to HTTP statuses
//! - `state`: shared application state
//! - `auth`: identity extraction from trusted headers
//! - `health`: liveness, readiness and metrics endpoints
//! - `routes`: router assembly

pub mod auth;
pub mod error;
pub mod health;
pub mod routes;
pub mod state;

pub use auth::Identity;
pub use error::AppError;
pub use routes::build_router;
pub use state::AppState;

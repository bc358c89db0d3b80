//! Rearm HTTP surface.
//!
//! Serves the voice skill endpoint, credential registration and event
//! inspection behind a bearer token, plus an open health check.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;

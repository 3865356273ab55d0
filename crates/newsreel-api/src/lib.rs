//! Ingest API.
//!
//! Accepts article submissions, derives the slug job id, and writes
//! PENDING job records for the scheduler to pick up.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

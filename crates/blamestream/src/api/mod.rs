//! HTTP API module.
//!
//! Serves the streaming blame endpoint and a health check.

mod error;
mod handlers;
mod route;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{HealthResponse, StreamParams};
pub use route::{BlameRoute, STREAM_BLAME_MARKER, normalize_path};
pub use routes::create_router;
pub use state::AppState;

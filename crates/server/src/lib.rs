//! HTTP shell of the image archive.
//!
//! Two endpoints feed the core ingestion engine:
//! - `POST /file`: raw image bytes in the request body
//! - `POST /url`: fetch a remote url, with a one-hop gallery-page fallback

pub mod error;
pub mod fetch;
pub mod handlers;
pub mod routes;
pub mod scrape;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use fetch::Fetcher;
pub use routes::create_router;
pub use state::AppState;

//! HTTP API layer for neighborly polls.
//!
//! - **Endpoints**: JSON `POST` endpoints under `/polls`
//! - **Extractors**: member, voter and optional-voter identities
//! - **Middleware**: bearer token and device token resolution
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;
pub use middleware::{AppState, auth_middleware};

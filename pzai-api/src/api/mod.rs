//! HTTP API handlers for pzai-api

pub mod buildinfo;
pub mod dashboard;
pub mod health;
pub mod personalization;
pub mod root;
pub mod subscribers;

pub use ab_tests::ab_test_routes;
pub use dashboard::dashboard_routes;
pub use health::health_routes;
pub use personalization::personalization_routes;
pub use root::root_routes;
pub use subscribers::subscriber_routes;

use axum::http::Uri;

use crate::ApiError;

/// Fallback for unmatched routes
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}

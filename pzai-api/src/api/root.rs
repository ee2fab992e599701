//! Service information at `/`

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub endpoints: Vec<&'static str>,
}

pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "PersonalizeAI",
        version: env!("CARGO_PKG_VERSION"),
        description: "Newsletter personalization backend: subscriber scoring and A/B test evaluation",
        endpoints: vec![
            "/health",
            "/api/buildinfo",
            "/api/dashboard",
            "/api/subscribers",
            "/api/personalize/results",
            "/api/ab-test",
        ],
    })
}

pub fn root_routes() -> Router<AppState> {
    Router::new().route("/", get(service_info))
}

//! Dashboard summary computed from stored records

use axum::{extract::State, routing::get, Json, Router};
use pzai_common::time;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::{ab_tests, results, subscribers};
use crate::{ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub subscribers: subscribers::SubscriberAnalytics,
    pub personalization: results::ResultTotals,
    /// Percentage of sent personalized emails that were opened
    pub personalized_open_rate: f64,
    pub ab_tests: BTreeMap<String, i64>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

/// GET /api/dashboard
pub async fn get_dashboard(State(state): State<AppState>) -> ApiResult<Json<DashboardResponse>> {
    let now = time::now();
    let subscriber_stats = subscribers::subscriber_analytics(&state.db, now).await?;
    let totals = results::result_totals(&state.db).await?;
    let ab_tests = ab_tests::count_by_status(&state.db).await?.into_iter().collect();

    let personalized_open_rate = if totals.sent > 0 {
        totals.opened as f64 / totals.sent as f64 * 100.0
    } else {
        0.0
    };

    Ok(Json(DashboardResponse {
        subscribers: subscriber_stats,
        personalization: totals,
        personalized_open_rate,
        ab_tests,
        generated_at: now,
    }))
}

pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/api/dashboard", get(get_dashboard))
}

//! Personalization result endpoints
//!
//! Results are recorded by the content pipeline; delivery events are reported
//! later by the email tracking collaborator.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use pzai_common::models::{NewPersonalizationResult, OutcomeEvent, PersonalizationResult};
use pzai_common::{time, Error};
use tracing::{debug, info};

use crate::db::{ab_tests, begin_write, results, retry_on_lock, subscribers, DEFAULT_LOCK_WAIT_MS};
use crate::extract::{ApiJson, ApiPath};
use crate::{ApiResult, AppState};

/// POST /api/personalize/results
pub async fn create_result(
    State(state): State<AppState>,
    ApiJson(new): ApiJson<NewPersonalizationResult>,
) -> ApiResult<(StatusCode, Json<PersonalizationResult>)> {
    let new = new.validate()?;
    let db = &state.db;
    let new = &new;
    let result = retry_on_lock("create result", DEFAULT_LOCK_WAIT_MS, || async move {
        let mut tx = begin_write(db).await?;

        subscribers::fetch_subscriber(&mut *tx, new.subscriber_id).await?;
        if let Some(test_id) = new.ab_test_id {
            if !ab_tests::ab_test_exists(&mut *tx, test_id).await? {
                return Err(Error::NotFound(format!("A/B test {}", test_id)));
            }
        }

        let id = results::insert_result(&mut *tx, new, time::now()).await?;
        let result = results::fetch_result(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(result)
    })
    .await?;

    info!(
        "Recorded personalization result {} for subscriber {} (test {:?}, variant {:?})",
        result.id, result.subscriber_id, result.ab_test_id, result.ab_test_variant
    );
    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /api/personalize/results/:id
pub async fn get_result(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<PersonalizationResult>> {
    Ok(Json(results::fetch_result(&state.db, id).await?))
}

/// POST /api/personalize/results/:id/events
///
/// The result's outcome flags and the owning subscriber's counters change
/// in one transaction.
pub async fn record_event(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(event): ApiJson<OutcomeEvent>,
) -> ApiResult<Json<PersonalizationResult>> {
    let db = &state.db;
    let (result, transition) = retry_on_lock("record event", DEFAULT_LOCK_WAIT_MS, || async move {
        let now = time::now();
        let mut tx = begin_write(db).await?;

        let mut result = results::fetch_result(&mut *tx, id).await?;
        let transition = result.record_event(event, now)?;
        results::save_outcome(&mut *tx, &result).await?;

        let activity = transition.activity();
        if activity.sent > 0 || activity.opened > 0 || activity.clicked > 0 {
            let mut subscriber = subscribers::fetch_subscriber(&mut *tx, result.subscriber_id).await?;
            activity.apply(&mut subscriber, now)?;
            subscribers::save_counters(&mut *tx, &subscriber).await?;
        }

        tx.commit().await?;
        Ok((result, transition))
    })
    .await?;

    debug!("Result {} recorded {:?} ({:?})", id, event, transition);
    Ok(Json(result))
}

/// Build personalization result routes
pub fn personalization_routes() -> Router<AppState> {
    Router::new()
        .route("/api/personalize/results", post(create_result))
        .route("/api/personalize/results/:id", get(get_result))
        .route("/api/personalize/results/:id/events", post(record_event))
}

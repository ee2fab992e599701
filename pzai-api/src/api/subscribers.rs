//! Subscriber endpoints
//!
//! CRUD, activity reporting, rescoring, and analytics under `/api/subscribers`.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use pzai_common::models::{ActivityDelta, NewSubscriber, Subscriber, SubscriberUpdate};
use pzai_common::time;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::subscribers::{self as repo, SortOrder, SubscriberFilter, SubscriberSortKey};
use crate::db::{begin_write, retry_on_lock, DEFAULT_LOCK_WAIT_MS};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::pagination::{calculate_pagination, DEFAULT_PER_PAGE, MAX_PER_PAGE};
use crate::{ApiResult, AppState};

/// Default number of rows for the top-N listings
const DEFAULT_TOP_LIMIT: i64 = 10;

// ============================================================================
// Response types
// ============================================================================

/// Subscriber with derived rate fields
#[derive(Debug, Serialize)]
pub struct SubscriberView {
    #[serde(flatten)]
    pub subscriber: Subscriber,
    pub full_name: String,
    pub open_rate: f64,
    pub click_rate: f64,
}

impl From<Subscriber> for SubscriberView {
    fn from(subscriber: Subscriber) -> Self {
        Self {
            full_name: subscriber.full_name(),
            open_rate: subscriber.open_rate(),
            click_rate: subscriber.click_rate(),
            subscriber,
        }
    }
}

fn views(subscribers: Vec<Subscriber>) -> Vec<SubscriberView> {
    subscribers.into_iter().map(SubscriberView::from).collect()
}

#[derive(Debug, Serialize)]
pub struct SubscriberPage {
    pub items: Vec<SubscriberView>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub subscriber_id: i64,
    pub engagement_score: f64,
    pub churn_risk_score: f64,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub id: i64,
    pub deleted: bool,
}

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub tier: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AtRiskQuery {
    pub threshold: Option<f64>,
    pub limit: Option<i64>,
}

fn top_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_TOP_LIMIT).clamp(1, MAX_PER_PAGE)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/subscribers
pub async fn list_subscribers(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Json<SubscriberPage>> {
    let filter = SubscriberFilter {
        search: query.search,
        status: query.status.as_deref().map(str::parse).transpose()?,
        tier: query.tier.as_deref().map(str::parse).transpose()?,
        persona: None,
    };
    let sort_by: SubscriberSortKey = query.sort_by.as_deref().map(str::parse).transpose()?.unwrap_or_default();
    let order: SortOrder = query.sort_order.as_deref().map(str::parse).transpose()?.unwrap_or_default();

    let total = repo::count_subscribers(&state.db, &filter).await?;
    let pagination = calculate_pagination(
        total,
        query.page.unwrap_or(1),
        query.per_page.unwrap_or(DEFAULT_PER_PAGE),
    );

    let items = repo::list_subscribers(
        &state.db,
        &filter,
        sort_by,
        order,
        pagination.per_page,
        pagination.offset,
    )
    .await?;

    Ok(Json(SubscriberPage {
        items: views(items),
        total,
        page: pagination.page,
        per_page: pagination.per_page,
        total_pages: pagination.total_pages,
    }))
}

/// POST /api/subscribers
pub async fn create_subscriber(
    State(state): State<AppState>,
    ApiJson(new): ApiJson<NewSubscriber>,
) -> ApiResult<(StatusCode, Json<SubscriberView>)> {
    let new = new.validate()?;
    let id = repo::insert_subscriber(&state.db, &new, time::now()).await?;
    info!("Created subscriber {} ({})", id, new.email);

    let subscriber = repo::fetch_subscriber(&state.db, id).await?;
    Ok((StatusCode::CREATED, Json(subscriber.into())))
}

/// GET /api/subscribers/:id
pub async fn get_subscriber(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<SubscriberView>> {
    let subscriber = repo::fetch_subscriber(&state.db, id).await?;
    Ok(Json(subscriber.into()))
}

/// PUT /api/subscribers/:id
pub async fn update_subscriber(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(update): ApiJson<SubscriberUpdate>,
) -> ApiResult<Json<SubscriberView>> {
    let db = &state.db;
    let update = &update;
    let subscriber = retry_on_lock("update subscriber", DEFAULT_LOCK_WAIT_MS, || async move {
        let mut tx = begin_write(db).await?;

        let mut subscriber = repo::fetch_subscriber(&mut *tx, id).await?;
        update.clone().apply(&mut subscriber, time::now());
        repo::save_profile(&mut *tx, &subscriber).await?;

        tx.commit().await?;
        Ok(subscriber)
    })
    .await?;

    Ok(Json(subscriber.into()))
}

/// DELETE /api/subscribers/:id
pub async fn delete_subscriber(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<DeleteResponse>> {
    retry_on_lock("delete subscriber", DEFAULT_LOCK_WAIT_MS, || repo::delete_subscriber(&state.db, id)).await?;
    info!("Deleted subscriber {}", id);
    Ok(Json(DeleteResponse { id, deleted: true }))
}

/// POST /api/subscribers/:id/activity
pub async fn record_activity(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(delta): ApiJson<ActivityDelta>,
) -> ApiResult<Json<SubscriberView>> {
    let db = &state.db;
    let subscriber = retry_on_lock("record activity", DEFAULT_LOCK_WAIT_MS, || async move {
        let mut tx = begin_write(db).await?;

        let mut subscriber = repo::fetch_subscriber(&mut *tx, id).await?;
        delta.apply(&mut subscriber, time::now())?;
        repo::save_counters(&mut *tx, &subscriber).await?;

        tx.commit().await?;
        Ok(subscriber)
    })
    .await?;

    Ok(Json(subscriber.into()))
}

/// POST /api/subscribers/:id/score
///
/// Engagement is scored first; churn risk reads the fresh engagement score.
pub async fn score_subscriber(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ScoreResponse>> {
    let db = &state.db;
    let (engagement_score, churn_risk_score) = retry_on_lock("score subscriber", DEFAULT_LOCK_WAIT_MS, || async move {
        let mut tx = begin_write(db).await?;

        let mut subscriber = repo::fetch_subscriber(&mut *tx, id).await?;
        let now = time::now();
        let engagement_score = subscriber.update_engagement_score(now);
        let churn_risk_score = subscriber.update_churn_risk(now);
        subscriber.updated_at = now;
        repo::save_scores(&mut *tx, &subscriber).await?;

        tx.commit().await?;
        Ok((engagement_score, churn_risk_score))
    })
    .await?;

    info!(
        "Scored subscriber {}: engagement={:.1} churn_risk={:.2}",
        id, engagement_score, churn_risk_score
    );

    Ok(Json(ScoreResponse {
        subscriber_id: id,
        engagement_score,
        churn_risk_score,
    }))
}

/// GET /api/subscribers/analytics
pub async fn subscriber_analytics(State(state): State<AppState>) -> ApiResult<Json<repo::SubscriberAnalytics>> {
    Ok(Json(repo::subscriber_analytics(&state.db, time::now()).await?))
}

/// GET /api/subscribers/high-value
pub async fn high_value(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TopQuery>,
) -> ApiResult<Json<Vec<SubscriberView>>> {
    let subscribers = repo::high_value_subscribers(&state.db, top_limit(query.limit)).await?;
    Ok(Json(views(subscribers)))
}

/// GET /api/subscribers/at-risk
pub async fn at_risk(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AtRiskQuery>,
) -> ApiResult<Json<Vec<SubscriberView>>> {
    let threshold = query.threshold.unwrap_or(repo::AT_RISK_THRESHOLD);
    let subscribers = repo::at_risk_subscribers(&state.db, threshold, top_limit(query.limit)).await?;
    Ok(Json(views(subscribers)))
}

/// GET /api/subscribers/persona/:persona
pub async fn by_persona(
    State(state): State<AppState>,
    ApiPath(persona): ApiPath<String>,
) -> ApiResult<Json<Vec<SubscriberView>>> {
    let filter = SubscriberFilter {
        persona: Some(persona),
        ..Default::default()
    };
    let subscribers = repo::list_subscribers(
        &state.db,
        &filter,
        SubscriberSortKey::EngagementScore,
        SortOrder::Desc,
        MAX_PER_PAGE,
        0,
    )
    .await?;
    Ok(Json(views(subscribers)))
}

/// Build subscriber routes
pub fn subscriber_routes() -> Router<AppState> {
    Router::new()
        .route("/api/subscribers", get(list_subscribers).post(create_subscriber))
        .route("/api/subscribers/analytics", get(subscriber_analytics))
        .route("/api/subscribers/high-value", get(high_value))
        .route("/api/subscribers/at-risk", get(at_risk))
        .route("/api/subscribers/persona/:persona", get(by_persona))
        .route(
            "/api/subscribers/:id",
            get(get_subscriber).put(update_subscriber).delete(delete_subscriber),
        )
        .route("/api/subscribers/:id/activity", post(record_activity))
        .route("/api/subscribers/:id/score", post(score_subscriber))
}

//! Subscriber persistence
//!
//! CRUD-by-id plus filtered, sorted, paginated listing. Sort columns come
//! from [`SubscriberSortKey`] only; nothing user-supplied is spliced into SQL.

use chrono::{DateTime, Duration, Utc};
use pzai_common::models::{NewSubscriber, Subscriber, SubscriptionStatus, SubscriptionTier};
use pzai_common::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteExecutor, SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::parse_column;

const SUBSCRIBER_COLUMNS: &str = r#"
    id, email, first_name, last_name, subscription_date, subscription_status,
    subscription_tier, total_emails_sent, total_emails_opened, total_clicks,
    last_engagement_date, engagement_score, preferred_content_types,
    risk_tolerance, investment_experience, portfolio_size, preferred_send_time,
    preferred_frequency, device_preference, ai_persona, content_preferences,
    churn_risk_score, lifetime_value, created_at, updated_at
"#;

/// Churn risk at or above which a subscriber counts as at risk
pub const AT_RISK_THRESHOLD: f64 = 0.7;

/// Engagement score at or above which a subscriber counts as high value
pub const HIGH_VALUE_THRESHOLD: f64 = 80.0;

/// Risk tolerance values always reported in analytics, even with no subscribers
const RISK_TOLERANCES: [&str; 3] = ["conservative", "moderate", "aggressive"];

// ============================================================================
// Listing
// ============================================================================

/// Columns a subscriber list may be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriberSortKey {
    #[default]
    CreatedAt,
    UpdatedAt,
    Email,
    FirstName,
    LastName,
    SubscriptionDate,
    EngagementScore,
    ChurnRiskScore,
    LifetimeValue,
    TotalEmailsSent,
    LastEngagementDate,
}

impl SubscriberSortKey {
    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Email => "email",
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::SubscriptionDate => "subscription_date",
            Self::EngagementScore => "engagement_score",
            Self::ChurnRiskScore => "churn_risk_score",
            Self::LifetimeValue => "lifetime_value",
            Self::TotalEmailsSent => "total_emails_sent",
            Self::LastEngagementDate => "last_engagement_date",
        }
    }
}

impl FromStr for SubscriberSortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created_at" => Ok(Self::CreatedAt),
            "updated_at" => Ok(Self::UpdatedAt),
            "email" => Ok(Self::Email),
            "first_name" => Ok(Self::FirstName),
            "last_name" => Ok(Self::LastName),
            "subscription_date" => Ok(Self::SubscriptionDate),
            "engagement_score" => Ok(Self::EngagementScore),
            "churn_risk_score" => Ok(Self::ChurnRiskScore),
            "lifetime_value" => Ok(Self::LifetimeValue),
            "total_emails_sent" => Ok(Self::TotalEmailsSent),
            "last_engagement_date" => Ok(Self::LastEngagementDate),
            other => Err(Error::InvalidInput(format!("Invalid sort field: {}", other))),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(Error::InvalidInput(format!("Invalid sort order: {}", other))),
        }
    }
}

/// Filters for a subscriber listing
#[derive(Debug, Clone, Default)]
pub struct SubscriberFilter {
    /// Substring of email, first name, or last name
    pub search: Option<String>,
    pub status: Option<SubscriptionStatus>,
    pub tier: Option<SubscriptionTier>,
    pub persona: Option<String>,
}

impl SubscriberFilter {
    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like(search));
            qb.push(" AND (email LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR first_name LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR last_name LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(status) = self.status {
            qb.push(" AND subscription_status = ").push_bind(status.as_str());
        }
        if let Some(tier) = self.tier {
            qb.push(" AND subscription_tier = ").push_bind(tier.as_str());
        }
        if let Some(persona) = &self.persona {
            qb.push(" AND ai_persona = ").push_bind(persona.clone());
        }
    }
}

/// Escape LIKE wildcards so the term matches literally (escape char `\`)
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Count subscribers matching a filter
pub async fn count_subscribers(pool: &SqlitePool, filter: &SubscriberFilter) -> Result<i64> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM subscribers");
    filter.push_where(&mut qb);
    let total = qb.build_query_scalar::<i64>().fetch_one(pool).await?;
    Ok(total)
}

/// One page of subscribers matching a filter
///
/// Rows with equal sort values are ordered by id in the same direction.
pub async fn list_subscribers(
    pool: &SqlitePool,
    filter: &SubscriberFilter,
    sort_by: SubscriberSortKey,
    order: SortOrder,
    limit: i64,
    offset: i64,
) -> Result<Vec<Subscriber>> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM subscribers", SUBSCRIBER_COLUMNS));
    filter.push_where(&mut qb);
    qb.push(format!(
        " ORDER BY {col} {dir}, id {dir}",
        col = sort_by.column(),
        dir = order.sql()
    ));
    qb.push(" LIMIT ").push_bind(limit);
    qb.push(" OFFSET ").push_bind(offset);

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(subscriber_from_row).collect()
}

/// Subscribers with the highest engagement scores
pub async fn high_value_subscribers(pool: &SqlitePool, limit: i64) -> Result<Vec<Subscriber>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM subscribers ORDER BY engagement_score DESC, id ASC LIMIT ?",
        SUBSCRIBER_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(subscriber_from_row).collect()
}

/// Subscribers whose churn risk is at least `threshold`, riskiest first
pub async fn at_risk_subscribers(pool: &SqlitePool, threshold: f64, limit: i64) -> Result<Vec<Subscriber>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM subscribers WHERE churn_risk_score >= ? \
         ORDER BY churn_risk_score DESC, id ASC LIMIT ?",
        SUBSCRIBER_COLUMNS
    ))
    .bind(threshold)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(subscriber_from_row).collect()
}

// ============================================================================
// CRUD
// ============================================================================

/// Get subscriber by id
pub async fn fetch_subscriber(executor: impl SqliteExecutor<'_>, id: i64) -> Result<Subscriber> {
    let row = sqlx::query(&format!("SELECT {} FROM subscribers WHERE id = ?", SUBSCRIBER_COLUMNS))
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Subscriber {}", id)))?;

    subscriber_from_row(&row)
}

/// Insert a validated new subscriber and return its id
///
/// A duplicate email is reported as `Conflict`.
pub async fn insert_subscriber(pool: &SqlitePool, new: &NewSubscriber, now: DateTime<Utc>) -> Result<i64> {
    let content_types = serde_json::to_string(&new.preferred_content_types)?;

    let result = sqlx::query(
        r#"
        INSERT INTO subscribers (
            email, first_name, last_name, subscription_date, subscription_status,
            subscription_tier, risk_tolerance, investment_experience, portfolio_size,
            preferred_content_types, preferred_frequency, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&new.email)
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(now)
    .bind(SubscriptionStatus::Active.as_str())
    .bind(new.subscription_tier.as_str())
    .bind(new.risk_tolerance.as_deref().unwrap_or("moderate"))
    .bind(new.investment_experience.as_deref().unwrap_or("intermediate"))
    .bind(&new.portfolio_size)
    .bind(content_types)
    .bind(new.preferred_frequency.as_deref().unwrap_or("daily"))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await;

    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(Error::Conflict(format!(
            "Subscriber with email {} already exists",
            new.email
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Write back the profile fields a subscriber update may change
pub async fn save_profile(executor: impl SqliteExecutor<'_>, subscriber: &Subscriber) -> Result<()> {
    let content_types = serde_json::to_string(&subscriber.preferred_content_types)?;

    sqlx::query(
        r#"
        UPDATE subscribers SET
            first_name = ?, last_name = ?, subscription_status = ?, subscription_tier = ?,
            risk_tolerance = ?, investment_experience = ?, portfolio_size = ?,
            preferred_content_types = ?, preferred_frequency = ?, device_preference = ?,
            preferred_send_time = ?, ai_persona = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&subscriber.first_name)
    .bind(&subscriber.last_name)
    .bind(subscriber.subscription_status.as_str())
    .bind(subscriber.subscription_tier.as_str())
    .bind(&subscriber.risk_tolerance)
    .bind(&subscriber.investment_experience)
    .bind(&subscriber.portfolio_size)
    .bind(content_types)
    .bind(&subscriber.preferred_frequency)
    .bind(&subscriber.device_preference)
    .bind(&subscriber.preferred_send_time)
    .bind(&subscriber.ai_persona)
    .bind(subscriber.updated_at)
    .bind(subscriber.id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Write back engagement counters and last engagement date
pub async fn save_counters(executor: impl SqliteExecutor<'_>, subscriber: &Subscriber) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE subscribers SET
            total_emails_sent = ?, total_emails_opened = ?, total_clicks = ?,
            last_engagement_date = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(subscriber.total_emails_sent)
    .bind(subscriber.total_emails_opened)
    .bind(subscriber.total_clicks)
    .bind(subscriber.last_engagement_date)
    .bind(subscriber.updated_at)
    .bind(subscriber.id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Write back engagement and churn scores
pub async fn save_scores(executor: impl SqliteExecutor<'_>, subscriber: &Subscriber) -> Result<()> {
    sqlx::query(
        "UPDATE subscribers SET engagement_score = ?, churn_risk_score = ?, updated_at = ? WHERE id = ?",
    )
    .bind(subscriber.engagement_score)
    .bind(subscriber.churn_risk_score)
    .bind(subscriber.updated_at)
    .bind(subscriber.id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Delete a subscriber together with their personalization results
pub async fn delete_subscriber(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = super::begin_write(pool).await?;

    sqlx::query("DELETE FROM personalization_results WHERE subscriber_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let deleted = sqlx::query("DELETE FROM subscribers WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(Error::NotFound(format!("Subscriber {}", id)));
    }

    tx.commit().await?;
    Ok(())
}

// ============================================================================
// Analytics
// ============================================================================

/// Aggregate subscriber statistics computed from stored rows
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberAnalytics {
    pub total_subscribers: i64,
    pub active_subscribers: i64,
    pub new_this_month: i64,
    pub avg_engagement_score: f64,
    pub avg_churn_risk_score: f64,
    pub tier_distribution: BTreeMap<String, i64>,
    pub status_distribution: BTreeMap<String, i64>,
    pub engagement_distribution: BTreeMap<String, i64>,
    pub risk_tolerance_distribution: BTreeMap<String, i64>,
    /// Percentage of all subscribers who have cancelled
    pub churn_rate: f64,
    pub at_risk_subscribers: i64,
    pub high_value_subscribers: i64,
}

pub async fn subscriber_analytics(pool: &SqlitePool, now: DateTime<Utc>) -> Result<SubscriberAnalytics> {
    let (total, avg_engagement, avg_churn): (i64, Option<f64>, Option<f64>) = sqlx::query_as(
        "SELECT COUNT(*), AVG(engagement_score), AVG(churn_risk_score) FROM subscribers",
    )
    .fetch_one(pool)
    .await?;

    let new_this_month: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscribers WHERE subscription_date >= ?")
        .bind(now - Duration::days(30))
        .fetch_one(pool)
        .await?;

    let at_risk: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscribers WHERE churn_risk_score >= ?")
        .bind(AT_RISK_THRESHOLD)
        .fetch_one(pool)
        .await?;

    let high_value: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscribers WHERE engagement_score >= ?")
        .bind(HIGH_VALUE_THRESHOLD)
        .fetch_one(pool)
        .await?;

    let mut tier_distribution: BTreeMap<String, i64> = SubscriptionTier::ALL
        .iter()
        .map(|t| (t.as_str().to_string(), 0))
        .collect();
    tier_distribution.extend(count_grouped(pool, "subscription_tier").await?);

    let mut status_distribution: BTreeMap<String, i64> = SubscriptionStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    status_distribution.extend(count_grouped(pool, "subscription_status").await?);

    let mut risk_tolerance_distribution: BTreeMap<String, i64> = RISK_TOLERANCES
        .iter()
        .map(|r| (r.to_string(), 0))
        .collect();
    risk_tolerance_distribution.extend(count_grouped(pool, "risk_tolerance").await?);

    let cancelled = status_distribution
        .get(SubscriptionStatus::Cancelled.as_str())
        .copied()
        .unwrap_or(0);
    let churn_rate = if total > 0 {
        (cancelled as f64 / total as f64 * 1000.0).round() / 10.0
    } else {
        0.0
    };

    let engagement_distribution: BTreeMap<String, i64> = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT CASE
                 WHEN engagement_score >= 70 THEN 'high'
                 WHEN engagement_score >= 40 THEN 'medium'
                 ELSE 'low'
               END AS band,
               COUNT(*)
        FROM subscribers
        GROUP BY band
        "#,
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();
    let engagement_distribution = ["high", "medium", "low"]
        .iter()
        .map(|band| (band.to_string(), engagement_distribution.get(*band).copied().unwrap_or(0)))
        .collect();

    Ok(SubscriberAnalytics {
        total_subscribers: total,
        active_subscribers: status_distribution.get("active").copied().unwrap_or(0),
        new_this_month,
        avg_engagement_score: avg_engagement.unwrap_or(0.0),
        avg_churn_risk_score: avg_churn.unwrap_or(0.0),
        tier_distribution,
        status_distribution,
        engagement_distribution,
        risk_tolerance_distribution,
        churn_rate,
        at_risk_subscribers: at_risk,
        high_value_subscribers: high_value,
    })
}

/// Row counts grouped by one of the fixed enum columns
async fn count_grouped(pool: &SqlitePool, column: &'static str) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query_as::<_, (String, i64)>(&format!(
        "SELECT {col}, COUNT(*) FROM subscribers GROUP BY {col}",
        col = column
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ============================================================================
// Row mapping
// ============================================================================

fn subscriber_from_row(row: &SqliteRow) -> Result<Subscriber> {
    let content_types: String = row.try_get("preferred_content_types")?;
    let content_preferences: Option<String> = row.try_get("content_preferences")?;

    Ok(Subscriber {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        subscription_date: row.try_get("subscription_date")?,
        subscription_status: parse_column(row.try_get("subscription_status")?, "subscription_status")?,
        subscription_tier: parse_column(row.try_get("subscription_tier")?, "subscription_tier")?,
        total_emails_sent: row.try_get("total_emails_sent")?,
        total_emails_opened: row.try_get("total_emails_opened")?,
        total_clicks: row.try_get("total_clicks")?,
        last_engagement_date: row.try_get("last_engagement_date")?,
        engagement_score: row.try_get("engagement_score")?,
        preferred_content_types: serde_json::from_str(&content_types)?,
        risk_tolerance: row.try_get("risk_tolerance")?,
        investment_experience: row.try_get("investment_experience")?,
        portfolio_size: row.try_get("portfolio_size")?,
        preferred_send_time: row.try_get("preferred_send_time")?,
        preferred_frequency: row.try_get("preferred_frequency")?,
        device_preference: row.try_get("device_preference")?,
        ai_persona: row.try_get("ai_persona")?,
        content_preferences: content_preferences
            .map(|json| serde_json::from_str(&json))
            .transpose()?,
        churn_risk_score: row.try_get("churn_risk_score")?,
        lifetime_value: row.try_get("lifetime_value")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

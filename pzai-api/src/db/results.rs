//! Personalization result persistence

use chrono::{DateTime, Utc};
use pzai_common::experiment::VariantOutcome;
use pzai_common::models::{NewPersonalizationResult, PersonalizationResult};
use pzai_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

const RESULT_SELECT: &str = r#"
    SELECT r.id, r.subscriber_id, s.email AS subscriber_email, r.content_type,
           r.original_content, r.personalized_content, r.personalization_strategy,
           r.ai_model_used, r.ai_prompt_template, r.ai_confidence_score,
           r.was_sent, r.was_opened, r.was_clicked, r.engagement_score,
           r.conversion_value, r.ab_test_id, r.ab_test_variant,
           r.created_at, r.sent_at, r.opened_at, r.clicked_at
    FROM personalization_results r
    LEFT JOIN subscribers s ON s.id = r.subscriber_id
"#;

/// Model recorded when the caller does not name one
pub const DEFAULT_AI_MODEL: &str = "gpt-4";

/// Insert a validated result and return its id
pub async fn insert_result(
    executor: impl SqliteExecutor<'_>,
    new: &NewPersonalizationResult,
    now: DateTime<Utc>,
) -> Result<i64> {
    let done = sqlx::query(
        r#"
        INSERT INTO personalization_results (
            subscriber_id, content_type, original_content, personalized_content,
            personalization_strategy, ai_model_used, ai_prompt_template,
            ai_confidence_score, ab_test_id, ab_test_variant, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.subscriber_id)
    .bind(&new.content_type)
    .bind(&new.original_content)
    .bind(&new.personalized_content)
    .bind(&new.personalization_strategy)
    .bind(new.ai_model_used.as_deref().unwrap_or(DEFAULT_AI_MODEL))
    .bind(&new.ai_prompt_template)
    .bind(new.ai_confidence_score)
    .bind(new.ab_test_id)
    .bind(&new.ab_test_variant)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(done.last_insert_rowid())
}

/// Get a result by id, including the subscriber's email
pub async fn fetch_result(executor: impl SqliteExecutor<'_>, id: i64) -> Result<PersonalizationResult> {
    let row = sqlx::query(&format!("{} WHERE r.id = ?", RESULT_SELECT))
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Personalization result {}", id)))?;

    result_from_row(&row)
}

/// All results tagged with a test, oldest first
pub async fn list_results_for_test(
    executor: impl SqliteExecutor<'_>,
    test_id: i64,
) -> Result<Vec<PersonalizationResult>> {
    let rows = sqlx::query(&format!("{} WHERE r.ab_test_id = ? ORDER BY r.id", RESULT_SELECT))
        .bind(test_id)
        .fetch_all(executor)
        .await?;

    rows.iter().map(result_from_row).collect()
}

/// Outcome snapshot for evaluating a test
pub async fn outcomes_for_test(executor: impl SqliteExecutor<'_>, test_id: i64) -> Result<Vec<VariantOutcome>> {
    let rows = sqlx::query(
        r#"
        SELECT ab_test_variant, was_opened, was_clicked, conversion_value
        FROM personalization_results
        WHERE ab_test_id = ?
        ORDER BY id
        "#,
    )
    .bind(test_id)
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|row| -> Result<VariantOutcome> {
            Ok(VariantOutcome {
                variant: row.try_get("ab_test_variant")?,
                was_opened: row.try_get("was_opened")?,
                was_clicked: row.try_get("was_clicked")?,
                conversion_value: row.try_get("conversion_value")?,
            })
        })
        .collect()
}

/// Write back outcome flags, timestamps, and conversion value
pub async fn save_outcome(executor: impl SqliteExecutor<'_>, result: &PersonalizationResult) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE personalization_results SET
            was_sent = ?, was_opened = ?, was_clicked = ?, conversion_value = ?,
            sent_at = ?, opened_at = ?, clicked_at = ?
        WHERE id = ?
        "#,
    )
    .bind(result.was_sent)
    .bind(result.was_opened)
    .bind(result.was_clicked)
    .bind(result.conversion_value)
    .bind(result.sent_at)
    .bind(result.opened_at)
    .bind(result.clicked_at)
    .bind(result.id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Counts used by the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct ResultTotals {
    pub total: i64,
    pub sent: i64,
    pub opened: i64,
    pub clicked: i64,
    pub total_conversion_value: f64,
}

pub async fn result_totals(executor: impl SqliteExecutor<'_>) -> Result<ResultTotals> {
    let (total, sent, opened, clicked, value): (i64, Option<i64>, Option<i64>, Option<i64>, Option<f64>) =
        sqlx::query_as(
            r#"
            SELECT COUNT(*), SUM(was_sent), SUM(was_opened), SUM(was_clicked), SUM(conversion_value)
            FROM personalization_results
            "#,
        )
        .fetch_one(executor)
        .await?;

    Ok(ResultTotals {
        total,
        sent: sent.unwrap_or(0),
        opened: opened.unwrap_or(0),
        clicked: clicked.unwrap_or(0),
        total_conversion_value: value.unwrap_or(0.0),
    })
}

fn result_from_row(row: &SqliteRow) -> Result<PersonalizationResult> {
    Ok(PersonalizationResult {
        id: row.try_get("id")?,
        subscriber_id: row.try_get("subscriber_id")?,
        subscriber_email: row.try_get("subscriber_email")?,
        content_type: row.try_get("content_type")?,
        original_content: row.try_get("original_content")?,
        personalized_content: row.try_get("personalized_content")?,
        personalization_strategy: row.try_get("personalization_strategy")?,
        ai_model_used: row.try_get("ai_model_used")?,
        ai_prompt_template: row.try_get("ai_prompt_template")?,
        ai_confidence_score: row.try_get("ai_confidence_score")?,
        was_sent: row.try_get("was_sent")?,
        was_opened: row.try_get("was_opened")?,
        was_clicked: row.try_get("was_clicked")?,
        engagement_score: row.try_get("engagement_score")?,
        conversion_value: row.try_get("conversion_value")?,
        ab_test_id: row.try_get("ab_test_id")?,
        ab_test_variant: row.try_get("ab_test_variant")?,
        created_at: row.try_get("created_at")?,
        sent_at: row.try_get("sent_at")?,
        opened_at: row.try_get("opened_at")?,
        clicked_at: row.try_get("clicked_at")?,
    })
}

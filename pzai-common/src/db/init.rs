//! Database initialization
//!
//! Creates the database file and schema on first run. All table creation is
//! idempotent, so opening an existing database is the same code path.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// How long a connection waits on another writer before reporting busy
pub const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Open (creating if needed) the database at `db_path` and ensure the schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Connection PRAGMAs are per connection, so they go on the options every
    // pooled connection is opened with. WAL allows concurrent readers
    // alongside the single writer.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema
///
/// Limited to one connection: every SQLite `:memory:` connection is a
/// separate database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes if missing
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    create_subscribers_table(pool).await?;
    create_ab_tests_table(pool).await?;
    create_personalization_results_table(pool).await?;

    Ok(())
}

async fn create_subscribers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscribers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            first_name TEXT,
            last_name TEXT,
            subscription_date TEXT NOT NULL,
            subscription_status TEXT NOT NULL DEFAULT 'active',
            subscription_tier TEXT NOT NULL DEFAULT 'basic',
            total_emails_sent INTEGER NOT NULL DEFAULT 0 CHECK (total_emails_sent >= 0),
            total_emails_opened INTEGER NOT NULL DEFAULT 0 CHECK (total_emails_opened >= 0),
            total_clicks INTEGER NOT NULL DEFAULT 0 CHECK (total_clicks >= 0),
            last_engagement_date TEXT,
            engagement_score REAL NOT NULL DEFAULT 0.0,
            preferred_content_types TEXT NOT NULL DEFAULT '[]',
            risk_tolerance TEXT NOT NULL DEFAULT 'moderate',
            investment_experience TEXT NOT NULL DEFAULT 'intermediate',
            portfolio_size TEXT,
            preferred_send_time TEXT,
            preferred_frequency TEXT NOT NULL DEFAULT 'daily',
            device_preference TEXT NOT NULL DEFAULT 'desktop',
            ai_persona TEXT,
            content_preferences TEXT,
            churn_risk_score REAL NOT NULL DEFAULT 0.0,
            lifetime_value REAL NOT NULL DEFAULT 0.0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (total_emails_opened <= total_emails_sent)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_subscribers_engagement ON subscribers(engagement_score)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_subscribers_churn ON subscribers(churn_risk_score)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_subscribers_persona ON subscribers(ai_persona)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_ab_tests_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ab_tests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            test_name TEXT NOT NULL,
            test_description TEXT,
            test_type TEXT NOT NULL,
            variants TEXT NOT NULL,
            traffic_split TEXT NOT NULL,
            target_metric TEXT NOT NULL DEFAULT 'open_rate',
            status TEXT NOT NULL DEFAULT 'draft',
            start_date TEXT,
            end_date TEXT,
            planned_duration_days INTEGER NOT NULL DEFAULT 7,
            confidence_level REAL NOT NULL DEFAULT 0.95,
            minimum_sample_size INTEGER NOT NULL DEFAULT 100 CHECK (minimum_sample_size > 0),
            statistical_significance_reached INTEGER NOT NULL DEFAULT 0,
            winning_variant TEXT,
            total_participants INTEGER NOT NULL DEFAULT 0,
            results_summary TEXT,
            created_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ab_tests_status ON ab_tests(status)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_personalization_results_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS personalization_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subscriber_id INTEGER NOT NULL REFERENCES subscribers(id) ON DELETE CASCADE,
            content_type TEXT NOT NULL,
            original_content TEXT,
            personalized_content TEXT NOT NULL,
            personalization_strategy TEXT,
            ai_model_used TEXT NOT NULL DEFAULT 'gpt-4',
            ai_prompt_template TEXT,
            ai_confidence_score REAL NOT NULL DEFAULT 0.0,
            was_sent INTEGER NOT NULL DEFAULT 0,
            was_opened INTEGER NOT NULL DEFAULT 0,
            was_clicked INTEGER NOT NULL DEFAULT 0,
            engagement_score REAL NOT NULL DEFAULT 0.0,
            conversion_value REAL NOT NULL DEFAULT 0.0 CHECK (conversion_value >= 0),
            ab_test_id INTEGER REFERENCES ab_tests(id) ON DELETE SET NULL,
            ab_test_variant TEXT,
            created_at TEXT NOT NULL,
            sent_at TEXT,
            opened_at TEXT,
            clicked_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_results_ab_test ON personalization_results(ab_test_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_results_subscriber ON personalization_results(subscriber_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

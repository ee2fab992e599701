//! Tests for database creation and schema initialization

use pzai_common::db::{init_database, init_memory_database};

async fn table_names(pool: &sqlx::SqlitePool) -> Vec<String> {
    sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("personalizeai.db");

    let pool = init_database(&db_path).await;
    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("personalizeai.db");

    let first = init_database(&db_path).await.unwrap();
    sqlx::query(
        "INSERT INTO subscribers (email, subscription_date, created_at, updated_at) \
         VALUES ('keep@example.com', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
    )
    .execute(&first)
    .await
    .unwrap();
    first.close().await;

    let second = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscribers")
        .fetch_one(&second)
        .await
        .unwrap();
    assert_eq!(count, 1, "Reopening must not drop existing rows");
}

#[tokio::test]
async fn test_schema_tables_created() {
    let pool = init_memory_database().await.unwrap();
    assert_eq!(
        table_names(&pool).await,
        vec!["ab_tests", "personalization_results", "subscribers"]
    );
}

#[tokio::test]
async fn test_schema_rejects_more_opens_than_sends() {
    let pool = init_memory_database().await.unwrap();
    let result = sqlx::query(
        "INSERT INTO subscribers (email, total_emails_sent, total_emails_opened, subscription_date, created_at, updated_at) \
         VALUES ('x@example.com', 1, 2, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_schema_creation_is_idempotent() {
    let pool = init_memory_database().await.unwrap();
    pzai_common::db::create_schema(&pool).await.unwrap();
    assert_eq!(table_names(&pool).await.len(), 3);
}

#[tokio::test]
async fn test_every_pooled_connection_waits_on_busy() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("busy.db")).await.unwrap();

    // Hold several connections at once so the check is not just the first one
    let mut conns = Vec::new();
    for _ in 0..4 {
        conns.push(pool.acquire().await.unwrap());
    }
    for conn in conns.iter_mut() {
        let timeout: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
            .fetch_one(&mut **conn)
            .await
            .unwrap();
        assert_eq!(timeout, 5000);

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&mut **conn)
            .await
            .unwrap();
        assert_eq!(mode, "wal");
    }
}

//! pzai-api library interface
//!
//! Exposes the router, shared state, and repositories for integration testing.

pub mod api;
pub mod db;
pub mod error;
pub mod extract;
pub mod pagination;

pub use crate::error::{ApiError, ApiResult};

use axum::http::HeaderValue;
use axum::Router;
use chrono::{DateTime, Utc};
use pzai_common::config::ServiceConfig;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

type TestLockMap = HashMap<i64, Arc<tokio::sync::Mutex<()>>>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// One lock per A/B test, held from outcome snapshot to write-back.
    /// Entries exist only while a guard is held or awaited.
    test_locks: Arc<Mutex<TestLockMap>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            test_locks: Arc::new(Mutex::new(HashMap::new())),
            startup_time: Utc::now(),
        }
    }

    fn locks(&self) -> MutexGuard<'_, TestLockMap> {
        self.test_locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire the evaluation lock for one test
    ///
    /// Evaluations of different tests proceed in parallel. Callers check that
    /// the test exists first.
    pub async fn lock_test(&self, test_id: i64) -> TestLockGuard {
        let lock = self
            .locks()
            .entry(test_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();

        TestLockGuard {
            guard: Some(lock.lock_owned().await),
            locks: Arc::clone(&self.test_locks),
            test_id,
        }
    }

    /// Number of tests with a lock currently held or awaited
    pub fn held_test_locks(&self) -> usize {
        self.locks().len()
    }
}

/// Held evaluation lock for one test
///
/// Dropping the last holder removes the test's entry from the lock map.
pub struct TestLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Mutex<TestLockMap>>,
    test_id: i64,
}

impl Drop for TestLockGuard {
    fn drop(&mut self) {
        // Release our reference before counting the remaining ones
        self.guard.take();

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.test_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.test_id);
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::root_routes())
        .merge(api::health_routes())
        .merge(api::dashboard_routes())
        .merge(api::subscriber_routes())
        .merge(api::personalization_routes())
        .merge(api::ab_test_routes())
        .fallback(api::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy for the configured origins
///
/// No origins, or `*`, allows any origin. Origins that are not valid header
/// values are skipped.
pub fn cors_layer(config: &ServiceConfig) -> CorsLayer {
    if config.cors_permissive() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

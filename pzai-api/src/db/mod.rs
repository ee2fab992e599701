//! Database access for pzai-api
//!
//! Repository functions take either the pool or an open transaction
//! (`impl SqliteExecutor`) so multi-step updates can share one transaction.

pub mod results;
pub mod retry;
pub mod subscribers;

pub use retry::{begin_write, retry_on_lock, DEFAULT_LOCK_WAIT_MS};

use pzai_common::{Error, Result};
use std::str::FromStr;

/// Parse a stored enum column, treating unknown values as corrupt data
pub(crate) fn parse_column<T>(value: String, column: &str) -> Result<T>
where
    T: FromStr<Err = Error>,
{
    value
        .parse()
        .map_err(|e| Error::Internal(format!("Corrupt {} column: {}", column, e)))
}

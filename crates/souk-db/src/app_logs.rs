//! Typed application log records written by the request recorder and read
//! back through the log query endpoint.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

pub const DEFAULT_LOG_LIMIT: i64 = 100;
pub const MAX_LOG_LIMIT: i64 = 500;

/// A row from the `app_logs` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AppLogRow {
    pub id: i64,
    /// The request id the entry was recorded under.
    pub log_id: String,
    pub app_name: String,
    pub level: String,
    #[serde(rename = "type")]
    pub log_type: String,
    /// HTTP status for response entries; absent on request entries.
    pub code: Option<i32>,
    pub message: String,
    pub data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// An entry to record. Owned throughout so it can cross into a spawned
/// writer task.
#[derive(Debug, Clone)]
pub struct NewAppLog {
    pub log_id: String,
    pub app_name: String,
    pub level: String,
    pub log_type: String,
    pub code: Option<i32>,
    pub message: String,
    pub data: Option<Value>,
}

/// Log query criteria; absent fields match everything.
#[derive(Debug, Clone, Copy)]
pub struct AppLogCriteria<'a> {
    pub log_id: Option<&'a str>,
    pub app_name: Option<&'a str>,
    pub log_type: Option<&'a str>,
    pub code: Option<i32>,
    pub limit: i64,
}

impl Default for AppLogCriteria<'_> {
    fn default() -> Self {
        AppLogCriteria {
            log_id: None,
            app_name: None,
            log_type: None,
            code: None,
            limit: DEFAULT_LOG_LIMIT,
        }
    }
}

/// Insert one log entry.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_app_log(pool: &PgPool, log: &NewAppLog) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO app_logs (log_id, app_name, level, log_type, code, message, data) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(&log.log_id)
    .bind(&log.app_name)
    .bind(&log.level)
    .bind(&log.log_type)
    .bind(log.code)
    .bind(&log.message)
    .bind(&log.data)
    .execute(pool)
    .await?;

    Ok(())
}

/// Query log entries, newest first. The limit is clamped to
/// `1..=`[`MAX_LOG_LIMIT`].
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn query_app_logs(
    pool: &PgPool,
    criteria: &AppLogCriteria<'_>,
) -> Result<Vec<AppLogRow>, DbError> {
    let rows = sqlx::query_as::<_, AppLogRow>(
        "SELECT id, log_id, app_name, level, log_type, code, message, data, created_at \
         FROM app_logs \
         WHERE ($1::TEXT IS NULL OR log_id = $1) \
           AND ($2::TEXT IS NULL OR app_name = $2) \
           AND ($3::TEXT IS NULL OR log_type = $3) \
           AND ($4::INT IS NULL OR code = $4) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $5",
    )
    .bind(criteria.log_id)
    .bind(criteria.app_name)
    .bind(criteria.log_type)
    .bind(criteria.code)
    .bind(clamped_limit(criteria.limit))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

fn clamped_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_LOG_LIMIT)
}

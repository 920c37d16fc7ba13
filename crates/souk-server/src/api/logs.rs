//! Experimental log inspection endpoint.

use axum::extract::{Query, State};
use serde::Deserialize;

use souk_db::{query_app_logs, AppLogCriteria, AppLogRow, DEFAULT_LOG_LIMIT};

use super::{internal_error, ApiError, ApiResponse, AppState};

/// Raw query parameters. Numbers arrive as text and are validated here so a
/// bad `code=abc` reads as a 400 instead of a silent full listing.
#[derive(Debug, Default, Deserialize)]
pub(super) struct LogParams {
    log_id: Option<String>,
    app_name: Option<String>,
    #[serde(rename = "type")]
    log_type: Option<String>,
    code: Option<String>,
    limit: Option<String>,
}

pub(super) async fn list_logs(
    State(state): State<AppState>,
    Query(params): Query<LogParams>,
) -> Result<ApiResponse<Vec<AppLogRow>>, ApiError> {
    let code = params
        .code
        .as_deref()
        .map(|raw| raw.parse::<i32>())
        .transpose()
        .map_err(|_| ApiError::bad_request("code must be a number"))?;
    let limit = params
        .limit
        .as_deref()
        .map(|raw| raw.parse::<i64>())
        .transpose()
        .map_err(|_| ApiError::bad_request("limit must be a number"))?
        .unwrap_or(DEFAULT_LOG_LIMIT);

    let criteria = AppLogCriteria {
        log_id: params.log_id.as_deref(),
        app_name: params.app_name.as_deref(),
        log_type: params.log_type.as_deref(),
        code,
        limit,
    };
    let rows = query_app_logs(&state.pool, &criteria)
        .await
        .map_err(|error| internal_error(&state, &error))?;

    Ok(ApiResponse::ok("Logs retrieved successfully", rows))
}

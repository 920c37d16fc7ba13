//! Request-scoped middleware: request IDs and request/response journaling.

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::json;
use uuid::Uuid;

use souk_db::NewAppLog;

use crate::api::AppState;

/// Name this service records itself under in the app log.
pub const APP_NAME: &str = "souk-api";

/// Request ID assigned to every request, stored as an extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Reuses the `x-request-id` header when the caller sent one, otherwise
/// generates a fresh UUID. The ID is echoed back on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", value);
    }
    res
}

/// Journals one `request` entry before the handler runs and one `response`
/// entry after it returns, both keyed by the request ID.
///
/// Writes are spawned so a slow or failing log insert never delays the
/// response path.
pub async fn record_request(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let id = req
        .extensions()
        .get::<RequestId>()
        .map_or_else(|| Uuid::new_v4().to_string(), |rid| rid.0.clone());
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(ToString::to_string);

    spawn_entry(
        state.clone(),
        NewAppLog {
            log_id: id.clone(),
            app_name: APP_NAME.to_string(),
            level: "info".to_string(),
            log_type: "request".to_string(),
            code: None,
            message: format!("{method} {path}"),
            data: query.map(|q| json!({ "query": q })),
        },
    );

    let res = next.run(req).await;

    let status = res.status();
    spawn_entry(
        state,
        NewAppLog {
            log_id: id,
            app_name: APP_NAME.to_string(),
            level: level_for(status).to_string(),
            log_type: "response".to_string(),
            code: Some(i32::from(status.as_u16())),
            message: format!("{method} {path}"),
            data: None,
        },
    );

    res
}

fn level_for(status: StatusCode) -> &'static str {
    if status.is_server_error() {
        "error"
    } else {
        "info"
    }
}

fn spawn_entry(state: AppState, entry: NewAppLog) {
    tokio::spawn(async move {
        if let Err(error) = souk_db::insert_app_log(&state.pool, &entry).await {
            tracing::warn!(%error, log_id = %entry.log_id, "app log write failed");
        }
    });
}

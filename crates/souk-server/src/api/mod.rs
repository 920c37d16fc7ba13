//! HTTP surface: router assembly, the response envelope and shared state.

mod logs;
mod products;

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use souk_core::{AppConfig, Environment};

use crate::middleware::{record_request, request_id};
use crate::uploads::ImageStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub images: ImageStore,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, config: Arc<AppConfig>, images: ImageStore) -> Self {
        Self {
            pool,
            config,
            images,
        }
    }

    fn is_development(&self) -> bool {
        matches!(self.config.env, Environment::Development)
    }
}

/// Success envelope. The HTTP status is mirrored into the body so clients
/// reading only the payload still see it.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: u16,
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: &str, data: T) -> Self {
        Self {
            status: StatusCode::OK.as_u16(),
            success: true,
            message: message.to_string(),
            data,
        }
    }

    pub fn created(message: &str, data: T) -> Self {
        Self {
            status: StatusCode::CREATED.as_u16(),
            success: true,
            message: message.to_string(),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// Error envelope. Constructors pick the status; conversion into a response
/// happens exactly once, here.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub status: u16,
    pub success: bool,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            success: false,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Unclassified failure. The real message only leaves the process in
/// development; elsewhere clients get a generic line and the detail goes to
/// the log.
pub(super) fn internal_error<E: std::fmt::Display>(state: &AppState, error: &E) -> ApiError {
    tracing::error!(%error, "request failed");
    if state.is_development() {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    } else {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
    }
}

/// Assemble the full application router.
///
/// Catalog routes live under the configured API prefix; `/` and `/health`
/// stay at the root for load balancers.
pub fn build_app(state: AppState) -> Router {
    let prefix = state.config.api_prefix.clone();
    let max_body = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest(&prefix, catalog_router())
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                ))
                .layer(CompressionLayer::new())
                .layer(build_cors())
                .layer(from_fn(request_id))
                .layer(from_fn_with_state(state.clone(), record_request))
                .layer(DefaultBodyLimit::max(max_body)),
        )
        .with_state(state)
}

fn catalog_router() -> Router<AppState> {
    Router::new()
        .route(
            "/products",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/products/{id_or_slug}",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .route("/xp/logs", get(logs::list_logs))
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn root() -> &'static str {
    "Healthy"
}

async fn health(State(state): State<AppState>) -> Response {
    match souk_db::health_check(&state.pool).await {
        Ok(()) => Json(json!({ "status": "ok", "database": "ok" })).into_response(),
        Err(error) => {
            tracing::warn!(%error, "health check: database unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "database": "unreachable" })),
            )
                .into_response()
        }
    }
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;
    use wiremock::matchers::{method as http_method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use souk_core::ident;
    use souk_db::Collection;

    use super::*;

    // ---- fixtures ----

    fn test_config() -> AppConfig {
        AppConfig {
            database_url: "postgres://unused".to_string(),
            env: Environment::Test,
            bind_addr: std::net::SocketAddr::from(([127, 0, 0, 1], 9000)),
            log_level: "info".to_string(),
            api_prefix: "/api/v3".to_string(),
            upload_dir: std::env::temp_dir().join("souk-route-tests"),
            max_upload_bytes: 1024 * 1024,
            image_store_url: "http://images.invalid".to_string(),
            image_store_key: None,
            image_store_timeout_secs: 5,
            db_max_connections: 5,
            db_min_connections: 1,
            db_acquire_timeout_secs: 5,
        }
    }

    fn test_app(pool: PgPool) -> Router {
        build_app(AppState::new(
            pool,
            Arc::new(test_config()),
            ImageStore::with_base_url("http://images.invalid"),
        ))
    }

    fn product_doc(name: &str, price: f64) -> Value {
        json!({
            "sku": ident::sku(),
            "slug": ident::product_slug(name),
            "name": name,
            "brand": "Acme",
            "category": "lighting",
            "short_description": "short",
            "long_description": "long",
            "weight": 1.5,
            "price": price,
            "quantity": 4,
            "stock_status": "in-stock",
            "images": ["https://cdn.test/seed.png"],
            "primary_image": "https://cdn.test/seed.png",
            "status": "approved",
            "enabled": true,
            "is_top_deal": false,
            "is_bundle": false,
            "is_deleted": false,
            "rating": {"times": 0, "total": 0, "average": 0}
        })
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("request should route");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should collect");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        send(app, request).await
    }

    fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build")
    }

    fn multipart_request(uri: &str, fields: &[(&str, &str)], files: &[(&str, &[u8])]) -> Request<Body> {
        let boundary = "souk-test-boundary";
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for (file_name, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"images\"; \
                     filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("request should build")
    }

    // ---- envelope ----

    #[test]
    fn success_envelope_mirrors_status_into_the_body() {
        let value = serde_json::to_value(ApiResponse::ok("done", json!({"a": 1})))
            .expect("envelope should serialize");
        assert_eq!(
            value,
            json!({"status": 200, "success": true, "message": "done", "data": {"a": 1}})
        );
    }

    #[test]
    fn error_envelope_carries_no_data_field() {
        let value = serde_json::to_value(ApiError::unprocessable("No products!"))
            .expect("envelope should serialize");
        assert_eq!(
            value,
            json!({"status": 422, "success": false, "message": "No products!"})
        );
    }

    #[test]
    fn error_constructors_pick_their_statuses() {
        assert_eq!(ApiError::bad_request("x").status, 400);
        assert_eq!(ApiError::not_found("x").status, 404);
        assert_eq!(ApiError::unprocessable("x").status, 422);
        assert_eq!(ApiError::bad_gateway("x").status, 502);
    }

    // ---- infrastructure routes ----

    #[sqlx::test(migrations = "../../migrations")]
    async fn root_answers_healthy(pool: PgPool) {
        let response = test_app(pool)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should route");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should collect");
        assert_eq!(&bytes[..], b"Healthy");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn health_reports_database_ok(pool: PgPool) {
        let (status, body) = get_json(test_app(pool), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], json!("ok"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn unknown_routes_get_the_error_envelope(pool: PgPool) {
        let (status, body) = get_json(test_app(pool), "/definitely/not/here").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body,
            json!({"status": 404, "success": false, "message": "Not found"})
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn request_id_round_trips_through_the_response(pool: PgPool) {
        let app = test_app(pool);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-request-id", "caller-chosen-id")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should route");
        assert_eq!(
            response.headers().get("x-request-id"),
            Some(&HeaderValue::from_static("caller-chosen-id"))
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn internal_errors_hide_detail_outside_development(pool: PgPool) {
        let production = AppState::new(
            pool.clone(),
            Arc::new(AppConfig {
                env: Environment::Production,
                ..test_config()
            }),
            ImageStore::with_base_url("http://images.invalid"),
        );
        let development = AppState::new(
            pool,
            Arc::new(AppConfig {
                env: Environment::Development,
                ..test_config()
            }),
            ImageStore::with_base_url("http://images.invalid"),
        );

        let boom = std::io::Error::other("connection reset by peer");
        assert_eq!(internal_error(&production, &boom).message, "Something went wrong");
        assert_eq!(
            internal_error(&development, &boom).message,
            "connection reset by peer"
        );
    }

    // ---- product routes ----

    #[sqlx::test(migrations = "../../migrations")]
    async fn empty_catalog_is_unprocessable(pool: PgPool) {
        let (status, body) = get_json(test_app(pool), "/api/v3/products").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], json!("No products!"));
        assert_eq!(body["success"], json!(false));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn listing_pages_and_counts(pool: PgPool) {
        for i in 0..3 {
            souk_db::insert_one(
                &pool,
                Collection::PRODUCTS,
                &product_doc(&format!("Lamp {i}"), 20.0),
            )
            .await
            .expect("seed insert should succeed");
        }

        let (status, body) = get_json(test_app(pool), "/api/v3/products?limit=2&page=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], json!("Products retrieved successfully"));
        assert_eq!(body["data"]["count"], json!(1));
        assert_eq!(body["data"]["pagination"]["total"], json!(3));
        assert_eq!(body["data"]["pagination"]["prev"], json!({"page": 1, "limit": 2}));
        assert_eq!(body["data"]["results"].as_array().map(Vec::len), Some(1));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn malformed_date_filter_is_rejected(pool: PgPool) {
        let (status, body) = get_json(
            test_app(pool),
            "/api/v3/products?startDate=nope&endDate=2026-01-01",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], json!("startDate must be an ISO date"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn product_is_served_by_id_or_slug(pool: PgPool) {
        let doc = product_doc("Desk Lamp", 30.0);
        let slug = doc["slug"].as_str().expect("seed doc has a slug").to_string();
        let row = souk_db::insert_one(&pool, Collection::PRODUCTS, &doc)
            .await
            .expect("seed insert should succeed");

        let app = test_app(pool);
        let (status, body) = get_json(app.clone(), &format!("/api/v3/products/{}", row.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], json!("Product retrieved successfully"));
        assert_eq!(body["data"]["name"], json!("Desk Lamp"));

        let (status, body) = get_json(app, &format!("/api/v3/products/{slug}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], json!(row.id.to_string()));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn soft_deleted_products_are_hidden(pool: PgPool) {
        let mut doc = product_doc("Ghost Lamp", 30.0);
        doc["is_deleted"] = json!(true);
        let row = souk_db::insert_one(&pool, Collection::PRODUCTS, &doc)
            .await
            .expect("seed insert should succeed");

        let (status, body) = get_json(test_app(pool), &format!("/api/v3/products/{}", row.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], json!("Product not found"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn create_requires_an_image(pool: PgPool) {
        let request = multipart_request(
            "/api/v3/products",
            &[
                ("name", "Test Lamp"),
                ("brand", "Lumen"),
                ("category", "lighting"),
                ("short_description", "A lamp"),
                ("long_description", "A larger lamp description"),
                ("weight", "2.5"),
                ("price", "100"),
                ("quantity", "4"),
            ],
            &[],
        );
        let (status, body) = send(test_app(pool), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], json!("Please upload an image or images"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn create_forwards_images_and_persists(pool: PgPool) {
        let store = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(url_path("/upload"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"url": "https://cdn.test/lamp.png"})),
            )
            .expect(1)
            .mount(&store)
            .await;

        let mut config = test_config();
        config.upload_dir = std::env::temp_dir().join(format!("souk-create-{}", Uuid::new_v4()));
        let app = build_app(AppState::new(
            pool,
            Arc::new(config),
            ImageStore::with_base_url(&store.uri()),
        ));

        let request = multipart_request(
            "/api/v3/products",
            &[
                ("name", "Test Lamp"),
                ("brand", "Lumen"),
                ("category", "lighting"),
                ("short_description", "A lamp"),
                ("long_description", "A larger lamp description"),
                ("weight", "2.5"),
                ("price", "100"),
                ("quantity", "4"),
            ],
            &[("lamp.png", b"fake png bytes")],
        );
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
        assert_eq!(body["message"], json!("Product created"));
        assert_eq!(body["data"]["images"], json!(["https://cdn.test/lamp.png"]));
        assert_eq!(body["data"]["primary_image"], json!("https://cdn.test/lamp.png"));
        assert_eq!(body["data"]["stock_status"], json!("in-stock"));
        assert_eq!(body["data"]["sku"].as_str().map(str::len), Some(12));
        assert!(body["data"]["slug"].as_str().is_some_and(|s| s.starts_with("test-lamp-")));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn update_rewrites_fields_and_drops_discount(pool: PgPool) {
        let mut doc = product_doc("Old Lamp", 100.0);
        doc["discount"] = json!({"price": 80.0});
        doc["discount_percentage"] = json!(20.0);
        let row = souk_db::insert_one(&pool, Collection::PRODUCTS, &doc)
            .await
            .expect("seed insert should succeed");
        let slug = doc["slug"].clone();

        let request = json_request(
            Method::PUT,
            &format!("/api/v3/products/{}", row.id),
            &json!({"name": "Renamed Lamp", "discount": null}),
        );
        let (status, body) = send(test_app(pool), request).await;
        assert_eq!(status, StatusCode::OK, "update failed: {body}");
        assert_eq!(body["message"], json!("Product updated"));
        assert_eq!(body["data"]["name"], json!("Renamed Lamp"));
        assert_eq!(body["data"]["slug"], slug);
        assert!(body["data"].get("discount").is_none());
        assert!(body["data"].get("discount_percentage").is_none());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn update_misses_are_not_found(pool: PgPool) {
        let app = test_app(pool);

        let request = json_request(
            Method::PUT,
            &format!("/api/v3/products/{}", Uuid::new_v4()),
            &json!({"name": "x"}),
        );
        let (status, _) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let request = json_request(
            Method::PUT,
            "/api/v3/products/not-a-uuid",
            &json!({"name": "x"}),
        );
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], json!("Product not found"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn delete_removes_the_product(pool: PgPool) {
        let row = souk_db::insert_one(&pool, Collection::PRODUCTS, &product_doc("Doomed", 10.0))
            .await
            .expect("seed insert should succeed");
        let app = test_app(pool);
        let uri = format!("/api/v3/products/{}", row.id);

        let request = Request::builder()
            .method(Method::DELETE)
            .uri(&uri)
            .body(Body::empty())
            .expect("request should build");
        let (status, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], json!("Product deleted successfully"));
        assert_eq!(body["data"], json!({}));

        let request = Request::builder()
            .method(Method::DELETE)
            .uri(&uri)
            .body(Body::empty())
            .expect("request should build");
        let (status, _) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get_json(app, &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // ---- log routes ----

    #[sqlx::test(migrations = "../../migrations")]
    async fn logs_filter_by_type_and_code(pool: PgPool) {
        for (log_type, code) in [("request", None), ("response", Some(201))] {
            souk_db::insert_app_log(
                &pool,
                &souk_db::NewAppLog {
                    log_id: "abc-123".to_string(),
                    app_name: "souk-api".to_string(),
                    level: "info".to_string(),
                    log_type: log_type.to_string(),
                    code,
                    message: "POST /api/v3/products".to_string(),
                    data: None,
                },
            )
            .await
            .expect("seed log should insert");
        }

        let app = test_app(pool);
        let (status, body) = get_json(app.clone(), "/api/v3/xp/logs?type=response&code=201").await;
        assert_eq!(status, StatusCode::OK);
        let rows = body["data"].as_array().expect("data should be an array");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["type"], json!("response"));
        assert_eq!(rows[0]["code"], json!(201));

        let (status, body) = get_json(app, "/api/v3/xp/logs?code=garbage").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], json!("code must be a number"));
    }
}

//! Product catalog handlers.

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use souk_core::product::{self, CreateFields, UpdateDraft};
use souk_core::query::translate;
use souk_db::{Collection, ListResult};

use crate::uploads::{stage_image, MAX_PRODUCT_IMAGES};

use super::{internal_error, ApiError, ApiResponse, AppState};

pub(super) async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<ApiResponse<ListResult>, ApiError> {
    let spec = translate(&params).map_err(|error| ApiError::bad_request(error.to_string()))?;
    let result = souk_db::paged_list(&state.pool, Collection::PRODUCTS, &spec)
        .await
        .map_err(|error| match error {
            souk_db::DbError::NoResults => ApiError::unprocessable("No products!"),
            other => internal_error(&state, &other),
        })?;
    Ok(ApiResponse::ok("Products retrieved successfully", result))
}

/// UUID-shaped identifiers look up by primary key, anything else by slug.
pub(super) async fn get_product(
    State(state): State<AppState>,
    Path(id_or_slug): Path<String>,
) -> Result<ApiResponse<Value>, ApiError> {
    let row = match Uuid::parse_str(&id_or_slug) {
        Ok(id) => souk_db::find_by_id(&state.pool, Collection::PRODUCTS, id).await,
        Err(_) => {
            souk_db::find_by_field(&state.pool, Collection::PRODUCTS, &["slug"], &id_or_slug).await
        }
    }
    .map_err(|error| internal_error(&state, &error))?;

    let row = row.ok_or_else(product_not_found)?;
    if is_soft_deleted(&row.doc) {
        return Err(product_not_found());
    }
    Ok(ApiResponse::ok(
        "Product retrieved successfully",
        row.into_document(),
    ))
}

/// Create is multipart: text parts form the payload, file parts become the
/// image list. Validation runs before any upload so rejected payloads never
/// touch the image store.
pub(super) async fn create_product(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<ApiResponse<Value>, ApiError> {
    let (fields, files) = read_multipart(&mut multipart).await?;
    if files.is_empty() {
        return Err(ApiError::bad_request("Please upload an image or images"));
    }
    if files.len() > MAX_PRODUCT_IMAGES {
        return Err(ApiError::bad_request(
            "images can not have more than 5 entries",
        ));
    }

    let mut draft = product::normalize_create(&fields)
        .map_err(|error| ApiError::bad_request(error.to_string()))?;

    let urls = upload_all(&state, files).await?;
    draft.attach_images(urls);

    let inserted = souk_db::insert_one(&state.pool, Collection::PRODUCTS, &draft.to_document())
        .await
        .map_err(|error| internal_error(&state, &error))?;
    let row = souk_db::find_by_id(&state.pool, Collection::PRODUCTS, inserted.id)
        .await
        .map_err(|error| internal_error(&state, &error))?
        .ok_or_else(product_not_found)?;

    Ok(ApiResponse::created("Product created", row.into_document()))
}

pub(super) async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<ApiResponse<Value>, ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| product_not_found())?;
    let stored = souk_db::find_by_id(&state.pool, Collection::PRODUCTS, id)
        .await
        .map_err(|error| internal_error(&state, &error))?
        .ok_or_else(product_not_found)?;
    if is_soft_deleted(&stored.doc) {
        return Err(product_not_found());
    }

    let draft =
        UpdateDraft::from_value(&body).map_err(|error| ApiError::bad_request(error.to_string()))?;
    let plan = product::normalize_update(&stored.doc, &draft)
        .map_err(|error| ApiError::bad_request(error.to_string()))?;

    let updated = souk_db::update_one(&state.pool, Collection::PRODUCTS, id, &plan)
        .await
        .map_err(|error| internal_error(&state, &error))?
        .ok_or_else(product_not_found)?;

    Ok(ApiResponse::ok("Product updated", updated.into_document()))
}

pub(super) async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<Value>, ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| product_not_found())?;
    souk_db::find_by_id(&state.pool, Collection::PRODUCTS, id)
        .await
        .map_err(|error| internal_error(&state, &error))?
        .ok_or_else(product_not_found)?;

    souk_db::delete_one(&state.pool, Collection::PRODUCTS, id)
        .await
        .map_err(|error| internal_error(&state, &error))?;

    Ok(ApiResponse::ok("Product deleted successfully", json!({})))
}

fn product_not_found() -> ApiError {
    ApiError::not_found("Product not found")
}

fn is_soft_deleted(doc: &Value) -> bool {
    doc.get("is_deleted").and_then(Value::as_bool).unwrap_or(false)
}

/// An uploaded file part, held in memory until validation passes.
struct PendingFile {
    name: String,
    bytes: Vec<u8>,
}

/// Splits multipart parts by the presence of a filename: parts with one are
/// image files, the rest are text payload fields.
async fn read_multipart(
    multipart: &mut Multipart,
) -> Result<(CreateFields, Vec<PendingFile>), ApiError> {
    let mut fields = CreateFields::new();
    let mut files = Vec::new();

    while let Some(part) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::bad_request(error.to_string()))?
    {
        let field_name = part.name().unwrap_or_default().to_string();
        if let Some(file_name) = part.file_name() {
            let file_name = file_name.to_string();
            let bytes = part
                .bytes()
                .await
                .map_err(|error| ApiError::bad_request(error.to_string()))?;
            files.push(PendingFile {
                name: file_name,
                bytes: bytes.to_vec(),
            });
        } else {
            let text = part
                .text()
                .await
                .map_err(|error| ApiError::bad_request(error.to_string()))?;
            fields.insert(field_name, text);
        }
    }
    Ok((fields, files))
}

/// Stages and forwards files one at a time. When a forward fails, every URL
/// already handed out is deleted from the store before the error surfaces,
/// so a half-created product never leaks images.
async fn upload_all(state: &AppState, files: Vec<PendingFile>) -> Result<Vec<String>, ApiError> {
    let mut urls: Vec<String> = Vec::with_capacity(files.len());
    for file in files {
        let staged = stage_image(&state.config.upload_dir, &file.name, &file.bytes)
            .await
            .map_err(|error| internal_error(state, &error))?;
        match state.images.upload(&staged).await {
            Ok(url) => urls.push(url),
            Err(error) => {
                tracing::error!(%error, file = %file.name, "image upload failed");
                for url in &urls {
                    state.images.delete(url).await;
                }
                return Err(ApiError::bad_gateway("Image upload failed"));
            }
        }
    }
    Ok(urls)
}

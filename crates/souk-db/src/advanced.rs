//! Windowed list execution: count, fetch, populate, project, paginate.

use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use souk_core::query::{Pagination, QuerySpec};

use crate::collection::{self, Collection, DocRow};
use crate::DbError;

/// The list payload: documents for the requested window plus pagination
/// descriptors computed from the total match count.
#[derive(Debug, Serialize)]
pub struct ListResult {
    pub count: usize,
    pub pagination: Pagination,
    pub results: Vec<Value>,
}

/// Run a list query end to end.
///
/// The total is counted with the same compiled filter as the fetch, then the
/// window is fetched, populated, and projected.
///
/// # Errors
///
/// Returns [`DbError::NoResults`] when the window holds no documents, even
/// when the total is zero, and [`DbError::Sqlx`] on query failure.
pub async fn paged_list(
    pool: &PgPool,
    collection: Collection,
    spec: &QuerySpec,
) -> Result<ListResult, DbError> {
    let total = collection::count(pool, collection, &spec.filter).await?;
    let rows = collection::find(pool, collection, spec).await?;
    if rows.is_empty() {
        return Err(DbError::NoResults);
    }

    let mut results: Vec<Value> = rows.into_iter().map(DocRow::into_document).collect();
    collection::apply_populates(pool, &mut results, &spec.populates).await?;
    if let Some(projection) = &spec.projection {
        for doc in &mut results {
            collection::apply_projection(doc, projection);
        }
    }

    Ok(ListResult {
        count: results.len(),
        pagination: spec.page.paginate(total),
        results,
    })
}

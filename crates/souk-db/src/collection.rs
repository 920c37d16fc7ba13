//! JSONB document collections and typed filter compilation.
//!
//! Filters compile to parameterized SQL only: field paths travel as
//! `text[]` binds and values as typed binds, so no query-string fragment is
//! ever interpolated into a statement. Table names come from the fixed
//! [`Collection`] set.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::PgArguments;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use souk_core::product::UpdatePlan;
use souk_core::query::{Condition, Filter, PopulateSpec, Projection, QuerySpec, Scalar, SortKey};

use crate::DbError;

/// The text-search expression. Must stay byte-identical to the expression
/// indexed in the migrations or the GIN index is skipped.
const SEARCH_VECTOR: &str = "to_tsvector('english', coalesce(doc->>'name', '') || ' ' || \
     coalesce(doc->>'slug', '') || ' ' || coalesce(doc->>'vendor', ''))";

/// Document keys that projections always keep.
const ALWAYS_KEPT: &[&str] = &["id", "createdAt", "updatedAt"];

/// A named JSONB document collection. Construction is restricted to the
/// known collections so table names never travel as runtime strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collection {
    table: &'static str,
}

impl Collection {
    pub const PRODUCTS: Collection = Collection { table: "products" };
    pub const CAMPAIGNS: Collection = Collection { table: "campaigns" };

    #[must_use]
    pub fn by_name(name: &str) -> Option<Collection> {
        match name {
            "products" => Some(Self::PRODUCTS),
            "campaigns" => Some(Self::CAMPAIGNS),
            _ => None,
        }
    }

    #[must_use]
    pub fn table(self) -> &'static str {
        self.table
    }
}

/// A row from one of the document tables.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DocRow {
    pub id: Uuid,
    pub doc: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocRow {
    /// Merge the storage columns into the document body: `id` plus
    /// `createdAt` / `updatedAt` in millisecond RFC 3339 form.
    #[must_use]
    pub fn into_document(self) -> Value {
        let mut map = match self.doc {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        map.insert("id".to_string(), Value::String(self.id.to_string()));
        map.insert(
            "createdAt".to_string(),
            Value::String(timestamp_string(self.created_at)),
        );
        map.insert(
            "updatedAt".to_string(),
            Value::String(timestamp_string(self.updated_at)),
        );
        Value::Object(map)
    }
}

fn timestamp_string(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ---------------------------------------------------------------------------
// Filter compilation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Bind {
    Text(String),
    TextArray(Vec<String>),
    Float(f64),
    BigInt(i64),
    Timestamp(DateTime<Utc>),
}

struct SqlBuilder {
    sql: String,
    binds: Vec<Bind>,
}

impl SqlBuilder {
    fn new(head: String) -> Self {
        SqlBuilder {
            sql: head,
            binds: Vec::new(),
        }
    }

    fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    /// Register a bind and return its `$n` placeholder.
    fn bind(&mut self, bind: Bind) -> String {
        self.binds.push(bind);
        format!("${}", self.binds.len())
    }
}

fn compile_where(filter: &Filter, b: &mut SqlBuilder) {
    let mut clauses: Vec<String> = Vec::new();
    for field in &filter.fields {
        for condition in &field.conditions {
            clauses.push(compile_condition(&field.path, condition, b));
        }
    }
    if let Some((start, end)) = filter.created_range {
        let s = b.bind(Bind::Timestamp(start));
        let e = b.bind(Bind::Timestamp(end));
        clauses.push(format!("created_at >= {s} AND created_at <= {e}"));
    }
    if let Some(terms) = &filter.search {
        let q = b.bind(Bind::Text(terms.clone()));
        clauses.push(format!("{SEARCH_VECTOR} @@ plainto_tsquery('english', {q})"));
    }
    if !clauses.is_empty() {
        b.push(" WHERE ");
        b.push(&clauses.join(" AND "));
    }
}

fn compile_condition(path: &[String], condition: &Condition, b: &mut SqlBuilder) -> String {
    match condition {
        Condition::Eq(scalar) => compile_eq(path, scalar, b),
        Condition::Gt(scalar) => compile_ordered(path, ">", scalar, b),
        Condition::Gte(scalar) => compile_ordered(path, ">=", scalar, b),
        Condition::Lt(scalar) => compile_ordered(path, "<", scalar, b),
        Condition::Lte(scalar) => compile_ordered(path, "<=", scalar, b),
        Condition::In(values) => {
            let options: Vec<String> = values.iter().map(|v| compile_eq(path, v, b)).collect();
            format!("({})", options.join(" OR "))
        }
        Condition::Regex(pattern) => {
            let p = b.bind(Bind::TextArray(path.to_vec()));
            let v = b.bind(Bind::Text(pattern.clone()));
            format!("doc #>> {p}::text[] ~* {v}")
        }
    }
}

/// Numeric-looking values match either a JSON number (typed comparison, so
/// `100` matches a stored `100.0`) or the same literal text.
fn compile_eq(path: &[String], scalar: &Scalar, b: &mut SqlBuilder) -> String {
    let p = b.bind(Bind::TextArray(path.to_vec()));
    match scalar.numeric {
        Some(number) => {
            let n = b.bind(Bind::Float(number));
            let t = b.bind(Bind::Text(scalar.raw.clone()));
            format!("(doc #> {p}::text[] = to_jsonb({n}::float8) OR doc #>> {p}::text[] = {t})")
        }
        None => {
            let t = b.bind(Bind::Text(scalar.raw.clone()));
            format!("doc #>> {p}::text[] = {t}")
        }
    }
}

fn compile_ordered(path: &[String], op: &str, scalar: &Scalar, b: &mut SqlBuilder) -> String {
    let p = b.bind(Bind::TextArray(path.to_vec()));
    match scalar.numeric {
        Some(number) => {
            let n = b.bind(Bind::Float(number));
            format!("doc #> {p}::text[] {op} to_jsonb({n}::float8)")
        }
        None => {
            let t = b.bind(Bind::Text(scalar.raw.clone()));
            format!("doc #>> {p}::text[] {op} {t}")
        }
    }
}

fn compile_order_by(sort: &[SortKey], b: &mut SqlBuilder) {
    let mut terms: Vec<String> = Vec::new();
    for key in sort {
        let direction = if key.descending { "DESC" } else { "ASC" };
        let term = match key.field.as_str() {
            "createdAt" => format!("created_at {direction}"),
            "updatedAt" => format!("updated_at {direction}"),
            "id" => format!("id {direction}"),
            _ => {
                let p = b.bind(Bind::TextArray(split_path(&key.field)));
                format!("doc #> {p}::text[] {direction}")
            }
        };
        terms.push(term);
    }
    // Stable tiebreak keeps page windows disjoint when sort keys collide.
    terms.push("id ASC".to_string());
    b.push(" ORDER BY ");
    b.push(&terms.join(", "));
}

fn split_path(field: &str) -> Vec<String> {
    field.split('.').map(str::to_string).collect()
}

fn build_find(collection: Collection, spec: &QuerySpec) -> (String, Vec<Bind>) {
    let mut b = SqlBuilder::new(format!(
        "SELECT id, doc, created_at, updated_at FROM {}",
        collection.table()
    ));
    compile_where(&spec.filter, &mut b);
    compile_order_by(&spec.sort, &mut b);
    let limit = b.bind(Bind::BigInt(i64::from(spec.page.limit)));
    let offset = b.bind(Bind::BigInt(
        i64::try_from(spec.page.skip()).unwrap_or(i64::MAX),
    ));
    b.push(&format!(" LIMIT {limit} OFFSET {offset}"));
    (b.sql, b.binds)
}

fn build_count(collection: Collection, filter: &Filter) -> (String, Vec<Bind>) {
    let mut b = SqlBuilder::new(format!("SELECT COUNT(*) FROM {}", collection.table()));
    compile_where(filter, &mut b);
    (b.sql, b.binds)
}

type DocQuery<'q> = sqlx::query::QueryAs<'q, sqlx::Postgres, DocRow, PgArguments>;
type ScalarQuery<'q> = sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, PgArguments>;

fn bind_doc_query<'q>(query: DocQuery<'q>, bind: &'q Bind) -> DocQuery<'q> {
    match bind {
        Bind::Text(v) => query.bind(v),
        Bind::TextArray(v) => query.bind(v),
        Bind::Float(v) => query.bind(v),
        Bind::BigInt(v) => query.bind(v),
        Bind::Timestamp(v) => query.bind(v),
    }
}

fn bind_scalar_query<'q>(query: ScalarQuery<'q>, bind: &'q Bind) -> ScalarQuery<'q> {
    match bind {
        Bind::Text(v) => query.bind(v),
        Bind::TextArray(v) => query.bind(v),
        Bind::Float(v) => query.bind(v),
        Bind::BigInt(v) => query.bind(v),
        Bind::Timestamp(v) => query.bind(v),
    }
}

// ---------------------------------------------------------------------------
// Collection operations
// ---------------------------------------------------------------------------

/// Fetch the window of documents selected by `spec`: compiled filter, sort
/// with id tiebreak, then `LIMIT`/`OFFSET` from the page request.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find(
    pool: &PgPool,
    collection: Collection,
    spec: &QuerySpec,
) -> Result<Vec<DocRow>, DbError> {
    let (sql, binds) = build_find(collection, spec);
    let mut query = sqlx::query_as::<_, DocRow>(&sql);
    for bind in &binds {
        query = bind_doc_query(query, bind);
    }
    Ok(query.fetch_all(pool).await?)
}

/// Count the documents matching the compiled filter.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count(pool: &PgPool, collection: Collection, filter: &Filter) -> Result<u64, DbError> {
    let (sql, binds) = build_count(collection, filter);
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    for bind in &binds {
        query = bind_scalar_query(query, bind);
    }
    let total = query.fetch_one(pool).await?;
    Ok(u64::try_from(total).unwrap_or(0))
}

/// Fetch the newest document whose text at `path` equals `value`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_by_field(
    pool: &PgPool,
    collection: Collection,
    path: &[&str],
    value: &str,
) -> Result<Option<DocRow>, DbError> {
    let sql = format!(
        "SELECT id, doc, created_at, updated_at FROM {} \
         WHERE doc #>> $1::text[] = $2 \
         ORDER BY created_at DESC, id DESC \
         LIMIT 1",
        collection.table()
    );
    let path: Vec<String> = path.iter().map(|s| (*s).to_string()).collect();
    let row = sqlx::query_as::<_, DocRow>(&sql)
        .bind(path)
        .bind(value)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Fetch one document by primary key.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_by_id(
    pool: &PgPool,
    collection: Collection,
    id: Uuid,
) -> Result<Option<DocRow>, DbError> {
    let sql = format!(
        "SELECT id, doc, created_at, updated_at FROM {} WHERE id = $1",
        collection.table()
    );
    let row = sqlx::query_as::<_, DocRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Insert a document and return the stored row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails, including unique-index
/// violations on `sku` or `slug`.
pub async fn insert_one(
    pool: &PgPool,
    collection: Collection,
    doc: &Value,
) -> Result<DocRow, DbError> {
    let sql = format!(
        "INSERT INTO {} (doc) VALUES ($1::jsonb) \
         RETURNING id, doc, created_at, updated_at",
        collection.table()
    );
    let row = sqlx::query_as::<_, DocRow>(&sql)
        .bind(doc)
        .fetch_one(pool)
        .await?;
    Ok(row)
}

/// Apply an update plan in a single statement: merge the `set` keys into the
/// document, remove the `unset` keys, refresh `updated_at`.
///
/// Returns `None` when no row has the given id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_one(
    pool: &PgPool,
    collection: Collection,
    id: Uuid,
    plan: &UpdatePlan,
) -> Result<Option<DocRow>, DbError> {
    let sql = format!(
        "UPDATE {} SET doc = (doc || $2::jsonb) - $3::text[], updated_at = NOW() \
         WHERE id = $1 \
         RETURNING id, doc, created_at, updated_at",
        collection.table()
    );
    let row = sqlx::query_as::<_, DocRow>(&sql)
        .bind(id)
        .bind(Value::Object(plan.set.clone()))
        .bind(&plan.unset)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Hard-delete one document by primary key. Returns whether a row was
/// removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_one(pool: &PgPool, collection: Collection, id: Uuid) -> Result<bool, DbError> {
    let sql = format!("DELETE FROM {} WHERE id = $1", collection.table());
    let result = sqlx::query(&sql).bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Projection and populate
// ---------------------------------------------------------------------------

/// Apply a projection to a merged document. Inclusion keeps the listed keys
/// plus identity and timestamps; exclusion removes exactly the listed keys.
pub fn apply_projection(doc: &mut Value, projection: &Projection) {
    let Some(map) = doc.as_object_mut() else {
        return;
    };
    match projection {
        Projection::Include(fields) => {
            map.retain(|key, _| {
                ALWAYS_KEPT.contains(&key.as_str()) || fields.iter().any(|f| f == key)
            });
        }
        Projection::Exclude(fields) => {
            map.retain(|key, _| !fields.iter().any(|f| f == key));
        }
    }
}

/// Resolve reference expansions over a batch of documents.
///
/// For each spec, the id strings found at `path` are batch-fetched from the
/// target collection and the referenced document (optionally projected to
/// `select`) replaces the id in place. A dangling reference becomes `null`;
/// a value that is not a document id is left untouched.
///
/// # Errors
///
/// Returns [`DbError::UnknownCollection`] for an unknown target collection
/// and [`DbError::Sqlx`] if a lookup fails.
pub async fn apply_populates(
    pool: &PgPool,
    docs: &mut [Value],
    populates: &[PopulateSpec],
) -> Result<(), DbError> {
    for spec in populates {
        let collection = Collection::by_name(&spec.collection)
            .ok_or_else(|| DbError::UnknownCollection(spec.collection.clone()))?;
        let path: Vec<&str> = spec.path.split('.').collect();

        let mut wanted: Vec<Uuid> = Vec::new();
        for doc in docs.iter() {
            if let Some(id) = reference_at(doc, &path) {
                if !wanted.contains(&id) {
                    wanted.push(id);
                }
            }
        }
        if wanted.is_empty() {
            continue;
        }

        let sql = format!(
            "SELECT id, doc, created_at, updated_at FROM {} WHERE id = ANY($1::uuid[])",
            collection.table()
        );
        let rows: Vec<DocRow> = sqlx::query_as(&sql).bind(&wanted).fetch_all(pool).await?;

        let mut referenced: HashMap<Uuid, Value> = HashMap::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            let mut document = row.into_document();
            if let Some(fields) = &spec.select {
                apply_projection(&mut document, &Projection::Include(fields.clone()));
            }
            referenced.insert(id, document);
        }

        for doc in docs.iter_mut() {
            let Some(id) = reference_at(doc, &path) else {
                continue;
            };
            let replacement = referenced.get(&id).cloned().unwrap_or(Value::Null);
            set_at(doc, &path, replacement);
        }
    }
    Ok(())
}

fn reference_at(doc: &Value, path: &[&str]) -> Option<Uuid> {
    let mut cursor = doc;
    for segment in path {
        cursor = cursor.get(segment)?;
    }
    cursor.as_str().and_then(|s| Uuid::parse_str(s).ok())
}

fn set_at(doc: &mut Value, path: &[&str], replacement: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cursor = doc;
    for segment in parents {
        let Some(next) = cursor.get_mut(*segment) else {
            return;
        };
        cursor = next;
    }
    if let Some(map) = cursor.as_object_mut() {
        map.insert((*last).to_string(), replacement);
    }
}

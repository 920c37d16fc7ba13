//! Live integration tests for souk-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/souk-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use serde_json::{json, Map, Value};
use souk_core::ident;
use souk_core::product::UpdatePlan;
use souk_core::query::{translate, PopulateSpec};
use souk_db::{
    apply_populates, count, delete_one, find_by_field, find_by_id, insert_app_log, insert_one,
    paged_list, query_app_logs, update_one, AppLogCriteria, Collection, DbError, NewAppLog,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A minimal product document with unique generated sku and slug.
fn product_doc(name: &str, price: f64) -> Value {
    json!({
        "sku": ident::sku(),
        "slug": ident::product_slug(name),
        "name": name,
        "brand": "Lumo",
        "category": "lighting",
        "short_description": "A lamp.",
        "long_description": "A lamp for desks.",
        "weight": 1.2,
        "price": price,
        "quantity": 10,
        "stock_status": "in-stock",
        "images": ["https://images.test/one.png"],
        "primary_image": "https://images.test/one.png",
        "status": "pending",
        "enabled": false,
        "is_top_deal": false,
        "is_bundle": false,
        "is_deleted": false,
        "rating": {"times": 0, "total": 0, "average": 0}
    })
}

fn spec_for(pairs: &[(&str, &str)]) -> souk_core::query::QuerySpec {
    let params: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    translate(&params).expect("translate failed")
}

async fn seed_products(pool: &sqlx::PgPool, count: usize) -> Vec<Value> {
    let mut docs = Vec::with_capacity(count);
    for i in 0..count {
        #[allow(clippy::cast_precision_loss)]
        let price = 10.0 + i as f64;
        let doc = product_doc(&format!("Lamp {i}"), price);
        let row = insert_one(pool, Collection::PRODUCTS, &doc)
            .await
            .expect("insert_one failed");
        docs.push(row.into_document());
    }
    docs
}

// ---------------------------------------------------------------------------
// Section 1: Document CRUD
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn insert_and_fetch_roundtrip(pool: sqlx::PgPool) {
    let doc = product_doc("Desk Lamp", 45.0);
    let inserted = insert_one(&pool, Collection::PRODUCTS, &doc)
        .await
        .expect("insert_one failed");

    let fetched = find_by_id(&pool, Collection::PRODUCTS, inserted.id)
        .await
        .expect("find_by_id failed")
        .expect("row should exist");

    let merged = fetched.into_document();
    assert_eq!(merged["name"], "Desk Lamp");
    assert_eq!(merged["id"], inserted.id.to_string());
    assert!(merged["createdAt"].is_string());
    assert!(merged["updatedAt"].is_string());
}

#[sqlx::test(migrations = "../../migrations")]
async fn find_by_field_reads_the_slug(pool: sqlx::PgPool) {
    let doc = product_doc("Desk Lamp", 45.0);
    let slug = doc["slug"].as_str().expect("slug").to_string();
    insert_one(&pool, Collection::PRODUCTS, &doc)
        .await
        .expect("insert_one failed");
    insert_one(&pool, Collection::PRODUCTS, &product_doc("Floor Lamp", 80.0))
        .await
        .expect("insert_one failed");

    let found = find_by_field(&pool, Collection::PRODUCTS, &["slug"], &slug)
        .await
        .expect("find_by_field failed")
        .expect("row should exist");
    assert_eq!(found.doc["name"], "Desk Lamp");

    let missing = find_by_field(&pool, Collection::PRODUCTS, &["slug"], "no-such-slug")
        .await
        .expect("find_by_field failed");
    assert!(missing.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn duplicate_sku_is_rejected(pool: sqlx::PgPool) {
    let mut doc = product_doc("Desk Lamp", 45.0);
    insert_one(&pool, Collection::PRODUCTS, &doc)
        .await
        .expect("insert_one failed");

    // Same sku, fresh slug.
    doc["slug"] = json!(ident::product_slug("Desk Lamp"));
    let err = insert_one(&pool, Collection::PRODUCTS, &doc)
        .await
        .expect_err("duplicate sku should fail");
    assert!(matches!(err, DbError::Sqlx(_)));
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_one_merges_and_unsets_in_one_statement(pool: sqlx::PgPool) {
    let mut doc = product_doc("Desk Lamp", 45.0);
    doc["discount"] = json!({"price": 40.0});
    doc["discount_percentage"] = json!(11.11);
    let inserted = insert_one(&pool, Collection::PRODUCTS, &doc)
        .await
        .expect("insert_one failed");

    let mut set = Map::new();
    set.insert("name".to_string(), json!("Desk Lamp Mk II"));
    let plan = UpdatePlan {
        set,
        unset: vec!["discount".to_string(), "discount_percentage".to_string()],
    };

    let updated = update_one(&pool, Collection::PRODUCTS, inserted.id, &plan)
        .await
        .expect("update_one failed")
        .expect("row should exist");

    assert_eq!(updated.doc["name"], "Desk Lamp Mk II");
    assert!(updated.doc.get("discount").is_none());
    assert!(updated.doc.get("discount_percentage").is_none());
    assert_eq!(updated.doc["price"], json!(45.0));
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_missing_row_returns_none(pool: sqlx::PgPool) {
    let plan = UpdatePlan::default();
    let updated = update_one(&pool, Collection::PRODUCTS, uuid::Uuid::new_v4(), &plan)
        .await
        .expect("update_one failed");
    assert!(updated.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn delete_one_removes_the_row(pool: sqlx::PgPool) {
    let inserted = insert_one(&pool, Collection::PRODUCTS, &product_doc("Desk Lamp", 45.0))
        .await
        .expect("insert_one failed");

    assert!(delete_one(&pool, Collection::PRODUCTS, inserted.id)
        .await
        .expect("delete_one failed"));
    assert!(find_by_id(&pool, Collection::PRODUCTS, inserted.id)
        .await
        .expect("find_by_id failed")
        .is_none());
    assert!(!delete_one(&pool, Collection::PRODUCTS, inserted.id)
        .await
        .expect("delete_one failed"));
}

// ---------------------------------------------------------------------------
// Section 2: Filters and search
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn numeric_filters_compare_as_numbers(pool: sqlx::PgPool) {
    for (name, price) in [("Cheap", 30.0), ("Middle", 45.0), ("Dear", 60.0)] {
        insert_one(&pool, Collection::PRODUCTS, &product_doc(name, price))
            .await
            .expect("insert_one failed");
    }

    let gt = count(
        &pool,
        Collection::PRODUCTS,
        &spec_for(&[("price[gt]", "40")]).filter,
    )
    .await
    .expect("count failed");
    assert_eq!(gt, 2);

    // 45 matches the stored JSON number 45.0.
    let eq = count(
        &pool,
        Collection::PRODUCTS,
        &spec_for(&[("price", "45")]).filter,
    )
    .await
    .expect("count failed");
    assert_eq!(eq, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn regex_filter_is_case_insensitive(pool: sqlx::PgPool) {
    insert_one(&pool, Collection::PRODUCTS, &product_doc("Desk Lamp", 45.0))
        .await
        .expect("insert_one failed");
    insert_one(&pool, Collection::PRODUCTS, &product_doc("Office Chair", 120.0))
        .await
        .expect("insert_one failed");

    let matched = count(
        &pool,
        Collection::PRODUCTS,
        &spec_for(&[("name[regex]", "lamp")]).filter,
    )
    .await
    .expect("count failed");
    assert_eq!(matched, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn search_clause_matches_indexed_terms(pool: sqlx::PgPool) {
    insert_one(&pool, Collection::PRODUCTS, &product_doc("Desk Lamp", 45.0))
        .await
        .expect("insert_one failed");
    insert_one(&pool, Collection::PRODUCTS, &product_doc("Office Chair", 120.0))
        .await
        .expect("insert_one failed");

    let matched = count(
        &pool,
        Collection::PRODUCTS,
        &spec_for(&[("search", "lamp")]).filter,
    )
    .await
    .expect("count failed");
    assert_eq!(matched, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn created_range_includes_only_the_window(pool: sqlx::PgPool) {
    seed_products(&pool, 2).await;

    let wide = count(
        &pool,
        Collection::PRODUCTS,
        &spec_for(&[("startDate", "2020-01-01"), ("endDate", "2099-01-01")]).filter,
    )
    .await
    .expect("count failed");
    assert_eq!(wide, 2);

    let past = count(
        &pool,
        Collection::PRODUCTS,
        &spec_for(&[("startDate", "2020-01-01"), ("endDate", "2020-12-31")]).filter,
    )
    .await
    .expect("count failed");
    assert_eq!(past, 0);
}

// ---------------------------------------------------------------------------
// Section 3: Paged lists
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn paged_list_windows_and_paginates(pool: sqlx::PgPool) {
    seed_products(&pool, 12).await;

    let result = paged_list(
        &pool,
        Collection::PRODUCTS,
        &spec_for(&[("sort", "price"), ("limit", "5"), ("page", "2")]),
    )
    .await
    .expect("paged_list failed");

    assert_eq!(result.count, 5);
    assert_eq!(result.pagination.total, 12);
    let next = result.pagination.next.expect("next page");
    assert_eq!((next.page, next.limit), (3, 5));
    let prev = result.pagination.prev.expect("prev page");
    assert_eq!((prev.page, prev.limit), (1, 5));
    // Prices seed as 10 through 21, so page two of the ascending sort starts at 15.
    assert_eq!(result.results[0]["price"], json!(15.0));
}

#[sqlx::test(migrations = "../../migrations")]
async fn paged_list_empty_window_is_no_results(pool: sqlx::PgPool) {
    let err = paged_list(&pool, Collection::PRODUCTS, &spec_for(&[]))
        .await
        .expect_err("empty collection should error");
    assert!(matches!(err, DbError::NoResults));

    seed_products(&pool, 3).await;
    let err = paged_list(
        &pool,
        Collection::PRODUCTS,
        &spec_for(&[("page", "5"), ("limit", "10")]),
    )
    .await
    .expect_err("page past the end should error");
    assert!(matches!(err, DbError::NoResults));
}

#[sqlx::test(migrations = "../../migrations")]
async fn paged_list_applies_projection(pool: sqlx::PgPool) {
    seed_products(&pool, 1).await;

    let result = paged_list(
        &pool,
        Collection::PRODUCTS,
        &spec_for(&[("select", "name,price")]),
    )
    .await
    .expect("paged_list failed");

    let doc = result.results[0].as_object().expect("object");
    assert_eq!(doc.len(), 5);
    assert!(doc.contains_key("name"));
    assert!(doc.contains_key("price"));
    assert!(doc.contains_key("id"));
    assert!(!doc.contains_key("brand"));
}

// ---------------------------------------------------------------------------
// Section 4: Populate
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn populate_embeds_the_referenced_campaign(pool: sqlx::PgPool) {
    let campaign = insert_one(
        &pool,
        Collection::CAMPAIGNS,
        &json!({"name": "Summer Sale", "status": "accepted", "budget": 5000}),
    )
    .await
    .expect("insert_one failed");

    let mut doc = product_doc("Desk Lamp", 45.0);
    doc["campaign"] = json!({"id": campaign.id.to_string(), "status": "accepted"});
    insert_one(&pool, Collection::PRODUCTS, &doc)
        .await
        .expect("insert_one failed");

    let spec = spec_for(&[]).with_populates(vec![PopulateSpec {
        path: "campaign.id".to_string(),
        collection: "campaigns".to_string(),
        select: Some(vec!["name".to_string()]),
    }]);
    let result = paged_list(&pool, Collection::PRODUCTS, &spec)
        .await
        .expect("paged_list failed");

    let embedded = &result.results[0]["campaign"]["id"];
    assert_eq!(embedded["name"], "Summer Sale");
    assert_eq!(embedded["id"], campaign.id.to_string());
    // select projected the rest away
    assert!(embedded.get("budget").is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn populate_nulls_dangling_references(pool: sqlx::PgPool) {
    let mut doc = product_doc("Desk Lamp", 45.0);
    doc["campaign"] = json!({"id": uuid::Uuid::new_v4().to_string()});
    let inserted = insert_one(&pool, Collection::PRODUCTS, &doc)
        .await
        .expect("insert_one failed");

    let mut docs = vec![find_by_id(&pool, Collection::PRODUCTS, inserted.id)
        .await
        .expect("find_by_id failed")
        .expect("row should exist")
        .into_document()];
    apply_populates(
        &pool,
        &mut docs,
        &[PopulateSpec {
            path: "campaign.id".to_string(),
            collection: "campaigns".to_string(),
            select: None,
        }],
    )
    .await
    .expect("apply_populates failed");

    assert_eq!(docs[0]["campaign"]["id"], Value::Null);
}

// ---------------------------------------------------------------------------
// Section 5: App logs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn app_log_roundtrip_filters_by_criteria(pool: sqlx::PgPool) {
    let request_id = "0195c3a7-5a62-7f10-a9ad-18d1c3f0a001";
    for (log_type, code) in [("request", None), ("response", Some(201))] {
        insert_app_log(
            &pool,
            &NewAppLog {
                log_id: request_id.to_string(),
                app_name: "souk-api".to_string(),
                level: "info".to_string(),
                log_type: log_type.to_string(),
                code,
                message: "POST /api/v3/products".to_string(),
                data: Some(json!({"method": "POST"})),
            },
        )
        .await
        .expect("insert_app_log failed");
    }
    insert_app_log(
        &pool,
        &NewAppLog {
            log_id: "another-request".to_string(),
            app_name: "souk-api".to_string(),
            level: "info".to_string(),
            log_type: "request".to_string(),
            code: None,
            message: "GET /api/v3/products".to_string(),
            data: None,
        },
    )
    .await
    .expect("insert_app_log failed");

    let by_log_id = query_app_logs(
        &pool,
        &AppLogCriteria {
            log_id: Some(request_id),
            ..AppLogCriteria::default()
        },
    )
    .await
    .expect("query_app_logs failed");
    assert_eq!(by_log_id.len(), 2);

    let responses = query_app_logs(
        &pool,
        &AppLogCriteria {
            log_type: Some("response"),
            code: Some(201),
            ..AppLogCriteria::default()
        },
    )
    .await
    .expect("query_app_logs failed");
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].log_id, request_id);
    assert_eq!(responses[0].code, Some(201));
}

//! List-query translation and pagination math.
//!
//! Raw query-string pairs are translated into a typed [`QuerySpec`] up front.
//! Operator tokens are only recognized in bracket form (`price[gt]=100`), so
//! a token appearing inside a value can never rewrite the filter.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 25;
/// Populate specs are positional and capped, matching the list endpoints.
pub const MAX_POPULATES: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("{0}")]
    Invalid(String),
}

/// A query-string value kept in both its raw text form and, when it parses
/// cleanly, its numeric form. Filter compilation picks whichever a
/// comparison needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    pub raw: String,
    pub numeric: Option<f64>,
}

impl Scalar {
    fn new(raw: &str) -> Self {
        let numeric = raw.trim().parse::<f64>().ok().filter(|n| n.is_finite());
        Scalar {
            raw: raw.to_string(),
            numeric,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Scalar),
    Gt(Scalar),
    Gte(Scalar),
    Lt(Scalar),
    Lte(Scalar),
    In(Vec<Scalar>),
    /// Always matched case-insensitively.
    Regex(String),
}

/// One filtered field: its dotted path split into segments, plus every
/// condition that must hold on it.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    pub path: Vec<String>,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub fields: Vec<FieldCondition>,
    /// Inclusive creation-time range. When set it has replaced the generic
    /// field filters; only campaign aliases and search survive alongside it.
    pub created_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

fn default_sort() -> Vec<SortKey> {
    vec![SortKey {
        field: "createdAt".to_string(),
        descending: true,
    }]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

/// A positional reference expansion: the document id found at `path` is
/// looked up in `collection` and the referenced document embedded in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateSpec {
    pub path: String,
    pub collection: String,
    pub select: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    /// Missing, zero, or unparseable values fall back to the defaults.
    fn parse(page: Option<&str>, limit: Option<&str>) -> Self {
        PageRequest {
            page: parse_positive(page, DEFAULT_PAGE),
            limit: parse_positive(limit, DEFAULT_LIMIT),
        }
    }

    #[must_use]
    pub fn skip(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// Build the pagination descriptors for a window over `total` matches.
    #[must_use]
    pub fn paginate(&self, total: u64) -> Pagination {
        let next = (u64::from(self.page) * u64::from(self.limit) < total).then(|| PageDescriptor {
            page: self.page + 1,
            limit: self.limit,
        });
        let prev = (self.skip() > 0).then(|| PageDescriptor {
            page: self.page - 1,
            limit: self.limit,
        });
        Pagination { total, next, prev }
    }
}

fn parse_positive(raw: Option<&str>, default: u32) -> u32 {
    raw.and_then(|r| r.trim().parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageDescriptor {
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<PageDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<PageDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub projection: Option<Projection>,
    pub populates: Vec<PopulateSpec>,
    pub page: PageRequest,
}

impl QuerySpec {
    /// Attach positional populate specs; at most [`MAX_POPULATES`] are kept.
    #[must_use]
    pub fn with_populates(mut self, populates: Vec<PopulateSpec>) -> Self {
        self.populates = populates;
        self.populates.truncate(MAX_POPULATES);
        self
    }
}

const META_KEYS: &[&str] = &["select", "sort", "page", "limit", "search"];

enum OpToken {
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Regex,
}

/// Translate raw query pairs into a [`QuerySpec`].
///
/// Steps, in order: strip meta keys; parse the remaining keys into typed
/// field conditions (`in` accumulates across repeated keys, a repeated plain
/// key overwrites); when both `startDate` and `endDate` are present, replace
/// the field filters with one inclusive creation-time range; merge the
/// `campaign_id` / `campaign_status` aliases and the search clause after the
/// replacement so they survive it; then sort, projection, and pagination.
///
/// # Errors
///
/// `QueryError::Invalid` for unparseable range dates or a `select` that
/// mixes included and excluded fields.
pub fn translate(params: &[(String, String)]) -> Result<QuerySpec, QueryError> {
    // Empty values on the special keys behave as absent.
    let lookup = |key: &str| {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    };

    let mut fields: Vec<FieldCondition> = Vec::new();
    for (key, value) in params {
        if META_KEYS.contains(&key.as_str()) || key == "campaign_id" || key == "campaign_status" {
            continue;
        }
        let (field, op) = split_operator(key);
        let entry = field_entry(&mut fields, field);
        match op {
            None => {
                entry.conditions.retain(|c| !matches!(c, Condition::Eq(_)));
                entry.conditions.push(Condition::Eq(Scalar::new(value)));
            }
            Some(OpToken::Gt) => entry.conditions.push(Condition::Gt(Scalar::new(value))),
            Some(OpToken::Gte) => entry.conditions.push(Condition::Gte(Scalar::new(value))),
            Some(OpToken::Lt) => entry.conditions.push(Condition::Lt(Scalar::new(value))),
            Some(OpToken::Lte) => entry.conditions.push(Condition::Lte(Scalar::new(value))),
            Some(OpToken::In) => {
                let accumulated = entry
                    .conditions
                    .iter_mut()
                    .find_map(|c| match c {
                        Condition::In(values) => Some(values),
                        _ => None,
                    });
                match accumulated {
                    Some(values) => values.push(Scalar::new(value)),
                    None => entry
                        .conditions
                        .push(Condition::In(vec![Scalar::new(value)])),
                }
            }
            Some(OpToken::Regex) => entry.conditions.push(Condition::Regex(value.clone())),
        }
    }

    let created_range = match (lookup("startDate"), lookup("endDate")) {
        (Some(start), Some(end)) => {
            // The range replaces whatever filters were built above, the
            // literal startDate/endDate keys included.
            fields.clear();
            Some((
                parse_timestamp(start, "startDate")?,
                parse_timestamp(end, "endDate")?,
            ))
        }
        // A lone bound is left behind as the literal field filter it became.
        _ => None,
    };

    if let Some(id) = lookup("campaign_id") {
        upsert_eq(&mut fields, "campaign.id", id);
    }
    if let Some(status) = lookup("campaign_status") {
        upsert_eq(&mut fields, "campaign.status", status);
    }

    let search = lookup("search").map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    });

    let sort = match lookup("sort") {
        Some(raw) => parse_sort(raw),
        None => default_sort(),
    };

    let projection = match lookup("select") {
        Some(raw) => parse_projection(raw)?,
        None => None,
    };

    let page = PageRequest::parse(lookup("page"), lookup("limit"));

    Ok(QuerySpec {
        filter: Filter {
            fields,
            created_range,
            search,
        },
        sort,
        projection,
        populates: Vec::new(),
        page,
    })
}

fn split_operator(key: &str) -> (&str, Option<OpToken>) {
    let Some(open) = key.find('[') else {
        return (key, None);
    };
    if !key.ends_with(']') || open == 0 {
        return (key, None);
    }
    let token = match &key[open + 1..key.len() - 1] {
        "gt" => OpToken::Gt,
        "gte" => OpToken::Gte,
        "lt" => OpToken::Lt,
        "lte" => OpToken::Lte,
        "in" => OpToken::In,
        "regex" => OpToken::Regex,
        // An unrecognized token leaves the whole key as a literal field name.
        _ => return (key, None),
    };
    (&key[..open], Some(token))
}

fn field_entry<'a>(fields: &'a mut Vec<FieldCondition>, field: &str) -> &'a mut FieldCondition {
    let segments: Vec<String> = field.split('.').map(str::to_string).collect();
    let index = match fields.iter().position(|f| f.path == segments) {
        Some(index) => index,
        None => {
            fields.push(FieldCondition {
                path: segments,
                conditions: Vec::new(),
            });
            fields.len() - 1
        }
    };
    &mut fields[index]
}

fn upsert_eq(fields: &mut Vec<FieldCondition>, path: &str, value: &str) {
    let entry = field_entry(fields, path);
    entry.conditions = vec![Condition::Eq(Scalar::new(value))];
}

fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>, QueryError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(DateTime::from_naive_utc_and_offset(midnight, Utc));
        }
    }
    Err(QueryError::Invalid(format!("{field} must be an ISO date")))
}

fn parse_sort(raw: &str) -> Vec<SortKey> {
    let keys: Vec<SortKey> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "-")
        .map(|s| match s.strip_prefix('-') {
            Some(field) => SortKey {
                field: field.to_string(),
                descending: true,
            },
            None => SortKey {
                field: s.to_string(),
                descending: false,
            },
        })
        .collect();
    if keys.is_empty() {
        default_sort()
    } else {
        keys
    }
}

fn parse_projection(raw: &str) -> Result<Option<Projection>, QueryError> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for part in raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "-")
    {
        match part.strip_prefix('-') {
            Some(field) => exclude.push(field.to_string()),
            None => include.push(part.to_string()),
        }
    }
    match (include.is_empty(), exclude.is_empty()) {
        (false, false) => Err(QueryError::Invalid(
            "select cannot mix included and excluded fields".to_string(),
        )),
        (false, true) => Ok(Some(Projection::Include(include))),
        (true, false) => Ok(Some(Projection::Exclude(exclude))),
        (true, true) => Ok(None),
    }
}

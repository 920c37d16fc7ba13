//! Product payload normalization.
//!
//! Incoming create payloads arrive as multipart text fields; update payloads
//! arrive as JSON bodies. Both are reduced here to validated, fully derived
//! forms before anything touches the store: pricing shape is decided by a
//! single discriminated parse (a product is either simple-priced or
//! variant-priced, never both), discount percentages and stock statuses are
//! computed rather than accepted, and identifiers are generated.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::ident;
use crate::pricing::{self, StockStatus};

/// Text fields collected from a multipart create request.
pub type CreateFields = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    Validation(String),
    #[error("{field} is not valid JSON")]
    MalformedPayload { field: &'static str },
}

impl CatalogError {
    fn validation(message: impl Into<String>) -> Self {
        CatalogError::Validation(message.into())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProductStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Disabled,
}

impl ProductStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::Pending => "pending",
            ProductStatus::Approved => "approved",
            ProductStatus::Rejected => "rejected",
            ProductStatus::Disabled => "disabled",
        }
    }

    fn parse(raw: &str) -> Result<Self, CatalogError> {
        match raw {
            "pending" => Ok(ProductStatus::Pending),
            "approved" => Ok(ProductStatus::Approved),
            "rejected" => Ok(ProductStatus::Rejected),
            "disabled" => Ok(ProductStatus::Disabled),
            _ => Err(CatalogError::validation(
                "status must be one of pending, approved, rejected, disabled",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Discount {
    pub price: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Discount {
    /// Parse the transport form of a discount object.
    ///
    /// Returns `Ok(None)` when the value is null, an empty object, or carries
    /// no price at all: such discounts are dropped, not rejected.
    pub fn from_value(value: &Value) -> Result<Option<Self>, CatalogError> {
        let map = match value {
            Value::Null => return Ok(None),
            Value::Object(map) => map,
            _ => return Err(CatalogError::validation("discount must be an object")),
        };
        if map.is_empty() {
            return Ok(None);
        }
        let price = match map.get("price") {
            None | Some(Value::Null) => return Ok(None),
            Some(raw) => coerce_number(raw)
                .ok_or_else(|| CatalogError::validation("Discount price must be a number"))?,
        };
        Self::with_dates(map, price).map(Some)
    }

    /// Like [`Discount::from_value`] but a missing price is an error instead
    /// of a drop. Update payloads use this: a price-less discount there is a
    /// client mistake, not an omission.
    fn from_value_strict(map: &Map<String, Value>) -> Result<Self, CatalogError> {
        let price = match map.get("price") {
            None | Some(Value::Null) => {
                return Err(CatalogError::validation("Discount price is required"));
            }
            Some(raw) => coerce_number(raw)
                .ok_or_else(|| CatalogError::validation("Discount price must be a number"))?,
        };
        Self::with_dates(map, price)
    }

    fn with_dates(map: &Map<String, Value>, price: f64) -> Result<Self, CatalogError> {
        let start_date = parse_date(map.get("start_date"), "start_date")?;
        let end_date = parse_date(map.get("end_date"), "end_date")?;
        if start_date.is_some() && end_date.is_none() {
            return Err(CatalogError::validation(
                "Discount end date is required if discount start date is provided",
            ));
        }
        Ok(Discount {
            price,
            start_date,
            end_date,
        })
    }

    /// Check this discount against the base price of its pricing unit and
    /// return the derived percentage.
    pub fn validate_against(&self, price: f64) -> Result<f64, CatalogError> {
        if self.price == 0.0 {
            return Err(CatalogError::validation(
                "Discount price cannot be equal to zero",
            ));
        }
        if self.price >= price {
            return Err(CatalogError::validation(
                "Discount price cannot be greater than price",
            ));
        }
        pricing::discount_percentage(price, self.price)
            .map_err(|e| CatalogError::validation(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizeVariation {
    pub size: String,
    pub variation_id: String,
    pub price: f64,
    pub quantity: u32,
    pub stock_status: StockStatus,
    pub discount: Option<Discount>,
    pub discount_percentage: Option<f64>,
}

impl SizeVariation {
    /// Parse one variation entry, generating its identifier and deriving its
    /// stock status and discount percentage.
    fn from_value(value: &Value) -> Result<Self, CatalogError> {
        let map = value.as_object().ok_or_else(|| {
            CatalogError::validation("size_variations entries must be objects")
        })?;
        let size = match map.get("size") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Err(CatalogError::validation("size is required")),
        };
        let price = map.get("price").and_then(coerce_number).filter(|p| *p != 0.0);
        let quantity = map
            .get("quantity")
            .and_then(coerce_number)
            .filter(|q| *q != 0.0);
        let (Some(price), Some(quantity)) = (price, quantity) else {
            return Err(CatalogError::validation(
                "Variations must have price and quantity",
            ));
        };
        let quantity = as_count(quantity)
            .ok_or_else(|| CatalogError::validation("quantity must be a whole number"))?;

        let (discount, discount_percentage) = match map.get("discount") {
            Some(raw) => match Discount::from_value(raw)? {
                Some(discount) => {
                    let percentage = discount.validate_against(price)?;
                    (Some(discount), Some(percentage))
                }
                None => (None, None),
            },
            None => (None, None),
        };

        Ok(SizeVariation {
            size,
            variation_id: ident::variation_id(),
            price,
            quantity,
            stock_status: pricing::stock_status(quantity),
            discount,
            discount_percentage,
        })
    }
}

/// The mutually exclusive pricing shape of a product.
#[derive(Debug, Clone, PartialEq)]
pub enum Pricing {
    Simple {
        price: f64,
        quantity: u32,
        stock_status: StockStatus,
        discount: Option<Discount>,
        discount_percentage: Option<f64>,
    },
    Variants { size_variations: Vec<SizeVariation> },
}

/// A fully normalized product ready for insertion, minus its images, which
/// are attached after the upload step succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub sku: String,
    pub slug: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub color: Option<String>,
    pub short_description: String,
    pub long_description: String,
    pub weight: f64,
    pub warranty: Option<String>,
    pub vendor: Option<String>,
    pub specification: Option<Vec<String>>,
    pub pricing: Pricing,
    pub images: Vec<String>,
    pub primary_image: Option<String>,
    pub status: ProductStatus,
    pub enabled: bool,
    pub is_top_deal: bool,
    pub is_bundle: bool,
    pub is_deleted: bool,
}

impl NewProduct {
    /// Attach uploaded image URLs; the first becomes the primary image.
    pub fn attach_images(&mut self, urls: Vec<String>) {
        self.primary_image = urls.first().cloned();
        self.images = urls;
    }

    /// The stored document form. Identity and timestamps are store-managed
    /// and do not appear here.
    #[must_use]
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("sku".to_string(), json!(self.sku));
        doc.insert("slug".to_string(), json!(self.slug));
        doc.insert("name".to_string(), json!(self.name));
        doc.insert("brand".to_string(), json!(self.brand));
        doc.insert("category".to_string(), json!(self.category));
        if let Some(color) = &self.color {
            doc.insert("color".to_string(), json!(color));
        }
        doc.insert(
            "short_description".to_string(),
            json!(self.short_description),
        );
        doc.insert("long_description".to_string(), json!(self.long_description));
        doc.insert("weight".to_string(), json!(self.weight));
        if let Some(warranty) = &self.warranty {
            doc.insert("warranty".to_string(), json!(warranty));
        }
        if let Some(vendor) = &self.vendor {
            doc.insert("vendor".to_string(), json!(vendor));
        }
        if let Some(specification) = &self.specification {
            doc.insert("specification".to_string(), json!(specification));
        }
        match &self.pricing {
            Pricing::Simple {
                price,
                quantity,
                stock_status,
                discount,
                discount_percentage,
            } => {
                doc.insert("price".to_string(), json!(price));
                doc.insert("quantity".to_string(), json!(quantity));
                doc.insert("stock_status".to_string(), json!(stock_status.as_str()));
                if let Some(discount) = discount {
                    doc.insert("discount".to_string(), discount_json(discount));
                }
                if let Some(percentage) = discount_percentage {
                    doc.insert("discount_percentage".to_string(), json!(percentage));
                }
            }
            Pricing::Variants { size_variations } => {
                doc.insert(
                    "size_variations".to_string(),
                    Value::Array(size_variations.iter().map(variation_json).collect()),
                );
            }
        }
        doc.insert("images".to_string(), json!(self.images));
        if let Some(primary) = &self.primary_image {
            doc.insert("primary_image".to_string(), json!(primary));
        }
        doc.insert("status".to_string(), json!(self.status.as_str()));
        doc.insert("enabled".to_string(), json!(self.enabled));
        doc.insert("is_top_deal".to_string(), json!(self.is_top_deal));
        doc.insert("is_bundle".to_string(), json!(self.is_bundle));
        doc.insert("is_deleted".to_string(), json!(self.is_deleted));
        doc.insert(
            "rating".to_string(),
            json!({"times": 0, "total": 0, "average": 0}),
        );
        Value::Object(doc)
    }
}

const CREATE_KEYS: &[&str] = &[
    "name",
    "brand",
    "category",
    "color",
    "short_description",
    "long_description",
    "weight",
    "warranty",
    "vendor",
    "specification",
    "price",
    "quantity",
    "discount",
    "size_variations",
    "sku",
    "status",
    "enabled",
    "is_top_deal",
    "is_bundle",
    "is_deleted",
    "stock_status",
    "discount_percentage",
    "image1",
    "image2",
    "image3",
    "image4",
    "image5",
];

/// Normalize a create payload into a [`NewProduct`].
///
/// The pricing shape is discriminated on the presence of `price`: present
/// means simple (quantity required, variations forbidden), absent means
/// variant (variations required, quantity and discount forbidden). `sku`,
/// `stock_status` and `discount_percentage` keys are accepted for client
/// compatibility but always regenerated or re-derived here.
///
/// # Errors
///
/// `CatalogError::Validation` for any schema or cross-field violation,
/// `CatalogError::MalformedPayload` when a JSON-encoded sub-field fails to
/// parse.
pub fn normalize_create(fields: &CreateFields) -> Result<NewProduct, CatalogError> {
    for key in fields.keys() {
        if !CREATE_KEYS.contains(&key.as_str()) {
            return Err(CatalogError::validation(format!(
                "Unknown/Unexpected parameter: '{key}'"
            )));
        }
    }

    let name = require_text(fields, "name")?;
    let brand = require_text(fields, "brand")?;
    let category = require_text(fields, "category")?;
    let short_description = length_capped(require_text(fields, "short_description")?, "short_description", 800)?;
    let long_description = length_capped(require_text(fields, "long_description")?, "long_description", 3000)?;
    let weight = require_number(fields, "weight")?;

    let color = optional_text(fields, "color");
    let warranty = optional_text(fields, "warranty");
    let vendor = optional_text(fields, "vendor");
    let specification = match optional_text(fields, "specification") {
        Some(raw) => Some(parse_specification_str(&raw)?),
        None => None,
    };

    let pricing = match optional_number(fields, "price")? {
        Some(price) => {
            if fields.contains_key("size_variations") {
                return Err(CatalogError::validation(
                    "Size variations is allowed only when the product price field is not set",
                ));
            }
            let quantity = match optional_number(fields, "quantity")? {
                Some(raw) => as_count(raw).ok_or_else(|| {
                    CatalogError::validation("quantity must be a whole number")
                })?,
                None => return Err(CatalogError::validation("quantity is required")),
            };
            if quantity < 1 {
                return Err(CatalogError::validation(
                    "quantity must be greater than or equal to 1",
                ));
            }

            let (discount, discount_percentage) = match optional_text(fields, "discount") {
                Some(raw) => {
                    let value: Value = serde_json::from_str(&raw)
                        .map_err(|_| CatalogError::MalformedPayload { field: "discount" })?;
                    match Discount::from_value(&value)? {
                        Some(discount) => {
                            let percentage = discount.validate_against(price)?;
                            (Some(discount), Some(percentage))
                        }
                        None => (None, None),
                    }
                }
                None => (None, None),
            };

            Pricing::Simple {
                price,
                quantity,
                stock_status: pricing::stock_status(quantity),
                discount,
                discount_percentage,
            }
        }
        None => {
            if fields.contains_key("quantity") {
                return Err(CatalogError::validation(
                    "Quantity is only allowed when the product has no variation and a price field is set",
                ));
            }
            if fields.contains_key("discount") {
                return Err(CatalogError::validation(
                    "discount is allowed only when there is a price set",
                ));
            }
            let raw = optional_text(fields, "size_variations")
                .ok_or_else(|| CatalogError::validation("size_variations is required"))?;
            let value: Value = serde_json::from_str(&raw).map_err(|_| {
                CatalogError::MalformedPayload {
                    field: "size_variations",
                }
            })?;
            let entries = value
                .as_array()
                .ok_or_else(|| CatalogError::validation("size_variations must be a list"))?;
            if entries.is_empty() {
                return Err(CatalogError::validation("size_variations is required"));
            }
            let size_variations = entries
                .iter()
                .map(SizeVariation::from_value)
                .collect::<Result<Vec<_>, _>>()?;
            Pricing::Variants { size_variations }
        }
    };

    let status = match optional_text(fields, "status") {
        Some(raw) => ProductStatus::parse(&raw)?,
        None => ProductStatus::default(),
    };
    let enabled = optional_bool(fields, "enabled")?.unwrap_or(false);
    let is_top_deal = optional_bool(fields, "is_top_deal")?.unwrap_or(false);
    let is_bundle = optional_bool(fields, "is_bundle")?.unwrap_or(false);
    let is_deleted = optional_bool(fields, "is_deleted")?.unwrap_or(false);

    Ok(NewProduct {
        sku: ident::sku(),
        slug: ident::product_slug(&name),
        name,
        brand,
        category,
        color,
        short_description,
        long_description,
        weight,
        warranty,
        vendor,
        specification,
        pricing,
        images: Vec::new(),
        primary_image: None,
        status,
        enabled,
        is_top_deal,
        is_bundle,
        is_deleted,
    })
}

/// How an update payload addresses the discount field.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscountPatch {
    /// Null and empty-object sentinels: unset the discount and its percentage.
    Remove,
    Set(Discount),
}

impl DiscountPatch {
    fn from_value(value: &Value) -> Result<Self, CatalogError> {
        match value {
            Value::Null => Ok(DiscountPatch::Remove),
            Value::String(s) if s == "{}" || s == "null" => Ok(DiscountPatch::Remove),
            Value::String(s) => {
                let inner: Value = serde_json::from_str(s)
                    .map_err(|_| CatalogError::MalformedPayload { field: "discount" })?;
                match inner {
                    Value::Null => Ok(DiscountPatch::Remove),
                    other => Self::from_object(&other),
                }
            }
            Value::Object(_) => Self::from_object(value),
            _ => Err(CatalogError::validation("discount must be an object")),
        }
    }

    fn from_object(value: &Value) -> Result<Self, CatalogError> {
        let map = value
            .as_object()
            .ok_or_else(|| CatalogError::validation("discount must be an object"))?;
        if map.is_empty() {
            return Ok(DiscountPatch::Remove);
        }
        let null_sentinel = |key: &str| matches!(map.get(key), Some(Value::String(s)) if s == "null");
        if null_sentinel("start_date") || null_sentinel("end_date") {
            return Ok(DiscountPatch::Remove);
        }
        Discount::from_value_strict(map).map(DiscountPatch::Set)
    }
}

/// A parsed partial-update payload. Every field is optional; absent means
/// "leave as stored".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateDraft {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub color: Option<String>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub weight: Option<f64>,
    pub warranty: Option<String>,
    pub vendor: Option<String>,
    pub specification: Option<Vec<String>>,
    pub price: Option<f64>,
    pub quantity: Option<u32>,
    pub discount: Option<DiscountPatch>,
    pub size_variations: Option<Vec<SizeVariation>>,
    pub images: Option<Vec<String>>,
    pub status: Option<ProductStatus>,
    pub enabled: Option<bool>,
    pub is_top_deal: Option<bool>,
    pub is_bundle: Option<bool>,
    pub is_deleted: Option<bool>,
}

impl UpdateDraft {
    /// Parse and type-check an update body. Cross-field checks against the
    /// stored product happen later in [`normalize_update`].
    ///
    /// # Errors
    ///
    /// `CatalogError::Validation` on type or schema violations, including
    /// unknown keys.
    pub fn from_value(body: &Value) -> Result<Self, CatalogError> {
        let map = body
            .as_object()
            .ok_or_else(|| CatalogError::validation("request body must be a JSON object"))?;

        let mut draft = UpdateDraft::default();
        for (key, value) in map {
            match key.as_str() {
                "name" => draft.name = Some(text_field(value, "name")?),
                "brand" => draft.brand = Some(text_field(value, "brand")?),
                "category" => draft.category = Some(text_field(value, "category")?),
                "color" => draft.color = Some(text_field(value, "color")?),
                "short_description" => {
                    draft.short_description = Some(length_capped(
                        text_field(value, "short_description")?,
                        "short_description",
                        800,
                    )?);
                }
                "long_description" => {
                    draft.long_description = Some(length_capped(
                        text_field(value, "long_description")?,
                        "long_description",
                        3000,
                    )?);
                }
                "weight" => draft.weight = Some(number_field(value, "weight")?),
                "warranty" => draft.warranty = Some(text_field(value, "warranty")?),
                "vendor" => draft.vendor = Some(text_field(value, "vendor")?),
                "specification" => draft.specification = Some(specification_field(value)?),
                "price" => draft.price = Some(number_field(value, "price")?),
                "quantity" => {
                    let quantity = count_field(value, "quantity")?;
                    if quantity < 1 {
                        return Err(CatalogError::validation(
                            "quantity must be greater than or equal to 1",
                        ));
                    }
                    draft.quantity = Some(quantity);
                }
                "discount" => draft.discount = Some(DiscountPatch::from_value(value)?),
                "size_variations" => {
                    let entries = value.as_array().ok_or_else(|| {
                        CatalogError::validation("size_variations must be a list")
                    })?;
                    if entries.is_empty() {
                        return Err(CatalogError::validation("size_variations is required"));
                    }
                    draft.size_variations = Some(
                        entries
                            .iter()
                            .map(SizeVariation::from_value)
                            .collect::<Result<Vec<_>, _>>()?,
                    );
                }
                "images" => draft.images = Some(images_field(value)?),
                "status" => {
                    let raw = text_field(value, "status")?;
                    draft.status = Some(ProductStatus::parse(&raw)?);
                }
                "enabled" => draft.enabled = Some(bool_field(value, "enabled")?),
                "is_top_deal" => draft.is_top_deal = Some(bool_field(value, "is_top_deal")?),
                "is_bundle" => draft.is_bundle = Some(bool_field(value, "is_bundle")?),
                "is_deleted" => draft.is_deleted = Some(bool_field(value, "is_deleted")?),
                // Accepted for client compatibility, never written: sku and
                // identity fields are create-time only.
                "sku" | "dimensions" | "image1" | "image2" | "image3" | "image4" | "image5" => {}
                other => {
                    return Err(CatalogError::validation(format!(
                        "Unknown/Unexpected parameter: '{other}'"
                    )));
                }
            }
        }
        Ok(draft)
    }
}

/// The persistence form of an update: keys to merge and keys to remove,
/// applied in one statement.
#[derive(Debug, Default, PartialEq)]
pub struct UpdatePlan {
    pub set: Map<String, Value>,
    pub unset: Vec<String>,
}

impl UpdatePlan {
    fn set(&mut self, key: &str, value: Value) {
        self.set.insert(key.to_string(), value);
    }
}

/// Normalize an update draft against the stored document.
///
/// Shape exclusivity is enforced against what is stored: a variant product
/// rejects price/discount/quantity, a simple product rejects variations.
/// Discounts are validated against the new price when one is supplied in the
/// same request, otherwise against the stored price. Variation identifiers
/// are regenerated whenever the variation list is replaced.
///
/// # Errors
///
/// `CatalogError::Validation` on any cross-field violation.
pub fn normalize_update(stored: &Value, draft: &UpdateDraft) -> Result<UpdatePlan, CatalogError> {
    let stored_price = stored.get("price").and_then(Value::as_f64);
    let stored_has_variations = stored
        .get("size_variations")
        .and_then(Value::as_array)
        .is_some_and(|entries| !entries.is_empty());

    let touches_simple =
        draft.price.is_some() || draft.quantity.is_some() || draft.discount.is_some();
    if stored_has_variations && touches_simple {
        return Err(CatalogError::validation(
            "Product has size_variations, [price, discount, quantity] can not be set",
        ));
    }
    if stored_price.is_some() && draft.size_variations.is_some() {
        return Err(CatalogError::validation(
            "Product does not have variations, size variations can not be set",
        ));
    }

    let mut plan = UpdatePlan::default();

    if let Some(value) = &draft.name {
        // The slug keeps its create-time value even when the name changes.
        plan.set("name", json!(value));
    }
    if let Some(value) = &draft.brand {
        plan.set("brand", json!(value));
    }
    if let Some(value) = &draft.category {
        plan.set("category", json!(value));
    }
    if let Some(value) = &draft.color {
        plan.set("color", json!(value));
    }
    if let Some(value) = &draft.short_description {
        plan.set("short_description", json!(value));
    }
    if let Some(value) = &draft.long_description {
        plan.set("long_description", json!(value));
    }
    if let Some(value) = draft.weight {
        plan.set("weight", json!(value));
    }
    if let Some(value) = &draft.warranty {
        plan.set("warranty", json!(value));
    }
    if let Some(value) = &draft.vendor {
        plan.set("vendor", json!(value));
    }
    if let Some(value) = &draft.specification {
        plan.set("specification", json!(value));
    }
    if let Some(value) = draft.price {
        plan.set("price", json!(value));
    }
    if let Some(quantity) = draft.quantity {
        plan.set("quantity", json!(quantity));
        plan.set(
            "stock_status",
            json!(pricing::stock_status(quantity).as_str()),
        );
    }
    match &draft.discount {
        Some(DiscountPatch::Remove) => {
            plan.unset.push("discount".to_string());
            plan.unset.push("discount_percentage".to_string());
        }
        Some(DiscountPatch::Set(discount)) => {
            let base = draft.price.or(stored_price).ok_or_else(|| {
                CatalogError::validation("discount is allowed only when there is a price set")
            })?;
            let percentage = discount.validate_against(base)?;
            plan.set("discount", discount_json(discount));
            plan.set("discount_percentage", json!(percentage));
        }
        None => {}
    }
    if let Some(variations) = &draft.size_variations {
        plan.set(
            "size_variations",
            Value::Array(variations.iter().map(variation_json).collect()),
        );
    }
    if let Some(urls) = &draft.images {
        plan.set("images", json!(urls));
    }
    if let Some(status) = draft.status {
        plan.set("status", json!(status.as_str()));
    }
    if let Some(value) = draft.enabled {
        plan.set("enabled", json!(value));
    }
    if let Some(value) = draft.is_top_deal {
        plan.set("is_top_deal", json!(value));
    }
    if let Some(value) = draft.is_bundle {
        plan.set("is_bundle", json!(value));
    }
    if let Some(value) = draft.is_deleted {
        plan.set("is_deleted", json!(value));
    }

    Ok(plan)
}

fn discount_json(discount: &Discount) -> Value {
    let mut map = Map::new();
    map.insert("price".to_string(), json!(discount.price));
    if let Some(date) = discount.start_date {
        map.insert("start_date".to_string(), json!(date.to_string()));
    }
    if let Some(date) = discount.end_date {
        map.insert("end_date".to_string(), json!(date.to_string()));
    }
    Value::Object(map)
}

fn variation_json(variation: &SizeVariation) -> Value {
    let mut map = Map::new();
    map.insert("size".to_string(), json!(variation.size));
    map.insert("variation_id".to_string(), json!(variation.variation_id));
    map.insert("price".to_string(), json!(variation.price));
    map.insert("quantity".to_string(), json!(variation.quantity));
    map.insert(
        "stock_status".to_string(),
        json!(variation.stock_status.as_str()),
    );
    if let Some(discount) = &variation.discount {
        map.insert("discount".to_string(), discount_json(discount));
    }
    if let Some(percentage) = variation.discount_percentage {
        map.insert("discount_percentage".to_string(), json!(percentage));
    }
    Value::Object(map)
}

// ---- field coercion helpers ----

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn as_count(n: f64) -> Option<u32> {
    if n.fract() == 0.0 && n >= 0.0 && n <= f64::from(u32::MAX) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = n as u32;
        Some(count)
    } else {
        None
    }
}

fn parse_date(value: Option<&Value>, field: &str) -> Result<Option<NaiveDate>, CatalogError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| CatalogError::validation(format!("{field} must be in YYYY-MM-DD format"))),
        Some(_) => Err(CatalogError::validation(format!(
            "{field} must be in YYYY-MM-DD format"
        ))),
    }
}

fn require_text(fields: &CreateFields, key: &str) -> Result<String, CatalogError> {
    optional_text(fields, key).ok_or_else(|| CatalogError::validation(format!("{key} is required")))
}

fn optional_text(fields: &CreateFields, key: &str) -> Option<String> {
    fields
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn require_number(fields: &CreateFields, key: &str) -> Result<f64, CatalogError> {
    optional_number(fields, key)?
        .ok_or_else(|| CatalogError::validation(format!("{key} is required")))
}

fn optional_number(fields: &CreateFields, key: &str) -> Result<Option<f64>, CatalogError> {
    match optional_text(fields, key) {
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or_else(|| CatalogError::validation(format!("{key} must be a number"))),
        None => Ok(None),
    }
}

fn optional_bool(fields: &CreateFields, key: &str) -> Result<Option<bool>, CatalogError> {
    match optional_text(fields, key) {
        Some(raw) => match raw.as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(CatalogError::validation(format!("{key} must be a boolean"))),
        },
        None => Ok(None),
    }
}

fn length_capped(value: String, field: &str, max: usize) -> Result<String, CatalogError> {
    if value.chars().count() > max {
        return Err(CatalogError::validation(format!(
            "{field} must be {max} characters or less"
        )));
    }
    Ok(value)
}

fn text_field(value: &Value, field: &str) -> Result<String, CatalogError> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Err(CatalogError::validation(format!(
                    "{field} is not allowed to be empty"
                )))
            } else {
                Ok(trimmed.to_string())
            }
        }
        _ => Err(CatalogError::validation(format!("{field} must be a string"))),
    }
}

fn number_field(value: &Value, field: &str) -> Result<f64, CatalogError> {
    coerce_number(value)
        .ok_or_else(|| CatalogError::validation(format!("{field} must be a number")))
}

fn count_field(value: &Value, field: &str) -> Result<u32, CatalogError> {
    let raw = number_field(value, field)?;
    as_count(raw).ok_or_else(|| CatalogError::validation(format!("{field} must be a whole number")))
}

fn bool_field(value: &Value, field: &str) -> Result<bool, CatalogError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s == "true" => Ok(true),
        Value::String(s) if s == "false" => Ok(false),
        _ => Err(CatalogError::validation(format!(
            "{field} must be a boolean"
        ))),
    }
}

fn specification_field(value: &Value) -> Result<Vec<String>, CatalogError> {
    match value {
        Value::String(raw) => parse_specification_str(raw),
        _ => specification_entries(value),
    }
}

fn parse_specification_str(raw: &str) -> Result<Vec<String>, CatalogError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| CatalogError::MalformedPayload {
        field: "specification",
    })?;
    specification_entries(&value)
}

fn specification_entries(value: &Value) -> Result<Vec<String>, CatalogError> {
    let entries = value
        .as_array()
        .ok_or_else(|| CatalogError::validation("specification must be a list of strings"))?;
    entries
        .iter()
        .map(|entry| {
            entry
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| CatalogError::validation("specification must be a list of strings"))
        })
        .collect()
}

fn images_field(value: &Value) -> Result<Vec<String>, CatalogError> {
    let entries = value
        .as_array()
        .ok_or_else(|| CatalogError::validation("images must be a list of https URLs"))?;
    if entries.len() > 5 {
        return Err(CatalogError::validation(
            "images can not have more than 5 entries",
        ));
    }
    entries
        .iter()
        .map(|entry| match entry {
            Value::String(url) if url.starts_with("https://") => Ok(url.clone()),
            _ => Err(CatalogError::validation("images must be https URLs")),
        })
        .collect()
}

use thiserror::Error;

pub mod app_config;
pub mod config;
pub mod ident;
pub mod pricing;
pub mod product;
pub mod query;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use pricing::{discount_percentage, stock_status, PricingError, StockStatus};
pub use product::{
    normalize_create, normalize_update, CatalogError, CreateFields, Discount, NewProduct,
    ProductStatus, SizeVariation, UpdateDraft, UpdatePlan,
};
pub use query::{
    translate, Condition, FieldCondition, Filter, PageDescriptor, PageRequest, Pagination,
    PopulateSpec, Projection, QueryError, QuerySpec, Scalar, SortKey,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

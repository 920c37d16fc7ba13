use rand::Rng;

const ALPHABET_POOL: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALPHANUMERIC_POOL: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

const SKU_SIZE: usize = 12;
const VARIATION_ID_SIZE: usize = 8;
const SLUG_SUFFIX_SIZE: usize = 8;
const UPLOAD_PREFIX_SIZE: usize = 16;

/// Catalog-wide stock keeping unit, assigned once at creation.
#[must_use]
pub fn sku() -> String {
    random_string(ALPHABET_POOL, SKU_SIZE)
}

/// Identifier for one size variation. Regenerated whenever the variation
/// list is replaced, so callers must not treat it as stable across updates.
#[must_use]
pub fn variation_id() -> String {
    random_string(ALPHANUMERIC_POOL, VARIATION_ID_SIZE)
}

/// Prefix staged upload files so concurrent requests never collide on name.
#[must_use]
pub fn upload_prefix() -> String {
    random_string(ALPHANUMERIC_POOL, UPLOAD_PREFIX_SIZE)
}

/// Generate a URL-safe slug from a product name.
#[must_use]
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else if c == ' ' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|&c| c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Slug stored on a product: the slugified name plus a random suffix so two
/// products may share a display name without colliding on the slug index.
/// Assigned once at creation and never regenerated, even if the name changes.
#[must_use]
pub fn product_slug(name: &str) -> String {
    let base = slugify(name);
    let suffix = random_string(ALPHANUMERIC_POOL, SLUG_SUFFIX_SIZE);
    if base.is_empty() {
        suffix
    } else {
        format!("{base}-{suffix}")
    }
}

fn random_string(pool: &str, len: usize) -> String {
    let bytes = pool.as_bytes();
    let mut rng = rand::rng();
    (0..len)
        .map(|_| bytes[rng.random_range(0..bytes.len())] as char)
        .collect()
}

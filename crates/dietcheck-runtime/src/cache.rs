//! Derived-flag cache.
//!
//! Flag derivation depends only on the product, so catalogs that are
//! re-scanned for many profiles can reuse it.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use dietcheck_core::{FlagDerivation, ProductSnapshot};
use moka::future::Cache;

/// Hash of the product fields flag derivation reads.
///
/// Output fields (`dietary_flags`, scores) are left out so an enriched
/// copy hits the same entry as the raw product.
pub fn fingerprint(product: &ProductSnapshot) -> u64 {
    let mut hasher = DefaultHasher::new();
    product.ingredients_text.hash(&mut hasher);
    product.ingredient_tags.hash(&mut hasher);
    product.allergen_tags.hash(&mut hasher);
    product.label_tags.hash(&mut hasher);
    product.category_tags.hash(&mut hasher);
    product.ingredients_analysis_tags.hash(&mut hasher);
    product.trace_tags.hash(&mut hasher);
    hasher.finish()
}

/// Derived flags keyed by product fingerprint.
#[derive(Clone)]
pub struct FlagCache {
    cache: Cache<u64, FlagDerivation>,
}

impl FlagCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, product: &ProductSnapshot) -> Option<FlagDerivation> {
        self.cache.get(&fingerprint(product)).await
    }

    pub async fn insert(&self, product: &ProductSnapshot, flags: FlagDerivation) {
        self.cache.insert(fingerprint(product), flags).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate; pending maintenance may lag behind recent inserts.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for FlagCache {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(3600))
    }
}

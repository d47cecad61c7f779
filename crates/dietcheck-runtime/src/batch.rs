//! Catalog-wide evaluation.
//!
//! Products are evaluated on Tokio's blocking pool with bounded
//! concurrency. Results come back in catalog order. The clock is read once
//! per batch so every product sees the same instant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;

use dietcheck_core::{
    ComplianceEngine, ComplianceResult, EngineConfig, FlagDerivation, ProductSnapshot,
    UserDietaryProfile,
};

use crate::cache::FlagCache;
use crate::config::RuntimeConfig;
use crate::RuntimeError;

/// Cooperative cancellation, checked between products.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened to one product.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome<T> {
    Done { code: String, value: T },
    Failed { code: String, error: String },
    Cancelled { code: String },
}

impl<T> BatchOutcome<T> {
    pub fn code(&self) -> &str {
        match self {
            BatchOutcome::Done { code, .. }
            | BatchOutcome::Failed { code, .. }
            | BatchOutcome::Cancelled { code } => code,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            BatchOutcome::Done { value, .. } => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub cache_hits: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<T> {
    pub evaluated_at: DateTime<Utc>,
    pub outcomes: Vec<BatchOutcome<T>>,
    pub stats: BatchStats,
}

/// Runs one engine over many products.
pub struct BatchEvaluator {
    engine: Arc<ComplianceEngine>,
    config: RuntimeConfig,
    cache: FlagCache,
}

impl BatchEvaluator {
    pub fn new(engine: Arc<ComplianceEngine>, config: RuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        let cache = FlagCache::new(config.cache_capacity, config.cache_ttl);
        Ok(Self {
            engine,
            config,
            cache,
        })
    }

    /// An evaluator over the default engine configuration.
    pub fn with_defaults(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let engine = ComplianceEngine::new(EngineConfig::default())?;
        Self::new(Arc::new(engine), config)
    }

    pub fn cache(&self) -> &FlagCache {
        &self.cache
    }

    /// Evaluate every product against one profile.
    pub async fn evaluate_catalog(
        &self,
        products: Vec<ProductSnapshot>,
        profile: UserDietaryProfile,
        cancel: &CancellationFlag,
    ) -> BatchReport<ComplianceResult> {
        let now = Utc::now();
        self.evaluate_catalog_at(products, profile, now, cancel).await
    }

    pub async fn evaluate_catalog_at(
        &self,
        products: Vec<ProductSnapshot>,
        profile: UserDietaryProfile,
        now: DateTime<Utc>,
        cancel: &CancellationFlag,
    ) -> BatchReport<ComplianceResult> {
        let profile = Arc::new(profile);
        let stats = Arc::new(Mutex::new(BatchStats::default()));
        let total = products.len();

        tracing::debug!(products = total, concurrency = self.config.concurrency, "Evaluating catalog");

        let outcomes: Vec<BatchOutcome<ComplianceResult>> = stream::iter(products)
            .map(|product| {
                let engine = self.engine.clone();
                let profile = profile.clone();
                let stats = stats.clone();
                let cancel = cancel.clone();
                async move {
                    let code = product.code.clone();
                    if cancel.is_cancelled() {
                        stats.lock().cancelled += 1;
                        return BatchOutcome::Cancelled { code };
                    }

                    let joined = tokio::task::spawn_blocking(move || {
                        engine.evaluate_at(&product, &profile, now)
                    })
                    .await;

                    match joined {
                        Ok(Ok(result)) => {
                            stats.lock().completed += 1;
                            BatchOutcome::Done {
                                code,
                                value: result,
                            }
                        }
                        Ok(Err(e)) => {
                            tracing::warn!(code = %code, error = %e, "Product evaluation failed");
                            stats.lock().failed += 1;
                            BatchOutcome::Failed {
                                code,
                                error: e.to_string(),
                            }
                        }
                        Err(e) => {
                            tracing::warn!(code = %code, error = %e, "Evaluation task failed");
                            stats.lock().failed += 1;
                            BatchOutcome::Failed {
                                code,
                                error: e.to_string(),
                            }
                        }
                    }
                }
            })
            .buffered(self.config.concurrency)
            .collect()
            .await;

        let stats = stats.lock().clone();
        if stats.cancelled > 0 {
            tracing::warn!(cancelled = stats.cancelled, total, "Catalog evaluation cancelled");
        }

        BatchReport {
            evaluated_at: now,
            outcomes,
            stats,
        }
    }

    /// Derive flags for every product, reusing cached derivations.
    pub async fn derive_catalog(
        &self,
        products: Vec<ProductSnapshot>,
        cancel: &CancellationFlag,
    ) -> BatchReport<FlagDerivation> {
        let now = Utc::now();
        let stats = Arc::new(Mutex::new(BatchStats::default()));

        let outcomes: Vec<BatchOutcome<FlagDerivation>> = stream::iter(products)
            .map(|product| {
                let engine = self.engine.clone();
                let cache = self.cache.clone();
                let stats = stats.clone();
                let cancel = cancel.clone();
                async move {
                    let code = product.code.clone();
                    if cancel.is_cancelled() {
                        stats.lock().cancelled += 1;
                        return BatchOutcome::Cancelled { code };
                    }

                    if let Some(flags) = cache.get(&product).await {
                        let mut stats = stats.lock();
                        stats.cache_hits += 1;
                        stats.completed += 1;
                        return BatchOutcome::Done { code, value: flags };
                    }

                    let joined = tokio::task::spawn_blocking(move || {
                        let flags = engine.derive_flags(&product);
                        (product, flags)
                    })
                    .await;

                    match joined {
                        Ok((product, flags)) => {
                            cache.insert(&product, flags.clone()).await;
                            stats.lock().completed += 1;
                            BatchOutcome::Done { code, value: flags }
                        }
                        Err(e) => {
                            tracing::warn!(code = %code, error = %e, "Derivation task failed");
                            stats.lock().failed += 1;
                            BatchOutcome::Failed {
                                code,
                                error: e.to_string(),
                            }
                        }
                    }
                }
            })
            .buffered(self.config.concurrency)
            .collect()
            .await;

        let stats = stats.lock().clone();
        BatchReport {
            evaluated_at: now,
            outcomes,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use dietcheck_core::{AlertLevel, DietaryFlag, Severity, TriState};

    use super::*;

    fn evaluator() -> BatchEvaluator {
        BatchEvaluator::with_defaults(RuntimeConfig::default().with_concurrency(2)).unwrap()
    }

    fn catalog() -> Vec<ProductSnapshot> {
        vec![
            ProductSnapshot::new("a").with_allergen_tags(&["en:milk"]),
            ProductSnapshot::new("b").with_ingredients_text("Rice, water"),
            ProductSnapshot::new("c").with_ingredients_text("Peanuts"),
        ]
    }

    #[tokio::test]
    async fn test_results_keep_catalog_order() {
        let profile = UserDietaryProfile::new().with_allergy("milk", Severity::High);
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        let report = evaluator()
            .evaluate_catalog_at(catalog(), profile, now, &CancellationFlag::new())
            .await;

        let codes: Vec<&str> = report.outcomes.iter().map(|o| o.code()).collect();
        assert_eq!(codes, vec!["a", "b", "c"]);
        assert_eq!(report.stats.completed, 3);
        assert_eq!(report.evaluated_at, now);

        let first = report.outcomes[0].value().unwrap();
        assert_eq!(first.alert_level, AlertLevel::Violation);
        let second = report.outcomes[1].value().unwrap();
        assert!(second.safe);
    }

    #[tokio::test]
    async fn test_invalid_product_fails_alone() {
        let mut products = catalog();
        products.insert(1, ProductSnapshot::new(""));

        let report = evaluator()
            .evaluate_catalog(products, UserDietaryProfile::new(), &CancellationFlag::new())
            .await;

        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.stats.completed, 3);
        assert!(matches!(report.outcomes[1], BatchOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let report = evaluator()
            .evaluate_catalog(catalog(), UserDietaryProfile::new(), &cancel)
            .await;

        assert_eq!(report.stats.cancelled, 3);
        assert!(report
            .outcomes
            .iter()
            .all(|o| matches!(o, BatchOutcome::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_derive_catalog_uses_cache() {
        let evaluator = evaluator();
        let products = vec![
            ProductSnapshot::new("x").with_label_tags(&["en:halal"]),
            ProductSnapshot::new("y").with_label_tags(&["en:kosher"]),
        ];

        let first = evaluator
            .derive_catalog(products.clone(), &CancellationFlag::new())
            .await;
        assert_eq!(first.stats.cache_hits, 0);
        assert_eq!(
            first.outcomes[0].value().unwrap().value(DietaryFlag::Halal),
            TriState::Yes
        );

        let second = evaluator
            .derive_catalog(products, &CancellationFlag::new())
            .await;
        assert_eq!(second.stats.cache_hits, 2);
        assert_eq!(second.stats.completed, 2);
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let result = BatchEvaluator::with_defaults(RuntimeConfig::default().with_concurrency(0));
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }
}

//! Single entry point for calibration: resolve role, run the required evaluators,
//! aggregate, cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use verity_config::{CalibrationSet, ConfigHash, EntrySource};
use verity_types::{
    CalibrationSubject, CostSample, LayerComponents, LayerId, LayerScore, MetaComponents,
    MethodRegistry, MethodRole, Score,
};

use crate::CalibrationError;
use crate::aggregator::{ChoquetAggregator, InteractionContribution, LinearContribution};
use crate::inputs::LayerInputs;
use crate::layers::meta::CostTier;
use crate::layers::{self, LayerContext};

/// How to treat a method with no registry entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    /// Fail with [`CalibrationError::MissingCalibration`] unless a flagged default exists.
    #[default]
    Strict,
    /// Fall back to the caller's `role_hint`; the base layer is then scored as missing.
    Lenient,
}

/// How the subject's role and base scores were found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ResultSource {
    Registered,
    FlaggedDefault { default_id: String },
    /// Lenient mode, unregistered method, role taken from the caller.
    RoleHint,
}

impl From<EntrySource> for ResultSource {
    fn from(source: EntrySource) -> Self {
        match source {
            EntrySource::Registered => ResultSource::Registered,
            EntrySource::FlaggedDefault { default_id } => ResultSource::FlaggedDefault { default_id },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationResult {
    pub subject: CalibrationSubject,
    pub role: MethodRole,
    pub source: ResultSource,
    pub layer_scores: BTreeMap<LayerId, LayerScore>,
    pub missing_layers: Vec<LayerId>,
    pub linear: Vec<LinearContribution>,
    pub interactions: Vec<InteractionContribution>,
    pub final_score: Score,
    pub config_hash: ConfigHash,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    method_id: String,
    context_key: String,
    config_hash: ConfigHash,
}

pub struct CalibrationOrchestrator {
    set: Arc<CalibrationSet>,
    methods: Arc<dyn MethodRegistry>,
    mode: CalibrationMode,
    aggregator: ChoquetAggregator,
    cache: RwLock<HashMap<CacheKey, Arc<CalibrationResult>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CalibrationOrchestrator {
    #[must_use]
    pub fn new(
        set: Arc<CalibrationSet>,
        methods: Arc<dyn MethodRegistry>,
        mode: CalibrationMode,
    ) -> Self {
        Self {
            set,
            methods,
            mode,
            aggregator: ChoquetAggregator,
            cache: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Uses the set's own `methods.toml` catalog as the method registry.
    #[must_use]
    pub fn with_catalog(set: Arc<CalibrationSet>, mode: CalibrationMode) -> Self {
        let methods: Arc<dyn MethodRegistry> = Arc::new(set.catalog().clone());
        Self::new(set, methods, mode)
    }

    #[must_use]
    pub fn set(&self) -> &CalibrationSet {
        &self.set
    }

    #[must_use]
    pub const fn mode(&self) -> CalibrationMode {
        self.mode
    }

    pub fn calibrate(
        &self,
        subject: &CalibrationSubject,
        inputs: &LayerInputs,
    ) -> Result<Arc<CalibrationResult>, CalibrationError> {
        let key = self.cache_key(subject, inputs);
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(method_id = subject.method_id(), "Calibration cache hit");
            return Ok(with_runtime(hit, inputs));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let result = Arc::new(self.compute(subject, inputs)?);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&result));
        Ok(result)
    }

    fn compute(
        &self,
        subject: &CalibrationSubject,
        inputs: &LayerInputs,
    ) -> Result<CalibrationResult, CalibrationError> {
        let method_id = subject.method_id();
        let entry = self.set.registry().resolve(method_id);

        let (role, source) = match (entry, self.mode, inputs.role_hint) {
            (Some(resolved), _, _) => {
                if let EntrySource::FlaggedDefault { default_id } = resolved.source() {
                    tracing::info!(method_id, default_id = %default_id, "Calibrating from flagged default entry");
                }
                (resolved.entry().role, ResultSource::from(resolved.source()))
            }
            (None, CalibrationMode::Lenient, Some(role)) => {
                tracing::warn!(method_id, role = %role, "Uncalibrated method, using caller role hint");
                (role, ResultSource::RoleHint)
            }
            (None, _, _) => {
                return Err(CalibrationError::MissingCalibration {
                    method_id: method_id.to_string(),
                });
            }
        };

        let config = self
            .set
            .role(role)
            .ok_or_else(|| CalibrationError::MissingRoleConfig {
                method_id: method_id.to_string(),
                role,
            })?;

        let ctx = LayerContext {
            subject,
            inputs,
            set: &self.set,
            entry,
            signature: self.methods.signature(method_id),
        };

        let mut layer_scores = BTreeMap::new();
        for &layer in config.required_layers() {
            let scored = layers::evaluate(layer, &ctx).map_err(|source| {
                CalibrationError::LayerScore {
                    method_id: method_id.to_string(),
                    source,
                }
            })?;
            if let Some(score) = scored {
                layer_scores.insert(layer, score);
            }
        }

        let aggregation = self
            .aggregator
            .aggregate(config, &layer_scores)
            .map_err(|source| CalibrationError::Bounds {
                method_id: method_id.to_string(),
                source,
            })?;

        tracing::debug!(
            method_id,
            role = %role,
            final_score = aggregation.final_score.get(),
            missing = aggregation.missing_layers.len(),
            "Calibrated method"
        );

        Ok(CalibrationResult {
            subject: subject.clone(),
            role,
            source,
            layer_scores,
            missing_layers: aggregation.missing_layers,
            linear: aggregation.linear,
            interactions: aggregation.interactions,
            final_score: aggregation.final_score,
            config_hash: self.set.hash().clone(),
        })
    }

    fn cache_key(&self, subject: &CalibrationSubject, inputs: &LayerInputs) -> CacheKey {
        let position = subject.position();
        // A measured runtime enters the key only through its cost tier.
        let mut keyed = inputs.clone();
        let tier = keyed.governance.as_mut().map(|governance| {
            let tier = CostTier::of(&self.set.meta().cost, governance.runtime);
            governance.runtime = CostSample::Unmeasured;
            tier
        });
        CacheKey {
            method_id: subject.method_id().to_string(),
            context_key: format!(
                "{}|pos={}/{}|cost={:?}|in={}",
                subject.context().key(),
                position.index(),
                position.size(),
                tier,
                keyed.fingerprint()
            ),
            config_hash: self.set.hash().clone(),
        }
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self
                .cache
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }

    /// Drops every cached result. Returns how many were removed.
    pub fn clear_cache(&self) -> usize {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let removed = cache.len();
        cache.clear();
        removed
    }
}

/// A cached result from the same cost tier, carrying this call's runtime sample.
fn with_runtime(cached: &Arc<CalibrationResult>, inputs: &LayerInputs) -> Arc<CalibrationResult> {
    let (Some(governance), Some(meta)) = (
        inputs.governance.as_ref(),
        cached.layer_scores.get(&LayerId::Meta),
    ) else {
        return Arc::clone(cached);
    };
    let LayerComponents::Meta(components) = meta.components() else {
        return Arc::clone(cached);
    };
    if components.runtime == governance.runtime {
        return Arc::clone(cached);
    }
    let components = LayerComponents::Meta(MetaComponents {
        runtime: governance.runtime,
        ..components.clone()
    });
    match LayerScore::new(meta.value(), components) {
        Ok(score) => {
            let mut result = CalibrationResult::clone(cached);
            result.layer_scores.insert(LayerId::Meta, score);
            Arc::new(result)
        }
        Err(_) => Arc::clone(cached),
    }
}

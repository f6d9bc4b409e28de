//! Graduated degradation applied to admitted executions under pressure.

use serde::{Deserialize, Serialize};

use crate::pressure::PressureLevel;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegradationConfig {
    /// Multiplier for entity / chunk / result bounds. 1.0 means no reduction.
    pub entity_limit_factor: f64,
    pub disable_expensive_computations: bool,
    pub use_simplified_methods: bool,
    pub skip_optional_analysis: bool,
    pub reduce_embedding_dims: bool,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self::NONE
    }
}

impl DegradationConfig {
    pub const NONE: DegradationConfig = DegradationConfig {
        entity_limit_factor: 1.0,
        disable_expensive_computations: false,
        use_simplified_methods: false,
        skip_optional_analysis: false,
        reduce_embedding_dims: false,
    };

    /// The ladder: each level keeps everything the level below enabled.
    #[must_use]
    pub const fn for_pressure(level: PressureLevel) -> Self {
        match level {
            PressureLevel::Normal => Self::NONE,
            PressureLevel::Elevated => DegradationConfig {
                entity_limit_factor: 0.8,
                reduce_embedding_dims: true,
                ..Self::NONE
            },
            PressureLevel::High => DegradationConfig {
                entity_limit_factor: 0.8,
                reduce_embedding_dims: true,
                skip_optional_analysis: true,
                ..Self::NONE
            },
            PressureLevel::Critical => DegradationConfig {
                entity_limit_factor: 0.5,
                disable_expensive_computations: true,
                use_simplified_methods: true,
                skip_optional_analysis: true,
                reduce_embedding_dims: true,
            },
            PressureLevel::Emergency => DegradationConfig {
                entity_limit_factor: 0.3,
                disable_expensive_computations: true,
                use_simplified_methods: true,
                skip_optional_analysis: true,
                reduce_embedding_dims: true,
            },
        }
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        *self != Self::NONE
    }

    /// Scales a size bound by the entity factor, never below 1.
    #[must_use]
    pub fn scale_limit(&self, limit: usize) -> usize {
        ((limit as f64 * self.entity_limit_factor).floor() as usize).max(1)
    }
}

//! Layer identifiers and the validated per-layer score record.
//!
//! Each of the eight layers has its own component struct. A [`LayerScore`] is built
//! once from those components and never mutated afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Score, ScoreError};

/// One of the eight canonical evaluation layers.
///
/// Ordering follows declaration order and is what every breakdown is sorted by,
/// so aggregation always sums terms in the same sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LayerId {
    #[serde(rename = "@b")]
    Base,
    #[serde(rename = "@u")]
    Unit,
    #[serde(rename = "@q")]
    Question,
    #[serde(rename = "@d")]
    Dimension,
    #[serde(rename = "@p")]
    Policy,
    #[serde(rename = "@C")]
    Congruence,
    #[serde(rename = "@chain")]
    Chain,
    #[serde(rename = "@m")]
    Meta,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown layer '{0}'")]
pub struct UnknownLayerError(pub String);

impl LayerId {
    pub const ALL: [LayerId; 8] = [
        LayerId::Base,
        LayerId::Unit,
        LayerId::Question,
        LayerId::Dimension,
        LayerId::Policy,
        LayerId::Congruence,
        LayerId::Chain,
        LayerId::Meta,
    ];

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            LayerId::Base => "@b",
            LayerId::Unit => "@u",
            LayerId::Question => "@q",
            LayerId::Dimension => "@d",
            LayerId::Policy => "@p",
            LayerId::Congruence => "@C",
            LayerId::Chain => "@chain",
            LayerId::Meta => "@m",
        }
    }

    /// The three layers scored from the compatibility table.
    #[must_use]
    pub const fn is_contextual(self) -> bool {
        matches!(
            self,
            LayerId::Question | LayerId::Dimension | LayerId::Policy
        )
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for LayerId {
    type Err = UnknownLayerError;

    /// Accepts the symbol with or without the leading `@`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bare = trimmed.strip_prefix('@').unwrap_or(trimmed);
        LayerId::ALL
            .into_iter()
            .find(|layer| &layer.symbol()[1..] == bare)
            .ok_or_else(|| UnknownLayerError(s.to_string()))
    }
}

// ============================================================================
// Components
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseComponents {
    pub theory: Score,
    pub implementation: Score,
    pub deployment: Score,
    /// Set when the scores came from the flagged default registry entry.
    pub from_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitComponents {
    pub coverage: Score,
    pub structural_completeness: Score,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualComponents {
    /// Question, dimension or policy-area id the method was looked up against.
    pub target: String,
    pub compatibility: Score,
    /// False when the table had no entry and the undeclared default applied.
    pub declared: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CongruenceComponents {
    pub scale: Score,
    pub semantic: Score,
    pub fusion: Score,
    pub ensemble_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainComponents {
    pub required_declared: usize,
    pub required_supplied: usize,
    pub optional_declared: usize,
    pub optional_supplied: usize,
    pub missing_required: Vec<String>,
}

/// Runtime observation feeding the cost sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CostSample {
    Measured { seconds: f64 },
    /// No timing was taken. Scored by an explicit configured policy, not as zero.
    Unmeasured,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaComponents {
    pub transparency: Score,
    pub governance: Score,
    pub cost: Score,
    pub runtime: CostSample,
}

/// Named sub-components for exactly one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerComponents {
    Base(BaseComponents),
    Unit(UnitComponents),
    Question(ContextualComponents),
    Dimension(ContextualComponents),
    Policy(ContextualComponents),
    Congruence(CongruenceComponents),
    Chain(ChainComponents),
    Meta(MetaComponents),
}

impl LayerComponents {
    #[must_use]
    pub const fn layer(&self) -> LayerId {
        match self {
            LayerComponents::Base(_) => LayerId::Base,
            LayerComponents::Unit(_) => LayerId::Unit,
            LayerComponents::Question(_) => LayerId::Question,
            LayerComponents::Dimension(_) => LayerId::Dimension,
            LayerComponents::Policy(_) => LayerId::Policy,
            LayerComponents::Congruence(_) => LayerId::Congruence,
            LayerComponents::Chain(_) => LayerId::Chain,
            LayerComponents::Meta(_) => LayerId::Meta,
        }
    }
}

// ============================================================================
// LayerScore
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
#[error("layer {layer} produced invalid score: {source}")]
pub struct LayerScoreError {
    pub layer: LayerId,
    #[source]
    pub source: ScoreError,
}

/// A single layer's score with its sub-components.
///
/// Fields are private: the score is validated once in [`LayerScore::new`] and
/// the layer id always matches the component variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerScore {
    layer: LayerId,
    score: Score,
    components: LayerComponents,
}

impl LayerScore {
    pub fn new(value: f64, components: LayerComponents) -> Result<Self, LayerScoreError> {
        let layer = components.layer();
        let score = Score::new(value).map_err(|source| LayerScoreError { layer, source })?;
        Ok(Self {
            layer,
            score,
            components,
        })
    }

    #[must_use]
    pub const fn layer(&self) -> LayerId {
        self.layer
    }

    #[must_use]
    pub const fn score(&self) -> Score {
        self.score
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.score.get()
    }

    #[must_use]
    pub const fn components(&self) -> &LayerComponents {
        &self.components
    }
}

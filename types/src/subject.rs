//! What is being calibrated, and where.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::LayerId;

/// The question / dimension / policy-area / document-type slot a method runs in.
///
/// Every field is optional; a contextual layer whose slot is empty cannot be scored
/// and is reported as missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalibrationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
}

impl CalibrationContext {
    #[must_use]
    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: impl Into<String>) -> Self {
        self.dimension = Some(dimension.into());
        self
    }

    #[must_use]
    pub fn with_policy_area(mut self, policy_area: impl Into<String>) -> Self {
        self.policy_area = Some(policy_area.into());
        self
    }

    #[must_use]
    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    /// Slot id consulted by a contextual layer. `None` for non-contextual layers.
    #[must_use]
    pub fn target(&self, layer: LayerId) -> Option<&str> {
        match layer {
            LayerId::Question => self.question.as_deref(),
            LayerId::Dimension => self.dimension.as_deref(),
            LayerId::Policy => self.policy_area.as_deref(),
            _ => None,
        }
    }

    /// Stable textual key, e.g. `q=Q001|d=D3|p=PA01|doc=-`.
    #[must_use]
    pub fn key(&self) -> String {
        fn slot(value: Option<&String>) -> &str {
            value.map_or("-", String::as_str)
        }
        format!(
            "q={}|d={}|p={}|doc={}",
            slot(self.question.as_ref()),
            slot(self.dimension.as_ref()),
            slot(self.policy_area.as_ref()),
            slot(self.doc_type.as_ref()),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("ensemble size must be at least 1")]
    EmptyEnsemble,
    #[error("ensemble index {index} out of bounds for size {size}")]
    OutOfBounds { index: usize, size: usize },
}

/// Where a method sits in the ensemble it is fused with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnsemblePosition {
    index: usize,
    size: usize,
}

impl EnsemblePosition {
    pub fn new(index: usize, size: usize) -> Result<Self, PositionError> {
        if size == 0 {
            return Err(PositionError::EmptyEnsemble);
        }
        if index >= size {
            return Err(PositionError::OutOfBounds { index, size });
        }
        Ok(Self { index, size })
    }

    /// A method running on its own.
    #[must_use]
    pub const fn solo() -> Self {
        Self { index: 0, size: 1 }
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn size(self) -> usize {
        self.size
    }

    #[must_use]
    pub const fn is_solo(self) -> bool {
        self.size == 1
    }
}

/// Immutable identity of one calibration request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CalibrationSubject {
    method_id: String,
    context: CalibrationContext,
    position: EnsemblePosition,
}

impl CalibrationSubject {
    #[must_use]
    pub fn new(
        method_id: impl Into<String>,
        context: CalibrationContext,
        position: EnsemblePosition,
    ) -> Self {
        Self {
            method_id: method_id.into(),
            context,
            position,
        }
    }

    #[must_use]
    pub fn method_id(&self) -> &str {
        &self.method_id
    }

    #[must_use]
    pub const fn context(&self) -> &CalibrationContext {
        &self.context
    }

    #[must_use]
    pub const fn position(&self) -> EnsemblePosition {
        self.position
    }
}

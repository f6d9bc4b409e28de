use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::LayerId;

/// Functional role of a method in the pipeline. Decides which layers are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodRole {
    Ingest,
    Structure,
    Extract,
    ScoreQuestion,
    Aggregate,
    Report,
    MetaTool,
    Transform,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown method role '{0}'")]
pub struct UnknownRoleError(pub String);

const INGEST_LAYERS: &[LayerId] = &[LayerId::Base, LayerId::Chain, LayerId::Unit, LayerId::Meta];
const AGGREGATE_LAYERS: &[LayerId] = &[
    LayerId::Base,
    LayerId::Chain,
    LayerId::Dimension,
    LayerId::Policy,
    LayerId::Congruence,
    LayerId::Meta,
];
const REPORT_LAYERS: &[LayerId] = &[
    LayerId::Base,
    LayerId::Chain,
    LayerId::Congruence,
    LayerId::Meta,
];
const SCORE_QUESTION_LAYERS: &[LayerId] = &LayerId::ALL;
const TOOL_LAYERS: &[LayerId] = &[LayerId::Base, LayerId::Chain, LayerId::Meta];

impl MethodRole {
    pub const ALL: [MethodRole; 8] = [
        MethodRole::Ingest,
        MethodRole::Structure,
        MethodRole::Extract,
        MethodRole::ScoreQuestion,
        MethodRole::Aggregate,
        MethodRole::Report,
        MethodRole::MetaTool,
        MethodRole::Transform,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MethodRole::Ingest => "ingest",
            MethodRole::Structure => "structure",
            MethodRole::Extract => "extract",
            MethodRole::ScoreQuestion => "score_question",
            MethodRole::Aggregate => "aggregate",
            MethodRole::Report => "report",
            MethodRole::MetaTool => "meta_tool",
            MethodRole::Transform => "transform",
        }
    }

    /// Layers a role can never drop. Role configs may add to this set, not shrink it.
    #[must_use]
    pub const fn canonical_layers(self) -> &'static [LayerId] {
        match self {
            MethodRole::Ingest | MethodRole::Structure | MethodRole::Extract => INGEST_LAYERS,
            MethodRole::ScoreQuestion => SCORE_QUESTION_LAYERS,
            MethodRole::Aggregate => AGGREGATE_LAYERS,
            MethodRole::Report => REPORT_LAYERS,
            MethodRole::MetaTool | MethodRole::Transform => TOOL_LAYERS,
        }
    }
}

impl fmt::Display for MethodRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MethodRole {
    type Err = UnknownRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MethodRole::ALL
            .into_iter()
            .find(|role| role.as_str() == s.trim())
            .ok_or_else(|| UnknownRoleError(s.to_string()))
    }
}

//! File-backed method registry (`methods.toml`).
//!
//! ```toml
//! [methods."score.coherence"]
//! required = "{text, structure}"
//! optional = "{tables}"
//! fusion = "weighted_mean"
//! fusion_requires = "{scores, weights}"
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use verity_types::{FusionRequirement, InputParameter, MethodRegistry, MethodSignature};

use crate::descriptor::Descriptor;
use crate::violation::{Violation, Violations};

pub(crate) const FILE: &str = "methods.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CatalogFile {
    #[serde(default)]
    methods: BTreeMap<String, RawSignature>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSignature {
    #[serde(default)]
    required: Option<String>,
    #[serde(default)]
    optional: Option<String>,
    #[serde(default)]
    fusion: Option<String>,
    #[serde(default)]
    fusion_requires: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodCatalog {
    signatures: BTreeMap<String, MethodSignature>,
}

impl MethodCatalog {
    pub fn insert(&mut self, signature: MethodSignature) {
        self.signatures
            .insert(signature.method_id.clone(), signature);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

impl MethodRegistry for MethodCatalog {
    fn signature(&self, method_id: &str) -> Option<&MethodSignature> {
        self.signatures.get(method_id)
    }
}

pub(crate) fn build_catalog(file: CatalogFile, violations: &mut Violations) -> MethodCatalog {
    let mut catalog = MethodCatalog::default();
    for (method_id, raw) in file.methods {
        let mut set = |field: &str, text: Option<&str>| match text {
            None => Some(Default::default()),
            Some(text) => match Descriptor::parse_set(text) {
                Ok(set) => Some(set.members),
                Err(error) => {
                    violations.push(Violation::Descriptor {
                        file: FILE,
                        key: format!("{method_id}.{field}"),
                        error,
                    });
                    None
                }
            },
        };
        let required = set("required", raw.required.as_deref());
        let optional = set("optional", raw.optional.as_deref());
        let fusion_requires = set("fusion_requires", raw.fusion_requires.as_deref());
        let (Some(required), Some(optional), Some(fusion_requires)) =
            (required, optional, fusion_requires)
        else {
            continue;
        };

        for input in required.intersection(&optional) {
            violations.push(Violation::OverlappingInputs {
                method_id: method_id.clone(),
                input: input.clone(),
            });
        }

        let fusion = match raw.fusion {
            Some(strategy) => Some(FusionRequirement {
                strategy,
                requires: fusion_requires,
            }),
            None if !fusion_requires.is_empty() => {
                violations.push(Violation::FusionWithoutStrategy {
                    method_id: method_id.clone(),
                });
                None
            }
            None => None,
        };

        let parameters = required
            .into_iter()
            .map(|name| InputParameter {
                name,
                required: true,
            })
            .chain(optional.into_iter().map(|name| InputParameter {
                name,
                required: false,
            }))
            .collect();
        catalog.insert(MethodSignature {
            method_id,
            parameters,
            fusion,
        });
    }
    catalog
}

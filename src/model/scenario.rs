//! Scenario files: parsing, validation, and the tagged operation payload.
//!
//! A scenario file wraps one `testDefinition`. The operation is picked from
//! which payload is present:
//!
//! | payload                          | operation          |
//! |----------------------------------|--------------------|
//! | none                             | create-and-verify  |
//! | `searchRequest`                  | search             |
//! | `duplicateRule` + `searchRequest`| duplicate search   |

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{IshError, Result};
use crate::model::duplicate_rule::DuplicateRule;
use crate::model::record::Record;

// ──────────────────── file format ────────────────────

/// Top-level JSON document of a scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDocument {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(rename = "testDefinition", default)]
    pub test_definition: Option<TestDefinition>,
}

/// The scenario body as authored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<Record>,
    #[serde(default)]
    pub expected: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_request: Option<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_rule: Option<DuplicateRule>,
}

// ──────────────────── validated model ────────────────────

/// Operation discriminant, for logs and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateAndVerify,
    Search,
    Duplicate,
}

impl OperationKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CreateAndVerify => "create_and_verify",
            Self::Search => "search",
            Self::Duplicate => "duplicate",
        }
    }
}

/// The single operation a scenario drives against the system under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Create the inputs and compare what the SUT accepted.
    ///
    /// The compared records are the accepted inputs themselves, not records
    /// read back from the SUT, so only rejections can fail the verdict. A SUT
    /// that stores altered content still passes.
    CreateAndVerify,
    /// Search with the query record's attributes.
    Search { query: Record },
    /// Register `rule`, then look for duplicates of `candidate`.
    Duplicate {
        rule: DuplicateRule,
        candidate: Record,
    },
}

impl Operation {
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::CreateAndVerify => OperationKind::CreateAndVerify,
            Self::Search { .. } => OperationKind::Search,
            Self::Duplicate { .. } => OperationKind::Duplicate,
        }
    }
}

/// A validated scenario, ready to run.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub description: String,
    pub schema: Option<String>,
    pub inputs: Vec<Record>,
    /// Expected output names, authored order, duplicates removed.
    pub expected_names: Vec<String>,
    pub operation: Operation,
    /// File the scenario was loaded from, when any.
    pub source: Option<PathBuf>,
}

impl Scenario {
    /// Read and validate one scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| IshError::io(path, source))?;
        Self::from_json(&raw, path)
    }

    /// Parse and validate scenario JSON; `origin` names the source in errors.
    pub fn from_json(raw: &str, origin: &Path) -> Result<Self> {
        let document: ScenarioDocument = serde_json::from_str(raw)
            .map_err(|e| IshError::malformed(origin, format!("invalid JSON: {e}")))?;
        let mut scenario = Self::from_document(document, origin)?;
        scenario.source = Some(origin.to_path_buf());
        Ok(scenario)
    }

    /// Validate a parsed document.
    pub fn from_document(document: ScenarioDocument, origin: &Path) -> Result<Self> {
        let Some(definition) = document.test_definition else {
            return Err(IshError::malformed(
                origin,
                "JSON is empty or has no testDefinition",
            ));
        };

        if definition.name.trim().is_empty() {
            return Err(IshError::malformed(origin, "testDefinition.name is empty"));
        }

        let mut seen = HashSet::new();
        for input in &definition.inputs {
            if input.name.trim().is_empty() {
                return Err(IshError::malformed(origin, "an input has no name"));
            }
            if !seen.insert(input.name.as_str()) {
                return Err(IshError::malformed(
                    origin,
                    format!("input name {:?} is declared twice", input.name),
                ));
            }
        }

        let mut expected_names: Vec<String> = Vec::with_capacity(definition.expected.len());
        for name in definition.expected {
            if !expected_names.contains(&name) {
                expected_names.push(name);
            }
        }

        let operation = match (definition.duplicate_rule, definition.search_request) {
            (None, None) => Operation::CreateAndVerify,
            (None, Some(query)) => Operation::Search { query },
            (Some(rule), Some(candidate)) => Operation::Duplicate { rule, candidate },
            (Some(rule), None) => {
                return Err(IshError::malformed(
                    origin,
                    format!("duplicateRule {:?} has no searchRequest", rule.code),
                ));
            }
        };

        Ok(Self {
            name: definition.name,
            description: definition.description,
            schema: document.schema,
            inputs: definition.inputs,
            expected_names,
            operation,
            source: None,
        })
    }
}

//! Duplicate-detection rules declared by duplicate scenarios.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::model::attribute::Treatment;

/// Detection limit sent with every registered rule: no limit.
pub const UNLIMITED_DETECTION: i32 = -1;

/// Attribute group with a shared matching treatment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeTreatment {
    #[serde(default)]
    pub attribute_keys: Vec<String>,
    #[serde(rename = "type")]
    pub treatment: Treatment,
}

/// A duplicate rule as authored in a scenario and registered with the SUT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateRule {
    pub name: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub checked_attributes: Vec<String>,
    #[serde(default)]
    pub nb_filled_attributes: u32,
    #[serde(default)]
    pub nb_equal_attributes: u32,
    #[serde(default)]
    pub nb_missing_attributes: u32,
    #[serde(default, alias = "attributeTreatments")]
    pub list_attribute_treatments: Vec<AttributeTreatment>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub daemon: bool,
    #[serde(default = "unlimited")]
    pub detection_limit: i32,
}

fn unlimited() -> i32 {
    UNLIMITED_DETECTION
}

impl DuplicateRule {
    /// Copy ready for registration: description mirrors the name and the
    /// detection limit is lifted.
    #[must_use]
    pub fn for_registration(&self) -> Self {
        Self {
            description: Some(self.name.clone()),
            detection_limit: UNLIMITED_DETECTION,
            ..self.clone()
        }
    }

    /// Treatment the rule applies to `key` (strict when not listed).
    #[must_use]
    pub fn treatment_for(&self, key: &str) -> Treatment {
        self.list_attribute_treatments
            .iter()
            .find(|t| t.attribute_keys.iter().any(|k| k == key))
            .map_or(Treatment::Strict, |t| t.treatment)
    }
}

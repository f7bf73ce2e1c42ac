//! System-under-test client abstraction.
//!
//! The harness drives the identity service through [`SutClient`] and wipes its
//! state between scenarios through [`StatePurger`]. Both traits are object-safe
//! so the harness context can hold them behind `Arc<dyn _>`.

#![allow(missing_docs)]

#[cfg(feature = "http")]
pub mod http;
pub mod memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::errors::Result;
use crate::model::attribute::Treatment;
use crate::model::duplicate_rule::DuplicateRule;
use crate::model::record::Record;

// ──────────────────── response status ────────────────────

/// Business outcome class reported by the identity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    Success,
    IncompleteSuccess,
    Ok,
    NotFound,
    Conflict,
    BadRequest,
    Unauthorized,
    Failure,
}

impl StatusKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::IncompleteSuccess => "INCOMPLETE_SUCCESS",
            Self::Ok => "OK",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Failure => "FAILURE",
        }
    }

    #[must_use]
    pub const fn default_http_code(self) -> u16 {
        match self {
            Self::Success | Self::Ok => 200,
            Self::IncompleteSuccess => 201,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Failure => 500,
        }
    }
}

/// Status block attached to every SUT response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseStatus {
    #[serde(rename = "type")]
    pub kind: StatusKind,
    #[serde(default)]
    pub http_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResponseStatus {
    #[must_use]
    pub const fn new(kind: StatusKind) -> Self {
        Self {
            kind,
            http_code: kind.default_http_code(),
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(kind)
        }
    }

    /// A create that the service accepted.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.kind, StatusKind::Success | StatusKind::IncompleteSuccess)
    }

    /// A query or registration that completed normally.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(
            self.kind,
            StatusKind::Ok | StatusKind::Success | StatusKind::IncompleteSuccess
        )
    }
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.http_code, self.kind.as_str())?;
        if let Some(message) = &self.message {
            write!(f, " - {message}")?;
        }
        Ok(())
    }
}

// ──────────────────── requests & responses ────────────────────

/// Identity of the application issuing create calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestingApp {
    pub client_code: String,
    pub author_name: String,
    pub author_type: String,
}

/// Result of `create_record`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
}

/// One search criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchAttribute {
    pub key: String,
    pub value: String,
    pub treatment: Treatment,
}

impl SearchAttribute {
    /// Criteria for every attribute of `query`.
    ///
    /// With `honor_explicit`, a scenario's per-attribute `searchType` wins over
    /// the key default.
    #[must_use]
    pub fn from_query(query: &Record, honor_explicit: bool) -> Vec<Self> {
        query
            .attributes
            .iter()
            .map(|a| Self {
                key: a.key.clone(),
                value: a.value.clone(),
                treatment: a.search_treatment(honor_explicit),
            })
            .collect()
    }
}

/// Result of `search_records`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub records: Vec<Record>,
}

/// Result of `find_duplicates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateSearchResponse {
    pub status: ResponseStatus,
    /// Matches per rule code.
    #[serde(default)]
    pub duplicates: BTreeMap<String, Vec<Record>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl DuplicateSearchResponse {
    /// Matches for the requested codes, concatenated in request order.
    #[must_use]
    pub fn records_for(&self, rule_codes: &[String]) -> Vec<Record> {
        rule_codes
            .iter()
            .filter_map(|code| self.duplicates.get(code))
            .flatten()
            .cloned()
            .collect()
    }
}

// ──────────────────── traits ────────────────────

/// The identity service operations the harness drives.
///
/// Methods return `Err` only for transport-level failures. Business outcomes,
/// including rejections, come back as a [`ResponseStatus`].
pub trait SutClient: Send + Sync {
    /// Short backend label for logs.
    fn backend_name(&self) -> &'static str;

    fn create_record(&self, record: &Record, app: &RequestingApp) -> Result<CreateResponse>;

    fn search_records(&self, criteria: &[SearchAttribute]) -> Result<SearchResponse>;

    fn register_duplicate_rule(&self, rule: &DuplicateRule) -> Result<ResponseStatus>;

    fn find_duplicates(
        &self,
        candidate: &Record,
        rule_codes: &[String],
    ) -> Result<DuplicateSearchResponse>;
}

/// Wipes the service state a scenario created.
pub trait StatePurger: Send + Sync {
    /// Truncate every stored identity.
    fn truncate_store(&self) -> Result<()>;

    /// Drop and recreate the search index.
    fn reset_index(&self) -> Result<()>;

    /// Remove stored search rules. Backends without them do nothing.
    fn clear_search_rules(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attribute::Attribute;

    #[test]
    fn status_classes() {
        assert!(ResponseStatus::new(StatusKind::Success).is_success());
        assert!(ResponseStatus::new(StatusKind::IncompleteSuccess).is_success());
        assert!(!ResponseStatus::new(StatusKind::Ok).is_success());
        assert!(ResponseStatus::new(StatusKind::Ok).is_ok());
        assert!(!ResponseStatus::new(StatusKind::NotFound).is_ok());
    }

    #[test]
    fn status_display_includes_message() {
        let status = ResponseStatus::with_message(StatusKind::Conflict, "already exists");
        assert_eq!(status.to_string(), "409 - CONFLICT - already exists");
    }

    #[test]
    fn status_parses_wire_shape() {
        let status: ResponseStatus =
            serde_json::from_str(r#"{"type":"NOT_FOUND","httpCode":404,"message":"none"}"#)
                .unwrap();
        assert_eq!(status.kind, StatusKind::NotFound);
        assert_eq!(status.http_code, 404);
    }

    #[test]
    fn search_criteria_follow_treatment_policy() {
        let query = Record::default()
            .with_attribute(Attribute::new("first_name", "Jean").with_search_type(Treatment::Strict))
            .with("birthdate", "01/01/1970");

        let defaults = SearchAttribute::from_query(&query, false);
        assert_eq!(defaults[0].treatment, Treatment::Approximated);
        assert_eq!(defaults[1].treatment, Treatment::Strict);

        let honored = SearchAttribute::from_query(&query, true);
        assert_eq!(honored[0].treatment, Treatment::Strict);
    }

    #[test]
    fn duplicate_records_follow_request_order() {
        let mut duplicates = BTreeMap::new();
        duplicates.insert("B".to_string(), vec![Record::default().with("k", "b")]);
        duplicates.insert("A".to_string(), vec![Record::default().with("k", "a")]);
        let response = DuplicateSearchResponse {
            status: ResponseStatus::new(StatusKind::Ok),
            duplicates,
            metadata: BTreeMap::new(),
        };
        let records = response.records_for(&["B".to_string(), "A".to_string(), "C".to_string()]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].attributes[0].value, "b");
    }
}

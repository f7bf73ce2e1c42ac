//! Identity attributes and the two equality notions the comparator relies on.
//!
//! An attribute is a key/value pair plus certification metadata. Full equality
//! covers every certification field (with a missing level read as 0). The
//! looser *resolution* equality drops the certifier and the certification date;
//! it is only used to recover which scenario input a returned record came from.

#![allow(missing_docs)]

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Keys searched approximately unless the scenario says otherwise.
pub const APPROXIMATE_BY_DEFAULT: [&str; 3] = ["first_name", "family_name", "preferred_username"];

/// How the system under test should match one attribute.
///
/// Search requests only use `Strict` (exact) and `Approximated`; `Different`
/// appears in duplicate-rule treatments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Treatment {
    #[serde(alias = "exact", alias = "EXACT")]
    Strict,
    #[serde(alias = "approximate", alias = "APPROXIMATE")]
    Approximated,
    Different,
}

impl Treatment {
    /// Treatment applied when a scenario does not pin one explicitly.
    #[must_use]
    pub fn default_for_key(key: &str) -> Self {
        if APPROXIMATE_BY_DEFAULT.contains(&key) {
            Self::Approximated
        } else {
            Self::Strict
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "STRICT",
            Self::Approximated => "APPROXIMATED",
            Self::Different => "DIFFERENT",
        }
    }
}

/// One attribute of a test identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub attr_type: Option<String>,
    /// Scenario-only search treatment; never compared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_type: Option<Treatment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification_level: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certifier: Option<String>,
    #[serde(
        default,
        with = "certification_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub certification_date: Option<DateTime<Utc>>,
}

impl Attribute {
    /// Plain key/value attribute with no certification metadata.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_type(mut self, attr_type: impl Into<String>) -> Self {
        self.attr_type = Some(attr_type.into());
        self
    }

    #[must_use]
    pub fn with_search_type(mut self, treatment: Treatment) -> Self {
        self.search_type = Some(treatment);
        self
    }

    #[must_use]
    pub fn certified(
        mut self,
        certifier: impl Into<String>,
        level: i32,
        date: Option<DateTime<Utc>>,
    ) -> Self {
        self.certifier = Some(certifier.into());
        self.certification_level = Some(level);
        self.certification_date = date;
        self
    }

    /// Certification level with a missing value read as 0.
    #[must_use]
    pub fn level(&self) -> i32 {
        self.certification_level.unwrap_or(0)
    }

    /// Equality used for name resolution: certifier and date are ignored.
    #[must_use]
    pub fn resolution_eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.value == other.value
            && self.attr_type == other.attr_type
            && self.level() == other.level()
    }

    /// Total order used for canonicalization.
    ///
    /// Key first, then the resolution fields, then certifier and date, so that
    /// resolution-equal attributes end up adjacent and the order never depends
    /// on how the attributes were listed.
    #[must_use]
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.value.cmp(&other.value))
            .then_with(|| self.attr_type.cmp(&other.attr_type))
            .then_with(|| self.level().cmp(&other.level()))
            .then_with(|| self.certifier.cmp(&other.certifier))
            .then_with(|| self.certification_date.cmp(&other.certification_date))
    }

    /// Treatment for a search query built from this attribute.
    #[must_use]
    pub fn search_treatment(&self, honor_explicit: bool) -> Treatment {
        match self.search_type {
            Some(explicit) if honor_explicit => explicit,
            _ => Treatment::default_for_key(&self.key),
        }
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.resolution_eq(other)
            && self.certifier == other.certifier
            && self.certification_date == other.certification_date
    }
}

impl Eq for Attribute {}

/// Certification dates travel as epoch milliseconds; RFC 3339 strings are
/// accepted on input.
mod certification_date {
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDate {
        Millis(i64),
        Text(String),
    }

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => serializer.serialize_i64(date.timestamp_millis()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<RawDate>::deserialize(deserializer)? {
            None => Ok(None),
            Some(RawDate::Millis(ms)) => DateTime::from_timestamp_millis(ms)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("certification date out of range: {ms}"))),
            Some(RawDate::Text(text)) => DateTime::parse_from_rfc3339(&text)
                .map(|date| Some(date.with_timezone(&Utc)))
                .map_err(|e| D::Error::custom(format!("bad certification date {text:?}: {e}"))),
        }
    }
}

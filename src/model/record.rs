//! Test identities: a scenario-local name plus a bag of attributes.
//!
//! Record equality is content equality: the attribute collections are compared
//! after canonicalization, and `name`, `connection_id` and `customer_id` are
//! ignored since they only correlate a record with a scenario or with the
//! system under test.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::model::attribute::Attribute;

/// One test identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Scenario-local label; never sent to the system under test.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    /// Assigned by the system under test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl Record {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder shorthand for a plain key/value attribute.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute::new(key, value));
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Sort attributes into canonical order. Idempotent.
    pub fn canonicalize(&mut self) {
        self.attributes.sort_by(Attribute::canonical_cmp);
    }

    #[must_use]
    pub fn canonicalized(&self) -> Self {
        let mut copy = self.clone();
        copy.canonicalize();
        copy
    }

    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.attributes
            .windows(2)
            .all(|pair| pair[0].canonical_cmp(&pair[1]).is_le())
    }

    /// Content match under the looser resolution equality.
    #[must_use]
    pub fn resolves_to(&self, input: &Self) -> bool {
        if self.attributes.len() != input.attributes.len() {
            return false;
        }
        self.sorted_refs()
            .iter()
            .zip(input.sorted_refs())
            .all(|(a, b)| a.resolution_eq(b))
    }

    /// Copy as it travels to the SUT: no scenario name, and no per-attribute
    /// search treatment.
    #[must_use]
    pub fn for_wire(&self) -> Self {
        let mut wire = Self {
            name: String::new(),
            ..self.clone()
        };
        for attribute in &mut wire.attributes {
            attribute.search_type = None;
        }
        wire
    }

    fn sorted_refs(&self) -> Vec<&Attribute> {
        let mut refs: Vec<&Attribute> = self.attributes.iter().collect();
        refs.sort_by(|a, b| a.canonical_cmp(b));
        refs
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.attributes.len() == other.attributes.len() && self.sorted_refs() == other.sorted_refs()
    }
}

impl Eq for Record {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attribute::Treatment;

    fn alice() -> Record {
        Record::named("Alice")
            .with("first_name", "Alice")
            .with("family_name", "Dupont")
    }

    #[test]
    fn equality_ignores_attribute_order_and_correlation_fields() {
        let mut reordered = Record::named("somebody")
            .with("family_name", "Dupont")
            .with("first_name", "Alice");
        reordered.customer_id = Some("cuid-1".to_string());
        reordered.connection_id = Some("conn-1".to_string());
        assert_eq!(alice(), reordered);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let mut r = Record::default()
            .with("z", "1")
            .with("a", "2")
            .with("m", "3");
        assert!(!r.is_canonical());
        r.canonicalize();
        assert!(r.is_canonical());
        let once = r.clone();
        r.canonicalize();
        assert_eq!(
            once.attributes.iter().map(|a| &a.key).collect::<Vec<_>>(),
            r.attributes.iter().map(|a| &a.key).collect::<Vec<_>>()
        );
    }

    #[test]
    fn different_values_are_not_equal() {
        let bob = Record::named("Alice")
            .with("first_name", "Bob")
            .with("family_name", "Dupont");
        assert_ne!(alice(), bob);
    }

    #[test]
    fn subset_is_not_equal() {
        let partial = Record::default().with("first_name", "Alice");
        assert_ne!(alice(), partial);
        assert!(!partial.resolves_to(&alice()));
    }

    #[test]
    fn resolution_ignores_certifier() {
        let certified = Record::default()
            .with_attribute(Attribute::new("first_name", "Alice").certified("fc", 0, None))
            .with("family_name", "Dupont");
        assert!(certified.resolves_to(&alice()));
        assert_ne!(certified, alice());
    }

    #[test]
    fn duplicate_keys_compare_as_multiset() {
        let a = Record::default().with("email", "x").with("email", "y");
        let b = Record::default().with("email", "y").with("email", "x");
        let c = Record::default().with("email", "x").with("email", "x");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn wire_copy_drops_name_and_search_type() {
        let mut r = alice().with_attribute(
            Attribute::new("email", "alice@example.org").with_search_type(Treatment::Approximated),
        );
        r.connection_id = Some("c".to_string());
        let wire = r.for_wire();
        assert!(wire.name.is_empty());
        assert_eq!(wire.connection_id.as_deref(), Some("c"));
        assert!(wire.attributes.iter().all(|a| a.search_type.is_none()));
        assert_eq!(wire, r);
        let json = serde_json::to_string(&wire).unwrap();
        assert!(!json.contains("searchType"), "{json}");
    }
}

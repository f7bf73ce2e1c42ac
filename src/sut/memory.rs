//! In-memory reference implementation of the identity service.
//!
//! Deterministic apart from the generated customer ids, so suites can run
//! offline and the harness can test itself. Matching rules:
//!
//! - **create**: rejects records without attributes (`FAILURE`) and records whose
//!   connection id is already stored (`CONFLICT`).
//! - **search**: every criterion must match one attribute with the same key.
//!   `STRICT` is exact, `APPROXIMATED` is trimmed and case-insensitive,
//!   `DIFFERENT` requires a different value.
//! - **duplicates**: per rule, the candidate needs `nbFilledAttributes` filled
//!   checked attributes; a stored record matches with at least
//!   `nbEqualAttributes` equal and at most `nbMissingAttributes` missing checked
//!   attributes. The candidate itself is never returned.

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashSet};

use parking_lot::Mutex;
use rand::Rng;

use crate::core::errors::{IshError, Result};
use crate::model::attribute::Treatment;
use crate::model::duplicate_rule::DuplicateRule;
use crate::model::record::Record;
use crate::sut::{
    CreateResponse, DuplicateSearchResponse, RequestingApp, ResponseStatus, SearchAttribute,
    SearchResponse, StatePurger, StatusKind, SutClient,
};

/// Operation names accepted by [`MemorySut::fail_operation`].
pub const OPERATIONS: [&str; 6] = [
    "create",
    "search",
    "register_rule",
    "find_duplicates",
    "truncate",
    "reset_index",
];

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<Record>,
    indexed: bool,
    rules: BTreeMap<String, DuplicateRule>,
    search_rules_cleared: u32,
    truncations: u32,
    index_resets: u32,
    failing: HashSet<&'static str>,
    refused_rules: HashSet<String>,
}

/// Counters exposed for assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    pub stored: usize,
    pub rules: usize,
    pub truncations: u32,
    pub index_resets: u32,
    pub search_rules_cleared: u32,
}

/// Thread-safe in-memory SUT; also its own [`StatePurger`].
#[derive(Debug, Default)]
pub struct MemorySut {
    state: Mutex<MemoryState>,
}

impl MemorySut {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                indexed: true,
                ..MemoryState::default()
            }),
        }
    }

    /// Make every later call of `operation` fail with a transport error.
    ///
    /// Unknown names are ignored.
    pub fn fail_operation(&self, operation: &str) {
        if let Some(known) = OPERATIONS.iter().find(|op| **op == operation) {
            self.state.lock().failing.insert(known);
        }
    }

    /// Refuse registration of the rule with this code.
    pub fn refuse_rule(&self, code: impl Into<String>) {
        self.state.lock().refused_rules.insert(code.into());
    }

    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        let state = self.state.lock();
        MemoryStats {
            stored: state.records.len(),
            rules: state.rules.len(),
            truncations: state.truncations,
            index_resets: state.index_resets,
            search_rules_cleared: state.search_rules_cleared,
        }
    }

    /// Snapshot of stored records.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.state.lock().records.clone()
    }

    fn check(state: &MemoryState, operation: &'static str) -> Result<()> {
        if state.failing.contains(operation) {
            return Err(IshError::transport(
                operation,
                "injected failure in memory backend",
            ));
        }
        Ok(())
    }
}

fn new_customer_id() -> String {
    let mut rng = rand::rng();
    format!("{:016x}{:08x}", rng.random::<u64>(), rng.random::<u32>())
}

fn values_match(treatment: Treatment, stored: &str, wanted: &str) -> bool {
    match treatment {
        Treatment::Strict => stored == wanted,
        Treatment::Approximated => stored.trim().to_lowercase() == wanted.trim().to_lowercase(),
        Treatment::Different => stored != wanted,
    }
}

fn value_of<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record
        .attributes
        .iter()
        .find(|a| a.key == key && !a.value.trim().is_empty())
        .map(|a| a.value.as_str())
}

fn matches_criteria(record: &Record, criteria: &[SearchAttribute]) -> bool {
    criteria.iter().all(|c| {
        record
            .attributes
            .iter()
            .any(|a| a.key == c.key && values_match(c.treatment, &a.value, &c.value))
    })
}

fn is_duplicate(rule: &DuplicateRule, candidate: &Record, stored: &Record) -> bool {
    let mut equal = 0_u32;
    let mut missing = 0_u32;
    for key in &rule.checked_attributes {
        match (value_of(candidate, key), value_of(stored, key)) {
            (Some(wanted), Some(found)) => {
                if values_match(rule.treatment_for(key), found, wanted) {
                    equal += 1;
                }
            }
            _ => missing += 1,
        }
    }
    equal >= rule.nb_equal_attributes && missing <= rule.nb_missing_attributes
}

fn filled_count(rule: &DuplicateRule, candidate: &Record) -> u32 {
    let filled = rule
        .checked_attributes
        .iter()
        .filter(|key| value_of(candidate, key).is_some())
        .count();
    u32::try_from(filled).unwrap_or(u32::MAX)
}

impl SutClient for MemorySut {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn create_record(&self, record: &Record, _app: &RequestingApp) -> Result<CreateResponse> {
        let mut state = self.state.lock();
        Self::check(&state, "create")?;

        if record.attributes.is_empty() {
            return Ok(CreateResponse {
                status: ResponseStatus::with_message(
                    StatusKind::Failure,
                    "identity has no attributes",
                ),
                customer_id: None,
                connection_id: record.connection_id.clone(),
            });
        }
        if let Some(connection_id) = &record.connection_id {
            if state
                .records
                .iter()
                .any(|r| r.connection_id.as_ref() == Some(connection_id))
            {
                return Ok(CreateResponse {
                    status: ResponseStatus::with_message(
                        StatusKind::Conflict,
                        format!("connection id {connection_id} already exists"),
                    ),
                    customer_id: None,
                    connection_id: Some(connection_id.clone()),
                });
            }
        }

        let customer_id = new_customer_id();
        let mut stored = record.for_wire();
        stored.customer_id = Some(customer_id.clone());
        state.records.push(stored);
        Ok(CreateResponse {
            status: ResponseStatus::new(StatusKind::Success),
            customer_id: Some(customer_id),
            connection_id: record.connection_id.clone(),
        })
    }

    fn search_records(&self, criteria: &[SearchAttribute]) -> Result<SearchResponse> {
        let state = self.state.lock();
        Self::check(&state, "search")?;

        let records: Vec<Record> = if criteria.is_empty() || !state.indexed {
            Vec::new()
        } else {
            state
                .records
                .iter()
                .filter(|r| matches_criteria(r, criteria))
                .cloned()
                .collect()
        };
        let status = if records.is_empty() {
            ResponseStatus::with_message(StatusKind::NotFound, "no matching identity")
        } else {
            ResponseStatus::new(StatusKind::Ok)
        };
        Ok(SearchResponse { status, records })
    }

    fn register_duplicate_rule(&self, rule: &DuplicateRule) -> Result<ResponseStatus> {
        let mut state = self.state.lock();
        Self::check(&state, "register_rule")?;

        if state.refused_rules.contains(&rule.code) {
            return Ok(ResponseStatus::with_message(
                StatusKind::BadRequest,
                format!("rule {} refused", rule.code),
            ));
        }
        state.rules.insert(rule.code.clone(), rule.clone());
        Ok(ResponseStatus::new(StatusKind::Success))
    }

    fn find_duplicates(
        &self,
        candidate: &Record,
        rule_codes: &[String],
    ) -> Result<DuplicateSearchResponse> {
        let state = self.state.lock();
        Self::check(&state, "find_duplicates")?;

        let mut duplicates = BTreeMap::new();
        let mut metadata = BTreeMap::new();
        for code in rule_codes {
            let Some(rule) = state.rules.get(code) else {
                metadata.insert(
                    format!("{code}.error"),
                    serde_json::Value::from("unknown rule"),
                );
                continue;
            };
            if filled_count(rule, candidate) < rule.nb_filled_attributes {
                metadata.insert(
                    format!("{code}.error"),
                    serde_json::Value::from("not enough filled attributes"),
                );
                continue;
            }
            let found: Vec<Record> = state
                .records
                .iter()
                .filter(|r| candidate.customer_id.is_none() || r.customer_id != candidate.customer_id)
                .filter(|r| is_duplicate(rule, candidate, r))
                .cloned()
                .collect();
            metadata.insert(format!("{code}.count"), serde_json::Value::from(found.len()));
            if !found.is_empty() {
                duplicates.insert(code.clone(), found);
            }
        }

        let status = if duplicates.is_empty() {
            ResponseStatus::with_message(StatusKind::NotFound, "no potential duplicate")
        } else {
            ResponseStatus::new(StatusKind::Ok)
        };
        Ok(DuplicateSearchResponse {
            status,
            duplicates,
            metadata,
        })
    }
}

impl StatePurger for MemorySut {
    fn truncate_store(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.truncations += 1;
        Self::check(&state, "truncate")?;
        state.records.clear();
        state.rules.clear();
        state.indexed = false;
        Ok(())
    }

    fn reset_index(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.index_resets += 1;
        Self::check(&state, "reset_index")?;
        state.indexed = true;
        Ok(())
    }

    fn clear_search_rules(&self) -> Result<()> {
        self.state.lock().search_rules_cleared += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attribute::Attribute;
    use crate::model::duplicate_rule::AttributeTreatment;

    fn app() -> RequestingApp {
        RequestingApp {
            client_code: "TEST".to_string(),
            author_name: "ish".to_string(),
            author_type: "application".to_string(),
        }
    }

    fn person(first: &str, family: &str, birth: &str) -> Record {
        Record::named(first)
            .with("first_name", first)
            .with("family_name", family)
            .with("birthdate", birth)
    }

    fn criterion(key: &str, value: &str, treatment: Treatment) -> SearchAttribute {
        SearchAttribute {
            key: key.to_string(),
            value: value.to_string(),
            treatment,
        }
    }

    #[test]
    fn create_assigns_distinct_customer_ids() {
        let sut = MemorySut::new();
        let a = sut.create_record(&person("Alice", "Dupont", "01/01/1980"), &app()).unwrap();
        let b = sut.create_record(&person("Bob", "Dupont", "01/01/1980"), &app()).unwrap();
        assert!(a.status.is_success());
        assert_ne!(a.customer_id, b.customer_id);
        assert_eq!(sut.stats().stored, 2);
        assert!(sut.records().iter().all(|r| r.name.is_empty()));
    }

    #[test]
    fn create_rejects_empty_and_conflicting_records() {
        let sut = MemorySut::new();
        let empty = sut.create_record(&Record::named("x"), &app()).unwrap();
        assert_eq!(empty.status.kind, StatusKind::Failure);

        let mut first = person("Alice", "Dupont", "01/01/1980");
        first.connection_id = Some("conn-1".to_string());
        assert!(sut.create_record(&first, &app()).unwrap().status.is_success());
        let again = sut.create_record(&first, &app()).unwrap();
        assert_eq!(again.status.kind, StatusKind::Conflict);
        assert_eq!(sut.stats().stored, 1);
    }

    #[test]
    fn strict_and_approximate_search() {
        let sut = MemorySut::new();
        sut.create_record(&person("Alice", "Dupont", "01/01/1980"), &app()).unwrap();

        let strict = sut
            .search_records(&[criterion("family_name", "dupont ", Treatment::Strict)])
            .unwrap();
        assert_eq!(strict.status.kind, StatusKind::NotFound);
        assert!(strict.records.is_empty());

        let approx = sut
            .search_records(&[criterion("family_name", "dupont ", Treatment::Approximated)])
            .unwrap();
        assert!(approx.status.is_ok());
        assert_eq!(approx.records.len(), 1);
        assert!(approx.records[0].customer_id.is_some());
    }

    #[test]
    fn search_requires_every_criterion() {
        let sut = MemorySut::new();
        sut.create_record(&person("Alice", "Dupont", "01/01/1980"), &app()).unwrap();
        let response = sut
            .search_records(&[
                criterion("family_name", "Dupont", Treatment::Strict),
                criterion("birthdate", "02/02/1990", Treatment::Strict),
            ])
            .unwrap();
        assert!(response.records.is_empty());
    }

    #[test]
    fn duplicate_rule_counts_equal_and_missing() {
        let sut = MemorySut::new();
        sut.create_record(&person("Alice", "Dupont", "01/01/1980"), &app()).unwrap();
        sut.create_record(&person("Alicia", "Dupont", "01/01/1980"), &app()).unwrap();
        sut.create_record(
            &Record::named("partial").with("family_name", "Dupont"),
            &app(),
        )
        .unwrap();

        let rule = DuplicateRule {
            name: "same family and birth".to_string(),
            code: "R1".to_string(),
            description: None,
            checked_attributes: vec!["family_name".to_string(), "birthdate".to_string()],
            nb_filled_attributes: 2,
            nb_equal_attributes: 2,
            nb_missing_attributes: 0,
            list_attribute_treatments: vec![AttributeTreatment {
                attribute_keys: vec!["family_name".to_string()],
                treatment: Treatment::Approximated,
            }],
            priority: 0,
            active: true,
            daemon: false,
            detection_limit: -1,
        };
        assert!(sut.register_duplicate_rule(&rule).unwrap().is_ok());

        let candidate = Record::default()
            .with("family_name", "DUPONT")
            .with("birthdate", "01/01/1980");
        let response = sut.find_duplicates(&candidate, &["R1".to_string()]).unwrap();
        assert!(response.status.is_ok());
        assert_eq!(response.records_for(&["R1".to_string()]).len(), 2);
        assert_eq!(response.metadata["R1.count"], 2);
    }

    #[test]
    fn candidate_is_excluded_and_unfilled_candidate_yields_nothing() {
        let sut = MemorySut::new();
        let created = sut
            .create_record(&person("Alice", "Dupont", "01/01/1980"), &app())
            .unwrap();
        let mut rule: DuplicateRule =
            serde_json::from_str(r#"{"name":"r","code":"R","checkedAttributes":["family_name"],"nbFilledAttributes":1,"nbEqualAttributes":1}"#)
                .unwrap();
        sut.register_duplicate_rule(&rule).unwrap();

        let mut candidate = Record::default().with("family_name", "Dupont");
        candidate.customer_id = created.customer_id;
        let response = sut.find_duplicates(&candidate, &["R".to_string()]).unwrap();
        assert_eq!(response.status.kind, StatusKind::NotFound);

        rule.code = "R2".to_string();
        rule.nb_filled_attributes = 2;
        sut.register_duplicate_rule(&rule).unwrap();
        let response = sut
            .find_duplicates(&Record::default().with("family_name", "Dupont"), &["R2".to_string()])
            .unwrap();
        assert!(response.duplicates.is_empty());
    }

    #[test]
    fn purge_clears_state_and_counts_calls() {
        let sut = MemorySut::new();
        sut.create_record(&person("Alice", "Dupont", "01/01/1980"), &app()).unwrap();
        sut.truncate_store().unwrap();
        sut.reset_index().unwrap();
        sut.clear_search_rules().unwrap();
        let stats = sut.stats();
        assert_eq!(stats.stored, 0);
        assert_eq!(stats.truncations, 1);
        assert_eq!(stats.index_resets, 1);
        assert_eq!(stats.search_rules_cleared, 1);
    }

    #[test]
    fn injected_failures_are_transport_errors() {
        let sut = MemorySut::new();
        sut.fail_operation("search");
        sut.fail_operation("bogus");
        let err = sut.search_records(&[]).unwrap_err();
        assert_eq!(err.code(), "ISH-3001");
        assert!(sut.create_record(&person("A", "B", "C"), &app()).is_ok());
    }

    #[test]
    fn refused_rule_is_a_business_status() {
        let sut = MemorySut::new();
        sut.refuse_rule("R");
        let rule: DuplicateRule = serde_json::from_str(r#"{"name":"r","code":"R"}"#).unwrap();
        let status = sut.register_duplicate_rule(&rule).unwrap();
        assert_eq!(status.kind, StatusKind::BadRequest);
        assert_eq!(sut.stats().rules, 0);
    }

    #[test]
    fn certified_attributes_survive_storage() {
        let sut = MemorySut::new();
        let record = Record::named("c")
            .with_attribute(Attribute::new("email", "a@b.fr").certified("mail", 200, None));
        sut.create_record(&record, &app()).unwrap();
        assert_eq!(sut.records()[0], record);
    }
}

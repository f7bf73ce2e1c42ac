//! Comparator properties and the reference comparison scenarios.

use identity_scenario_harness::harness::comparator::{NOT_FOUND, Outcome, compare};
use identity_scenario_harness::model::record::Record;
use proptest::prelude::*;

// ──────────────────── generators ────────────────────

/// Distinct inputs `P0..Pn`, each with a unique email plus random extras.
fn arb_inputs() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(
        prop::collection::vec(("[a-z_]{1,8}", "[A-Za-z0-9 ]{0,8}"), 0..4),
        1..8,
    )
    .prop_map(|extras| {
        extras
            .into_iter()
            .enumerate()
            .map(|(i, attrs)| {
                attrs.into_iter().fold(
                    Record::named(format!("P{i}")).with("email", format!("p{i}@example.org")),
                    |record, (key, value)| record.with(key, value),
                )
            })
            .collect()
    })
}

/// Inputs plus two independent index selections (expected, actual).
fn arb_selection() -> impl Strategy<Value = (Vec<Record>, Vec<usize>, Vec<usize>)> {
    arb_inputs().prop_flat_map(|inputs| {
        let indices: Vec<usize> = (0..inputs.len()).collect();
        let n = indices.len();
        (
            Just(inputs),
            prop::sample::subsequence(indices.clone(), 0..=n),
            prop::sample::subsequence(indices, 0..=n),
        )
    })
}

/// Inputs, an expected selection and the same selection shuffled.
fn arb_permuted() -> impl Strategy<Value = (Vec<Record>, Vec<usize>, Vec<usize>)> {
    arb_inputs()
        .prop_flat_map(|inputs| {
            let indices: Vec<usize> = (0..inputs.len()).collect();
            let n = indices.len();
            (Just(inputs), prop::sample::subsequence(indices, 0..=n))
        })
        .prop_flat_map(|(inputs, expected)| {
            let shuffled = Just(expected.clone()).prop_shuffle();
            (Just(inputs), Just(expected), shuffled)
        })
}

fn names(inputs: &[Record], picked: &[usize]) -> Vec<String> {
    picked.iter().map(|&i| inputs[i].name.clone()).collect()
}

/// Records as the service would return them: no scenario name, attributes
/// in reverse order.
fn returned(inputs: &[Record], picked: &[usize]) -> Vec<Record> {
    picked
        .iter()
        .map(|&i| {
            let mut record = inputs[i].for_wire();
            record.attributes.reverse();
            record
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Canonicalizing twice changes nothing, and never changes equality.
    #[test]
    fn canonicalization_is_idempotent(inputs in arb_inputs()) {
        for record in &inputs {
            let once = record.canonicalized();
            let twice = once.canonicalized();
            prop_assert!(once.is_canonical());
            prop_assert_eq!(&once.attributes, &twice.attributes);
            prop_assert_eq!(&once, record);
        }
    }

    /// Returning exactly the expected records passes in any order.
    #[test]
    fn set_equal_results_pass((inputs, expected, shuffled) in arb_permuted()) {
        let comparison = compare(&returned(&inputs, &shuffled), &inputs, &names(&inputs, &expected));
        prop_assert!(comparison.passed(), "{}", comparison.message);
        prop_assert_eq!(comparison.outcome, Outcome::Match);
    }

    /// Any size difference fails and reports exactly that difference.
    #[test]
    fn size_difference_fails_with_delta((inputs, expected, actual) in arb_selection()) {
        prop_assume!(expected.len() != actual.len());
        let comparison = compare(&returned(&inputs, &actual), &inputs, &names(&inputs, &expected));
        let delta = expected.len().abs_diff(actual.len());
        prop_assert!(!comparison.passed());
        prop_assert_eq!(comparison.outcome.size_delta(), delta);
        let expected_phrase = format!("contains {delta} ");
        prop_assert!(
            comparison.message.contains(&expected_phrase),
            "{}",
            comparison.message
        );
    }

    /// Names recovered for returned records are the input names, every run.
    #[test]
    fn name_resolution_is_stable((inputs, expected, actual) in arb_selection()) {
        let records = returned(&inputs, &actual);
        let expected_names = names(&inputs, &expected);
        let first = compare(&records, &inputs, &expected_names);
        let second = compare(&records, &inputs, &expected_names);
        prop_assert_eq!(&first, &second);

        let mut recovered = names(&inputs, &actual);
        recovered.sort();
        prop_assert_eq!(first.returned, recovered);
    }
}

// ──────────────────── reference scenarios ────────────────────

fn person(name: &str, first: &str, family: &str) -> Record {
    Record::named(name)
        .with("first_name", first)
        .with("family_name", family)
}

fn wire(first: &str, family: &str) -> Record {
    Record::default()
        .with("family_name", family)
        .with("first_name", first)
}

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn exact_single_match_passes() {
    let inputs = vec![person("Alice", "Alice", "Dupont")];
    let comparison = compare(&[wire("Alice", "Dupont")], &inputs, &strings(&["Alice"]));
    assert!(comparison.passed());
    assert_eq!(comparison.returned, vec!["Alice"]);
}

#[test]
fn one_surplus_identity_fails() {
    let inputs = vec![
        person("Alice", "Alice", "Dupont"),
        person("Bob", "Bob", "Dupont"),
    ];
    let comparison = compare(
        &[wire("Alice", "Dupont"), wire("Bob", "Dupont")],
        &inputs,
        &strings(&["Alice"]),
    );
    assert!(!comparison.passed());
    assert_eq!(
        comparison.outcome,
        Outcome::Surplus {
            delta: 1,
            unexpected: strings(&["Bob"]),
        }
    );
    assert!(
        comparison
            .message
            .ends_with("The result contains 1 more identity than expected. Not expected (1): Bob")
    );
}

#[test]
fn undeclared_expected_name_is_dropped() {
    let inputs = vec![person("Alice", "Alice", "Dupont")];
    let comparison = compare(
        &[wire("Alice", "Dupont")],
        &inputs,
        &strings(&["Alice", "Ghost"]),
    );
    assert!(comparison.passed(), "{}", comparison.message);
    assert!(
        comparison
            .message
            .contains("Expected identities: Alice, Ghost")
    );
}

#[test]
fn unknown_returned_record_is_not_found() {
    let inputs = vec![person("Alice", "Alice", "Dupont")];
    let comparison = compare(
        &[wire("Alice", "Dupont"), wire("Eve", "Stranger")],
        &inputs,
        &strings(&["Alice"]),
    );
    assert!(!comparison.passed());
    assert_eq!(comparison.returned, vec!["Alice", NOT_FOUND]);
    assert_eq!(
        comparison.outcome,
        Outcome::Surplus {
            delta: 1,
            unexpected: vec![NOT_FOUND.to_string()],
        }
    );
}

#[test]
fn unknown_record_in_place_of_expected_is_a_mismatch() {
    let inputs = vec![
        person("Alice", "Alice", "Dupont"),
        person("Bob", "Bob", "Dupont"),
    ];
    let comparison = compare(
        &[wire("Alice", "Dupont"), wire("Eve", "Stranger")],
        &inputs,
        &strings(&["Alice", "Bob"]),
    );
    assert_eq!(
        comparison.outcome,
        Outcome::Mismatch {
            missing: strings(&["Bob"]),
            unexpected_count: 1,
        }
    );
    assert!(comparison.message.contains("1 expected identity not returned: Bob"));
    assert!(
        comparison
            .message
            .contains("The result contains 1 identity not listed as expected.")
    );
}

#[test]
fn repeated_expected_record_counts_in_size_only() {
    let inputs = vec![
        person("Alice", "Alice", "Dupont"),
        person("Bob", "Bob", "Dupont"),
    ];
    let comparison = compare(
        &[wire("Alice", "Dupont"), wire("Alice", "Dupont")],
        &inputs,
        &strings(&["Alice"]),
    );
    assert!(!comparison.passed());
    assert_eq!(
        comparison.outcome,
        Outcome::Surplus {
            delta: 1,
            unexpected: Vec::new(),
        }
    );
    assert!(
        comparison
            .message
            .ends_with("The result contains 1 more identity than expected.")
    );
}

#[test]
fn shortfall_lists_missing_names_sorted() {
    let inputs = vec![
        person("Carol", "Carol", "Dupont"),
        person("Alice", "Alice", "Dupont"),
        person("Bob", "Bob", "Dupont"),
    ];
    let comparison = compare(
        &[wire("Bob", "Dupont")],
        &inputs,
        &strings(&["Carol", "Bob", "Alice"]),
    );
    assert_eq!(
        comparison.outcome,
        Outcome::Shortfall {
            delta: 2,
            missing: strings(&["Alice", "Carol"]),
        }
    );
    assert!(comparison.message.contains("Tested identities: Carol, Alice, Bob"));
}

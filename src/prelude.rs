//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use identity_scenario_harness::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{IshError, Result};

// Model
pub use crate::model::attribute::{Attribute, Treatment};
pub use crate::model::duplicate_rule::DuplicateRule;
pub use crate::model::record::Record;
pub use crate::model::scenario::{Operation, Scenario};

// SUT
pub use crate::sut::memory::MemorySut;
pub use crate::sut::{ResponseStatus, StatePurger, StatusKind, SutClient};

// Harness
pub use crate::harness::comparator::{Comparison, Outcome, compare};
pub use crate::harness::context::HarnessContext;
pub use crate::harness::discovery::SuiteKind;
pub use crate::harness::report::{Report, Verdict};
pub use crate::harness::runner::ScenarioRunner;
pub use crate::harness::suite::{SuiteRun, run_suite, run_suites};

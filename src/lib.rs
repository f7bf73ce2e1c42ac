#![forbid(unsafe_code)]

//! Identity Scenario Harness (ish): drives an identity-resolution service
//! through file-based scenarios and explains where its answers differ from
//! the expected identities.
//!
//! A scenario declares named input identities, one operation (create and
//! verify, search, or duplicate detection) and the names it expects back.
//! The harness creates the inputs, runs the operation, maps the returned
//! records back to input names by attribute content and reports a verdict.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use identity_scenario_harness::prelude::*;
//!
//! let config = Config::load(None)?;
//! let ctx = HarnessContext::in_memory(config, Arc::new(MemorySut::new()));
//! let run = run_suite(&ctx, SuiteKind::Search, |v| println!("{} :: {}", v.scenario, v.status_label()))?;
//! assert!(run.passed());
//! # Ok::<(), IshError>(())
//! ```

pub mod prelude;

pub mod core;
pub mod harness;
pub mod logger;
pub mod model;
pub mod sut;

//! Scenario execution engine: discovery, running, comparison and reporting.

pub mod comparator;
pub mod context;
pub mod discovery;
pub mod report;
pub mod runner;
pub mod suite;

//! Record model: attributes, identities, duplicate rules, scenarios.

pub mod attribute;
pub mod duplicate_rule;
pub mod record;
pub mod scenario;

//! Activity logging: JSONL append-only log plus an optional SQLite (WAL)
//! store, fed by one logger thread.

pub mod dual;
pub mod jsonl;
#[cfg(feature = "sqlite")]
pub mod sqlite;

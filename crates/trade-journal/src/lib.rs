//! SQLite journal for snapshots, plans, outcomes, learning reviews and
//! evaluator configuration versions.

pub mod configs;
pub mod db;
pub mod error;
pub mod outcomes;
pub mod plans;
pub mod retry;
pub mod reviews;
mod rows;
pub mod snapshots;

#[cfg(test)]
mod test_support;

pub use configs::ConfigVersion;
pub use db::JournalDb;
pub use error::{JournalError, Result};
pub use outcomes::validate_report;
pub use retry::RetryPolicy;
pub use snapshots::CycleRecord;

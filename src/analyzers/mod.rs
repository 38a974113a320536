//! Grouped statistics over cleaned tables.
//!
//! Outlier removal, per-group reductions and the outer join that lines up
//! several aggregates by a shared key, plus the orchestration that runs a
//! configured pipeline end to end.

pub mod aggregate;
pub mod analyzer;
pub mod combine;
pub mod outlier;
pub mod types;
pub mod utility;

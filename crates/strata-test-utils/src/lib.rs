//! Test helpers shared across Strata crates.

pub mod embedding;
pub mod records;

pub use embedding::{FailingEmbedder, StubEmbedder};
pub use records::{fixed_now, record, record_expiring};

//! Post categorization and LLM-backed bucket analysis.

pub mod aggregator;
pub mod categorizer;
pub mod patterns;

pub use aggregator::Aggregator;
pub use categorizer::{statistics, students_only, Categorizer, CollectionStatistics};

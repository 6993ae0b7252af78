//! Report rendering.

pub mod generator;

pub use generator::{failure_summary, generate_json_report, generate_markdown_report};

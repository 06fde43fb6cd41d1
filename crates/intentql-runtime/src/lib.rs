//! # intentql-runtime
//!
//! The [`Pipeline`] ties the IntentQL stages together: an intent is
//! validated, compiled to parameterized SQL, linted, and optionally checked
//! against the database's query plan before it is handed to the caller for
//! execution. Each stage fails with its own [`PipelineError`] variant.

pub mod error;
pub mod pipeline;

pub use error::PipelineError;
pub use pipeline::Pipeline;

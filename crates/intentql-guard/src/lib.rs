//! # intentql-guard
//!
//! Guardrails applied to compiled SQL before it reaches the database:
//!
//! - [`SqlLinter`]: a lexical scanner that rejects anything but a single,
//!   bounded, parameterized SELECT over allowlisted tables
//! - [`ExplainGate`]: asks the database for a query plan and blocks
//!   statements whose estimated cost or row counts are too high
//!
//! Either guardrail rejecting a statement means it must not be executed.

pub mod error;
pub mod explain;
pub mod linter;

pub use error::{PatternError, SecurityError, ViolationKind};
pub use explain::{ExplainGate, PlanError, PlanProvider, PlanRequest, QueryPlan};
pub use linter::SqlLinter;

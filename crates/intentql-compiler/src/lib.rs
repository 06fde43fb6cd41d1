//! # intentql-compiler
//!
//! Turns a validated [`QueryIntent`](intentql_core::QueryIntent) into a
//! parameterized SELECT plus the bind specification a driver needs to fill
//! its placeholders.
//!
//! ## Filter rendering
//!
//! | Operator | SQL |
//! |----------|-----|
//! | `eq`, `neq`, `gt`, `lt`, `gte`, `lte` | `"t"."c" <op> $n` |
//! | `between` | `"t"."c" BETWEEN $n AND $n+1` |
//! | `in` | `"t"."c" = ANY($n)` on Postgres, `IN (?)` elsewhere, bound as an array |
//! | `like`, `ilike` | `"t"."c" LIKE $n` / `ILIKE $n` |
//! | `exists`, `not_exists` | `[NOT] EXISTS (SELECT 1 FROM "r" WHERE "r"."fk" = "t"."base" ...)` |
//!
//! Placeholder and quoting syntax come from the configured
//! [`SqlDialect`](intentql_core::SqlDialect).

pub mod compiler;
pub mod error;
mod statement;

pub use compiler::Compiler;
pub use error::CompileError;

use intentql_compiler::CompileError;
use intentql_core::ConfigError;
use intentql_guard::{PatternError, SecurityError};
use intentql_policy::ValidationError;

/// Why the pipeline refused to produce a statement.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("intent rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("compilation failed: {0}")]
    Compile(#[from] CompileError),

    #[error("statement rejected: {0}")]
    Security(#[from] SecurityError),

    /// The explain gate judged the statement too expensive.
    #[error("statement blocked by cost guard")]
    CostGuard { sql: String },
}

impl PipelineError {
    /// Stable name of the failing stage.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Config(_) | PipelineError::Pattern(_) => "config",
            PipelineError::Validation(_) => "validation",
            PipelineError::Compile(_) => "compile",
            PipelineError::Security(_) => "lint",
            PipelineError::CostGuard { .. } => "explain",
        }
    }
}

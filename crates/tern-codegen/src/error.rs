//! Codegen error types.
//!
//! User mistakes are diagnostics in [`tern_types::CompileErrors`]; these are
//! the failures that stop emission outright.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodegenError {
    /// Every allocatable register was in use when another was requested.
    #[error("register allocation exhausted in function '{function}'")]
    RegisterAllocationExhausted { function: String },

    /// A jump, slot or table outgrew its encoding.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// An internal consistency check failed.
    #[error("internal codegen error: {0}")]
    Internal(String),
}

/// Codegen result type alias.
pub type CodegenResult<T> = Result<T, CodegenError>;

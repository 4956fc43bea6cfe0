//! Shared types for the Tern toolchain.
//!
//! This crate defines the AST, value-type descriptors, source spans and
//! structured diagnostics used by every stage from the lexer to the VM.

mod error;
mod span;
mod type_decl;
pub mod ast;

pub use error::{CompileErrors, ErrorCategory, ErrorCode, Severity, TernError, MAX_ERRORS};
pub use span::{SourceFile, Span};
pub use type_decl::{Primitive, TypeDecl, TypeFlags};

/// Result type used by front-end stages that stop at the first error.
pub type Result<T> = std::result::Result<T, TernError>;

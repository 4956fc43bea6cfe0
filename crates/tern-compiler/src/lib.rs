//! Tern compiler: orchestrates the full compilation pipeline.
//!
//! ```text
//! Tern source → Lexer → Parser → Emitter (pre-declare + emit) → codefile
//! ```
//!
//! [`compile`] and [`compile_to_result`] work on in-memory source; the
//! [`Compiler`] facade adds file I/O and disassembly on top of them.

mod compiler;
mod error;

pub use compiler::{codefile_path, Compiler};
pub use error::{CompilerError, CompilerResult};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tern_codegen::{CodegenError, EmitOptions};
use tern_lexer::Lexer;
use tern_parser::Parser;
use tern_types::{CompileErrors, ErrorCode, SourceFile, Span, TernError};
use tracing::debug;

pub use tern_codegen::OptLevel;

/// Outcome of one compile, in a form tools can serialise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileResult {
    pub success: bool,
    /// Codefile bytes; present only when `success` is true.
    pub codefile: Option<Vec<u8>>,
    /// Lowercase hex SHA-256 of `codefile`.
    pub codefile_sha256: Option<String>,
    pub errors: CompileErrors,
}

/// Compile `source` with default options.
pub fn compile(source: &str, filename: &str) -> Result<Vec<u8>, CompileErrors> {
    compile_with(source, filename, EmitOptions::default())
}

/// Compile `source` to codefile bytes.
///
/// Any diagnostic at any stage fails the compile; no bytes are returned for
/// a program with errors.
#[tracing::instrument(skip(source, options), fields(opt = ?options.opt_level))]
pub fn compile_with(
    source: &str,
    filename: &str,
    options: EmitOptions,
) -> Result<Vec<u8>, CompileErrors> {
    let source_file = SourceFile::new(filename, source);

    // ── Lex + parse ──
    let lexed = Lexer::new(&source_file).lex();
    debug!(tokens = lexed.tokens.len(), "lexed");
    let mut errors = lexed.errors;
    let parsed = Parser::new(lexed.tokens, &source_file).parse();
    errors.extend(parsed.errors);
    if errors.has_errors() {
        return Err(errors);
    }
    let program = match parsed.program {
        Some(program) => program,
        None => {
            errors.push_error(diagnostic(
                &source_file,
                ErrorCode::INTERNAL,
                "parser produced no program",
                Span::default(),
            ));
            return Err(errors);
        }
    };

    // ── Emit ──
    let output = match tern_codegen::emit(&program, &source_file, options) {
        Ok(output) => output,
        Err(e) => {
            errors.push_error(codegen_diagnostic(&source_file, &e, program.span));
            return Err(errors);
        }
    };
    errors.extend(output.errors);
    if errors.has_errors() {
        return Err(errors);
    }

    match output.codefile.to_bytes() {
        Ok(bytes) => {
            debug!(bytes = bytes.len(), functions = output.functions.len(), "compiled");
            Ok(bytes)
        }
        Err(e) => {
            errors.push_error(diagnostic(
                &source_file,
                ErrorCode::LIMIT_EXCEEDED,
                format!("cannot serialise codefile: {e}"),
                program.span,
            ));
            Err(errors)
        }
    }
}

/// Compile with default options and report the outcome as a [`CompileResult`].
pub fn compile_to_result(source: &str, filename: &str) -> CompileResult {
    compile_to_result_with(source, filename, EmitOptions::default())
}

pub fn compile_to_result_with(source: &str, filename: &str, options: EmitOptions) -> CompileResult {
    match compile_with(source, filename, options) {
        Ok(bytes) => CompileResult {
            success: true,
            codefile_sha256: Some(sha256_hex(&bytes)),
            codefile: Some(bytes),
            errors: CompileErrors::empty(),
        },
        Err(errors) => CompileResult {
            success: false,
            codefile: None,
            codefile_sha256: None,
            errors,
        },
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn diagnostic(
    source_file: &SourceFile,
    code: ErrorCode,
    message: impl Into<String>,
    span: Span,
) -> TernError {
    TernError::new(
        source_file.name.clone(),
        code,
        message,
        span,
        source_file.line(span.start_line).unwrap_or_default(),
    )
}

/// Emission stopped outright; report it as a codegen diagnostic.
fn codegen_diagnostic(source_file: &SourceFile, error: &CodegenError, span: Span) -> TernError {
    let code = match error {
        CodegenError::RegisterAllocationExhausted { .. } => ErrorCode::REGISTER_EXHAUSTED,
        CodegenError::LimitExceeded(_) => ErrorCode::LIMIT_EXCEEDED,
        CodegenError::Internal(_) => ErrorCode::INTERNAL,
    };
    let diag = diagnostic(source_file, code, error.to_string(), span);
    match error {
        CodegenError::RegisterAllocationExhausted { .. } => {
            diag.with_suggestion("split the expression into smaller statements")
        }
        _ => diag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn exhausted_registers_map_to_e401() {
        let sf = SourceFile::new("main.tn", "fn Main(): Int { return 1; }");
        let err = CodegenError::RegisterAllocationExhausted {
            function: "Main".into(),
        };
        let diag = codegen_diagnostic(&sf, &err, Span::new(1, 1, 1, 3));
        assert_eq!(diag.code, ErrorCode::REGISTER_EXHAUSTED);
        assert!(diag.message.contains("Main"));
        assert_eq!(diag.source_line, "fn Main(): Int { return 1; }");
        assert!(diag.suggestion.is_some());
    }
}

use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum number of diagnostics stored before further ones are only counted.
pub const MAX_ERRORS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Diagnostic category, derived from the code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Syntax,
    Type,
    Name,
    Codegen,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Syntax => "syntax",
            Self::Type => "type",
            Self::Name => "name",
            Self::Codegen => "codegen",
        })
    }
}

/// Numeric diagnostic code (E100–E499).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Syntax (E100–E199) ──
    pub const UNEXPECTED_TOKEN: Self = Self(100);
    pub const UNTERMINATED_STRING: Self = Self(101);
    pub const INVALID_LITERAL: Self = Self(102);
    pub const UNEXPECTED_CHARACTER: Self = Self(103);
    pub const INVALID_ATTRIBUTE: Self = Self(104);

    // ── Type (E200–E299) ──
    pub const UNKNOWN_TYPE: Self = Self(200);
    pub const TYPE_MISMATCH: Self = Self(201);
    pub const WRONG_ARG_COUNT: Self = Self(202);
    pub const INVALID_OPERAND: Self = Self(203);
    pub const MISSING_RETURN: Self = Self(204);
    pub const INVALID_GLOBAL_INITIALIZER: Self = Self(205);

    // ── Name (E300–E399) ──
    pub const UNDEFINED_IDENTIFIER: Self = Self(300);
    pub const UNDEFINED_FUNCTION: Self = Self(301);
    pub const UNINITIALIZED_LOCAL: Self = Self(302);
    pub const REDEFINITION: Self = Self(303);
    pub const SHADOWED_GLOBAL: Self = Self(304);
    pub const MISSING_ENTRY_POINT: Self = Self(305);
    pub const INVALID_ASSIGN_TARGET: Self = Self(306);

    // ── Codegen (E400–E499) ──
    pub const NOT_IMPLEMENTED: Self = Self(400);
    pub const REGISTER_EXHAUSTED: Self = Self(401);
    pub const LIMIT_EXCEEDED: Self = Self(402);
    pub const INTERNAL: Self = Self(403);

    pub fn category(self) -> ErrorCategory {
        match self.0 {
            200..=299 => ErrorCategory::Type,
            300..=399 => ErrorCategory::Name,
            400..=499 => ErrorCategory::Codegen,
            _ => ErrorCategory::Syntax,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// A structured compile diagnostic.
///
/// Rendered by tools as-is; nothing downstream parses `message`.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{file}:{span}: {code} [{category}] {message}")]
pub struct TernError {
    pub file: String,
    pub code: ErrorCode,
    pub severity: Severity,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(flatten)]
    pub span: Span,
    /// The offending source line, for context.
    pub source_line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl TernError {
    pub fn new(
        file: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            code,
            severity: Severity::Error,
            category: code.category(),
            message: message.into(),
            span,
            source_line: source_line.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Diagnostics accumulated by one compile.
///
/// Stages keep going after an error so that several problems surface in one
/// run; a non-empty error list means the artifact must not be used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompileErrors {
    pub errors: Vec<TernError>,
    pub warnings: Vec<TernError>,
    pub total_errors: usize,
    pub total_warnings: usize,
}

impl CompileErrors {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// True once enough errors were seen that stages should stop early.
    pub fn at_limit(&self) -> bool {
        self.total_errors >= MAX_ERRORS
    }

    pub fn push_error(&mut self, error: TernError) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
        self.total_errors += 1;
    }

    pub fn push_warning(&mut self, mut warning: TernError) {
        warning.severity = Severity::Warning;
        self.warnings.push(warning);
        self.total_warnings += 1;
    }

    /// Append everything from another stage.
    pub fn extend(&mut self, other: CompileErrors) {
        let dropped = other.total_errors - other.errors.len();
        for e in other.errors {
            self.push_error(e);
        }
        self.total_errors += dropped;
        for w in other.warnings {
            self.push_warning(w);
        }
    }

    /// One line per stored error, in report order.
    pub fn render(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(code: ErrorCode) -> TernError {
        TernError::new(
            "main.tn",
            code,
            "use of uninitialized local 'x'",
            Span::new(3, 12, 3, 13),
            "    return x;",
        )
    }

    #[test]
    fn code_ranges_map_to_categories() {
        assert_eq!(ErrorCode::UNEXPECTED_TOKEN.category(), ErrorCategory::Syntax);
        assert_eq!(ErrorCode::TYPE_MISMATCH.category(), ErrorCategory::Type);
        assert_eq!(ErrorCode::UNINITIALIZED_LOCAL.category(), ErrorCategory::Name);
        assert_eq!(ErrorCode::REGISTER_EXHAUSTED.category(), ErrorCategory::Codegen);
    }

    #[test]
    fn display_includes_location_and_code() {
        let err = sample(ErrorCode::UNINITIALIZED_LOCAL);
        assert_eq!(
            err.to_string(),
            "main.tn:3:12: E302 [name] use of uninitialized local 'x'"
        );
    }

    #[test]
    fn json_uses_flat_location_fields() {
        let err = sample(ErrorCode::TYPE_MISMATCH).with_suggestion("declare it as Int");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"line\":3"));
        assert!(json.contains("\"column\":12"));
        assert!(json.contains("\"end_column\":13"));
        assert!(json.contains("\"suggestion\""));

        let back: TernError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, ErrorCode::TYPE_MISMATCH);
        assert_eq!(back.span, err.span);
    }

    #[test]
    fn storage_is_capped_but_count_is_not() {
        let mut errs = CompileErrors::empty();
        for _ in 0..MAX_ERRORS + 7 {
            errs.push_error(sample(ErrorCode::UNEXPECTED_TOKEN));
        }
        assert_eq!(errs.errors.len(), MAX_ERRORS);
        assert_eq!(errs.total_errors, MAX_ERRORS + 7);
        assert!(errs.at_limit());
    }

    #[test]
    fn extend_keeps_dropped_counts() {
        let mut a = CompileErrors::empty();
        a.push_error(sample(ErrorCode::UNEXPECTED_TOKEN));
        let mut b = CompileErrors::empty();
        for _ in 0..MAX_ERRORS + 2 {
            b.push_error(sample(ErrorCode::TYPE_MISMATCH));
        }
        a.extend(b);
        assert_eq!(a.total_errors, MAX_ERRORS + 3);
        assert_eq!(a.errors.len(), MAX_ERRORS);
    }
}

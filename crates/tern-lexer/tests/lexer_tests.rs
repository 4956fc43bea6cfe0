//! Lexer tests: keywords, literals, operators, comments and error recovery.

use tern_lexer::{Lexer, TokenKind, ALL_KEYWORDS};
use tern_types::{ErrorCode, Primitive, SourceFile, Span};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Lex source text and return just the token kinds (excluding final Eof).
fn kinds(source: &str) -> Vec<TokenKind> {
    let sf = SourceFile::new("test.tn", source);
    Lexer::new(&sf)
        .lex()
        .tokens
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.kind)
        .collect()
}

fn error_codes(source: &str) -> Vec<ErrorCode> {
    let sf = SourceFile::new("test.tn", source);
    Lexer::new(&sf)
        .lex()
        .errors
        .errors
        .iter()
        .map(|e| e.code)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────
// Keywords & identifiers
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_every_keyword_is_recognised() {
    for kw in ALL_KEYWORDS {
        let k = kinds(kw);
        assert_eq!(k.len(), 1, "keyword '{kw}'");
        assert!(
            TokenKind::from_keyword(kw).is_some_and(|t| t.is_keyword()),
            "keyword '{kw}'"
        );
        assert_eq!(k[0], TokenKind::from_keyword(kw).unwrap_or(TokenKind::Eof));
    }
}

#[test]
fn test_type_names_carry_primitive() {
    assert_eq!(
        kinds("UInt Float"),
        vec![
            TokenKind::TypeName(Primitive::UInt),
            TokenKind::TypeName(Primitive::Float)
        ]
    );
}

#[test]
fn test_identifiers_and_near_keywords() {
    assert_eq!(
        kinds("Main elifx _tmp int"),
        vec![
            TokenKind::Identifier("Main".into()),
            TokenKind::Identifier("elifx".into()),
            TokenKind::Identifier("_tmp".into()),
            TokenKind::Identifier("int".into()),
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Literals
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_integer_and_float_literals() {
    assert_eq!(
        kinds("0 42 0xff 3.5 18446744073709551615"),
        vec![
            TokenKind::IntLit(0),
            TokenKind::IntLit(42),
            TokenKind::IntLit(255),
            TokenKind::FloatLit(3.5),
            TokenKind::IntLit(u64::MAX),
        ]
    );
}

#[test]
fn test_dot_after_integer_is_not_a_float() {
    assert_eq!(
        kinds("a.0"),
        vec![
            TokenKind::Identifier("a".into()),
            TokenKind::Dot,
            TokenKind::IntLit(0),
        ]
    );
    assert_eq!(kinds("1."), vec![TokenKind::IntLit(1), TokenKind::Dot]);
}

#[test]
fn test_integer_overflow_is_invalid_literal() {
    assert_eq!(
        error_codes("18446744073709551616"),
        vec![ErrorCode::INVALID_LITERAL]
    );
}

#[test]
fn test_string_escapes_resolved() {
    assert_eq!(
        kinds(r#""a\tb\n\"q\"\\\0""#),
        vec![TokenKind::StringLit("a\tb\n\"q\"\\\0".into())]
    );
}

#[test]
fn test_unterminated_string_reports_and_recovers() {
    let src = "\"open\nvar";
    assert_eq!(error_codes(src), vec![ErrorCode::UNTERMINATED_STRING]);
    assert_eq!(
        kinds(src),
        vec![TokenKind::StringLit("open".into()), TokenKind::Var]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Operators & punctuation
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_two_character_operators() {
    assert_eq!(
        kinds("== != <= >= < > = !"),
        vec![
            TokenKind::EqEq,
            TokenKind::BangEq,
            TokenKind::LessEq,
            TokenKind::GreaterEq,
            TokenKind::Less,
            TokenKind::Greater,
            TokenKind::Eq,
            TokenKind::Bang,
        ]
    );
}

#[test]
fn test_extern_attribute_tokens() {
    assert_eq!(
        kinds(r#"@extern("libc", "abs") fn Abs(x: Int): Int;"#),
        vec![
            TokenKind::At,
            TokenKind::Identifier("extern".into()),
            TokenKind::LParen,
            TokenKind::StringLit("libc".into()),
            TokenKind::Comma,
            TokenKind::StringLit("abs".into()),
            TokenKind::RParen,
            TokenKind::Fn,
            TokenKind::Identifier("Abs".into()),
            TokenKind::LParen,
            TokenKind::Identifier("x".into()),
            TokenKind::Colon,
            TokenKind::TypeName(Primitive::Int),
            TokenKind::RParen,
            TokenKind::Colon,
            TokenKind::TypeName(Primitive::Int),
            TokenKind::Semicolon,
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Comments & whitespace
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_both_comment_styles_skipped() {
    let src = "var // line comment\n/* block\n comment */ x /**/;";
    assert_eq!(
        kinds(src),
        vec![
            TokenKind::Var,
            TokenKind::Identifier("x".into()),
            TokenKind::Semicolon
        ]
    );
    assert!(error_codes(src).is_empty());
}

#[test]
fn test_unterminated_block_comment_is_error() {
    assert_eq!(error_codes("x /* never"), vec![ErrorCode::UNEXPECTED_TOKEN]);
}

#[test]
fn test_spans_are_one_based_and_inclusive() {
    let sf = SourceFile::new("test.tn", "fn\n  Main");
    let tokens = Lexer::new(&sf).lex().tokens;
    assert_eq!(tokens[0].span, Span::new(1, 1, 1, 2));
    assert_eq!(tokens[1].span, Span::new(2, 3, 2, 6));
}

// ─────────────────────────────────────────────────────────────────────
// Error recovery
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_unexpected_character_skipped() {
    let src = "a # b";
    assert_eq!(error_codes(src), vec![ErrorCode::UNEXPECTED_CHARACTER]);
    assert_eq!(
        kinds(src),
        vec![
            TokenKind::Identifier("a".into()),
            TokenKind::Identifier("b".into())
        ]
    );
}

#[test]
fn test_error_cap_stops_lexing() {
    let src = "#".repeat(100);
    let sf = SourceFile::new("test.tn", src);
    let result = Lexer::new(&sf).lex();
    assert_eq!(result.errors.errors.len(), tern_types::MAX_ERRORS);
    assert_eq!(result.tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));
}

#[test]
fn test_empty_source_is_just_eof() {
    let sf = SourceFile::new("test.tn", "");
    let tokens = Lexer::new(&sf).lex().tokens;
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::Eof);
}

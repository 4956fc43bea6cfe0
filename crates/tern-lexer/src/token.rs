//! Token types for the Tern lexer.

use std::fmt;
use tern_types::{Primitive, Span};

/// Reserved words. Primitive type names are reserved too and lex as
/// [`TokenKind::TypeName`].
pub const ALL_KEYWORDS: &[&str] = &[
    "fn", "var", "const", "return", "if", "elif", "else", // statements
    "Void", "Byte", "Int", "UInt", "Float", "Any", // type names
];

// ─────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn is_keyword(&self) -> bool {
        self.kind.is_keyword()
    }
}

// ─────────────────────────────────────────────────────────────────────
// TokenKind
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────
    /// `42`, `0xff`
    IntLit(u64),
    /// `3.25`
    FloatLit(f64),
    /// `"text"` with escapes already resolved
    StringLit(String),

    Identifier(String),

    // ── Keywords ─────────────────────────────────────────────
    Fn,
    Var,
    Const,
    Return,
    If,
    Elif,
    Else,
    /// `Void`, `Byte`, `Int`, `UInt`, `Float`, `Any`
    TypeName(Primitive),

    // ── Operators ────────────────────────────────────────────
    Plus,
    Minus,
    Star,
    Slash,
    EqEq,
    BangEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    Bang,
    Eq,

    // ── Punctuation ──────────────────────────────────────────
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,
    /// `@`, introduces an attribute
    At,

    Eof,
}

impl TokenKind {
    pub fn from_keyword(s: &str) -> Option<TokenKind> {
        Some(match s {
            "fn" => TokenKind::Fn,
            "var" => TokenKind::Var,
            "const" => TokenKind::Const,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            _ => TokenKind::TypeName(Primitive::from_name(s)?),
        })
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Fn
                | TokenKind::Var
                | TokenKind::Const
                | TokenKind::Return
                | TokenKind::If
                | TokenKind::Elif
                | TokenKind::Else
                | TokenKind::TypeName(_)
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::IntLit(n) => write!(f, "{n}"),
            TokenKind::FloatLit(n) => write!(f, "{n}"),
            TokenKind::StringLit(s) => write!(f, "\"{s}\""),
            TokenKind::Identifier(s) => write!(f, "{s}"),
            TokenKind::TypeName(p) => write!(f, "{}", p.name()),
            other => f.write_str(match other {
                TokenKind::Fn => "fn",
                TokenKind::Var => "var",
                TokenKind::Const => "const",
                TokenKind::Return => "return",
                TokenKind::If => "if",
                TokenKind::Elif => "elif",
                TokenKind::Else => "else",
                TokenKind::Plus => "+",
                TokenKind::Minus => "-",
                TokenKind::Star => "*",
                TokenKind::Slash => "/",
                TokenKind::EqEq => "==",
                TokenKind::BangEq => "!=",
                TokenKind::Less => "<",
                TokenKind::Greater => ">",
                TokenKind::LessEq => "<=",
                TokenKind::GreaterEq => ">=",
                TokenKind::Bang => "!",
                TokenKind::Eq => "=",
                TokenKind::LParen => "(",
                TokenKind::RParen => ")",
                TokenKind::LBrace => "{",
                TokenKind::RBrace => "}",
                TokenKind::LBracket => "[",
                TokenKind::RBracket => "]",
                TokenKind::Comma => ",",
                TokenKind::Colon => ":",
                TokenKind::Semicolon => ";",
                TokenKind::Dot => ".",
                TokenKind::At => "@",
                _ => "end of file",
            }),
        }
    }
}

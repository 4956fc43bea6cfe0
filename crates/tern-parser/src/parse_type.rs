//! Type parsing.

use tern_lexer::token::TokenKind;
use tern_types::{ErrorCode, TypeDecl};

use crate::parser::Parser;

impl<'src> Parser<'src> {
    /// Parse a type.
    ///
    /// ```ebnf
    /// Type = [ "const" ] Prim { "*" } [ "[" [ INT ] "]" ] ;
    /// Prim = "Void" | "Byte" | "Int" | "UInt" | "Float" | "Any" ;
    /// ```
    pub(crate) fn parse_type(&mut self) -> Option<TypeDecl> {
        let is_const = self.eat(&TokenKind::Const);

        let mut ty = match self.peek_kind().clone() {
            TokenKind::TypeName(primitive) => {
                self.advance();
                TypeDecl::new(primitive)
            }
            TokenKind::Identifier(name) => {
                self.error_at_current(
                    ErrorCode::UNKNOWN_TYPE,
                    format!("unknown type '{name}'"),
                );
                self.advance();
                return None;
            }
            other => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected type, got '{other}'"),
                );
                return None;
            }
        };
        if is_const {
            ty = ty.with_const();
        }

        while self.eat(&TokenKind::Star) {
            ty = ty.pointer_to();
        }

        if self.eat(&TokenKind::LBracket) {
            let len = match self.peek_kind().clone() {
                TokenKind::IntLit(n) => {
                    let span = self.advance().span;
                    match u32::try_from(n) {
                        Ok(len) if len > 0 => len,
                        _ => {
                            self.error_at(
                                ErrorCode::INVALID_LITERAL,
                                format!("array length {n} is out of range"),
                                span,
                            );
                            0
                        }
                    }
                }
                _ => 0,
            };
            self.expect(&TokenKind::RBracket)?;
            ty = ty.array_of(len);
        }

        Some(ty)
    }
}

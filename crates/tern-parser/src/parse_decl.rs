//! Top-level item parsing: functions, globals, constants and attributes.

use tern_lexer::token::TokenKind;
use tern_types::ast::*;
use tern_types::{ErrorCode, TypeDecl};

use crate::parser::Parser;

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Program
    // ══════════════════════════════════════════════════════════════════════════

    pub(crate) fn parse_program(&mut self) -> Option<Program> {
        let start = self.current_span();
        let mut items = Vec::new();

        while !self.at_end() {
            if self.too_many_errors() {
                break;
            }
            if let Some(item) = self.parse_item() {
                items.push(item);
            } else {
                self.synchronize_item();
            }
        }

        let span = start.to(self.previous_span());
        Some(Program { items, span })
    }

    fn parse_item(&mut self) -> Option<Item> {
        let extern_attr = self.parse_attributes()?;

        match self.peek_kind().clone() {
            TokenKind::Fn => self.parse_function(extern_attr).map(Item::Function),
            TokenKind::Var | TokenKind::Const if extern_attr.is_some() => {
                self.error_at_current(
                    ErrorCode::INVALID_ATTRIBUTE,
                    "@extern only applies to functions",
                );
                None
            }
            TokenKind::Var => self.parse_var_decl().map(Item::Var),
            TokenKind::Const => self.parse_const_decl().map(Item::Const),
            other => {
                let message = format!("expected 'fn', 'var' or 'const', got '{other}'");
                self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, message);
                // Guarantee progress for the caller's resync.
                self.advance();
                None
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Attributes
    // ══════════════════════════════════════════════════════════════════════════

    /// `{ "@" "extern" "(" STRING [ "," STRING ] ")" }`
    ///
    /// Returns `None` on a malformed attribute, `Some(None)` when there were none.
    fn parse_attributes(&mut self) -> Option<Option<ExternAttr>> {
        let mut extern_attr: Option<ExternAttr> = None;

        while self.check(&TokenKind::At) {
            let start = self.advance().span;
            let name = self.expect_identifier()?;
            if name.name != "extern" {
                self.error_at(
                    ErrorCode::INVALID_ATTRIBUTE,
                    format!("unknown attribute '@{}'", name.name),
                    name.span,
                );
                return None;
            }

            self.expect(&TokenKind::LParen)?;
            let library = self.expect_string_literal()?;
            let symbol = if self.eat(&TokenKind::Comma) {
                Some(self.expect_string_literal()?)
            } else {
                None
            };
            self.expect(&TokenKind::RParen)?;
            let span = start.to(self.previous_span());

            if library.is_empty() || symbol.as_deref() == Some("") {
                self.error_at(
                    ErrorCode::INVALID_ATTRIBUTE,
                    "@extern library and symbol names must not be empty",
                    span,
                );
                return None;
            }
            if extern_attr.is_some() {
                self.error_at(
                    ErrorCode::INVALID_ATTRIBUTE,
                    "duplicate @extern attribute",
                    span,
                );
                return None;
            }
            extern_attr = Some(ExternAttr {
                library,
                symbol,
                span,
            });
        }

        Some(extern_attr)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Functions
    // ══════════════════════════════════════════════════════════════════════════

    /// `fn Name(p: T, ...) [: T] ( Block | ";" )`
    fn parse_function(&mut self, extern_attr: Option<ExternAttr>) -> Option<FunctionDecl> {
        let start = extern_attr
            .as_ref()
            .map(|a| a.span)
            .unwrap_or_else(|| self.current_span());
        self.expect(&TokenKind::Fn)?;
        let name = self.expect_identifier()?;

        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.at_end() {
            params.push(self.parse_param()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;

        let ret = if self.eat(&TokenKind::Colon) {
            self.parse_type()?
        } else {
            TypeDecl::void()
        };

        // Without @extern a bodiless declaration is a prototype.
        let body = if self.eat(&TokenKind::Semicolon) {
            None
        } else {
            let block = self.parse_block()?;
            if let Some(attr) = &extern_attr {
                self.error_at(
                    ErrorCode::INVALID_ATTRIBUTE,
                    format!("@extern function '{}' cannot have a body", name.name),
                    attr.span,
                );
            }
            Some(block)
        };

        let span = start.to(self.previous_span());
        Some(FunctionDecl {
            name,
            params,
            ret,
            body,
            extern_attr,
            span,
        })
    }

    fn parse_param(&mut self) -> Option<Param> {
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Colon)?;
        let ty = self.parse_type()?;
        let span = name.span.to(self.previous_span());
        Some(Param { name, ty, span })
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Variables & Constants
    // ══════════════════════════════════════════════════════════════════════════

    /// `var name: Type [= expr];`
    pub(crate) fn parse_var_decl(&mut self) -> Option<VarDecl> {
        let start = self.current_span();
        self.expect(&TokenKind::Var)?;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Colon)?;
        let ty = self.parse_type()?;
        let init = if self.eat(&TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(&TokenKind::Semicolon)?;
        let span = start.to(self.previous_span());
        Some(VarDecl {
            name,
            ty,
            init,
            span,
        })
    }

    /// `const name: Type = expr;`
    fn parse_const_decl(&mut self) -> Option<ConstDecl> {
        let start = self.current_span();
        self.expect(&TokenKind::Const)?;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Colon)?;
        let ty = self.parse_type()?.with_const();
        self.expect(&TokenKind::Eq)?;
        let value = self.parse_expression()?;
        self.expect(&TokenKind::Semicolon)?;
        let span = start.to(self.previous_span());
        Some(ConstDecl {
            name,
            ty,
            value,
            span,
        })
    }
}

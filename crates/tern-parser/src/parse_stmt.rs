//! Statement parsing.

use crate::parser::Parser;
use tern_lexer::token::TokenKind;
use tern_types::ast::*;
use tern_types::ErrorCode;

impl<'src> Parser<'src> {
    /// Parse a block of statements: `{ stmts... }`
    pub(crate) fn parse_block(&mut self) -> Option<Block> {
        let start = self.current_span();
        self.expect(&TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            if self.too_many_errors() {
                break;
            }
            if let Some(stmt) = self.parse_statement() {
                stmts.push(stmt);
            } else {
                self.synchronize_stmt();
            }
        }
        self.expect(&TokenKind::RBrace)?;
        let span = start.to(self.previous_span());
        Some(Block { stmts, span })
    }

    pub(crate) fn parse_statement(&mut self) -> Option<Stmt> {
        match self.peek_kind() {
            TokenKind::Var => self.parse_var_decl().map(Stmt::Var),
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::If => self.parse_if_stmt().map(Stmt::If),
            TokenKind::LBrace => self.parse_block().map(Stmt::Block),
            _ => self.parse_expr_or_assign(),
        }
    }

    /// `return [expr];`
    fn parse_return_stmt(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;
        let span = start.to(self.previous_span());
        Some(Stmt::Return(ReturnStmt { value, span }))
    }

    /// `if cond { ... } [ elif cond { ... } ]* [ else { ... } ]`
    ///
    /// Each `elif` becomes a nested [`IfStmt`] in the previous one's else slot.
    fn parse_if_stmt(&mut self) -> Option<IfStmt> {
        let start = self.advance().span;
        let cond = self.parse_expression()?;
        let then_block = self.parse_block()?;

        let else_branch = if self.check(&TokenKind::Elif) {
            Some(ElseBranch::Elif(Box::new(self.parse_if_stmt()?)))
        } else if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                self.error_at_current(ErrorCode::UNEXPECTED_TOKEN, "use 'elif' instead of 'else if'");
                return None;
            }
            Some(ElseBranch::Else(self.parse_block()?))
        } else {
            None
        };

        let span = start.to(self.previous_span());
        Some(IfStmt {
            cond,
            then_block,
            else_branch,
            span,
        })
    }

    /// `expr ;` or `target = value ;`
    fn parse_expr_or_assign(&mut self) -> Option<Stmt> {
        let expr = self.parse_expression()?;

        if self.eat(&TokenKind::Eq) {
            let value = self.parse_expression()?;
            self.expect(&TokenKind::Semicolon)?;
            let span = expr.span.to(self.previous_span());
            if !matches!(
                expr.peel().kind,
                ExprKind::Identifier(_) | ExprKind::Index { .. }
            ) {
                self.error_at(
                    ErrorCode::INVALID_ASSIGN_TARGET,
                    "only variables and array elements can be assigned to",
                    expr.span,
                );
            }
            return Some(Stmt::Assign(AssignStmt {
                target: expr,
                value,
                span,
            }));
        }

        self.expect(&TokenKind::Semicolon)?;
        let span = expr.span.to(self.previous_span());
        Some(Stmt::Expr(ExprStmt { expr, span }))
    }
}

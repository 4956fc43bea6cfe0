//! Statement lowering.

use tern_bytecode::{Cond, Instruction};
use tern_types::ast::{
    AssignStmt, BinOp, Block, ElseBranch, Expr, ExprKind, IfStmt, ReturnStmt, Stmt, VarDecl,
};
use tern_types::{ErrorCode, Span};

use super::{Emitter, FuncState};
use crate::assembler;
use crate::error::{CodegenError, CodegenResult};
use crate::function::{Local, LocalStorage};
use crate::registers::RETURN_REG;
use crate::tmp_value::{Place, TmpValue};

/// Where a statement sits relative to the end of the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tail {
    No,
    /// Last statement of a block that falls through to the function end.
    Nested,
    /// Last statement of the function body itself.
    Body,
}

/// Jump condition that holds after `op` compared true.
fn flag_cond(op: BinOp) -> Cond {
    match op {
        BinOp::Eq => Cond::Eq,
        BinOp::NotEq => Cond::Ne,
        BinOp::Less => Cond::Lt,
        BinOp::Greater => Cond::Gt,
        BinOp::LessEq => Cond::Le,
        BinOp::GreaterEq => Cond::Ge,
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => Cond::Ne,
    }
}

fn block_ends_in_return(block: &Block) -> bool {
    match block.stmts.last() {
        Some(Stmt::Return(_)) => true,
        Some(Stmt::Block(inner)) => block_ends_in_return(inner),
        _ => false,
    }
}

/// Whether every path through `block` ends in a `return`.
pub(crate) fn block_always_returns(block: &Block) -> bool {
    block.stmts.iter().any(stmt_always_returns)
}

fn stmt_always_returns(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return(_) => true,
        Stmt::Block(inner) => block_always_returns(inner),
        Stmt::If(if_stmt) => if_always_returns(if_stmt),
        Stmt::Var(_) | Stmt::Assign(_) | Stmt::Expr(_) => false,
    }
}

fn if_always_returns(stmt: &IfStmt) -> bool {
    block_always_returns(&stmt.then_block)
        && match &stmt.else_branch {
            None => false,
            Some(ElseBranch::Elif(inner)) => if_always_returns(inner),
            Some(ElseBranch::Else(block)) => block_always_returns(block),
        }
}

impl<'a> Emitter<'a> {
    pub(crate) fn emit_body(&mut self, f: &mut FuncState, body: &Block) -> CodegenResult<()> {
        let count = body.stmts.len();
        for (i, stmt) in body.stmts.iter().enumerate() {
            if self.errors.at_limit() {
                break;
            }
            let tail = if i + 1 == count { Tail::Body } else { Tail::No };
            self.emit_stmt(f, stmt, tail)?;
        }
        Ok(())
    }

    fn emit_block(&mut self, f: &mut FuncState, block: &Block, tail: bool) -> CodegenResult<()> {
        let count = block.stmts.len();
        for (i, stmt) in block.stmts.iter().enumerate() {
            if self.errors.at_limit() {
                break;
            }
            let tail = if tail && i + 1 == count {
                Tail::Nested
            } else {
                Tail::No
            };
            self.emit_stmt(f, stmt, tail)?;
        }
        Ok(())
    }

    fn emit_stmt(&mut self, f: &mut FuncState, stmt: &Stmt, tail: Tail) -> CodegenResult<()> {
        match stmt {
            Stmt::Var(var) => self.emit_var(f, var),
            Stmt::Assign(assign) => self.emit_assign(f, assign),
            Stmt::Return(ret) => self.emit_return(f, ret, tail),
            Stmt::If(if_stmt) => self.emit_if(f, if_stmt, tail),
            Stmt::Expr(expr) => {
                let value = self.emit_expr(f, &expr.expr)?;
                self.discard(f, value);
                Ok(())
            }
            Stmt::Block(block) => self.emit_block(f, block, tail != Tail::No),
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Locals
    // ══════════════════════════════════════════════════════════════════════════

    fn emit_var(&mut self, f: &mut FuncState, var: &VarDecl) -> CodegenResult<()> {
        let name = &var.name.name;
        if f.locals.find(name).is_some() {
            self.error(
                ErrorCode::REDEFINITION,
                format!("local '{name}' is already defined in this function"),
                var.name.span,
            );
            return Ok(());
        }
        if self.globals.find(name).is_some() || self.consts.contains_key(name) {
            self.error(
                ErrorCode::SHADOWED_GLOBAL,
                format!("local '{name}' shadows a global of the same name"),
                var.name.span,
            );
            return Ok(());
        }
        if var.ty.is_void() {
            self.error(
                ErrorCode::UNKNOWN_TYPE,
                format!("local '{name}' cannot have type Void"),
                var.span,
            );
            return Ok(());
        }
        if var.ty.is_array() {
            return self.emit_array_local(f, var);
        }

        let storage = self.place_local(f, var.span)?;
        *f.locals.add(name.as_str()) = Local {
            ty: var.ty,
            storage,
            initialized: false,
            is_param: false,
            span: var.span,
        };

        if let Some(init) = &var.init {
            let value = self.emit_value(f, init)?;
            if !value.is_error() {
                if var.ty.accepts(&value.ty, value.int_constant().is_some()) {
                    self.store_local(f, storage, value)?;
                } else {
                    self.error(
                        ErrorCode::TYPE_MISMATCH,
                        format!(
                            "cannot initialize '{name}' of type {} with a value of type {}",
                            var.ty, value.ty
                        ),
                        init.span,
                    );
                    self.discard(f, value);
                }
            }
            // Marked even on error so later uses do not report twice.
            mark_initialized(f, name);
        }
        Ok(())
    }

    fn store_local(
        &mut self,
        f: &mut FuncState,
        storage: LocalStorage,
        value: TmpValue,
    ) -> CodegenResult<()> {
        match storage {
            LocalStorage::Register(reg) => self.load_into(f, reg, value),
            LocalStorage::Stack(slot) => {
                let op = self.operand(f, value)?;
                assembler::local_set(&mut f.code, op.index(), slot);
                self.release(f, op);
                Ok(())
            }
        }
    }

    /// `var a: Int[n] = [..];` creates the array and fills it in order.
    fn emit_array_local(&mut self, f: &mut FuncState, var: &VarDecl) -> CodegenResult<()> {
        let name = &var.name.name;
        let items: &[Expr] = match var.init.as_ref().map(|e| &e.peel().kind) {
            None => &[],
            Some(ExprKind::ArrayList(items)) => items.as_slice(),
            Some(_) => {
                self.error(
                    ErrorCode::NOT_IMPLEMENTED,
                    format!("array '{name}' can only be initialized with an array literal"),
                    var.span,
                );
                return Ok(());
            }
        };

        let declared = var.ty.array_len as usize;
        if declared > 0 && items.len() > declared {
            self.error(
                ErrorCode::TYPE_MISMATCH,
                format!(
                    "array '{name}' holds {declared} element(s) but the initializer has {}",
                    items.len()
                ),
                var.span,
            );
            return Ok(());
        }
        let len = if declared > 0 { declared } else { items.len() };
        if len == 0 {
            self.error(
                ErrorCode::TYPE_MISMATCH,
                format!("array '{name}' needs a length or a non-empty initializer"),
                var.span,
            );
            return Ok(());
        }
        if len > u16::MAX as usize {
            self.error(
                ErrorCode::LIMIT_EXCEEDED,
                format!("array '{name}' of {len} elements is too large"),
                var.span,
            );
            return Ok(());
        }

        // Stack slots start zeroed, so the epilogue can free the handle even
        // on a path that never created the array.
        let LocalStorage::Stack(slot) = self.stack_slot(f, var.span)? else {
            return Err(CodegenError::Internal("array local placed in a register".into()));
        };
        let mut ty = var.ty;
        ty.array_len = len as u32;
        *f.locals.add(name.as_str()) = Local {
            ty,
            storage: LocalStorage::Stack(slot),
            initialized: false,
            is_param: false,
            span: var.span,
        };

        let handle = f.alloc()?;
        let count = f.alloc()?;
        assembler::load_int(&mut f.code, count.index(), len as u64);
        f.code.emit(Instruction::ArrayNew {
            dst: handle.index(),
            len: count.index(),
        });
        f.pool.free(count);

        let elem = ty.element();
        for (i, item) in items.iter().enumerate() {
            let value = self.emit_value(f, item)?;
            if value.is_error() {
                continue;
            }
            if !elem.accepts(&value.ty, value.int_constant().is_some()) {
                self.error(
                    ErrorCode::TYPE_MISMATCH,
                    format!(
                        "element {i} of '{name}' must be {elem}, found {}",
                        value.ty
                    ),
                    item.span,
                );
                self.discard(f, value);
                continue;
            }
            let v = self.operand(f, value)?;
            let index = f.alloc()?;
            assembler::load_int(&mut f.code, index.index(), i as u64);
            f.code.emit(Instruction::ArraySet {
                array: handle.index(),
                index: index.index(),
                value: v.index(),
            });
            f.pool.free(index);
            self.release(f, v);
        }

        assembler::local_set(&mut f.code, handle.index(), slot);
        f.pool.free(handle);
        mark_initialized(f, name);
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Assignment
    // ══════════════════════════════════════════════════════════════════════════

    fn emit_assign(&mut self, f: &mut FuncState, assign: &AssignStmt) -> CodegenResult<()> {
        match &assign.target.peel().kind {
            ExprKind::Identifier(name) => {
                self.assign_name(f, name, assign.target.span, &assign.value)
            }
            ExprKind::Index { array, index } => {
                self.assign_element(f, array, index, &assign.value, assign.span)
            }
            // The parser already reported the bad target.
            _ => Ok(()),
        }
    }

    fn assign_name(
        &mut self,
        f: &mut FuncState,
        name: &str,
        span: Span,
        value: &Expr,
    ) -> CodegenResult<()> {
        if let Some(local) = f.locals.lookup(name) {
            let (ty, storage, initialized) = (local.ty, local.storage, local.initialized);
            if ty.is_array() {
                self.error(
                    ErrorCode::NOT_IMPLEMENTED,
                    format!("cannot assign to the whole array '{name}'"),
                    span,
                );
                return Ok(());
            }
            if ty.is_const() && initialized {
                self.error(
                    ErrorCode::INVALID_ASSIGN_TARGET,
                    format!("cannot assign to constant '{name}'"),
                    span,
                );
                return Ok(());
            }
            let v = self.emit_value(f, value)?;
            if !v.is_error() {
                if ty.accepts(&v.ty, v.int_constant().is_some()) {
                    self.store_local(f, storage, v)?;
                } else {
                    self.error(
                        ErrorCode::TYPE_MISMATCH,
                        format!("cannot assign a value of type {} to '{name}' of type {ty}", v.ty),
                        value.span,
                    );
                    self.discard(f, v);
                }
            }
            mark_initialized(f, name);
            return Ok(());
        }

        if let Some(index) = self.globals.find(name) {
            let ty = match self.globals.get(index) {
                Some(global) => global.ty,
                None => return Ok(()),
            };
            if ty.is_const() {
                self.error(
                    ErrorCode::INVALID_ASSIGN_TARGET,
                    format!("cannot assign to constant '{name}'"),
                    span,
                );
                return Ok(());
            }
            let v = self.emit_value(f, value)?;
            if v.is_error() {
                return Ok(());
            }
            if !ty.accepts(&v.ty, v.int_constant().is_some()) {
                self.error(
                    ErrorCode::TYPE_MISMATCH,
                    format!("cannot assign a value of type {} to '{name}' of type {ty}", v.ty),
                    value.span,
                );
                self.discard(f, v);
                return Ok(());
            }
            let op = self.operand(f, v)?;
            assembler::global_set(&mut f.code, op.index(), index as u32);
            self.release(f, op);
            return Ok(());
        }

        if self.consts.contains_key(name) {
            self.error(
                ErrorCode::INVALID_ASSIGN_TARGET,
                format!("cannot assign to constant '{name}'"),
                span,
            );
        } else {
            self.error(
                ErrorCode::UNDEFINED_IDENTIFIER,
                format!("undefined identifier '{name}'"),
                span,
            );
        }
        Ok(())
    }

    fn assign_element(
        &mut self,
        f: &mut FuncState,
        array: &Expr,
        index: &Expr,
        value: &Expr,
        span: Span,
    ) -> CodegenResult<()> {
        let (a, i) = self.emit_operands(f, array, index)?;
        let i = self.read_before(f, i, value)?;
        let v = self.emit_value(f, value)?;
        if a.is_error() || i.is_error() || v.is_error() {
            self.discard(f, a);
            self.discard(f, i);
            self.discard(f, v);
            return Ok(());
        }
        if !self.check_element_access(&a.ty, &i, span) {
            self.discard(f, a);
            self.discard(f, i);
            self.discard(f, v);
            return Ok(());
        }
        let elem = a.ty.element();
        if !elem.accepts(&v.ty, v.int_constant().is_some()) {
            self.error(
                ErrorCode::TYPE_MISMATCH,
                format!("cannot store a value of type {} into an array of {elem}", v.ty),
                value.span,
            );
            self.discard(f, a);
            self.discard(f, i);
            self.discard(f, v);
            return Ok(());
        }

        let a = self.operand(f, a)?;
        let i = self.operand(f, i)?;
        let v = self.operand(f, v)?;
        f.code.emit(Instruction::ArraySet {
            array: a.index(),
            index: i.index(),
            value: v.index(),
        });
        self.release(f, v);
        self.release(f, i);
        self.release(f, a);
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Control flow
    // ══════════════════════════════════════════════════════════════════════════

    fn emit_return(&mut self, f: &mut FuncState, ret: &ReturnStmt, tail: Tail) -> CodegenResult<()> {
        f.returns += 1;
        match &ret.value {
            None if !f.ret.is_void() => {
                self.error(
                    ErrorCode::TYPE_MISMATCH,
                    format!("'{}' must return a value of type {}", f.name, f.ret),
                    ret.span,
                );
            }
            None => {}
            Some(expr) if f.ret.is_void() => {
                self.error(
                    ErrorCode::TYPE_MISMATCH,
                    format!("'{}' does not return a value", f.name),
                    expr.span,
                );
            }
            Some(expr) => {
                let value = self.emit_value(f, expr)?;
                if !value.is_error() {
                    if !f.ret.accepts(&value.ty, value.int_constant().is_some()) {
                        self.error(
                            ErrorCode::TYPE_MISMATCH,
                            format!(
                                "'{}' returns {}, found a value of type {}",
                                f.name, f.ret, value.ty
                            ),
                            expr.span,
                        );
                        self.discard(f, value);
                    } else {
                        let direct = tail == Tail::Body && f.end_jumps == 0 && !f.has_owned_arrays();
                        match value.place {
                            Place::Local { slot } if direct => {
                                f.code.emit(Instruction::RetLocal { slot });
                                f.epilogue_done = true;
                                return Ok(());
                            }
                            _ => self.load_into(f, RETURN_REG, value)?,
                        }
                    }
                }
            }
        }

        if tail == Tail::No {
            assembler::jump(&mut f.code, Cond::Always, f.end_label);
            f.end_jumps += 1;
        }
        Ok(())
    }

    fn emit_if(&mut self, f: &mut FuncState, stmt: &IfStmt, tail: Tail) -> CodegenResult<()> {
        let else_label = f.code.new_label();

        let cond = self.emit_expr(f, &stmt.cond)?;
        match cond.place {
            Place::Flags => {
                let op = cond
                    .last_op
                    .ok_or_else(|| CodegenError::Internal("flags without a comparison".into()))?;
                assembler::jump(&mut f.code, flag_cond(op).negate(), else_label);
            }
            Place::Error => {}
            Place::Void => {
                self.error(
                    ErrorCode::TYPE_MISMATCH,
                    "the condition does not produce a value",
                    stmt.cond.span,
                );
            }
            _ if !cond.ty.is_scalar() || cond.ty.is_float() => {
                self.error(
                    ErrorCode::INVALID_OPERAND,
                    format!("a condition of type {} cannot be tested", cond.ty),
                    stmt.cond.span,
                );
                self.discard(f, cond);
            }
            _ => {
                let op = self.operand(f, cond)?;
                assembler::test_zero(&mut f.code, op.index());
                self.release(f, op);
                assembler::jump(&mut f.code, Cond::Eq, else_label);
            }
        }

        let tail = tail != Tail::No;
        match &stmt.else_branch {
            None => {
                self.emit_block(f, &stmt.then_block, tail)?;
                f.code.bind(else_label);
            }
            Some(branch) => {
                let end_label = f.code.new_label();
                self.emit_block(f, &stmt.then_block, false)?;
                if !block_ends_in_return(&stmt.then_block) {
                    assembler::jump(&mut f.code, Cond::Always, end_label);
                }
                f.code.bind(else_label);
                match branch {
                    ElseBranch::Elif(inner) => {
                        let inner_tail = if tail { Tail::Nested } else { Tail::No };
                        self.emit_if(f, inner, inner_tail)?;
                    }
                    ElseBranch::Else(block) => self.emit_block(f, block, tail)?,
                }
                f.code.bind(end_label);
            }
        }
        Ok(())
    }
}

fn mark_initialized(f: &mut FuncState, name: &str) {
    if let Some(index) = f.locals.find(name) {
        if let Some(local) = f.locals.get_mut(index) {
            local.initialized = true;
        }
    }
}

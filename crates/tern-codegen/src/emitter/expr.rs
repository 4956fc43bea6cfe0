//! Expression lowering.
//!
//! Every expression becomes a [`TmpValue`] saying where its result lives.
//! Constants, locals and globals stay where they are until an instruction
//! needs them in a register; comparisons leave their outcome in the flags
//! so an enclosing `if` can jump on it directly.

use tern_bytecode::{ArithOp, Instruction, NumKind};
use tern_types::ast::{BinOp, Expr, ExprKind, UnaryOp};
use tern_types::{ErrorCode, Primitive, Span, TypeDecl};

use super::{Emitter, FuncState, Operand};
use crate::assembler::{self, immediate_width};
use crate::error::CodegenResult;
use crate::function::LocalStorage;
use crate::tmp_value::{Place, TmpValue};

impl<'a> Emitter<'a> {
    /// Lower `expr`. The result may be [`Place::Flags`] or [`Place::Void`].
    pub(crate) fn emit_expr(&mut self, f: &mut FuncState, expr: &Expr) -> CodegenResult<TmpValue> {
        match &expr.kind {
            // ── Literals ──────────────────────────────────────────────────────
            ExprKind::IntLit(v) => Ok(TmpValue::constant(
                *v,
                TypeDecl::int_literal(immediate_width(*v)),
            )),
            ExprKind::FloatLit(x) => Ok(TmpValue::constant(x.to_bits(), TypeDecl::float())),
            ExprKind::StringLit(s) => {
                let index = self.intern(s, expr.span);
                Ok(TmpValue::constant(index as u64, TypeDecl::const_string()))
            }

            // ── Names ─────────────────────────────────────────────────────────
            ExprKind::Identifier(name) => Ok(self.emit_identifier(f, name, expr.span)),
            ExprKind::Group(inner) => self.emit_expr(f, inner),

            // ── Calls ─────────────────────────────────────────────────────────
            ExprKind::Call { callee, args } => self.emit_call(f, callee, args, expr.span),

            // ── Operators ─────────────────────────────────────────────────────
            ExprKind::Binary { left, op, right } if op.is_comparison() => {
                self.emit_comparison(f, left, *op, right, expr.span)
            }
            ExprKind::Binary { left, op, right } => self.emit_arith(f, left, *op, right, expr.span),
            ExprKind::Unary { op, operand } => self.emit_unary(f, *op, operand, expr.span),

            // ── Arrays ────────────────────────────────────────────────────────
            ExprKind::Index { array, index } => self.emit_index(f, array, index, expr.span),
            ExprKind::ArrayList(_) => {
                self.error(
                    ErrorCode::NOT_IMPLEMENTED,
                    "array literals are only supported as the initializer of an array variable",
                    expr.span,
                );
                Ok(TmpValue::error())
            }
            ExprKind::Dot { field, .. } => {
                self.error(
                    ErrorCode::NOT_IMPLEMENTED,
                    format!("field access '.{}' is not supported", field.name),
                    field.span,
                );
                Ok(TmpValue::error())
            }
        }
    }

    /// Lower `expr` where a value is required: comparisons and calls to
    /// void functions are reported and become errors.
    pub(crate) fn emit_value(&mut self, f: &mut FuncState, expr: &Expr) -> CodegenResult<TmpValue> {
        let value = self.emit_expr(f, expr)?;
        match value.place {
            Place::Flags => {
                self.error(
                    ErrorCode::NOT_IMPLEMENTED,
                    "a comparison can only be used as an 'if' condition",
                    expr.span,
                );
                Ok(TmpValue::error())
            }
            Place::Void => {
                self.error(
                    ErrorCode::TYPE_MISMATCH,
                    "this call does not return a value",
                    expr.span,
                );
                Ok(TmpValue::error())
            }
            _ => Ok(value),
        }
    }

    fn emit_identifier(&mut self, f: &mut FuncState, name: &str, span: Span) -> TmpValue {
        if let Some(local) = f.locals.lookup(name) {
            if !local.initialized {
                self.error(
                    ErrorCode::UNINITIALIZED_LOCAL,
                    format!("local '{name}' is used before it is initialized"),
                    span,
                );
                return TmpValue::error();
            }
            let place = match local.storage {
                LocalStorage::Register(reg) => Place::LocalRegister { reg },
                LocalStorage::Stack(slot) => Place::Local { slot },
            };
            return TmpValue::new(place, local.ty);
        }
        if let Some(index) = self.globals.find(name) {
            if let Some(global) = self.globals.get(index) {
                return TmpValue::new(
                    Place::Global {
                        index: index as u32,
                    },
                    global.ty,
                );
            }
        }
        if let Some(c) = self.consts.get(name) {
            return TmpValue::constant(c.bits, c.ty);
        }
        let message = if self.functions.find(name).is_some() {
            format!("'{name}' is a function and cannot be used as a value")
        } else {
            format!("undefined identifier '{name}'")
        };
        self.error(ErrorCode::UNDEFINED_IDENTIFIER, message, span);
        TmpValue::error()
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Binary operators
    // ══════════════════════════════════════════════════════════════════════════

    /// Evaluate both operands, left first.
    pub(crate) fn emit_operands(
        &mut self,
        f: &mut FuncState,
        left: &Expr,
        right: &Expr,
    ) -> CodegenResult<(TmpValue, TmpValue)> {
        let l = self.emit_value(f, left)?;
        let l = self.read_before(f, l, right)?;
        let r = self.emit_value(f, right)?;
        Ok((l, r))
    }

    /// A call in `later` could store to a global `value` names; read it now.
    pub(crate) fn read_before(
        &mut self,
        f: &mut FuncState,
        value: TmpValue,
        later: &Expr,
    ) -> CodegenResult<TmpValue> {
        if !matches!(value.place, Place::Global { .. }) || !contains_call(later) {
            return Ok(value);
        }
        let ty = value.ty;
        Ok(match self.operand(f, value)? {
            Operand::Owned(reg) => TmpValue::new(Place::Register(reg), ty),
            Operand::Borrowed(reg) => TmpValue::new(Place::LocalRegister { reg }, ty),
        })
    }

    /// Common type of a binary operation, or `None` after reporting.
    fn binary_type(&mut self, l: &TmpValue, op: BinOp, r: &TmpValue, span: Span) -> Option<TypeDecl> {
        let numeric = |t: &TypeDecl| t.is_scalar() && !t.is_void() && t.primitive != Primitive::Unknown;
        if !numeric(&l.ty) || !numeric(&r.ty) {
            self.error(
                ErrorCode::INVALID_OPERAND,
                format!(
                    "operator '{}' needs numeric operands, found {} and {}",
                    op.symbol(),
                    l.ty,
                    r.ty
                ),
                span,
            );
            return None;
        }
        if l.ty == r.ty {
            return Some(TypeDecl::new(l.ty.primitive));
        }
        if l.ty.primitive == Primitive::Any || r.ty.primitive == Primitive::Any {
            return Some(TypeDecl::any());
        }
        if l.int_constant().is_some() && r.ty.is_integer() {
            return Some(TypeDecl::new(r.ty.primitive));
        }
        if r.int_constant().is_some() && l.ty.is_integer() {
            return Some(TypeDecl::new(l.ty.primitive));
        }
        self.error(
            ErrorCode::TYPE_MISMATCH,
            format!(
                "mismatched operand types {} and {} for '{}'",
                l.ty,
                r.ty,
                op.symbol()
            ),
            span,
        );
        None
    }

    fn emit_arith(
        &mut self,
        f: &mut FuncState,
        left: &Expr,
        op: BinOp,
        right: &Expr,
        span: Span,
    ) -> CodegenResult<TmpValue> {
        let (l, r) = self.emit_operands(f, left, right)?;
        if l.is_error() || r.is_error() {
            self.discard(f, l);
            self.discard(f, r);
            return Ok(TmpValue::error());
        }
        let Some(ty) = self.binary_type(&l, op, &r, span) else {
            self.discard(f, l);
            self.discard(f, r);
            return Ok(TmpValue::error());
        };

        let arith_op = match op {
            BinOp::Add => ArithOp::Add,
            BinOp::Sub => ArithOp::Sub,
            BinOp::Mul => ArithOp::Mul,
            _ => ArithOp::Div,
        };
        let kind = assembler::num_kind(&ty);

        let left = self.operand(f, l)?;
        let (dst, src) = match left {
            Operand::Owned(reg) => {
                let idx = reg.index();
                (reg, idx)
            }
            Operand::Borrowed(idx) => (f.alloc()?, idx),
        };

        let imm = if kind == NumKind::Float {
            None
        } else {
            r.int_constant()
        };
        let done = match imm {
            Some(value) => assembler::arith_imm(&mut f.code, arith_op, dst.index(), src, value),
            None => false,
        };
        if !done {
            let right = self.operand(f, r)?;
            assembler::arith(&mut f.code, arith_op, kind, dst.index(), src, right.index());
            self.release(f, right);
        }

        let mut result = TmpValue::new(Place::Register(dst), ty);
        result.last_op = Some(op);
        Ok(result)
    }

    fn emit_comparison(
        &mut self,
        f: &mut FuncState,
        left: &Expr,
        op: BinOp,
        right: &Expr,
        span: Span,
    ) -> CodegenResult<TmpValue> {
        let (l, r) = self.emit_operands(f, left, right)?;
        if l.is_error() || r.is_error() {
            self.discard(f, l);
            self.discard(f, r);
            return Ok(TmpValue::error());
        }
        let Some(ty) = self.binary_type(&l, op, &r, span) else {
            self.discard(f, l);
            self.discard(f, r);
            return Ok(TmpValue::error());
        };

        // `testz` is a signed test, so unsigned ordering against zero keeps
        // the full compare.
        let zero_test_ok = !ty.is_unsigned() || matches!(op, BinOp::Eq | BinOp::NotEq);
        let flags_op = if zero_test_ok && r.int_constant() == Some(0) {
            let a = self.operand(f, l)?;
            assembler::test_zero(&mut f.code, a.index());
            self.release(f, a);
            op
        } else if zero_test_ok && l.int_constant() == Some(0) {
            let b = self.operand(f, r)?;
            assembler::test_zero(&mut f.code, b.index());
            self.release(f, b);
            op.mirror()
        } else {
            let a = self.operand(f, l)?;
            let b = self.operand(f, r)?;
            assembler::compare(&mut f.code, &ty, a.index(), b.index());
            self.release(f, b);
            self.release(f, a);
            op
        };

        let mut result = TmpValue::new(Place::Flags, TypeDecl::int());
        result.last_op = Some(flags_op);
        Ok(result)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Unary operators
    // ══════════════════════════════════════════════════════════════════════════

    fn emit_unary(
        &mut self,
        f: &mut FuncState,
        op: UnaryOp,
        operand: &Expr,
        span: Span,
    ) -> CodegenResult<TmpValue> {
        if op == UnaryOp::Not {
            self.error(
                ErrorCode::NOT_IMPLEMENTED,
                "logical '!' is not supported",
                span,
            );
            return Ok(TmpValue::error());
        }

        // Negated literals fold to a 64-bit constant.
        match &operand.peel().kind {
            ExprKind::IntLit(v) => {
                return Ok(TmpValue::constant(
                    (*v as i64).wrapping_neg() as u64,
                    TypeDecl::int(),
                ))
            }
            ExprKind::FloatLit(x) => {
                return Ok(TmpValue::constant((-x).to_bits(), TypeDecl::float()))
            }
            _ => {}
        }

        let value = self.emit_value(f, operand)?;
        if value.is_error() {
            return Ok(value);
        }
        let ty = value.ty;
        let numeric = ty.is_integer() || ty.is_float() || (ty.is_scalar() && ty.primitive == Primitive::Any);
        if !numeric {
            self.error(
                ErrorCode::NOT_IMPLEMENTED,
                format!("unary '-' is not supported on {ty}"),
                span,
            );
            self.discard(f, value);
            return Ok(TmpValue::error());
        }

        let src = self.operand(f, value)?;
        let (dst, src_idx) = match src {
            Operand::Owned(reg) => {
                let idx = reg.index();
                (reg, idx)
            }
            Operand::Borrowed(idx) => (f.alloc()?, idx),
        };
        assembler::negate(&mut f.code, &ty, dst.index(), src_idx);
        Ok(TmpValue::new(Place::Register(dst), TypeDecl::new(ty.primitive)))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Arrays
    // ══════════════════════════════════════════════════════════════════════════

    fn emit_index(
        &mut self,
        f: &mut FuncState,
        array: &Expr,
        index: &Expr,
        span: Span,
    ) -> CodegenResult<TmpValue> {
        let (a, i) = self.emit_operands(f, array, index)?;
        if a.is_error() || i.is_error() {
            self.discard(f, a);
            self.discard(f, i);
            return Ok(TmpValue::error());
        }
        if !self.check_element_access(&a.ty, &i, span) {
            self.discard(f, a);
            self.discard(f, i);
            return Ok(TmpValue::error());
        }

        let elem = a.ty.element();
        let arr = self.operand(f, a)?;
        let idx = self.operand(f, i)?;
        let dst = f.alloc()?;
        f.code.emit(Instruction::ArrayGet {
            dst: dst.index(),
            array: arr.index(),
            index: idx.index(),
        });
        self.release(f, idx);
        self.release(f, arr);
        Ok(TmpValue::new(Place::Register(dst), elem))
    }

    /// Report unless `array_ty` is an array and `index` an integer.
    pub(crate) fn check_element_access(&mut self, array_ty: &TypeDecl, index: &TmpValue, span: Span) -> bool {
        if !array_ty.is_array() {
            self.error(
                ErrorCode::INVALID_OPERAND,
                format!("cannot index a value of type {array_ty}"),
                span,
            );
            return false;
        }
        let index_ok = index.ty.is_integer() || (index.ty.is_scalar() && index.ty.primitive == Primitive::Any);
        if !index_ok {
            self.error(
                ErrorCode::TYPE_MISMATCH,
                format!("array index must be an integer, found {}", index.ty),
                span,
            );
            return false;
        }
        true
    }
}

/// Whether evaluating `expr` may call a function.
pub(crate) fn contains_call(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Call { .. } => true,
        ExprKind::Group(inner) => contains_call(inner),
        ExprKind::Binary { left, right, .. } => contains_call(left) || contains_call(right),
        ExprKind::Unary { operand, .. } => contains_call(operand),
        ExprKind::Index { array, index } => contains_call(array) || contains_call(index),
        ExprKind::Dot { object, .. } => contains_call(object),
        ExprKind::ArrayList(items) => items.iter().any(contains_call),
        ExprKind::IntLit(_)
        | ExprKind::FloatLit(_)
        | ExprKind::StringLit(_)
        | ExprKind::Identifier(_) => false,
    }
}

//! Call sites.
//!
//! Live temporaries are pushed around the call. Register arguments that
//! need scratch registers to compute go through the stack as well, so a
//! later argument can never clobber `rN` before the call; arguments that
//! load directly (constants and stack locals) are written into their
//! register last.

use tern_types::ast::{Expr, Ident};
use tern_types::{ErrorCode, Span};

use super::{Emitter, FuncState};
use crate::assembler;
use crate::error::CodegenResult;
use crate::registers::RETURN_REG;
use crate::tmp_value::{Place, TmpValue};

impl<'a> Emitter<'a> {
    pub(crate) fn emit_call(
        &mut self,
        f: &mut FuncState,
        callee: &Ident,
        args: &[Expr],
        span: Span,
    ) -> CodegenResult<TmpValue> {
        let name = &callee.name;
        let Some(index) = self.functions.find(name) else {
            self.error(
                ErrorCode::UNDEFINED_FUNCTION,
                format!("call to undefined function '{name}'"),
                callee.span,
            );
            return Ok(TmpValue::error());
        };
        let (params, register_args, ret) = match self.functions.get(index) {
            Some(func) => (func.params.clone(), func.register_args as usize, func.ret),
            None => return Ok(TmpValue::error()),
        };
        if params.len() != args.len() {
            self.error(
                ErrorCode::WRONG_ARG_COUNT,
                format!(
                    "'{name}' takes {} argument(s), found {}",
                    params.len(),
                    args.len()
                ),
                span,
            );
            return Ok(TmpValue::error());
        }

        let spilled = f.pool.allocated();
        for &reg in &spilled {
            assembler::push(&mut f.code, reg);
        }

        let mut failed = false;
        let mut deferred: Vec<(u8, TmpValue)> = Vec::new();
        let mut popped: Vec<u8> = Vec::new();

        // Right to left: the last stack argument ends up deepest.
        for (i, arg) in args.iter().enumerate().rev() {
            let value = self.emit_value(f, arg)?;
            if value.is_error() {
                failed = true;
                continue;
            }
            let expected = params[i];
            if !expected.accepts(&value.ty, value.int_constant().is_some()) {
                self.error(
                    ErrorCode::TYPE_MISMATCH,
                    format!(
                        "argument {} of '{name}' expects {expected}, found {}",
                        i + 1,
                        value.ty
                    ),
                    arg.span,
                );
                self.discard(f, value);
                failed = true;
                continue;
            }

            if i >= register_args {
                let op = self.operand(f, value)?;
                assembler::push(&mut f.code, op.index());
                self.release(f, op);
            } else if value.is_direct_load() {
                deferred.push((i as u8 + 1, value));
            } else {
                let op = self.operand(f, value)?;
                assembler::push(&mut f.code, op.index());
                self.release(f, op);
                popped.push(i as u8 + 1);
            }
        }

        for &reg in popped.iter().rev() {
            assembler::pop(&mut f.code, reg);
        }
        for (reg, value) in deferred {
            if failed {
                self.discard(f, value);
            } else {
                self.load_into(f, reg, value)?;
            }
        }

        if failed {
            for &reg in spilled.iter().rev() {
                assembler::pop(&mut f.code, reg);
            }
            return Ok(TmpValue::error());
        }

        assembler::call(&mut f.code, index as u32);

        let result = if ret.is_void() {
            TmpValue::new(Place::Void, ret)
        } else {
            let dst = f.alloc()?;
            assembler::mov(&mut f.code, dst.index(), RETURN_REG);
            TmpValue::new(Place::Register(dst), ret)
        };
        for &reg in spilled.iter().rev() {
            assembler::pop(&mut f.code, reg);
        }
        Ok(result)
    }
}

//! First pass: globals, constants, function signatures and the entry point.

use tern_types::ast::{ConstDecl, Expr, ExprKind, FunctionDecl, Item, Program, UnaryOp, VarDecl};
use tern_types::{ErrorCode, Primitive, Span, TypeDecl};
use tracing::trace;

use super::{needs_entry, Emitter};
use crate::assembler::immediate_width;
use crate::function::{
    CallingConvention, ConstValue, Function, Global, Local, LocalStorage, NativeLink,
};
use crate::registers::MAX_REGISTER_ARGS;
use crate::symbol_table::SymbolTable;

impl<'a> Emitter<'a> {
    pub(crate) fn predeclare(&mut self, program: &Program) {
        for item in &program.items {
            match item {
                Item::Var(var) => self.declare_global(var),
                Item::Const(c) => self.declare_const(c),
                Item::Function(_) => {}
            }
        }
        for decl in program.functions() {
            let slot = self.declare_function(decl);
            self.declared.push(slot);
        }
        self.resolve_entry(program.span);
    }

    fn name_taken(&self, name: &str) -> bool {
        self.functions.find(name).is_some()
            || self.globals.find(name).is_some()
            || self.consts.contains_key(name)
    }

    // ── Globals and constants ────────────────────────────────────────────

    fn declare_global(&mut self, var: &VarDecl) {
        let name = &var.name.name;
        if self.name_taken(name) {
            self.error(
                ErrorCode::REDEFINITION,
                format!("'{name}' is already defined"),
                var.name.span,
            );
            return;
        }
        if var.ty.is_void() {
            self.error(
                ErrorCode::UNKNOWN_TYPE,
                format!("global '{name}' cannot have type Void"),
                var.span,
            );
            return;
        }
        if var.ty.is_array() {
            self.error(
                ErrorCode::NOT_IMPLEMENTED,
                format!("global '{name}': array globals are not supported"),
                var.span,
            );
            return;
        }

        let bits = match &var.init {
            None => 0,
            Some(init) => self
                .literal_value(init, &var.ty, name, false)
                .unwrap_or(0),
        };
        trace!(global = %name, bits, "global declared");
        *self.globals.add(name.as_str()) = Global {
            ty: var.ty,
            bits,
            span: var.span,
        };
    }

    fn declare_const(&mut self, decl: &ConstDecl) {
        let name = &decl.name.name;
        if self.name_taken(name) {
            self.error(
                ErrorCode::REDEFINITION,
                format!("'{name}' is already defined"),
                decl.name.span,
            );
            return;
        }
        if let Some(bits) = self.literal_value(&decl.value, &decl.ty, name, true) {
            self.consts.insert(
                name.clone(),
                ConstValue {
                    ty: decl.ty,
                    bits,
                },
            );
        }
    }

    /// Raw bits of a literal initializer, checked against `ty`.
    fn literal_value(
        &mut self,
        init: &Expr,
        ty: &TypeDecl,
        name: &str,
        allow_strings: bool,
    ) -> Option<u64> {
        let (bits, lit_ty) = match &init.peel().kind {
            ExprKind::IntLit(v) => (*v, TypeDecl::int_literal(immediate_width(*v))),
            ExprKind::FloatLit(x) => (x.to_bits(), TypeDecl::float()),
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => match &operand.peel().kind {
                ExprKind::IntLit(v) => ((*v as i64).wrapping_neg() as u64, TypeDecl::int()),
                ExprKind::FloatLit(x) => ((-x).to_bits(), TypeDecl::float()),
                _ => return self.bad_initializer(name, init.span),
            },
            ExprKind::StringLit(s) if allow_strings => {
                (self.intern(s, init.span) as u64, TypeDecl::const_string())
            }
            _ => return self.bad_initializer(name, init.span),
        };

        if !ty.accepts(&lit_ty, lit_ty.is_integer()) {
            self.error(
                ErrorCode::TYPE_MISMATCH,
                format!("cannot initialize '{name}' of type {ty} with a value of type {lit_ty}"),
                init.span,
            );
            return None;
        }
        if ty.is_scalar() && ty.primitive == Primitive::Byte && bits > u8::MAX as u64 {
            self.error(
                ErrorCode::TYPE_MISMATCH,
                format!("value {bits} does not fit in Byte '{name}'"),
                init.span,
            );
            return None;
        }
        Some(bits)
    }

    fn bad_initializer(&mut self, name: &str, span: Span) -> Option<u64> {
        self.error(
            ErrorCode::INVALID_GLOBAL_INITIALIZER,
            format!("'{name}' must be initialized with a literal"),
            span,
        );
        None
    }

    // ── Functions ────────────────────────────────────────────────────────

    fn declare_function(&mut self, decl: &FunctionDecl) -> Option<usize> {
        let name = &decl.name.name;
        // Prototypes are ignored; calls resolve against the definition.
        if decl.body.is_none() && !decl.is_extern() {
            return None;
        }
        if self.name_taken(name) {
            self.error(
                ErrorCode::REDEFINITION,
                format!("'{name}' is already defined"),
                decl.name.span,
            );
            return None;
        }

        let native = decl.extern_attr.as_ref().map(|attr| {
            let symbol = attr.symbol.as_deref().unwrap_or(name.as_str());
            NativeLink {
                library: self.intern(&attr.library, attr.span),
                symbol: self.intern(symbol, attr.span),
            }
        });

        let count = decl.params.len();
        let convention = if native.is_some() {
            if count > MAX_REGISTER_ARGS as usize {
                self.error(
                    ErrorCode::LIMIT_EXCEEDED,
                    format!(
                        "extern function '{name}' takes {count} parameters; at most {MAX_REGISTER_ARGS} are supported"
                    ),
                    decl.span,
                );
            }
            CallingConvention::Register
        } else {
            CallingConvention::select(count, self.optimize())
        };
        let register_args = convention.register_args(count);
        let Ok(stack_args) = u16::try_from(count - register_args as usize) else {
            self.error(
                ErrorCode::LIMIT_EXCEEDED,
                format!("function '{name}' has too many parameters"),
                decl.span,
            );
            return None;
        };

        let mut func = Function {
            ret: decl.ret,
            params: decl.params.iter().map(|p| p.ty).collect(),
            locals: SymbolTable::new(),
            convention,
            register_args,
            stack_args,
            native,
            span: decl.span,
        };

        for (p, param) in decl.params.iter().enumerate() {
            let pname = &param.name.name;
            if func.locals.find(pname).is_some() {
                self.error(
                    ErrorCode::REDEFINITION,
                    format!("parameter '{pname}' is declared twice"),
                    param.name.span,
                );
            } else if self.globals.find(pname).is_some() {
                self.error(
                    ErrorCode::SHADOWED_GLOBAL,
                    format!("parameter '{pname}' shadows a global of the same name"),
                    param.name.span,
                );
            }
            if param.ty.is_void() {
                self.error(
                    ErrorCode::UNKNOWN_TYPE,
                    format!("parameter '{pname}' cannot have type Void"),
                    param.span,
                );
            }
            let storage = if p < register_args as usize {
                LocalStorage::Register(p as u8 + 1)
            } else {
                LocalStorage::Stack(func.param_slot(p))
            };
            *func.locals.add(pname.as_str()) = Local {
                ty: param.ty,
                storage,
                initialized: true,
                is_param: true,
                span: param.span,
            };
        }

        trace!(
            function = %name,
            ?convention,
            register_args,
            stack_args,
            native = func.is_native(),
            "function declared"
        );
        *self.functions.add(name.as_str()) = func;
        Some(self.functions.len() - 1)
    }

    fn resolve_entry(&mut self, span: Span) {
        match self.functions.find("Main") {
            Some(index) => {
                let (native, params, main_span) = match self.functions.get(index) {
                    Some(f) => (f.is_native(), f.arg_count(), f.span),
                    None => return,
                };
                if native {
                    self.error(
                        ErrorCode::MISSING_ENTRY_POINT,
                        "'Main' cannot be an extern function",
                        main_span,
                    );
                } else if params > 0 {
                    self.error(
                        ErrorCode::WRONG_ARG_COUNT,
                        format!("'Main' must not take parameters, found {params}"),
                        main_span,
                    );
                }
                self.entry = index as u32;
            }
            None if needs_entry(self.options.file_type) => {
                self.error(
                    ErrorCode::MISSING_ENTRY_POINT,
                    "no 'Main' function; an executable needs an entry point",
                    span,
                );
            }
            None => {}
        }
    }
}

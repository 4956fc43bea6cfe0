//! Where an expression's result lives after lowering.

use tern_types::ast::BinOp;
use tern_types::TypeDecl;

use crate::registers::Reg;

#[derive(Debug)]
pub enum Place {
    /// Lowering failed and a diagnostic was already reported.
    Error,
    /// A call to a function that returns nothing.
    Void,
    /// A temporary owned by this value; it must be freed or moved.
    Register(Reg),
    /// A stack local or stack parameter.
    Local { slot: u16 },
    /// A parameter or local whose home is a register. Read-only here.
    LocalRegister { reg: u8 },
    Global { index: u32 },
    /// Integer, float bits or a string-table index, per the value's type.
    Constant { bits: u64 },
    /// A comparison whose outcome is only in the flags register.
    Flags,
}

#[derive(Debug)]
pub struct TmpValue {
    pub place: Place,
    pub ty: TypeDecl,
    /// Operator that produced the value, when it was a binary op.
    pub last_op: Option<BinOp>,
}

impl TmpValue {
    pub fn new(place: Place, ty: TypeDecl) -> Self {
        Self {
            place,
            ty,
            last_op: None,
        }
    }

    pub fn error() -> Self {
        Self::new(Place::Error, TypeDecl::default())
    }

    pub fn constant(bits: u64, ty: TypeDecl) -> Self {
        Self::new(Place::Constant { bits }, ty)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.place, Place::Error)
    }

    /// An integer constant, usable as an immediate.
    pub fn int_constant(&self) -> Option<u64> {
        match self.place {
            Place::Constant { bits } if self.ty.is_integer() => Some(bits),
            _ => None,
        }
    }

    /// Whether the value can go straight into a numbered register without
    /// touching any other register, and reads nothing a call can change.
    /// Globals are excluded: a call in an earlier argument may store to them.
    pub fn is_direct_load(&self) -> bool {
        matches!(self.place, Place::Constant { .. } | Place::Local { .. })
    }
}

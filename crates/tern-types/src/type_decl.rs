//! Value-type descriptors.
//!
//! A [`TypeDecl`] is a primitive kind plus qualifiers. `size_in_bits` is the
//! width the value needs when encoded; the emitter uses it to pick the
//! narrowest immediate form for constants.

use bitflags::bitflags;
use std::fmt;

/// Primitive kind. The discriminant is the codefile global-table tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Primitive {
    #[default]
    Unknown = 0,
    Void = 1,
    Byte = 2,
    Int = 3,
    UInt = 4,
    Float = 5,
    Any = 6,
}

impl Primitive {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Unknown,
            1 => Self::Void,
            2 => Self::Byte,
            3 => Self::Int,
            4 => Self::UInt,
            5 => Self::Float,
            6 => Self::Any,
            _ => return None,
        })
    }

    /// Look up a primitive by its source keyword.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Void" => Self::Void,
            "Byte" => Self::Byte,
            "Int" => Self::Int,
            "UInt" => Self::UInt,
            "Float" => Self::Float,
            "Any" => Self::Any,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "<unknown>",
            Self::Void => "Void",
            Self::Byte => "Byte",
            Self::Int => "Int",
            Self::UInt => "UInt",
            Self::Float => "Float",
            Self::Any => "Any",
        }
    }

    /// Natural storage width of a scalar of this kind.
    pub fn natural_bits(self) -> u32 {
        match self {
            Self::Unknown | Self::Void => 0,
            Self::Byte => 8,
            Self::Int | Self::UInt | Self::Float | Self::Any => 64,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::Byte | Self::Int | Self::UInt)
    }
}

bitflags! {
    /// Type qualifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u8 {
        const CONST = 1 << 0;
        const PTR = 1 << 1;
        const ARRAY = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TypeDecl {
    pub primitive: Primitive,
    pub flags: TypeFlags,
    pub pointer_depth: u8,
    /// Declared element count for arrays; 0 when taken from the initializer.
    pub array_len: u32,
    pub size_in_bits: u32,
}

impl TypeDecl {
    pub fn new(primitive: Primitive) -> Self {
        Self {
            primitive,
            flags: TypeFlags::empty(),
            pointer_depth: 0,
            array_len: 0,
            size_in_bits: primitive.natural_bits(),
        }
    }

    pub fn void() -> Self {
        Self::new(Primitive::Void)
    }

    pub fn int() -> Self {
        Self::new(Primitive::Int)
    }

    pub fn uint() -> Self {
        Self::new(Primitive::UInt)
    }

    pub fn byte() -> Self {
        Self::new(Primitive::Byte)
    }

    pub fn float() -> Self {
        Self::new(Primitive::Float)
    }

    pub fn any() -> Self {
        Self::new(Primitive::Any)
    }

    /// Type of an integer literal whose magnitude needs `bits` bits.
    pub fn int_literal(bits: u32) -> Self {
        Self {
            size_in_bits: bits,
            ..Self::int()
        }
    }

    /// `const Byte*`, the type of a string literal.
    pub fn const_string() -> Self {
        Self::byte().with_const().pointer_to()
    }

    pub fn with_const(mut self) -> Self {
        self.flags |= TypeFlags::CONST;
        self
    }

    pub fn pointer_to(mut self) -> Self {
        self.flags |= TypeFlags::PTR;
        self.pointer_depth = self.pointer_depth.saturating_add(1);
        self.size_in_bits = 64;
        self
    }

    pub fn array_of(mut self, len: u32) -> Self {
        self.flags |= TypeFlags::ARRAY;
        self.array_len = len;
        self.size_in_bits = 64;
        self
    }

    /// The element type of an array type.
    pub fn element(&self) -> TypeDecl {
        let mut elem = *self;
        elem.flags.remove(TypeFlags::ARRAY);
        elem.array_len = 0;
        elem.size_in_bits = if elem.is_pointer() {
            64
        } else {
            elem.primitive.natural_bits()
        };
        elem
    }

    pub fn is_const(&self) -> bool {
        self.flags.contains(TypeFlags::CONST)
    }

    pub fn is_pointer(&self) -> bool {
        self.flags.contains(TypeFlags::PTR)
    }

    pub fn is_array(&self) -> bool {
        self.flags.contains(TypeFlags::ARRAY)
    }

    pub fn is_void(&self) -> bool {
        self.primitive == Primitive::Void && !self.is_pointer() && !self.is_array()
    }

    /// A plain (non-pointer, non-array) scalar.
    pub fn is_scalar(&self) -> bool {
        !self.is_pointer() && !self.is_array()
    }

    pub fn is_float(&self) -> bool {
        self.is_scalar() && self.primitive == Primitive::Float
    }

    pub fn is_integer(&self) -> bool {
        self.is_scalar() && self.primitive.is_integer()
    }

    pub fn is_unsigned(&self) -> bool {
        self.is_scalar() && matches!(self.primitive, Primitive::UInt | Primitive::Byte)
    }

    /// `Byte` behind one level of `const` pointer or array.
    pub fn is_const_string(&self) -> bool {
        self.primitive == Primitive::Byte
            && self.is_const()
            && self.flags.intersects(TypeFlags::PTR | TypeFlags::ARRAY)
            && self.pointer_depth < 2
    }

    /// Arrays created by a declaration and freed at function exit.
    pub fn is_owned_array(&self) -> bool {
        self.is_array() && !self.is_const()
    }

    /// Whether a value of type `value` may be stored into a slot of this type.
    ///
    /// Integer literals fit any integer slot; `Any` takes everything.
    pub fn accepts(&self, value: &TypeDecl, is_literal: bool) -> bool {
        if self == value {
            return true;
        }
        if self.is_scalar() && self.primitive == Primitive::Any {
            return true;
        }
        if value.is_scalar() && value.primitive == Primitive::Any {
            return true;
        }
        is_literal && self.is_integer() && value.is_integer()
    }
}

impl PartialEq for TypeDecl {
    fn eq(&self, other: &Self) -> bool {
        if self.is_const_string() && other.is_const_string() {
            return true;
        }
        let mask = !TypeFlags::CONST;
        self.primitive == other.primitive
            && (self.flags & mask) == (other.flags & mask)
            && self.pointer_depth == other.pointer_depth
    }
}

impl fmt::Display for TypeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const() {
            f.write_str("const ")?;
        }
        f.write_str(self.primitive.name())?;
        for _ in 0..self.pointer_depth {
            f.write_str("*")?;
        }
        if self.is_array() {
            if self.array_len > 0 {
                write!(f, "[{}]", self.array_len)?;
            } else {
                f.write_str("[]")?;
            }
        }
        Ok(())
    }
}

//! Untagged runtime values.
//!
//! A [`Value`] is eight bytes of payload. Nothing records which
//! interpretation is valid: the instruction reading it decides.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Value(u64);

impl Value {
    pub const ZERO: Value = Value(0);

    pub const fn from_bits(bits: u64) -> Self {
        Value(bits)
    }

    pub const fn from_i64(v: i64) -> Self {
        Value(v as u64)
    }

    pub const fn from_u64(v: u64) -> Self {
        Value(v)
    }

    pub fn from_f64(v: f64) -> Self {
        Value(v.to_bits())
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Value(ptr as usize as u64)
    }

    pub const fn from_handle(handle: u32) -> Self {
        Value(handle as u64)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn as_i64(self) -> i64 {
        self.0 as i64
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    pub fn as_ptr<T>(self) -> *const T {
        self.0 as usize as *const T
    }

    /// An array handle; anything that does not fit is never a live handle.
    pub fn as_handle(self) -> u32 {
        u32::try_from(self.0).unwrap_or(u32::MAX)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value(0x{:x})", self.0)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::from_i64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::from_u64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::from_f64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bits_read_three_ways() {
        let v = Value::from_i64(-1);
        assert_eq!(v.as_u64(), u64::MAX);
        assert_eq!(v.as_i64(), -1);

        let f = Value::from_f64(2.5);
        assert_eq!(f.as_f64(), 2.5);
        assert_eq!(f.bits(), 2.5f64.to_bits());
    }

    #[test]
    fn oversized_handle_is_never_live() {
        assert_eq!(Value::from_u64(1 << 40).as_handle(), u32::MAX);
        assert_eq!(Value::from_handle(7).as_handle(), 7);
    }

    #[test]
    fn pointer_round_trip() {
        let bytes = b"hi\0";
        let v = Value::from_ptr(bytes.as_ptr());
        assert_eq!(v.as_ptr::<u8>(), bytes.as_ptr());
    }
}

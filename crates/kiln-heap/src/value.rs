//! Tagged machine words
//!
//! A [`Value`] is either a small integer (Smi) stored shifted left by
//! [`SMI_SHIFT`] with a clear low bit, or a heap address with the low bit
//! set. Generated code relies on this exact encoding.

use std::fmt;

/// Low bit set on every heap pointer
pub const TAG_POINTER: u64 = 1;

/// Mask selecting the tag bits
pub const TAG_MASK: u64 = 1;

/// Shift applied to small integers
pub const SMI_SHIFT: u32 = 1;

/// A tagged machine word
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u64);

impl Value {
    /// Largest integer representable as a Smi
    pub const SMI_MAX: i64 = i64::MAX >> SMI_SHIFT;
    /// Smallest integer representable as a Smi
    pub const SMI_MIN: i64 = i64::MIN >> SMI_SHIFT;

    /// Wrap raw bits produced by generated code
    #[inline]
    pub const fn from_raw(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits, as generated code sees them
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Raw bits reinterpreted as a signed word
    #[inline]
    pub const fn raw_i64(self) -> i64 {
        self.0 as i64
    }

    /// Encode a Smi, or `None` when `n` does not fit in 63 bits
    #[inline]
    pub const fn try_smi(n: i64) -> Option<Self> {
        if n < Self::SMI_MIN || n > Self::SMI_MAX {
            None
        } else {
            Some(Self((n << SMI_SHIFT) as u64))
        }
    }

    /// Encode a Smi known to be in range
    #[inline]
    pub const fn smi(n: i64) -> Self {
        debug_assert!(n >= Self::SMI_MIN && n <= Self::SMI_MAX);
        Self((n << SMI_SHIFT) as u64)
    }

    /// Tag a heap address
    #[inline]
    pub const fn from_address(addr: usize) -> Self {
        Self(addr as u64 | TAG_POINTER)
    }

    /// Whether the word holds a Smi
    #[inline]
    pub const fn is_smi(self) -> bool {
        self.0 & TAG_MASK == 0
    }

    /// Whether the word holds a heap pointer
    #[inline]
    pub const fn is_pointer(self) -> bool {
        self.0 & TAG_MASK == TAG_POINTER
    }

    /// Decode a Smi
    #[inline]
    pub const fn as_smi(self) -> Option<i64> {
        if self.is_smi() {
            Some((self.0 as i64) >> SMI_SHIFT)
        } else {
            None
        }
    }

    /// Untagged heap address
    #[inline]
    pub const fn address(self) -> usize {
        (self.0 & !TAG_MASK) as usize
    }

    /// Read the word at byte `offset` of this object.
    ///
    /// # Safety
    ///
    /// `self` must point at a live heap object at least `offset + 8` bytes long.
    #[inline]
    pub unsafe fn read_word(self, offset: usize) -> u64 {
        debug_assert!(self.is_pointer());
        // SAFETY: the caller guarantees the object covers `offset`.
        unsafe { ((self.address() + offset) as *const u64).read() }
    }

    /// Read a tagged field at byte `offset` of this object.
    ///
    /// # Safety
    ///
    /// Same contract as [`Value::read_word`].
    #[inline]
    pub unsafe fn read_field(self, offset: usize) -> Value {
        // SAFETY: forwarded to the caller.
        Value(unsafe { self.read_word(offset) })
    }

    /// Write the word at byte `offset` of this object.
    ///
    /// # Safety
    ///
    /// `self` must point at a live, writable heap object covering `offset`.
    #[inline]
    pub unsafe fn write_word(self, offset: usize, word: u64) {
        debug_assert!(self.is_pointer());
        // SAFETY: the caller guarantees the object covers `offset`.
        unsafe { ((self.address() + offset) as *mut u64).write(word) }
    }

    /// Write a tagged field at byte `offset` of this object.
    ///
    /// # Safety
    ///
    /// Same contract as [`Value::write_word`].
    #[inline]
    pub unsafe fn write_field(self, offset: usize, value: Value) {
        // SAFETY: forwarded to the caller.
        unsafe { self.write_word(offset, value.0) }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_smi() {
            Some(n) => write!(f, "Smi({n})"),
            None => write!(f, "Ptr({:#x})", self.address()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smi_roundtrip_extremes() {
        for n in [0, 1, -1, 42, Value::SMI_MAX, Value::SMI_MIN] {
            let v = Value::try_smi(n).expect("in range");
            assert!(v.is_smi());
            assert_eq!(v.as_smi(), Some(n));
        }
        assert!(Value::try_smi(Value::SMI_MAX + 1).is_none());
        assert!(Value::try_smi(Value::SMI_MIN - 1).is_none());
    }

    #[test]
    fn pointer_tagging() {
        let v = Value::from_address(0x1000);
        assert!(v.is_pointer());
        assert!(!v.is_smi());
        assert_eq!(v.address(), 0x1000);
        assert_eq!(v.raw(), 0x1001);
        assert_eq!(v.as_smi(), None);
    }

    #[test]
    fn smi_encoding_is_shifted() {
        assert_eq!(Value::smi(3).raw(), 6);
        assert_eq!(Value::smi(-1).raw_i64(), -2);
    }
}

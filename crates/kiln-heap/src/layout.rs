//! Heap object layout constants
//!
//! Offsets are in bytes from the untagged object address. Generated code and
//! the stub library read and write objects through these constants only, so
//! they must stay word-aligned and in sync with the allocation routines in
//! [`crate::heap`].

/// Size of a machine word
pub const WORD: usize = 8;

/// log2 of [`WORD`]
pub const WORD_SHIFT: u32 = 3;

/// Allocation alignment
pub const ALIGN: usize = 8;

/// Round `size` up to the allocation alignment
#[inline]
pub const fn align(size: usize) -> usize {
    (size + ALIGN - 1) & !(ALIGN - 1)
}

/// Header shared by every heap object
pub mod base {
    /// Map pointer
    pub const MAP: usize = 0;
}

/// Map objects
pub mod map {
    /// Smi-encoded [`crate::MapFlags`]
    pub const FLAGS: usize = 8;
    /// Prototype object (or `null`)
    pub const PROTO: usize = 16;
    /// Allocation size
    pub const SIZE: usize = 24;
}

/// Plain objects and arrays
pub mod object {
    /// Property storage (a Field)
    pub const FIELD: usize = 8;
    /// Allocation size
    pub const SIZE: usize = 16;
    /// Key store capacity of a fresh object, in items
    pub const MIN_ITEMS: usize = 4;
}

/// Function objects
pub mod function {
    /// Property storage (a Field)
    pub const FIELD: usize = 8;
    /// Tagged pointer to the Code object
    pub const CODE: usize = 16;
    /// Map given to objects created by `new`
    pub const INSTANCE_MAP: usize = 24;
    /// Allocation size
    pub const SIZE: usize = 32;
}

/// Property storage
pub mod field {
    /// Smi number of words following the header
    pub const SIZE: usize = 8;
    /// First storage word
    pub const ITEMS: usize = 16;

    /// Allocation size for `words` storage words
    #[inline]
    pub const fn size(words: usize) -> usize {
        ITEMS + words * super::WORD
    }
}

/// Key/value items inside a Field
pub mod key_store {
    /// Words per item
    pub const ITEM_WORDS: usize = 2;
    /// Offset of the key inside an item
    pub const KEY: usize = 0;
    /// Offset of the value inside an item
    pub const VALUE: usize = 8;
}

/// Code objects
pub mod code {
    /// Raw native entry address (not tagged)
    pub const ENTRY: usize = 8;
    /// Smi length of the machine code in bytes
    pub const SIZE: usize = 16;
    /// Smi index of the reference record
    pub const INFO: usize = 24;
    /// Allocation size
    pub const OBJECT_SIZE: usize = 32;
}

/// Interned strings
pub mod string {
    /// Smi length in bytes
    pub const LENGTH: usize = 8;
    /// First byte of UTF-8 data
    pub const DATA: usize = 16;
}

/// Boxed doubles
pub mod number {
    /// `f64` bits
    pub const VALUE: usize = 8;
    /// Allocation size
    pub const SIZE: usize = 16;
}

/// `undefined`, `null`, `hole` and the booleans
pub mod oddball {
    /// Smi discriminator
    pub const VALUE: usize = 8;
    /// Allocation size
    pub const SIZE: usize = 16;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_word_aligned() {
        for off in [
            map::FLAGS,
            map::PROTO,
            object::FIELD,
            function::CODE,
            function::INSTANCE_MAP,
            field::SIZE,
            field::ITEMS,
            code::ENTRY,
            code::INFO,
            string::DATA,
        ] {
            assert_eq!(off % WORD, 0);
        }
    }

    #[test]
    fn align_rounds_up() {
        assert_eq!(align(0), 0);
        assert_eq!(align(1), 8);
        assert_eq!(align(123), 128);
        assert_eq!(align(128), 128);
    }
}

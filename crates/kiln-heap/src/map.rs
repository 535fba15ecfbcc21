//! Maps (hidden classes)
//!
//! A Map describes the shape of the objects pointing at it: flags, a
//! prototype and, implicitly, the order of keys in their key stores. Maps are
//! never mutated once allocated. Adding a key moves an object along a
//! transition to a child map instead.

use rustc_hash::FxHashMap;

use crate::value::Value;

/// Shape flags stored Smi-encoded in every Map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MapFlags(u64);

impl MapFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// Instances are callable functions
    pub const FUNCTION: Self = Self(1);
    /// Instances store elements densely, indexed by Smi keys
    pub const DENSE: Self = Self(2);
    /// Instances have properties that must go through the runtime
    pub const ACCESSOR: Self = Self(4);
    /// The shape is stable and may be cached by inline caches
    pub const TRANSITION: Self = Self(8);

    /// Raw flag bits
    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Rebuild flags from raw bits
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Whether all flags in `other` are set
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Flags with `other` cleared
    #[inline]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl std::ops::BitOr for MapFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Maps created when the heap starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MapKind {
    /// Map of maps
    Meta = 0,
    /// `true` and `false`
    Boolean = 1,
    /// `undefined`, `null` and the hole
    Oddball = 2,
    /// Interned strings
    String = 3,
    /// Boxed doubles
    Number = 4,
    /// Property storage
    Field = 5,
    /// Code objects
    Code = 6,
    /// Root of the plain object transition tree
    Object = 7,
    /// Dense arrays
    Array = 8,
    /// Root of the function transition tree
    Function = 9,
    /// Root of the global object transition tree
    Global = 10,
}

impl MapKind {
    /// Number of root maps
    pub const COUNT: usize = 11;

    /// Every root map, in index order
    pub const ALL: [MapKind; Self::COUNT] = [
        MapKind::Meta,
        MapKind::Boolean,
        MapKind::Oddball,
        MapKind::String,
        MapKind::Number,
        MapKind::Field,
        MapKind::Code,
        MapKind::Object,
        MapKind::Array,
        MapKind::Function,
        MapKind::Global,
    ];

    /// Flags of the root map
    pub const fn flags(self) -> MapFlags {
        match self {
            MapKind::Object | MapKind::Global => MapFlags::TRANSITION,
            MapKind::Array => MapFlags::DENSE,
            MapKind::Function => MapFlags::FUNCTION
                .union(MapFlags::ACCESSOR)
                .union(MapFlags::TRANSITION),
            _ => MapFlags::NONE,
        }
    }

    /// Name used by stubs (`allocTagged/<name>`) and traces
    pub const fn name(self) -> &'static str {
        match self {
            MapKind::Meta => "map",
            MapKind::Boolean => "boolean",
            MapKind::Oddball => "oddball",
            MapKind::String => "string",
            MapKind::Number => "number",
            MapKind::Field => "field",
            MapKind::Code => "code",
            MapKind::Object => "object",
            MapKind::Array => "array",
            MapKind::Function => "function",
            MapKind::Global => "global",
        }
    }
}

/// Transition tree over all maps of the heap
#[derive(Default)]
pub(crate) struct Transitions {
    children: FxHashMap<(Value, Value), Value>,
    /// Number of keys described by each transitioned map
    key_counts: FxHashMap<Value, usize>,
}

impl Transitions {
    pub(crate) fn child(&self, map: Value, key: Value) -> Option<Value> {
        self.children.get(&(map, key)).copied()
    }

    pub(crate) fn insert(&mut self, map: Value, key: Value, child: Value) {
        let count = self.key_count(map) + 1;
        self.children.insert((map, key), child);
        self.key_counts.insert(child, count);
    }

    /// Keys an object of `map` holds; maps that were never a transition
    /// target describe no keys.
    pub(crate) fn key_count(&self, map: Value) -> usize {
        self.key_counts.get(&map).copied().unwrap_or(0)
    }

    pub(crate) fn len(&self) -> usize {
        self.children.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_algebra() {
        let f = MapFlags::FUNCTION | MapFlags::TRANSITION;
        assert!(f.contains(MapFlags::FUNCTION));
        assert!(!f.contains(MapFlags::DENSE));
        assert!(!f.without(MapFlags::TRANSITION).contains(MapFlags::TRANSITION));
    }

    #[test]
    fn root_kinds_are_indexed_in_order() {
        for (i, kind) in MapKind::ALL.iter().enumerate() {
            assert_eq!(*kind as usize, i);
        }
    }

    #[test]
    fn transition_key_counts_accumulate() {
        let mut t = Transitions::default();
        let root = Value::from_address(0x100);
        let a = Value::from_address(0x200);
        let b = Value::from_address(0x300);
        t.insert(root, Value::smi(1), a);
        t.insert(a, Value::smi(2), b);
        assert_eq!(t.key_count(root), 0);
        assert_eq!(t.key_count(b), 2);
        assert_eq!(t.child(root, Value::smi(1)), Some(a));
        assert_eq!(t.len(), 2);
    }
}

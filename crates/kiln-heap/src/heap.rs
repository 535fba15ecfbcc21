//! Heap management

use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use crate::error::{HeapError, HeapResult};
use crate::layout::{self, base, code, field, map, number, oddball, string};
use crate::map::{MapFlags, MapKind, Transitions};
use crate::scope::Scopes;
use crate::space::{Space, SpaceCursor};
use crate::value::Value;

/// Heap configuration
#[derive(Debug, Clone)]
pub struct HeapConfig {
    /// Page size of the object spaces (default: 1MB)
    pub page_size: usize,
    /// Page size of the map space (default: 256KB)
    pub map_page_size: usize,
    /// Extra room added to pages mapped for oversized requests (default: 1KB)
    pub page_slack: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            page_size: 1024 * 1024,    // 1MB
            map_page_size: 256 * 1024, // 256KB
            page_slack: 1024,
        }
    }
}

/// Heap pointers embedded in a Code object's machine code
#[derive(Debug, Clone, Default)]
pub struct CodeRecord {
    /// Symbol name of the compiled function
    pub name: String,
    /// Objects the code must keep alive
    pub strong: Vec<Value>,
    /// Objects the code observes without owning (inline cache maps)
    pub weak: Vec<Value>,
}

/// Oddball discriminators
const UNDEFINED: i64 = 0;
const NULL: i64 = 1;
const HOLE: i64 = 2;

/// The object heap
pub struct Heap {
    config: HeapConfig,
    young: Space,
    old: Space,
    maps: Space,
    root_maps: [Value; MapKind::COUNT],
    undefined: Value,
    null: Value,
    hole: Value,
    true_value: Value,
    false_value: Value,
    strings: FxHashMap<Box<str>, Value>,
    pub(crate) transitions: Transitions,
    code_records: Vec<CodeRecord>,
    scopes: Scopes,
}

impl Heap {
    /// Create a heap with default config
    pub fn new() -> HeapResult<Self> {
        Self::with_config(HeapConfig::default())
    }

    /// Create a heap with custom config
    pub fn with_config(config: HeapConfig) -> HeapResult<Self> {
        let placeholder = Value::smi(0);
        let mut heap = Self {
            young: Space::new("young", config.page_size, config.page_slack),
            old: Space::new("old", config.page_size, config.page_slack),
            maps: Space::new("maps", config.map_page_size, config.page_slack),
            root_maps: [placeholder; MapKind::COUNT],
            undefined: placeholder,
            null: placeholder,
            hole: placeholder,
            true_value: placeholder,
            false_value: placeholder,
            strings: FxHashMap::default(),
            transitions: Transitions::default(),
            code_records: Vec::new(),
            scopes: Scopes::default(),
            config,
        };
        heap.bootstrap()?;
        Ok(heap)
    }

    fn bootstrap(&mut self) -> HeapResult<()> {
        // The meta map is its own map.
        let meta = Value::from_address(self.maps.allocate(map::SIZE)?.as_ptr() as usize);
        // SAFETY: `meta` was just allocated with room for a Map.
        unsafe {
            meta.write_field(base::MAP, meta);
            meta.write_field(map::FLAGS, Value::smi(0));
        }
        self.root_maps[MapKind::Meta as usize] = meta;

        // Prototypes are patched once `null` exists.
        for kind in &MapKind::ALL[1..] {
            self.root_maps[*kind as usize] = self.alloc_map(kind.flags(), meta)?;
        }

        let oddball_map = self.root_map(MapKind::Oddball);
        self.undefined = self.alloc_old(oddball_map, oddball::SIZE)?;
        self.null = self.alloc_old(oddball_map, oddball::SIZE)?;
        self.hole = self.alloc_old(oddball_map, oddball::SIZE)?;
        let boolean_map = self.root_map(MapKind::Boolean);
        self.true_value = self.alloc_old(boolean_map, oddball::SIZE)?;
        self.false_value = self.alloc_old(boolean_map, oddball::SIZE)?;

        // SAFETY: every value below was allocated with room for its fields.
        unsafe {
            self.undefined.write_field(oddball::VALUE, Value::smi(UNDEFINED));
            self.null.write_field(oddball::VALUE, Value::smi(NULL));
            self.hole.write_field(oddball::VALUE, Value::smi(HOLE));
            self.true_value.write_field(oddball::VALUE, Value::smi(1));
            self.false_value.write_field(oddball::VALUE, Value::smi(0));
            meta.write_field(map::PROTO, self.null);
            for kind in &MapKind::ALL[1..] {
                self.root_maps[*kind as usize].write_field(map::PROTO, self.null);
            }
        }
        Ok(())
    }

    /// Get config
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Raw allocation
    // ---------------------------------------------------------------------

    fn tag_with_map(ptr: *mut u8, map: Value) -> Value {
        let value = Value::from_address(ptr as usize);
        // SAFETY: every allocation is at least one word long.
        unsafe { value.write_field(base::MAP, map) };
        value
    }

    /// Allocate `size` bytes in the young space and install `map`
    pub fn alloc_young(&mut self, map: Value, size: usize) -> HeapResult<Value> {
        let ptr = self.young.allocate(size)?;
        Ok(Self::tag_with_map(ptr.as_ptr(), map))
    }

    /// Allocate `size` bytes in the old space and install `map`
    pub fn alloc_old(&mut self, map: Value, size: usize) -> HeapResult<Value> {
        let ptr = self.old.allocate(size)?;
        Ok(Self::tag_with_map(ptr.as_ptr(), map))
    }

    /// Cursor of the young space, bumped directly by generated code
    pub fn young_cursor(&self) -> *const SpaceCursor {
        self.young.cursor()
    }

    /// The young space
    pub fn young(&self) -> &Space {
        &self.young
    }

    /// The young space, mutably
    pub fn young_mut(&mut self) -> &mut Space {
        &mut self.young
    }

    // ---------------------------------------------------------------------
    // Well-known values
    // ---------------------------------------------------------------------

    /// Root map of `kind`
    #[inline]
    pub fn root_map(&self, kind: MapKind) -> Value {
        self.root_maps[kind as usize]
    }

    /// `undefined`
    #[inline]
    pub fn undefined(&self) -> Value {
        self.undefined
    }

    /// `null`
    #[inline]
    pub fn null(&self) -> Value {
        self.null
    }

    /// Marker for empty storage slots
    #[inline]
    pub fn hole(&self) -> Value {
        self.hole
    }

    /// `true`
    #[inline]
    pub fn true_value(&self) -> Value {
        self.true_value
    }

    /// `false`
    #[inline]
    pub fn false_value(&self) -> Value {
        self.false_value
    }

    /// Boolean oddball for `b`
    #[inline]
    pub fn boolean(&self, b: bool) -> Value {
        if b { self.true_value } else { self.false_value }
    }

    // ---------------------------------------------------------------------
    // Maps, fields, strings, numbers
    // ---------------------------------------------------------------------

    /// Allocate a map in the map space
    pub fn alloc_map(&mut self, flags: MapFlags, proto: Value) -> HeapResult<Value> {
        let ptr = self.maps.allocate(map::SIZE)?;
        let value = Self::tag_with_map(ptr.as_ptr(), self.root_map(MapKind::Meta));
        // SAFETY: freshly allocated Map.
        unsafe {
            value.write_field(map::FLAGS, Value::smi(flags.bits() as i64));
            value.write_field(map::PROTO, proto);
        }
        Ok(value)
    }

    /// Flags of a map
    pub fn map_flags(&self, map: Value) -> MapFlags {
        // SAFETY: callers pass maps read from object headers.
        let raw = unsafe { map.read_field(map::FLAGS) };
        MapFlags::from_bits(raw.as_smi().unwrap_or(0) as u64)
    }

    /// Prototype of a map
    pub fn map_proto(&self, map: Value) -> Value {
        // SAFETY: callers pass maps read from object headers.
        unsafe { map.read_field(map::PROTO) }
    }

    /// Map of a heap value, `None` for Smis
    #[inline]
    pub fn map_of(&self, value: Value) -> Option<Value> {
        if value.is_smi() {
            None
        } else {
            // SAFETY: every heap object starts with its map.
            Some(unsafe { value.read_field(base::MAP) })
        }
    }

    /// Allocate property storage of `words` words, filled with the hole
    pub fn alloc_field(&mut self, words: usize) -> HeapResult<Value> {
        let map = self.root_map(MapKind::Field);
        let value = self.alloc_young(map, field::size(words))?;
        // SAFETY: freshly allocated Field with `words` items.
        unsafe {
            value.write_field(field::SIZE, Value::smi(words as i64));
            for i in 0..words {
                value.write_field(field::ITEMS + i * layout::WORD, self.hole);
            }
        }
        Ok(value)
    }

    /// Intern a string
    pub fn string(&mut self, s: &str) -> HeapResult<Value> {
        if let Some(v) = self.strings.get(s) {
            return Ok(*v);
        }
        let map = self.root_map(MapKind::String);
        let value = self.alloc_old(map, string::DATA + s.len())?;
        // SAFETY: the allocation covers the header and `s.len()` bytes.
        unsafe {
            value.write_field(string::LENGTH, Value::smi(s.len() as i64));
            std::ptr::copy_nonoverlapping(
                s.as_ptr(),
                (value.address() + string::DATA) as *mut u8,
                s.len(),
            );
        }
        self.strings.insert(s.into(), value);
        self.scopes.root(value);
        Ok(value)
    }

    /// Contents of an interned string
    pub fn str_of(&self, value: Value) -> Option<&str> {
        if self.map_of(value)? != self.root_map(MapKind::String) {
            return None;
        }
        // SAFETY: string objects hold LENGTH bytes of UTF-8 copied from a &str.
        unsafe {
            let len = value.read_field(string::LENGTH).as_smi()? as usize;
            let bytes =
                std::slice::from_raw_parts((value.address() + string::DATA) as *const u8, len);
            Some(std::str::from_utf8_unchecked(bytes))
        }
    }

    /// Encode a number, boxing it when it is not a Smi
    pub fn number(&mut self, n: f64) -> HeapResult<Value> {
        if n.fract() == 0.0 && !(n == 0.0 && n.is_sign_negative()) && n.abs() < (1u64 << 53) as f64
        {
            if let Some(v) = Value::try_smi(n as i64) {
                return Ok(v);
            }
        }
        let map = self.root_map(MapKind::Number);
        let value = self.alloc_young(map, number::SIZE)?;
        // SAFETY: freshly allocated HeapNumber.
        unsafe { value.write_word(number::VALUE, n.to_bits()) };
        Ok(value)
    }

    /// Numeric value of a Smi or HeapNumber
    pub fn number_value(&self, value: Value) -> Option<f64> {
        if let Some(n) = value.as_smi() {
            return Some(n as f64);
        }
        if self.map_of(value)? == self.root_map(MapKind::Number) {
            // SAFETY: HeapNumbers store their bits at VALUE.
            return Some(f64::from_bits(unsafe { value.read_word(number::VALUE) }));
        }
        None
    }

    // ---------------------------------------------------------------------
    // Code
    // ---------------------------------------------------------------------

    /// Allocate a Code object describing `size` bytes of machine code at `entry`
    pub fn alloc_code(&mut self, entry: usize, size: usize, record: CodeRecord) -> HeapResult<Value> {
        let map = self.root_map(MapKind::Code);
        let value = self.alloc_old(map, code::OBJECT_SIZE)?;
        let info = self.code_records.len();
        self.code_records.push(record);
        // SAFETY: freshly allocated Code object.
        unsafe {
            value.write_word(code::ENTRY, entry as u64);
            value.write_field(code::SIZE, Value::smi(size as i64));
            value.write_field(code::INFO, Value::smi(info as i64));
        }
        self.scopes.root(value);
        Ok(value)
    }

    fn check_code(&self, value: Value) -> HeapResult<()> {
        if self.map_of(value) == Some(self.root_map(MapKind::Code)) {
            Ok(())
        } else {
            Err(HeapError::NotCode(value.raw()))
        }
    }

    /// Native entry address of a Code object
    pub fn code_entry(&self, code_value: Value) -> HeapResult<usize> {
        self.check_code(code_value)?;
        // SAFETY: checked to be a Code object.
        let entry = unsafe { &*((code_value.address() + code::ENTRY) as *const AtomicU64) };
        Ok(entry.load(Ordering::Acquire) as usize)
    }

    /// Size in bytes of a Code object's machine code
    pub fn code_size(&self, code_value: Value) -> HeapResult<usize> {
        self.check_code(code_value)?;
        // SAFETY: checked to be a Code object.
        let size = unsafe { code_value.read_field(code::SIZE) };
        Ok(size.as_smi().unwrap_or(0) as usize)
    }

    /// Replace the machine code a Code object points at.
    ///
    /// Callers of the Code object pick up the new entry on their next call.
    /// Execution is single-threaded, so no caller can be running the old
    /// code on another thread while the entry is swapped.
    pub fn install_code_entry(&mut self, code_value: Value, entry: usize, size: usize) -> HeapResult<()> {
        self.check_code(code_value)?;
        // SAFETY: checked to be a Code object; ENTRY is word-aligned.
        unsafe {
            let slot = &*((code_value.address() + code::ENTRY) as *const AtomicU64);
            slot.store(entry as u64, Ordering::Release);
            code_value.write_field(code::SIZE, Value::smi(size as i64));
        }
        Ok(())
    }

    /// Reference record of a Code object
    pub fn code_record(&self, code_value: Value) -> HeapResult<&CodeRecord> {
        let index = self.code_record_index(code_value)?;
        Ok(&self.code_records[index])
    }

    /// Reference record of a Code object, mutably
    pub fn code_record_mut(&mut self, code_value: Value) -> HeapResult<&mut CodeRecord> {
        let index = self.code_record_index(code_value)?;
        Ok(&mut self.code_records[index])
    }

    fn code_record_index(&self, code_value: Value) -> HeapResult<usize> {
        self.check_code(code_value)?;
        // SAFETY: checked to be a Code object.
        let info = unsafe { code_value.read_field(code::INFO) };
        info.as_smi()
            .map(|i| i as usize)
            .filter(|i| *i < self.code_records.len())
            .ok_or(HeapError::NotCode(code_value.raw()))
    }

    // ---------------------------------------------------------------------
    // Roots
    // ---------------------------------------------------------------------

    /// Record `value` in the current scope
    pub fn root(&mut self, value: Value) {
        self.scopes.root(value);
    }

    /// Number of nested scopes currently entered
    pub fn scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    /// Number of recorded roots across all scopes
    pub fn root_count(&self) -> usize {
        self.scopes.root_count()
    }

    pub(crate) fn scopes_mut(&mut self) -> &mut Scopes {
        &mut self.scopes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oddballs_are_distinct_pointers() {
        let heap = Heap::new().expect("heap creation should succeed");
        let all = [
            heap.undefined(),
            heap.null(),
            heap.hole(),
            heap.true_value(),
            heap.false_value(),
        ];
        for (i, a) in all.iter().enumerate() {
            assert!(a.is_pointer());
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn meta_map_is_self_describing() {
        let heap = Heap::new().expect("heap creation should succeed");
        let meta = heap.root_map(MapKind::Meta);
        assert_eq!(heap.map_of(meta), Some(meta));
        assert_eq!(heap.map_of(heap.root_map(MapKind::Object)), Some(meta));
        assert_eq!(heap.map_proto(heap.root_map(MapKind::Object)), heap.null());
    }

    #[test]
    fn strings_are_interned() {
        let mut heap = Heap::new().expect("heap creation should succeed");
        let a = heap.string("oook").expect("string should allocate");
        let b = heap.string("oook").expect("string should allocate");
        let c = heap.string("ohai").expect("string should allocate");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.str_of(a), Some("oook"));
        assert_eq!(heap.str_of(Value::smi(1)), None);
    }

    #[test]
    fn numbers_prefer_smis() {
        let mut heap = Heap::new().expect("heap creation should succeed");
        let small = heap.number(42.0).expect("number should encode");
        assert_eq!(small.as_smi(), Some(42));
        let frac = heap.number(1.5).expect("number should encode");
        assert!(frac.is_pointer());
        assert_eq!(heap.number_value(frac), Some(1.5));
        let neg_zero = heap.number(-0.0).expect("number should encode");
        assert!(neg_zero.is_pointer());
    }

    #[test]
    fn code_entry_can_be_replaced() {
        let mut heap = Heap::new().expect("heap creation should succeed");
        let code = heap
            .alloc_code(0x1000, 16, CodeRecord::default())
            .expect("code should allocate");
        assert_eq!(heap.code_entry(code).expect("is code"), 0x1000);
        heap.install_code_entry(code, 0x2000, 32)
            .expect("install should succeed");
        assert_eq!(heap.code_entry(code).expect("is code"), 0x2000);
        assert!(heap.code_entry(heap.undefined()).is_err());
    }
}

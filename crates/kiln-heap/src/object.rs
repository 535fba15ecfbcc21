//! Object model: property storage, transitions and prototype lookup
//!
//! Objects store properties in a Field. Dense objects (arrays) index it by
//! Smi key; every other object keeps key/value items whose order is fixed by
//! the object's map, so all objects sharing a map share slot numbers.

use crate::error::{HeapError, HeapResult};
use crate::heap::Heap;
use crate::layout::{self, base, field, function, key_store, object};
use crate::map::{MapFlags, MapKind};
use crate::value::Value;

/// Named properties an object may hold before it leaves the transition tree
pub const MAX_FAST_PROPERTIES: usize = 64;

/// Largest index a dense store grows to on assignment
const MAX_DENSE_INDEX: i64 = 1 << 24;

impl Heap {
    /// Whether `value` carries property storage
    pub fn is_object(&self, value: Value) -> bool {
        let Some(map) = self.map_of(value) else {
            return false;
        };
        ![
            MapKind::Meta,
            MapKind::Boolean,
            MapKind::Oddball,
            MapKind::String,
            MapKind::Number,
            MapKind::Field,
            MapKind::Code,
        ]
        .iter()
        .any(|kind| self.root_map(*kind) == map)
    }

    /// Whether `value` is callable
    pub fn is_function(&self, value: Value) -> bool {
        self.map_of(value)
            .is_some_and(|map| self.map_flags(map).contains(MapFlags::FUNCTION))
    }

    /// Whether `value` is a dense (array) object
    pub fn is_dense(&self, value: Value) -> bool {
        self.map_of(value)
            .is_some_and(|map| self.map_flags(map).contains(MapFlags::DENSE))
    }

    // ---------------------------------------------------------------------
    // Allocation
    // ---------------------------------------------------------------------

    /// Allocate an empty object with `map`
    pub fn alloc_object(&mut self, map: Value) -> HeapResult<Value> {
        let obj = self.alloc_young(map, object::SIZE)?;
        let storage = self.alloc_field(object::MIN_ITEMS * key_store::ITEM_WORDS)?;
        // SAFETY: freshly allocated Object.
        unsafe { obj.write_field(object::FIELD, storage) };
        Ok(obj)
    }

    /// Allocate `{}`
    pub fn new_object(&mut self) -> HeapResult<Value> {
        self.alloc_object(self.root_map(MapKind::Object))
    }

    /// Allocate the global object
    pub fn new_global(&mut self) -> HeapResult<Value> {
        let global = self.alloc_object(self.root_map(MapKind::Global))?;
        self.root(global);
        Ok(global)
    }

    /// Allocate a dense array of `len` holes
    pub fn new_array(&mut self, len: usize) -> HeapResult<Value> {
        let array = self.alloc_young(self.root_map(MapKind::Array), object::SIZE)?;
        let storage = self.alloc_field(len)?;
        // SAFETY: freshly allocated Object.
        unsafe { array.write_field(object::FIELD, storage) };
        Ok(array)
    }

    /// Allocate a function running `code`, with a fresh `prototype` object
    pub fn alloc_function(&mut self, code: Value) -> HeapResult<Value> {
        let proto = self.new_object()?;
        let instance_map = self.alloc_map(MapFlags::TRANSITION, proto)?;
        let func = self.alloc_function_raw(code, instance_map)?;
        let key = self.string("prototype")?;
        self.set_property(func, key, proto)?;
        Ok(func)
    }

    /// Allocate a function without a `prototype` property (stubs and builtins)
    pub fn alloc_builtin_function(&mut self, code: Value) -> HeapResult<Value> {
        let instance_map = self.root_map(MapKind::Object);
        let func = self.alloc_function_raw(code, instance_map)?;
        self.root(func);
        Ok(func)
    }

    fn alloc_function_raw(&mut self, code: Value, instance_map: Value) -> HeapResult<Value> {
        let func = self.alloc_young(self.root_map(MapKind::Function), function::SIZE)?;
        let storage = self.alloc_field(object::MIN_ITEMS * key_store::ITEM_WORDS)?;
        // SAFETY: freshly allocated Function.
        unsafe {
            func.write_field(function::FIELD, storage);
            func.write_field(function::CODE, code);
            func.write_field(function::INSTANCE_MAP, instance_map);
        }
        Ok(func)
    }

    /// Code object of a function
    pub fn function_code(&self, func: Value) -> HeapResult<Value> {
        if !self.is_function(func) {
            return Err(HeapError::NotAnObject(func.raw()));
        }
        // SAFETY: checked to be a Function.
        Ok(unsafe { func.read_field(function::CODE) })
    }

    /// Map given to objects constructed by `func`
    pub fn function_instance_map(&self, func: Value) -> HeapResult<Value> {
        if !self.is_function(func) {
            return Err(HeapError::NotAnObject(func.raw()));
        }
        // SAFETY: checked to be a Function.
        Ok(unsafe { func.read_field(function::INSTANCE_MAP) })
    }

    // ---------------------------------------------------------------------
    // Slots
    // ---------------------------------------------------------------------

    fn field_of(&self, obj: Value) -> Value {
        // SAFETY: callers check `is_object` first.
        unsafe { obj.read_field(object::FIELD) }
    }

    fn field_words(&self, storage: Value) -> usize {
        // SAFETY: `storage` is a Field.
        unsafe { storage.read_field(field::SIZE) }.as_smi().unwrap_or(0) as usize
    }

    /// Byte offset of slot `slot` inside the field of `obj`
    pub fn slot_offset(&self, obj: Value, slot: usize) -> usize {
        if self.is_dense(obj) {
            field::ITEMS + slot * layout::WORD
        } else {
            field::ITEMS + slot * key_store::ITEM_WORDS * layout::WORD + key_store::VALUE
        }
    }

    /// Value stored in `slot`
    pub fn read_slot(&self, obj: Value, slot: usize) -> Value {
        let storage = self.field_of(obj);
        // SAFETY: slots come from `own_slot`/`lookup_slot`, which stay in bounds.
        unsafe { storage.read_field(self.slot_offset(obj, slot)) }
    }

    /// Overwrite `slot`
    pub fn write_slot(&mut self, obj: Value, slot: usize, value: Value) {
        let storage = self.field_of(obj);
        // SAFETY: slots come from `own_slot`/`lookup_slot`, which stay in bounds.
        unsafe { storage.write_field(self.slot_offset(obj, slot), value) }
    }

    /// Slot of an own property, if present
    pub fn own_slot(&self, obj: Value, key: Value) -> Option<usize> {
        if !self.is_object(obj) {
            return None;
        }
        let storage = self.field_of(obj);
        let words = self.field_words(storage);
        if self.is_dense(obj) {
            let index = key.as_smi().filter(|i| *i >= 0 && (*i as usize) < words)? as usize;
            return (self.read_slot(obj, index) != self.hole()).then_some(index);
        }
        (0..words / key_store::ITEM_WORDS).find(|i| {
            let off = field::ITEMS + i * key_store::ITEM_WORDS * layout::WORD + key_store::KEY;
            // SAFETY: `i` is within the field's item count.
            unsafe { storage.read_field(off) == key }
        })
    }

    /// Slot of an own property; with `update`, add the property when missing.
    ///
    /// Returns `None` for receivers without storage and for dense objects
    /// asked for a non-index key.
    pub fn lookup_slot(&mut self, obj: Value, key: Value, update: bool) -> HeapResult<Option<usize>> {
        if !self.is_object(obj) {
            return Ok(None);
        }
        let key = self.property_key(obj, key)?;
        if let Some(slot) = self.own_slot(obj, key) {
            return Ok(Some(slot));
        }
        if update {
            self.add_property(obj, key)
        } else {
            Ok(None)
        }
    }

    fn add_property(&mut self, obj: Value, key: Value) -> HeapResult<Option<usize>> {
        if self.is_dense(obj) {
            let Some(index) = key.as_smi().filter(|i| (0..MAX_DENSE_INDEX).contains(i)) else {
                return Ok(None);
            };
            let index = index as usize;
            let words = self.field_words(self.field_of(obj));
            if index >= words {
                self.grow_field(obj, (index + 1).max(words * 2))?;
            }
            return Ok(Some(index));
        }

        let map = self.map_of(obj).ok_or(HeapError::NotAnObject(obj.raw()))?;
        let storage = self.field_of(obj);
        let items = self.field_words(storage) / key_store::ITEM_WORDS;
        let hole = self.hole();
        let free = (0..items).find(|i| {
            let off = field::ITEMS + i * key_store::ITEM_WORDS * layout::WORD + key_store::KEY;
            // SAFETY: `i` is within the field's item count.
            unsafe { storage.read_field(off) == hole }
        });
        let slot = match free {
            Some(slot) => slot,
            None => {
                let words = (items * 2).max(object::MIN_ITEMS) * key_store::ITEM_WORDS;
                self.grow_field(obj, words)?;
                items
            }
        };

        let storage = self.field_of(obj);
        let off = field::ITEMS + slot * key_store::ITEM_WORDS * layout::WORD;
        let undefined = self.undefined();
        // SAFETY: `slot` is within the (possibly grown) field.
        unsafe {
            storage.write_field(off + key_store::KEY, key);
            storage.write_field(off + key_store::VALUE, undefined);
        }

        let flags = self.map_flags(map);
        if flags.contains(MapFlags::TRANSITION) {
            if self.transitions.key_count(map) + 1 > MAX_FAST_PROPERTIES {
                self.to_dictionary(obj)?;
            } else {
                let child = match self.transitions.child(map, key) {
                    Some(child) => child,
                    None => {
                        let proto = self.map_proto(map);
                        let child = self.alloc_map(flags, proto)?;
                        self.transitions.insert(map, key, child);
                        child
                    }
                };
                // SAFETY: `obj` is an object.
                unsafe { obj.write_field(base::MAP, child) };
            }
        }
        Ok(Some(slot))
    }

    fn grow_field(&mut self, obj: Value, words: usize) -> HeapResult<()> {
        let old = self.field_of(obj);
        let old_words = self.field_words(old);
        let grown = self.alloc_field(words)?;
        // SAFETY: both fields cover `old_words` words and `old_words <= words`.
        unsafe {
            std::ptr::copy_nonoverlapping(
                (old.address() + field::ITEMS) as *const u64,
                (grown.address() + field::ITEMS) as *mut u64,
                old_words.min(words),
            );
            obj.write_field(object::FIELD, grown);
        }
        Ok(())
    }

    /// Move `obj` onto a private map that inline caches never cache
    fn to_dictionary(&mut self, obj: Value) -> HeapResult<()> {
        let map = self.map_of(obj).ok_or(HeapError::NotAnObject(obj.raw()))?;
        let flags = self.map_flags(map).without(MapFlags::TRANSITION);
        let proto = self.map_proto(map);
        let private = self.alloc_map(flags, proto)?;
        // SAFETY: `obj` is an object.
        unsafe { obj.write_field(base::MAP, private) };
        tracing::trace!(object = ?obj, "object moved to dictionary mode");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Properties
    // ---------------------------------------------------------------------

    /// Normalise a key for `obj`: dense objects take Smi indices, every other
    /// object takes interned strings.
    pub fn property_key(&mut self, obj: Value, key: Value) -> HeapResult<Value> {
        if key.is_smi() && self.is_dense(obj) {
            return Ok(key);
        }
        if self.str_of(key).is_some() {
            return Ok(key);
        }
        let text = self.to_display_string(key);
        self.string(&text)
    }

    /// Look `key` up on `obj` and its prototype chain
    pub fn get_property(&mut self, obj: Value, key: Value) -> HeapResult<Value> {
        if let (Some(s), Some("length")) = (self.str_of(obj), self.str_of(key)) {
            return Ok(Value::smi(s.len() as i64));
        }
        let mut current = obj;
        while self.is_object(current) {
            let k = self.property_key(current, key)?;
            if let Some(slot) = self.own_slot(current, k) {
                let value = self.read_slot(current, slot);
                if value != self.hole() {
                    return Ok(value);
                }
            }
            let map = self.map_of(current).ok_or(HeapError::NotAnObject(current.raw()))?;
            current = self.map_proto(map);
        }
        Ok(self.undefined())
    }

    /// Assign `key` on `obj`; assignments to values without storage are ignored
    pub fn set_property(&mut self, obj: Value, key: Value, value: Value) -> HeapResult<()> {
        let Some(slot) = self.lookup_slot(obj, key, true)? else {
            return Ok(());
        };
        self.write_slot(obj, slot, value);

        if self.is_function(obj) && self.str_of(key) == Some("prototype") {
            self.refresh_instance_map(obj, value)?;
        }
        Ok(())
    }

    /// Keep a function's instance map in step with its `prototype` property
    fn refresh_instance_map(&mut self, func: Value, proto: Value) -> HeapResult<()> {
        let proto = if self.is_object(proto) { proto } else { self.null() };
        let current = self.function_instance_map(func)?;
        if self.map_proto(current) == proto {
            return Ok(());
        }
        let instance_map = self.alloc_map(MapFlags::TRANSITION, proto)?;
        // SAFETY: `func` is a Function.
        unsafe { func.write_field(function::INSTANCE_MAP, instance_map) };
        Ok(())
    }

    /// Remove an own property
    pub fn delete_property(&mut self, obj: Value, key: Value) -> HeapResult<bool> {
        if !self.is_object(obj) {
            return Ok(true);
        }
        let key = self.property_key(obj, key)?;
        let Some(slot) = self.own_slot(obj, key) else {
            return Ok(true);
        };
        let hole = self.hole();
        if self.is_dense(obj) {
            self.write_slot(obj, slot, hole);
            return Ok(true);
        }

        let map = self.map_of(obj).ok_or(HeapError::NotAnObject(obj.raw()))?;
        if self.map_flags(map).contains(MapFlags::TRANSITION) {
            self.to_dictionary(obj)?;
        }
        let storage = self.field_of(obj);
        let off = field::ITEMS + slot * key_store::ITEM_WORDS * layout::WORD;
        // SAFETY: `slot` came from `own_slot`.
        unsafe {
            storage.write_field(off + key_store::KEY, hole);
            storage.write_field(off + key_store::VALUE, hole);
        }
        Ok(true)
    }

    /// `obj instanceof ctor`; `None` when `ctor` is not callable
    pub fn instance_of(&mut self, obj: Value, ctor: Value) -> HeapResult<Option<bool>> {
        if !self.is_function(ctor) {
            return Ok(None);
        }
        let key = self.string("prototype")?;
        let proto = self.get_property(ctor, key)?;
        if !self.is_object(obj) || !self.is_object(proto) {
            return Ok(Some(false));
        }
        let mut current = obj;
        while let Some(map) = self.map_of(current) {
            let next = self.map_proto(map);
            if next == proto {
                return Ok(Some(true));
            }
            if !self.is_object(next) {
                break;
            }
            current = next;
        }
        Ok(Some(false))
    }

    /// Truthiness
    pub fn to_boolean(&self, value: Value) -> bool {
        if let Some(n) = value.as_smi() {
            return n != 0;
        }
        if value == self.true_value() {
            return true;
        }
        if value == self.false_value()
            || value == self.undefined()
            || value == self.null()
            || value == self.hole()
        {
            return false;
        }
        if let Some(s) = self.str_of(value) {
            return !s.is_empty();
        }
        if let Some(n) = self.number_value(value) {
            return n != 0.0 && !n.is_nan();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Heap {
        Heap::new().expect("heap creation should succeed")
    }

    #[test]
    fn objects_with_same_keys_share_maps() {
        let mut heap = heap();
        let x = heap.string("x").expect("string");
        let y = heap.string("y").expect("string");
        let a = heap.new_object().expect("object");
        let b = heap.new_object().expect("object");
        heap.set_property(a, x, Value::smi(1)).expect("set");
        heap.set_property(a, y, Value::smi(2)).expect("set");
        heap.set_property(b, x, Value::smi(3)).expect("set");
        heap.set_property(b, y, Value::smi(4)).expect("set");
        assert_eq!(heap.map_of(a), heap.map_of(b));
        assert_eq!(heap.own_slot(a, y), heap.own_slot(b, y));
        assert_eq!(heap.get_property(b, y).expect("get"), Value::smi(4));
    }

    #[test]
    fn different_key_order_yields_different_maps() {
        let mut heap = heap();
        let x = heap.string("x").expect("string");
        let y = heap.string("y").expect("string");
        let a = heap.new_object().expect("object");
        let b = heap.new_object().expect("object");
        heap.set_property(a, x, Value::smi(1)).expect("set");
        heap.set_property(b, y, Value::smi(1)).expect("set");
        heap.set_property(b, x, Value::smi(2)).expect("set");
        assert_ne!(heap.map_of(a), heap.map_of(b));
        assert_eq!(heap.get_property(b, x).expect("get"), Value::smi(2));
    }

    #[test]
    fn growth_keeps_slots() {
        let mut heap = heap();
        let obj = heap.new_object().expect("object");
        let keys: Vec<Value> = (0..10)
            .map(|i| heap.string(&format!("k{i}")).expect("string"))
            .collect();
        for (i, key) in keys.iter().enumerate() {
            heap.set_property(obj, *key, Value::smi(i as i64)).expect("set");
        }
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(heap.own_slot(obj, *key), Some(i));
            assert_eq!(heap.get_property(obj, *key).expect("get"), Value::smi(i as i64));
        }
    }

    #[test]
    fn delete_leaves_transition_tree() {
        let mut heap = heap();
        let x = heap.string("x").expect("string");
        let obj = heap.new_object().expect("object");
        heap.set_property(obj, x, Value::smi(1)).expect("set");
        assert!(heap.delete_property(obj, x).expect("delete"));
        let map = heap.map_of(obj).expect("map");
        assert!(!heap.map_flags(map).contains(MapFlags::TRANSITION));
        assert_eq!(heap.get_property(obj, x).expect("get"), heap.undefined());
    }

    #[test]
    fn prototype_chain_lookup() {
        let mut heap = heap();
        let code = heap
            .alloc_code(0, 0, crate::CodeRecord::default())
            .expect("code");
        let ctor = heap.alloc_function(code).expect("function");
        let proto_key = heap.string("prototype").expect("string");
        let proto = heap.get_property(ctor, proto_key).expect("get");
        let greet = heap.string("greet").expect("string");
        heap.set_property(proto, greet, Value::smi(7)).expect("set");

        let instance_map = heap.function_instance_map(ctor).expect("instance map");
        let obj = heap.alloc_object(instance_map).expect("object");
        assert_eq!(heap.get_property(obj, greet).expect("get"), Value::smi(7));
        assert_eq!(heap.instance_of(obj, ctor).expect("instanceof"), Some(true));
        assert_eq!(heap.instance_of(obj, Value::smi(1)).expect("instanceof"), None);
    }

    #[test]
    fn dense_arrays_index_by_smi() {
        let mut heap = heap();
        let arr = heap.new_array(2).expect("array");
        heap.set_property(arr, Value::smi(0), Value::smi(10)).expect("set");
        heap.set_property(arr, Value::smi(5), Value::smi(15)).expect("set");
        assert_eq!(heap.get_property(arr, Value::smi(5)).expect("get"), Value::smi(15));
        assert_eq!(heap.get_property(arr, Value::smi(1)).expect("get"), heap.undefined());
        assert_eq!(heap.own_slot(arr, Value::smi(0)), Some(0));
    }

    #[test]
    fn truthiness() {
        let mut heap = heap();
        let empty = heap.string("").expect("string");
        let full = heap.string("a").expect("string");
        assert!(!heap.to_boolean(Value::smi(0)));
        assert!(heap.to_boolean(Value::smi(-3)));
        assert!(!heap.to_boolean(empty));
        assert!(heap.to_boolean(full));
        assert!(!heap.to_boolean(heap.undefined()));
        let obj = heap.new_object().expect("object");
        assert!(heap.to_boolean(obj));
    }
}

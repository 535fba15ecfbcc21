//! Inline caches for property slot lookups
//!
//! Each access site gets its own IC function. The IC's code compares the
//! receiver's map (and, for computed keys, the key) against a list of
//! probes and returns the cached slot on a hit. Misses tail-call
//! `getPropertySlot_Miss`, which finds the slot in the runtime, records a
//! new probe and regenerates the IC's code in place.

use std::cell::RefCell;

use kiln_heap::layout::base;
use kiln_heap::{MapFlags, ScopeGuard, Value};
use kiln_ir::{Builder, Cond, Const, Graph, IcKind, IrResult, PrimOp};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::compiler::compile_unit;
use crate::context::UnitKind;
use crate::error::{JitError, JitResult, RuntimeError};
use crate::runtime::RuntimeInner;

/// One cached `(map, key) -> slot` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Probe {
    /// Receiver map, held weakly by the IC code
    pub(crate) map: Value,
    /// Interned key; `None` for fixed-key sites
    pub(crate) key: Option<Value>,
    pub(crate) slot: usize,
}

/// State of one access site
#[derive(Debug, Clone)]
pub(crate) struct InlineCache {
    pub(crate) kind: IcKind,
    pub(crate) code: Value,
    pub(crate) probes: Vec<Probe>,
    /// Saw a receiver it could not cache; every lookup now misses
    pub(crate) megamorphic: bool,
}

/// Snapshot of one inline cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcStats {
    /// Site flavour
    pub kind: IcKind,
    /// Number of cached receiver shapes
    pub probes: usize,
    /// Whether the site gave up caching
    pub megamorphic: bool,
}

/// Inline caches by IC function
#[derive(Default)]
pub(crate) struct IcRegistry {
    caches: RefCell<FxHashMap<u64, InlineCache>>,
}

impl IcRegistry {
    fn get(&self, ic: Value) -> JitResult<InlineCache> {
        self.caches
            .try_borrow()
            .map_err(|_| JitError::internal("getPropertySlot", "IC registry is busy"))?
            .get(&ic.raw())
            .cloned()
            .ok_or_else(|| {
                JitError::internal("getPropertySlot", format!("{:#x} is not an IC", ic.raw()))
            })
    }

    fn put(&self, ic: Value, cache: InlineCache) -> JitResult<()> {
        self.caches
            .try_borrow_mut()
            .map_err(|_| JitError::internal("getPropertySlot", "IC registry is busy"))?
            .insert(ic.raw(), cache);
        Ok(())
    }

    pub(crate) fn stats(&self) -> Vec<IcStats> {
        self.caches
            .borrow()
            .values()
            .map(|cache| IcStats {
                kind: cache.kind,
                probes: cache.probes.len(),
                megamorphic: cache.megamorphic,
            })
            .collect()
    }
}

/// Dispatch graph for `probes`: `(obj, key, update) -> slot | miss`
pub(crate) fn dispatch_graph(kind: IcKind, probes: &[Probe]) -> IrResult<Graph> {
    let mut b = Builder::new(kind.name());
    let obj = b.ic_arg(0)?;
    let miss = b.new_block();

    b.is_smi(obj)?;
    let heap_object = b.new_block();
    b.branch(miss, heap_object)?;
    b.switch_to(heap_object);

    if !probes.is_empty() {
        let key = match kind {
            IcKind::Normal => Some(b.ic_arg(1)?),
            IcKind::Fixed => None,
        };
        let map = b.read(obj, base::MAP)?;
        for probe in probes {
            let hit = b.new_block();
            let next = b.new_block();
            let expected = b.literal(Const::Weak(probe.map))?;
            b.pointer_compare(map, expected, Cond::Eq)?;

            match (key, probe.key) {
                (Some(key), Some(probe_key)) => {
                    let same_map = b.new_block();
                    b.branch(same_map, next)?;
                    b.switch_to(same_map);
                    let expected = b.literal(Const::Heap(probe_key))?;
                    b.pointer_compare(key, expected, Cond::Eq)?;
                    b.branch(hit, next)?;
                }
                _ => b.branch(hit, next)?,
            }

            b.switch_to(hit);
            let slot = b.literal(Const::Smi(probe.slot as i64))?;
            b.emit(PrimOp::IcRet, [slot.into()])?;
            b.switch_to(next);
        }
    }
    b.jump(miss)?;

    b.switch_to(miss);
    b.emit(
        PrimOp::TailCallStub,
        [Const::Stub("getPropertySlot_Miss".into()).into()],
    )?;
    Ok(b.finish())
}

/// A fresh IC function with no probes
pub(crate) fn new_ic(rt: &RuntimeInner, kind: IcKind) -> JitResult<Value> {
    let _scope = ScopeGuard::persistent(&rt.heap);
    let code = compile_unit(rt, dispatch_graph(kind, &[])?, UnitKind::Ic, &[])?;
    let function = rt.heap()?.alloc_builtin_function(code)?;
    rt.ics.put(
        function,
        InlineCache {
            kind,
            code,
            probes: Vec::new(),
            megamorphic: false,
        },
    )?;
    debug!(ic = kind.name(), function = ?function, "inline cache created");
    Ok(function)
}

/// Recompile the dispatch code of `cache` and swap it into its Code object
fn regenerate(rt: &RuntimeInner, cache: &InlineCache) -> JitResult<()> {
    let _scope = ScopeGuard::persistent(&rt.heap);
    let graph = dispatch_graph(cache.kind, &cache.probes)?;
    let fresh = compile_unit(rt, graph, UnitKind::Ic, &[])?;

    let mut heap = rt.heap()?;
    let entry = heap.code_entry(fresh)?;
    let size = heap.code_size(fresh)?;
    let record = heap.code_record(fresh)?.clone();
    heap.install_code_entry(cache.code, entry, size)?;
    *heap.code_record_mut(cache.code)? = record;
    Ok(())
}

/// Runtime half of an IC miss: `(ic, obj, key, update) -> slot | undefined`
pub(crate) fn get_property_slot(rt: &RuntimeInner, args: &[Value]) -> Result<Value, RuntimeError> {
    let &[ic, obj, key, update] = args else {
        return Err(JitError::internal(
            "getPropertySlot",
            format!("expected 4 arguments, got {}", args.len()),
        )
        .into());
    };

    let (slot, probe) = {
        let mut heap = rt.heap()?;
        if !heap.is_object(obj) {
            return Ok(rt.undefined);
        }
        let raw_key = key;
        let key = heap.property_key(obj, key)?;
        if let Some(slot) = heap.own_slot(obj, key) {
            // Dense and dictionary maps are shared by receivers with
            // different layouts.
            let cacheable = heap.map_of(obj).filter(|map| {
                let flags = heap.map_flags(*map);
                flags.contains(MapFlags::TRANSITION) && !flags.contains(MapFlags::DENSE)
            });
            (Some(slot), cacheable.map(|map| (map, key, raw_key == key)))
        } else if heap.to_boolean(update) {
            // Adding a property moves the receiver to a new map; the next
            // access through this site caches it.
            (heap.lookup_slot(obj, key, true)?, None)
        } else {
            (None, None)
        }
    };

    if let (Some(slot), Some((map, key, exact))) = (slot, probe) {
        record_probe(rt, ic, map, key, exact, slot)?;
    }

    Ok(match slot {
        Some(slot) => Value::smi(slot as i64),
        None => rt.undefined,
    })
}

/// Append a probe for `map` and regenerate the dispatch code.
///
/// `exact` is false when the key was normalised (a Smi used as a named
/// key). Keyed probes compare the raw argument, so such a probe could never
/// hit and is not recorded.
fn record_probe(
    rt: &RuntimeInner,
    ic: Value,
    map: Value,
    key: Value,
    exact: bool,
    slot: usize,
) -> JitResult<()> {
    let mut cache = rt.ics.get(ic)?;
    if cache.megamorphic || (cache.kind == IcKind::Normal && !exact) {
        return Ok(());
    }
    if cache.probes.len() >= rt.config.ic_probe_limit {
        warn!(
            ic = cache.kind.name(),
            probes = cache.probes.len(),
            "inline cache is megamorphic"
        );
        cache.megamorphic = true;
        return rt.ics.put(ic, cache);
    }

    let probe = Probe {
        map,
        key: (cache.kind == IcKind::Normal).then_some(key),
        slot,
    };
    if cache.probes.contains(&probe) {
        return Ok(());
    }
    cache.probes.push(probe);
    regenerate(rt, &cache)?;
    debug!(ic = cache.kind.name(), probes = cache.probes.len(), slot, "probe added");
    rt.ics.put(ic, cache)
}

//! Code generation: primitive ops onto Cranelift IR
//!
//! Values are tagged 64-bit words. Each primitive op has one arm in
//! [`Emitter::instr`]; Cranelift does register allocation, spilling, move
//! resolution and block layout. Every heap pointer embedded as an
//! immediate is recorded in the unit's [`CodeRecord`].

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::instructions::BlockArg;
use cranelift_codegen::ir::{
    self, InstBuilder, MemFlags, SigRef, Signature, StackSlot, StackSlotData, StackSlotKind, types,
};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use kiln_heap::layout::{code, function};
use kiln_heap::{CodeRecord, SpaceCursor, Value};
use kiln_ir::{BlockId, Cond, Const, Graph, Input, Instr, InstrId, Op, PrimOp};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::RuntimeContext;
use crate::error::{JitError, JitResult};
use crate::runtime::RuntimeInner;

/// Inputs of one code generation run
pub(crate) struct CodegenUnit<'a> {
    pub(crate) rt: &'a RuntimeInner,
    pub(crate) graph: &'a Graph,
    /// Code objects of the nested functions of the compile, by graph index
    pub(crate) nested: &'a [Option<Value>],
    pub(crate) brk: bool,
}

/// Translate `unit.graph` into `func`
pub(crate) fn emit(
    unit: &CodegenUnit<'_>,
    func: &mut ir::Function,
    signature: &Signature,
) -> JitResult<CodeRecord> {
    let order = reverse_postorder(unit.graph)?;
    let mut fb_ctx = FunctionBuilderContext::new();
    let mut builder = FunctionBuilder::new(func, &mut fb_ctx);
    let sig = builder.import_signature(signature.clone());

    let mut blocks = FxHashMap::default();
    for id in &order {
        let block = builder.create_block();
        for _ in unit.graph.phis(*id)? {
            builder.append_block_param(block, types::I64);
        }
        blocks.insert(*id, block);
    }
    let entry = blocks[&BlockId(0)];
    builder.append_block_params_for_function_params(entry);

    let mut emitter = Emitter {
        unit,
        b: builder,
        sig,
        blocks,
        values: FxHashMap::default(),
        params: None,
        pending: None,
        overflow: None,
        areas: Vec::new(),
        forward: None,
        phi_args: FxHashMap::default(),
        record: CodeRecord {
            name: unit.graph.name().to_owned(),
            ..CodeRecord::default()
        },
    };
    for id in &order {
        emitter.block(*id)?;
    }

    let Emitter { mut b, record, .. } = emitter;
    b.seal_all_blocks();
    b.finalize();
    Ok(record)
}

/// Blocks reachable from the entry, each after all of its dominators
fn reverse_postorder(graph: &Graph) -> JitResult<Vec<BlockId>> {
    let mut visited = FxHashSet::default();
    let mut postorder = Vec::with_capacity(graph.block_count());
    let mut stack = vec![(BlockId(0), 0usize)];
    visited.insert(BlockId(0));

    while let Some((block, next)) = stack.pop() {
        let successors = &graph.block(block)?.successors;
        if let Some(succ) = successors.get(next).copied() {
            stack.push((block, next + 1));
            if visited.insert(succ) {
                stack.push((succ, 0));
            }
        } else {
            postorder.push(block);
        }
    }
    postorder.reverse();
    Ok(postorder)
}

#[derive(Clone, Copy)]
struct Params {
    ctx: ir::Value,
    callee: ir::Value,
    this: ir::Value,
    argv: ir::Value,
    argc: ir::Value,
}

/// Outgoing argument area opened by `alignStack`
struct Area {
    slot: Option<StackSlot>,
    /// Slots still free; `pushArg` fills from the top down
    next: usize,
}

struct Emitter<'a, 'f> {
    unit: &'a CodegenUnit<'a>,
    b: FunctionBuilder<'f>,
    sig: SigRef,
    blocks: FxHashMap<BlockId, ir::Block>,
    values: FxHashMap<InstrId, ir::Value>,
    params: Option<Params>,
    /// Condition set by the last condition op, consumed by the terminator
    pending: Option<ir::Value>,
    /// Overflow flag of the last Smi arithmetic op
    overflow: Option<ir::Value>,
    areas: Vec<Area>,
    /// `argv`/`argc` forwarded by `repushArgs` to the next `smiCall`
    forward: Option<(ir::Value, ir::Value)>,
    /// Values fed to successor phis by this block's `toPhi`s
    phi_args: FxHashMap<InstrId, ir::Value>,
    record: CodeRecord,
}

fn trusted() -> MemFlags {
    MemFlags::trusted()
}

/// Byte offset of field `off` from a tagged pointer
fn tagged(off: i64) -> i32 {
    (off - 1) as i32
}

fn cond_code(cond: Cond) -> IntCC {
    match cond {
        Cond::Eq => IntCC::Equal,
        Cond::Ne => IntCC::NotEqual,
        Cond::Lt => IntCC::SignedLessThan,
        Cond::Le => IntCC::SignedLessThanOrEqual,
        Cond::Gt => IntCC::SignedGreaterThan,
        Cond::Ge => IntCC::SignedGreaterThanOrEqual,
    }
}

impl Emitter<'_, '_> {
    fn params(&self) -> JitResult<Params> {
        self.params
            .ok_or_else(|| JitError::internal("codegen", "entry block not emitted first"))
    }

    // ==================== Blocks ====================

    fn block(&mut self, id: BlockId) -> JitResult<()> {
        let graph = self.unit.graph;
        let block = self.blocks[&id];
        self.b.switch_to_block(block);
        self.pending = None;
        self.overflow = None;
        self.phi_args.clear();

        if id == BlockId(0) {
            let p = self.b.block_params(block);
            self.params = Some(Params {
                ctx: p[0],
                callee: p[1],
                this: p[2],
                argv: p[3],
                argc: p[4],
            });
            if self.unit.brk {
                self.b.ins().debugtrap();
            }
        } else {
            let params = self.b.block_params(block).to_vec();
            for (phi, param) in graph.phis(id)?.into_iter().zip(params) {
                self.values.insert(phi, param);
            }
        }

        let mut terminated = false;
        for instr_id in graph.block_instrs(id)? {
            if terminated {
                return Err(JitError::internal(
                    "codegen",
                    format!("{instr_id} follows a terminator in {id}"),
                ));
            }
            let instr = graph.instr(instr_id)?;
            terminated = self.instr(instr)?;
        }
        if terminated {
            return Ok(());
        }

        let successors = graph.block(id)?.successors.clone();
        match successors.as_slice() {
            [target] => {
                let (block, args) = self.edge(*target)?;
                self.b.ins().jump(block, &args);
            }
            [if_true, if_false] => {
                let cond = self.pending.take().ok_or_else(|| {
                    JitError::internal("codegen", format!("{id} branches without a condition"))
                })?;
                let (t, t_args) = self.edge(*if_true)?;
                let (f, f_args) = self.edge(*if_false)?;
                self.b.ins().brif(cond, t, &t_args, f, &f_args);
            }
            _ => {
                return Err(JitError::internal(
                    "codegen",
                    format!("{id} ends without a terminator"),
                ));
            }
        }
        Ok(())
    }

    /// Target block and phi arguments of an edge to `target`
    fn edge(&self, target: BlockId) -> JitResult<(ir::Block, Vec<BlockArg>)> {
        let block = *self
            .blocks
            .get(&target)
            .ok_or_else(|| JitError::internal("codegen", format!("{target} is not reachable")))?;
        let mut args = Vec::new();
        for phi in self.unit.graph.phis(target)? {
            let value = self.phi_args.get(&phi).copied().ok_or_else(|| {
                JitError::internal("toPhi", format!("no value for {phi} on edge to {target}"))
            })?;
            args.push(BlockArg::Value(value));
        }
        Ok((block, args))
    }

    // ==================== Operands ====================

    fn operand(&mut self, instr: &Instr, index: usize) -> JitResult<ir::Value> {
        match instr.input(index)? {
            Input::Value(id) => self.values.get(id).copied().ok_or_else(|| {
                JitError::internal(instr.op.to_string(), format!("{id} used before definition"))
            }),
            Input::Const(c) => {
                let c = c.clone();
                self.constant(&c)
            }
        }
    }

    fn word(&mut self, word: u64) -> ir::Value {
        self.b.ins().iconst(types::I64, word as i64)
    }

    fn strong(&mut self, value: Value) -> ir::Value {
        if value.is_pointer() {
            self.record.strong.push(value);
        }
        self.word(value.raw())
    }

    /// Materialise a constant, recording embedded heap pointers
    fn constant(&mut self, c: &Const) -> JitResult<ir::Value> {
        let rt = self.unit.rt;
        Ok(match c {
            Const::Raw(n) => self.b.ins().iconst(types::I64, *n),
            Const::Smi(n) => match Value::try_smi(*n) {
                Some(v) => self.word(v.raw()),
                None => {
                    let v = rt.heap()?.number(*n as f64)?;
                    self.strong(v)
                }
            },
            Const::Number(n) => {
                let v = rt.heap()?.number(*n)?;
                self.strong(v)
            }
            Const::Str(s) => {
                let v = rt.heap()?.string(s)?;
                self.strong(v)
            }
            Const::Bool(b) => {
                let v = rt.heap()?.boolean(*b);
                self.strong(v)
            }
            Const::Undefined => {
                let v = rt.heap()?.undefined();
                self.strong(v)
            }
            Const::Null => {
                let v = rt.heap()?.null();
                self.strong(v)
            }
            Const::Hole => {
                let v = rt.heap()?.hole();
                self.strong(v)
            }
            Const::Heap(v) => self.strong(*v),
            Const::Weak(v) => {
                self.record.weak.push(*v);
                self.word(v.raw())
            }
            Const::Stub(name) => {
                let stub = rt.stub(name)?;
                self.strong(stub.function())
            }
            Const::Runtime(name) => {
                let id = rt.runtime_id(name)?;
                self.word(Value::smi(id as i64).raw())
            }
            Const::Function(index) => {
                let code = self
                    .unit
                    .nested
                    .get(*index)
                    .copied()
                    .flatten()
                    .ok_or(JitError::UnknownFunction(*index))?;
                self.strong(code)
            }
            Const::Map(kind) => {
                let v = rt.heap()?.root_map(*kind);
                self.strong(v)
            }
            Const::Ic(kind) => {
                let ic = rt.new_ic(*kind)?;
                self.strong(ic)
            }
            Const::Cond(_) | Const::BinOp(_) | Const::UnOp(_) => {
                return Err(JitError::internal(
                    "literal",
                    format!("selector {c} cannot be materialised"),
                ));
            }
        })
    }

    fn cond_input(&self, instr: &Instr, index: usize) -> JitResult<IntCC> {
        match instr.const_input(index)? {
            Const::Cond(cond) => Ok(cond_code(*cond)),
            other => Err(JitError::internal(
                instr.op.to_string(),
                format!("expected a condition, found {other}"),
            )),
        }
    }

    fn load(&mut self, base: ir::Value, offset: i32) -> ir::Value {
        self.b.ins().load(types::I64, trusted(), base, offset)
    }

    fn young_cursor(&mut self) -> JitResult<ir::Value> {
        let ctx = self.params()?.ctx;
        Ok(self.load(ctx, RuntimeContext::YOUNG))
    }

    // ==================== Calls ====================

    /// Call the code of `target`, passing `callee` as the function argument
    fn call(
        &mut self,
        target: ir::Value,
        callee: ir::Value,
        this: ir::Value,
        argv: ir::Value,
        argc: ir::Value,
    ) -> JitResult<ir::Value> {
        let ctx = self.params()?.ctx;
        let code = self.load(target, tagged(function::CODE as i64));
        let entry = self.load(code, tagged(code::ENTRY as i64));
        let inst = self
            .b
            .ins()
            .call_indirect(self.sig, entry, &[ctx, callee, this, argv, argc]);
        Ok(self.b.inst_results(inst)[0])
    }

    /// Close the innermost argument area; returns its address
    fn close_area(&mut self, op: &str, argc: usize) -> JitResult<ir::Value> {
        let area = self
            .areas
            .pop()
            .ok_or_else(|| JitError::internal(op, "call without alignStack"))?;
        if area.next != 0 {
            return Err(JitError::internal(
                op,
                format!("{} of {argc} arguments not pushed", area.next),
            ));
        }
        Ok(match area.slot {
            Some(slot) => self.b.ins().stack_addr(types::I64, slot, 0),
            None => self.b.ins().iconst(types::I64, 0),
        })
    }

    // ==================== Instructions ====================

    /// Emit one instruction; returns whether it ended the block
    fn instr(&mut self, instr: &Instr) -> JitResult<bool> {
        let Op::Prim(op) = instr.op else {
            return Err(JitError::internal(
                instr.op.to_string(),
                format!("{} reached code generation unlowered", instr.id),
            ));
        };

        let result = match op {
            // Values
            PrimOp::Literal | PrimOp::Code => Some(self.operand(instr, 0)?),
            PrimOp::Global => {
                let ctx = self.params()?.ctx;
                Some(self.load(ctx, RuntimeContext::GLOBAL))
            }
            PrimOp::This => Some(self.params()?.this),
            PrimOp::SelfFn => Some(self.params()?.callee),
            PrimOp::Brk => {
                self.b.ins().debugtrap();
                None
            }

            // Control
            PrimOp::Ret | PrimOp::IcRet => {
                let v = self.operand(instr, 0)?;
                self.b.ins().return_(&[v]);
                return Ok(true);
            }
            PrimOp::Phi => None,
            PrimOp::ToPhi => {
                let phi = instr.value_input(0)?;
                let v = self.operand(instr, 1)?;
                self.phi_args.insert(phi, v);
                None
            }

            // Memory
            PrimOp::ReadTagged => {
                let obj = self.operand(instr, 0)?;
                let off = instr.raw_input(1)?;
                Some(self.load(obj, tagged(off)))
            }
            PrimOp::WriteTagged => {
                let obj = self.operand(instr, 0)?;
                let off = instr.raw_input(1)?;
                let v = self.operand(instr, 2)?;
                self.b.ins().store(trusted(), v, obj, tagged(off));
                None
            }
            PrimOp::SmiReadTagged => {
                let addr = self.indexed(instr)?;
                let base = instr.raw_input(2)?;
                Some(self.load(addr, tagged(base)))
            }
            PrimOp::SmiWriteTagged => {
                let addr = self.indexed(instr)?;
                let base = instr.raw_input(2)?;
                let v = self.operand(instr, 4)?;
                self.b.ins().store(trusted(), v, addr, tagged(base));
                None
            }
            PrimOp::PointerFill => {
                self.pointer_fill(instr)?;
                None
            }
            PrimOp::HeapCurrent => {
                let cursor = self.young_cursor()?;
                Some(self.load(cursor, SpaceCursor::TOP))
            }
            PrimOp::HeapLimit => {
                let cursor = self.young_cursor()?;
                Some(self.load(cursor, SpaceCursor::LIMIT))
            }
            PrimOp::HeapSetCurrent => {
                let v = self.operand(instr, 0)?;
                let cursor = self.young_cursor()?;
                self.b.ins().store(trusted(), v, cursor, SpaceCursor::TOP);
                None
            }
            PrimOp::HeapAlignSize => {
                let v = self.operand(instr, 0)?;
                let bumped = self.b.ins().iadd_imm(v, 7);
                Some(self.b.ins().band_imm(bumped, !7))
            }

            // Arguments and calls
            PrimOp::LoadArg => Some(self.load_arg(instr.raw_input(0)?)?),
            PrimOp::LoadStubArg | PrimOp::LoadIcArg => {
                let argv = self.params()?.argv;
                let index = instr.raw_input(0)?;
                Some(self.load(argv, (index * 8) as i32))
            }
            PrimOp::AlignStack => {
                let argc = instr.raw_input(0)? as usize;
                let words = (argc + 1) & !1;
                let slot = (words > 0).then(|| {
                    self.b.create_sized_stack_slot(StackSlotData::new(
                        StackSlotKind::ExplicitSlot,
                        (words * 8) as u32,
                        4,
                    ))
                });
                self.areas.push(Area { slot, next: argc });
                None
            }
            PrimOp::PushArg => {
                let v = self.operand(instr, 0)?;
                let area = self
                    .areas
                    .last_mut()
                    .ok_or_else(|| JitError::internal("pushArg", "no open argument area"))?;
                let (Some(slot), true) = (area.slot, area.next > 0) else {
                    return Err(JitError::internal("pushArg", "argument area is full"));
                };
                area.next -= 1;
                let offset = (area.next * 8) as i32;
                self.b.ins().stack_store(v, slot, offset);
                None
            }
            PrimOp::RepushArgs => {
                let argc = self.operand(instr, 0)?;
                let start = instr.raw_input(1)?;
                let argv = self.params()?.argv;
                let argv = self.b.ins().iadd_imm(argv, start * 8);
                self.forward = Some((argv, argc));
                None
            }
            PrimOp::Call => {
                let callee = self.operand(instr, 0)?;
                let this = self.operand(instr, 1)?;
                let argc = instr.raw_input(2)?;
                let argv = self.close_area("call", argc as usize)?;
                let argc = self.b.ins().iconst(types::I64, argc);
                Some(self.call(callee, callee, this, argv, argc)?)
            }
            PrimOp::CallStub => {
                let target = self.operand(instr, 0)?;
                let argc = instr.raw_input(1)?;
                let argv = self.close_area("callStub", argc as usize)?;
                let argc = self.b.ins().iconst(types::I64, argc);
                let this = self.constant(&Const::Undefined)?;
                Some(self.call(target, target, this, argv, argc)?)
            }
            PrimOp::TailCallStub => {
                let target = self.operand(instr, 0)?;
                let p = self.params()?;
                let v = self.call(target, p.callee, p.this, p.argv, p.argc)?;
                self.b.ins().return_(&[v]);
                return Ok(true);
            }
            PrimOp::SmiCall => {
                let callee = self.operand(instr, 0)?;
                let this = self.operand(instr, 1)?;
                let (argv, argc) = self
                    .forward
                    .take()
                    .ok_or_else(|| JitError::internal("smiCall", "no repushArgs before call"))?;
                Some(self.call(callee, callee, this, argv, argc)?)
            }

            // Conditions
            PrimOp::IsTrue | PrimOp::IsUndef => {
                let v = self.operand(instr, 0)?;
                let expected = self.constant(&if op == PrimOp::IsTrue {
                    Const::Bool(true)
                } else {
                    Const::Undefined
                })?;
                self.pending = Some(self.b.ins().icmp(IntCC::Equal, v, expected));
                None
            }
            PrimOp::IsSmi => {
                let v = self.operand(instr, 0)?;
                let tag = self.b.ins().band_imm(v, 1);
                self.pending = Some(self.b.ins().icmp_imm(IntCC::Equal, tag, 0));
                None
            }
            PrimOp::CheckOverflow => {
                let flag = self.overflow.take().ok_or_else(|| {
                    JitError::internal("checkOverflow", "no arithmetic op before the check")
                })?;
                self.pending = Some(flag);
                None
            }
            PrimOp::SmiCompare | PrimOp::PointerCompare => {
                let a = self.operand(instr, 0)?;
                let b = self.operand(instr, 1)?;
                let cc = self.cond_input(instr, 2)?;
                self.pending = Some(self.b.ins().icmp(cc, a, b));
                None
            }
            PrimOp::SmiTest => {
                let v = self.operand(instr, 0)?;
                let mask = instr.raw_input(1)?;
                let bits = self.b.ins().band_imm(v, mask);
                self.pending = Some(self.b.ins().icmp_imm(IntCC::NotEqual, bits, 0));
                None
            }

            // Arithmetic
            PrimOp::SmiNeg => {
                let v = self.operand(instr, 0)?;
                self.overflow = Some(self.b.ins().icmp_imm(IntCC::Equal, v, i64::MIN));
                Some(self.b.ins().ineg(v))
            }
            PrimOp::SmiUntag => {
                let v = self.operand(instr, 0)?;
                Some(self.b.ins().sshr_imm(v, 1))
            }
            PrimOp::SmiTag => {
                let v = self.operand(instr, 0)?;
                Some(self.b.ins().ishl_imm(v, 1))
            }
            PrimOp::SmiAdd => {
                let a = self.operand(instr, 0)?;
                let b = self.operand(instr, 1)?;
                let r = self.b.ins().iadd(a, b);
                // Overflow iff both operands differ in sign from the result.
                let ar = self.b.ins().bxor(a, r);
                let br = self.b.ins().bxor(b, r);
                let both = self.b.ins().band(ar, br);
                self.overflow = Some(self.b.ins().icmp_imm(IntCC::SignedLessThan, both, 0));
                Some(r)
            }
            PrimOp::SmiSub => {
                let a = self.operand(instr, 0)?;
                let b = self.operand(instr, 1)?;
                let r = self.b.ins().isub(a, b);
                // Overflow iff the operands differ in sign and the result
                // differs from the minuend.
                let ab = self.b.ins().bxor(a, b);
                let ar = self.b.ins().bxor(a, r);
                let both = self.b.ins().band(ab, ar);
                self.overflow = Some(self.b.ins().icmp_imm(IntCC::SignedLessThan, both, 0));
                Some(r)
            }
            PrimOp::SmiMul => {
                let a = self.operand(instr, 0)?;
                let b = self.operand(instr, 1)?;
                let untagged = self.b.ins().sshr_imm(b, 1);
                let r = self.b.ins().imul(a, untagged);
                let high = self.b.ins().smulhi(a, untagged);
                let sign = self.b.ins().sshr_imm(r, 63);
                self.overflow = Some(self.b.ins().icmp(IntCC::NotEqual, high, sign));
                Some(r)
            }
            PrimOp::Pointer => {
                let v = self.operand(instr, 0)?;
                Some(self.b.ins().bor_imm(v, 1))
            }
            PrimOp::PointerAdd => {
                let a = self.operand(instr, 0)?;
                let b = self.operand(instr, 1)?;
                Some(self.b.ins().iadd(a, b))
            }
        };

        if let Some(value) = result {
            self.values.insert(instr.id, value);
        }
        Ok(false)
    }

    /// `obj + untag(index) * scale` for the Smi-indexed memory ops
    fn indexed(&mut self, instr: &Instr) -> JitResult<ir::Value> {
        let obj = self.operand(instr, 0)?;
        let index = self.operand(instr, 1)?;
        let scale = instr.raw_input(3)?;
        let untagged = self.b.ins().sshr_imm(index, 1);
        let scaled = self.b.ins().imul_imm(untagged, scale);
        Ok(self.b.ins().iadd(obj, scaled))
    }

    /// Argument `index`, or `undefined` past `argc`
    fn load_arg(&mut self, index: i64) -> JitResult<ir::Value> {
        let p = self.params()?;
        let undef = self.constant(&Const::Undefined)?;

        let load_block = self.b.create_block();
        let undef_block = self.b.create_block();
        let merge_block = self.b.create_block();
        self.b.append_block_param(merge_block, types::I64);

        let has_arg = self.b.ins().icmp_imm(IntCC::UnsignedGreaterThan, p.argc, index);
        self.b.ins().brif(has_arg, load_block, &[], undef_block, &[]);

        self.b.switch_to_block(load_block);
        let loaded = self.load(p.argv, (index * 8) as i32);
        self.b.ins().jump(merge_block, &[BlockArg::Value(loaded)]);

        self.b.switch_to_block(undef_block);
        self.b.ins().jump(merge_block, &[BlockArg::Value(undef)]);

        self.b.switch_to_block(merge_block);
        Ok(self.b.block_params(merge_block)[0])
    }

    /// Store `value` into `count` consecutive words starting at `offset`
    fn pointer_fill(&mut self, instr: &Instr) -> JitResult<()> {
        let obj = self.operand(instr, 0)?;
        let offset = instr.raw_input(1)?;
        let count = self.operand(instr, 2)?;
        let value = self.operand(instr, 3)?;

        let start = self.b.ins().iadd_imm(obj, offset - 1);
        let bytes = self.b.ins().ishl_imm(count, 3);
        let end = self.b.ins().iadd(start, bytes);

        let header = self.b.create_block();
        let body = self.b.create_block();
        let exit = self.b.create_block();
        self.b.append_block_param(header, types::I64);
        self.b.ins().jump(header, &[BlockArg::Value(start)]);

        self.b.switch_to_block(header);
        let cursor = self.b.block_params(header)[0];
        let more = self.b.ins().icmp(IntCC::UnsignedLessThan, cursor, end);
        self.b.ins().brif(more, body, &[], exit, &[]);

        self.b.switch_to_block(body);
        self.b.ins().store(trusted(), value, cursor, 0);
        let next = self.b.ins().iadd_imm(cursor, 8);
        self.b.ins().jump(header, &[BlockArg::Value(next)]);

        self.b.switch_to_block(exit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ir::Builder;

    #[test]
    fn reverse_postorder_visits_dominators_first() {
        let mut b = Builder::new("diamond");
        let v = b.literal(Const::Bool(true)).expect("literal should succeed");
        b.is_smi(v).expect("emit should succeed");
        let join = b.new_block();
        let left = b.new_block();
        let right = b.new_block();
        b.branch(left, right).expect("branch should succeed");
        b.switch_to(left);
        b.jump(join).expect("jump should succeed");
        b.switch_to(right);
        b.jump(join).expect("jump should succeed");
        b.switch_to(join);
        b.ret(v).expect("ret should succeed");
        let graph = b.finish();

        let order = reverse_postorder(&graph).expect("order should succeed");
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], BlockId(0));
        assert_eq!(order[3], join);
    }

    #[test]
    fn unreachable_blocks_are_skipped() {
        let mut b = Builder::new("dead");
        let v = b.literal(Const::Undefined).expect("literal should succeed");
        b.ret(v).expect("ret should succeed");
        b.new_block();
        let graph = b.finish();
        let order = reverse_postorder(&graph).expect("order should succeed");
        assert_eq!(order, vec![BlockId(0)]);
    }

    #[test]
    fn condition_codes_are_signed() {
        assert_eq!(cond_code(Cond::Lt), IntCC::SignedLessThan);
        assert_eq!(cond_code(Cond::Ge), IntCC::SignedGreaterThanOrEqual);
        assert_eq!(tagged(8), 7);
    }
}

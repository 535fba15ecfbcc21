//! Operation kinds and their descriptor table

use std::fmt;

/// Operations produced by the front end and removed by platform lowering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HighOp {
    // ==================== Globals ====================
    /// `[name]` -> value
    LoadGlobal,
    /// `[name, value]` -> value
    StoreGlobal,
    /// `[name]` -> boolean
    DeleteGlobal,

    // ==================== Properties ====================
    /// `[object, key]` -> value
    LoadProperty,
    /// `[object, key, value]` -> value
    StoreProperty,
    /// `[object, key]` -> boolean
    DeleteProperty,

    // ==================== Allocation ====================
    /// `[]` -> empty object
    Object,
    /// `[raw length]` -> dense array of holes
    Array,
    /// `[function index]` -> closure
    Fn,
    /// `[function, raw argc]`, preceded by `argc` pushes -> instance
    New,

    // ==================== Operators ====================
    /// `[unop, value]` -> value
    Unary,
    /// `[binop, left, right]` -> value
    Binary,
    /// `[value]`; sets the pending condition from its truthiness
    Branch,
}

/// Primitive operations understood by the code generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimOp {
    // ==================== Values ====================
    /// `[const]` -> tagged constant
    Literal,
    /// `[function index]` -> Code object of a nested function
    Code,
    /// The global object
    Global,
    /// The `this` argument
    This,
    /// The function being executed (for ICs: the IC itself)
    SelfFn,
    /// Debug trap
    Brk,

    // ==================== Control ====================
    /// `[value]`; returns from a function or stub
    Ret,
    /// `[slot]`; returns a cached slot from IC dispatch code
    IcRet,
    /// Block parameter placed at the head of a join block
    Phi,
    /// `[phi, value]`; value flowing into `phi` along this block's edge
    ToPhi,

    // ==================== Memory ====================
    /// `[object, raw offset]` -> tagged word
    ReadTagged,
    /// `[object, raw offset, value]`
    WriteTagged,
    /// `[object, smi index, raw base, raw scale]` -> tagged word
    SmiReadTagged,
    /// `[object, smi index, raw base, raw scale, value]`
    SmiWriteTagged,
    /// `[object, raw offset, raw count, value]`; fills `count` words
    PointerFill,
    /// Young-space allocation top (raw address)
    HeapCurrent,
    /// Young-space page limit (raw address)
    HeapLimit,
    /// `[raw address]`; moves the allocation top
    HeapSetCurrent,
    /// `[raw size]` -> size rounded to the heap alignment
    HeapAlignSize,

    // ==================== Arguments and calls ====================
    /// `[raw index]` -> argument, or `undefined` past `argc`
    LoadArg,
    /// `[raw index]` -> stub argument, unchecked
    LoadStubArg,
    /// `[raw index]` -> IC argument, unchecked
    LoadIcArg,
    /// `[raw words]`; opens an aligned outgoing argument area
    AlignStack,
    /// `[value]`; stores into the open argument area, last slot first
    PushArg,
    /// `[raw argc, raw start]`; forwards this frame's arguments to the next `SmiCall`
    RepushArgs,
    /// `[function, this, raw argc]` -> result
    Call,
    /// `[stub or ic, raw argc]` -> result
    CallStub,
    /// `[stub]`; calls with this frame's callee and arguments, then returns
    TailCallStub,
    /// `[function, this]` -> result, with arguments from `RepushArgs`
    SmiCall,

    // ==================== Conditions ====================
    /// `[value]`; condition `value === true`
    IsTrue,
    /// `[value]`; condition `value === undefined`
    IsUndef,
    /// `[value]`; condition "is a Smi"
    IsSmi,
    /// Condition "the last Smi arithmetic overflowed"
    CheckOverflow,
    /// `[a, b, cond]`; signed comparison of tagged Smis
    SmiCompare,
    /// `[value, raw mask]`; condition `value & mask != 0`
    SmiTest,
    /// `[a, b, cond]`; comparison of raw words or pointers
    PointerCompare,

    // ==================== Arithmetic ====================
    /// `[value]` -> `-value`
    SmiNeg,
    /// `[smi]` -> raw integer
    SmiUntag,
    /// `[raw]` -> smi
    SmiTag,
    /// `[a, b]` -> `a + b`, overflow recorded
    SmiAdd,
    /// `[a, b]` -> `a - b`, overflow recorded
    SmiSub,
    /// `[a, b]` -> `a * b`, overflow recorded
    SmiMul,
    /// `[raw address]` -> tagged pointer
    Pointer,
    /// `[raw a, raw b]` -> `a + b`
    PointerAdd,
}

/// Any IR operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Removed by lowering
    High(HighOp),
    /// Emitted by the code generator
    Prim(PrimOp),
}

/// Static description of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpInfo {
    /// Name used in dumps
    pub name: &'static str,
    /// Number of inputs
    pub inputs: usize,
    /// Whether the instruction defines a value
    pub output: bool,
    /// Whether the instruction calls out of the current function
    pub call: bool,
    /// Whether the instruction sets the pending condition
    pub cond: bool,
}

const fn info(name: &'static str, inputs: usize, output: bool) -> OpInfo {
    OpInfo {
        name,
        inputs,
        output,
        call: false,
        cond: false,
    }
}

const fn call(name: &'static str, inputs: usize) -> OpInfo {
    OpInfo {
        name,
        inputs,
        output: true,
        call: true,
        cond: false,
    }
}

const fn cond(name: &'static str, inputs: usize) -> OpInfo {
    OpInfo {
        name,
        inputs,
        output: false,
        call: false,
        cond: true,
    }
}

impl HighOp {
    /// Descriptor of this operation
    pub const fn info(self) -> OpInfo {
        match self {
            HighOp::LoadGlobal => info("loadGlobal", 1, true),
            HighOp::StoreGlobal => info("storeGlobal", 2, true),
            HighOp::DeleteGlobal => info("deleteGlobal", 1, true),
            HighOp::LoadProperty => info("loadProperty", 2, true),
            HighOp::StoreProperty => info("storeProperty", 3, true),
            HighOp::DeleteProperty => info("deleteProperty", 2, true),
            HighOp::Object => info("object", 0, true),
            HighOp::Array => info("array", 1, true),
            HighOp::Fn => info("fn", 1, true),
            HighOp::New => call("new", 2),
            HighOp::Unary => info("unary", 2, true),
            HighOp::Binary => info("binary", 3, true),
            HighOp::Branch => cond("branch", 1),
        }
    }
}

impl PrimOp {
    /// Descriptor of this operation
    pub const fn info(self) -> OpInfo {
        match self {
            PrimOp::Literal => info("literal", 1, true),
            PrimOp::Code => info("code", 1, true),
            PrimOp::Global => info("global", 0, true),
            PrimOp::This => info("this", 0, true),
            PrimOp::SelfFn => info("self", 0, true),
            PrimOp::Brk => info("brk", 0, false),
            PrimOp::Ret => info("ret", 1, false),
            PrimOp::IcRet => info("icRet", 1, false),
            PrimOp::Phi => info("phi", 0, true),
            PrimOp::ToPhi => info("toPhi", 2, false),
            PrimOp::ReadTagged => info("readTagged", 2, true),
            PrimOp::WriteTagged => info("writeTagged", 3, false),
            PrimOp::SmiReadTagged => info("smiReadTagged", 4, true),
            PrimOp::SmiWriteTagged => info("smiWriteTagged", 5, false),
            PrimOp::PointerFill => info("pointerFill", 4, false),
            PrimOp::HeapCurrent => info("heapCurrent", 0, true),
            PrimOp::HeapLimit => info("heapLimit", 0, true),
            PrimOp::HeapSetCurrent => info("heapSetCurrent", 1, false),
            PrimOp::HeapAlignSize => info("heapAlignSize", 1, true),
            PrimOp::LoadArg => info("loadArg", 1, true),
            PrimOp::LoadStubArg => info("loadStubArg", 1, true),
            PrimOp::LoadIcArg => info("loadICArg", 1, true),
            PrimOp::AlignStack => info("alignStack", 1, false),
            PrimOp::PushArg => info("pushArg", 1, false),
            PrimOp::RepushArgs => info("repushArgs", 2, false),
            PrimOp::Call => call("call", 3),
            PrimOp::CallStub => call("callStub", 2),
            PrimOp::TailCallStub => OpInfo {
                name: "tailCallStub",
                inputs: 1,
                output: false,
                call: true,
                cond: false,
            },
            PrimOp::SmiCall => call("smiCall", 2),
            PrimOp::IsTrue => cond("isTrue", 1),
            PrimOp::IsUndef => cond("isUndef", 1),
            PrimOp::IsSmi => cond("isSmi", 1),
            PrimOp::CheckOverflow => cond("checkOverflow", 0),
            PrimOp::SmiCompare => cond("smiCompare", 3),
            PrimOp::SmiTest => cond("smiTest", 2),
            PrimOp::PointerCompare => cond("pointerCompare", 3),
            PrimOp::SmiNeg => info("smiNeg", 1, true),
            PrimOp::SmiUntag => info("smiUntag", 1, true),
            PrimOp::SmiTag => info("smiTag", 1, true),
            PrimOp::SmiAdd => info("smiAdd", 2, true),
            PrimOp::SmiSub => info("smiSub", 2, true),
            PrimOp::SmiMul => info("smiMul", 2, true),
            PrimOp::Pointer => info("pointer", 1, true),
            PrimOp::PointerAdd => info("pointerAdd", 2, true),
        }
    }

    /// Whether the instruction ends its block without falling through
    pub const fn is_terminator(self) -> bool {
        matches!(self, PrimOp::Ret | PrimOp::IcRet | PrimOp::TailCallStub)
    }
}

impl Op {
    /// Descriptor of this operation
    pub const fn info(self) -> OpInfo {
        match self {
            Op::High(op) => op.info(),
            Op::Prim(op) => op.info(),
        }
    }

    /// The primitive kind, if lowering is complete for this instruction
    pub const fn prim(self) -> Option<PrimOp> {
        match self {
            Op::Prim(op) => Some(op),
            Op::High(_) => None,
        }
    }
}

impl From<HighOp> for Op {
    fn from(op: HighOp) -> Self {
        Op::High(op)
    }
}

impl From<PrimOp> for Op {
    fn from(op: PrimOp) -> Self {
        Op::Prim(op)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.info().name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_define_values() {
        for op in [PrimOp::Call, PrimOp::CallStub, PrimOp::SmiCall] {
            let info = op.info();
            assert!(info.call);
            assert!(info.output);
        }
    }

    #[test]
    fn condition_ops_define_nothing() {
        for op in [PrimOp::IsSmi, PrimOp::SmiCompare, PrimOp::CheckOverflow] {
            assert!(op.info().cond);
            assert!(!op.info().output);
        }
        assert!(HighOp::Branch.info().cond);
    }

    #[test]
    fn terminators() {
        assert!(PrimOp::Ret.is_terminator());
        assert!(PrimOp::TailCallStub.is_terminator());
        assert!(!PrimOp::Call.is_terminator());
    }
}

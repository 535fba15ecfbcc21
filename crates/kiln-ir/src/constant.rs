//! Embedded constants

use std::fmt;

use kiln_heap::{MapKind, Value};

/// Binary operators that survive into the IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNe,
    /// `instanceof`
    InstanceOf,
}

impl BinOp {
    /// Every operator, in stub declaration order
    pub const ALL: [BinOp; 8] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Lt,
        BinOp::Le,
        BinOp::StrictEq,
        BinOp::StrictNe,
        BinOp::InstanceOf,
    ];

    /// Source spelling, also the stub key (`binary/<symbol>`)
    pub const fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::StrictEq => "===",
            BinOp::StrictNe => "!==",
            BinOp::InstanceOf => "instanceof",
        }
    }
}

/// Unary operators that survive into the IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    /// `-x`
    Neg,
    /// `!x`
    Not,
}

impl UnOp {
    /// Source spelling, also the stub key (`unary/<symbol>`)
    pub const fn symbol(self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "!",
        }
    }
}

/// Signed comparison producing the pending condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Inline cache flavour at a property access site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IcKind {
    /// Probes compare the receiver map and the key
    Normal,
    /// The key is a literal; probes compare the receiver map only
    Fixed,
}

impl IcKind {
    /// Name used in traces and symbol names
    pub const fn name(self) -> &'static str {
        match self {
            IcKind::Normal => "getPropertySlot",
            IcKind::Fixed => "getFixedPropertySlot",
        }
    }
}

/// A constant embedded as an instruction input
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    /// Untagged machine word: offsets, counts, masks
    Raw(i64),
    /// Small integer, tagged on materialisation
    Smi(i64),
    /// Number that may need boxing
    Number(f64),
    /// String, interned on materialisation
    Str(String),
    /// `true` / `false`
    Bool(bool),
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Empty storage marker
    Hole,
    /// Heap object kept alive by the generated code
    Heap(Value),
    /// Heap object observed without ownership
    Weak(Value),
    /// Named stub function
    Stub(String),
    /// Runtime callback id, looked up by name
    Runtime(String),
    /// Nested function of the same compile, by graph index
    Function(usize),
    /// A root map
    Map(MapKind),
    /// A fresh inline cache for this site
    Ic(IcKind),
    /// Comparison selector
    Cond(Cond),
    /// Binary operator selector
    BinOp(BinOp),
    /// Unary operator selector
    UnOp(UnOp),
}

impl Const {
    /// Raw integer payload
    pub fn as_raw(&self) -> Option<i64> {
        match self {
            Const::Raw(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Raw(n) => write!(f, "{n}"),
            Const::Smi(n) => write!(f, "smi {n}"),
            Const::Number(n) => write!(f, "num {n}"),
            Const::Str(s) => write!(f, "{s:?}"),
            Const::Bool(b) => write!(f, "{b}"),
            Const::Undefined => write!(f, "undefined"),
            Const::Null => write!(f, "null"),
            Const::Hole => write!(f, "hole"),
            Const::Heap(v) => write!(f, "heap {v:?}"),
            Const::Weak(v) => write!(f, "weak {v:?}"),
            Const::Stub(name) => write!(f, "stub {name}"),
            Const::Runtime(name) => write!(f, "runtime {name}"),
            Const::Function(index) => write!(f, "fn #{index}"),
            Const::Map(kind) => write!(f, "map {}", kind.name()),
            Const::Ic(kind) => write!(f, "ic {}", kind.name()),
            Const::Cond(cond) => write!(f, "{cond:?}"),
            Const::BinOp(op) => write!(f, "{}", op.symbol()),
            Const::UnOp(op) => write!(f, "{}", op.symbol()),
        }
    }
}

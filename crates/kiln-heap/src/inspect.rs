//! Host-side views of tagged values

use std::fmt;

use crate::heap::Heap;
use crate::layout::{field, object};
use crate::value::Value;

/// A tagged value decoded for the embedder
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Empty storage marker; never observable from scripts
    Hole,
    /// `true` / `false`
    Bool(bool),
    /// Small integer
    Int(i64),
    /// Boxed double
    Number(f64),
    /// Interned string
    String(String),
    /// Callable object
    Function,
    /// Dense array with its storage length
    Array(usize),
    /// Any other object
    Object,
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undefined => write!(f, "undefined"),
            HostValue::Null => write!(f, "null"),
            HostValue::Hole => write!(f, "<hole>"),
            HostValue::Bool(b) => write!(f, "{b}"),
            HostValue::Int(n) => write!(f, "{n}"),
            HostValue::Number(n) if n.is_nan() => write!(f, "NaN"),
            HostValue::Number(n) if n.is_infinite() => {
                write!(f, "{}Infinity", if *n < 0.0 { "-" } else { "" })
            }
            HostValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e21 => write!(f, "{n:.0}"),
            HostValue::Number(n) => write!(f, "{n}"),
            HostValue::String(s) => write!(f, "{s}"),
            HostValue::Function => write!(f, "function"),
            HostValue::Array(len) => write!(f, "[array {len}]"),
            HostValue::Object => write!(f, "[object Object]"),
        }
    }
}

impl Heap {
    /// Decode `value` for the host
    pub fn inspect(&self, value: Value) -> HostValue {
        if let Some(n) = value.as_smi() {
            return HostValue::Int(n);
        }
        if value == self.undefined() {
            return HostValue::Undefined;
        }
        if value == self.null() {
            return HostValue::Null;
        }
        if value == self.hole() {
            return HostValue::Hole;
        }
        if value == self.true_value() || value == self.false_value() {
            return HostValue::Bool(value == self.true_value());
        }
        if let Some(s) = self.str_of(value) {
            return HostValue::String(s.to_owned());
        }
        if let Some(n) = self.number_value(value) {
            return HostValue::Number(n);
        }
        if self.is_function(value) {
            return HostValue::Function;
        }
        if self.is_dense(value) {
            // SAFETY: dense values are objects whose FIELD is a Field.
            let len = unsafe {
                value
                    .read_field(object::FIELD)
                    .read_field(field::SIZE)
            };
            return HostValue::Array(len.as_smi().unwrap_or(0) as usize);
        }
        HostValue::Object
    }

    /// String conversion used for property keys and `+` on strings
    pub fn to_display_string(&self, value: Value) -> String {
        self.inspect(value).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_primitives() {
        let mut heap = Heap::new().expect("heap creation should succeed");
        assert_eq!(heap.inspect(Value::smi(-1)), HostValue::Int(-1));
        assert_eq!(heap.inspect(heap.undefined()), HostValue::Undefined);
        assert_eq!(heap.inspect(heap.true_value()), HostValue::Bool(true));
        let s = heap.string("oook").expect("string");
        assert_eq!(heap.inspect(s), HostValue::String("oook".into()));
        let n = heap.number(2.5).expect("number");
        assert_eq!(heap.inspect(n).to_string(), "2.5");
    }

    #[test]
    fn display_matches_script_conventions() {
        assert_eq!(HostValue::Number(1e20).to_string(), "100000000000000000000");
        assert_eq!(HostValue::Number(f64::NAN).to_string(), "NaN");
        assert_eq!(HostValue::Number(f64::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(HostValue::Object.to_string(), "[object Object]");
    }
}

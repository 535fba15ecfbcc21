//! End-to-end compile and run tests

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use kiln_jit::{HostValue, JitConfig, JitError, Runtime, RuntimeError, Value};

fn runtime() -> Runtime {
    Runtime::new(JitConfig::default()).expect("runtime should start")
}

fn eval(source: &str) -> String {
    let rt = runtime();
    let value = rt.eval(source).expect("script should run");
    rt.display(value).expect("display should succeed")
}

/// `log` sink shared with the test
#[derive(Clone, Default)]
struct Captured(Rc<RefCell<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

// ==================== Arithmetic ====================

#[test]
fn arithmetic_expression() {
    assert_eq!(eval("(1 * 2) + (3 - 6)"), "-1");
}

#[test]
fn long_addition_chain() {
    assert_eq!(eval("1 + 2 + 3 + 4 + 5 + 6 + 7 + 8 + 9 + 10 + 11 + 12 + 13 + 14"), "105");
}

#[test]
fn right_nested_addition_keeps_every_operand_live() {
    let source = "1 + (2 + (3 + (4 + (5 + (6 + (7 + (8 + (9 + (10 + (11 + (12 + (13 + 14))))))))))))";
    assert_eq!(eval(source), "105");
}

#[test]
fn comparisons() {
    assert_eq!(eval("1 < 2"), "true");
    assert_eq!(eval("2 < 2"), "false");
    assert_eq!(eval("2 <= 2"), "true");
    assert_eq!(eval("3 <= 2"), "false");
    assert_eq!(eval("2 > 1"), "true");
    assert_eq!(eval("2 === 2"), "true");
    assert_eq!(eval("2 !== 2"), "false");
}

#[test]
fn doubles_take_the_runtime_path() {
    assert_eq!(eval("0.5 + 0.25"), "0.75");
    assert_eq!(eval("0.5 < 1"), "true");
}

#[test]
fn negation() {
    assert_eq!(eval("-(3 * 4)"), "-12");
    assert_eq!(eval("!0"), "true");
}

#[test]
fn smi_overflow_produces_a_boxed_number() {
    let rt = runtime();
    let value = rt
        .eval("var a = 1073741824; a * a * a")
        .expect("script should run");
    assert_eq!(
        rt.inspect(value).expect("inspect should succeed"),
        HostValue::Number(2f64.powi(90))
    );
}

#[test]
fn string_concatenation() {
    assert_eq!(eval("'a' + 1"), "a1");
    assert_eq!(eval("'ab' === 'a' + 'b'"), "true");
}

// ==================== Globals and functions ====================

#[test]
fn globals_are_properties_of_the_global_object() {
    let rt = runtime();
    rt.eval("var a = 'oook';").expect("script should run");
    let a = rt.global("a").expect("global should be readable");
    assert_eq!(rt.display(a).expect("display should succeed"), "oook");
}

#[test]
fn assignment_to_undeclared_name_creates_a_global() {
    assert_eq!(eval("ohai = \"oook\"; ohai"), "oook");
}

#[test]
fn undeclared_global_is_undefined() {
    assert_eq!(eval("missing"), "undefined");
}

#[test]
fn missing_arguments_are_undefined() {
    assert_eq!(eval("function f(a, b, c) { return c; } f(1, 2)"), "undefined");
}

#[test]
fn branches_merge_locals() {
    let source = "function pick(c) { var r = 1; if (c) { r = 2; } return r; } \
                  pick(true) * 10 + pick(false)";
    assert_eq!(eval(source), "21");
}

#[test]
fn host_calls_compiled_functions() {
    let rt = runtime();
    rt.eval("function add(a, b) { return a + b; }")
        .expect("script should run");
    let add = rt.global("add").expect("global should be readable");
    let add = rt
        .function(add)
        .expect("function check should succeed")
        .expect("add is a function");
    let sum = add
        .call(&[Value::smi(40), Value::smi(2)])
        .expect("call should succeed");
    assert_eq!(sum.as_smi(), Some(42));
}

#[test]
fn compiled_functions_can_be_called_repeatedly() {
    let rt = runtime();
    let script = rt.compile("var n = 3; n * n").expect("compile should succeed");
    let first = script.call(&[]).expect("first call should succeed");
    let second = script.call(&[]).expect("second call should succeed");
    assert_eq!(first.as_smi(), Some(9));
    assert_eq!(first, second);
    assert_eq!(rt.context_depth(), 0);
}

#[test]
fn compiling_twice_gives_independent_functions() {
    let rt = runtime();
    let source = "var o = { x: 1 }; o.x + 41";
    let first = rt.compile(source).expect("first compile should succeed");
    let second = rt.compile(source).expect("second compile should succeed");
    assert_ne!(first.value(), second.value());

    let results = [
        first.call(&[]).expect("first call should succeed"),
        second.call(&[]).expect("second call should succeed"),
        first.call(&[]).expect("third call should succeed"),
        second.call(&[]).expect("fourth call should succeed"),
    ];
    for result in results {
        assert_eq!(result.as_smi(), Some(42));
    }
}

// ==================== Objects ====================

#[test]
fn object_literals_and_computed_keys() {
    assert_eq!(eval("var o = { a: 1, b: 2 }; o.a + o['b']"), "3");
}

#[test]
fn arrays_use_index_keys() {
    assert_eq!(eval("var arr = [1, 2, 3]; arr[0] + arr[2]"), "4");
}

#[test]
fn array_elements_can_be_rewritten_after_the_literal() {
    assert_eq!(eval("var a = [10, 20, 30]; a[1] = a[0] + a[2]; a[1]"), "40");
}

#[test]
fn large_array_literals_compile() {
    let elements: Vec<String> = (0..2000).map(|i| i.to_string()).collect();
    let source = format!("var a = [{}]; a[1999] + a[0]", elements.join(", "));
    assert_eq!(eval(&source), "1999");
}

#[test]
fn deleted_properties_read_as_undefined() {
    assert_eq!(eval("var o = { a: 1 }; delete o.a; o.a"), "undefined");
}

#[test]
fn constructors_and_instanceof() {
    let source = "function P() { this.v = 7; } var p = new P(); \
                  (p instanceof P) && p.v === 7";
    assert_eq!(eval(source), "true");
}

// ==================== Builtins and errors ====================

#[test]
fn log_writes_display_strings() {
    let rt = runtime();
    let out = Captured::default();
    rt.set_output(out.clone());
    rt.eval("log(1 + 1); log('hi'); log(undefined)")
        .expect("script should run");
    assert_eq!(out.text(), "2\nhi\nundefined\n");
}

#[test]
fn calling_a_non_function_is_a_type_error() {
    let rt = runtime();
    let err = rt.eval("var x = 1; x()").expect_err("call should fail");
    match err {
        RuntimeError::TypeError(message) => assert!(message.contains("is not a function")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn instanceof_needs_a_function() {
    let rt = runtime();
    assert!(matches!(
        rt.eval("var o = {}; o instanceof o"),
        Err(RuntimeError::TypeError(_))
    ));
}

#[test]
fn syntax_errors_are_compile_errors() {
    let rt = runtime();
    assert!(matches!(rt.compile("var = ;"), Err(JitError::Compile(_))));
}

#[test]
fn stubs_compile_on_demand() {
    let rt = runtime();
    let before = rt.stub_count();
    rt.eval("1 + 2").expect("script should run");
    assert!(rt.stub_count() > before);
}

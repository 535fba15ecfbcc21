//! Graph construction tests

use kiln_frontend::{CompileError, construct};
use kiln_ir::{BinOp, Const, Graph, HighOp, Op, PrimOp};

fn ops(graph: &Graph) -> Vec<Op> {
    graph
        .blocks()
        .flat_map(|(_, block)| block.instrs.clone())
        .map(|id| graph.instr(id).expect("instruction exists").op)
        .collect()
}

#[test]
fn arithmetic_script_returns_completion_value() {
    let graphs = construct("(1 * 2) + (3 - 6)").expect("construct should succeed");
    assert_eq!(graphs.len(), 1);
    let ops = ops(&graphs[0]);
    assert_eq!(
        ops.iter().filter(|op| **op == Op::High(HighOp::Binary)).count(),
        3
    );
    assert_eq!(ops.last(), Some(&Op::Prim(PrimOp::Ret)));
}

#[test]
fn greater_than_swaps_operands() {
    let graphs = construct("a > b").expect("construct should succeed");
    let graph = &graphs[0];
    let binary = graph
        .blocks()
        .flat_map(|(_, block)| block.instrs.clone())
        .map(|id| graph.instr(id).expect("instruction exists"))
        .find(|instr| instr.op == Op::High(HighOp::Binary))
        .expect("binary present");
    assert_eq!(
        binary.const_input(0).expect("operator"),
        &Const::BinOp(BinOp::Lt)
    );
    let left = graph
        .instr(binary.value_input(1).expect("left"))
        .expect("left exists");
    // `b` is loaded second, so it is the later instruction.
    assert!(left.id > binary.value_input(2).expect("right"));
}

#[test]
fn nested_functions_are_listed_outermost_first() {
    let graphs = construct("function add(a, b, c) { return a + b; } add(1, 2)")
        .expect("construct should succeed");
    assert_eq!(graphs.len(), 2);
    assert_eq!(graphs[0].name(), "script");
    assert_eq!(graphs[1].name(), "add");
    assert_eq!(graphs[1].params(), 3);
    let ops = ops(&graphs[1]);
    assert_eq!(
        ops.iter().filter(|op| **op == Op::Prim(PrimOp::LoadArg)).count(),
        3
    );
}

#[test]
fn conditional_expression_merges_with_phi() {
    let graphs = construct("function f(x) { return x ? 1 : 2; }").expect("construct should succeed");
    let f = &graphs[1];
    assert_eq!(f.block_count(), 4);
    let ops = ops(f);
    assert!(ops.contains(&Op::Prim(PrimOp::Phi)));
    assert_eq!(
        ops.iter().filter(|op| **op == Op::Prim(PrimOp::ToPhi)).count(),
        2
    );
    assert!(ops.contains(&Op::High(HighOp::Branch)));
}

#[test]
fn if_without_else_keeps_unchanged_locals() {
    let graphs = construct("function f(x) { var y = 1; if (x) { x = 2; } return y; }")
        .expect("construct should succeed");
    let ops = ops(&graphs[1]);
    // Only `x` differs between the arms.
    assert_eq!(
        ops.iter().filter(|op| **op == Op::Prim(PrimOp::Phi)).count(),
        1
    );
}

#[test]
fn returns_in_both_arms_end_the_function() {
    let graphs = construct("function f(x) { if (x) { return 1; } else { return 2; } }")
        .expect("construct should succeed");
    let ops = ops(&graphs[1]);
    assert_eq!(
        ops.iter().filter(|op| **op == Op::Prim(PrimOp::Ret)).count(),
        2
    );
}

#[test]
fn calls_push_arguments_before_the_call() {
    let graphs = construct("o.m(1, 2)").expect("construct should succeed");
    let ops = ops(&graphs[0]);
    let call = ops
        .iter()
        .position(|op| *op == Op::Prim(PrimOp::Call))
        .expect("call present");
    assert_eq!(ops[call - 1], Op::Prim(PrimOp::PushArg));
    assert_eq!(ops[call - 2], Op::Prim(PrimOp::PushArg));
}

#[test]
fn loops_are_rejected() {
    let err = construct("while (true) {}").expect_err("loops are unsupported");
    assert!(matches!(err, CompileError::Unsupported(_)));
}

#[test]
fn parse_errors_are_reported() {
    let err = construct("1 +").expect_err("source is malformed");
    assert!(matches!(err, CompileError::Parse(_)));
}

#[test]
fn invalid_assignment_target() {
    let err = construct("(a + b) = 1").expect_err("target is not assignable");
    assert!(matches!(
        err,
        CompileError::InvalidAssignmentTarget | CompileError::Parse(_)
    ));
}

use super::*;
use crate::middle::ir::{
    builder::ModuleBuilder,
    ty::{FunctionType, Type},
    IdRef,
};

pub(super) struct Names {
    /// `g() -> void`, default convention
    pub g: IdRef,
    /// `h() -> int<32>`, default convention
    pub h: IdRef,
    /// `c() -> void`, C convention
    pub c: IdRef,
    pub a: IdRef,
    pub b: IdRef,
    pub r: IdRef,
}

pub(super) fn here() -> Location {
    Location::new("canon.ll", 1)
}

/// A module with callees `g`, `h` and `c` and a function `f` whose body is
/// filled in by `body`
pub(super) fn build(result: Type, body: impl FnOnce(&mut ModuleBuilder, &Names)) -> Module {
    let mut builder = ModuleBuilder::for_module("m", here());
    builder.import_function("g", FunctionType::new([], Type::Void), here());
    builder.import_function("h", FunctionType::new([], Type::INT32), here());
    builder.import_function(
        "c",
        FunctionType::new([], Type::Void).with_calling_convention(CallingConvention::C),
        here(),
    );
    builder.begin_function("f", FunctionType::new([], result), here());

    let names = Names {
        g: builder.lookup("g").unwrap(),
        h: builder.lookup("h").unwrap(),
        c: builder.lookup("c").unwrap(),
        a: builder.local("a", Type::INT32, here()),
        b: builder.local("b", Type::INT32, here()),
        r: builder.local("r", Type::INT32, here()),
    };

    body(&mut builder, &names);
    builder.end_function();

    let mut sink = DiagnosticSink::new();
    let module = builder.finish(&mut sink);
    assert!(!sink.has_errors());
    module
}

pub(super) fn call(callee: IdRef) -> Instruction {
    Instruction::new(Opcode::Call, here())
        .with_op1(Operand::Id(callee))
        .with_op2(Operand::Tuple(vec![]))
}

pub(super) fn add(names: &Names) -> Instruction {
    Instruction::new(Opcode::IntAdd, here())
        .with_target(Operand::Id(names.r))
        .with_op1(Operand::Id(names.a))
        .with_op2(Operand::Id(names.b))
}

fn f(module: &Module) -> &Function {
    module.function(module.function_named("f").unwrap())
}

fn canonical(mut module: Module) -> Module {
    canonicalize(&mut module, &DiagnosticSink::new()).unwrap();
    module
}

fn opcodes(block: &Block) -> Vec<Opcode> {
    block.instructions.iter().map(|i| i.opcode).collect()
}

#[test]
fn call_in_the_middle_of_a_block_becomes_a_tail_call() {
    let module = canonical(build(Type::Void, |b, n| {
        b.block(Some("entry"), here());
        b.push(call(n.g));
        b.push(add(n));
    }));
    let blocks = &f(&module).blocks;

    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].name.as_deref(), Some("entry"));
    assert_eq!(opcodes(&blocks[0]), vec![Opcode::CallTailVoid]);
    assert_eq!(blocks[0].instructions[0].op3.as_ref().and_then(Operand::as_label), Some("__f_1"));

    assert_eq!(blocks[1].name.as_deref(), Some("__f_1"));
    assert_eq!(opcodes(&blocks[1]), vec![Opcode::IntAdd, Opcode::ReturnVoid]);
}

#[test]
fn continuation_holds_the_trailing_instructions_in_order() {
    let module = canonical(build(Type::Void, |b, n| {
        b.block(Some("entry"), here());
        b.push(add(n));
        b.push(call(n.g));
        b.push(add(n));
        b.push(call(n.c));
        b.push(Instruction::return_void(here()));
    }));
    let blocks = &f(&module).blocks;

    assert_eq!(opcodes(&blocks[0]), vec![Opcode::IntAdd, Opcode::CallTailVoid]);
    assert_eq!(
        opcodes(&blocks[1]),
        vec![Opcode::IntAdd, Opcode::Call, Opcode::ReturnVoid]
    );
}

#[test]
fn call_with_a_target_becomes_call_tail_result() {
    let mut r = None;
    let module = canonical(build(Type::Void, |b, n| {
        r = Some(n.r);
        b.push(call(n.h).with_target(Operand::Id(n.r)));
    }));
    let blocks = &f(&module).blocks;

    assert_eq!(opcodes(&blocks[0]), vec![Opcode::CallTailResult]);
    assert_eq!(blocks[0].instructions[0].target, r.map(Operand::Id));
    // The continuation is empty apart from its terminator
    assert_eq!(opcodes(&blocks[1]), vec![Opcode::ReturnVoid]);
}

#[test]
fn c_convention_calls_are_not_split() {
    let module = canonical(build(Type::Void, |b, n| {
        b.push(call(n.c));
        b.push(add(n));
    }));
    let blocks = &f(&module).blocks;

    assert_eq!(blocks.len(), 1);
    assert_eq!(
        opcodes(&blocks[0]),
        vec![Opcode::Call, Opcode::IntAdd, Opcode::ReturnVoid]
    );
}

#[test]
fn blocks_fall_through_to_the_following_block() {
    let module = canonical(build(Type::Void, |b, n| {
        b.block(Some("a"), here());
        b.push(add(n));
        b.block(Some("b"), here());
        b.push(Instruction::return_void(here()));
    }));
    let blocks = &f(&module).blocks;

    assert_eq!(blocks[0].instructions.last().unwrap(), &Instruction::jump("b", here()));
    // The computed successor is not written back
    assert_eq!(blocks[0].next, None);
}

#[test]
fn explicit_successor_wins_over_list_order() {
    let module = canonical(build(Type::Void, |b, n| {
        b.block(Some("a"), here()).next("c");
        b.push(add(n));
        b.block(Some("b"), here());
        b.push(Instruction::return_void(here()));
        b.block(Some("c"), here());
        b.push(Instruction::return_void(here()));
    }));
    let blocks = &f(&module).blocks;

    assert_eq!(blocks[0].instructions.last().unwrap().labels().collect::<Vec<_>>(), vec!["c"]);
    assert_eq!(blocks[0].next.as_deref(), Some("c"));
}

#[test]
fn unnamed_successors_get_fresh_labels() {
    let module = canonical(build(Type::Void, |b, n| {
        b.block(None, here());
        b.push(add(n));
        b.block(None, here());
        b.push(Instruction::return_void(here()));
    }));
    let blocks = &f(&module).blocks;

    assert_eq!(blocks[0].name, None);
    assert_eq!(blocks[1].name.as_deref(), Some("__f_1"));
    assert_eq!(blocks[0].instructions.last().unwrap().labels().collect::<Vec<_>>(), vec!["__f_1"]);
}

#[test]
fn fresh_labels_skip_names_in_use() {
    let module = canonical(build(Type::Void, |b, n| {
        b.block(Some("entry"), here());
        b.push(call(n.g));
        b.push(Instruction::jump("__f_1", here()));
        b.block(Some("__f_1"), here());
        b.push(Instruction::return_void(here()));
    }));
    let blocks = &f(&module).blocks;

    assert_eq!(
        blocks.iter().map(|b| b.name.as_deref()).collect::<Vec<_>>(),
        vec![Some("entry"), Some("__f_2"), Some("__f_1")]
    );
}

#[test]
fn instructions_after_a_terminator_move_to_a_fresh_block() {
    let module = canonical(build(Type::Void, |b, n| {
        b.block(Some("entry"), here());
        b.push(Instruction::return_void(here()));
        b.push(add(n));
    }));
    let blocks = &f(&module).blocks;

    assert_eq!(blocks.len(), 2);
    assert_eq!(opcodes(&blocks[0]), vec![Opcode::ReturnVoid]);
    assert_eq!(blocks[1].name.as_deref(), Some("__f_1"));
    assert_eq!(opcodes(&blocks[1]), vec![Opcode::IntAdd, Opcode::ReturnVoid]);
}

#[test]
fn empty_blocks_get_a_terminator() {
    let module = canonical(build(Type::Void, |b, _| {
        b.block(Some("entry"), here());
        b.block(Some("exit"), here());
    }));
    let blocks = &f(&module).blocks;

    assert_eq!(blocks[0].instructions, vec![Instruction::jump("exit", here())]);
    assert_eq!(opcodes(&blocks[1]), vec![Opcode::ReturnVoid]);
}

#[test]
fn canonical_input_is_left_unchanged() {
    let mut module = canonical(build(Type::Void, |b, n| {
        b.block(Some("entry"), here());
        b.push(call(n.g));
        b.push(add(n));
        b.block(None, here());
        b.push(add(n));
    }));
    let before = f(&module).blocks.clone();

    assert_eq!(canonicalize(&mut module, &DiagnosticSink::new()), Ok(0));
    assert_eq!(f(&module).blocks, before);
}

#[test]
fn imports_are_skipped() {
    let mut module = build(Type::Void, |b, _| {
        b.push(Instruction::return_void(here()));
    });

    assert_eq!(canonicalize(&mut module, &DiagnosticSink::new()), Ok(0));
    assert!(module.function(module.function_named("g").unwrap()).blocks.is_empty());
}

#[test]
fn refuses_after_errors() {
    let mut module = build(Type::Void, |b, n| {
        b.push(call(n.g));
    });
    let mut sink = DiagnosticSink::new();
    sink.report(Component::Checker, "earlier", None);

    assert_eq!(
        canonicalize(&mut module, &sink),
        Err(Refused {
            stage: Stage::Canonicalize,
            errors: 1
        })
    );
}

#[test]
#[should_panic(expected = "non-void function 'f' falls off its last block")]
fn non_void_functions_must_not_fall_off_their_end() {
    let module = build(Type::INT32, |b, n| {
        b.push(add(n));
    });

    canonicalize_function(&module, f(&module));
}

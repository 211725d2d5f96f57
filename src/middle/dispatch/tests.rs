use super::*;
use crate::{
    diagnostics::{DiagnosticSink, Location},
    middle::ir::{
        builder::ModuleBuilder,
        opcode::Opcode,
        ty::{FunctionType, Parameter, TypeClass, TypeFamily},
        Constant,
    },
};

type Log = Vec<String>;

fn here() -> Location {
    Location::new("dispatch.ll", 1)
}

/// `f(x: int<32>) -> int<32>` whose only block holds `instruction`
fn module_with(instruction: impl FnOnce(IdRef) -> Instruction) -> Module {
    let mut builder = ModuleBuilder::for_module("m", here());
    builder.global("g", Type::INT64, Some(Constant::int(1, 64, here())), here());
    builder.begin_function(
        "f",
        FunctionType::new([Parameter::new("x", Type::INT32)], Type::INT32),
        here(),
    );
    let x = builder.lookup("x").unwrap();
    builder.block(Some("entry"), here());
    builder.push(instruction(x));
    builder.end_function();

    let mut sink = DiagnosticSink::new();
    let module = builder.finish(&mut sink);
    assert!(!sink.has_errors());
    module
}

fn add(x: IdRef) -> Instruction {
    Instruction::new(Opcode::IntAdd, here())
        .with_target(Operand::Id(x))
        .with_op1(Operand::Id(x))
        .with_op2(Operand::Id(x))
}

fn ret(x: IdRef) -> Instruction {
    Instruction::new(Opcode::ReturnResult, here()).with_op1(Operand::Id(x))
}

fn generic(log: &mut Log, _: &Visit<'_>) {
    log.push("generic".into());
}

fn integer(log: &mut Log, _: &Visit<'_>) {
    log.push("integer".into());
}

fn terminator(log: &mut Log, _: &Visit<'_>) {
    log.push("terminator".into());
}

fn enter(log: &mut Log, visit: &Visit<'_>) {
    log.push(visit.node.class().to_string());
}

fn leave(log: &mut Log, visit: &Visit<'_>) {
    log.push(format!("/{}", visit.node.class()));
}

fn instruction_handlers(dispatcher: &mut Dispatcher<Log>) {
    dispatcher
        .register(Handler::new("generic", NodeClass::Instruction, generic))
        .register(
            Handler::new("integer", NodeClass::Instruction, integer)
                .typed(TypePattern::Class(TypeClass::Integer)),
        );
}

#[test]
fn class_hierarchy() {
    assert!(NodeClass::Call.is_a(NodeClass::Instruction));
    assert!(NodeClass::Call.is_a(NodeClass::Node));
    assert!(!NodeClass::Instruction.is_a(NodeClass::Call));
    assert_eq!(NodeClass::Node.depth(), 0);
    assert_eq!(NodeClass::Block.depth(), 1);
    assert_eq!(NodeClass::OperatorCall.depth(), 2);
}

#[test]
fn best_match_runs_only_the_typed_handler() {
    let module = module_with(add);
    let mut dispatcher = Dispatcher::best_match();
    instruction_handlers(&mut dispatcher);

    let mut log = Log::new();
    dispatcher.walk(&mut log, &module);

    assert_eq!(log, vec!["integer"]);
}

#[test]
fn run_all_fires_every_match_in_registration_order() {
    let module = module_with(add);
    let mut dispatcher = Dispatcher::run_all();
    instruction_handlers(&mut dispatcher);

    let mut log = Log::new();
    dispatcher.walk(&mut log, &module);

    assert_eq!(log, vec!["generic", "integer"]);
}

#[test]
fn deeper_class_beats_secondary_constraint() {
    let module = module_with(ret);
    let mut dispatcher = Dispatcher::best_match();
    instruction_handlers(&mut dispatcher);
    dispatcher.register(Handler::new("terminator", NodeClass::Terminator, terminator));

    let mut log = Log::new();
    dispatcher.walk(&mut log, &module);

    assert_eq!(log, vec!["terminator"]);
}

#[test]
fn unrelated_families_are_ambiguous() {
    let mut dispatcher = Dispatcher::<Log>::best_match();
    dispatcher
        .register(
            Handler::new("ordered", NodeClass::Operand, generic)
                .typed(TypePattern::Family(TypeFamily::Ordered)),
        )
        .register(
            Handler::new("sized", NodeClass::Operand, generic)
                .typed(TypePattern::Family(TypeFamily::Sized)),
        );

    assert_eq!(
        dispatcher
            .select(Hook::Visit, NodeClass::Operand, Some(&Type::String))
            .unwrap_err(),
        DispatchError::Ambiguous {
            class: NodeClass::Operand,
            hook: Hook::Visit,
            candidates: vec!["ordered", "sized"],
        }
    );

    // Only one of them matches an integer
    let selected = dispatcher
        .select(Hook::Visit, NodeClass::Operand, Some(&Type::INT8))
        .unwrap();
    assert_eq!(selected.iter().map(|h| h.name).collect::<Vec<_>>(), vec!["ordered"]);
}

#[test]
#[should_panic(expected = "internal compiler error [dispatch]: ambiguous visit handlers for Instruction")]
fn ambiguity_aborts_the_walk() {
    let module = module_with(add);
    let mut dispatcher = Dispatcher::best_match();
    dispatcher
        .register(Handler::new("first", NodeClass::Instruction, generic))
        .register(Handler::new("second", NodeClass::Instruction, generic));

    dispatcher.walk(&mut Log::new(), &module);
}

#[test]
fn traversal_order() {
    let module = module_with(ret);
    let mut dispatcher = Dispatcher::run_all();
    dispatcher
        .register(Handler::new("enter", NodeClass::Node, enter))
        .register(Handler::new("leave", NodeClass::Node, leave).post());

    let mut log = Log::new();
    dispatcher.walk(&mut log, &module);

    assert_eq!(
        log,
        vec![
            "Module", "Id", "Constant", "/Constant", "/Id", "Id", "/Id", "Function", "Id",
            "/Id", "Block", "Terminator", "Operand", "/Operand", "/Terminator", "/Block",
            "/Function", "/Module",
        ]
    );
}

#[test]
fn pre_hooks_run_before_visit() {
    let module = module_with(ret);
    let mut dispatcher = Dispatcher::run_all();
    dispatcher
        .register(Handler::new("visit", NodeClass::Block, generic))
        .register(Handler::new("pre", NodeClass::Block, terminator).pre());

    let mut log = Log::new();
    dispatcher.walk(&mut log, &module);

    assert_eq!(log, vec!["terminator", "generic"]);
}

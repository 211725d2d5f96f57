//! Property tests for the canonicalizer.
//!
//! For any void function body built from plain instructions, calls and
//! branches:
//!
//! 1. Totality: every output block ends in exactly one terminator
//! 2. No default-convention `call` survives
//! 3. Idempotence: canonicalizing canonical output changes nothing
//! 4. Input instructions keep their relative order

use proptest::prelude::*;

use super::{
    tests::{add, build, call, here, Names},
    *,
};
use crate::middle::ir::ty::Type;

#[derive(Debug, Clone)]
enum Step {
    Add,
    CallVoid,
    CallResult,
    CallC,
    /// Jump to the block with this index, if it has a name
    Jump(usize),
    Return,
}

#[derive(Debug, Clone)]
struct BlockShape {
    named: bool,
    next: Option<usize>,
    steps: Vec<Step>,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => Just(Step::Add),
        2 => Just(Step::CallVoid),
        1 => Just(Step::CallResult),
        1 => Just(Step::CallC),
        1 => (0usize..6).prop_map(Step::Jump),
        1 => Just(Step::Return),
    ]
}

fn arb_block() -> impl Strategy<Value = BlockShape> {
    (
        any::<bool>(),
        prop::option::weighted(0.2, 0usize..6),
        prop::collection::vec(arb_step(), 0..6),
    )
        .prop_map(|(named, next, steps)| BlockShape { named, next, steps })
}

fn arb_body() -> impl Strategy<Value = Vec<BlockShape>> {
    prop::collection::vec(arb_block(), 1..6)
}

fn block_name(shapes: &[BlockShape], index: usize) -> Option<String> {
    shapes
        .get(index)
        .filter(|s| s.named)
        .map(|_| format!("b{index}"))
}

fn instruction(step: &Step, shapes: &[BlockShape], names: &Names) -> Instruction {
    match step {
        Step::Add => add(names),
        Step::CallVoid => call(names.g),
        Step::CallResult => call(names.h).with_target(Operand::Id(names.r)),
        Step::CallC => call(names.c),
        Step::Jump(index) => match block_name(shapes, *index) {
            Some(label) => Instruction::jump(&label, here()),
            None => add(names),
        },
        Step::Return => Instruction::return_void(here()),
    }
}

fn module_for(shapes: &[BlockShape]) -> Module {
    build(Type::Void, |builder, names| {
        for (index, shape) in shapes.iter().enumerate() {
            let name = block_name(shapes, index);
            builder.block(name.as_deref(), here());

            if let Some(next) = shape.next.and_then(|n| block_name(shapes, n)) {
                builder.next(&next);
            }

            for step in &shape.steps {
                builder.push(instruction(step, shapes, names));
            }
        }
    })
}

fn body(module: &Module) -> &Function {
    module
        .function_named("f")
        .map(|f| module.function(f))
        .unwrap()
}

/// Opcodes of the input instructions in order, ignoring the control flow
/// the pass synthesizes and reading tail calls as the calls they replace
fn straight_line(blocks: &[Block]) -> Vec<Opcode> {
    blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter_map(|i| match i.opcode {
            Opcode::Jump | Opcode::ReturnVoid => None,
            Opcode::CallTailVoid | Opcode::CallTailResult => Some(Opcode::Call),
            opcode => Some(opcode),
        })
        .collect()
}

proptest! {
    #[test]
    fn every_block_ends_in_one_terminator(shapes in arb_body()) {
        let module = module_for(&shapes);
        let blocks = canonicalize_function(&module, body(&module));

        prop_assert!(blocks.iter().all(Block::is_canonical));
    }

    #[test]
    fn no_default_convention_call_remains(shapes in arb_body()) {
        let module = module_for(&shapes);
        let blocks = canonicalize_function(&module, body(&module));

        for instruction in blocks.iter().flat_map(|b| &b.instructions) {
            prop_assert!(!needs_continuation(&module, instruction));
        }
    }

    #[test]
    fn canonical_output_is_a_fixed_point(shapes in arb_body()) {
        let mut module = module_for(&shapes);
        canonicalize(&mut module, &DiagnosticSink::new()).unwrap();
        let once = body(&module).blocks.clone();

        prop_assert_eq!(canonicalize(&mut module, &DiagnosticSink::new()), Ok(0));
        prop_assert_eq!(&body(&module).blocks, &once);
    }

    #[test]
    fn instruction_order_is_preserved(shapes in arb_body()) {
        let module = module_for(&shapes);
        let blocks = canonicalize_function(&module, body(&module));

        prop_assert_eq!(straight_line(&blocks), straight_line(&body(&module).blocks));
    }
}

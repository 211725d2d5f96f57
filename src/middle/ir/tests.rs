use std::sync::Arc;

use super::*;

fn here() -> Location {
    Location::new("test.ll", 1)
}

#[test]
fn scope_rejects_duplicates_and_keeps_order() {
    let mut scope = Scope::new();
    scope.insert("b", IdRef(0)).unwrap();
    scope.insert("a", IdRef(1)).unwrap();

    assert_eq!(
        scope.insert("b", IdRef(2)),
        Err(ScopeError::Duplicate {
            name: "b".into(),
            previous: IdRef(0)
        })
    );
    assert_eq!(scope.iter().collect::<Vec<_>>(), vec![IdRef(0), IdRef(1)]);
    assert_eq!(scope.lookup("a"), Some(IdRef(1)));
}

#[test]
fn enum_constants_are_validated_against_their_labels() {
    let colour = Arc::new(EnumType {
        name: "Colour".into(),
        labels: vec!["Red".into(), "Green".into()],
    });

    assert!(Constant::enum_label(&colour, "Red", here()).is_ok());
    assert_eq!(
        Constant::enum_label(&colour, "Blue", here()),
        Err(ConstantError::UnknownLabel {
            name: "Colour".into(),
            label: "Blue".into()
        })
    );
}

#[test]
fn constant_shape_must_match_type() {
    assert!(matches!(
        Constant::new(ConstantValue::Bool(true), Type::INT32, here()),
        Err(ConstantError::ShapeMismatch { .. })
    ));
    assert_eq!(
        Constant::new(ConstantValue::Integer(300), Type::INT8, here()),
        Err(ConstantError::OutOfRange {
            value: 300,
            width: 8
        })
    );
    assert!(Constant::new(ConstantValue::Integer(255), Type::INT8, here()).is_ok());
    assert!(Constant::new(ConstantValue::Null, Type::reference(Type::Bytes), here()).is_ok());
}

#[test]
fn integer_ranges() {
    assert!(integer_fits(-128, 8));
    assert!(!integer_fits(-129, 8));
    assert!(integer_fits(65535, 16));
    assert!(integer_fits(i64::MIN, 64));
}

#[test]
fn operands_are_visited_op1_to_target() {
    let instruction = Instruction::new(Opcode::IntAdd, here())
        .with_target(Operand::Id(IdRef(0)))
        .with_op1(Operand::Id(IdRef(1)))
        .with_op2(Operand::Const(Constant::int(1, 0, here())));

    let slots = instruction.operands().map(|(slot, _)| slot).collect::<Vec<_>>();
    assert_eq!(slots, vec![SlotName::Op1, SlotName::Op2, SlotName::Target]);
}

#[test]
fn canonical_blocks() {
    let mut block = Block::new(Some("entry".into()), here());
    assert!(!block.is_canonical());

    block.instructions.push(Instruction::jump("next", here()));
    assert!(block.is_canonical());
    assert_eq!(block.instructions[0].labels().collect::<Vec<_>>(), vec!["next"]);

    block.instructions.insert(0, Instruction::return_void(here()));
    assert!(!block.is_canonical());
}

#[test]
fn modules_can_move_between_threads() {
    fn assert_send<T: Send>() {}
    assert_send::<Module>();

    let module = Module::new("m", here());
    let name = std::thread::spawn(move || module.name).join().unwrap();
    assert_eq!(name, "m");
}

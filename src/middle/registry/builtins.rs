//! The built-in type modules. Each module registers the operators its type
//! supports; most lower straight to a dedicated instruction.

use crate::{
    backend::{Emitter, TargetOp, TargetType, TargetValue},
    middle::{
        ir::{
            opcode::{Opcode, Operator},
            ty::{Type, TypeClass, TypeFamily},
        },
        registry::{OperatorHandler, PatternElement as P, RegistryBuilder},
    },
};

enum Lowering {
    Instruction(Opcode),
    /// The instruction, then `bool.not` on its result
    Negated(Opcode),
    /// The instruction with its two operands exchanged
    Swapped(Opcode),
    /// A backend op keyed by the operator and the first operand's class
    Generic(Operator),
}

struct Builtin {
    result: fn(&[Type]) -> Type,
    lowering: Lowering,
}

impl OperatorHandler for Builtin {
    fn result_type(&self, operands: &[Type]) -> Type {
        (self.result)(operands)
    }

    fn codegen(
        &self,
        emitter: &mut dyn Emitter,
        operands: &[TargetValue],
        types: &[Type],
        result: Option<TargetType>,
    ) -> Option<TargetValue> {
        match self.lowering {
            Lowering::Instruction(opcode) => {
                emitter.emit(TargetOp::Instruction(opcode), operands, result)
            }
            Lowering::Negated(opcode) => {
                let value = emitter.emit(TargetOp::Instruction(opcode), operands, result)?;
                emitter.emit(TargetOp::Instruction(Opcode::BoolNot), &[value], result)
            }
            Lowering::Swapped(opcode) => {
                let swapped = operands.iter().rev().copied().collect::<Vec<_>>();
                emitter.emit(TargetOp::Instruction(opcode), &swapped, result)
            }
            Lowering::Generic(operator) => {
                let class = types.first().map_or(TypeClass::Any, Type::class);
                emitter.emit(TargetOp::Operator { operator, class }, operands, result)
            }
        }
    }
}

/* Result type rules */

/// The first operand's type, preferring a resolved integer width
fn operand_type(operands: &[Type]) -> Type {
    operands
        .iter()
        .find(|t| !t.is_unresolved_integer())
        .or(operands.first())
        .cloned()
        .unwrap_or(Type::Void)
}

fn boolean(_: &[Type]) -> Type {
    Type::Bool
}

fn length(_: &[Type]) -> Type {
    Type::INT64
}

/// Only uniform tuples have a statically known element type
fn element(operands: &[Type]) -> Type {
    match operands.first() {
        Some(Type::Tuple(elements)) => match elements.split_first() {
            Some((first, rest)) if rest.iter().all(|t| t == first) => first.clone(),
            _ => Type::Any,
        },
        _ => Type::Any,
    }
}

fn bind(
    builder: &mut RegistryBuilder,
    operator: Operator,
    pattern: impl IntoIterator<Item = P>,
    name: &'static str,
    result: fn(&[Type]) -> Type,
    lowering: Lowering,
) {
    builder.register(operator, pattern, name, Builtin { result, lowering });
}

pub fn register_all(builder: &mut RegistryBuilder) {
    integer(builder);
    double(builder);
    boolean_module(builder);
    string(builder);
    bytes(builder);
    enumeration(builder);
    tuple(builder);
    reference(builder);
    ordered(builder);
}

fn integer(builder: &mut RegistryBuilder) {
    use Lowering::*;
    let binary = || [P::class(TypeClass::Integer), P::SameAs(0)];

    bind(builder, Operator::Plus, binary(), "integer.plus", operand_type, Instruction(Opcode::IntAdd));
    bind(builder, Operator::Minus, binary(), "integer.minus", operand_type, Instruction(Opcode::IntSub));
    bind(builder, Operator::Multiply, binary(), "integer.multiply", operand_type, Instruction(Opcode::IntMul));
    bind(builder, Operator::Divide, binary(), "integer.divide", operand_type, Instruction(Opcode::IntDiv));
    bind(builder, Operator::Equal, binary(), "integer.equal", boolean, Instruction(Opcode::IntEq));
    bind(builder, Operator::Unequal, binary(), "integer.unequal", boolean, Negated(Opcode::IntEq));
    bind(builder, Operator::Less, binary(), "integer.less", boolean, Instruction(Opcode::IntLt));
    bind(builder, Operator::Greater, binary(), "integer.greater", boolean, Instruction(Opcode::IntGt));
    bind(
        builder,
        Operator::Negate,
        [P::class(TypeClass::Integer)],
        "integer.negate",
        operand_type,
        Generic(Operator::Negate),
    );
}

fn double(builder: &mut RegistryBuilder) {
    use Lowering::*;
    let binary = || [P::exact(Type::Double), P::exact(Type::Double)];

    bind(builder, Operator::Plus, binary(), "double.plus", operand_type, Instruction(Opcode::DoubleAdd));
    bind(builder, Operator::Minus, binary(), "double.minus", operand_type, Instruction(Opcode::DoubleSub));
    bind(builder, Operator::Multiply, binary(), "double.multiply", operand_type, Instruction(Opcode::DoubleMul));
    bind(builder, Operator::Divide, binary(), "double.divide", operand_type, Instruction(Opcode::DoubleDiv));
    bind(builder, Operator::Equal, binary(), "double.equal", boolean, Instruction(Opcode::DoubleEq));
    bind(builder, Operator::Unequal, binary(), "double.unequal", boolean, Negated(Opcode::DoubleEq));
    bind(builder, Operator::Less, binary(), "double.less", boolean, Instruction(Opcode::DoubleLt));
    bind(builder, Operator::Greater, binary(), "double.greater", boolean, Swapped(Opcode::DoubleLt));
    bind(
        builder,
        Operator::Negate,
        [P::exact(Type::Double)],
        "double.negate",
        operand_type,
        Generic(Operator::Negate),
    );
}

fn boolean_module(builder: &mut RegistryBuilder) {
    use Lowering::*;
    let binary = || [P::exact(Type::Bool), P::exact(Type::Bool)];

    bind(builder, Operator::Not, [P::exact(Type::Bool)], "bool.not", boolean, Instruction(Opcode::BoolNot));
    bind(builder, Operator::Equal, binary(), "bool.equal", boolean, Generic(Operator::Equal));
    bind(builder, Operator::Unequal, binary(), "bool.unequal", boolean, Generic(Operator::Unequal));
}

fn string(builder: &mut RegistryBuilder) {
    use Lowering::*;
    let binary = || [P::exact(Type::String), P::exact(Type::String)];

    bind(builder, Operator::Plus, binary(), "string.plus", operand_type, Instruction(Opcode::StringConcat));
    bind(builder, Operator::Concat, binary(), "string.concat", operand_type, Instruction(Opcode::StringConcat));
    bind(builder, Operator::Size, [P::exact(Type::String)], "string.size", length, Instruction(Opcode::StringLength));
    bind(builder, Operator::Equal, binary(), "string.equal", boolean, Generic(Operator::Equal));
    bind(builder, Operator::Unequal, binary(), "string.unequal", boolean, Generic(Operator::Unequal));
    bind(builder, Operator::Less, binary(), "string.less", boolean, Generic(Operator::Less));
}

fn bytes(builder: &mut RegistryBuilder) {
    use Lowering::*;
    let binary = || [P::exact(Type::Bytes), P::exact(Type::Bytes)];

    bind(builder, Operator::Concat, binary(), "bytes.concat", operand_type, Generic(Operator::Concat));
    bind(builder, Operator::Size, [P::exact(Type::Bytes)], "bytes.size", length, Instruction(Opcode::BytesLength));
    bind(builder, Operator::Equal, binary(), "bytes.equal", boolean, Generic(Operator::Equal));
}

fn enumeration(builder: &mut RegistryBuilder) {
    use Lowering::*;
    let binary = || [P::class(TypeClass::Enum), P::SameAs(0)];

    bind(builder, Operator::Equal, binary(), "enum.equal", boolean, Instruction(Opcode::EnumEq));
    bind(builder, Operator::Unequal, binary(), "enum.unequal", boolean, Negated(Opcode::EnumEq));
}

fn tuple(builder: &mut RegistryBuilder) {
    use Lowering::*;

    bind(
        builder,
        Operator::Index,
        [P::class(TypeClass::Tuple), P::class(TypeClass::Integer)],
        "tuple.index",
        element,
        Instruction(Opcode::TupleIndex),
    );
    bind(
        builder,
        Operator::Equal,
        [P::class(TypeClass::Tuple), P::SameAs(0)],
        "tuple.equal",
        boolean,
        Generic(Operator::Equal),
    );
}

fn reference(builder: &mut RegistryBuilder) {
    use Lowering::*;
    let binary = || [P::class(TypeClass::Reference), P::SameAs(0)];

    bind(builder, Operator::Equal, binary(), "reference.equal", boolean, Generic(Operator::Equal));
    bind(builder, Operator::Unequal, binary(), "reference.unequal", boolean, Generic(Operator::Unequal));
}

/// Fallbacks shared by whole type families. Any type module binding the same
/// operator more narrowly takes precedence.
fn ordered(builder: &mut RegistryBuilder) {
    use Lowering::*;

    bind(
        builder,
        Operator::Greater,
        [P::family(TypeFamily::Ordered), P::SameAs(0)],
        "ordered.greater",
        boolean,
        Generic(Operator::Greater),
    );
    bind(
        builder,
        Operator::Size,
        [P::family(TypeFamily::Sized)],
        "sized.size",
        length,
        Generic(Operator::Size),
    );
}

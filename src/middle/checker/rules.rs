use std::collections::BTreeSet;

use hashbrown::HashSet;
use itertools::Itertools;

use super::{report_error, Checker, Phase, Site};
use crate::middle::{
    canonicalize::needs_continuation,
    dispatch::{Dispatcher, Handler, Node, NodeClass, Visit},
    ir::{
        integer_fits,
        opcode::{Opcode, Operator, SlotConstraint, SlotName},
        ty::{CallingConvention, Type, TypeClass, TypePattern},
        Block, Constant, ConstantError, ConstantValue, DeclarationKind, ExceptionId, IdRole,
        Instruction, Module, Operand,
    },
};

/// Names starting with this prefix belong to the compiler
const RESERVED_PREFIX: &str = "__";

pub(super) fn register(dispatcher: &mut Dispatcher<Checker<'_>>) {
    dispatcher
        .register(Handler::new("module-declarations", NodeClass::Module, check_declarations))
        .register(Handler::new("exception-cycles", NodeClass::Module, check_exception_cycles))
        .register(Handler::new("reserved-identifiers", NodeClass::Id, check_reserved_identifier))
        .register(Handler::new("initial-values", NodeClass::Id, check_initial_value))
        .register(Handler::new("c-signatures", NodeClass::Function, check_c_signature))
        .register(Handler::new("function-blocks", NodeClass::Function, check_blocks))
        .register(Handler::new("constant-shape", NodeClass::Constant, check_constant_shape))
        .register(
            Handler::new("enum-labels", NodeClass::Constant, check_enum_label)
                .typed(TypePattern::Class(TypeClass::Enum)),
        )
        .register(Handler::new("signature-slots", NodeClass::Instruction, check_slots))
        .register(Handler::new("integer-widths", NodeClass::Instruction, unify_integer_widths))
        .register(Handler::new("constant-context", NodeClass::Instruction, unify_constant_context))
        .register(Handler::new("constant-divisor", NodeClass::Instruction, check_division))
        .register(Handler::new("struct-fields", NodeClass::Instruction, check_struct_field))
        .register(Handler::new("tuple-index", NodeClass::Instruction, check_tuple_index))
        .register(Handler::new("branch-targets", NodeClass::Terminator, check_branch_targets))
        .register(Handler::new("return-type", NodeClass::Terminator, check_return))
        .register(Handler::new("call", NodeClass::Call, check_call))
        .register(Handler::new("tail-call", NodeClass::Terminator, check_call))
        .register(Handler::new("operator", NodeClass::OperatorCall, check_operator));
}

fn operand_site(visit: &Visit<'_>, slot: SlotName, element: Option<usize>) -> Option<Site> {
    Some(Site::Operand {
        function: visit.function?,
        block: visit.block?,
        instruction: visit.instruction?,
        slot,
        element,
    })
}

/// Pins an integer constant to `width`. Values which do not fit are
/// reported instead.
fn pin_constant(checker: &mut Checker<'_>, site: Option<Site>, constant: &Constant, width: u8) {
    if constant.ty.integer_width() == Some(width) {
        return;
    }

    let Some(value) = constant.as_integer() else {
        return;
    };

    if !integer_fits(value, width) {
        report_error!(
            checker,
            Some(&constant.location),
            "integer constant {value} does not fit in {}",
            Type::int(width)
        );
        return;
    }

    if let Some(site) = site {
        checker.pin(site, width);
    }
}

fn describe_block(index: usize, block: &Block) -> String {
    match &block.name {
        Some(name) => format!("'{name}'"),
        None => format!("#{index}"),
    }
}

/* Module */

fn check_declarations(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let Node::Module(module) = visit.node else {
        return;
    };

    let starts = module
        .declarations
        .iter()
        .positions(|d| d.kind == DeclarationKind::Module)
        .collect::<Vec<_>>();

    match starts.as_slice() {
        [] => report_error!(checker, Some(&module.location), "missing module declaration"),
        [_] => {}
        [_, rest @ ..] => {
            for &index in rest {
                let declaration = &module.declarations[index];
                report_error!(
                    checker,
                    Some(&declaration.location),
                    "duplicate module declaration '{}'",
                    declaration.name
                );
            }
        }
    }

    if let Some(&start) = starts.first() {
        for declaration in &module.declarations[..start] {
            report_error!(
                checker,
                Some(&declaration.location),
                "{} '{}' is declared before the module declaration",
                declaration.kind,
                declaration.name
            );
        }
    }

    for declaration in &module.declarations {
        if let (DeclarationKind::Struct, Some(function)) =
            (declaration.kind, &declaration.enclosing_function)
        {
            report_error!(
                checker,
                Some(&declaration.location),
                "struct '{}' is declared inside function '{function}'",
                declaration.name
            );
        }
    }
}

/// Follows base links from every exception. A cycle is reported once, at
/// the first of its members reached.
fn check_exception_cycles(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let Node::Module(module) = visit.node else {
        return;
    };

    let mut reported = HashSet::<ExceptionId>::new();

    for (start, _) in module.exceptions.enumerate() {
        let mut path = vec![start];
        let mut current = start;

        while let Some(base) = module.exceptions[current].base {
            if reported.contains(&base) {
                break;
            }

            if let Some(position) = path.iter().position(|e| *e == base) {
                let cycle = &path[position..];
                reported.extend(cycle.iter().copied());

                let names = cycle
                    .iter()
                    .chain([&base])
                    .map(|e| module.exceptions[*e].name.as_str())
                    .join(" -> ");
                report_error!(
                    checker,
                    Some(&module.exceptions[base].location),
                    "exception inheritance cycle: {names}"
                );
                break;
            }

            path.push(base);
            current = base;
        }
    }
}

/* IDs and constants */

fn check_reserved_identifier(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let Node::Id(_, id) = visit.node else {
        return;
    };

    if checker.phase == Phase::PreCanonical && id.name.starts_with(RESERVED_PREFIX) {
        report_error!(
            checker,
            Some(&id.location),
            "identifier '{}' uses the reserved prefix '{RESERVED_PREFIX}'",
            id.name
        );
    }
}

fn check_initial_value(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let Node::Id(handle, id) = visit.node else {
        return;
    };
    let Some(value) = &id.value else {
        return;
    };

    if !value.ty.compatible_with(&id.ty) {
        report_error!(
            checker,
            Some(&value.location),
            "initial value of '{}' has type {}, expected {}",
            id.name,
            value.ty,
            id.ty
        );
        return;
    }

    if let (true, Some(width)) = (value.ty.is_unresolved_integer(), id.ty.integer_width()) {
        if width != 0 {
            pin_constant(checker, Some(Site::Global(handle)), value, width);
        }
    }
}

fn check_constant_shape(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let Node::Constant(constant) = visit.node else {
        return;
    };

    match constant.check() {
        Ok(()) | Err(ConstantError::UnknownLabel { .. }) => {}
        Err(error) => report_error!(checker, Some(&constant.location), "{error}"),
    }
}

fn check_enum_label(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let Node::Constant(constant) = visit.node else {
        return;
    };

    if let (ConstantValue::Enum(label), Type::Enum(enum_type)) = (&constant.value, &constant.ty) {
        if !enum_type.has_label(label) {
            report_error!(
                checker,
                Some(&constant.location),
                "enum {} has no label '{label}' (labels: {})",
                enum_type.name,
                enum_type.labels.iter().join(", ")
            );
        }
    }
}

/* Functions */

fn check_c_signature(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let Node::Function(_, function) = visit.node else {
        return;
    };

    let signature = &function.signature;
    if signature.calling_convention != CallingConvention::C {
        return;
    }

    let forbidden = |ty: &Type| {
        matches!(
            ty.class(),
            TypeClass::Label | TypeClass::Any | TypeClass::Iterator
        )
    };

    for parameter in signature.parameters.iter().filter(|p| forbidden(&p.ty)) {
        report_error!(
            checker,
            Some(&function.location),
            "C function '{}' cannot take parameter '{}' of type {}",
            function.name,
            parameter.name,
            parameter.ty
        );
    }

    if forbidden(&signature.result) {
        report_error!(
            checker,
            Some(&function.location),
            "C function '{}' cannot return {}",
            function.name,
            signature.result
        );
    }
}

fn check_blocks(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let Node::Function(_, function) = visit.node else {
        return;
    };

    let mut names = HashSet::new();
    for block in &function.blocks {
        let Some(name) = &block.name else {
            continue;
        };

        if !names.insert(name.as_str()) {
            report_error!(
                checker,
                Some(&block.location),
                "block '{name}' is defined more than once in function '{}'",
                function.name
            );
        }

        if checker.phase == Phase::PreCanonical && name.starts_with(RESERVED_PREFIX) {
            report_error!(
                checker,
                Some(&block.location),
                "block name '{name}' uses the reserved prefix '{RESERVED_PREFIX}'"
            );
        }
    }

    for (index, block) in function.blocks.iter().enumerate() {
        if let Some(next) = &block.next {
            if function.block_named(next).is_none() {
                report_error!(
                    checker,
                    Some(&block.location),
                    "successor '{next}' of block {} is not a block of function '{}'",
                    describe_block(index, block),
                    function.name
                );
            }
        }
    }

    match checker.phase {
        Phase::PreCanonical => {
            // Only the last block can lack a successor
            let Some(last) = function.blocks.last() else {
                return;
            };

            if !function.signature.returns_void() && last.next.is_none() && last.terminator().is_none() {
                report_error!(
                    checker,
                    Some(&last.location),
                    "non-void function '{}' can reach the end of its last block without returning",
                    function.name
                );
            }
        }
        Phase::PostCanonical => {
            for (index, block) in function.blocks.iter().enumerate() {
                if !block.is_canonical() {
                    report_error!(
                        checker,
                        Some(&block.location),
                        "block {} of function '{}' does not end in exactly one terminator",
                        describe_block(index, block),
                        function.name
                    );
                }
            }
        }
    }
}

/* Instructions */

fn check_slots(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let Node::Instruction(_, instruction) = visit.node else {
        return;
    };

    let module = visit.module;
    let opcode = instruction.opcode;
    let signature = opcode.signature();
    let location = Some(&instruction.location);

    for slot in [SlotName::Target, SlotName::Op1, SlotName::Op2, SlotName::Op3] {
        let expected = signature.slot(slot);

        match (instruction.operand(slot), &expected.constraint) {
            (None, _) if expected.optional => {}
            (None, _) => {
                report_error!(checker, location, "{opcode}: {slot} is missing, expected {expected}")
            }
            (Some(operand), SlotConstraint::None) => report_error!(
                checker,
                location,
                "{opcode}: {slot} must be empty, found {}",
                module.operand_type(operand)
            ),
            (Some(operand), constraint) => {
                let actual = module.operand_type(operand);
                let accepted = match constraint {
                    SlotConstraint::None | SlotConstraint::Any => true,
                    SlotConstraint::Exact(ty) => actual.compatible_with(ty),
                    SlotConstraint::Class(class) => actual.class() == *class || actual == Type::Any,
                    SlotConstraint::SameAs(other) => instruction
                        .operand(*other)
                        .is_none_or(|o| module.operand_type(o).compatible_with(&actual)),
                };

                if !accepted {
                    report_error!(
                        checker,
                        location,
                        "{opcode} {slot}: expected {expected}, found {actual}"
                    );
                }

                if slot == SlotName::Target && !matches!(operand, Operand::Id(_)) {
                    report_error!(checker, location, "{opcode}: target must be an identifier");
                }
            }
        }
    }
}

/// Slots whose integer widths must agree
fn width_slots(module: &Module, instruction: &Instruction) -> Vec<SlotName> {
    use SlotName::*;

    let opcode = instruction.opcode;
    if opcode.unifies_integer_widths() {
        return if opcode.target_pins_width() {
            vec![Op1, Op2, Target]
        } else {
            vec![Op1, Op2]
        };
    }

    let Some(operator) = opcode.operator() else {
        return Vec::new();
    };

    let integers = [Op1, Op2]
        .into_iter()
        .filter_map(|slot| instruction.operand(slot))
        .all(|operand| module.operand_type(operand).class() == TypeClass::Integer);
    if !integers {
        return Vec::new();
    }

    match operator {
        Operator::Plus | Operator::Minus | Operator::Multiply | Operator::Divide | Operator::Negate => {
            vec![Op1, Op2, Target]
        }
        Operator::Equal | Operator::Unequal | Operator::Less | Operator::Greater => vec![Op1, Op2],
        _ => Vec::new(),
    }
}

/// Resolved widths of the non-constant operands in the width slots
fn operand_widths(module: &Module, instruction: &Instruction) -> BTreeSet<u8> {
    width_slots(module, instruction)
        .into_iter()
        .filter_map(|slot| instruction.operand(slot))
        .filter(|operand| !matches!(operand, Operand::Const(c) if c.ty.class() == TypeClass::Integer))
        .filter_map(|operand| module.operand_type(operand).integer_width())
        .filter(|width| *width != 0)
        .collect()
}

/// Non-constant operands (and the target, where it counts) must share one
/// width. Constants adopt it.
fn unify_integer_widths(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let Node::Instruction(_, instruction) = visit.node else {
        return;
    };

    let module = visit.module;
    let widths = operand_widths(module, instruction);
    let constants = width_slots(module, instruction)
        .into_iter()
        .filter_map(|slot| match instruction.operand(slot) {
            Some(Operand::Const(constant)) if constant.ty.class() == TypeClass::Integer => {
                Some((slot, constant))
            }
            _ => None,
        })
        .collect::<Vec<_>>();

    let width = match widths.len() {
        0 => constants
            .iter()
            .filter_map(|(_, c)| c.ty.integer_width())
            .filter(|w| *w != 0)
            .max(),
        1 => widths.first().copied(),
        _ => {
            report_error!(
                checker,
                Some(&instruction.location),
                "{}: integer widths disagree ({})",
                instruction.opcode,
                widths.iter().map(|w| Type::int(*w)).join(", ")
            );
            return;
        }
    };

    if let Some(width) = width {
        for (slot, constant) in constants {
            pin_constant(checker, operand_site(visit, slot, None), constant, width);
        }
    }
}

fn pin_to_context(
    checker: &mut Checker<'_>,
    visit: &Visit<'_>,
    slot: SlotName,
    element: Option<usize>,
    operand: &Operand,
    expected: &Type,
) {
    if let (Operand::Const(constant), Some(width)) = (operand, expected.integer_width()) {
        if constant.ty.is_unresolved_integer() && width != 0 {
            pin_constant(checker, operand_site(visit, slot, element), constant, width);
        }
    }
}

/// Unresolved integer constants take their width from where they are used:
/// returned values, assignments, stored fields and call arguments
fn unify_constant_context(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let Node::Instruction(_, instruction) = visit.node else {
        return;
    };

    let module = visit.module;

    match instruction.opcode {
        Opcode::ReturnResult => {
            if let (Some(function), Some(value)) = (visit.function(), &instruction.op1) {
                pin_to_context(checker, visit, SlotName::Op1, None, value, &function.signature.result);
            }
        }
        Opcode::Assign => {
            if let (Some(target), Some(value)) = (&instruction.target, &instruction.op1) {
                let expected = module.operand_type(target);
                pin_to_context(checker, visit, SlotName::Op1, None, value, &expected);
            }
        }
        Opcode::StructSet => {
            let (Some(object), Some(Operand::Const(name)), Some(value)) =
                (&instruction.op1, &instruction.op2, &instruction.op3)
            else {
                return;
            };

            let object_type = module.operand_type(object);
            let field = match (&name.value, object_type.as_struct()) {
                (ConstantValue::String(name), Some(structure)) => structure.field(name),
                _ => None,
            };

            if let Some(field) = field {
                pin_to_context(checker, visit, SlotName::Op3, None, value, &field.ty);
            }
        }
        Opcode::Call | Opcode::CallTailVoid | Opcode::CallTailResult => {
            let (Some(callee), Some(Operand::Tuple(arguments))) = (&instruction.op1, &instruction.op2) else {
                return;
            };

            let callee_type = module.operand_type(callee);
            let Some(signature) = callee_type.as_function() else {
                return;
            };

            for (index, (argument, parameter)) in arguments.iter().zip(&signature.parameters).enumerate() {
                pin_to_context(checker, visit, SlotName::Op2, Some(index), argument, &parameter.ty);
            }
        }
        _ => {}
    }
}

/// The compile-time value of an operand: a constant, or a constant ID's
/// initial value
fn constant_value<'m>(module: &'m Module, operand: &'m Operand) -> Option<&'m Constant> {
    match operand {
        Operand::Const(constant) => Some(constant),
        Operand::Id(id) => {
            let id = module.id(*id);
            match id.role {
                IdRole::Constant => id.value.as_ref(),
                _ => None,
            }
        }
        Operand::Tuple(_) => None,
    }
}

fn check_division(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let Node::Instruction(_, instruction) = visit.node else {
        return;
    };

    let divisor = instruction
        .op2
        .as_ref()
        .and_then(|op| constant_value(visit.module, op));
    if instruction.opcode.is_division() && divisor.is_some_and(Constant::is_zero) {
        report_error!(
            checker,
            Some(&instruction.location),
            "{}: division by constant zero",
            instruction.opcode
        );
    }
}

fn check_struct_field(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let Node::Instruction(_, instruction) = visit.node else {
        return;
    };

    let opcode = instruction.opcode;
    let value = match opcode {
        Opcode::StructGet => instruction.target.as_ref(),
        Opcode::StructSet => instruction.op3.as_ref(),
        _ => return,
    };

    let (Some(object), Some(name)) = (&instruction.op1, &instruction.op2) else {
        return;
    };

    let module = visit.module;
    let location = Some(&instruction.location);
    let object_type = module.operand_type(object);

    let Some(structure) = object_type.as_struct() else {
        report_error!(checker, location, "{opcode}: {object_type} is not a struct");
        return;
    };

    let Some(ConstantValue::String(name)) = name.as_constant().map(|c| &c.value) else {
        report_error!(checker, location, "{opcode}: field name must be a string constant");
        return;
    };

    let Some(field) = structure.field(name) else {
        report_error!(checker, location, "struct {} has no field '{name}'", structure.name);
        return;
    };

    if let Some(value) = value {
        let actual = module.operand_type(value);
        if !actual.compatible_with(&field.ty) {
            report_error!(
                checker,
                location,
                "{opcode}: field '{name}' of struct {} has type {}, found {actual}",
                structure.name,
                field.ty
            );
        }
    }
}

fn check_tuple_index(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let Node::Instruction(_, instruction) = visit.node else {
        return;
    };

    // `op.index` on a tuple lowers to `tuple.index`
    let opcode = instruction.opcode;
    if !matches!(opcode, Opcode::TupleIndex | Opcode::OpIndex) {
        return;
    }

    let (Some(tuple), Some(index)) = (&instruction.op1, &instruction.op2) else {
        return;
    };

    let module = visit.module;
    let location = Some(&instruction.location);
    let tuple_type = module.operand_type(tuple);
    let Type::Tuple(elements) = &tuple_type else {
        return;
    };

    let Some(position) = constant_value(module, index).and_then(Constant::as_integer) else {
        report_error!(checker, location, "{opcode}: index must be an integer constant");
        return;
    };

    let Some(element) = usize::try_from(position).ok().and_then(|p| elements.get(p)) else {
        report_error!(
            checker,
            location,
            "{opcode}: index {position} is out of range for {tuple_type}"
        );
        return;
    };

    if let Some(target) = &instruction.target {
        let actual = module.operand_type(target);
        if !actual.compatible_with(element) {
            report_error!(
                checker,
                location,
                "{opcode}: element {position} has type {element}, found target {actual}"
            );
        }
    }
}

/* Terminators and calls */

fn check_branch_targets(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let (Node::Instruction(_, instruction), Some(function)) = (visit.node, visit.function()) else {
        return;
    };

    for label in instruction.labels() {
        if function.block_named(label).is_none() {
            report_error!(
                checker,
                Some(&instruction.location),
                "{}: no block named '{label}' in function '{}'",
                instruction.opcode,
                function.name
            );
        }
    }
}

fn check_return(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let (Node::Instruction(_, instruction), Some(function)) = (visit.node, visit.function()) else {
        return;
    };

    let expected = &function.signature.result;
    let location = Some(&instruction.location);

    match instruction.opcode {
        Opcode::ReturnVoid if *expected != Type::Void => report_error!(
            checker,
            location,
            "return.void in function '{}' which returns {expected}",
            function.name
        ),
        Opcode::ReturnResult if *expected == Type::Void => report_error!(
            checker,
            location,
            "return.result in void function '{}'",
            function.name
        ),
        Opcode::ReturnResult => {
            let Some(value) = &instruction.op1 else {
                return;
            };

            let actual = visit.module.operand_type(value);
            if !actual.compatible_with(expected) {
                report_error!(
                    checker,
                    location,
                    "return.result: function '{}' returns {expected}, found {actual}",
                    function.name
                );
            }
        }
        _ => {}
    }
}

fn check_call(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let Node::Instruction(_, instruction) = visit.node else {
        return;
    };

    let opcode = instruction.opcode;
    if opcode != Opcode::Call && !opcode.is_tail_call() {
        return;
    }

    let Some(callee) = &instruction.op1 else {
        return;
    };

    let module = visit.module;
    let location = Some(&instruction.location);

    // A callee which is not a function is a slot error
    let callee_type = module.operand_type(callee);
    let Some(signature) = callee_type.as_function() else {
        return;
    };

    let name = match module.callee(callee) {
        Some(function) => function.name.clone(),
        None => callee
            .as_id()
            .map_or_else(|| "<anonymous>".to_owned(), |id| module.id(id).name.clone()),
    };

    if let Some(arguments) = &instruction.op2 {
        if let Type::Tuple(actual) = module.operand_type(arguments) {
            let parameters = &signature.parameters;

            if actual.len() != parameters.len() {
                report_error!(
                    checker,
                    location,
                    "call to '{name}' expects {} argument(s), found {}",
                    parameters.len(),
                    actual.len()
                );
            } else {
                for (index, (parameter, actual)) in parameters.iter().zip(actual.iter()).enumerate() {
                    if !actual.compatible_with(&parameter.ty) {
                        report_error!(
                            checker,
                            location,
                            "argument {} of call to '{name}': expected {}, found {actual}",
                            index + 1,
                            parameter.ty
                        );
                    }
                }
            }
        }
    }

    match &instruction.target {
        Some(_) if signature.returns_void() => report_error!(
            checker,
            location,
            "call to '{name}' returns void but its result is assigned"
        ),
        Some(target) => {
            let actual = module.operand_type(target);
            if !signature.result.compatible_with(&actual) {
                report_error!(
                    checker,
                    location,
                    "call to '{name}' returns {}, found target {actual}",
                    signature.result
                );
            }
        }
        None => {}
    }

    if opcode.is_tail_call() && signature.calling_convention == CallingConvention::C {
        report_error!(checker, location, "{opcode}: tail call to C function '{name}'");
    }

    if checker.phase == Phase::PostCanonical && needs_continuation(module, instruction) {
        report_error!(
            checker,
            location,
            "call to '{name}' was not rewritten into a tail call"
        );
    }
}

fn check_operator(checker: &mut Checker<'_>, visit: &Visit<'_>) {
    let Node::Instruction(_, instruction) = visit.node else {
        return;
    };

    let Some(operator) = instruction.opcode.operator() else {
        return;
    };

    let module = visit.module;

    // Already reported by the width rule
    if operand_widths(module, instruction).len() > 1 {
        return;
    }

    let location = Some(&instruction.location);
    let operands = [&instruction.op1, &instruction.op2]
        .into_iter()
        .flatten()
        .map(|o| module.operand_type(o))
        .collect::<Vec<_>>();

    let registry = checker.registry;
    let binding = match registry.resolve(operator, &operands) {
        Ok(binding) => binding,
        Err(error) => {
            report_error!(checker, location, "{error}");
            return;
        }
    };

    if let Some(target) = &instruction.target {
        let result = binding.handler.result_type(&operands);
        let actual = module.operand_type(target);

        if !result.compatible_with(&actual) {
            report_error!(
                checker,
                location,
                "{}: {} produces {result}, found target {actual}",
                instruction.opcode,
                binding.name
            );
        }
    }
}

//! Drives a [`Backend`] over a checked, canonical module.
//!
//! The driver is a best-match pass. It owns no target knowledge: types,
//! values and blocks are requested from the backend, and every instruction
//! is forwarded as one [`TargetOp`]. Generic operators are resolved through
//! the operator registry and emitted by the winning binding.

use hashbrown::HashMap;

use crate::{
    backend::{Backend, Emitter, Linkage, TargetOp, TargetType, TargetValue, TypeInfo},
    diagnostics::{internal_error, Component, DiagnosticSink},
    middle::{
        checker::Phase,
        dispatch::{Dispatcher, Handler, Node, NodeClass, Visit},
        ensure_clean,
        ir::{opcode::Opcode, ty::Type, FunctionId, IdRef, IdRole, Instruction, Module, Operand},
        registry::OperatorRegistry,
        Refused, Stage,
    },
};

struct Codegen<'a, B: Backend> {
    backend: &'a mut B,
    registry: &'a OperatorRegistry,
    types: HashMap<Type, TargetType>,
    values: HashMap<IdRef, TargetValue>,
    functions: HashMap<FunctionId, TargetValue>,
    type_infos: Vec<TypeInfo>,
}

impl<'a, B: Backend> Codegen<'a, B> {
    /// Each distinct type is requested from the backend once
    fn target_type(&mut self, ty: &Type) -> TargetType {
        if let Some(target) = self.types.get(ty) {
            return *target;
        }

        let target = self.backend.target_type(ty);
        self.types.insert(ty.clone(), target);
        target
    }

    fn value(&mut self, module: &Module, operand: &Operand, into: &mut Vec<TargetValue>) {
        match operand {
            Operand::Const(constant) => into.push(self.backend.constant_expr(constant)),
            Operand::Tuple(elements) => {
                for element in elements {
                    self.value(module, element, into);
                }
            }
            Operand::Id(id) => match self.values.get(id) {
                Some(value) => into.push(*value),
                None => internal_error!(
                    Component::Codegen,
                    Some(&module.id(*id).location),
                    "'{}' has no value",
                    module.id(*id).name
                ),
            },
        }
    }

    fn values<'o>(&mut self, module: &Module, operands: impl IntoIterator<Item = &'o Operand>) -> Vec<TargetValue> {
        let mut values = Vec::new();
        for operand in operands {
            self.value(module, operand, &mut values);
        }
        values
    }

    /// Stores `result` into the instruction's target
    fn store(&mut self, module: &Module, instruction: &Instruction, result: Option<TargetValue>) {
        let (Some(target), Some(result)) = (&instruction.target, result) else {
            return;
        };

        let mut operands = self.values(module, [target]);
        operands.push(result);
        self.backend
            .emit(TargetOp::Instruction(Opcode::Assign), &operands, None);
    }
}

fn begin_module<B: Backend>(pass: &mut Codegen<'_, B>, visit: &Visit<'_>) {
    let module = visit.module;
    pass.backend.begin_module(&module.name);

    for declaration in &module.types {
        let info = pass.backend.type_info(&declaration.ty);
        pass.type_infos.push(info);
    }

    // Every function is declared up front so calls may refer to any of them
    for (id, function) in module.functions.enumerate() {
        let signature = &function.signature;
        let parameters = signature
            .parameters
            .iter()
            .map(|p| pass.target_type(&p.ty))
            .collect::<Vec<_>>();
        let result = pass.target_type(&signature.result);

        let linkage = if function.is_import() {
            Linkage::Declaration
        } else {
            Linkage::Definition
        };

        let value = pass.backend.declare_function(
            &function.name,
            &parameters,
            result,
            signature.calling_convention,
            linkage,
        );
        pass.functions.insert(id, value);
        pass.values.insert(function.id, value);
    }
}

fn finish_module<B: Backend>(pass: &mut Codegen<'_, B>, _: &Visit<'_>) {
    pass.backend.finish_module();
}

fn declare_id<B: Backend>(pass: &mut Codegen<'_, B>, visit: &Visit<'_>) {
    let Node::Id(handle, id) = visit.node else {
        return;
    };

    match id.role {
        IdRole::Global | IdRole::Constant => {
            let ty = pass.target_type(&id.ty);
            let initializer = match &id.value {
                Some(value) => pass.backend.constant_expr(value),
                None => pass.backend.default_value(&id.ty),
            };

            let global = pass.backend.declare_global(&id.name, ty, initializer);
            pass.values.insert(handle, global);
        }
        IdRole::Local => {
            let ty = pass.target_type(&id.ty);
            let local = pass.backend.declare_local(&id.name, ty);
            pass.values.insert(handle, local);
        }
        // Bound by their function
        IdRole::Parameter | IdRole::Function(_) => {}
    }
}

fn begin_function<B: Backend>(pass: &mut Codegen<'_, B>, visit: &Visit<'_>) {
    let Node::Function(id, function) = visit.node else {
        return;
    };

    if function.is_import() {
        return;
    }

    let Some(value) = pass.functions.get(&id).copied() else {
        internal_error!(
            Component::Codegen,
            Some(&function.location),
            "function '{}' was not declared",
            function.name
        );
    };

    let parameters = function
        .parameters
        .iter()
        .map(|p| {
            let parameter = visit.module.id(*p);
            (parameter.name.clone(), pass.target_type(&parameter.ty))
        })
        .collect::<Vec<_>>();

    let values = pass.backend.begin_function(value, &parameters);
    for (parameter, value) in function.parameters.iter().zip(values) {
        pass.values.insert(*parameter, value);
    }
}

fn end_function<B: Backend>(pass: &mut Codegen<'_, B>, visit: &Visit<'_>) {
    if visit.function().is_some_and(|f| !f.is_import()) {
        pass.backend.end_function();
    }
}

fn begin_block<B: Backend>(pass: &mut Codegen<'_, B>, visit: &Visit<'_>) {
    let (Node::Block(index, block), Some(function)) = (visit.node, visit.function()) else {
        return;
    };

    let label = block
        .name
        .clone()
        .unwrap_or_else(|| format!("{}.{index}", function.name));

    if !block.is_canonical() {
        internal_error!(
            Component::Codegen,
            Some(&block.location),
            "block '{label}' of function '{}' is not canonical",
            function.name
        );
    }

    pass.backend.begin_block(&label);
}

fn instruction<B: Backend>(pass: &mut Codegen<'_, B>, visit: &Visit<'_>) {
    let Node::Instruction(_, instruction) = visit.node else {
        return;
    };
    let module = visit.module;
    let op = TargetOp::Instruction(instruction.opcode);

    if instruction.opcode == Opcode::Assign || instruction.is_terminator() {
        // The target, if any, travels as the first operand
        let operands = pass.values(
            module,
            instruction
                .target
                .iter()
                .chain(&instruction.op1)
                .chain(&instruction.op2)
                .chain(&instruction.op3),
        );
        pass.backend.emit(op, &operands, None);
        return;
    }

    let operands = pass.values(
        module,
        instruction
            .op1
            .iter()
            .chain(&instruction.op2)
            .chain(&instruction.op3),
    );

    let result = instruction
        .target
        .as_ref()
        .map(|target| module.operand_type(target))
        .map(|ty| pass.target_type(&ty));

    let value = pass.backend.emit(op, &operands, result);
    pass.store(module, instruction, value);
}

fn operator<B: Backend>(pass: &mut Codegen<'_, B>, visit: &Visit<'_>) {
    let Node::Instruction(_, instruction) = visit.node else {
        return;
    };
    let module = visit.module;

    let Some(operator) = instruction.opcode.operator() else {
        internal_error!(
            Component::Codegen,
            Some(&instruction.location),
            "{} is not an operator",
            instruction.opcode
        );
    };

    let operands = instruction.op1.iter().chain(&instruction.op2).collect::<Vec<_>>();
    let types = operands
        .iter()
        .map(|op| module.operand_type(op))
        .collect::<Vec<_>>();

    let registry = pass.registry;
    let binding = match registry.resolve(operator, &types) {
        Ok(binding) => binding,
        Err(error) => internal_error!(Component::Codegen, Some(&instruction.location), "{error}"),
    };

    let values = pass.values(module, operands);
    let result = instruction
        .target
        .as_ref()
        .map(|target| module.operand_type(target))
        .map(|ty| pass.target_type(&ty));

    log::trace!("{} at {} -> {}", instruction.opcode, instruction.location, binding.name);

    let emitter: &mut dyn Emitter = &mut *pass.backend;
    let value = binding.handler.codegen(emitter, &values, &types, result);
    pass.store(module, instruction, value);
}

fn dispatcher<'a, B: Backend>() -> Dispatcher<Codegen<'a, B>> {
    let mut dispatcher = Dispatcher::best_match();
    dispatcher
        .register(Handler::new("begin-module", NodeClass::Module, begin_module).pre())
        .register(Handler::new("finish-module", NodeClass::Module, finish_module).post())
        .register(Handler::new("declare-id", NodeClass::Id, declare_id))
        .register(Handler::new("begin-function", NodeClass::Function, begin_function))
        .register(Handler::new("end-function", NodeClass::Function, end_function).post())
        .register(Handler::new("begin-block", NodeClass::Block, begin_block))
        .register(Handler::new("instruction", NodeClass::Instruction, instruction))
        .register(Handler::new("operator", NodeClass::OperatorCall, operator));
    dispatcher
}

/// Generates code for `module` through `backend`. Refuses to run once any
/// error has been reported.
pub fn generate<B: Backend>(
    module: &Module,
    registry: &OperatorRegistry,
    backend: &mut B,
    sink: &DiagnosticSink,
) -> Result<(), Refused> {
    ensure_clean(Stage::Codegen, sink)?;

    if module.checked != Some(Phase::PostCanonical) {
        internal_error!(
            Component::Codegen,
            Some(&module.location),
            "module '{}' has not passed the post-canonical check",
            module.name
        );
    }

    let mut pass = Codegen {
        backend,
        registry,
        types: HashMap::new(),
        values: HashMap::new(),
        functions: HashMap::new(),
        type_infos: Vec::new(),
    };
    dispatcher().walk(&mut pass, module);

    log::info!(
        "generated module '{}': {} function(s), {} target type(s), {} type info object(s)",
        module.name,
        module.functions.len(),
        pass.types.len(),
        pass.type_infos.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics::Location,
        index::Index,
        middle::{
            canonicalize::canonicalize,
            checker::check,
            ir::{
                builder::ModuleBuilder,
                opcode::Operator,
                ty::{CallingConvention, FunctionType, Parameter, TypeClass},
                Constant,
            },
            registry::builtins,
        },
    };

    /// Records every backend call as a line of text
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        types: usize,
        values: usize,
    }

    impl Recorder {
        fn value(&mut self) -> TargetValue {
            self.values += 1;
            TargetValue::new(self.values - 1)
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls.iter().filter(|c| c.starts_with(prefix)).count()
        }
    }

    impl Emitter for Recorder {
        fn emit(&mut self, op: TargetOp, operands: &[TargetValue], result: Option<TargetType>) -> Option<TargetValue> {
            self.calls.push(format!("emit {op} ({} operand(s))", operands.len()));
            result.map(|_| self.value())
        }
    }

    impl Backend for Recorder {
        fn target_type(&mut self, ty: &Type) -> TargetType {
            self.calls.push(format!("target_type {ty}"));
            self.types += 1;
            TargetType::new(self.types - 1)
        }

        fn default_value(&mut self, ty: &Type) -> TargetValue {
            self.calls.push(format!("default_value {ty}"));
            self.value()
        }

        fn constant_expr(&mut self, constant: &Constant) -> TargetValue {
            self.calls.push(format!("constant_expr {}", constant.value));
            self.value()
        }

        fn type_info(&mut self, ty: &Type) -> TypeInfo {
            self.calls.push(format!("type_info {ty}"));
            TypeInfo {
                name: ty.to_string(),
                class: ty.class(),
                object: self.value(),
            }
        }

        fn begin_module(&mut self, name: &str) {
            self.calls.push(format!("begin_module {name}"));
        }

        fn declare_global(&mut self, name: &str, _: TargetType, _: TargetValue) -> TargetValue {
            self.calls.push(format!("declare_global {name}"));
            self.value()
        }

        fn declare_function(
            &mut self,
            name: &str,
            parameters: &[TargetType],
            _: TargetType,
            calling_convention: CallingConvention,
            linkage: Linkage,
        ) -> TargetValue {
            self.calls.push(format!(
                "declare_function {name}/{} {calling_convention} {linkage}",
                parameters.len()
            ));
            self.value()
        }

        fn begin_function(&mut self, _: TargetValue, parameters: &[(String, TargetType)]) -> Vec<TargetValue> {
            self.calls.push(format!("begin_function/{}", parameters.len()));
            parameters.iter().map(|_| self.value()).collect()
        }

        fn declare_local(&mut self, name: &str, _: TargetType) -> TargetValue {
            self.calls.push(format!("declare_local {name}"));
            self.value()
        }

        fn begin_block(&mut self, label: &str) {
            self.calls.push(format!("begin_block {label}"));
        }

        fn end_function(&mut self) {
            self.calls.push("end_function".into());
        }

        fn finish_module(&mut self) {
            self.calls.push("finish_module".into());
        }
    }

    fn here() -> Location {
        Location::new("gen.ll", 1)
    }

    fn generated(module: &Module) -> Recorder {
        let mut recorder = Recorder::default();
        generate(module, builtins(), &mut recorder, &DiagnosticSink::new()).unwrap();
        recorder
    }

    /// Builds, checks and canonicalizes a module the way the pipeline does
    fn finish(builder: ModuleBuilder) -> Module {
        let mut sink = DiagnosticSink::new();
        let mut module = builder.finish(&mut sink);
        assert!(!sink.has_errors());
        check(&mut module, builtins(), &mut sink, Phase::PreCanonical);
        canonicalize(&mut module, &sink).unwrap();
        check(&mut module, builtins(), &mut sink, Phase::PostCanonical);
        assert!(!sink.has_errors(), "{:?}", sink.diagnostics());
        module
    }

    #[test]
    fn returning_a_parameter_requests_its_type_once() {
        let mut b = ModuleBuilder::for_module("m", here());
        b.begin_function(
            "f",
            FunctionType::new([Parameter::new("x", Type::INT32)], Type::INT32),
            here(),
        );
        let x = b.lookup("x").unwrap();
        b.push(Instruction::new(Opcode::ReturnResult, here()).with_op1(Operand::Id(x)));
        b.end_function();

        let recorder = generated(&finish(b));

        assert_eq!(recorder.count("target_type int<32>"), 1);
        assert_eq!(recorder.count("emit "), 1);
        assert_eq!(
            recorder.calls,
            vec![
                "begin_module m",
                "target_type int<32>",
                "declare_function f/1 default definition",
                "begin_function/1",
                "begin_block f.0",
                "emit return.result (1 operand(s))",
                "end_function",
                "finish_module",
            ]
        );
    }

    #[test]
    fn imports_are_declared_but_not_defined() {
        let mut b = ModuleBuilder::for_module("m", here());
        b.import_function(
            "puts",
            FunctionType::new([Parameter::new("s", Type::String)], Type::Void)
                .with_calling_convention(CallingConvention::C),
            here(),
        );

        let recorder = generated(&finish(b));

        assert_eq!(recorder.count("declare_function puts/1 c declaration"), 1);
        assert_eq!(recorder.count("begin_function"), 0);
        assert_eq!(recorder.count("end_function"), 0);
    }

    #[test]
    fn globals_take_their_initial_value_or_a_default() {
        let mut b = ModuleBuilder::for_module("m", here());
        b.global("counter", Type::INT64, None, here());
        b.constant("limit", Constant::int(10, 64, here()), here());
        let point = b.declare_struct("Point", vec![], here());
        b.global("origin", point, None, here());

        let recorder = generated(&finish(b));
        let calls = recorder.calls.iter().map(String::as_str).collect::<Vec<_>>();

        assert_eq!(
            calls,
            vec![
                "begin_module m",
                "type_info struct Point",
                "target_type int<64>",
                "default_value int<64>",
                "declare_global counter",
                "constant_expr 10",
                "declare_global limit",
                "target_type struct Point",
                "default_value struct Point",
                "declare_global origin",
                "finish_module",
            ]
        );
    }

    #[test]
    fn results_are_stored_into_their_targets() {
        let mut b = ModuleBuilder::for_module("m", here());
        b.begin_function("f", FunctionType::new([], Type::Void), here());
        let a = b.local("a", Type::INT32, here());
        b.push(
            Instruction::new(Opcode::IntAdd, here())
                .with_target(Operand::Id(a))
                .with_op1(Operand::Id(a))
                .with_op2(Operand::Const(Constant::int(1, 32, here()))),
        );
        b.end_function();

        let recorder = generated(&finish(b));

        assert_eq!(recorder.count("declare_local a"), 1);
        assert_eq!(recorder.count("emit int.add (2 operand(s))"), 1);
        assert_eq!(recorder.count("emit assign (2 operand(s))"), 1);
        assert_eq!(recorder.count("emit return.void (0 operand(s))"), 1);
    }

    #[test]
    fn operators_are_emitted_by_their_binding() {
        let mut b = ModuleBuilder::for_module("m", here());
        b.begin_function("f", FunctionType::new([], Type::Void), here());
        let t = b.local("t", Type::tuple([Type::Bool, Type::Double]), here());
        let n = b.local("n", Type::INT64, here());
        b.push(
            Instruction::new(Opcode::OpSize, here())
                .with_target(Operand::Id(n))
                .with_op1(Operand::Id(t)),
        );
        b.end_function();

        let recorder = generated(&finish(b));
        let op = TargetOp::Operator {
            operator: Operator::Size,
            class: TypeClass::Tuple,
        };

        assert_eq!(recorder.count(&format!("emit {op} (1 operand(s))")), 1);
        assert_eq!(recorder.count("emit assign"), 1);
    }

    #[test]
    fn calls_pass_their_arguments_and_continuation() {
        let mut b = ModuleBuilder::for_module("m", here());
        b.import_function(
            "g",
            FunctionType::new([Parameter::new("x", Type::INT32)], Type::Void),
            here(),
        );
        b.begin_function("f", FunctionType::new([], Type::Void), here());
        let g = b.lookup("g").unwrap();
        b.push(
            Instruction::new(Opcode::Call, here())
                .with_op1(Operand::Id(g))
                .with_op2(Operand::Tuple(vec![Operand::Const(Constant::int(1, 32, here()))])),
        );
        b.end_function();

        let recorder = generated(&finish(b));

        // callee, one argument, continuation label
        assert_eq!(recorder.count("emit call.tail.void (3 operand(s))"), 1);
        assert_eq!(recorder.count("begin_block __f_1"), 1);
    }

    #[test]
    fn refuses_after_errors() {
        let module = finish(ModuleBuilder::for_module("m", here()));
        let mut sink = DiagnosticSink::new();
        sink.report(Component::Checker, "earlier", None);

        let mut recorder = Recorder::default();
        assert_eq!(
            generate(&module, builtins(), &mut recorder, &sink),
            Err(Refused {
                stage: Stage::Codegen,
                errors: 1
            })
        );
        assert!(recorder.calls.is_empty());
    }

    #[test]
    #[should_panic(expected = "block 'f.0' of function 'f' is not canonical")]
    fn non_canonical_blocks_abort() {
        let mut b = ModuleBuilder::for_module("m", here());
        b.begin_function("f", FunctionType::new([], Type::Void), here());
        b.push(Instruction::new(Opcode::BoolNot, here()));
        b.end_function();

        let mut sink = DiagnosticSink::new();
        let mut module = b.finish(&mut sink);
        module.checked = Some(Phase::PostCanonical);
        generated(&module);
    }

    #[test]
    #[should_panic(expected = "module 'm' has not passed the post-canonical check")]
    fn unchecked_modules_abort() {
        let mut b = ModuleBuilder::for_module("m", here());
        b.begin_function("f", FunctionType::new([], Type::Void), here());
        b.push(Instruction::return_void(here()));
        b.end_function();

        let mut sink = DiagnosticSink::new();
        let mut module = b.finish(&mut sink);
        canonicalize(&mut module, &sink).unwrap();
        generated(&module);
    }

    #[test]
    #[should_panic(expected = "module 'm' has not passed the post-canonical check")]
    fn rewriting_after_the_check_invalidates_it() {
        let mut b = ModuleBuilder::for_module("m", here());
        b.begin_function("f", FunctionType::new([], Type::Void), here());
        b.push(Instruction::new(Opcode::BoolNot, here()));
        b.end_function();

        let mut sink = DiagnosticSink::new();
        let mut module = b.finish(&mut sink);
        module.checked = Some(Phase::PostCanonical);
        assert_eq!(canonicalize(&mut module, &sink), Ok(1));
        generated(&module);
    }
}

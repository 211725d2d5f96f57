use hashbrown::HashMap;
use indoc::indoc;
use itertools::Itertools;

use crate::{
    backend::{assembler::Assembler, Backend, Emitter, Linkage, TargetOp, TargetType, TargetValue, TypeInfo},
    diagnostics::{internal_error, Component},
    index::IndexVec,
    middle::ir::{
        ty::{CallingConvention, Type},
        Constant, ConstantValue,
    },
};

struct FunctionSignature {
    name: String,
    parameters: Vec<TargetType>,
    result: TargetType,
    calling_convention: CallingConvention,
}

/// Renders the backend contract as pseudo target code. Makes no layout or
/// ABI decisions: every type is named, never sized.
#[derive(Default)]
pub struct TextBackend {
    assembler: Assembler,
    types: IndexVec<TargetType, String>,
    values: IndexVec<TargetValue, String>,
    functions: HashMap<TargetValue, FunctionSignature>,
    registers: usize,
}

impl TextBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> &str {
        self.assembler.output()
    }

    pub fn into_output(self) -> String {
        self.assembler.into_output()
    }

    pub fn type_name(&self, ty: TargetType) -> &str {
        &self.types[ty]
    }

    pub fn value_name(&self, value: TargetValue) -> &str {
        &self.values[value]
    }

    fn value(&mut self, text: String) -> TargetValue {
        self.values.push(text)
    }

    fn register(&mut self) -> TargetValue {
        let name = format!("%{}", self.registers);
        self.registers += 1;
        self.value(name)
    }

    fn render_type(&self, ty: &Type) -> String {
        match ty {
            Type::Void => "void".into(),
            Type::Bool => "i1".into(),
            Type::Integer(0) => "i64".into(),
            Type::Integer(width) => format!("i{width}"),
            Type::Double => "double".into(),
            Type::String => "string".into(),
            Type::Bytes => "bytes".into(),
            Type::Reference(inner) => format!("ptr<{}>", self.render_type(inner)),
            Type::Iterator(inner) => format!("iter<{}>", self.render_type(inner)),
            Type::Tuple(elements) => {
                format!("{{{}}}", elements.iter().map(|e| self.render_type(e)).join(", "))
            }
            Type::Struct(s) => format!("%struct.{}", s.name),
            Type::Enum(_) => "i64".into(),
            Type::Function(_) => "ptr<fn>".into(),
            Type::Label => "label".into(),
            Type::Any => "ptr<any>".into(),
            Type::Exception(id) => format!("ptr<exception.{id}>"),
        }
    }

    fn render_constant(constant: &Constant) -> String {
        match &constant.value {
            ConstantValue::Void => "void".into(),
            ConstantValue::Bool(value) => value.to_string(),
            ConstantValue::Integer(value) => value.to_string(),
            ConstantValue::Double(value) => format!("{value:?}"),
            ConstantValue::String(value) => format!("{value:?}"),
            ConstantValue::Bytes(value) => format!("b\"{}\"", value.escape_ascii()),
            ConstantValue::Enum(label) => match &constant.ty {
                Type::Enum(e) => format!("{}::{label}", e.name),
                _ => label.clone(),
            },
            ConstantValue::Label(name) => format!("%{name}"),
            ConstantValue::Tuple(elements) => {
                format!("{{{}}}", elements.iter().map(Self::render_constant).join(", "))
            }
            ConstantValue::Null => "null".into(),
        }
    }
}

impl Emitter for TextBackend {
    fn emit(
        &mut self,
        op: TargetOp,
        operands: &[TargetValue],
        result: Option<TargetType>,
    ) -> Option<TargetValue> {
        let mut line = op.to_string();

        if !operands.is_empty() {
            line.push(' ');
            line.push_str(&operands.iter().map(|v| &self.values[*v]).join(", "));
        }

        match result {
            Some(ty) => {
                let register = self.register();
                self.assembler.emit(format!(
                    "{} = {line} : {}",
                    self.values[register], self.types[ty]
                ));
                Some(register)
            }
            None => {
                self.assembler.emit(line);
                None
            }
        }
    }
}

impl Backend for TextBackend {
    fn target_type(&mut self, ty: &Type) -> TargetType {
        let rendered = self.render_type(ty);
        self.types.push(rendered)
    }

    fn default_value(&mut self, ty: &Type) -> TargetValue {
        let text = match ty {
            Type::Bool => "false".into(),
            Type::Integer(_) | Type::Enum(_) => "0".into(),
            Type::Double => "0.0".into(),
            Type::String => "\"\"".into(),
            Type::Bytes => "b\"\"".into(),
            Type::Reference(_) | Type::Function(_) | Type::Any | Type::Exception(_) => {
                "null".into()
            }
            Type::Void => "void".into(),
            _ => "zeroinitializer".into(),
        };
        self.value(text)
    }

    fn constant_expr(&mut self, constant: &Constant) -> TargetValue {
        self.value(Self::render_constant(constant))
    }

    fn type_info(&mut self, ty: &Type) -> TypeInfo {
        let name = ty.to_string();
        let index = self.values.len();
        let object = self.value(format!("@__typeinfo.{index}"));
        self.assembler.push_line(format!(
            "{} = typeinfo {} {name:?}",
            self.values[object],
            ty.class()
        ));

        TypeInfo {
            name,
            class: ty.class(),
            object,
        }
    }

    fn begin_module(&mut self, name: &str) {
        self.assembler.push_line(format!(
            indoc! {"
                ; module {0}
                ; pseudo target code, not for assembly"},
            name
        ));
        self.assembler.blank();
    }

    fn declare_global(&mut self, name: &str, ty: TargetType, initializer: TargetValue) -> TargetValue {
        let global = self.value(format!("@{name}"));
        self.assembler.push_line(format!(
            "{} = global {} {}",
            self.values[global], self.types[ty], self.values[initializer]
        ));
        global
    }

    fn declare_function(
        &mut self,
        name: &str,
        parameters: &[TargetType],
        result: TargetType,
        calling_convention: CallingConvention,
        linkage: Linkage,
    ) -> TargetValue {
        let function = self.value(format!("@{name}"));

        if linkage == Linkage::Declaration {
            let convention = match calling_convention {
                CallingConvention::C => "ccc ",
                CallingConvention::Default => "",
            };
            self.assembler.push_line(format!(
                "declare {convention}{} @{name}({})",
                self.types[result],
                parameters.iter().map(|p| &self.types[*p]).join(", ")
            ));
        }

        self.functions.insert(
            function,
            FunctionSignature {
                name: name.to_owned(),
                parameters: parameters.to_vec(),
                result,
                calling_convention,
            },
        );

        function
    }

    fn begin_function(&mut self, function: TargetValue, parameters: &[(String, TargetType)]) -> Vec<TargetValue> {
        let Some(signature) = self.functions.get(&function) else {
            internal_error!(
                Component::Codegen,
                None,
                "function {} was never declared",
                self.values[function]
            );
        };

        debug_assert_eq!(signature.parameters.len(), parameters.len());

        let convention = match signature.calling_convention {
            CallingConvention::C => "ccc ",
            CallingConvention::Default => "",
        };

        let header = format!(
            "define {convention}{} @{}({}) {{",
            self.types[signature.result],
            signature.name,
            parameters
                .iter()
                .map(|(name, ty)| format!("{} %{name}", self.types[*ty]))
                .join(", ")
        );
        self.assembler.push_line(header);

        parameters
            .iter()
            .map(|(name, _)| self.value(format!("%{name}")))
            .collect()
    }

    fn declare_local(&mut self, name: &str, ty: TargetType) -> TargetValue {
        let local = self.value(format!("%{name}"));
        self.assembler
            .emit(format!("{} = local {}", self.values[local], self.types[ty]));
        local
    }

    fn begin_block(&mut self, label: &str) {
        self.assembler.label(label);
    }

    fn end_function(&mut self) {
        self.assembler.push_line("}");
        self.assembler.blank();
    }

    fn finish_module(&mut self) {
        self.assembler.comment("end of module");
    }
}

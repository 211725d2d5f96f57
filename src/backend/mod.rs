//! The contract between the codegen driver and a native backend. The driver
//! never sees target code: every type, value and block it hands around is an
//! opaque handle minted by the backend.
//!
//! [`TextBackend`] implements the contract by rendering pseudo target code,
//! which is enough to exercise the driver end to end.

use strum::Display;

use crate::{
    index::simple_index,
    middle::ir::{
        opcode::{Opcode, Operator},
        ty::{CallingConvention, Type, TypeClass},
        Constant,
    },
};

pub mod assembler;
pub mod text;

pub use text::TextBackend;

simple_index! {
    /// A backend type
    pub struct TargetType;
}

simple_index! {
    /// A backend value: a constant, a register, a global or a function
    pub struct TargetValue;
}

/// One backend operation. Each built-in instruction is its own op, and so is
/// every operator/type-class pairing that has no instruction of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetOp {
    Instruction(Opcode),
    Operator { operator: Operator, class: TypeClass },
}

impl core::fmt::Display for TargetOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetOp::Instruction(opcode) => write!(f, "{opcode}"),
            TargetOp::Operator { operator, class } => write!(f, "{class}.{operator}"),
        }
    }
}

/// Runtime metadata describing a type
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub name: String,
    pub class: TypeClass,
    /// The metadata object itself
    pub object: TargetValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Linkage {
    /// Defined in this module
    Definition,
    /// Imported from elsewhere
    Declaration,
}

/// The single emission callback. Operator handlers only see this part of
/// the backend.
pub trait Emitter {
    fn emit(
        &mut self,
        op: TargetOp,
        operands: &[TargetValue],
        result: Option<TargetType>,
    ) -> Option<TargetValue>;
}

pub trait Backend: Emitter {
    fn target_type(&mut self, ty: &Type) -> TargetType;
    fn default_value(&mut self, ty: &Type) -> TargetValue;
    fn constant_expr(&mut self, constant: &Constant) -> TargetValue;
    fn type_info(&mut self, ty: &Type) -> TypeInfo;

    fn begin_module(&mut self, name: &str);
    fn declare_global(&mut self, name: &str, ty: TargetType, initializer: TargetValue) -> TargetValue;
    fn declare_function(
        &mut self,
        name: &str,
        parameters: &[TargetType],
        result: TargetType,
        calling_convention: CallingConvention,
        linkage: Linkage,
    ) -> TargetValue;
    /// Returns one value per parameter
    fn begin_function(&mut self, function: TargetValue, parameters: &[(String, TargetType)]) -> Vec<TargetValue>;
    fn declare_local(&mut self, name: &str, ty: TargetType) -> TargetValue;
    fn begin_block(&mut self, label: &str);
    fn end_function(&mut self);
    fn finish_module(&mut self);
}

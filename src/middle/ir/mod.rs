//! The IR node model. A [`Module`] owns everything: IDs live in a per-module
//! arena and are referenced by [`IdRef`] handles, functions own their blocks,
//! and blocks own their instructions.

use std::sync::Arc;

use hashbrown::HashMap;
use itertools::Itertools;
use strum::Display;
use thiserror::Error;

use crate::{
    diagnostics::Location,
    index::{simple_index, IndexVec},
    middle::checker::Phase,
};

pub mod builder;
pub mod opcode;
pub mod pretty_print;
pub mod ty;

use opcode::{Opcode, SlotName};
use ty::{EnumType, FunctionType, Type};

simple_index! {
    /// Handle of an [`Id`] in its module's arena
    pub struct IdRef;
}

simple_index! {
    pub struct FunctionId;
}

simple_index! {
    /// Handle of a declared exception type
    pub struct ExceptionId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum IdRole {
    Global,
    Local,
    Constant,
    Parameter,
    Function(FunctionId),
}

/// A named, typed storage location or symbol
#[derive(Debug, Clone, PartialEq)]
pub struct Id {
    pub name: String,
    pub ty: Type,
    pub location: Location,
    pub role: IdRole,
    /// Initial value of a global or constant
    pub value: Option<Constant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("identifier '{name}' is already defined")]
    Duplicate { name: String, previous: IdRef },
}

/// Name to ID mapping which remembers insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    names: HashMap<String, IdRef>,
    order: Vec<IdRef>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, id: IdRef) -> Result<(), ScopeError> {
        if let Some(previous) = self.names.get(name) {
            return Err(ScopeError::Duplicate {
                name: name.to_owned(),
                previous: *previous,
            });
        }

        self.names.insert(name.to_owned(), id);
        self.order.push(id);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<IdRef> {
        self.names.get(name).copied()
    }

    /// IDs in the order they were inserted
    pub fn iter(&self) -> impl Iterator<Item = IdRef> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Void,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    /// A label of the constant's enum type
    Enum(String),
    /// A block label
    Label(String),
    Tuple(Vec<Constant>),
    /// The null reference
    Null,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstantError {
    #[error("value {value} cannot have type {ty}")]
    ShapeMismatch { value: String, ty: Type },
    #[error("enum {name} has no label '{label}'")]
    UnknownLabel { name: String, label: String },
    #[error("integer {value} does not fit in {width} bits")]
    OutOfRange { value: i64, width: u8 },
    #[error("invalid integer width {0}")]
    InvalidWidth(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub value: ConstantValue,
    pub ty: Type,
    pub location: Location,
}

/// Accepts both the signed and the unsigned interpretation of `width` bits
pub fn integer_fits(value: i64, width: u8) -> bool {
    if width == 0 || width >= 64 {
        return true;
    }

    let min = -(1i64 << (width - 1));
    let max = (1i64 << width) - 1;
    (min..=max).contains(&value)
}

impl Constant {
    /// Builds a constant after checking that the value has the shape of the
    /// type. Enum constants must name one of the enum's labels.
    pub fn new(value: ConstantValue, ty: Type, location: Location) -> Result<Self, ConstantError> {
        Self::validate(&value, &ty)?;

        Ok(Self {
            value,
            ty,
            location,
        })
    }

    fn validate(value: &ConstantValue, ty: &Type) -> Result<(), ConstantError> {
        match (value, ty) {
            (ConstantValue::Void, Type::Void)
            | (ConstantValue::Bool(_), Type::Bool)
            | (ConstantValue::Double(_), Type::Double)
            | (ConstantValue::String(_), Type::String)
            | (ConstantValue::Bytes(_), Type::Bytes)
            | (ConstantValue::Label(_), Type::Label)
            | (ConstantValue::Null, Type::Reference(_)) => Ok(()),
            (ConstantValue::Integer(value), Type::Integer(width)) => {
                if *width != 0 && !Type::VALID_INTEGER_WIDTHS.contains(width) {
                    return Err(ConstantError::InvalidWidth(*width));
                }

                if *width != 0 && !integer_fits(*value, *width) {
                    return Err(ConstantError::OutOfRange {
                        value: *value,
                        width: *width,
                    });
                }

                Ok(())
            }
            (ConstantValue::Enum(label), Type::Enum(enum_type)) => {
                if enum_type.has_label(label) {
                    Ok(())
                } else {
                    Err(ConstantError::UnknownLabel {
                        name: enum_type.name.clone(),
                        label: label.clone(),
                    })
                }
            }
            (ConstantValue::Tuple(elements), Type::Tuple(types))
                if elements.len() == types.len()
                    && elements
                        .iter()
                        .zip(types.iter())
                        .all(|(e, t)| e.ty.compatible_with(t)) =>
            {
                Ok(())
            }
            _ => Err(ConstantError::ShapeMismatch {
                value: value.to_string(),
                ty: ty.clone(),
            }),
        }
    }

    /// Re-runs construction validation, for constants built unchecked
    pub fn check(&self) -> Result<(), ConstantError> {
        Self::validate(&self.value, &self.ty)
    }

    fn unchecked(value: ConstantValue, ty: Type, location: Location) -> Self {
        Self {
            value,
            ty,
            location,
        }
    }

    pub fn bool(value: bool, location: Location) -> Self {
        Self::unchecked(ConstantValue::Bool(value), Type::Bool, location)
    }

    /// An integer constant of the given width. The value is not range
    /// checked here; the checker reports constants that do not fit. A width
    /// of 0 leaves the width to be unified with the context.
    pub fn int(value: i64, width: u8, location: Location) -> Self {
        Self::unchecked(ConstantValue::Integer(value), Type::Integer(width), location)
    }

    pub fn double(value: f64, location: Location) -> Self {
        Self::unchecked(ConstantValue::Double(value), Type::Double, location)
    }

    pub fn string(value: impl Into<String>, location: Location) -> Self {
        Self::unchecked(ConstantValue::String(value.into()), Type::String, location)
    }

    pub fn bytes(value: impl Into<Vec<u8>>, location: Location) -> Self {
        Self::unchecked(ConstantValue::Bytes(value.into()), Type::Bytes, location)
    }

    pub fn label(name: impl Into<String>, location: Location) -> Self {
        Self::unchecked(ConstantValue::Label(name.into()), Type::Label, location)
    }

    pub fn enum_label(
        enum_type: &Arc<EnumType>,
        label: impl Into<String>,
        location: Location,
    ) -> Result<Self, ConstantError> {
        Self::new(
            ConstantValue::Enum(label.into()),
            Type::Enum(enum_type.clone()),
            location,
        )
    }

    pub fn as_label(&self) -> Option<&str> {
        match &self.value {
            ConstantValue::Label(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.value {
            ConstantValue::Integer(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self.value {
            ConstantValue::Integer(value) => value == 0,
            ConstantValue::Double(value) => value == 0.0,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Const(Constant),
    Id(IdRef),
    Tuple(Vec<Operand>),
}

impl Operand {
    pub fn label(name: impl Into<String>, location: Location) -> Self {
        Operand::Const(Constant::label(name, location))
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Operand::Const(constant) => Some(constant),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        self.as_constant().and_then(Constant::as_label)
    }

    pub fn as_id(&self) -> Option<IdRef> {
        match self {
            Operand::Id(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Operand::Const(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub target: Option<Operand>,
    pub op1: Option<Operand>,
    pub op2: Option<Operand>,
    pub op3: Option<Operand>,
    pub location: Location,
}

impl Instruction {
    pub fn new(opcode: Opcode, location: Location) -> Self {
        Self {
            opcode,
            target: None,
            op1: None,
            op2: None,
            op3: None,
            location,
        }
    }

    pub fn with_target(mut self, target: Operand) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_op1(mut self, op: Operand) -> Self {
        self.op1 = Some(op);
        self
    }

    pub fn with_op2(mut self, op: Operand) -> Self {
        self.op2 = Some(op);
        self
    }

    pub fn with_op3(mut self, op: Operand) -> Self {
        self.op3 = Some(op);
        self
    }

    pub fn jump(label: &str, location: Location) -> Self {
        Self::new(Opcode::Jump, location.clone()).with_op1(Operand::label(label, location))
    }

    pub fn return_void(location: Location) -> Self {
        Self::new(Opcode::ReturnVoid, location)
    }

    pub fn operand(&self, slot: SlotName) -> Option<&Operand> {
        match slot {
            SlotName::Target => self.target.as_ref(),
            SlotName::Op1 => self.op1.as_ref(),
            SlotName::Op2 => self.op2.as_ref(),
            SlotName::Op3 => self.op3.as_ref(),
        }
    }

    pub fn operand_mut(&mut self, slot: SlotName) -> Option<&mut Operand> {
        match slot {
            SlotName::Target => self.target.as_mut(),
            SlotName::Op1 => self.op1.as_mut(),
            SlotName::Op2 => self.op2.as_mut(),
            SlotName::Op3 => self.op3.as_mut(),
        }
    }

    /// Present operands in traversal order: op1, op2, op3, target
    pub fn operands(&self) -> impl Iterator<Item = (SlotName, &Operand)> {
        SlotName::VISIT_ORDER
            .into_iter()
            .filter_map(|slot| self.operand(slot).map(|op| (slot, op)))
    }

    /// Block labels referenced by this instruction
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.operands().filter_map(|(_, op)| op.as_label())
    }

    pub fn is_terminator(&self) -> bool {
        self.opcode.is_terminator()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: Option<String>,
    /// Explicit fall-through successor
    pub next: Option<String>,
    pub instructions: Vec<Instruction>,
    pub location: Location,
}

impl Block {
    pub fn new(name: Option<String>, location: Location) -> Self {
        Self {
            name,
            next: None,
            instructions: Vec::new(),
            location,
        }
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    /// Canonical form: exactly one terminator, in last position
    pub fn is_canonical(&self) -> bool {
        self.terminator().is_some()
            && self.instructions.iter().filter(|i| i.is_terminator()).count() == 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    /// This function's symbol in the module scope
    pub id: IdRef,
    pub signature: Arc<FunctionType>,
    /// Parameters and locals
    pub scope: Scope,
    pub parameters: Vec<IdRef>,
    /// The first block is the entry block
    pub blocks: Vec<Block>,
    pub location: Location,
}

impl Function {
    pub fn ty(&self) -> Type {
        Type::Function(self.signature.clone())
    }

    /// Imported functions have no body
    pub fn is_import(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_named(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name.as_deref() == Some(name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionDecl {
    pub name: String,
    pub base: Option<ExceptionId>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDeclaration {
    pub name: String,
    pub ty: Type,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DeclarationKind {
    Module,
    Global,
    Constant,
    Function,
    Import,
    Struct,
    Enum,
    Exception,
}

/// One entry of the module's declaration log, in source order
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub name: String,
    pub location: Location,
    /// Set when the declaration appeared inside a function body
    pub enclosing_function: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub location: Location,
    pub scope: Scope,
    pub ids: IndexVec<IdRef, Id>,
    pub functions: IndexVec<FunctionId, Function>,
    pub types: Vec<TypeDeclaration>,
    pub exceptions: IndexVec<ExceptionId, ExceptionDecl>,
    pub declarations: Vec<Declaration>,
    /// The last check that passed without errors. Cleared by any rewrite.
    pub checked: Option<Phase>,
}

impl Module {
    pub fn new(name: impl Into<String>, location: Location) -> Self {
        Self {
            name: name.into(),
            location,
            scope: Scope::new(),
            ids: IndexVec::new(),
            functions: IndexVec::new(),
            types: Vec::new(),
            exceptions: IndexVec::new(),
            declarations: Vec::new(),
            checked: None,
        }
    }

    pub fn id(&self, id: IdRef) -> &Id {
        &self.ids[id]
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id]
    }

    pub fn function_named(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .enumerate()
            .find(|(_, f)| f.name == name)
            .map(|(id, _)| id)
    }

    /// The function an operand refers to, if it names one
    pub fn callee(&self, operand: &Operand) -> Option<&Function> {
        match self.id(operand.as_id()?).role {
            IdRole::Function(function) => Some(self.function(function)),
            _ => None,
        }
    }

    pub fn operand_type(&self, operand: &Operand) -> Type {
        match operand {
            Operand::Const(constant) => constant.ty.clone(),
            Operand::Id(id) => self.id(*id).ty.clone(),
            Operand::Tuple(elements) => Type::tuple(elements.iter().map(|e| self.operand_type(e))),
        }
    }

    /// Module-level IDs in declaration order
    pub fn globals(&self) -> impl Iterator<Item = (IdRef, &Id)> {
        self.scope.iter().map(|id| (id, self.id(id)))
    }
}

impl core::fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstantValue::Void => write!(f, "void"),
            ConstantValue::Bool(value) => write!(f, "{value}"),
            ConstantValue::Integer(value) => write!(f, "{value}"),
            ConstantValue::Double(value) => write!(f, "{value:?}"),
            ConstantValue::String(value) => write!(f, "{value:?}"),
            ConstantValue::Bytes(value) => write!(f, "b\"{}\"", value.escape_ascii()),
            ConstantValue::Enum(label) => write!(f, "::{label}"),
            ConstantValue::Label(name) => write!(f, "@{name}"),
            ConstantValue::Tuple(elements) => {
                write!(f, "({})", elements.iter().map(|e| &e.value).join(", "))
            }
            ConstantValue::Null => write!(f, "null"),
        }
    }
}

#[cfg(test)]
mod tests;

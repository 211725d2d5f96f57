use std::{cmp::Ordering, sync::Arc};

use colored::Colorize;
use itertools::Itertools;
use strum::{Display, EnumIter};

use crate::middle::ir::ExceptionId;

/// IR value types. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// void
    Void,
    /// bool
    Bool,
    /// int<8>, int<16>, int<32>, int<64>
    ///
    /// A width of 0 marks an integer constant whose width has not been
    /// unified with its context yet. Only legal before checking.
    Integer(u8),
    /// double
    Double,
    /// string
    String,
    /// bytes
    Bytes,
    /// ref<T>
    Reference(Arc<Type>),
    /// iterator<T>
    Iterator(Arc<Type>),
    /// tuple<A, B, ...>
    Tuple(Arc<[Type]>),
    /// A named struct with ordered fields
    Struct(Arc<StructType>),
    /// A named enum with a fixed label set
    Enum(Arc<EnumType>),
    /// A function signature
    Function(Arc<FunctionType>),
    /// A block label
    Label,
    /// Matches any type in a signature
    Any,
    /// A declared exception type
    Exception(ExceptionId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<Field>,
}

impl StructType {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    pub name: String,
    pub labels: Vec<String>,
}

impl EnumType {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub parameters: Vec<Parameter>,
    pub result: Type,
    pub calling_convention: CallingConvention,
}

impl FunctionType {
    pub fn new(parameters: impl IntoIterator<Item = Parameter>, result: Type) -> Self {
        Self {
            parameters: parameters.into_iter().collect(),
            result,
            calling_convention: CallingConvention::Default,
        }
    }

    pub fn with_calling_convention(mut self, calling_convention: CallingConvention) -> Self {
        self.calling_convention = calling_convention;
        self
    }

    pub fn returns_void(&self) -> bool {
        self.result == Type::Void
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum CallingConvention {
    /// Calls go through continuations and may be turned into tail calls
    Default,
    /// Plain C calls which return to the caller
    C,
}

/// The tag of a [`Type`] variant. Dispatch and the operator registry match on
/// this instead of probing types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum TypeClass {
    Void,
    Bool,
    Integer,
    Double,
    String,
    Bytes,
    Reference,
    Iterator,
    Tuple,
    Struct,
    Enum,
    Function,
    Label,
    Any,
    Exception,
}

/// A broad predicate over type classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum TypeFamily {
    /// integer and double
    Numeric,
    /// types with a total order: numeric types, strings and bytes
    Ordered,
    /// types with a length: strings, bytes and tuples
    Sized,
}

impl TypeFamily {
    pub fn classes(self) -> &'static [TypeClass] {
        match self {
            TypeFamily::Numeric => &[TypeClass::Integer, TypeClass::Double],
            TypeFamily::Ordered => &[
                TypeClass::Integer,
                TypeClass::Double,
                TypeClass::String,
                TypeClass::Bytes,
            ],
            TypeFamily::Sized => &[TypeClass::String, TypeClass::Bytes, TypeClass::Tuple],
        }
    }

    pub fn contains(self, class: TypeClass) -> bool {
        self.classes().contains(&class)
    }

    /// Returns true if every class of `self` also belongs to `other`
    pub fn is_subset_of(self, other: TypeFamily) -> bool {
        self.classes().iter().all(|c| other.contains(*c))
    }
}

impl Type {
    pub const INT8: Type = Type::Integer(8);
    pub const INT16: Type = Type::Integer(16);
    pub const INT32: Type = Type::Integer(32);
    pub const INT64: Type = Type::Integer(64);

    pub const VALID_INTEGER_WIDTHS: [u8; 4] = [8, 16, 32, 64];

    pub fn int(width: u8) -> Self {
        Type::Integer(width)
    }

    pub fn reference(inner: Type) -> Self {
        Type::Reference(Arc::new(inner))
    }

    pub fn iterator(inner: Type) -> Self {
        Type::Iterator(Arc::new(inner))
    }

    pub fn tuple(elements: impl IntoIterator<Item = Type>) -> Self {
        Type::Tuple(elements.into_iter().collect())
    }

    pub fn function(ty: FunctionType) -> Self {
        Type::Function(Arc::new(ty))
    }

    pub fn class(&self) -> TypeClass {
        match self {
            Type::Void => TypeClass::Void,
            Type::Bool => TypeClass::Bool,
            Type::Integer(_) => TypeClass::Integer,
            Type::Double => TypeClass::Double,
            Type::String => TypeClass::String,
            Type::Bytes => TypeClass::Bytes,
            Type::Reference(_) => TypeClass::Reference,
            Type::Iterator(_) => TypeClass::Iterator,
            Type::Tuple(_) => TypeClass::Tuple,
            Type::Struct(_) => TypeClass::Struct,
            Type::Enum(_) => TypeClass::Enum,
            Type::Function(_) => TypeClass::Function,
            Type::Label => TypeClass::Label,
            Type::Any => TypeClass::Any,
            Type::Exception(_) => TypeClass::Exception,
        }
    }

    pub fn integer_width(&self) -> Option<u8> {
        match self {
            Type::Integer(width) => Some(*width),
            _ => None,
        }
    }

    /// True for an integer whose width is still pending unification
    pub fn is_unresolved_integer(&self) -> bool {
        matches!(self, Type::Integer(0))
    }

    /// Structural equality, except that an unresolved integer is compatible
    /// with any integer width. Width disagreements are reported by the
    /// dedicated width rule instead.
    pub fn compatible_with(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Integer(0), Type::Integer(_)) | (Type::Integer(_), Type::Integer(0)) => true,
            (Type::Any, _) | (_, Type::Any) => true,
            (Type::Tuple(a), Type::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a.compatible_with(b))
            }
            (Type::Reference(a), Type::Reference(b)) | (Type::Iterator(a), Type::Iterator(b)) => {
                a.compatible_with(b)
            }
            (a, b) => a == b,
        }
    }

    /// Looks through a reference to reach the referenced struct, if any
    pub fn as_struct(&self) -> Option<&StructType> {
        match self {
            Type::Struct(s) => Some(s),
            Type::Reference(inner) => match &**inner {
                Type::Struct(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            Type::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn colored(&self) -> colored::ColoredString {
        self.to_string().yellow()
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Integer(0) => write!(f, "int<*>"),
            Type::Integer(width) => write!(f, "int<{width}>"),
            Type::Double => write!(f, "double"),
            Type::String => write!(f, "string"),
            Type::Bytes => write!(f, "bytes"),
            Type::Reference(inner) => write!(f, "ref<{inner}>"),
            Type::Iterator(inner) => write!(f, "iterator<{inner}>"),
            Type::Tuple(elements) => write!(f, "tuple<{}>", elements.iter().join(", ")),
            Type::Struct(s) => write!(f, "struct {}", s.name),
            Type::Enum(e) => write!(f, "enum {}", e.name),
            Type::Function(func) => {
                if func.calling_convention == CallingConvention::C {
                    write!(f, "\"C\" ")?;
                }

                write!(
                    f,
                    "function({}) -> {}",
                    func.parameters
                        .iter()
                        .map(|p| format!("{}: {}", p.name, p.ty))
                        .join(", "),
                    func.result
                )
            }
            Type::Label => write!(f, "label"),
            Type::Any => write!(f, "any"),
            Type::Exception(id) => write!(f, "exception#{id}"),
        }
    }
}

/// A constraint on a single type, used as the secondary constraint of a
/// dispatch handler and as an element of an operator pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypePattern {
    Any,
    Family(TypeFamily),
    Class(TypeClass),
    Exact(Type),
}

impl TypePattern {
    pub fn matches(&self, ty: &Type) -> bool {
        match self {
            TypePattern::Any => true,
            TypePattern::Family(family) => family.contains(ty.class()),
            TypePattern::Class(class) => ty.class() == *class,
            TypePattern::Exact(expected) => expected == ty,
        }
    }

    /// Partial specificity order. `Greater` means `self` is narrower. `None`
    /// means the two patterns are unrelated (e.g. two overlapping families
    /// where neither contains the other).
    pub fn compare_specificity(&self, other: &TypePattern) -> Option<Ordering> {
        use TypePattern::*;

        match (self, other) {
            (Exact(a), Exact(b)) => (a == b).then_some(Ordering::Equal),
            (Exact(_), _) => Some(Ordering::Greater),
            (_, Exact(_)) => Some(Ordering::Less),
            (Class(a), Class(b)) => (a == b).then_some(Ordering::Equal),
            (Class(_), _) => Some(Ordering::Greater),
            (_, Class(_)) => Some(Ordering::Less),
            (Family(a), Family(b)) => match (a.is_subset_of(*b), b.is_subset_of(*a)) {
                (true, true) => Some(Ordering::Equal),
                (true, false) => Some(Ordering::Greater),
                (false, true) => Some(Ordering::Less),
                (false, false) => None,
            },
            (Family(_), Any) => Some(Ordering::Greater),
            (Any, Family(_)) => Some(Ordering::Less),
            (Any, Any) => Some(Ordering::Equal),
        }
    }
}

impl core::fmt::Display for TypePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypePattern::Any => write!(f, "any"),
            TypePattern::Family(family) => write!(f, "<{family}>"),
            TypePattern::Class(class) => write!(f, "{class}<*>"),
            TypePattern::Exact(ty) => write!(f, "{ty}"),
        }
    }
}

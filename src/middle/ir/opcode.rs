//! The instruction set. Every opcode carries a static signature which fixes,
//! per slot, what kind of operand may appear there.

use strum::{Display, EnumIter, EnumString};

use crate::middle::ir::ty::{Type, TypeClass};

/// Names one of the four operand slots of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum SlotName {
    Target,
    Op1,
    Op2,
    Op3,
}

impl SlotName {
    /// Slots in the order the traversal visits them
    pub const VISIT_ORDER: [SlotName; 4] = [SlotName::Op1, SlotName::Op2, SlotName::Op3, SlotName::Target];
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotConstraint {
    /// The slot must be empty
    None,
    Any,
    Exact(Type),
    Class(TypeClass),
    /// Must have the same type as the operand in another slot
    SameAs(SlotName),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Slot {
    pub constraint: SlotConstraint,
    pub optional: bool,
}

impl Slot {
    pub const NONE: Slot = Slot {
        constraint: SlotConstraint::None,
        optional: true,
    };

    pub fn any() -> Self {
        Self::required(SlotConstraint::Any)
    }

    pub fn exact(ty: Type) -> Self {
        Self::required(SlotConstraint::Exact(ty))
    }

    pub fn class(class: TypeClass) -> Self {
        Self::required(SlotConstraint::Class(class))
    }

    pub fn same_as(slot: SlotName) -> Self {
        Self::required(SlotConstraint::SameAs(slot))
    }

    fn required(constraint: SlotConstraint) -> Self {
        Self {
            constraint,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn is_none(&self) -> bool {
        self.constraint == SlotConstraint::None
    }
}

impl core::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.constraint {
            SlotConstraint::None => write!(f, "-")?,
            SlotConstraint::Any => write!(f, "any")?,
            SlotConstraint::Exact(ty) => write!(f, "{ty}")?,
            SlotConstraint::Class(class) => write!(f, "{class}")?,
            SlotConstraint::SameAs(slot) => write!(f, "typeof({slot})")?,
        }

        if self.optional && !self.is_none() {
            write!(f, "?")?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub target: Slot,
    pub op1: Slot,
    pub op2: Slot,
    pub op3: Slot,
}

impl Signature {
    pub fn slot(&self, name: SlotName) -> &Slot {
        match name {
            SlotName::Target => &self.target,
            SlotName::Op1 => &self.op1,
            SlotName::Op2 => &self.op2,
            SlotName::Op3 => &self.op3,
        }
    }
}

/// How an opcode participates in control flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OpcodeKind {
    /// Ends a block in canonical form
    Terminator,
    /// A call which returns to the following instruction
    Call,
    /// A generic operator resolved through the operator registry
    Operator,
    Plain,
}

/// Generic operators whose implementation depends on the operand types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Operator {
    Plus,
    Minus,
    Multiply,
    Divide,
    Equal,
    Unequal,
    Less,
    Greater,
    Not,
    Negate,
    Size,
    Concat,
    Index,
}

impl Operator {
    pub fn is_unary(self) -> bool {
        matches!(self, Operator::Not | Operator::Negate | Operator::Size)
    }
}

macro_rules! opcodes {
    ($(
        $variant:ident = $mnemonic:literal, $kind:ident {
            target: $target:expr,
            op1: $op1:expr,
            op2: $op2:expr,
            op3: $op3:expr $(,)?
        }
    ),* $(,)?) => {
        paste::paste! {
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter)]
            pub enum Opcode {
                $($variant,)*
            }

            impl Opcode {
                pub fn mnemonic(self) -> &'static str {
                    match self {
                        $(Opcode::$variant => $mnemonic,)*
                    }
                }

                pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
                    match mnemonic {
                        $($mnemonic => Some(Opcode::$variant),)*
                        _ => None,
                    }
                }

                pub fn kind(self) -> OpcodeKind {
                    match self {
                        $(Opcode::$variant => OpcodeKind::$kind,)*
                    }
                }

                pub fn signature(self) -> Signature {
                    match self {
                        $(Opcode::$variant => Signature {
                            target: $target,
                            op1: $op1,
                            op2: $op2,
                            op3: $op3,
                        },)*
                    }
                }

                $(
                    #[inline]
                    pub fn [<is_ $variant:snake>](self) -> bool {
                        matches!(self, Opcode::$variant)
                    }
                )*
            }
        }
    };
}

use SlotName::*;
use TypeClass as C;

opcodes! {
    Jump = "jump", Terminator {
        target: Slot::NONE, op1: Slot::class(C::Label), op2: Slot::NONE, op3: Slot::NONE,
    },
    IfElse = "if.else", Terminator {
        target: Slot::NONE, op1: Slot::exact(Type::Bool), op2: Slot::class(C::Label), op3: Slot::class(C::Label),
    },
    ReturnVoid = "return.void", Terminator {
        target: Slot::NONE, op1: Slot::NONE, op2: Slot::NONE, op3: Slot::NONE,
    },
    ReturnResult = "return.result", Terminator {
        target: Slot::NONE, op1: Slot::any(), op2: Slot::NONE, op3: Slot::NONE,
    },
    Call = "call", Call {
        target: Slot::any().optional(), op1: Slot::class(C::Function), op2: Slot::class(C::Tuple), op3: Slot::NONE,
    },
    CallTailVoid = "call.tail.void", Terminator {
        target: Slot::NONE, op1: Slot::class(C::Function), op2: Slot::class(C::Tuple), op3: Slot::class(C::Label),
    },
    CallTailResult = "call.tail.result", Terminator {
        target: Slot::any(), op1: Slot::class(C::Function), op2: Slot::class(C::Tuple), op3: Slot::class(C::Label),
    },
    Assign = "assign", Plain {
        target: Slot::any(), op1: Slot::same_as(Target), op2: Slot::NONE, op3: Slot::NONE,
    },

    IntAdd = "int.add", Plain {
        target: Slot::class(C::Integer).optional(), op1: Slot::class(C::Integer), op2: Slot::class(C::Integer), op3: Slot::NONE,
    },
    IntSub = "int.sub", Plain {
        target: Slot::class(C::Integer).optional(), op1: Slot::class(C::Integer), op2: Slot::class(C::Integer), op3: Slot::NONE,
    },
    IntMul = "int.mul", Plain {
        target: Slot::class(C::Integer).optional(), op1: Slot::class(C::Integer), op2: Slot::class(C::Integer), op3: Slot::NONE,
    },
    IntDiv = "int.div", Plain {
        target: Slot::class(C::Integer).optional(), op1: Slot::class(C::Integer), op2: Slot::class(C::Integer), op3: Slot::NONE,
    },
    IntMod = "int.mod", Plain {
        target: Slot::class(C::Integer).optional(), op1: Slot::class(C::Integer), op2: Slot::class(C::Integer), op3: Slot::NONE,
    },
    IntEq = "int.eq", Plain {
        target: Slot::exact(Type::Bool), op1: Slot::class(C::Integer), op2: Slot::class(C::Integer), op3: Slot::NONE,
    },
    IntLt = "int.lt", Plain {
        target: Slot::exact(Type::Bool), op1: Slot::class(C::Integer), op2: Slot::class(C::Integer), op3: Slot::NONE,
    },
    IntGt = "int.gt", Plain {
        target: Slot::exact(Type::Bool), op1: Slot::class(C::Integer), op2: Slot::class(C::Integer), op3: Slot::NONE,
    },
    IntExt = "int.ext", Plain {
        target: Slot::class(C::Integer), op1: Slot::class(C::Integer), op2: Slot::NONE, op3: Slot::NONE,
    },
    IntTrunc = "int.trunc", Plain {
        target: Slot::class(C::Integer), op1: Slot::class(C::Integer), op2: Slot::NONE, op3: Slot::NONE,
    },

    DoubleAdd = "double.add", Plain {
        target: Slot::exact(Type::Double), op1: Slot::exact(Type::Double), op2: Slot::exact(Type::Double), op3: Slot::NONE,
    },
    DoubleSub = "double.sub", Plain {
        target: Slot::exact(Type::Double), op1: Slot::exact(Type::Double), op2: Slot::exact(Type::Double), op3: Slot::NONE,
    },
    DoubleMul = "double.mul", Plain {
        target: Slot::exact(Type::Double), op1: Slot::exact(Type::Double), op2: Slot::exact(Type::Double), op3: Slot::NONE,
    },
    DoubleDiv = "double.div", Plain {
        target: Slot::exact(Type::Double), op1: Slot::exact(Type::Double), op2: Slot::exact(Type::Double), op3: Slot::NONE,
    },
    DoubleEq = "double.eq", Plain {
        target: Slot::exact(Type::Bool), op1: Slot::exact(Type::Double), op2: Slot::exact(Type::Double), op3: Slot::NONE,
    },
    DoubleLt = "double.lt", Plain {
        target: Slot::exact(Type::Bool), op1: Slot::exact(Type::Double), op2: Slot::exact(Type::Double), op3: Slot::NONE,
    },

    BoolAnd = "bool.and", Plain {
        target: Slot::exact(Type::Bool), op1: Slot::exact(Type::Bool), op2: Slot::exact(Type::Bool), op3: Slot::NONE,
    },
    BoolOr = "bool.or", Plain {
        target: Slot::exact(Type::Bool), op1: Slot::exact(Type::Bool), op2: Slot::exact(Type::Bool), op3: Slot::NONE,
    },
    BoolNot = "bool.not", Plain {
        target: Slot::exact(Type::Bool), op1: Slot::exact(Type::Bool), op2: Slot::NONE, op3: Slot::NONE,
    },

    StringConcat = "string.concat", Plain {
        target: Slot::exact(Type::String), op1: Slot::exact(Type::String), op2: Slot::exact(Type::String), op3: Slot::NONE,
    },
    StringLength = "string.length", Plain {
        target: Slot::exact(Type::INT64), op1: Slot::exact(Type::String), op2: Slot::NONE, op3: Slot::NONE,
    },
    BytesLength = "bytes.length", Plain {
        target: Slot::exact(Type::INT64), op1: Slot::exact(Type::Bytes), op2: Slot::NONE, op3: Slot::NONE,
    },

    EnumEq = "enum.eq", Plain {
        target: Slot::exact(Type::Bool), op1: Slot::class(C::Enum), op2: Slot::same_as(Op1), op3: Slot::NONE,
    },
    StructGet = "struct.get", Plain {
        target: Slot::any(), op1: Slot::any(), op2: Slot::exact(Type::String), op3: Slot::NONE,
    },
    StructSet = "struct.set", Plain {
        target: Slot::NONE, op1: Slot::any(), op2: Slot::exact(Type::String), op3: Slot::any(),
    },
    TupleIndex = "tuple.index", Plain {
        target: Slot::any(), op1: Slot::class(C::Tuple), op2: Slot::class(C::Integer), op3: Slot::NONE,
    },

    OpPlus = "op.plus", Operator {
        target: Slot::any().optional(), op1: Slot::any(), op2: Slot::any(), op3: Slot::NONE,
    },
    OpMinus = "op.minus", Operator {
        target: Slot::any().optional(), op1: Slot::any(), op2: Slot::any(), op3: Slot::NONE,
    },
    OpMultiply = "op.multiply", Operator {
        target: Slot::any().optional(), op1: Slot::any(), op2: Slot::any(), op3: Slot::NONE,
    },
    OpDivide = "op.divide", Operator {
        target: Slot::any().optional(), op1: Slot::any(), op2: Slot::any(), op3: Slot::NONE,
    },
    OpEqual = "op.equal", Operator {
        target: Slot::any().optional(), op1: Slot::any(), op2: Slot::any(), op3: Slot::NONE,
    },
    OpUnequal = "op.unequal", Operator {
        target: Slot::any().optional(), op1: Slot::any(), op2: Slot::any(), op3: Slot::NONE,
    },
    OpLess = "op.less", Operator {
        target: Slot::any().optional(), op1: Slot::any(), op2: Slot::any(), op3: Slot::NONE,
    },
    OpGreater = "op.greater", Operator {
        target: Slot::any().optional(), op1: Slot::any(), op2: Slot::any(), op3: Slot::NONE,
    },
    OpNot = "op.not", Operator {
        target: Slot::any().optional(), op1: Slot::any(), op2: Slot::NONE, op3: Slot::NONE,
    },
    OpNegate = "op.negate", Operator {
        target: Slot::any().optional(), op1: Slot::any(), op2: Slot::NONE, op3: Slot::NONE,
    },
    OpSize = "op.size", Operator {
        target: Slot::any().optional(), op1: Slot::any(), op2: Slot::NONE, op3: Slot::NONE,
    },
    OpConcat = "op.concat", Operator {
        target: Slot::any().optional(), op1: Slot::any(), op2: Slot::any(), op3: Slot::NONE,
    },
    OpIndex = "op.index", Operator {
        target: Slot::any().optional(), op1: Slot::any(), op2: Slot::any(), op3: Slot::NONE,
    },
}

impl Opcode {
    pub fn is_terminator(self) -> bool {
        self.kind() == OpcodeKind::Terminator
    }

    pub fn is_return(self) -> bool {
        matches!(self, Opcode::ReturnVoid | Opcode::ReturnResult)
    }

    pub fn is_tail_call(self) -> bool {
        matches!(self, Opcode::CallTailVoid | Opcode::CallTailResult)
    }

    /// The generic operator implemented by an `op.*` opcode
    pub fn operator(self) -> Option<Operator> {
        Some(match self {
            Opcode::OpPlus => Operator::Plus,
            Opcode::OpMinus => Operator::Minus,
            Opcode::OpMultiply => Operator::Multiply,
            Opcode::OpDivide => Operator::Divide,
            Opcode::OpEqual => Operator::Equal,
            Opcode::OpUnequal => Operator::Unequal,
            Opcode::OpLess => Operator::Less,
            Opcode::OpGreater => Operator::Greater,
            Opcode::OpNot => Operator::Not,
            Opcode::OpNegate => Operator::Negate,
            Opcode::OpSize => Operator::Size,
            Opcode::OpConcat => Operator::Concat,
            Opcode::OpIndex => Operator::Index,
            _ => return None,
        })
    }

    /// Integer instructions whose operand and target widths must agree
    pub fn unifies_integer_widths(self) -> bool {
        matches!(
            self,
            Opcode::IntAdd
                | Opcode::IntSub
                | Opcode::IntMul
                | Opcode::IntDiv
                | Opcode::IntMod
                | Opcode::IntEq
                | Opcode::IntLt
                | Opcode::IntGt
        )
    }

    /// Whether the target's width takes part in width unification. Comparison
    /// targets are `bool` and never pin a width.
    pub fn target_pins_width(self) -> bool {
        matches!(
            self,
            Opcode::IntAdd | Opcode::IntSub | Opcode::IntMul | Opcode::IntDiv | Opcode::IntMod
        )
    }

    pub fn is_division(self) -> bool {
        matches!(
            self,
            Opcode::IntDiv | Opcode::IntMod | Opcode::DoubleDiv | Opcode::OpDivide
        )
    }
}

impl core::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn mnemonics_round_trip() {
        for opcode in Opcode::iter() {
            assert_eq!(Opcode::from_mnemonic(opcode.mnemonic()), Some(opcode));
        }
    }

    #[test]
    fn every_operator_has_an_opcode() {
        let covered = Opcode::iter().filter_map(Opcode::operator).collect::<Vec<_>>();
        assert_eq!(covered, Operator::iter().collect::<Vec<_>>());
    }

    #[test]
    fn operator_opcodes_match_operator_arity() {
        for opcode in Opcode::iter() {
            if let Some(operator) = opcode.operator() {
                assert_eq!(opcode.signature().op2.is_none(), operator.is_unary(), "{opcode}");
            }
        }
    }

    #[test]
    fn terminators() {
        assert!(Opcode::Jump.is_terminator());
        assert!(Opcode::CallTailResult.is_terminator());
        assert!(!Opcode::Call.is_terminator());
        assert!(Opcode::Call.is_call());
        assert!(Opcode::IfElse.is_if_else());
    }
}

//! Binds generic operators to type-specific implementations.
//!
//! Bindings are registered once through a [`RegistryBuilder`] and looked up
//! by operator and concrete operand types. When several patterns match, the
//! unique most specific one wins; otherwise resolution is ambiguous.

use std::{cmp::Ordering, fmt};

use hashbrown::HashMap;
use itertools::Itertools;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::{
    backend::{Emitter, TargetType, TargetValue},
    diagnostics::{internal_error, Component},
    middle::ir::{
        opcode::Operator,
        ty::{Type, TypeClass, TypeFamily, TypePattern},
    },
};

pub mod builtins;

#[cfg(test)]
mod tests;

/// One position of an operator pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternElement {
    Type(TypePattern),
    /// Same type as the operand at an earlier position
    SameAs(usize),
}

impl PatternElement {
    pub fn exact(ty: Type) -> Self {
        PatternElement::Type(TypePattern::Exact(ty))
    }

    pub fn class(class: TypeClass) -> Self {
        PatternElement::Type(TypePattern::Class(class))
    }

    pub fn family(family: TypeFamily) -> Self {
        PatternElement::Type(TypePattern::Family(family))
    }

    pub fn any() -> Self {
        PatternElement::Type(TypePattern::Any)
    }

    fn matches(&self, ty: &Type, operands: &[Type]) -> bool {
        match self {
            PatternElement::Type(pattern) => pattern.matches(ty),
            PatternElement::SameAs(index) => operands.get(*index).is_some_and(|t| t.compatible_with(ty)),
        }
    }

    /// exact > same-as > class > family > any
    fn compare_specificity(&self, other: &PatternElement) -> Option<Ordering> {
        use PatternElement::*;

        match (self, other) {
            (SameAs(_), SameAs(_)) => Some(Ordering::Equal),
            (SameAs(_), Type(TypePattern::Exact(_))) => Some(Ordering::Less),
            (SameAs(_), Type(_)) => Some(Ordering::Greater),
            (Type(_), SameAs(_)) => other.compare_specificity(self).map(Ordering::reverse),
            (Type(a), Type(b)) => a.compare_specificity(b),
        }
    }
}

impl fmt::Display for PatternElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternElement::Type(pattern) => write!(f, "{pattern}"),
            PatternElement::SameAs(index) => write!(f, "typeof(${index})"),
        }
    }
}

/// Pointwise dominance. `None` when the patterns disagree in direction or
/// some position is incomparable.
fn compare_patterns(a: &[PatternElement], b: &[PatternElement]) -> Option<Ordering> {
    let mut result = Ordering::Equal;

    for (a, b) in a.iter().zip(b) {
        match (result, a.compare_specificity(b)?) {
            (_, Ordering::Equal) => {}
            (Ordering::Equal, ordering) => result = ordering,
            (current, ordering) if current == ordering => {}
            _ => return None,
        }
    }

    Some(result)
}

/// Type inference and code generation for one operator binding
pub trait OperatorHandler: Send + Sync {
    fn result_type(&self, operands: &[Type]) -> Type;

    /// Emits the operation. `result` is the target type of the result when
    /// the operator produces one.
    fn codegen(
        &self,
        emitter: &mut dyn Emitter,
        operands: &[TargetValue],
        types: &[Type],
        result: Option<TargetType>,
    ) -> Option<TargetValue>;
}

pub struct Binding {
    pub name: &'static str,
    pub operator: Operator,
    pub pattern: Vec<PatternElement>,
    pub handler: Box<dyn OperatorHandler>,
}

impl Binding {
    fn matches(&self, operands: &[Type]) -> bool {
        self.pattern.len() == operands.len()
            && self
                .pattern
                .iter()
                .zip(operands)
                .all(|(element, ty)| element.matches(ty, operands))
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("operator", &self.operator)
            .field("pattern", &self.pattern)
            .finish()
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) => {}",
            self.operator,
            self.pattern.iter().join(", "),
            self.name
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unresolved operator {operator} for ({operands})")]
    NotFound { operator: Operator, operands: String },
    #[error("ambiguous operator {operator} for ({operands}), candidates: {}", .candidates.join(", "))]
    Ambiguous {
        operator: Operator,
        operands: String,
        candidates: Vec<&'static str>,
    },
}

#[derive(Default)]
pub struct RegistryBuilder {
    bindings: HashMap<Operator, Vec<Binding>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        operator: Operator,
        pattern: impl IntoIterator<Item = PatternElement>,
        name: &'static str,
        handler: impl OperatorHandler + 'static,
    ) -> &mut Self {
        let pattern = pattern.into_iter().collect::<Vec<_>>();

        for (position, element) in pattern.iter().enumerate() {
            if let PatternElement::SameAs(index) = element {
                if *index >= position {
                    internal_error!(
                        Component::Registry,
                        None,
                        "binding {name} refers to operand {index} from position {position}"
                    );
                }
            }
        }

        let bindings = self.bindings.entry(operator).or_default();

        if let Some(existing) = bindings.iter().find(|b| b.pattern == pattern) {
            internal_error!(
                Component::Registry,
                None,
                "binding {name} duplicates the pattern of {}",
                existing.name
            );
        }

        bindings.push(Binding {
            name,
            operator,
            pattern,
            handler: Box::new(handler),
        });

        self
    }

    pub fn build(self) -> OperatorRegistry {
        OperatorRegistry {
            bindings: self.bindings,
        }
    }
}

/// Immutable after construction
pub struct OperatorRegistry {
    bindings: HashMap<Operator, Vec<Binding>>,
}

impl OperatorRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// The registry with every built-in type module registered
    pub fn with_builtins() -> Self {
        let mut builder = RegistryBuilder::new();
        builtins::register_all(&mut builder);
        let registry = builder.build();

        log::debug!("operator registry initialized with {} bindings", registry.len());
        registry
    }

    pub fn len(&self) -> usize {
        self.bindings.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every binding, grouped by operator in declaration order of
    /// [`Operator`]
    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings
            .iter()
            .sorted_by_key(|(operator, _)| **operator)
            .flat_map(|(_, bindings)| bindings)
    }

    pub fn resolve(&self, operator: Operator, operands: &[Type]) -> Result<&Binding, ResolveError> {
        let candidates = self
            .bindings
            .get(&operator)
            .into_iter()
            .flatten()
            .filter(|b| b.matches(operands))
            .collect::<Vec<_>>();

        let winner = candidates.iter().find(|candidate| {
            candidates.iter().all(|other| {
                std::ptr::eq(**candidate, *other)
                    || compare_patterns(&candidate.pattern, &other.pattern) == Some(Ordering::Greater)
            })
        });

        match (winner, candidates.is_empty()) {
            (Some(binding), _) => Ok(*binding),
            (None, true) => Err(ResolveError::NotFound {
                operator,
                operands: operands.iter().join(", "),
            }),
            (None, false) => Err(ResolveError::Ambiguous {
                operator,
                operands: operands.iter().join(", "),
                candidates: candidates.iter().map(|b| b.name).collect(),
            }),
        }
    }
}

static BUILTINS: Lazy<OperatorRegistry> = Lazy::new(OperatorRegistry::with_builtins);

/// Process-wide registry of the built-in type modules
pub fn builtins() -> &'static OperatorRegistry {
    &BUILTINS
}

use super::*;
use crate::{
    backend::{Backend, TextBackend},
    diagnostics::Location,
    middle::ir::Constant,
};

/// Handler whose result type is fixed
struct Fixed(Type);

impl OperatorHandler for Fixed {
    fn result_type(&self, _: &[Type]) -> Type {
        self.0.clone()
    }

    fn codegen(
        &self,
        _: &mut dyn Emitter,
        _: &[TargetValue],
        _: &[Type],
        _: Option<TargetType>,
    ) -> Option<TargetValue> {
        None
    }
}

fn resolved_name(registry: &OperatorRegistry, operator: Operator, operands: &[Type]) -> &'static str {
    registry.resolve(operator, operands).unwrap().name
}

#[test]
fn resolution_is_deterministic_and_reports_unresolved_operators() {
    let mut builder = OperatorRegistry::builder();
    builder
        .register(
            Operator::Plus,
            [PatternElement::class(TypeClass::Integer), PatternElement::class(TypeClass::Integer)],
            "integer",
            Fixed(Type::INT32),
        )
        .register(
            Operator::Plus,
            [PatternElement::class(TypeClass::Double), PatternElement::class(TypeClass::Double)],
            "double",
            Fixed(Type::Double),
        );
    let registry = builder.build();

    for _ in 0..8 {
        assert_eq!(resolved_name(&registry, Operator::Plus, &[Type::INT32, Type::INT32]), "integer");
    }

    let error = registry
        .resolve(Operator::Plus, &[Type::INT32, Type::Double])
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        "unresolved operator plus for (int<32>, double)"
    );
}

#[test]
fn most_specific_pattern_wins() {
    let mut builder = OperatorRegistry::builder();
    builder
        .register(
            Operator::Plus,
            [PatternElement::class(TypeClass::Integer), PatternElement::class(TypeClass::Integer)],
            "classes",
            Fixed(Type::INT64),
        )
        .register(
            Operator::Plus,
            [PatternElement::class(TypeClass::Integer), PatternElement::SameAs(0)],
            "same",
            Fixed(Type::INT64),
        )
        .register(
            Operator::Plus,
            [PatternElement::exact(Type::INT32), PatternElement::exact(Type::INT32)],
            "exact",
            Fixed(Type::INT32),
        )
        .register(
            Operator::Plus,
            [PatternElement::family(TypeFamily::Numeric), PatternElement::any()],
            "numeric",
            Fixed(Type::Any),
        );
    let registry = builder.build();

    assert_eq!(resolved_name(&registry, Operator::Plus, &[Type::INT32, Type::INT32]), "exact");
    assert_eq!(resolved_name(&registry, Operator::Plus, &[Type::INT16, Type::INT16]), "same");
    assert_eq!(resolved_name(&registry, Operator::Plus, &[Type::INT16, Type::INT32]), "classes");
    assert_eq!(resolved_name(&registry, Operator::Plus, &[Type::Double, Type::Bool]), "numeric");
}

#[test]
fn crossed_patterns_are_ambiguous() {
    let mut builder = OperatorRegistry::builder();
    builder
        .register(
            Operator::Equal,
            [PatternElement::class(TypeClass::Integer), PatternElement::any()],
            "left",
            Fixed(Type::Bool),
        )
        .register(
            Operator::Equal,
            [PatternElement::any(), PatternElement::class(TypeClass::Integer)],
            "right",
            Fixed(Type::Bool),
        );
    let registry = builder.build();

    assert_eq!(
        registry.resolve(Operator::Equal, &[Type::INT8, Type::INT8]).unwrap_err(),
        ResolveError::Ambiguous {
            operator: Operator::Equal,
            operands: "int<8>, int<8>".into(),
            candidates: vec!["left", "right"],
        }
    );
    assert_eq!(resolved_name(&registry, Operator::Equal, &[Type::INT8, Type::Bool]), "left");
}

#[test]
fn arity_must_agree() {
    let registry = OperatorRegistry::with_builtins();
    assert!(matches!(
        registry.resolve(Operator::Plus, &[Type::INT32]),
        Err(ResolveError::NotFound { .. })
    ));
}

#[test]
#[should_panic(expected = "duplicates the pattern of first")]
fn duplicate_patterns_are_rejected() {
    let mut builder = OperatorRegistry::builder();
    builder
        .register(Operator::Not, [PatternElement::exact(Type::Bool)], "first", Fixed(Type::Bool))
        .register(Operator::Not, [PatternElement::exact(Type::Bool)], "second", Fixed(Type::Bool));
}

#[test]
fn builtin_modules() {
    let registry = builtins();

    assert_eq!(resolved_name(registry, Operator::Plus, &[Type::INT32, Type::INT32]), "integer.plus");
    assert_eq!(resolved_name(registry, Operator::Greater, &[Type::INT8, Type::INT8]), "integer.greater");
    assert_eq!(resolved_name(registry, Operator::Greater, &[Type::String, Type::String]), "ordered.greater");
    assert_eq!(resolved_name(registry, Operator::Size, &[Type::String]), "string.size");
    assert_eq!(
        resolved_name(registry, Operator::Size, &[Type::tuple([Type::Bool])]),
        "sized.size"
    );

    let plus = registry
        .resolve(Operator::Plus, &[Type::Integer(0), Type::INT16])
        .unwrap();
    assert_eq!(plus.handler.result_type(&[Type::Integer(0), Type::INT16]), Type::INT16);

    let index = registry
        .resolve(Operator::Index, &[Type::tuple([Type::Bool, Type::Bool]), Type::INT64])
        .unwrap();
    assert_eq!(
        index.handler.result_type(&[Type::tuple([Type::Bool, Type::Bool]), Type::INT64]),
        Type::Bool
    );
}

#[test]
fn unequal_lowers_to_compare_and_negate() {
    let binding = builtins()
        .resolve(Operator::Unequal, &[Type::INT32, Type::INT32])
        .unwrap();

    let mut backend = TextBackend::new();
    let boolean = backend.target_type(&Type::Bool);
    let a = backend.constant_expr(&Constant::int(1, 32, Location::internal()));
    let b = backend.constant_expr(&Constant::int(2, 32, Location::internal()));

    binding
        .handler
        .codegen(&mut backend, &[a, b], &[Type::INT32, Type::INT32], Some(boolean));

    assert_eq!(
        backend.output(),
        "    %0 = int.eq 1, 2 : i1\n    %1 = bool.not %0 : i1\n"
    );
}

#[test]
fn listing_is_grouped_by_operator() {
    let operators = builtins()
        .bindings()
        .map(|b| b.operator)
        .collect::<Vec<_>>();

    assert!(operators.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(operators.len(), builtins().len());
}

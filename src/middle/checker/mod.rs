//! Semantic checker
//!
//! The checker is a run-all pass: every rule is a handler registered against
//! the node class it inspects, and every matching rule runs on every node.
//! Rules are independent of each other and only ever report; the walk never
//! stops on an error so a single run reports as much as it can.
//!
//! The checker runs twice. Before canonicalization it validates the input
//! and unifies the widths of integer constants with their context. The only
//! mutation it performs is writing those widths back once the walk is done.
//! After canonicalization it additionally checks the terminator-normal form.

use strum::Display;

use crate::{
    diagnostics::{Component, DiagnosticSink, Location},
    middle::{
        dispatch::Dispatcher,
        ir::{opcode::SlotName, ty::Type, Constant, ConstantValue, FunctionId, IdRef, Module, Operand},
        registry::OperatorRegistry,
    },
};

mod rules;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Phase {
    PreCanonical,
    PostCanonical,
}

/// Name of the enclosing function, for backtraces
macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .unwrap_or("?")
    }};
}

macro_rules! report_error {
    ($checker:expr, $location:expr, $($arg:tt)+) => {{
        #[cfg(feature = "error-backtrace")]
        log::debug!(
            "backtrace: {}::{} (at {}:{})",
            module_path!(),
            $crate::middle::checker::function!(),
            file!(),
            line!()
        );

        $checker.report(format!($($arg)+), $location)
    }};
}

pub(crate) use {function, report_error};

/// Where a constant whose width has been unified lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Site {
    /// The initial value of a global or constant ID
    Global(IdRef),
    Operand {
        function: FunctionId,
        block: usize,
        instruction: usize,
        slot: SlotName,
        /// Position inside a tuple operand
        element: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy)]
struct Pin {
    site: Site,
    width: u8,
}

pub(crate) struct Checker<'a> {
    registry: &'a OperatorRegistry,
    phase: Phase,
    sink: &'a mut DiagnosticSink,
    errors: usize,
    pins: Vec<Pin>,
}

impl<'a> Checker<'a> {
    fn report(&mut self, message: String, location: Option<&Location>) {
        self.errors += 1;
        self.sink.report(Component::Checker, message, location);
    }

    fn pin(&mut self, site: Site, width: u8) {
        self.pins.push(Pin { site, width });
    }
}

fn dispatcher<'a>() -> Dispatcher<Checker<'a>> {
    let mut dispatcher = Dispatcher::run_all();
    rules::register(&mut dispatcher);
    dispatcher
}

/// Checks `module` and returns the number of errors this run reported
pub fn check(
    module: &mut Module,
    registry: &OperatorRegistry,
    sink: &mut DiagnosticSink,
    phase: Phase,
) -> usize {
    let mut checker = Checker {
        registry,
        phase,
        sink,
        errors: 0,
        pins: Vec::new(),
    };

    dispatcher().walk(&mut checker, module);

    let Checker { errors, pins, .. } = checker;
    let pinned = pins.len();
    for pin in pins {
        apply_pin(module, pin);
    }
    default_widths(module);
    module.checked = (errors == 0).then_some(phase);

    log::info!(
        "{phase} check of module '{}': {errors} error(s), {pinned} constant width(s) unified",
        module.name
    );
    errors
}

fn constant_at(module: &mut Module, site: Site) -> Option<&mut Constant> {
    match site {
        Site::Global(id) => module.ids[id].value.as_mut(),
        Site::Operand {
            function,
            block,
            instruction,
            slot,
            element,
        } => {
            let operand = module.functions[function].blocks[block].instructions[instruction]
                .operand_mut(slot)?;

            let operand = match (element, operand) {
                (None, operand) => operand,
                (Some(index), Operand::Tuple(elements)) => elements.get_mut(index)?,
                (Some(_), _) => return None,
            };

            match operand {
                Operand::Const(constant) => Some(constant),
                _ => None,
            }
        }
    }
}

fn apply_pin(module: &mut Module, pin: Pin) {
    if let Some(constant) = constant_at(module, pin.site) {
        if let ConstantValue::Integer(_) = constant.value {
            constant.ty = Type::Integer(pin.width);
        }
    }
}

/// Integer constants nothing pinned become 64 bits wide
fn default_widths(module: &mut Module) {
    fn default_constant(value: &mut Constant) {
        if value.ty.is_unresolved_integer() {
            value.ty = Type::INT64;
        }

        if let ConstantValue::Tuple(elements) = &mut value.value {
            elements.iter_mut().for_each(default_constant);
        }
    }

    fn default_operand(op: &mut Operand) {
        match op {
            Operand::Const(value) => default_constant(value),
            Operand::Tuple(elements) => elements.iter_mut().for_each(default_operand),
            Operand::Id(_) => {}
        }
    }

    for id in module.ids.iter_mut() {
        if let Some(value) = &mut id.value {
            default_constant(value);

            // Constant IDs take their type from their value
            if id.ty.is_unresolved_integer() {
                id.ty = value.ty.clone();
            }
        }
    }

    for function in module.functions.iter_mut() {
        for instruction in function.blocks.iter_mut().flat_map(|b| &mut b.instructions) {
            for slot in SlotName::VISIT_ORDER {
                if let Some(op) = instruction.operand_mut(slot) {
                    default_operand(op);
                }
            }
        }
    }
}

//! Rewrites every function body into terminator-normal form: each block ends
//! in exactly one of `jump`, `if.else`, a tail call with a continuation label,
//! or a return.
//!
//! Calls to default-convention functions return through a continuation, so
//! a `call` in the middle of a block becomes a `call.tail.*` to a fresh block
//! holding the rest of the instructions. Blocks which run off their end get
//! an explicit jump to their successor: the block named by `next`, or else
//! the following block in the list.

use hashbrown::HashSet;

use crate::{
    diagnostics::{internal_error, Component, DiagnosticSink, Location},
    middle::{
        dispatch::{Dispatcher, Handler, Node, NodeClass, Visit},
        ensure_clean,
        ir::{
            opcode::Opcode,
            ty::CallingConvention,
            Block, Function, FunctionId, Instruction, Module, Operand,
        },
        Refused, Stage,
    },
};

#[cfg(test)]
mod prop_tests;
#[cfg(test)]
mod tests;

/// Hands out `__<function>_<n>` labels, skipping names already in use
struct LabelAllocator<'a> {
    function: &'a str,
    taken: HashSet<String>,
    counter: usize,
}

impl<'a> LabelAllocator<'a> {
    fn new(function: &'a Function) -> Self {
        let taken = function
            .blocks
            .iter()
            .filter_map(|b| b.name.clone())
            .chain(
                function
                    .blocks
                    .iter()
                    .flat_map(|b| &b.instructions)
                    .flat_map(|i| i.labels().map(str::to_owned)),
            )
            .collect();

        Self {
            function: &function.name,
            taken,
            counter: 0,
        }
    }

    fn fresh(&mut self) -> String {
        loop {
            self.counter += 1;
            let label = format!("__{}_{}", self.function, self.counter);

            if self.taken.insert(label.clone()) {
                return label;
            }
        }
    }
}

/// An output block under construction
struct Pending {
    block: Block,
    /// Opened after a terminator rather than by the input or a call
    after_terminator: bool,
}

impl Pending {
    fn new(name: Option<String>, location: Location, after_terminator: bool) -> Self {
        Self {
            block: Block::new(name, location),
            after_terminator,
        }
    }
}

/// True for calls which must be split into a tail call and a continuation
pub(crate) fn needs_continuation(module: &Module, instruction: &Instruction) -> bool {
    if instruction.opcode != Opcode::Call {
        return false;
    }

    instruction
        .op1
        .as_ref()
        .map(|callee| module.operand_type(callee))
        .and_then(|ty| ty.as_function().map(|f| f.calling_convention))
        .is_none_or(|convention| convention == CallingConvention::Default)
}

/// The canonical block list of `function`. The input is not modified;
/// already-canonical input comes back unchanged.
pub fn canonicalize_function(module: &Module, function: &Function) -> Vec<Block> {
    let mut labels = LabelAllocator::new(function);
    let mut names = function.blocks.iter().map(|b| b.name.clone()).collect::<Vec<_>>();
    let mut output = Vec::with_capacity(function.blocks.len());

    for (index, input) in function.blocks.iter().enumerate() {
        let mut current = Pending::new(names[index].clone(), input.location.clone(), false);

        for instruction in &input.instructions {
            if current.after_terminator && current.block.name.is_none() {
                current.block.name = Some(labels.fresh());
            }

            if needs_continuation(module, instruction) {
                let continuation = labels.fresh();
                let opcode = if instruction.target.is_some() {
                    Opcode::CallTailResult
                } else {
                    Opcode::CallTailVoid
                };

                let mut tail = instruction.clone();
                tail.opcode = opcode;
                tail.op3 = Some(Operand::label(&continuation, instruction.location.clone()));

                log::trace!(
                    "{}: split call at {} into continuation {continuation}",
                    function.name,
                    instruction.location
                );

                current.block.instructions.push(tail);
                output.push(current.block);
                current = Pending::new(Some(continuation), instruction.location.clone(), false);
            } else if instruction.is_terminator() {
                current.block.instructions.push(instruction.clone());
                output.push(current.block);
                current = Pending::new(None, instruction.location.clone(), true);
            } else {
                current.block.instructions.push(instruction.clone());
            }
        }

        // Nothing followed the last terminator
        if current.after_terminator && current.block.instructions.is_empty() {
            if let Some(last) = output.last_mut() {
                last.next = input.next.clone();
            }
            continue;
        }

        let location = current
            .block
            .instructions
            .last()
            .map_or_else(|| input.location.clone(), |i| i.location.clone());

        let successor = input.next.clone().or_else(|| {
            let following = names.get_mut(index + 1)?;
            Some(following.get_or_insert_with(|| labels.fresh()).clone())
        });

        let terminator = match successor {
            Some(label) => Instruction::jump(&label, location),
            None if function.signature.returns_void() => Instruction::return_void(location),
            None => internal_error!(
                Component::Canonicalizer,
                Some(&location),
                "non-void function '{}' falls off its last block",
                function.name
            ),
        };

        current.block.instructions.push(terminator);
        current.block.next = input.next.clone();
        output.push(current.block);
    }

    output
}

#[derive(Default)]
struct Canonicalizer {
    rewrites: Vec<(FunctionId, Vec<Block>)>,
}

fn rewrite_function(pass: &mut Canonicalizer, visit: &Visit<'_>) {
    let Node::Function(id, function) = visit.node else {
        return;
    };

    if function.is_import() {
        return;
    }

    let blocks = canonicalize_function(visit.module, function);
    if blocks != function.blocks {
        pass.rewrites.push((id, blocks));
    }
}

/// Canonicalizes every function body in place. Returns the number of
/// functions whose block list changed.
pub fn canonicalize(module: &mut Module, sink: &DiagnosticSink) -> Result<usize, Refused> {
    ensure_clean(Stage::Canonicalize, sink)?;

    let mut dispatcher = Dispatcher::best_match();
    dispatcher.register(Handler::new("rewrite-function", NodeClass::Function, rewrite_function));

    let mut pass = Canonicalizer::default();
    dispatcher.walk(&mut pass, module);

    let rewritten = pass.rewrites.len();
    for (function, blocks) in pass.rewrites {
        module.functions[function].blocks = blocks;
    }
    if rewritten > 0 {
        module.checked = None;
    }

    log::info!("canonicalized module '{}': {rewritten} function(s) rewritten", module.name);
    Ok(rewritten)
}

//! Multi-dispatch traversal shared by every pass.
//!
//! A pass is a set of [`Handler`]s registered against a primary [`NodeClass`]
//! and an optional secondary [`TypePattern`] read from the node. The
//! [`Dispatcher`] walks a module in a fixed order and, for every node and
//! hook, runs either the single most specific matching handler
//! ([`Mode::BestMatch`]) or every matching handler in registration order
//! ([`Mode::RunAll`]).
//!
//! Handlers are plain functions over the pass state, so a pass keeps its
//! results in `P` and applies any rewrites after the walk.

use std::cmp::Ordering;

use strum::{Display, EnumIter};
use thiserror::Error;

use crate::{
    diagnostics::{internal_error, Component},
    middle::ir::{
        opcode::{OpcodeKind, SlotName},
        ty::{Type, TypePattern},
        Block, Constant, ConstantValue, Function, FunctionId, Id, IdRef, Instruction, Module, Operand,
    },
};

#[cfg(test)]
mod tests;

/// Node classes form an is-a hierarchy rooted at [`NodeClass::Node`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum NodeClass {
    Node,
    Module,
    Id,
    Function,
    Block,
    Instruction,
    Terminator,
    Call,
    OperatorCall,
    Operand,
    Constant,
}

impl NodeClass {
    pub fn parent(self) -> Option<NodeClass> {
        match self {
            NodeClass::Node => None,
            NodeClass::Terminator | NodeClass::Call | NodeClass::OperatorCall => {
                Some(NodeClass::Instruction)
            }
            _ => Some(NodeClass::Node),
        }
    }

    /// Distance from the root of the hierarchy
    pub fn depth(self) -> usize {
        std::iter::successors(self.parent(), |c| c.parent()).count()
    }

    pub fn is_a(self, other: NodeClass) -> bool {
        std::iter::successors(Some(self), |c| c.parent()).any(|c| c == other)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Module(&'a Module),
    Id(IdRef, &'a Id),
    Function(FunctionId, &'a Function),
    Block(usize, &'a Block),
    Instruction(usize, &'a Instruction),
    Operand(&'a Operand),
    Constant(&'a Constant),
}

impl<'a> Node<'a> {
    pub fn class(&self) -> NodeClass {
        match self {
            Node::Module(_) => NodeClass::Module,
            Node::Id(..) => NodeClass::Id,
            Node::Function(..) => NodeClass::Function,
            Node::Block(..) => NodeClass::Block,
            Node::Instruction(_, instruction) => match instruction.opcode.kind() {
                OpcodeKind::Terminator => NodeClass::Terminator,
                OpcodeKind::Call => NodeClass::Call,
                OpcodeKind::Operator => NodeClass::OperatorCall,
                OpcodeKind::Plain => NodeClass::Instruction,
            },
            Node::Operand(_) => NodeClass::Operand,
            Node::Constant(_) => NodeClass::Constant,
        }
    }

    /// The type secondary constraints are matched against
    pub fn secondary_type(&self, module: &Module) -> Option<Type> {
        match self {
            Node::Module(_) | Node::Block(..) => None,
            Node::Id(_, id) => Some(id.ty.clone()),
            Node::Function(_, function) => Some(function.ty()),
            Node::Instruction(_, instruction) => instruction
                .target
                .as_ref()
                .or(instruction.op1.as_ref())
                .map(|op| module.operand_type(op)),
            Node::Operand(operand) => Some(module.operand_type(operand)),
            Node::Constant(constant) => Some(constant.ty.clone()),
        }
    }
}

/// A node together with where it sits in the module
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    pub module: &'a Module,
    pub node: Node<'a>,
    pub function: Option<FunctionId>,
    pub block: Option<usize>,
    pub instruction: Option<usize>,
    pub slot: Option<SlotName>,
}

impl<'a> Visit<'a> {
    pub fn module(module: &'a Module) -> Self {
        Self {
            module,
            node: Node::Module(module),
            function: None,
            block: None,
            instruction: None,
            slot: None,
        }
    }

    fn child(&self, node: Node<'a>) -> Self {
        let mut child = Self { node, ..*self };

        match node {
            Node::Function(id, _) => child.function = Some(id),
            Node::Block(index, _) => child.block = Some(index),
            Node::Instruction(index, _) => child.instruction = Some(index),
            _ => {}
        }

        child
    }

    fn in_slot(mut self, slot: SlotName) -> Self {
        self.slot = Some(slot);
        self
    }

    /// The enclosing function, if the node is inside one
    pub fn function(&self) -> Option<&'a Function> {
        self.function.map(|f| self.module.function(f))
    }

    pub fn block(&self) -> Option<&'a Block> {
        Some(&self.function()?.blocks[self.block?])
    }

    pub fn instruction(&self) -> Option<&'a Instruction> {
        Some(&self.block()?.instructions[self.instruction?])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Hook {
    /// Before the node's own handler and its children
    Pre,
    Visit,
    /// After the node's children
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Mode {
    BestMatch,
    RunAll,
}

pub type HandlerFn<P> = fn(&mut P, &Visit<'_>);

pub struct Handler<P> {
    pub name: &'static str,
    pub class: NodeClass,
    pub ty: Option<TypePattern>,
    pub hook: Hook,
    func: HandlerFn<P>,
}

impl<P> Handler<P> {
    pub fn new(name: &'static str, class: NodeClass, func: HandlerFn<P>) -> Self {
        Self {
            name,
            class,
            ty: None,
            hook: Hook::Visit,
            func,
        }
    }

    /// Adds a secondary type constraint
    pub fn typed(mut self, pattern: TypePattern) -> Self {
        self.ty = Some(pattern);
        self
    }

    pub fn pre(mut self) -> Self {
        self.hook = Hook::Pre;
        self
    }

    pub fn post(mut self) -> Self {
        self.hook = Hook::Post;
        self
    }

    fn matches(&self, hook: Hook, class: NodeClass, ty: Option<&Type>) -> bool {
        self.hook == hook
            && class.is_a(self.class)
            && match (&self.ty, ty) {
                (None, _) => true,
                (Some(pattern), Some(ty)) => pattern.matches(ty),
                (Some(_), None) => false,
            }
    }

    /// `Greater` means `self` is the more specific handler
    fn compare_specificity(&self, other: &Handler<P>) -> Option<Ordering> {
        match self.class.depth().cmp(&other.class.depth()) {
            Ordering::Equal => {}
            unequal => return Some(unequal),
        }

        match (&self.ty, &other.ty) {
            (None, None) => Some(Ordering::Equal),
            (Some(_), None) => Some(Ordering::Greater),
            (None, Some(_)) => Some(Ordering::Less),
            (Some(a), Some(b)) => a.compare_specificity(b),
        }
    }
}

impl<P> core::fmt::Debug for Handler<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("ty", &self.ty)
            .field("hook", &self.hook)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("ambiguous {hook} handlers for {class}: {}", .candidates.join(", "))]
    Ambiguous {
        class: NodeClass,
        hook: Hook,
        candidates: Vec<&'static str>,
    },
}

pub struct Dispatcher<P> {
    mode: Mode,
    handlers: Vec<Handler<P>>,
}

impl<P> Dispatcher<P> {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            handlers: Vec::new(),
        }
    }

    pub fn best_match() -> Self {
        Self::new(Mode::BestMatch)
    }

    pub fn run_all() -> Self {
        Self::new(Mode::RunAll)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn register(&mut self, handler: Handler<P>) -> &mut Self {
        self.handlers.push(handler);
        self
    }

    pub fn handlers(&self) -> &[Handler<P>] {
        &self.handlers
    }

    /// Handlers that run for a node of `class` with secondary type `ty`
    pub fn select(
        &self,
        hook: Hook,
        class: NodeClass,
        ty: Option<&Type>,
    ) -> Result<Vec<&Handler<P>>, DispatchError> {
        let candidates = self
            .handlers
            .iter()
            .filter(|h| h.matches(hook, class, ty))
            .collect::<Vec<_>>();

        if self.mode == Mode::RunAll || candidates.len() <= 1 {
            return Ok(candidates);
        }

        // The winner must be strictly more specific than every other candidate
        let winner = candidates.iter().position(|candidate| {
            candidates.iter().all(|other| {
                std::ptr::eq(*candidate, *other)
                    || candidate.compare_specificity(other) == Some(Ordering::Greater)
            })
        });

        match winner {
            Some(index) => Ok(vec![candidates[index]]),
            None => Err(DispatchError::Ambiguous {
                class,
                hook,
                candidates: candidates.iter().map(|h| h.name).collect(),
            }),
        }
    }

    /// Runs the selected handlers for one node. Ambiguity aborts since it
    /// means the pass itself is misconfigured.
    pub fn dispatch(&self, pass: &mut P, visit: &Visit<'_>, hook: Hook) {
        let class = visit.node.class();
        let ty = visit.node.secondary_type(visit.module);

        let handlers = match self.select(hook, class, ty.as_ref()) {
            Ok(handlers) => handlers,
            Err(error) => internal_error!(Component::Dispatch, None, "{error}"),
        };

        for handler in handlers {
            log::trace!("{hook} {class} -> {}", handler.name);
            (handler.func)(pass, visit);
        }
    }

    fn enter(&self, pass: &mut P, visit: &Visit<'_>) {
        self.dispatch(pass, visit, Hook::Pre);
        self.dispatch(pass, visit, Hook::Visit);
    }

    /// Walks the whole module: global IDs in insertion order, then every
    /// function
    pub fn walk(&self, pass: &mut P, module: &Module) {
        let visit = Visit::module(module);
        self.enter(pass, &visit);

        for (id, declaration) in module.globals() {
            self.walk_id(pass, &visit.child(Node::Id(id, declaration)));
        }

        for (function, _) in module.functions.enumerate() {
            self.walk_function(pass, module, function);
        }

        self.dispatch(pass, &visit, Hook::Post);
    }

    /// Walks a single function: its scope's IDs, then its blocks in order
    pub fn walk_function(&self, pass: &mut P, module: &Module, function: FunctionId) {
        let body = module.function(function);
        let visit = Visit::module(module).child(Node::Function(function, body));
        self.enter(pass, &visit);

        for id in body.scope.iter() {
            self.walk_id(pass, &visit.child(Node::Id(id, module.id(id))));
        }

        for (index, block) in body.blocks.iter().enumerate() {
            self.walk_block(pass, &visit.child(Node::Block(index, block)), block);
        }

        self.dispatch(pass, &visit, Hook::Post);
    }

    fn walk_id(&self, pass: &mut P, visit: &Visit<'_>) {
        self.enter(pass, visit);

        if let Node::Id(_, Id {
            value: Some(value), ..
        }) = visit.node
        {
            self.walk_constant(pass, &visit.child(Node::Constant(value)));
        }

        self.dispatch(pass, visit, Hook::Post);
    }

    fn walk_block(&self, pass: &mut P, visit: &Visit<'_>, block: &Block) {
        self.enter(pass, visit);

        for (index, instruction) in block.instructions.iter().enumerate() {
            self.walk_instruction(
                pass,
                &visit.child(Node::Instruction(index, instruction)),
                instruction,
            );
        }

        self.dispatch(pass, visit, Hook::Post);
    }

    fn walk_instruction(&self, pass: &mut P, visit: &Visit<'_>, instruction: &Instruction) {
        self.enter(pass, visit);

        for (slot, operand) in instruction.operands() {
            self.walk_operand(pass, &visit.child(Node::Operand(operand)).in_slot(slot), operand);
        }

        self.dispatch(pass, visit, Hook::Post);
    }

    fn walk_operand(&self, pass: &mut P, visit: &Visit<'_>, operand: &Operand) {
        self.enter(pass, visit);

        match operand {
            Operand::Const(constant) => {
                self.walk_constant(pass, &visit.child(Node::Constant(constant)))
            }
            Operand::Tuple(elements) => {
                for element in elements {
                    self.walk_operand(pass, &visit.child(Node::Operand(element)), element);
                }
            }
            Operand::Id(_) => {}
        }

        self.dispatch(pass, visit, Hook::Post);
    }

    fn walk_constant(&self, pass: &mut P, visit: &Visit<'_>) {
        self.enter(pass, visit);

        if let Node::Constant(Constant {
            value: ConstantValue::Tuple(elements),
            ..
        }) = visit.node
        {
            for element in elements {
                self.walk_constant(pass, &visit.child(Node::Constant(element)));
            }
        }

        self.dispatch(pass, visit, Hook::Post);
    }
}

//! Construction API for front ends. Structural problems (duplicate names,
//! unknown exception bases) are collected while building and handed to the
//! diagnostic sink by [`ModuleBuilder::finish`]; misuse of the API itself is
//! an internal error.

use std::sync::Arc;

use hashbrown::HashMap;

use crate::{
    diagnostics::{internal_error, Component, Diagnostic, DiagnosticSink, Location},
    middle::ir::{
        ty::{EnumType, Field, FunctionType, StructType, Type},
        Block, Constant, Declaration, DeclarationKind, ExceptionDecl, ExceptionId, Function,
        FunctionId, Id, IdRef, IdRole, Instruction, Module, Scope, ScopeError, TypeDeclaration,
    },
};

pub struct ModuleBuilder {
    module: Module,
    has_module: bool,
    current_function: Option<FunctionId>,
    exception_names: HashMap<String, ExceptionId>,
    type_names: HashMap<String, Location>,
    /// Exception bases are resolved by name once every exception is known
    pending_bases: Vec<(ExceptionId, String)>,
    errors: Vec<Diagnostic>,
}

impl Default for ModuleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self {
            module: Module::new("", Location::internal()),
            has_module: false,
            current_function: None,
            exception_names: HashMap::new(),
            type_names: HashMap::new(),
            pending_bases: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Starts a builder with its module declaration already made
    pub fn for_module(name: &str, location: Location) -> Self {
        let mut builder = Self::new();
        builder.module(name, location);
        builder
    }

    fn error(&mut self, message: String, location: &Location) {
        self.errors
            .push(Diagnostic::new(Component::Builder, message, Some(location.clone())));
    }

    fn log(&mut self, kind: DeclarationKind, name: &str, location: &Location) {
        let enclosing_function = self
            .current_function
            .map(|f| self.module.function(f).name.clone());

        self.module.declarations.push(Declaration {
            kind,
            name: name.to_owned(),
            location: location.clone(),
            enclosing_function,
        });
    }

    pub fn module(&mut self, name: &str, location: Location) -> &mut Self {
        if self.has_module {
            let message = format!(
                "duplicate module declaration '{name}' (module '{}' declared at {})",
                self.module.name, self.module.location
            );
            self.error(message, &location);
            return self;
        }

        self.log(DeclarationKind::Module, name, &location);
        self.has_module = true;
        self.module.name = name.to_owned();
        self.module.location = location;
        self
    }

    /// Pushes an ID into the arena and binds it in the current scope. On a
    /// duplicate name the ID still gets a handle but stays unbound.
    fn bind(&mut self, id: Id, function_scope: bool) -> IdRef {
        let name = id.name.clone();
        let location = id.location.clone();
        let handle = self.module.ids.push(id);

        let scope = match self.current_function {
            Some(f) if function_scope => &mut self.module.functions[f].scope,
            _ => &mut self.module.scope,
        };

        if let Err(ScopeError::Duplicate { name, previous }) = scope.insert(&name, handle) {
            let message = format!(
                "identifier '{name}' is already defined (previous definition at {})",
                self.module.ids[previous].location
            );
            self.error(message, &location);
        }

        handle
    }

    fn global_id(&mut self, name: &str, ty: Type, role: IdRole, value: Option<Constant>, location: Location) -> IdRef {
        self.bind(
            Id {
                name: name.to_owned(),
                ty,
                location,
                role,
                value,
            },
            false,
        )
    }

    pub fn global(&mut self, name: &str, ty: Type, value: Option<Constant>, location: Location) -> IdRef {
        self.log(DeclarationKind::Global, name, &location);
        self.global_id(name, ty, IdRole::Global, value, location)
    }

    pub fn constant(&mut self, name: &str, value: Constant, location: Location) -> IdRef {
        self.log(DeclarationKind::Constant, name, &location);
        let ty = value.ty.clone();
        self.global_id(name, ty, IdRole::Constant, Some(value), location)
    }

    fn declare_type(&mut self, kind: DeclarationKind, name: &str, ty: Type, location: Location) -> Type {
        self.log(kind, name, &location);

        if let Some(previous) = self.type_names.get(name) {
            let message = format!("type '{name}' is already declared (previous declaration at {previous})");
            self.error(message, &location);
        } else {
            self.type_names.insert(name.to_owned(), location.clone());
        }

        self.module.types.push(TypeDeclaration {
            name: name.to_owned(),
            ty: ty.clone(),
            location,
        });

        ty
    }

    pub fn declare_struct(&mut self, name: &str, fields: Vec<Field>, location: Location) -> Type {
        let ty = Type::Struct(Arc::new(StructType {
            name: name.to_owned(),
            fields,
        }));
        self.declare_type(DeclarationKind::Struct, name, ty, location)
    }

    pub fn declare_enum<S: Into<String>>(
        &mut self,
        name: &str,
        labels: impl IntoIterator<Item = S>,
        location: Location,
    ) -> Arc<EnumType> {
        let enum_type = Arc::new(EnumType {
            name: name.to_owned(),
            labels: labels.into_iter().map(Into::into).collect(),
        });
        self.declare_type(DeclarationKind::Enum, name, Type::Enum(enum_type.clone()), location);
        enum_type
    }

    /// Declares an exception type. The base is looked up by name when the
    /// module is finished so it may be declared later.
    pub fn declare_exception(&mut self, name: &str, base: Option<&str>, location: Location) -> ExceptionId {
        self.log(DeclarationKind::Exception, name, &location);

        let id = self.module.exceptions.push(ExceptionDecl {
            name: name.to_owned(),
            base: None,
            location: location.clone(),
        });

        if let Some(previous) = self.exception_names.get(name) {
            let message = format!(
                "exception '{name}' is already declared (previous declaration at {})",
                self.module.exceptions[*previous].location
            );
            self.error(message, &location);
        } else {
            self.exception_names.insert(name.to_owned(), id);
        }

        if let Some(base) = base {
            self.pending_bases.push((id, base.to_owned()));
        }

        id
    }

    fn add_function(&mut self, kind: DeclarationKind, name: &str, signature: FunctionType, location: Location) -> FunctionId {
        if let Some(open) = self.current_function {
            internal_error!(
                Component::Builder,
                Some(&location),
                "cannot declare function '{name}' inside '{}'",
                self.module.function(open).name
            );
        }

        self.log(kind, name, &location);

        let signature = Arc::new(signature);
        let function_id = self.module.functions.next_index();
        let id = self.global_id(
            name,
            Type::Function(signature.clone()),
            IdRole::Function(function_id),
            None,
            location.clone(),
        );

        self.module.functions.push(Function {
            name: name.to_owned(),
            id,
            signature,
            scope: Scope::new(),
            parameters: Vec::new(),
            blocks: Vec::new(),
            location,
        })
    }

    /// Declares a function without a body
    pub fn import_function(&mut self, name: &str, signature: FunctionType, location: Location) -> FunctionId {
        self.add_function(DeclarationKind::Import, name, signature, location)
    }

    /// Opens a function body. Parameters are bound in the function's scope.
    pub fn begin_function(&mut self, name: &str, signature: FunctionType, location: Location) -> FunctionId {
        let function = self.add_function(DeclarationKind::Function, name, signature, location.clone());
        self.current_function = Some(function);

        let parameters = self.module.function(function).signature.parameters.clone();
        for parameter in parameters {
            let id = self.bind(
                Id {
                    name: parameter.name,
                    ty: parameter.ty,
                    location: location.clone(),
                    role: IdRole::Parameter,
                    value: None,
                },
                true,
            );
            self.module.functions[function].parameters.push(id);
        }

        function
    }

    pub fn end_function(&mut self) -> &mut Self {
        if self.current_function.take().is_none() {
            internal_error!(Component::Builder, None, "no function is open");
        }
        self
    }

    fn open_function(&mut self, location: &Location) -> &mut Function {
        match self.current_function {
            Some(function) => &mut self.module.functions[function],
            None => internal_error!(Component::Builder, Some(location), "no function is open"),
        }
    }

    pub fn local(&mut self, name: &str, ty: Type, location: Location) -> IdRef {
        self.open_function(&location);

        self.bind(
            Id {
                name: name.to_owned(),
                ty,
                location,
                role: IdRole::Local,
                value: None,
            },
            true,
        )
    }

    /// Starts a new block in the open function
    pub fn block(&mut self, name: Option<&str>, location: Location) -> &mut Self {
        let function = self.open_function(&location);
        function
            .blocks
            .push(Block::new(name.map(str::to_owned), location));
        self
    }

    /// Sets the explicit successor of the current block
    pub fn next(&mut self, label: &str) -> &mut Self {
        let location = Location::internal();
        match self.open_function(&location).blocks.last_mut() {
            Some(block) => block.next = Some(label.to_owned()),
            None => internal_error!(Component::Builder, None, "no block is open"),
        }
        self
    }

    /// Appends an instruction to the current block, opening an unnamed entry
    /// block first if the function has none yet
    pub fn push(&mut self, instruction: Instruction) -> &mut Self {
        let function = self.open_function(&instruction.location);

        if function.blocks.is_empty() {
            function
                .blocks
                .push(Block::new(None, instruction.location.clone()));
        }

        if let Some(block) = function.blocks.last_mut() {
            block.instructions.push(instruction);
        }

        self
    }

    /// Looks a name up in the open function's scope, then the module scope
    pub fn lookup(&self, name: &str) -> Option<IdRef> {
        self.current_function
            .and_then(|f| self.module.function(f).scope.lookup(name))
            .or_else(|| self.module.scope.lookup(name))
    }

    pub fn module_ref(&self) -> &Module {
        &self.module
    }

    /// Resolves exception bases and forwards every structural error to
    /// `sink`
    pub fn finish(mut self, sink: &mut DiagnosticSink) -> Module {
        if let Some(open) = self.current_function {
            let function = self.module.function(open);
            let message = format!("function '{}' is never closed", function.name);
            let location = function.location.clone();
            self.error(message, &location);
        }

        for (exception, base) in std::mem::take(&mut self.pending_bases) {
            match self.exception_names.get(&base).copied() {
                Some(base) => self.module.exceptions[exception].base = Some(base),
                None => {
                    let declaration = &self.module.exceptions[exception];
                    let message = format!(
                        "unknown base exception '{base}' for exception '{}'",
                        declaration.name
                    );
                    let location = declaration.location.clone();
                    self.error(message, &location);
                }
            }
        }

        log::debug!(
            "built module '{}' with {} functions and {} structural errors",
            self.module.name,
            self.module.functions.len(),
            self.errors.len()
        );

        sink.extend(self.errors);
        self.module
    }
}

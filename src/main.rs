use clap::{error::ErrorKind, CommandFactory, Parser as ClapParser, Subcommand, ValueEnum};
use colored::Colorize;
use itertools::Itertools;

use basin::{
    backend::{Backend, TextBackend},
    diagnostics::Location,
    middle::{
        ir::{
            builder::ModuleBuilder,
            opcode::Opcode,
            pretty_print::pretty_print_module,
            ty::{FunctionType, Parameter, Type},
            Constant, Instruction, Operand,
        },
        registry::builtins,
    },
    pipeline::{Pipeline, PipelineOptions},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every operator binding in the built-in registry
    Operators,
    /// Render the backend contract for every built-in type
    Contract,
    /// Run the whole pipeline over a small module and print the result
    Demo,
}

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,
}

fn main() {
    let args = Args::parse();

    match args.color {
        ColorChoice::Auto => {}
        ColorChoice::Always => colored::control::set_override(true),
        ColorChoice::Never => colored::control::set_override(false),
    }

    match args.command {
        Command::Operators => operators(),
        Command::Contract => contract(),
        Command::Demo => demo(),
    }
}

fn operators() {
    for binding in builtins().bindings() {
        println!("{}", binding);
    }
}

fn contract() {
    let types = [
        Type::Void,
        Type::Bool,
        Type::INT8,
        Type::INT16,
        Type::INT32,
        Type::INT64,
        Type::Double,
        Type::String,
        Type::Bytes,
        Type::reference(Type::String),
        Type::iterator(Type::INT32),
        Type::tuple([Type::Bool, Type::Double]),
        Type::Label,
        Type::Any,
    ];

    let mut backend = TextBackend::new();
    let rows = types
        .iter()
        .map(|ty| {
            let target = backend.target_type(ty);
            let default = backend.default_value(ty);
            (
                ty.colored().to_string(),
                backend.type_name(target).to_owned(),
                backend.value_name(default).to_owned(),
            )
        })
        .collect::<Vec<_>>();

    println!("{}", "type => target type, default value".bold());
    println!(
        "{}",
        rows.iter()
            .map(|(ty, target, default)| format!("  {ty} => {target}, {default}"))
            .join("\n")
    );
}

fn demo() {
    let here = |line| Location::new("demo.ll", line);

    let mut builder = ModuleBuilder::for_module("demo", here(1));
    builder.import_function("flush", FunctionType::new([], Type::Void), here(2));
    builder.begin_function(
        "sum",
        FunctionType::new(
            [Parameter::new("a", Type::INT32), Parameter::new("b", Type::INT32)],
            Type::INT32,
        ),
        here(3),
    );

    let flush = builder.lookup("flush");
    let a = builder.lookup("a");
    let b = builder.lookup("b");
    let r = builder.local("r", Type::INT32, here(4));

    let (Some(flush), Some(a), Some(b)) = (flush, a, b) else {
        Args::command()
            .error(ErrorKind::InvalidValue, "demo module is missing a declaration")
            .exit()
    };

    builder
        .push(
            Instruction::new(Opcode::Call, here(5))
                .with_op1(Operand::Id(flush))
                .with_op2(Operand::Tuple(vec![])),
        )
        .push(
            Instruction::new(Opcode::OpPlus, here(6))
                .with_target(Operand::Id(r))
                .with_op1(Operand::Id(a))
                .with_op2(Operand::Id(b)),
        )
        .push(
            Instruction::new(Opcode::IntAdd, here(7))
                .with_target(Operand::Id(r))
                .with_op1(Operand::Id(r))
                .with_op2(Operand::Const(Constant::int(1, 0, here(7)))),
        )
        .push(Instruction::new(Opcode::ReturnResult, here(8)).with_op1(Operand::Id(r)));
    builder.end_function();

    let mut pipeline = Pipeline::new(
        builtins(),
        PipelineOptions {
            echo: true,
            stop_after: None,
        },
    );
    let mut backend = TextBackend::new();

    let result = pipeline.build(builder).and_then(|mut module| {
        pipeline.run(&mut module, &mut backend)?;
        Ok(module)
    });

    let module = match result {
        Ok(module) => module,
        Err(error) => Args::command().error(ErrorKind::InvalidValue, error).exit(),
    };

    println!("{}", "; canonical IR".dimmed());
    pretty_print_module(&module);
    println!();
    print!("{}", backend.output());
}

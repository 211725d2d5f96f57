use colored::Colorize;
use itertools::Itertools;

use crate::middle::ir::{Block, Function, IdRole, Instruction, Module, Operand};

pub fn pretty_print_module(module: &Module) {
    print!("{}", render_module(module));
}

/// Renders a module the way `pretty_print_module` prints it. Colors are
/// included when enabled; strip them with `strip_ansi_escapes` for plain text.
pub fn render_module(module: &Module) -> String {
    let mut out = format!("{} {}\n", "module".magenta(), module.name.blue());

    for declaration in &module.types {
        out.push_str(&format!("{} {}\n", "type".magenta(), declaration.ty.colored()));
    }

    for exception in module.exceptions.iter() {
        out.push_str(&format!("{} {}", "exception".magenta(), exception.name.blue()));
        if let Some(base) = exception.base {
            out.push_str(&format!(" : {}", module.exceptions[base].name));
        }
        out.push('\n');
    }

    for (_, id) in module
        .globals()
        .filter(|(_, id)| !matches!(id.role, IdRole::Function(_)))
    {
        out.push_str(&format!("{} {}: {}", id.role.to_string().magenta(), id.name, id.ty.colored()));
        if let Some(value) = &id.value {
            out.push_str(&format!(" {} {}", "=".white(), value.value.to_string().purple()));
        }
        out.push('\n');
    }

    for function in module.functions.iter() {
        out.push_str(&render_function(module, function));
    }

    out
}

pub fn render_function(module: &Module, function: &Function) -> String {
    let parameters = function
        .parameters
        .iter()
        .map(|p| format!("{}: {}", module.id(*p).name, module.id(*p).ty.colored()))
        .join(", ");

    let keyword = if function.is_import() { "import" } else { "function" };

    let mut out = format!(
        "{} {}{}{parameters}{} {}",
        keyword.magenta(),
        function.name.blue(),
        "(".white(),
        ") ->".white(),
        function.signature.result.colored()
    );

    if function.is_import() {
        out.push('\n');
        return out;
    }

    out.push_str(&format!("{}\n", " {".white()));

    for block in &function.blocks {
        out.push_str(&render_block(module, block));
    }

    out.push_str(&format!("{}\n", "}".white()));
    out
}

fn render_block(module: &Module, block: &Block) -> String {
    let mut out = String::new();

    if let Some(name) = &block.name {
        out.push_str(&format!("{}", format!("{name}:").bright_red()));
        if let Some(next) = &block.next {
            out.push_str(&format!(" {}", format!("# next {next}").white()));
        }
        out.push('\n');
    }

    for instruction in &block.instructions {
        out.push_str(&format!("    {}\n", render_instruction(module, instruction)));
    }

    out
}

pub fn render_instruction(module: &Module, instruction: &Instruction) -> String {
    let mut out = String::new();

    if let Some(target) = &instruction.target {
        out.push_str(&format!("{} {} ", render_operand(module, target), "=".white()));
    }

    out.push_str(&instruction.opcode.mnemonic().cyan().to_string());

    let operands = [&instruction.op1, &instruction.op2, &instruction.op3]
        .into_iter()
        .flatten()
        .map(|op| render_operand(module, op))
        .join(", ");

    if !operands.is_empty() {
        out.push(' ');
        out.push_str(&operands);
    }

    out
}

pub fn render_operand(module: &Module, operand: &Operand) -> String {
    match operand {
        Operand::Const(constant) => constant.value.to_string().purple().to_string(),
        Operand::Id(id) => module.id(*id).name.clone(),
        Operand::Tuple(elements) => {
            format!("({})", elements.iter().map(|e| render_operand(module, e)).join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        diagnostics::{DiagnosticSink, Location},
        middle::ir::{
            builder::ModuleBuilder,
            opcode::Opcode,
            ty::{FunctionType, Parameter, Type},
        },
    };

    #[test]
    fn renders_plain_text() {
        let here = Location::new("p.ll", 1);
        let mut builder = ModuleBuilder::for_module("demo", here.clone());
        builder.import_function("g", FunctionType::new([], Type::Void), here.clone());
        builder.begin_function(
            "f",
            FunctionType::new([Parameter::new("x", Type::INT32)], Type::INT32),
            here.clone(),
        );
        let x = builder.lookup("x").unwrap();
        builder.block(Some("entry"), here.clone());
        builder.push(Instruction::new(Opcode::ReturnResult, here.clone()).with_op1(Operand::Id(x)));
        builder.end_function();
        let module = builder.finish(&mut DiagnosticSink::new());

        let rendered = strip_ansi_escapes::strip_str(render_module(&module));

        assert_eq!(
            rendered,
            indoc! {"
                module demo
                import g() -> void
                function f(x: int<32>) -> int<32> {
                entry:
                    return.result x
                }
            "}
        );
    }
}

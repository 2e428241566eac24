use std::fmt::Write;

use itertools::Itertools;

use super::{Block, CallKind, Function, Instruction, InstructionArena, Module, Program, Value};
use crate::middle::type_checking::TypeEnvironment;

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Nop => write!(f, "nop"),
            Value::Unit => write!(f, "unit"),
            Value::Bool(value) => write!(f, "bool {value}"),
            Value::Int(value) => write!(f, "int {value}"),
            Value::Float(value) => write!(f, "float {value:.6}"),
            Value::String(value) => write!(f, "string {value:?}"),
            Value::Unary { operator, operand } => write!(f, "unary {operator} {operand}"),
            Value::Binary { operator, lhs, rhs } => write!(f, "binary {operator} {lhs} {rhs}"),
            Value::Ref(name) => write!(f, "ref {name}"),
            Value::XRef(name) => write!(f, "xref {name}"),
            Value::If { condition, .. } => write!(f, "if {condition}"),
            Value::Fun(Function {
                parameters,
                is_recursive,
                ..
            }) => {
                let rec = if *is_recursive { "rec" } else { "" };
                write!(f, "{rec}fun {}", parameters.iter().join(","))
            }
            Value::App {
                callee,
                arguments,
                kind,
            } => {
                let kind = match kind {
                    CallKind::Direct => "",
                    CallKind::Closure => "cls",
                    CallKind::External => "x",
                };
                write!(f, "app{kind} {callee} {}", arguments.iter().join(","))
            }
            Value::Tuple(elements) => write!(f, "tuple {}", elements.iter().join(",")),
            Value::TupleLoad { from, index } => write!(f, "tplload {index} {from}"),
            Value::ArrayCreate { size, element } => write!(f, "array {size} {element}"),
            Value::ArrayLiteral(elements) => write!(f, "arrlit {}", elements.iter().join(",")),
            Value::ArrayLoad { array, index } => write!(f, "arrload {index} {array}"),
            Value::ArrayStore {
                array,
                index,
                value,
            } => write!(f, "arrstore {index} {array} {value}"),
            Value::ArrayLength(array) => write!(f, "arrlen {array}"),
            Value::Some(element) => write!(f, "some {element}"),
            Value::None => write!(f, "none"),
            Value::IsSome(option) => write!(f, "issome {option}"),
            Value::DerefSome(option) => write!(f, "derefsome {option}"),
            Value::MakeClosure { captures, function } => {
                write!(f, "makecls ({}) {function}", captures.iter().join(","))
            }
        }
    }
}

/// Writes blocks one instruction per line as `<ident> = <value> ; type=<T>`.
/// Child blocks follow the instruction owning them, two spaces deeper.
struct BlockPrinter<'a> {
    arena: &'a InstructionArena,
    environment: &'a TypeEnvironment,
    out: String,
}

impl<'a> BlockPrinter<'a> {
    fn new(arena: &'a InstructionArena, environment: &'a TypeEnvironment) -> Self {
        Self {
            arena,
            environment,
            out: String::new(),
        }
    }

    fn print_instruction(&mut self, ident: &str, value: &Value, indent: usize) {
        let ty = self.environment.type_of(ident);
        let _ = writeln!(
            self.out,
            "{:indent$}{ident} = {value} ; type={ty}",
            ""
        );

        for block in value.blocks() {
            self.print_block(block, indent + 2);
        }
    }

    fn print_block(&mut self, block: &Block, indent: usize) {
        let _ = writeln!(self.out, "{:indent$}BEGIN: {}", "", block.name);

        let arena = self.arena;
        for Instruction { ident, value, .. } in arena.instructions(block) {
            self.print_instruction(ident, value, indent);
        }

        let _ = writeln!(self.out, "{:indent$}END: {}", "", block.name);
    }
}

impl Module {
    pub fn dump(&self, environment: &TypeEnvironment) -> String {
        let mut printer = BlockPrinter::new(&self.arena, environment);
        printer.print_block(&self.entry, 0);
        printer.out
    }
}

impl Program {
    pub fn dump(&self, environment: &TypeEnvironment) -> String {
        let mut printer = BlockPrinter::new(&self.arena, environment);

        let _ = writeln!(printer.out, "[TOPLEVELS ({})]", self.toplevel.len());
        for (name, toplevel) in &self.toplevel {
            printer.print_instruction(name, &Value::Fun(toplevel.function.clone()), 0);
            printer.out.push('\n');
        }

        let _ = writeln!(printer.out, "[CLOSURES ({})]", self.closures.len());
        for (name, captures) in &self.closures {
            let _ = writeln!(printer.out, "{name}:\t{}", captures.iter().join(","));
        }
        printer.out.push('\n');

        printer.out.push_str("[ENTRY]\n");
        printer.print_block(&self.entry, 0);
        printer.out
    }
}

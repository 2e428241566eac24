use std::collections::BTreeMap;

use hashbrown::HashSet;

use super::FreeVariables;
use crate::middle::mir::{
    Block, CallKind, InstructionArena, InstructionId, Module, Program, Toplevel, Value,
};

struct ClosureConverter<'a> {
    arena: InstructionArena,
    free_variables: &'a FreeVariables,
    toplevel: BTreeMap<String, Toplevel>,
    /// Innermost function whose body is being converted
    current_function: Option<String>,
    recursive: HashSet<String>,
}

impl ClosureConverter<'_> {
    fn call_kind(&self, callee: &str) -> CallKind {
        if self.free_variables.is_closure(callee) {
            CallKind::Closure
        } else if self.free_variables.known.contains(callee) {
            CallKind::Direct
        } else {
            // Parameters, tuple elements and other computed function values
            CallKind::Closure
        }
    }

    fn convert_block(&mut self, block: &Block) {
        let mut cursor = self.arena.first(block);

        while let Some(id) = cursor {
            cursor = self.arena.next(id);
            self.convert_instruction(id);
        }
    }

    fn convert_instruction(&mut self, id: InstructionId) {
        match &self.arena[id].value {
            Value::Fun(_) => self.hoist_function(id),
            Value::App {
                callee,
                kind: CallKind::Direct,
                ..
            } => {
                let callee = callee.clone();
                let kind = self.call_kind(&callee);

                if self.current_function.as_ref() == Some(&callee) {
                    self.recursive.insert(callee);
                }

                if let Value::App { kind: old, .. } = &mut self.arena[id].value {
                    *old = kind;
                }
            }
            Value::If {
                positive, negative, ..
            } => {
                let (positive, negative) = (positive.clone(), negative.clone());

                self.convert_block(&positive);
                self.convert_block(&negative);
            }
            _ => {}
        }
    }

    /// Moves a function definition to the top level. A closure leaves its
    /// allocation behind; a known function leaves nothing.
    fn hoist_function(&mut self, id: InstructionId) {
        let instruction = &self.arena[id];
        let name = instruction.ident.clone();
        let span = instruction.span;

        let Value::Fun(function) = &instruction.value else {
            unreachable!("'{name}' is not a function")
        };
        let mut function = function.clone();

        let enclosing = self.current_function.replace(name.clone());
        self.convert_block(&function.body);
        self.current_function = enclosing;

        function.is_recursive = self.recursive.contains(&name);

        match self.free_variables.closures.get(&name) {
            Some(captures) => {
                self.arena[id].value = Value::MakeClosure {
                    captures: captures.clone(),
                    function: name.clone(),
                };
            }
            None => self.arena.remove(id),
        }

        log::trace!("hoisted '{name}'");
        self.toplevel.insert(name, Toplevel { function, span });
    }
}

/// Hoists every function of the module to the top level and decides how each
/// call is made. Calls of known functions stay direct, calls of anything else
/// go through a closure.
pub fn convert(module: Module, free_variables: &FreeVariables) -> Program {
    let Module { arena, entry } = module;

    let mut converter = ClosureConverter {
        arena,
        free_variables,
        toplevel: BTreeMap::new(),
        current_function: None,
        recursive: HashSet::new(),
    };

    converter.convert_block(&entry);
    log::debug!(
        "closure converted program into {} top-level functions",
        converter.toplevel.len()
    );

    Program {
        arena: converter.arena,
        toplevel: converter.toplevel,
        closures: free_variables.closures.clone(),
        entry,
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        config::Config,
        frontend::ast::{BinaryOperatorKind, Program as Ast, build::TreeBuilder},
        middle::{
            closure::analyze_free_variables, mir, resolve::Resolver,
            type_checking::{TypeEnvironment, type_check},
        },
    };

    fn convert_program(program: &Ast) -> (Program, TypeEnvironment) {
        let resolutions = Resolver::resolve_names(program).unwrap();
        let mut environment = type_check(program, &resolutions, &Config::default()).unwrap();
        let mut module = mir::build(program, &resolutions, &mut environment);
        mir::eliminate_references(&mut module, &mut environment);

        let free_variables = analyze_free_variables(&module);
        let program = convert(module, &free_variables);
        program.verify(&environment);

        (program, environment)
    }

    #[test]
    fn known_functions_are_called_directly() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_rec(
            "f",
            &["x"],
            b.binary(BinaryOperatorKind::Add, b.var("x"), b.int(1)),
            b.call("f", vec![b.int(42)]),
        ));

        let (program, environment) = convert_program(&program);

        assert_eq!(
            program.dump(&environment),
            indoc! {"
                [TOPLEVELS (1)]
                f$1 = fun x$2 ; type=int -> int
                  BEGIN: body (f$1)
                  $2 = int 1 ; type=int
                  $3 = binary + x$2 $2 ; type=int
                  END: body (f$1)

                [CLOSURES (0)]

                [ENTRY]
                BEGIN: program
                $5 = int 42 ; type=int
                $6 = app f$1 $5 ; type=int
                END: program
            "}
        );
    }

    #[test]
    fn capturing_functions_become_closures() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_in(
            "x",
            b.int(1),
            b.let_rec(
                "f",
                &["a"],
                b.binary(BinaryOperatorKind::Add, b.var("a"), b.var("x")),
                b.call("f", vec![b.int(2)]),
            ),
        ));

        let (program, environment) = convert_program(&program);

        assert_eq!(
            program.dump(&environment),
            indoc! {"
                [TOPLEVELS (1)]
                f$2 = fun a$3 ; type=int -> int
                  BEGIN: body (f$2)
                  $4 = binary + a$3 x$1 ; type=int
                  END: body (f$2)

                [CLOSURES (1)]
                f$2:\tx$1

                [ENTRY]
                BEGIN: program
                x$1 = int 1 ; type=int
                f$2 = makecls (x$1) f$2 ; type=int -> int
                $6 = int 2 ; type=int
                $7 = appcls f$2 $6 ; type=int
                END: program
            "}
        );
    }

    #[test]
    fn self_calls_mark_functions_recursive() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_rec(
            "loop",
            &["n"],
            b.if_then_else(
                b.binary(BinaryOperatorKind::LessThanOrEqualTo, b.var("n"), b.int(0)),
                b.unit(),
                b.call(
                    "loop",
                    vec![b.binary(BinaryOperatorKind::Subtract, b.var("n"), b.int(1))],
                ),
            ),
            b.call("loop", vec![b.int(10)]),
        ));

        let (program, environment) = convert_program(&program);

        assert_eq!(
            program.dump(&environment),
            indoc! {"
                [TOPLEVELS (1)]
                loop$1 = recfun n$2 ; type=int -> unit
                  BEGIN: body (loop$1)
                  $2 = int 0 ; type=int
                  $3 = binary <= n$2 $2 ; type=bool
                  $10 = if $3 ; type=unit
                    BEGIN: then
                    $4 = unit ; type=unit
                    END: then
                    BEGIN: else
                    $7 = int 1 ; type=int
                    $8 = binary - n$2 $7 ; type=int
                    $9 = app loop$1 $8 ; type=unit
                    END: else
                  END: body (loop$1)

                [CLOSURES (0)]

                [ENTRY]
                BEGIN: program
                $12 = int 10 ; type=int
                $13 = app loop$1 $12 ; type=unit
                END: program
            "}
        );
    }

    #[test]
    fn returned_functions_are_called_through_closures() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_in(
            "a",
            b.int(42),
            b.let_rec(
                "f",
                &["x"],
                b.binary(BinaryOperatorKind::Add, b.var("a"), b.var("x")),
                b.let_rec(
                    "g",
                    &["y"],
                    b.var("f"),
                    b.apply(b.call("g", vec![b.unit()]), vec![b.int(42)]),
                ),
            ),
        ));

        let (program, environment) = convert_program(&program);

        assert_eq!(program.closures["f$2"], ["a$1"]);
        assert_eq!(program.closures["g$4"], ["f$2"]);

        let dump = program.dump(&environment);
        let lines = dump.lines().map(str::trim_start).collect::<Vec<_>>();
        assert!(lines.contains(&"$5 = ref f$2 ; type=int -> int"));
        assert!(lines.iter().any(|line| line.starts_with("f$2 = makecls (a$1) f$2 ;")));
        assert!(lines.iter().any(|line| line.starts_with("g$4 = makecls (f$2) g$4 ;")));
        assert!(lines.contains(&"$8 = appcls g$4 $7 ; type=int -> int"));
        assert!(lines.contains(&"$10 = appcls $8 $9 ; type=int"));
    }

    #[test]
    fn known_function_inside_closure_stays_direct() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_in(
            "k",
            b.int(3),
            b.let_rec(
                "outer",
                &["x"],
                b.let_rec(
                    "double",
                    &["y"],
                    b.binary(BinaryOperatorKind::Add, b.var("y"), b.var("y")),
                    b.binary(
                        BinaryOperatorKind::Add,
                        b.call("double", vec![b.var("x")]),
                        b.var("k"),
                    ),
                ),
                b.call("outer", vec![b.int(1)]),
            ),
        ));

        let (program, _) = convert_program(&program);

        assert_eq!(program.closures.keys().collect::<Vec<_>>(), ["outer$2"]);
        assert_eq!(program.closures["outer$2"], ["k$1"]);
        assert!(program.toplevel.contains_key("double$4"));
        assert!(!program.toplevel["double$4"].function.is_recursive);
    }
}

use hashbrown::HashMap;

use super::{Block, CallKind, InstructionArena, InstructionId, Module, Value};
use crate::middle::type_checking::TypeEnvironment;

/// An instruction which only renames another value
#[derive(Debug)]
struct Alias {
    instruction: InstructionId,
    target: String,
    /// The target is an external symbol rather than a local
    external: bool,
}

/// Follows `name` through local aliases. If the chain ends at an external,
/// returns the aliases passed on the way and the external's name.
fn forward_to_external(
    aliases: &HashMap<String, Alias>,
    name: &str,
) -> Option<(Vec<String>, String)> {
    let mut chain = Vec::new();
    let mut name = name;

    while let Some(alias) = aliases.get(name) {
        chain.push(name.to_owned());

        if alias.external {
            return Some((chain, alias.target.clone()));
        }

        name = &alias.target;
    }

    None
}

struct ReferenceEliminator<'a> {
    arena: &'a mut InstructionArena,
    environment: &'a mut TypeEnvironment,
    aliases: HashMap<String, Alias>,
}

impl ReferenceEliminator<'_> {
    /// Unlinks the instruction defining `alias` if it is still in its block.
    /// Let-bound aliases stay since the binding may still be read.
    fn remove_alias(&mut self, alias: &str) {
        if !alias.starts_with('$') {
            return;
        }

        let instruction = self.aliases[alias].instruction;

        if self.arena.is_linked(instruction) {
            log::trace!("eliminated alias '{alias}'");
            self.arena.remove(instruction);
            self.environment.table.remove(alias);
        }
    }

    fn eliminate_in_block(&mut self, block: &Block) {
        let mut cursor = self.arena.first(block);

        while let Some(id) = cursor {
            cursor = self.arena.next(id);
            self.eliminate_in_instruction(id);
        }

        self.drop_trailing_alias(block);
    }

    fn eliminate_in_instruction(&mut self, id: InstructionId) {
        let instruction = &self.arena[id];

        let alias = match &instruction.value {
            Value::Ref(target) => Alias {
                instruction: id,
                target: target.clone(),
                external: false,
            },
            Value::XRef(target) => Alias {
                instruction: id,
                target: target.clone(),
                external: true,
            },
            _ => return self.rewrite_operands(id),
        };

        self.aliases.insert(instruction.ident.clone(), alias);
    }

    fn rewrite_operands(&mut self, id: InstructionId) {
        let mut used = Vec::new();
        let value = &mut self.arena[id].value;

        // Calling an external through any chain of aliases becomes an
        // external call
        if let Value::App { callee, kind, .. } = value
            && *kind != CallKind::External
            && let Some((chain, external)) = forward_to_external(&self.aliases, callee)
        {
            *callee = external;
            *kind = CallKind::External;
            used.extend(chain);
        }

        for operand in value.operands_mut() {
            if let Some(alias) = self.aliases.get(operand.as_str())
                && !alias.external
            {
                used.push(std::mem::replace(operand, alias.target.clone()));
            }
        }

        let blocks = value.blocks().into_iter().cloned().collect::<Vec<_>>();

        for alias in used {
            self.remove_alias(&alias);
        }

        for block in &blocks {
            self.eliminate_in_block(block);
        }
    }

    /// A block ending in `$n = ref y` right after the definition of `y` can
    /// yield `y` directly
    fn drop_trailing_alias(&mut self, block: &Block) {
        let Some(last) = self.arena.last(block) else {
            return;
        };
        let Some(previous) = self.arena.prev(last) else {
            return;
        };

        let Value::Ref(target) = &self.arena[last].value else {
            return;
        };

        let previous = &self.arena[previous];
        if self.arena[last].ident.starts_with('$')
            && previous.ident == *target
            && !matches!(previous.value, Value::Fun(_))
        {
            let ident = self.arena[last].ident.clone();
            log::trace!("dropped trailing alias '{ident}' of '{target}'");

            self.arena.remove(last);
            self.environment.table.remove(&ident);
        }
    }
}

/// Forwards every operand naming a `ref` or `xref` alias to the aliased name
/// and deletes the alias once it is used. Must run before closure conversion
/// since a function read through an alias looks like a first-class use.
pub fn eliminate_references(module: &mut Module, environment: &mut TypeEnvironment) {
    let mut eliminator = ReferenceEliminator {
        arena: &mut module.arena,
        environment,
        aliases: HashMap::new(),
    };

    eliminator.eliminate_in_block(&module.entry);
    log::debug!(
        "eliminated references, {} aliases seen",
        eliminator.aliases.len()
    );
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::{
        config::Config,
        frontend::ast::{BinaryOperatorKind, Program, UnaryOperatorKind, build::TreeBuilder},
        middle::{
            mir::{build, eliminate_references},
            resolve::Resolver,
            type_checking::type_check,
        },
    };

    fn lower(program: &Program) -> String {
        let resolutions = Resolver::resolve_names(program).unwrap();
        let mut environment = type_check(program, &resolutions, &Config::default()).unwrap();
        let mut module = build(program, &resolutions, &mut environment);
        eliminate_references(&mut module, &mut environment);

        let dump = module.dump(&environment);
        for name in environment.table.keys().filter(|name| name.starts_with('$')) {
            let prefix = format!("{name} = ");
            assert!(
                dump.lines().any(|line| line.trim_start().starts_with(&prefix)),
                "'{name}' was removed but kept its type"
            );
        }

        dump
    }

    #[test]
    fn operands_are_forwarded_through_aliases() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_in(
            "x",
            b.int(1),
            b.binary(BinaryOperatorKind::Add, b.var("x"), b.var("x")),
        ));

        assert_eq!(
            lower(&program),
            indoc! {"
                BEGIN: program
                x$1 = int 1 ; type=int
                $4 = binary + x$1 x$1 ; type=int
                END: program
            "}
        );
    }

    #[test]
    fn let_aliases_stay_but_synthesized_ones_go() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_in(
            "a",
            b.int(1),
            b.let_in("b", b.var("a"), b.var("b")),
        ));

        assert_eq!(
            lower(&program),
            indoc! {"
                BEGIN: program
                a$1 = int 1 ; type=int
                b$2 = ref a$1 ; type=int
                END: program
            "}
        );
    }

    #[test]
    fn external_calls_are_reclassified() {
        let b = TreeBuilder::new();
        let program = b.program(b.call("print_int", vec![b.int(1)]));

        assert_eq!(
            lower(&program),
            indoc! {"
                BEGIN: program
                $2 = int 1 ; type=int
                $3 = appx print_int $2 ; type=unit
                END: program
            "}
        );
    }

    #[test]
    fn aliases_are_forwarded_into_nested_blocks() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_in(
            "c",
            b.bool(true),
            b.if_then_else(
                b.var("c"),
                b.var("c"),
                b.unary(UnaryOperatorKind::Not, b.var("c")),
            ),
        ));

        assert_eq!(
            lower(&program),
            indoc! {"
                BEGIN: program
                c$1 = bool true ; type=bool
                $6 = if c$1 ; type=bool
                  BEGIN: then
                  $3 = ref c$1 ; type=bool
                  END: then
                  BEGIN: else
                  $5 = unary not c$1 ; type=bool
                  END: else
                END: program
            "}
        );
    }

    #[test]
    fn function_values_keep_their_reference() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_rec(
            "f",
            &["x"],
            b.binary(BinaryOperatorKind::Add, b.var("x"), b.int(1)),
            b.var("f"),
        ));

        assert_eq!(
            lower(&program),
            indoc! {"
                BEGIN: program
                f$1 = fun x$2 ; type=int -> int
                  BEGIN: body (f$1)
                  $2 = int 1 ; type=int
                  $3 = binary + x$2 $2 ; type=int
                  END: body (f$1)
                $4 = ref f$1 ; type=int -> int
                END: program
            "}
        );
    }

    #[test]
    fn let_bound_externals_are_called_as_externals() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_in(
            "p",
            b.var("print_int"),
            b.call("p", vec![b.int(1)]),
        ));

        assert_eq!(
            lower(&program),
            indoc! {"
                BEGIN: program
                p$1 = xref print_int ; type=int -> unit
                $3 = int 1 ; type=int
                $4 = appx print_int $3 ; type=unit
                END: program
            "}
        );
    }

    #[test]
    fn external_calls_follow_chains_of_let_aliases() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_in(
            "p",
            b.var("print_int"),
            b.let_in(
                "q",
                b.var("p"),
                b.sequence(b.call("q", vec![b.int(1)]), b.var("q")),
            ),
        ));

        let dump = lower(&program);
        let lines = dump.lines().collect::<Vec<_>>();

        assert!(lines.contains(&"p$1 = xref print_int ; type=int -> unit"));
        assert!(lines.contains(&"q$2 = ref p$1 ; type=int -> unit"));
        assert!(lines.contains(&"_$3 = appx print_int $4 ; type=unit"));
        assert!(lines.contains(&"$6 = ref q$2 ; type=int -> unit"));
    }
}

use std::collections::{BTreeMap, BTreeSet};

use hashbrown::{HashMap, HashSet};

use crate::middle::mir::{Block, CallKind, Function, InstructionArena, Module, Value};

/// Which functions need a closure and what each of them captures
#[derive(Debug, Default, Clone)]
pub struct FreeVariables {
    /// Captured names of every function which needs a closure, sorted
    pub closures: BTreeMap<String, Vec<String>>,
    /// Functions called by label, without a closure
    pub known: BTreeSet<String>,
    /// Functions whose own name is read as a value inside their body
    pub self_referenced: BTreeSet<String>,
}

impl FreeVariables {
    pub fn is_closure(&self, function: &str) -> bool {
        self.closures.contains_key(function)
    }
}

/// Collects every name read as a value anywhere below `block`. Callees of
/// calls are not values. A function reading its own name from inside its
/// body is recorded in `self_referenced`.
fn collect_value_uses(
    arena: &InstructionArena,
    block: &Block,
    enclosing: &mut Vec<String>,
    uses: &mut HashSet<String>,
    self_referenced: &mut BTreeSet<String>,
) {
    for instruction in arena.instructions(block) {
        let operands = instruction.value.operands();

        let values = match &instruction.value {
            Value::App {
                kind: CallKind::External,
                ..
            } => &operands[..],
            Value::App { .. } => &operands[1..],
            _ => &operands[..],
        };

        for name in values {
            if enclosing.iter().any(|function| function == name) {
                self_referenced.insert((*name).to_owned());
            }

            uses.insert((*name).to_owned());
        }

        match &instruction.value {
            Value::Fun(function) => {
                enclosing.push(instruction.ident.clone());
                collect_value_uses(arena, &function.body, enclosing, uses, self_referenced);
                enclosing.pop();
            }
            value => {
                for child in value.blocks() {
                    collect_value_uses(arena, child, enclosing, uses, self_referenced);
                }
            }
        }
    }
}

/// Every function defined below `block`, nested functions before the
/// function containing them
fn collect_functions<'a>(
    arena: &'a InstructionArena,
    block: &Block,
    functions: &mut Vec<(&'a str, &'a Function)>,
) {
    for instruction in arena.instructions(block) {
        match &instruction.value {
            Value::Fun(function) => {
                collect_functions(arena, &function.body, functions);
                functions.push((instruction.ident.as_str(), function));
            }
            value => {
                for child in value.blocks() {
                    collect_functions(arena, child, functions);
                }
            }
        }
    }
}

struct FreeVariableAnalyzer<'a> {
    arena: &'a InstructionArena,
    /// Functions still assumed to be callable by label
    known: BTreeSet<String>,
    /// Captured names of every function under the current assumption
    captures: HashMap<String, Vec<String>>,
}

impl FreeVariableAnalyzer<'_> {
    fn captures_of(&self, name: &str, function: &Function) -> Vec<String> {
        let mut live = self.live_names(&function.body);

        for parameter in &function.parameters {
            live.remove(parameter);
        }
        live.remove(name);

        live.into_iter().collect()
    }

    /// Names read by `block` which it does not define itself. Walks the
    /// block backwards, adding what each instruction reads and removing
    /// what it defines.
    fn live_names(&self, block: &Block) -> BTreeSet<String> {
        let mut live = BTreeSet::new();
        let mut cursor = self.arena.last(block);

        while let Some(id) = cursor {
            let instruction = &self.arena[id];

            match &instruction.value {
                Value::Fun(_) => {
                    // Known functions are hoisted as they are and read
                    // nothing at their definition
                    if !self.known.contains(&instruction.ident)
                        && let Some(captures) = self.captures.get(&instruction.ident)
                    {
                        live.extend(captures.iter().cloned());
                    }
                }
                Value::App {
                    callee,
                    arguments,
                    kind,
                } => {
                    if *kind != CallKind::External && !self.known.contains(callee) {
                        live.insert(callee.clone());
                    }

                    live.extend(arguments.iter().cloned());
                }
                Value::If {
                    condition,
                    positive,
                    negative,
                } => {
                    live.insert(condition.clone());
                    live.extend(self.live_names(positive));
                    live.extend(self.live_names(negative));
                }
                value => live.extend(value.operands().into_iter().map(str::to_owned)),
            }

            live.remove(&instruction.ident);
            cursor = self.arena.prev(id);
        }

        live
    }

    /// Recomputes the captures of every function, innermost first, and
    /// turns each known function which captures anything into a closure.
    /// Returns whether any function changed.
    fn demote_capturing_functions(&mut self, functions: &[(&str, &Function)]) -> bool {
        let mut changed = false;

        for (name, function) in functions {
            let captures = self.captures_of(name, function);

            if !captures.is_empty() && self.known.remove(*name) {
                log::trace!("'{name}' captures [{}]", captures.join(", "));
                changed = true;
            }

            self.captures.insert((*name).to_owned(), captures);
        }

        changed
    }
}

/// Computes the captured names of every function in the module and decides
/// which functions need a closure: those which read anything from their
/// surroundings and those whose name is used as a value.
///
/// Every function not used as a value starts out known. Demoting a function
/// to a closure can only add captures to the functions around it, so
/// demotions are repeated until nothing changes.
pub fn analyze_free_variables(module: &Module) -> FreeVariables {
    let mut escaping = HashSet::new();
    let mut self_referenced = BTreeSet::new();
    collect_value_uses(
        &module.arena,
        &module.entry,
        &mut Vec::new(),
        &mut escaping,
        &mut self_referenced,
    );

    let mut functions = Vec::new();
    collect_functions(&module.arena, &module.entry, &mut functions);

    let mut analyzer = FreeVariableAnalyzer {
        arena: &module.arena,
        known: functions
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| !escaping.contains(*name))
            .map(str::to_owned)
            .collect(),
        captures: HashMap::new(),
    };

    let mut rounds = 1;
    while analyzer.demote_capturing_functions(&functions) {
        rounds += 1;
    }

    let FreeVariableAnalyzer {
        known, captures, ..
    } = analyzer;

    let closures = captures
        .into_iter()
        .filter(|(name, _)| !known.contains(name))
        .collect::<BTreeMap<_, _>>();

    log::debug!(
        "found {} known functions and {} closures in {rounds} rounds",
        known.len(),
        closures.len()
    );

    FreeVariables {
        closures,
        known,
        self_referenced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        frontend::ast::{BinaryOperatorKind, Program, build::TreeBuilder},
        middle::{mir, resolve::Resolver, type_checking::type_check},
    };

    fn analyze(program: &Program) -> FreeVariables {
        let resolutions = Resolver::resolve_names(program).unwrap();
        let mut environment = type_check(program, &resolutions, &Config::default()).unwrap();
        let mut module = mir::build(program, &resolutions, &mut environment);
        mir::eliminate_references(&mut module, &mut environment);

        analyze_free_variables(&module)
    }

    #[test]
    fn function_without_free_variables_is_known() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_rec("f", &["x"], b.var("x"), b.call("f", vec![b.int(42)])));

        let result = analyze(&program);

        assert!(result.known.contains("f$1"));
        assert!(result.closures.is_empty());
    }

    #[test]
    fn reading_an_outer_binding_makes_a_closure() {
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

        let result = analyze(&program);

        assert_eq!(result.closures["f$2"], ["x$1"]);
        assert!(result.known.is_empty());
    }

    #[test]
    fn recursion_alone_does_not_capture() {
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

        let result = analyze(&program);

        assert!(result.known.contains("loop$1"));
        assert!(result.self_referenced.is_empty());
    }

    #[test]
    fn function_read_as_value_in_its_body_is_a_closure() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_rec(
            "f",
            &["x"],
            b.if_then_else(
                b.binary(BinaryOperatorKind::LessThanOrEqualTo, b.var("x"), b.int(0)),
                b.int(0),
                b.let_in(
                    "g",
                    b.var("f"),
                    b.call(
                        "g",
                        vec![b.binary(BinaryOperatorKind::Subtract, b.var("x"), b.int(1))],
                    ),
                ),
            ),
            b.call("f", vec![b.int(3)]),
        ));

        let result = analyze(&program);

        assert_eq!(result.closures["f$1"], Vec::<String>::new());
        assert!(result.self_referenced.contains("f$1"));
    }

    #[test]
    fn nested_function_capturing_a_parameter() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_rec(
            "adder",
            &["n"],
            b.let_rec(
                "add",
                &["m"],
                b.binary(BinaryOperatorKind::Add, b.var("n"), b.var("m")),
                b.call("add", vec![b.int(1)]),
            ),
            b.call("adder", vec![b.int(2)]),
        ));

        let result = analyze(&program);

        assert_eq!(result.closures["add$3"], ["n$2"]);
        assert!(result.known.contains("adder$1"));
    }

    #[test]
    fn calling_an_enclosing_closure_captures_it() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_in(
            "x",
            b.int(1),
            b.let_rec(
                "f",
                &["a"],
                b.let_rec(
                    "g",
                    &["b"],
                    b.call("f", vec![b.var("b")]),
                    b.binary(
                        BinaryOperatorKind::Add,
                        b.call("g", vec![b.var("a")]),
                        b.var("x"),
                    ),
                ),
                b.call("f", vec![b.int(2)]),
            ),
        ));

        let result = analyze(&program);

        assert_eq!(result.closures["f$2"], ["x$1"]);
        assert_eq!(result.closures["g$4"], ["f$2"]);
        assert!(result.known.is_empty());
    }

    /// `let rec f0 p0 = let rec f1 p1 = ... x + p<depth-1> ... in f1 p0 in f0 x`
    /// inside `let rec outer x = ... in outer 1`
    fn nested_capture_chain(b: &TreeBuilder, depth: usize) -> Program {
        let mut body = b.binary(
            BinaryOperatorKind::Add,
            b.var("x"),
            b.var(&format!("p{}", depth - 1)),
        );

        for level in (0..depth).rev() {
            let argument = match level {
                0 => "x".to_owned(),
                _ => format!("p{}", level - 1),
            };
            let name = format!("f{level}");
            let parameter = format!("p{level}");

            body = b.let_rec(
                &name,
                &[parameter.as_str()],
                body,
                b.call(&name, vec![b.var(&argument)]),
            );
        }

        b.program(b.let_rec("outer", &["x"], body, b.call("outer", vec![b.int(1)])))
    }

    #[test]
    fn deeply_nested_closures_are_analyzed_in_few_rounds() {
        let b = TreeBuilder::new();
        let depth = 64;
        let program = nested_capture_chain(&b, depth);

        let result = analyze(&program);

        assert_eq!(result.closures.len(), depth);
        assert!(result.closures.values().all(|captures| captures == &["x$2"]));
        assert_eq!(result.known.iter().collect::<Vec<_>>(), ["outer$1"]);
    }
}

//! MIR (Mid-level Intermediate Representation). Expression trees are
//! K-normalized: every non-trivial sub-expression gets its own named
//! instruction, evaluated in order. Control flow stays structured; the arms
//! of a conditional and the body of a function are child blocks owned by the
//! instruction which uses them.
//!
//! Instructions of every block live in one [`InstructionArena`]. A block is a
//! doubly linked list threaded through the arena and bounded by two sentinel
//! `nop` instructions, so passes can splice and unlink instructions in place
//! and walk a block in either direction.

use std::collections::BTreeMap;

use crate::{
    frontend::{
        Span,
        ast::{BinaryOperatorKind, UnaryOperatorKind},
    },
    index::{IndexVec, simple_index},
    middle::type_checking::TypeEnvironment,
};

mod ast_lowering;
mod elim_ref;
pub mod pretty_print;

pub use ast_lowering::build;
pub use elim_ref::eliminate_references;

simple_index! {
    /// Identifies an instruction in an [`InstructionArena`]
    pub struct InstructionId;
}

#[derive(Debug, Clone)]
pub struct Instruction {
    /// Name of the value this instruction produces
    pub ident: String,
    pub value: Value,
    pub span: Span,
    prev: Option<InstructionId>,
    next: Option<InstructionId>,
}

/// A list of instructions between two sentinels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub name: String,
    top: InstructionId,
    bottom: InstructionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Call of a known function by its label
    Direct,
    /// Call through a closure value
    Closure,
    /// Call of a function provided by the runtime or an `external`
    External,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub parameters: Vec<String>,
    pub body: Block,
    /// Set by closure conversion when the body calls the function itself
    pub is_recursive: bool,
}

#[derive(Debug, Clone)]
pub enum Value {
    /// Sentinel at either end of a block
    Nop,
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Unary {
        operator: UnaryOperatorKind,
        operand: String,
    },
    Binary {
        operator: BinaryOperatorKind,
        lhs: String,
        rhs: String,
    },
    /// Reads a local binding
    Ref(String),
    /// Reads an external symbol as a value
    XRef(String),
    If {
        condition: String,
        positive: Block,
        negative: Block,
    },
    Fun(Function),
    App {
        callee: String,
        arguments: Vec<String>,
        kind: CallKind,
    },
    Tuple(Vec<String>),
    TupleLoad {
        from: String,
        index: usize,
    },
    ArrayCreate {
        size: String,
        element: String,
    },
    ArrayLiteral(Vec<String>),
    ArrayLoad {
        array: String,
        index: String,
    },
    ArrayStore {
        array: String,
        index: String,
        value: String,
    },
    ArrayLength(String),
    Some(String),
    None,
    IsSome(String),
    DerefSome(String),
    /// Allocates the closure of `function` capturing the current values of
    /// `captures`
    MakeClosure {
        captures: Vec<String>,
        function: String,
    },
}

impl Value {
    /// Every local name this value reads, in order. External names (`xref`
    /// targets and external callees) are not operands. Names used inside
    /// child blocks are not included.
    pub fn operands(&self) -> Vec<&str> {
        match self {
            Value::Nop
            | Value::Unit
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::String(_)
            | Value::XRef(_)
            | Value::Fun(_)
            | Value::None => vec![],
            Value::Unary { operand, .. } => vec![operand.as_str()],
            Value::Binary { lhs, rhs, .. } => vec![lhs.as_str(), rhs.as_str()],
            Value::Ref(name)
            | Value::ArrayLength(name)
            | Value::Some(name)
            | Value::IsSome(name)
            | Value::DerefSome(name) => vec![name.as_str()],
            Value::If { condition, .. } => vec![condition.as_str()],
            Value::App {
                callee,
                arguments,
                kind,
            } => {
                let callee = (*kind != CallKind::External).then_some(callee.as_str());

                callee
                    .into_iter()
                    .chain(arguments.iter().map(String::as_str))
                    .collect()
            }
            Value::Tuple(elements) | Value::ArrayLiteral(elements) => {
                elements.iter().map(String::as_str).collect()
            }
            Value::TupleLoad { from, .. } => vec![from.as_str()],
            Value::ArrayCreate { size, element } => vec![size.as_str(), element.as_str()],
            Value::ArrayLoad { array, index } => vec![array.as_str(), index.as_str()],
            Value::ArrayStore {
                array,
                index,
                value,
            } => vec![array.as_str(), index.as_str(), value.as_str()],
            Value::MakeClosure { captures, .. } => captures.iter().map(String::as_str).collect(),
        }
    }

    /// Mutable counterpart of [`Value::operands`]
    pub fn operands_mut(&mut self) -> Vec<&mut String> {
        match self {
            Value::Nop
            | Value::Unit
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::String(_)
            | Value::XRef(_)
            | Value::Fun(_)
            | Value::None => vec![],
            Value::Unary { operand, .. } => vec![operand],
            Value::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Value::Ref(name)
            | Value::ArrayLength(name)
            | Value::Some(name)
            | Value::IsSome(name)
            | Value::DerefSome(name) => vec![name],
            Value::If { condition, .. } => vec![condition],
            Value::App {
                callee,
                arguments,
                kind,
            } => {
                let callee = (*kind != CallKind::External).then_some(callee);

                callee.into_iter().chain(arguments.iter_mut()).collect()
            }
            Value::Tuple(elements) | Value::ArrayLiteral(elements) => elements.iter_mut().collect(),
            Value::TupleLoad { from, .. } => vec![from],
            Value::ArrayCreate { size, element } => vec![size, element],
            Value::ArrayLoad { array, index } => vec![array, index],
            Value::ArrayStore {
                array,
                index,
                value,
            } => vec![array, index, value],
            Value::MakeClosure { captures, .. } => captures.iter_mut().collect(),
        }
    }

    /// Blocks owned by this value
    pub fn blocks(&self) -> Vec<&Block> {
        match self {
            Value::If {
                positive, negative, ..
            } => vec![positive, negative],
            Value::Fun(function) => vec![&function.body],
            _ => vec![],
        }
    }
}

/// Owns the instructions of every block of a program
#[derive(Debug, Default)]
pub struct InstructionArena {
    instructions: IndexVec<InstructionId, Instruction>,
}

impl InstructionArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn sentinel(&mut self) -> InstructionId {
        self.instructions.push(Instruction {
            ident: String::new(),
            value: Value::Nop,
            span: Span::default(),
            prev: None,
            next: None,
        })
    }

    pub fn new_block(&mut self, name: impl Into<String>) -> Block {
        let top = self.sentinel();
        let bottom = self.sentinel();

        self.instructions[top].next = Some(bottom);
        self.instructions[bottom].prev = Some(top);

        Block {
            name: name.into(),
            top,
            bottom,
        }
    }

    /// Links a new instruction between `prev` and `next`, which must be
    /// adjacent
    fn insert_between(
        &mut self,
        prev: InstructionId,
        next: InstructionId,
        ident: String,
        value: Value,
        span: Span,
    ) -> InstructionId {
        let id = self.instructions.push(Instruction {
            ident,
            value,
            span,
            prev: Some(prev),
            next: Some(next),
        });

        self.instructions[prev].next = Some(id);
        self.instructions[next].prev = Some(id);

        id
    }

    /// Adds an instruction at the end of `block`
    pub fn append(
        &mut self,
        block: &Block,
        ident: impl Into<String>,
        value: Value,
        span: Span,
    ) -> InstructionId {
        let prev = self.instructions[block.bottom]
            .prev
            .unwrap_or_else(|| panic!("bottom of block '{}' is detached", block.name));

        self.insert_between(prev, block.bottom, ident.into(), value, span)
    }

    /// Adds an instruction at the start of `block`
    pub fn prepend(
        &mut self,
        block: &Block,
        ident: impl Into<String>,
        value: Value,
        span: Span,
    ) -> InstructionId {
        let next = self.instructions[block.top]
            .next
            .unwrap_or_else(|| panic!("top of block '{}' is detached", block.name));

        self.insert_between(block.top, next, ident.into(), value, span)
    }

    /// Unlinks an instruction from its block. Its slot in the arena stays
    /// allocated but is no longer reachable from any block.
    pub fn remove(&mut self, id: InstructionId) {
        let (Some(prev), Some(next)) = (self.instructions[id].prev, self.instructions[id].next)
        else {
            panic!(
                "instruction '{}' is not linked into a block",
                self.instructions[id].ident
            );
        };

        self.instructions[prev].next = Some(next);
        self.instructions[next].prev = Some(prev);

        let instruction = &mut self.instructions[id];
        instruction.prev = None;
        instruction.next = None;
    }

    pub fn is_linked(&self, id: InstructionId) -> bool {
        self.instructions[id].prev.is_some()
    }

    /// The instruction after `id`, unless `id` is the last one of its block
    pub fn next(&self, id: InstructionId) -> Option<InstructionId> {
        let next = self.instructions[id].next?;
        self.instructions[next].next.map(|_| next)
    }

    /// The instruction before `id`, unless `id` is the first one of its
    /// block
    pub fn prev(&self, id: InstructionId) -> Option<InstructionId> {
        let prev = self.instructions[id].prev?;
        self.instructions[prev].prev.map(|_| prev)
    }

    pub fn first(&self, block: &Block) -> Option<InstructionId> {
        self.next(block.top)
    }

    pub fn last(&self, block: &Block) -> Option<InstructionId> {
        self.prev(block.bottom)
    }

    /// Ids of the instructions currently in `block`, in order
    pub fn ids(&self, block: &Block) -> Vec<InstructionId> {
        let mut ids = Vec::new();
        let mut cursor = self.first(block);

        while let Some(id) = cursor {
            ids.push(id);
            cursor = self.next(id);
        }

        ids
    }

    /// Instructions currently in `block`, in order
    pub fn instructions<'a>(
        &'a self,
        block: &Block,
    ) -> impl Iterator<Item = &'a Instruction> + use<'a> {
        self.ids(block).into_iter().map(|id| &self.instructions[id])
    }
}

impl core::ops::Index<InstructionId> for InstructionArena {
    type Output = Instruction;

    fn index(&self, index: InstructionId) -> &Self::Output {
        &self.instructions[index]
    }
}

impl core::ops::IndexMut<InstructionId> for InstructionArena {
    fn index_mut(&mut self, index: InstructionId) -> &mut Self::Output {
        &mut self.instructions[index]
    }
}

/// The K-normalized program before closure conversion. Functions are still
/// nested where they were defined.
#[derive(Debug)]
pub struct Module {
    pub arena: InstructionArena,
    pub entry: Block,
}

/// A function hoisted to the top level
#[derive(Debug, Clone)]
pub struct Toplevel {
    pub function: Function,
    pub span: Span,
}

/// The closure converted program. No block contains a `fun` instruction;
/// every function is in `toplevel`.
#[derive(Debug)]
pub struct Program {
    pub arena: InstructionArena,
    pub toplevel: BTreeMap<String, Toplevel>,
    /// Captured names of every function which needs a closure
    pub closures: BTreeMap<String, Vec<String>>,
    pub entry: Block,
}

impl Program {
    /// Checks what the code generator relies on: every live identifier and
    /// operand has a type, no function is left nested, and every closure
    /// call or allocation names a known closure. Panics on violation.
    pub fn verify(&self, environment: &TypeEnvironment) {
        for (name, toplevel) in &self.toplevel {
            assert!(
                environment.table.contains_key(name),
                "top-level function '{name}' has no type"
            );

            for parameter in &toplevel.function.parameters {
                assert!(
                    environment.table.contains_key(parameter),
                    "parameter '{parameter}' of '{name}' has no type"
                );
            }

            self.verify_block(&toplevel.function.body, environment);
        }

        self.verify_block(&self.entry, environment);
    }

    fn verify_block(&self, block: &Block, environment: &TypeEnvironment) {
        for instruction in self.arena.instructions(block) {
            let ident = &instruction.ident;

            assert!(
                environment.table.contains_key(ident),
                "'{ident}' in block '{}' has no type",
                block.name
            );

            for operand in instruction.value.operands() {
                assert!(
                    environment.table.contains_key(operand),
                    "operand '{operand}' of '{ident}' has no type"
                );
            }

            match &instruction.value {
                Value::Fun(_) => panic!("function '{ident}' was not hoisted"),
                Value::App {
                    callee,
                    kind: CallKind::Closure,
                    ..
                } if self.toplevel.contains_key(callee) => assert!(
                    self.closures.contains_key(callee),
                    "'{ident}' calls '{callee}' as a closure but it has none"
                ),
                Value::App {
                    callee,
                    kind: CallKind::Direct,
                    ..
                } => assert!(
                    self.toplevel.contains_key(callee) && !self.closures.contains_key(callee),
                    "'{ident}' calls '{callee}' directly but it is not a known function"
                ),
                Value::MakeClosure { captures, function } => assert_eq!(
                    self.closures.get(function),
                    Some(captures),
                    "closure of '{function}' captures different names than recorded"
                ),
                _ => {}
            }

            for child in instruction.value.blocks() {
                self.verify_block(child, environment);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idents(arena: &InstructionArena, block: &Block) -> Vec<String> {
        arena
            .instructions(block)
            .map(|instruction| instruction.ident.clone())
            .collect()
    }

    #[test]
    fn blocks_start_empty() {
        let mut arena = InstructionArena::new();
        let block = arena.new_block("program");

        assert_eq!(arena.first(&block), None);
        assert_eq!(arena.last(&block), None);
    }

    #[test]
    fn append_prepend_and_remove_keep_links_consistent() {
        let mut arena = InstructionArena::new();
        let block = arena.new_block("program");

        let b = arena.append(&block, "b", Value::Int(2), Span::default());
        let c = arena.append(&block, "c", Value::Int(3), Span::default());
        let a = arena.prepend(&block, "a", Value::Int(1), Span::default());
        assert_eq!(idents(&arena, &block), ["a", "b", "c"]);

        arena.remove(b);
        assert_eq!(idents(&arena, &block), ["a", "c"]);
        assert!(!arena.is_linked(b));
        assert_eq!(arena.next(a), Some(c));
        assert_eq!(arena.prev(c), Some(a));

        arena.remove(a);
        arena.remove(c);
        assert_eq!(arena.first(&block), None);

        arena.append(&block, "d", Value::Unit, Span::default());
        assert_eq!(idents(&arena, &block), ["d"]);
    }

    #[test]
    #[should_panic(expected = "not linked")]
    fn removing_twice_is_a_bug() {
        let mut arena = InstructionArena::new();
        let block = arena.new_block("program");
        let a = arena.append(&block, "a", Value::Unit, Span::default());

        arena.remove(a);
        arena.remove(a);
    }

    #[test]
    fn external_callees_are_not_operands() {
        let mut app = Value::App {
            callee: "f".to_owned(),
            arguments: vec!["x".to_owned(), "y".to_owned()],
            kind: CallKind::Direct,
        };
        assert_eq!(app.operands(), ["f", "x", "y"]);

        if let Value::App { kind, .. } = &mut app {
            *kind = CallKind::External;
        }
        assert_eq!(app.operands(), ["x", "y"]);

        for operand in app.operands_mut() {
            operand.push('!');
        }
        assert_eq!(app.operands(), ["x!", "y!"]);
    }
}

use std::{
    collections::{BTreeMap, BTreeSet},
    str::FromStr,
};

use itertools::Itertools;

use crate::{
    error::{CompileError, ErrorKind, report_error},
    frontend::{
        Span,
        ast::{
            Binder, ConstructorKind, Expression, ExpressionKind, FunctionDefinition, Identifier,
            NodeId, PrimitiveKind, Program, Type, TypeKind,
        },
        intern::InternedSymbol,
    },
    index::{IndexVec, simple_index},
};

simple_index! {
    /// Identifies one binding site in the program
    pub struct SymbolId;
}

/// A single binding after alpha renaming
#[derive(Debug, Clone)]
pub struct Symbol {
    /// The name as written in the source
    pub display_name: InternedSymbol,
    /// Globally unique name of the form `<display>$<counter>`
    pub name: String,
    pub span: Span,
    /// `_` binders are given a name so their value can still be lowered, but
    /// they are never put in scope
    pub is_wildcard: bool,
}

/// A resolved value name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueNameResolution {
    /// Bound somewhere in the program
    Local(SymbolId),
    /// Not bound anywhere, so it must be provided by the runtime or an
    /// `external` declaration
    External(InternedSymbol),
}

/// A resolved type name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeNameResolution {
    Primitive(PrimitiveKind),
    Constructor(ConstructorKind),
    /// Index into [`Program::type_aliases`]
    Alias(usize),
}

/// A map between AST identifier nodes and the symbols they bind or refer to
#[derive(Debug, Default)]
pub struct ResolutionMap {
    pub symbols: IndexVec<SymbolId, Symbol>,
    /// Maps the identifier of every binder (let, parameter, tuple element,
    /// match arm, function name) to the symbol it introduces
    pub bindings: BTreeMap<NodeId, SymbolId>,
    /// Maps the identifier of every variable expression to its binder
    pub value_name_resolutions: BTreeMap<NodeId, ValueNameResolution>,
    /// Maps the identifier of every named type to its definition
    pub type_name_resolutions: BTreeMap<NodeId, TypeNameResolution>,
    /// Names referenced without being bound or declared
    pub undeclared_externals: BTreeSet<InternedSymbol>,
}

impl ResolutionMap {
    /// The symbol introduced by a binder identifier. Every binder is visited
    /// by the resolver, so a miss is a compiler bug.
    pub fn binding(&self, identifier: &Identifier) -> SymbolId {
        *self.bindings.get(&identifier.id).unwrap_or_else(|| {
            panic!(
                "binder '{}' ({:?}) was never registered by name resolution",
                identifier.symbol, identifier.id
            )
        })
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn resolution(&self, identifier: &Identifier) -> ValueNameResolution {
        *self
            .value_name_resolutions
            .get(&identifier.id)
            .unwrap_or_else(|| {
                panic!(
                    "reference to '{}' ({:?}) was never resolved",
                    identifier.symbol, identifier.id
                )
            })
    }

    pub fn type_resolution(&self, identifier: &Identifier) -> TypeNameResolution {
        *self
            .type_name_resolutions
            .get(&identifier.id)
            .unwrap_or_else(|| panic!("type name '{}' was never resolved", identifier.symbol))
    }

    /// Every unique name in binding order, then the undeclared externals
    pub fn dump(&self) -> String {
        let symbols = self.symbols.iter().map(|symbol| symbol.name.clone());
        let externals = self
            .undeclared_externals
            .iter()
            .map(|external| format!("extern {external}"));

        symbols.chain(externals).join("\n")
    }
}

/// Alpha renamer
///
/// Walks the program once, giving every binding a unique name and linking
/// every variable reference to its binder. References which are not bound
/// anywhere are classified as externals rather than reported.
#[derive(Debug)]
pub struct Resolver<'ast> {
    program: &'ast Program,
    value_scope_stack: ScopeStack<SymbolId>,
    /// Aliases declared so far, in declaration order
    aliases: BTreeMap<InternedSymbol, usize>,
    resolutions: ResolutionMap,
}

impl<'ast> Resolver<'ast> {
    /// Resolves all names within a program in 2 steps.
    ///
    /// The first step checks the declarations: type aliases (each may only
    /// refer to aliases declared before it) and external function signatures.
    ///
    /// The second step traverses the root expression with a stack of lexical
    /// scopes, creating a symbol for every binder and resolving every
    /// variable reference against the innermost enclosing binding.
    pub fn resolve_names(program: &'ast Program) -> Result<ResolutionMap, CompileError> {
        let mut resolver = Self {
            program,
            value_scope_stack: ScopeStack::new(),
            aliases: BTreeMap::new(),
            resolutions: ResolutionMap::default(),
        };

        resolver.bind_type_aliases()?;
        resolver.check_externals()?;
        resolver.resolve_expression(&program.body)?;

        log::debug!(
            "resolved {} bindings and {} references ({} undeclared externals)",
            resolver.resolutions.symbols.len(),
            resolver.resolutions.value_name_resolutions.len(),
            resolver.resolutions.undeclared_externals.len()
        );

        Ok(resolver.resolutions)
    }

    fn bind_type_aliases(&mut self) -> Result<(), CompileError> {
        for (index, alias) in self.program.type_aliases.iter().enumerate() {
            self.resolve_type(&alias.ty)?;

            if self.aliases.contains_key(&alias.name.symbol)
                || PrimitiveKind::from_str(alias.name.symbol.value()).is_ok()
            {
                return Err(report_error!(
                    ErrorKind::DuplicateSymbol {
                        name: alias.name.symbol.to_string()
                    },
                    alias.name.span
                ));
            }

            self.aliases.insert(alias.name.symbol, index);
        }

        Ok(())
    }

    fn check_externals(&mut self) -> Result<(), CompileError> {
        let mut declared = BTreeSet::new();

        for external in &self.program.externals {
            self.resolve_type(&external.ty)?;

            if !declared.insert(external.name.symbol) {
                return Err(report_error!(
                    ErrorKind::DuplicateSymbol {
                        name: external.name.symbol.to_string()
                    },
                    external.name.span
                ));
            }
        }

        Ok(())
    }

    /// Creates the symbol for a binder. Wildcards get a symbol too but are
    /// never bound in the scope.
    fn declare(&mut self, identifier: &Identifier) -> Result<SymbolId, CompileError> {
        let is_wildcard = identifier.symbol.is_wildcard();

        if !is_wildcard
            && self
                .value_scope_stack
                .get_shallow_binding(identifier.symbol)
                .is_some()
        {
            return Err(report_error!(
                ErrorKind::DuplicateSymbol {
                    name: identifier.symbol.to_string()
                },
                identifier.span
            ));
        }

        let counter = self.resolutions.symbols.len() + 1;
        let id = self.resolutions.symbols.push(Symbol {
            display_name: identifier.symbol,
            name: format!("{}${counter}", identifier.symbol),
            span: identifier.span,
            is_wildcard,
        });

        self.resolutions.bindings.insert(identifier.id, id);

        if !is_wildcard {
            self.value_scope_stack
                .add_shallow_binding(identifier.symbol, id);
        }

        Ok(id)
    }

    fn declare_binder(&mut self, binder: &Binder) -> Result<SymbolId, CompileError> {
        if let Some(ty) = &binder.ty {
            self.resolve_type(ty)?;
        }

        self.declare(&binder.name)
    }

    fn resolve_type(&mut self, ty: &Type) -> Result<(), CompileError> {
        match &ty.kind {
            TypeKind::Infer => {}
            TypeKind::Named(name) => {
                let resolution = if let Ok(primitive) = PrimitiveKind::from_str(name.symbol.value())
                {
                    TypeNameResolution::Primitive(primitive)
                } else if let Some(index) = self.aliases.get(&name.symbol) {
                    TypeNameResolution::Alias(*index)
                } else {
                    return Err(report_error!(
                        ErrorKind::UnknownType {
                            name: name.symbol.to_string()
                        },
                        name.span
                    ));
                };

                self.resolutions
                    .type_name_resolutions
                    .insert(name.id, resolution);
            }
            TypeKind::Constructor { name, arguments } => {
                let constructor = ConstructorKind::from_str(name.symbol.value())
                    .ok()
                    .filter(|_| arguments.len() == 1)
                    .ok_or_else(|| {
                        report_error!(
                            ErrorKind::UnknownType {
                                name: format!("{} (with {} arguments)", name.symbol, arguments.len())
                            },
                            name.span
                        )
                    })?;

                self.resolutions
                    .type_name_resolutions
                    .insert(name.id, TypeNameResolution::Constructor(constructor));

                for argument in arguments {
                    self.resolve_type(argument)?;
                }
            }
            TypeKind::Tuple(elements) => {
                for element in elements {
                    self.resolve_type(element)?;
                }
            }
            TypeKind::Function {
                parameters,
                return_type,
            } => {
                for parameter in parameters {
                    self.resolve_type(parameter)?;
                }

                self.resolve_type(return_type)?;
            }
        }

        Ok(())
    }

    fn resolve_function_definition(
        &mut self,
        function: &FunctionDefinition,
    ) -> Result<(), CompileError> {
        // Parameters live in a scope inside the one holding the function
        // name, so they may shadow it
        self.value_scope_stack.push_shallow_scope();

        for parameter in &function.parameters {
            self.declare_binder(parameter)?;
        }

        if let Some(return_type) = &function.return_type {
            self.resolve_type(return_type)?;
        }

        self.resolve_expression(&function.body)?;

        self.value_scope_stack.pop_shallow_scope();
        Ok(())
    }

    fn resolve_expression(&mut self, expression: &Expression) -> Result<(), CompileError> {
        match &expression.kind {
            ExpressionKind::Unit
            | ExpressionKind::Bool(_)
            | ExpressionKind::Int(_)
            | ExpressionKind::Float(_)
            | ExpressionKind::String(_)
            | ExpressionKind::None => {}
            ExpressionKind::Variable(identifier) => self.resolve_identifier(identifier)?,
            ExpressionKind::Unary { operand, .. } => self.resolve_expression(operand)?,
            ExpressionKind::Binary { lhs, rhs, .. } => {
                self.resolve_expression(lhs)?;
                self.resolve_expression(rhs)?;
            }
            ExpressionKind::If {
                condition,
                positive,
                negative,
            } => {
                self.resolve_expression(condition)?;
                self.resolve_expression(positive)?;
                self.resolve_expression(negative)?;
            }
            ExpressionKind::Let {
                binder,
                bound,
                body,
            } => {
                // The bound expression does not see the new binding
                self.resolve_expression(bound)?;

                self.value_scope_stack.push_shallow_scope();
                self.declare_binder(binder)?;
                self.resolve_expression(body)?;
                self.value_scope_stack.pop_shallow_scope();
            }
            ExpressionKind::LetRec { function, body } => {
                self.value_scope_stack.push_shallow_scope();
                self.declare(&function.name)?;
                self.resolve_function_definition(function)?;
                self.resolve_expression(body)?;
                self.value_scope_stack.pop_shallow_scope();
            }
            ExpressionKind::LetTuple {
                binders,
                bound,
                body,
            } => {
                self.resolve_expression(bound)?;

                self.value_scope_stack.push_shallow_scope();
                for binder in binders {
                    self.declare_binder(binder)?;
                }
                self.resolve_expression(body)?;
                self.value_scope_stack.pop_shallow_scope();
            }
            ExpressionKind::Apply { callee, arguments } => {
                self.resolve_expression(callee)?;

                for argument in arguments {
                    self.resolve_expression(argument)?;
                }
            }
            ExpressionKind::Tuple(elements) | ExpressionKind::ArrayLiteral(elements) => {
                for element in elements {
                    self.resolve_expression(element)?;
                }
            }
            ExpressionKind::ArrayMake { size, element } => {
                self.resolve_expression(size)?;
                self.resolve_expression(element)?;
            }
            ExpressionKind::ArrayLength(inner) | ExpressionKind::Some(inner) => {
                self.resolve_expression(inner)?
            }
            ExpressionKind::ArrayGet { array, index } => {
                self.resolve_expression(array)?;
                self.resolve_expression(index)?;
            }
            ExpressionKind::ArrayPut {
                array,
                index,
                value,
            } => {
                self.resolve_expression(array)?;
                self.resolve_expression(index)?;
                self.resolve_expression(value)?;
            }
            ExpressionKind::Match {
                target,
                binder,
                some_arm,
                none_arm,
            } => {
                self.resolve_expression(target)?;

                self.value_scope_stack.push_shallow_scope();
                self.declare_binder(binder)?;
                self.resolve_expression(some_arm)?;
                self.value_scope_stack.pop_shallow_scope();

                self.resolve_expression(none_arm)?;
            }
            ExpressionKind::Typed { child, ty } => {
                self.resolve_expression(child)?;
                self.resolve_type(ty)?;
            }
        }

        Ok(())
    }

    /// Resolves a value identifier (within an expression)
    fn resolve_identifier(&mut self, identifier: &Identifier) -> Result<(), CompileError> {
        if identifier.symbol.is_wildcard() {
            return Err(report_error!(
                ErrorKind::UndeclaredWildcardUse,
                identifier.span
            ));
        }

        let resolution = match self.value_scope_stack.get_binding(identifier.symbol) {
            Some(id) => ValueNameResolution::Local(*id),
            None => {
                self.resolutions
                    .undeclared_externals
                    .insert(identifier.symbol);
                ValueNameResolution::External(identifier.symbol)
            }
        };

        self.resolutions
            .value_name_resolutions
            .insert(identifier.id, resolution);
        Ok(())
    }
}

/// A data structure to assist in traversing nested lexical scopes
#[derive(Debug)]
struct ScopeStack<R> {
    stack: Vec<BTreeMap<InternedSymbol, R>>,
}

impl<R> ScopeStack<R> {
    fn new() -> Self {
        Self { stack: Vec::new() }
    }

    fn push_shallow_scope(&mut self) {
        self.stack.push(BTreeMap::new());
    }

    fn pop_shallow_scope(&mut self) {
        assert!(
            self.stack.pop().is_some(),
            "Attempted to pop a scope which was never pushed"
        );
    }

    /// Looks for a binding only within the current (most nested) scope
    fn get_shallow_binding(&self, symbol: InternedSymbol) -> Option<&R> {
        self.stack.last()?.get(&symbol)
    }

    /// Adds a binding only within the current (most nested) scope
    fn add_shallow_binding(&mut self, symbol: InternedSymbol, name_resolution: R) {
        let shallow_scope = self
            .stack
            .last_mut()
            .expect("Tried to add a binding without any scope pushed");

        shallow_scope.insert(symbol, name_resolution);
    }

    /// Traverses the scope stack from innermost to outermost looking for a
    /// binding
    fn get_binding(&self, symbol: InternedSymbol) -> Option<&R> {
        self.stack.iter().rev().find_map(|scope| scope.get(&symbol))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::frontend::ast::{BinaryOperatorKind, build::TreeBuilder, visit::Visitor};

    /// Collects the identifier of every variable expression, in tree order
    #[derive(Default)]
    struct References<'ast>(Vec<&'ast Identifier>);

    impl<'ast> Visitor<'ast> for References<'ast> {
        fn visit_expression(&mut self, expression: &'ast Expression) {
            if let ExpressionKind::Variable(identifier) = &expression.kind {
                self.0.push(identifier);
            }

            crate::frontend::ast::visit::walk_expression(self, expression)
        }
    }

    fn references(program: &Program) -> Vec<&Identifier> {
        let mut collector = References::default();
        collector.visit_expression(&program.body);
        collector.0
    }

    #[test]
    fn every_binding_gets_a_unique_name() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_in(
            "x",
            b.int(1),
            b.let_rec(
                "f",
                &["x", "y"],
                b.var("x"),
                b.let_tuple(&["x", "z"], b.tuple(vec![b.int(1), b.int(2)]), b.var("x")),
            ),
        ));

        let resolutions = Resolver::resolve_names(&program).unwrap();
        let names = resolutions
            .symbols
            .iter()
            .map(|s| s.name.as_str())
            .collect::<HashSet<_>>();

        assert_eq!(resolutions.symbols.len(), 6);
        assert_eq!(names.len(), 6);
        assert!(names.contains("x$1"));
        assert!(names.contains("f$2"));
    }

    #[test]
    fn inner_binding_shadows_outer() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_in("x", b.int(1), b.let_in("x", b.int(2), b.var("x"))));

        let resolutions = Resolver::resolve_names(&program).unwrap();

        let ExpressionKind::Let { binder: outer, body, .. } = &program.body.kind else {
            unreachable!()
        };
        let ExpressionKind::Let { binder: inner, .. } = &body.kind else {
            unreachable!()
        };

        let reference = references(&program)[0];
        assert_eq!(
            resolutions.resolution(reference),
            ValueNameResolution::Local(resolutions.binding(&inner.name))
        );
        assert_ne!(
            resolutions.symbol(resolutions.binding(&outer.name)).name,
            resolutions.symbol(resolutions.binding(&inner.name)).name
        );
    }

    #[test]
    fn let_bound_expression_sees_the_outer_binding() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_in(
            "x",
            b.int(1),
            b.let_in(
                "x",
                b.binary(BinaryOperatorKind::Add, b.var("x"), b.int(1)),
                b.var("x"),
            ),
        ));

        let resolutions = Resolver::resolve_names(&program).unwrap();
        let refs = references(&program);

        assert_eq!(
            resolutions.resolution(refs[0]),
            ValueNameResolution::Local(SymbolId(0))
        );
        assert_eq!(
            resolutions.resolution(refs[1]),
            ValueNameResolution::Local(SymbolId(1))
        );
    }

    #[test]
    fn recursive_function_sees_itself_and_parameters_shadow_it() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_rec(
            "f",
            &["x"],
            b.call("f", vec![b.var("x")]),
            b.let_rec("g", &["g"], b.var("g"), b.call("f", vec![b.int(1)])),
        ));

        let resolutions = Resolver::resolve_names(&program).unwrap();
        let refs = references(&program);
        let by_name = |id: ValueNameResolution| match id {
            ValueNameResolution::Local(id) => resolutions.symbol(id).name.clone(),
            ValueNameResolution::External(symbol) => symbol.to_string(),
        };

        let resolved = refs
            .iter()
            .map(|r| by_name(resolutions.resolution(r)))
            .collect::<Vec<_>>();

        assert_eq!(resolved, ["f$1", "x$2", "g$4", "f$1"]);
    }

    #[test]
    fn unbound_names_become_externals() {
        let b = TreeBuilder::new();
        let program = b.program(b.call("print_int", vec![b.int(42)]));

        let resolutions = Resolver::resolve_names(&program).unwrap();

        assert_eq!(
            resolutions.resolution(references(&program)[0]),
            ValueNameResolution::External(InternedSymbol::new("print_int"))
        );
        assert!(
            resolutions
                .undeclared_externals
                .contains(&InternedSymbol::new("print_int"))
        );
    }

    #[test]
    fn duplicate_parameters_are_rejected() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_rec("f", &["a", "b", "a"], b.unit(), b.unit()));

        let error = Resolver::resolve_names(&program).unwrap_err();

        assert_eq!(
            error.kind,
            ErrorKind::DuplicateSymbol {
                name: "a".to_owned()
            }
        );
    }

    #[test]
    fn duplicate_tuple_elements_are_rejected() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_tuple(
            &["p", "p"],
            b.tuple(vec![b.int(1), b.int(2)]),
            b.unit(),
        ));

        let error = Resolver::resolve_names(&program).unwrap_err();

        assert_eq!(
            error.kind,
            ErrorKind::DuplicateSymbol {
                name: "p".to_owned()
            }
        );
    }

    #[test]
    fn wildcards_are_named_but_never_bound() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_tuple(
            &["_", "_"],
            b.tuple(vec![b.int(1), b.int(2)]),
            b.unit(),
        ));

        let resolutions = Resolver::resolve_names(&program).unwrap();

        assert!(resolutions.symbols.iter().all(|s| s.is_wildcard));
        assert_eq!(resolutions.symbols[SymbolId(1)].name, "_$2");

        let b = TreeBuilder::new();
        let program = b.program(b.sequence(b.unit(), b.var("_")));

        assert_eq!(
            Resolver::resolve_names(&program).unwrap_err().kind,
            ErrorKind::UndeclaredWildcardUse
        );
    }

    #[test]
    fn type_names_resolve_to_primitives_constructors_and_aliases() {
        let b = TreeBuilder::new();
        let mut program = b.program(b.typed(
            b.array_literal(vec![]),
            b.ty_constructor("array", vec![b.ty_named("point")]),
        ));
        program.type_aliases.push(b.type_alias(
            "point",
            b.ty_tuple(vec![b.ty_named("int"), b.ty_named("float")]),
        ));

        let resolutions = Resolver::resolve_names(&program).unwrap();
        let mut kinds = resolutions
            .type_name_resolutions
            .values()
            .copied()
            .collect::<Vec<_>>();
        kinds.sort_by_key(|k| format!("{k:?}"));

        assert_eq!(
            kinds,
            [
                TypeNameResolution::Alias(0),
                TypeNameResolution::Constructor(ConstructorKind::Array),
                TypeNameResolution::Primitive(PrimitiveKind::Float),
                TypeNameResolution::Primitive(PrimitiveKind::Int),
            ]
        );
    }

    #[test]
    fn unknown_type_names_are_rejected() {
        let b = TreeBuilder::new();
        let program = b.program(b.typed(b.int(1), b.ty_named("integer")));

        assert_eq!(
            Resolver::resolve_names(&program).unwrap_err().kind,
            ErrorKind::UnknownType {
                name: "integer".to_owned()
            }
        );
    }

    #[test]
    fn dump_lists_unique_names_then_externals() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_in(
            "x",
            b.int(1),
            b.let_rec("f", &["y"], b.var("y"), b.call("print_int", vec![b.var("x")])),
        ));

        let resolutions = Resolver::resolve_names(&program).unwrap();

        assert_eq!(resolutions.dump(), "x$1\nf$2\ny$3\nextern print_int");
    }

    #[test]
    fn duplicate_type_aliases_are_rejected() {
        let b = TreeBuilder::new();
        let mut program = b.program(b.unit());
        program
            .type_aliases
            .push(b.type_alias("point", b.ty_tuple(vec![b.ty_named("int"), b.ty_named("int")])));
        program
            .type_aliases
            .push(b.type_alias("point", b.ty_named("float")));

        assert_eq!(
            Resolver::resolve_names(&program).unwrap_err().kind,
            ErrorKind::DuplicateSymbol {
                name: "point".to_owned()
            }
        );
    }

    #[test]
    fn duplicate_externals_are_rejected() {
        let b = TreeBuilder::new();
        let mut program = b.program(b.unit());
        for c_name in ["sin", "cos"] {
            program.externals.push(b.external(
                "trig",
                b.ty_function(vec![b.ty_named("float")], b.ty_named("float")),
                c_name,
            ));
        }

        assert_eq!(
            Resolver::resolve_names(&program).unwrap_err().kind,
            ErrorKind::DuplicateSymbol {
                name: "trig".to_owned()
            }
        );
    }

    #[test]
    fn aliases_only_see_earlier_aliases() {
        let b = TreeBuilder::new();
        let mut program = b.program(b.unit());
        program
            .type_aliases
            .push(b.type_alias("pair", b.ty_tuple(vec![b.ty_named("id"), b.ty_named("id")])));
        program.type_aliases.push(b.type_alias("id", b.ty_named("int")));

        assert_eq!(
            Resolver::resolve_names(&program).unwrap_err().kind,
            ErrorKind::UnknownType {
                name: "id".to_owned()
            }
        );
    }
}

//! Type Checker
//!
//! Type checking a program has 2 main components:
//!
//!   1) inference: a single pass over the tree which assigns every node a
//!      type, unifying types immediately wherever two of them must agree.
//!      Unification variables live in an arena in the [`TypeContext`] and
//!      are linked to their solution in place. Every variable carries the
//!      let-depth (level) it was created at, so that once a let-binding's
//!      bound expression has been inferred, the variables which belong only
//!      to that expression can be told apart from those shared with the
//!      enclosing scope and generalized into a polymorphic type scheme.
//!   2) dereferencing: once the whole program has been inferred, every
//!      recorded type is rewritten without links. A variable which is still
//!      unlinked at that point and was never generalized is an error, except
//!      for a few positions where the value can never be observed.
//!
//! After dereferencing, comparisons are checked against the operand types
//! since unification cannot express "one of these shapes" as a constraint.
//! From there, the [`TypeEnvironment`] is handed to MIR construction and on
//! to code generation.

use std::{collections::BTreeMap, rc::Rc};

use hashbrown::{HashMap, HashSet};
use ty::{Type, TypeKind, TypeVariable, TypeVariableId};

use crate::{
    config::Config,
    error::{CompileError, report_error},
    frontend::{
        Span,
        ast::{
            self, BinaryOperatorClass, Binder, ConstructorKind, Expression, ExpressionKind,
            FunctionDefinition, NodeId, PrimitiveKind, Program, UnaryOperatorKind,
        },
        intern::InternedSymbol,
    },
    index::IndexVec,
    middle::resolve::{ResolutionMap, SymbolId, TypeNameResolution, ValueNameResolution},
};

mod builtins;
mod deref;
pub mod ty;
mod unify;

/// Owns every type created during type checking
#[derive(Debug, Default)]
pub struct TypeContext {
    /// Type interning table to prevent duplicate types
    type_table: HashSet<Rc<TypeKind>>,
    /// Unification variable arena
    variables: IndexVec<TypeVariableId, TypeVariable>,
}

impl TypeContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A symbol the program uses without binding it
#[derive(Debug, Clone)]
pub struct External {
    pub ty: Type,
    /// Symbol name the code generator should link against
    pub c_name: String,
}

/// One use of a polymorphic binding at concrete types
#[derive(Debug, Clone)]
pub struct Instantiation {
    /// Unique name of the instantiated binding
    pub symbol: String,
    /// The binding's type scheme
    pub generic_type: Type,
    /// The type at this use site
    pub instance: Type,
    /// What each generic placeholder of the scheme became at this use site
    pub mapping: BTreeMap<TypeVariableId, Type>,
}

/// Typing results handed to the rest of the pipeline
#[derive(Debug, Default)]
pub struct TypeEnvironment {
    pub context: TypeContext,
    /// Type of every binding by unique name. MIR construction adds its
    /// temporaries here and later passes remove entries they delete.
    pub table: HashMap<String, Type>,
    /// Type of every expression node
    pub node_types: BTreeMap<NodeId, Type>,
    pub externals: BTreeMap<String, External>,
    /// Instantiation records, keyed by the referencing variable node
    pub instantiations: BTreeMap<NodeId, Instantiation>,
}

impl TypeEnvironment {
    /// Type of a binding or MIR identifier. Every live identifier has an
    /// entry, so a miss is a compiler bug.
    pub fn type_of(&self, name: &str) -> &Type {
        self.table
            .get(name)
            .unwrap_or_else(|| panic!("identifier '{name}' has no entry in the type table"))
    }

    pub fn node_type(&self, id: NodeId) -> &Type {
        self.node_types
            .get(&id)
            .unwrap_or_else(|| panic!("expression {id:?} was never assigned a type"))
    }

    /// Every concrete instantiation of the polymorphic binding `symbol`, in
    /// source order. This is what monomorphization duplicates bodies for.
    pub fn instantiations_of<'env>(
        &'env self,
        symbol: &'env str,
    ) -> impl Iterator<Item = &'env Instantiation> + 'env {
        self.instantiations
            .values()
            .filter(move |instantiation| instantiation.symbol == symbol)
    }

    /// `name : type` for every binding, sorted by name
    pub fn dump(&self) -> String {
        let mut entries = self
            .table
            .iter()
            .map(|(name, ty)| format!("{name} : {ty}"))
            .collect::<Vec<_>>();
        entries.sort();

        entries.join("\n")
    }
}

/// Inference state for one program
struct TypeInferrer<'ast, 'res> {
    program: &'ast Program,
    resolutions: &'res ResolutionMap,
    tcx: TypeContext,

    /// Type (scheme) of every symbol
    symbol_types: BTreeMap<SymbolId, Type>,
    node_types: BTreeMap<NodeId, Type>,
    externals: BTreeMap<InternedSymbol, External>,
    instantiations: BTreeMap<NodeId, Instantiation>,
    /// Element variables of `[||]` and `None` literals, and the variables
    /// they were instantiated to
    empty_literal_variables: HashSet<TypeVariableId>,
    /// Types of the declared aliases, in declaration order
    aliases: Vec<Type>,
}

impl<'ast, 'res> TypeInferrer<'ast, 'res> {
    fn new(program: &'ast Program, resolutions: &'res ResolutionMap) -> Self {
        Self {
            program,
            resolutions,
            tcx: TypeContext::new(),
            symbol_types: BTreeMap::new(),
            node_types: BTreeMap::new(),
            externals: BTreeMap::new(),
            instantiations: BTreeMap::new(),
            empty_literal_variables: HashSet::new(),
            aliases: Vec::new(),
        }
    }

    fn seed_builtins(&mut self) {
        for (name, ty) in self.tcx.builtin_signatures() {
            self.externals.insert(
                InternedSymbol::new(name),
                External {
                    ty,
                    c_name: name.to_owned(),
                },
            );
        }
    }

    fn bind_declarations(&mut self) {
        let program = self.program;

        for alias in &program.type_aliases {
            let ty = self.type_from_annotation(&alias.ty, 0);
            self.aliases.push(ty);
        }

        for external in &program.externals {
            let ty = self.type_from_annotation(&external.ty, 0);

            self.externals.insert(
                external.name.symbol,
                External {
                    ty,
                    c_name: external.c_name.clone(),
                },
            );
        }
    }

    fn infer_program(&mut self) -> Result<Type, CompileError> {
        self.bind_declarations();

        let program = self.program;
        self.infer(&program.body, 0)
    }

    /// Converts a written type annotation. `_` becomes a fresh variable.
    fn type_from_annotation(&mut self, ty: &ast::Type, level: u32) -> Type {
        match &ty.kind {
            ast::TypeKind::Infer => self.tcx.fresh_variable(level),
            ast::TypeKind::Named(name) => match self.resolutions.type_resolution(name) {
                TypeNameResolution::Primitive(primitive) => match primitive {
                    PrimitiveKind::Unit => self.tcx.unit(),
                    PrimitiveKind::Bool => self.tcx.bool(),
                    PrimitiveKind::Int => self.tcx.int(),
                    PrimitiveKind::Float => self.tcx.float(),
                    PrimitiveKind::String => self.tcx.string(),
                },
                TypeNameResolution::Alias(index) => self.aliases[index].clone(),
                TypeNameResolution::Constructor(_) => {
                    unreachable!("constructor '{}' used without an argument", name.symbol)
                }
            },
            ast::TypeKind::Constructor { name, arguments } => {
                let element = self.type_from_annotation(&arguments[0], level);

                match self.resolutions.type_resolution(name) {
                    TypeNameResolution::Constructor(ConstructorKind::Array) => {
                        self.tcx.array(element)
                    }
                    TypeNameResolution::Constructor(ConstructorKind::Option) => {
                        self.tcx.option(element)
                    }
                    other => unreachable!("{other:?} resolved as a type constructor"),
                }
            }
            ast::TypeKind::Tuple(elements) => {
                let elements = elements
                    .iter()
                    .map(|e| self.type_from_annotation(e, level))
                    .collect();

                self.tcx.tuple(elements)
            }
            ast::TypeKind::Function {
                parameters,
                return_type,
            } => {
                let parameters = parameters
                    .iter()
                    .map(|p| self.type_from_annotation(p, level))
                    .collect();
                let return_type = self.type_from_annotation(return_type, level);

                self.tcx.function(parameters, return_type)
            }
        }
    }

    fn unify(&mut self, left: &Type, right: &Type, span: Span) -> Result<(), CompileError> {
        self.tcx.unify(left, right).map_err(|error| {
            error
                .notes
                .into_iter()
                .fold(report_error!(error.kind, span), CompileError::with_note)
        })
    }

    /// Unifies a binder's annotation (if any) with the type it is bound to
    fn check_annotation(
        &mut self,
        binder: &Binder,
        ty: &Type,
        level: u32,
    ) -> Result<(), CompileError> {
        if let Some(annotation) = &binder.ty {
            let annotated = self.type_from_annotation(annotation, level);
            self.unify(&annotated, ty, binder.name.span)?;
        }

        Ok(())
    }

    /// Freezes every unlinked variable deeper than `level` into a generic
    /// placeholder
    fn generalize(&mut self, ty: &Type, level: u32) -> Type {
        Self::generalize_in(&mut self.tcx, ty, level)
    }

    fn generalize_in(tcx: &mut TypeContext, ty: &Type, level: u32) -> Type {
        let ty = tcx.resolve(ty);

        match &*ty {
            TypeKind::Variable(id) if tcx.variables[*id].level > level => {
                tcx.variables[*id].generalized = true;
                tcx.intern_type(TypeKind::Generic(*id))
            }
            _ => tcx.map_children(&ty, |tcx, child| Self::generalize_in(tcx, child, level)),
        }
    }

    /// Replaces every generic placeholder with a fresh variable, returning the
    /// mapping used
    fn instantiate(&mut self, scheme: &Type, level: u32) -> (Type, BTreeMap<TypeVariableId, Type>) {
        fn replace(
            tcx: &mut TypeContext,
            ty: &Type,
            level: u32,
            mapping: &mut BTreeMap<TypeVariableId, Type>,
        ) -> Type {
            match &**ty {
                TypeKind::Generic(id) => mapping
                    .entry(*id)
                    .or_insert_with(|| tcx.fresh_variable(level))
                    .clone(),
                _ => tcx.map_children(ty, |tcx, child| replace(tcx, child, level, mapping)),
            }
        }

        let mut mapping = BTreeMap::new();
        let instance = replace(&mut self.tcx, scheme, level, &mut mapping);

        (instance, mapping)
    }

    fn symbol_type(&self, id: SymbolId) -> Type {
        self.symbol_types.get(&id).cloned().unwrap_or_else(|| {
            panic!(
                "symbol '{}' referenced before it was typed",
                self.resolutions.symbol(id).name
            )
        })
    }

    fn infer_variable(
        &mut self,
        expression: &Expression,
        identifier: &ast::Identifier,
        level: u32,
    ) -> Type {
        let (name, scheme) = match self.resolutions.resolution(identifier) {
            ValueNameResolution::Local(id) => (
                self.resolutions.symbol(id).name.clone(),
                self.symbol_type(id),
            ),
            ValueNameResolution::External(symbol) => {
                let scheme = match self.externals.get(&symbol) {
                    Some(external) => external.ty.clone(),
                    None => {
                        // Only its uses can tell what an undeclared external is
                        let ty = self.tcx.fresh_variable(0);
                        self.externals.insert(
                            symbol,
                            External {
                                ty: ty.clone(),
                                c_name: symbol.to_string(),
                            },
                        );
                        ty
                    }
                };

                (symbol.to_string(), scheme)
            }
        };

        let scheme = self.tcx.resolve(&scheme);
        if !scheme.is_polymorphic() {
            return scheme;
        }

        let (instance, mapping) = self.instantiate(&scheme, level);

        for (generic, fresh) in &mapping {
            if let TypeKind::Variable(fresh) = &**fresh
                && self.empty_literal_variables.contains(generic)
            {
                self.empty_literal_variables.insert(*fresh);
            }
        }

        log::trace!(
            "instantiated '{name}' : {} as {}",
            scheme,
            self.tcx.display(&instance)
        );

        self.instantiations.insert(
            expression.id,
            Instantiation {
                symbol: name,
                generic_type: scheme,
                instance: instance.clone(),
                mapping,
            },
        );

        instance
    }

    fn infer_function_definition(
        &mut self,
        function: &FunctionDefinition,
        level: u32,
    ) -> Result<(), CompileError> {
        let inner = level + 1;

        let mut parameters = Vec::with_capacity(function.parameters.len());
        for parameter in &function.parameters {
            let ty = self.tcx.fresh_variable(inner);
            self.check_annotation(parameter, &ty, inner)?;

            self.symbol_types
                .insert(self.resolutions.binding(&parameter.name), ty.clone());
            parameters.push(ty);
        }

        let return_type = self.tcx.fresh_variable(inner);
        if let Some(annotation) = &function.return_type {
            let annotated = self.type_from_annotation(annotation, inner);
            self.unify(&annotated, &return_type, annotation.span)?;
        }

        // Monomorphic inside its own body
        let function_type = self.tcx.function(parameters, return_type.clone());
        let symbol = self.resolutions.binding(&function.name);
        self.symbol_types.insert(symbol, function_type.clone());

        let body = self.infer(&function.body, inner)?;
        self.unify(&return_type, &body, function.body.span)?;

        let scheme = self.generalize(&function_type, level);
        log::debug!(
            "inferred '{}' : {}",
            self.resolutions.symbol(symbol).name,
            scheme
        );
        self.symbol_types.insert(symbol, scheme);

        Ok(())
    }

    /// Infers the type of an expression and records it against the node
    fn infer(&mut self, expression: &Expression, level: u32) -> Result<Type, CompileError> {
        let span = expression.span;

        let ty = match &expression.kind {
            ExpressionKind::Unit => self.tcx.unit(),
            ExpressionKind::Bool(_) => self.tcx.bool(),
            ExpressionKind::Int(_) => self.tcx.int(),
            ExpressionKind::Float(_) => self.tcx.float(),
            ExpressionKind::String(_) => self.tcx.string(),
            ExpressionKind::Variable(identifier) => {
                self.infer_variable(expression, identifier, level)
            }
            ExpressionKind::Unary { operator, operand } => {
                let expected = match operator {
                    UnaryOperatorKind::Not => self.tcx.bool(),
                    UnaryOperatorKind::Negate => self.tcx.int(),
                    UnaryOperatorKind::FloatNegate => self.tcx.float(),
                };

                let operand_type = self.infer(operand, level)?;
                self.unify(&expected, &operand_type, operand.span)?;
                expected
            }
            ExpressionKind::Binary { operator, lhs, rhs } => {
                let lhs_type = self.infer(lhs, level)?;
                let rhs_type = self.infer(rhs, level)?;

                let operand = match operator.class() {
                    BinaryOperatorClass::IntArithmetic => Some(self.tcx.int()),
                    BinaryOperatorClass::FloatArithmetic => Some(self.tcx.float()),
                    BinaryOperatorClass::Logical => Some(self.tcx.bool()),
                    BinaryOperatorClass::Ordering | BinaryOperatorClass::Equality => None,
                };

                match operand {
                    Some(operand) => {
                        self.unify(&operand, &lhs_type, lhs.span)?;
                        self.unify(&operand, &rhs_type, rhs.span)?;
                        operand
                    }
                    // Operand shapes are checked after dereferencing
                    None => {
                        self.unify(&lhs_type, &rhs_type, span)?;
                        self.tcx.bool()
                    }
                }
            }
            ExpressionKind::If {
                condition,
                positive,
                negative,
            } => {
                let condition_type = self.infer(condition, level)?;
                let bool = self.tcx.bool();
                self.unify(&bool, &condition_type, condition.span)?;

                let positive_type = self.infer(positive, level)?;
                let negative_type = self.infer(negative, level)?;
                self.unify(&positive_type, &negative_type, span)?;

                positive_type
            }
            ExpressionKind::Let {
                binder,
                bound,
                body,
            } => {
                let bound_type = self.infer(bound, level + 1)?;
                self.check_annotation(binder, &bound_type, level + 1)?;

                let scheme = self.generalize(&bound_type, level);
                self.symbol_types
                    .insert(self.resolutions.binding(&binder.name), scheme);

                self.infer(body, level)?
            }
            ExpressionKind::LetRec { function, body } => {
                self.infer_function_definition(function, level)?;
                self.infer(body, level)?
            }
            ExpressionKind::LetTuple {
                binders,
                bound,
                body,
            } => {
                let bound_type = self.infer(bound, level + 1)?;

                let elements = binders
                    .iter()
                    .map(|_| self.tcx.fresh_variable(level + 1))
                    .collect::<Vec<_>>();
                let tuple = self.tcx.tuple(elements.clone());

                // Elements must be solved by the bound value before any of
                // them is generalized
                self.unify(&bound_type, &tuple, bound.span)?;

                for (binder, element) in binders.iter().zip(elements) {
                    self.check_annotation(binder, &element, level + 1)?;

                    let scheme = self.generalize(&element, level);
                    self.symbol_types
                        .insert(self.resolutions.binding(&binder.name), scheme);
                }

                self.infer(body, level)?
            }
            ExpressionKind::Apply { callee, arguments } => {
                let callee_type = self.infer(callee, level)?;

                let mut argument_types = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    argument_types.push(self.infer(argument, level)?);
                }

                let return_type = self.tcx.fresh_variable(level);
                let expected = self.tcx.function(argument_types, return_type.clone());
                self.unify(&callee_type, &expected, span)?;

                return_type
            }
            ExpressionKind::Tuple(elements) => {
                let mut element_types = Vec::with_capacity(elements.len());
                for element in elements {
                    element_types.push(self.infer(element, level)?);
                }

                self.tcx.tuple(element_types)
            }
            ExpressionKind::ArrayMake { size, element } => {
                let size_type = self.infer(size, level)?;
                let int = self.tcx.int();
                self.unify(&int, &size_type, size.span)?;

                let element_type = self.infer(element, level)?;
                self.tcx.array(element_type)
            }
            ExpressionKind::ArrayLiteral(elements) => {
                let element_type = match elements.split_first() {
                    Some((first, rest)) => {
                        let first_type = self.infer(first, level)?;

                        for element in rest {
                            let element_type = self.infer(element, level)?;
                            self.unify(&first_type, &element_type, element.span)?;
                        }

                        first_type
                    }
                    None => self.empty_literal_variable(level),
                };

                self.tcx.array(element_type)
            }
            ExpressionKind::ArrayLength(array) => {
                let array_type = self.infer(array, level)?;
                let element = self.tcx.fresh_variable(level);
                let expected = self.tcx.array(element);
                self.unify(&expected, &array_type, array.span)?;

                self.tcx.int()
            }
            ExpressionKind::ArrayGet { array, index } => {
                self.infer_array_access(array, index, level)?
            }
            ExpressionKind::ArrayPut {
                array,
                index,
                value,
            } => {
                let element = self.infer_array_access(array, index, level)?;

                let value_type = self.infer(value, level)?;
                self.unify(&element, &value_type, value.span)?;

                self.tcx.unit()
            }
            ExpressionKind::Some(element) => {
                let element_type = self.infer(element, level)?;
                self.tcx.option(element_type)
            }
            ExpressionKind::None => {
                let element = self.empty_literal_variable(level);
                self.tcx.option(element)
            }
            ExpressionKind::Match {
                target,
                binder,
                some_arm,
                none_arm,
            } => {
                let target_type = self.infer(target, level)?;
                let element = self.tcx.fresh_variable(level);
                let expected = self.tcx.option(element.clone());
                self.unify(&expected, &target_type, target.span)?;

                self.check_annotation(binder, &element, level)?;
                self.symbol_types
                    .insert(self.resolutions.binding(&binder.name), element);

                let some_type = self.infer(some_arm, level)?;
                let none_type = self.infer(none_arm, level)?;
                self.unify(&some_type, &none_type, span)?;

                some_type
            }
            ExpressionKind::Typed { child, ty } => {
                let child_type = self.infer(child, level)?;
                let annotated = self.type_from_annotation(ty, level);
                self.unify(&annotated, &child_type, span)?;

                child_type
            }
        };

        self.node_types.insert(expression.id, ty.clone());
        Ok(ty)
    }

    fn infer_array_access(
        &mut self,
        array: &Expression,
        index: &Expression,
        level: u32,
    ) -> Result<Type, CompileError> {
        let array_type = self.infer(array, level)?;
        let element = self.tcx.fresh_variable(level);
        let expected = self.tcx.array(element.clone());
        self.unify(&expected, &array_type, array.span)?;

        let index_type = self.infer(index, level)?;
        let int = self.tcx.int();
        self.unify(&int, &index_type, index.span)?;

        Ok(element)
    }

    fn empty_literal_variable(&mut self, level: u32) -> Type {
        let ty = self.tcx.fresh_variable(level);

        if let TypeKind::Variable(id) = &*ty {
            self.empty_literal_variables.insert(*id);
        }

        ty
    }
}

/// Infers and dereferences the types of a whole program, then checks that
/// comparisons are applied to comparable types
pub fn type_check(
    program: &Program,
    resolutions: &ResolutionMap,
    config: &Config,
) -> Result<TypeEnvironment, CompileError> {
    let mut inferrer = TypeInferrer::new(program, resolutions);

    if config.seed_builtins {
        inferrer.seed_builtins();
    }

    let root = inferrer.infer_program()?;
    log::debug!("root expression : {}", inferrer.tcx.display(&root));

    let environment = deref::Dereferencer::run(inferrer)?;
    deref::ComparisonChecker::check(program, &environment)?;

    Ok(environment)
}

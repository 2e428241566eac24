use std::collections::BTreeMap;

use hashbrown::HashMap;

use super::{
    External, Instantiation, TypeContext, TypeEnvironment, TypeInferrer,
    ty::{Type, TypeKind},
};
use crate::{
    error::{CompileError, ErrorKind, report_error},
    frontend::{
        Span,
        ast::{
            BinaryOperatorClass, Binder, Expression, ExpressionKind, FunctionDefinition, NodeId,
            Program,
            visit::{self, Visitor},
        },
    },
    middle::resolve::{ResolutionMap, SymbolId},
};

/// Rewrites a type without links. Returns `None` if an unlinked variable
/// which was never generalized remains.
fn deref_type(tcx: &mut TypeContext, ty: &Type) -> Option<Type> {
    let mut resolved = true;
    let ty = deref_type_inner(tcx, ty, &mut resolved);

    resolved.then_some(ty)
}

fn deref_type_inner(tcx: &mut TypeContext, ty: &Type, resolved: &mut bool) -> Type {
    let ty = tcx.resolve(ty);

    match &*ty {
        TypeKind::Variable(id) if tcx.variables[*id].generalized => {
            tcx.intern_type(TypeKind::Generic(*id))
        }
        TypeKind::Variable(_) => {
            *resolved = false;
            ty
        }
        _ => tcx.map_children(&ty, |tcx, child| deref_type_inner(tcx, child, resolved)),
    }
}

/// Links every unlinked, ungeneralized variable in `ty` to unit
fn default_to_unit(tcx: &mut TypeContext, ty: &Type) {
    let ty = tcx.resolve(ty);

    match &*ty {
        TypeKind::Variable(id) if !tcx.variables[*id].generalized => {
            let unit = tcx.unit();
            tcx.variables[*id].link = Some(unit);
        }
        TypeKind::Function {
            parameters,
            return_type,
        } => {
            for parameter in parameters.iter() {
                default_to_unit(tcx, parameter);
            }

            default_to_unit(tcx, return_type);
        }
        TypeKind::Tuple(elements) => {
            for element in elements.iter() {
                default_to_unit(tcx, element);
            }
        }
        TypeKind::Array(element) | TypeKind::Option(element) => default_to_unit(tcx, element),
        _ => {}
    }
}

/// Resolves every type recorded during inference to its final form
pub(super) struct Dereferencer<'ast, 'res> {
    tcx: TypeContext,
    resolutions: &'res ResolutionMap,
    symbol_types: BTreeMap<SymbolId, Type>,
    node_types: BTreeMap<NodeId, Type>,
    table: HashMap<String, Type>,
    error: Option<CompileError>,
    program: &'ast Program,
}

impl<'ast, 'res> Dereferencer<'ast, 'res> {
    pub(super) fn run(inferrer: TypeInferrer<'ast, 'res>) -> Result<TypeEnvironment, CompileError> {
        let TypeInferrer {
            program,
            resolutions,
            mut tcx,
            symbol_types,
            node_types,
            externals,
            instantiations,
            empty_literal_variables,
            aliases: _,
        } = inferrer;

        // Values whose type can never be observed default to unit: the
        // element type of empty literals, discarded bindings and the result
        // of an external that is only ever called for its effect
        for id in empty_literal_variables {
            if tcx.variables[id].link.is_none() && !tcx.variables[id].generalized {
                let unit = tcx.unit();
                tcx.variables[id].link = Some(unit);
            }
        }

        for (symbol, ty) in &symbol_types {
            if resolutions.symbol(*symbol).is_wildcard {
                default_to_unit(&mut tcx, ty);
            }
        }

        for external in externals.values() {
            if let TypeKind::Function { return_type, .. } = &*tcx.resolve(&external.ty) {
                let return_type = tcx.resolve(return_type);

                if let TypeKind::Variable(id) = &*return_type
                    && !tcx.variables[*id].generalized
                {
                    let unit = tcx.unit();
                    tcx.variables[*id].link = Some(unit);
                }
            }
        }

        let mut dereferencer = Self {
            tcx,
            resolutions,
            symbol_types,
            node_types,
            table: HashMap::new(),
            error: None,
            program,
        };

        dereferencer.visit_expression(&program.body);

        if let Some(error) = dereferencer.error {
            return Err(error);
        }

        let externals = dereferencer.deref_externals(externals)?;
        let instantiations = dereferencer.deref_instantiations(instantiations);

        log::debug!(
            "dereferenced {} bindings, {} nodes and {} instantiations",
            dereferencer.table.len(),
            dereferencer.node_types.len(),
            instantiations.len()
        );

        Ok(TypeEnvironment {
            context: dereferencer.tcx,
            table: dereferencer.table,
            node_types: dereferencer.node_types,
            externals,
            instantiations,
        })
    }

    fn cannot_infer(&mut self, what: String, ty: &Type, span: Span) -> CompileError {
        report_error!(
            ErrorKind::CannotInfer {
                what,
                ty: self.tcx.display(ty),
            },
            span
        )
    }

    fn deref_node(&mut self, id: NodeId, span: Span) {
        let ty = self
            .node_types
            .get(&id)
            .cloned()
            .unwrap_or_else(|| panic!("expression {id:?} was never assigned a type"));

        match deref_type(&mut self.tcx, &ty) {
            Some(resolved) => {
                self.node_types.insert(id, resolved);
            }
            None => {
                let error = self.cannot_infer("this expression".to_owned(), &ty, span);
                self.error = Some(error);
            }
        }
    }

    fn deref_symbol(&mut self, symbol: SymbolId) {
        let resolutions = self.resolutions;
        let ty = self.symbol_types[&symbol].clone();
        let symbol = resolutions.symbol(symbol);

        match deref_type(&mut self.tcx, &ty) {
            Some(resolved) => {
                self.table.insert(symbol.name.clone(), resolved);
            }
            None => {
                let error = self.cannot_infer(
                    format!("'{}'", symbol.display_name),
                    &ty,
                    symbol.span,
                );
                self.error = Some(error);
            }
        }
    }

    fn deref_externals(
        &mut self,
        externals: BTreeMap<crate::frontend::intern::InternedSymbol, External>,
    ) -> Result<BTreeMap<String, External>, CompileError> {
        let mut resolved_externals = BTreeMap::new();

        for (name, external) in externals {
            let Some(ty) = deref_type(&mut self.tcx, &external.ty) else {
                let span = self
                    .program
                    .externals
                    .iter()
                    .find(|declaration| declaration.name.symbol == name)
                    .map(|declaration| declaration.span)
                    .unwrap_or_default();

                return Err(self.cannot_infer(format!("external '{name}'"), &external.ty, span));
            };

            resolved_externals.insert(
                name.to_string(),
                External {
                    ty,
                    c_name: external.c_name,
                },
            );
        }

        Ok(resolved_externals)
    }

    /// Every instantiated variable also appears in the type of the
    /// referencing node, which has already been checked
    fn deref_instantiations(
        &mut self,
        instantiations: BTreeMap<NodeId, Instantiation>,
    ) -> BTreeMap<NodeId, Instantiation> {
        fn deref(tcx: &mut TypeContext, ty: &Type) -> Type {
            deref_type(tcx, ty).unwrap_or_else(|| {
                panic!("instantiated type {ty:?} is unresolved but its node was not")
            })
        }

        instantiations
            .into_iter()
            .map(|(id, instantiation)| {
                let mapping = instantiation
                    .mapping
                    .iter()
                    .map(|(generic, ty)| (*generic, deref(&mut self.tcx, ty)))
                    .collect();

                let instantiation = Instantiation {
                    instance: deref(&mut self.tcx, &instantiation.instance),
                    generic_type: deref(&mut self.tcx, &instantiation.generic_type),
                    mapping,
                    symbol: instantiation.symbol,
                };

                (id, instantiation)
            })
            .collect()
    }
}

impl<'ast> Visitor<'ast> for Dereferencer<'_, '_> {
    fn visit_binder(&mut self, binder: &'ast Binder) {
        if self.error.is_none() {
            let symbol = self.resolutions.binding(&binder.name);
            self.deref_symbol(symbol);
        }
    }

    fn visit_function_definition(&mut self, function: &'ast FunctionDefinition) {
        visit::walk_function_definition(self, function);

        if self.error.is_none() {
            let symbol = self.resolutions.binding(&function.name);
            self.deref_symbol(symbol);
        }
    }

    fn visit_expression(&mut self, expression: &'ast Expression) {
        visit::walk_expression(self, expression);

        if self.error.is_none() {
            self.deref_node(expression.id, expression.span);
        }
    }
}

/// Rejects comparisons between values the runtime can't compare
pub(super) struct ComparisonChecker<'env> {
    environment: &'env TypeEnvironment,
    error: Option<CompileError>,
}

impl<'env> ComparisonChecker<'env> {
    pub(super) fn check(
        program: &Program,
        environment: &'env TypeEnvironment,
    ) -> Result<(), CompileError> {
        let mut checker = Self {
            environment,
            error: None,
        };

        visit::walk_program(&mut checker, program);

        match checker.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl<'ast> Visitor<'ast> for ComparisonChecker<'_> {
    fn visit_expression(&mut self, expression: &'ast Expression) {
        visit::walk_expression(self, expression);

        if self.error.is_some() {
            return;
        }

        let ExpressionKind::Binary { operator, lhs, .. } = &expression.kind else {
            return;
        };

        let operand = self.environment.node_type(lhs.id);

        let ordering = match operator.class() {
            BinaryOperatorClass::Ordering => true,
            BinaryOperatorClass::Equality => false,
            _ => return,
        };

        // Generic operands are only known once monomorphized
        let legal = if ordering {
            matches!(
                &**operand,
                TypeKind::Int | TypeKind::Float | TypeKind::Generic(_)
            )
        } else {
            !operand.any(&|kind| matches!(kind, TypeKind::Array(_) | TypeKind::Function { .. }))
        };

        if !legal {
            self.error = Some(report_error!(
                ErrorKind::IllegalComparison {
                    operator: operator.to_string(),
                    ty: operand.to_string(),
                    ordering,
                },
                expression.span
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::Config,
        error::{CompileError, ErrorKind},
        frontend::{
            Span,
            ast::{BinaryOperatorKind, Program, build::TreeBuilder},
        },
        middle::{
            resolve::Resolver,
            type_checking::{TypeEnvironment, type_check},
        },
    };

    fn check(program: &Program) -> Result<TypeEnvironment, CompileError> {
        let resolutions = Resolver::resolve_names(program)?;
        type_check(program, &resolutions, &Config::default())
    }

    #[test]
    fn unconstrained_empty_literals_default_to_unit() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_rec(
            "f",
            &["x"],
            b.unit(),
            b.sequence(
                b.call("f", vec![b.array_literal(vec![])]),
                b.call("f", vec![b.none()]),
            ),
        ));

        let env = check(&program).unwrap();

        let instances = env
            .instantiations_of("f$1")
            .map(|i| i.instance.to_string())
            .collect::<Vec<_>>();
        assert_eq!(instances, ["unit array -> unit", "unit option -> unit"]);
    }

    #[test]
    fn polymorphic_empty_literal_defaults_at_each_use() {
        let b = TreeBuilder::new();
        let program = b.program(b.let_in(
            "xs",
            b.array_literal(vec![]),
            b.array_length(b.var("xs")),
        ));

        let env = check(&program).unwrap();

        assert_eq!(env.type_of("xs$1").to_string(), "'a array");
        assert_eq!(env.node_type(program.body.id).to_string(), "int");
    }

    #[test]
    fn discarded_bindings_default_to_unit() {
        let b = TreeBuilder::new();
        let program = b.program(b.sequence(b.var("mystery"), b.unit()));

        let env = check(&program).unwrap();

        assert_eq!(env.type_of("_$1").to_string(), "unit");
        assert_eq!(env.externals["mystery"].ty.to_string(), "unit");
    }

    #[test]
    fn unresolved_bindings_cannot_be_inferred() {
        let b = TreeBuilder::new();
        let span = Span::new(8, 15);
        let program = b.program(b.let_in("x", b.at(b.var("mystery"), span), b.unit()));

        let error = check(&program).unwrap_err();

        assert!(matches!(error.kind, ErrorKind::CannotInfer { .. }), "{error}");
        assert_eq!(error.span, span);
    }

    #[test]
    fn ordering_requires_numbers() {
        let b = TreeBuilder::new();
        let program = b.program(b.binary(
            BinaryOperatorKind::LessThan,
            b.string("a"),
            b.string("b"),
        ));

        let error = check(&program).unwrap_err();

        assert_eq!(
            error.to_string(),
            "'string' can't be compared with operator '<'"
        );

        let b = TreeBuilder::new();
        let program = b.program(b.binary(
            BinaryOperatorKind::GreaterThanOrEqualTo,
            b.float(1.0),
            b.float(2.0),
        ));
        assert!(check(&program).is_ok());
    }

    #[test]
    fn equality_rejects_arrays_and_functions() {
        let b = TreeBuilder::new();
        let program = b.program(b.binary(
            BinaryOperatorKind::Equals,
            b.tuple(vec![b.int(1), b.array_make(b.int(1), b.int(0))]),
            b.tuple(vec![b.int(1), b.array_make(b.int(1), b.int(0))]),
        ));

        let error = check(&program).unwrap_err();
        assert!(matches!(
            error.kind,
            ErrorKind::IllegalComparison {
                ordering: false,
                ..
            }
        ));

        let b = TreeBuilder::new();
        let program = b.program(b.binary(
            BinaryOperatorKind::NotEquals,
            b.some(b.int(1)),
            b.none(),
        ));
        assert!(check(&program).is_ok());
    }
}

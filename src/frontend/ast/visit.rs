//! Trait definition for an AST visitor which walks the tree in DFS order

use super::{
    Binder, Expression, ExpressionKind, ExternalDeclaration, FunctionDefinition, Identifier,
    Program, Type, TypeAlias, TypeKind,
};

pub trait Visitor<'ast>: Sized {
    fn visit_type_alias(&mut self, type_alias: &'ast TypeAlias) {
        walk_type_alias(self, type_alias)
    }

    fn visit_external(&mut self, external: &'ast ExternalDeclaration) {
        walk_external(self, external)
    }

    fn visit_identifier(&mut self, _identifier: &'ast Identifier) {}

    fn visit_binder(&mut self, binder: &'ast Binder) {
        walk_binder(self, binder)
    }

    fn visit_type(&mut self, ty: &'ast Type) {
        walk_type(self, ty)
    }

    fn visit_function_definition(&mut self, function: &'ast FunctionDefinition) {
        walk_function_definition(self, function)
    }

    fn visit_expression(&mut self, expression: &'ast Expression) {
        walk_expression(self, expression)
    }
}

pub fn walk_program<'a>(visitor: &mut impl Visitor<'a>, program: &'a Program) {
    for alias in &program.type_aliases {
        visitor.visit_type_alias(alias);
    }

    for external in &program.externals {
        visitor.visit_external(external);
    }

    visitor.visit_expression(&program.body);
}

pub fn walk_type_alias<'a>(visitor: &mut impl Visitor<'a>, type_alias: &'a TypeAlias) {
    visitor.visit_identifier(&type_alias.name);
    visitor.visit_type(&type_alias.ty);
}

pub fn walk_external<'a>(visitor: &mut impl Visitor<'a>, external: &'a ExternalDeclaration) {
    visitor.visit_identifier(&external.name);
    visitor.visit_type(&external.ty);
}

pub fn walk_binder<'a>(visitor: &mut impl Visitor<'a>, binder: &'a Binder) {
    visitor.visit_identifier(&binder.name);

    if let Some(ty) = &binder.ty {
        visitor.visit_type(ty);
    }
}

pub fn walk_type<'a>(visitor: &mut impl Visitor<'a>, ty: &'a Type) {
    match &ty.kind {
        TypeKind::Infer => {}
        TypeKind::Named(name) => visitor.visit_identifier(name),
        TypeKind::Constructor { name, arguments } => {
            visitor.visit_identifier(name);

            for argument in arguments {
                visitor.visit_type(argument);
            }
        }
        TypeKind::Tuple(elements) => {
            for element in elements {
                visitor.visit_type(element);
            }
        }
        TypeKind::Function {
            parameters,
            return_type,
        } => {
            for parameter in parameters {
                visitor.visit_type(parameter);
            }

            visitor.visit_type(return_type);
        }
    }
}

pub fn walk_function_definition<'a>(
    visitor: &mut impl Visitor<'a>,
    function: &'a FunctionDefinition,
) {
    visitor.visit_identifier(&function.name);

    for parameter in &function.parameters {
        visitor.visit_binder(parameter);
    }

    if let Some(return_type) = &function.return_type {
        visitor.visit_type(return_type);
    }

    visitor.visit_expression(&function.body);
}

pub fn walk_expression<'a>(visitor: &mut impl Visitor<'a>, expression: &'a Expression) {
    match &expression.kind {
        ExpressionKind::Unit
        | ExpressionKind::Bool(_)
        | ExpressionKind::Int(_)
        | ExpressionKind::Float(_)
        | ExpressionKind::String(_)
        | ExpressionKind::None => {}
        ExpressionKind::Variable(identifier) => visitor.visit_identifier(identifier),
        ExpressionKind::Unary { operand, .. } => visitor.visit_expression(operand),
        ExpressionKind::Binary { lhs, rhs, .. } => {
            visitor.visit_expression(lhs);
            visitor.visit_expression(rhs);
        }
        ExpressionKind::If {
            condition,
            positive,
            negative,
        } => {
            visitor.visit_expression(condition);
            visitor.visit_expression(positive);
            visitor.visit_expression(negative);
        }
        ExpressionKind::Let {
            binder,
            bound,
            body,
        } => {
            visitor.visit_expression(bound);
            visitor.visit_binder(binder);
            visitor.visit_expression(body);
        }
        ExpressionKind::LetRec { function, body } => {
            visitor.visit_function_definition(function);
            visitor.visit_expression(body);
        }
        ExpressionKind::LetTuple {
            binders,
            bound,
            body,
        } => {
            visitor.visit_expression(bound);

            for binder in binders {
                visitor.visit_binder(binder);
            }

            visitor.visit_expression(body);
        }
        ExpressionKind::Apply { callee, arguments } => {
            visitor.visit_expression(callee);

            for argument in arguments {
                visitor.visit_expression(argument);
            }
        }
        ExpressionKind::Tuple(elements) | ExpressionKind::ArrayLiteral(elements) => {
            for element in elements {
                visitor.visit_expression(element);
            }
        }
        ExpressionKind::ArrayMake { size, element } => {
            visitor.visit_expression(size);
            visitor.visit_expression(element);
        }
        ExpressionKind::ArrayLength(inner) | ExpressionKind::Some(inner) => {
            visitor.visit_expression(inner)
        }
        ExpressionKind::ArrayGet { array, index } => {
            visitor.visit_expression(array);
            visitor.visit_expression(index);
        }
        ExpressionKind::ArrayPut {
            array,
            index,
            value,
        } => {
            visitor.visit_expression(array);
            visitor.visit_expression(index);
            visitor.visit_expression(value);
        }
        ExpressionKind::Match {
            target,
            binder,
            some_arm,
            none_arm,
        } => {
            visitor.visit_expression(target);
            visitor.visit_binder(binder);
            visitor.visit_expression(some_arm);
            visitor.visit_expression(none_arm);
        }
        ExpressionKind::Typed { child, ty } => {
            visitor.visit_expression(child);
            visitor.visit_type(ty);
        }
    }
}

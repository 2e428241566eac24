//! Node construction with fresh [`NodeId`]s
//!
//! The parser and tests build trees through a [`TreeBuilder`] so ids are
//! unique within a program. Nodes get an empty span unless one is given with
//! [`TreeBuilder::at`].

use std::cell::Cell;

use super::{
    BinaryOperatorKind, Binder, Expression, ExpressionKind, ExternalDeclaration,
    FunctionDefinition, Identifier, NodeId, Program, Type, TypeAlias, TypeKind,
    UnaryOperatorKind,
};
use crate::frontend::{Span, intern::InternedSymbol};

#[derive(Debug, Default)]
pub struct TreeBuilder {
    next_id: Cell<u32>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&self) -> NodeId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        NodeId(id)
    }

    fn expression(&self, kind: ExpressionKind) -> Expression {
        Expression {
            id: self.fresh_id(),
            span: Span::default(),
            kind,
        }
    }

    /// Replaces the span of an already built expression
    pub fn at(&self, mut expression: Expression, span: Span) -> Expression {
        expression.span = span;
        expression
    }

    pub fn identifier(&self, name: &str) -> Identifier {
        Identifier {
            id: self.fresh_id(),
            span: Span::default(),
            symbol: InternedSymbol::new(name),
        }
    }

    pub fn binder(&self, name: &str) -> Binder {
        Binder {
            name: self.identifier(name),
            ty: None,
        }
    }

    pub fn typed_binder(&self, name: &str, ty: Type) -> Binder {
        Binder {
            name: self.identifier(name),
            ty: Some(ty),
        }
    }

    pub fn program(&self, body: Expression) -> Program {
        Program {
            type_aliases: Vec::new(),
            externals: Vec::new(),
            body,
        }
    }

    pub fn type_alias(&self, name: &str, ty: Type) -> TypeAlias {
        TypeAlias {
            id: self.fresh_id(),
            span: Span::default(),
            name: self.identifier(name),
            ty,
        }
    }

    pub fn external(&self, name: &str, ty: Type, c_name: &str) -> ExternalDeclaration {
        ExternalDeclaration {
            id: self.fresh_id(),
            span: Span::default(),
            name: self.identifier(name),
            ty,
            c_name: c_name.to_owned(),
        }
    }

    pub fn unit(&self) -> Expression {
        self.expression(ExpressionKind::Unit)
    }

    pub fn bool(&self, value: bool) -> Expression {
        self.expression(ExpressionKind::Bool(value))
    }

    pub fn int(&self, value: i64) -> Expression {
        self.expression(ExpressionKind::Int(value))
    }

    pub fn float(&self, value: f64) -> Expression {
        self.expression(ExpressionKind::Float(value))
    }

    pub fn string(&self, value: &str) -> Expression {
        self.expression(ExpressionKind::String(value.to_owned()))
    }

    pub fn var(&self, name: &str) -> Expression {
        self.expression(ExpressionKind::Variable(self.identifier(name)))
    }

    pub fn unary(&self, operator: UnaryOperatorKind, operand: Expression) -> Expression {
        self.expression(ExpressionKind::Unary {
            operator,
            operand: Box::new(operand),
        })
    }

    pub fn binary(
        &self,
        operator: BinaryOperatorKind,
        lhs: Expression,
        rhs: Expression,
    ) -> Expression {
        self.expression(ExpressionKind::Binary {
            operator,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn if_then_else(
        &self,
        condition: Expression,
        positive: Expression,
        negative: Expression,
    ) -> Expression {
        self.expression(ExpressionKind::If {
            condition: Box::new(condition),
            positive: Box::new(positive),
            negative: Box::new(negative),
        })
    }

    pub fn let_in(&self, name: &str, bound: Expression, body: Expression) -> Expression {
        self.let_binder(self.binder(name), bound, body)
    }

    pub fn let_binder(&self, binder: Binder, bound: Expression, body: Expression) -> Expression {
        self.expression(ExpressionKind::Let {
            binder,
            bound: Box::new(bound),
            body: Box::new(body),
        })
    }

    /// `first; second`, which the parser expands to `let _ = first in second`
    pub fn sequence(&self, first: Expression, second: Expression) -> Expression {
        self.let_in("_", first, second)
    }

    pub fn let_rec(
        &self,
        name: &str,
        parameters: &[&str],
        function_body: Expression,
        body: Expression,
    ) -> Expression {
        let function = FunctionDefinition {
            name: self.identifier(name),
            parameters: parameters.iter().map(|p| self.binder(p)).collect(),
            return_type: None,
            body: Box::new(function_body),
        };

        self.let_rec_definition(function, body)
    }

    pub fn let_rec_definition(&self, function: FunctionDefinition, body: Expression) -> Expression {
        self.expression(ExpressionKind::LetRec {
            function,
            body: Box::new(body),
        })
    }

    pub fn let_tuple(&self, names: &[&str], bound: Expression, body: Expression) -> Expression {
        self.expression(ExpressionKind::LetTuple {
            binders: names.iter().map(|n| self.binder(n)).collect(),
            bound: Box::new(bound),
            body: Box::new(body),
        })
    }

    pub fn apply(&self, callee: Expression, arguments: Vec<Expression>) -> Expression {
        self.expression(ExpressionKind::Apply {
            callee: Box::new(callee),
            arguments,
        })
    }

    /// Shorthand for applying a variable
    pub fn call(&self, callee: &str, arguments: Vec<Expression>) -> Expression {
        self.apply(self.var(callee), arguments)
    }

    pub fn tuple(&self, elements: Vec<Expression>) -> Expression {
        self.expression(ExpressionKind::Tuple(elements))
    }

    pub fn array_make(&self, size: Expression, element: Expression) -> Expression {
        self.expression(ExpressionKind::ArrayMake {
            size: Box::new(size),
            element: Box::new(element),
        })
    }

    pub fn array_literal(&self, elements: Vec<Expression>) -> Expression {
        self.expression(ExpressionKind::ArrayLiteral(elements))
    }

    pub fn array_length(&self, array: Expression) -> Expression {
        self.expression(ExpressionKind::ArrayLength(Box::new(array)))
    }

    pub fn array_get(&self, array: Expression, index: Expression) -> Expression {
        self.expression(ExpressionKind::ArrayGet {
            array: Box::new(array),
            index: Box::new(index),
        })
    }

    pub fn array_put(&self, array: Expression, index: Expression, value: Expression) -> Expression {
        self.expression(ExpressionKind::ArrayPut {
            array: Box::new(array),
            index: Box::new(index),
            value: Box::new(value),
        })
    }

    pub fn some(&self, element: Expression) -> Expression {
        self.expression(ExpressionKind::Some(Box::new(element)))
    }

    pub fn none(&self) -> Expression {
        self.expression(ExpressionKind::None)
    }

    pub fn match_option(
        &self,
        target: Expression,
        binder: &str,
        some_arm: Expression,
        none_arm: Expression,
    ) -> Expression {
        self.expression(ExpressionKind::Match {
            target: Box::new(target),
            binder: self.binder(binder),
            some_arm: Box::new(some_arm),
            none_arm: Box::new(none_arm),
        })
    }

    pub fn typed(&self, child: Expression, ty: Type) -> Expression {
        self.expression(ExpressionKind::Typed {
            child: Box::new(child),
            ty,
        })
    }

    fn ty(&self, kind: TypeKind) -> Type {
        Type {
            id: self.fresh_id(),
            span: Span::default(),
            kind,
        }
    }

    pub fn ty_infer(&self) -> Type {
        self.ty(TypeKind::Infer)
    }

    pub fn ty_named(&self, name: &str) -> Type {
        self.ty(TypeKind::Named(self.identifier(name)))
    }

    pub fn ty_constructor(&self, name: &str, arguments: Vec<Type>) -> Type {
        self.ty(TypeKind::Constructor {
            name: self.identifier(name),
            arguments,
        })
    }

    pub fn ty_tuple(&self, elements: Vec<Type>) -> Type {
        self.ty(TypeKind::Tuple(elements))
    }

    pub fn ty_function(&self, parameters: Vec<Type>, return_type: Type) -> Type {
        self.ty(TypeKind::Function {
            parameters,
            return_type: Box::new(return_type),
        })
    }
}

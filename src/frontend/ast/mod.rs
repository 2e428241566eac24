//! Syntax tree handed to the middle-end by the parser
//!
//! Every node carries a [`NodeId`] which later passes use as the key for
//! their side tables (name resolutions, node types, instantiations), and a
//! [`Span`] for diagnostics.

use strum::{EnumIter, EnumString};

use super::{Span, intern::InternedSymbol};

pub mod build;
pub mod visit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

/// A whole compilation unit: declarations followed by the root expression
#[derive(Debug)]
pub struct Program {
    pub type_aliases: Vec<TypeAlias>,
    pub externals: Vec<ExternalDeclaration>,
    pub body: Expression,
}

/// `type name = T`
#[derive(Debug)]
pub struct TypeAlias {
    pub id: NodeId,
    pub span: Span,
    pub name: Identifier,
    pub ty: Type,
}

/// `external name : T = "c_name"`
#[derive(Debug)]
pub struct ExternalDeclaration {
    pub id: NodeId,
    pub span: Span,
    pub name: Identifier,
    pub ty: Type,
    pub c_name: String,
}

#[derive(Debug)]
pub struct Identifier {
    pub id: NodeId,
    pub span: Span,
    pub symbol: InternedSymbol,
}

/// A name introduced by `let`, a parameter, a tuple pattern or a match arm,
/// with its optional annotation
#[derive(Debug)]
pub struct Binder {
    pub name: Identifier,
    pub ty: Option<Type>,
}

#[derive(Debug)]
pub struct Expression {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExpressionKind,
}

#[derive(Debug)]
pub enum ExpressionKind {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Variable(Identifier),
    Unary {
        operator: UnaryOperatorKind,
        operand: Box<Expression>,
    },
    Binary {
        operator: BinaryOperatorKind,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    If {
        condition: Box<Expression>,
        positive: Box<Expression>,
        negative: Box<Expression>,
    },
    /// `let x = bound in body`
    Let {
        binder: Binder,
        bound: Box<Expression>,
        body: Box<Expression>,
    },
    /// `let rec f a b = ... in body`
    LetRec {
        function: FunctionDefinition,
        body: Box<Expression>,
    },
    /// `let (a, b) = bound in body`
    LetTuple {
        binders: Vec<Binder>,
        bound: Box<Expression>,
        body: Box<Expression>,
    },
    Apply {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
    },
    Tuple(Vec<Expression>),
    /// `Array.make size element`
    ArrayMake {
        size: Box<Expression>,
        element: Box<Expression>,
    },
    /// `[| a; b |]`
    ArrayLiteral(Vec<Expression>),
    /// `Array.length a`
    ArrayLength(Box<Expression>),
    /// `a.(i)`
    ArrayGet {
        array: Box<Expression>,
        index: Box<Expression>,
    },
    /// `a.(i) <- v`
    ArrayPut {
        array: Box<Expression>,
        index: Box<Expression>,
        value: Box<Expression>,
    },
    Some(Box<Expression>),
    None,
    /// `match target with Some binder -> some_arm | None -> none_arm`
    Match {
        target: Box<Expression>,
        binder: Binder,
        some_arm: Box<Expression>,
        none_arm: Box<Expression>,
    },
    /// `(child : ty)`
    Typed {
        child: Box<Expression>,
        ty: Type,
    },
}

#[derive(Debug)]
pub struct FunctionDefinition {
    pub name: Identifier,
    pub parameters: Vec<Binder>,
    pub return_type: Option<Type>,
    pub body: Box<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperatorKind {
    Not,         // not
    Negate,      // -
    FloatNegate, // -.
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorKind {
    Add,                  // +
    Subtract,             // -
    Multiply,             // *
    Divide,               // /
    Modulus,              // %
    FloatAdd,             // +.
    FloatSubtract,        // -.
    FloatMultiply,        // *.
    FloatDivide,          // /.
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    Equals,               // =
    NotEquals,            // <>
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=
    LogicalAnd,           // &&
    LogicalOr,            // ||
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorClass {
    IntArithmetic,
    FloatArithmetic,
    Ordering,
    Equality,
    Logical,
}

impl BinaryOperatorKind {
    pub fn class(self) -> BinaryOperatorClass {
        match self {
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::Modulus => {
                BinaryOperatorClass::IntArithmetic
            }
            Self::FloatAdd | Self::FloatSubtract | Self::FloatMultiply | Self::FloatDivide => {
                BinaryOperatorClass::FloatArithmetic
            }
            Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo => BinaryOperatorClass::Ordering,
            Self::Equals | Self::NotEquals => BinaryOperatorClass::Equality,
            Self::LogicalAnd | Self::LogicalOr => BinaryOperatorClass::Logical,
        }
    }
}

impl core::fmt::Display for UnaryOperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Not => write!(f, "not"),
            Self::Negate => write!(f, "-"),
            Self::FloatNegate => write!(f, "-."),
        }
    }
}

impl core::fmt::Display for BinaryOperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let operator = match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulus => "%",
            Self::FloatAdd => "+.",
            Self::FloatSubtract => "-.",
            Self::FloatMultiply => "*.",
            Self::FloatDivide => "/.",
            Self::LessThan => "<",
            Self::LessThanOrEqualTo => "<=",
            Self::Equals => "=",
            Self::NotEquals => "<>",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqualTo => ">=",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
        };

        f.write_str(operator)
    }
}

/// A type annotation as written in the source
#[derive(Debug)]
pub struct Type {
    pub id: NodeId,
    pub span: Span,
    pub kind: TypeKind,
}

#[derive(Debug)]
pub enum TypeKind {
    /// `_`, left for inference to fill in
    Infer,
    /// A primitive name or a declared alias
    Named(Identifier),
    /// `int array`, `string option`
    Constructor {
        name: Identifier,
        arguments: Vec<Type>,
    },
    Tuple(Vec<Type>),
    Function {
        parameters: Vec<Type>,
        return_type: Box<Type>,
    },
}

/// Type names which are always in scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum PrimitiveKind {
    Unit,
    Bool,
    Int,
    Float,
    String,
}

/// Built-in type constructors taking exactly one argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ConstructorKind {
    Array,
    Option,
}

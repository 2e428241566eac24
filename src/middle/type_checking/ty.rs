use std::{collections::HashMap, rc::Rc};

use super::TypeContext;
use crate::index::simple_index;

#[doc(hidden)]
mod private {
    #[doc(hidden)]
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub struct PrivateZst;
}

/// Thin pointer to an interned type kind. Do not construct directly. Instead,
/// use [`TypeContext::intern_type`]
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Type(Rc<TypeKind>, private::PrivateZst);

#[derive(Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Unit,
    Bool,
    Int,
    Float,
    String,
    /// a -> b -> r
    ///
    /// Functions take all of their parameters at once; there is no implicit
    /// currying
    Function {
        parameters: Rc<[Type]>,
        return_type: Type,
    },
    /// a * b
    Tuple(Rc<[Type]>),
    /// a array
    Array(Type),
    /// a option
    Option(Type),
    /// An inference variable living in the [`TypeContext`] arena. It may be
    /// linked to another type, in which case it stands for that type.
    Variable(TypeVariableId),
    /// A quantified placeholder of a type scheme. Identified by the variable
    /// it was generalized from.
    Generic(TypeVariableId),
}

simple_index! {
    /// Index of a unification variable
    pub struct TypeVariableId;
}

/// Mutable state of one unification variable
#[derive(Debug, Clone)]
pub struct TypeVariable {
    /// The type this variable has been unified with
    pub link: Option<Type>,
    /// Depth of the let-binding which created this variable. A variable may
    /// only be generalized by a binding shallower than its level.
    pub level: u32,
    /// Set once the variable has been frozen into a [`TypeKind::Generic`] by
    /// some binding's type scheme
    pub generalized: bool,
}

impl TypeContext {
    pub fn intern_type(&mut self, kind: TypeKind) -> Type {
        let rc = self.type_table.get_or_insert(Rc::new(kind));
        Type(rc.clone(), private::PrivateZst)
    }

    pub fn unit(&mut self) -> Type {
        self.intern_type(TypeKind::Unit)
    }

    pub fn bool(&mut self) -> Type {
        self.intern_type(TypeKind::Bool)
    }

    pub fn int(&mut self) -> Type {
        self.intern_type(TypeKind::Int)
    }

    pub fn float(&mut self) -> Type {
        self.intern_type(TypeKind::Float)
    }

    pub fn string(&mut self) -> Type {
        self.intern_type(TypeKind::String)
    }

    pub fn function(&mut self, parameters: Vec<Type>, return_type: Type) -> Type {
        self.intern_type(TypeKind::Function {
            parameters: parameters.into(),
            return_type,
        })
    }

    pub fn tuple(&mut self, elements: Vec<Type>) -> Type {
        self.intern_type(TypeKind::Tuple(elements.into()))
    }

    pub fn array(&mut self, element: Type) -> Type {
        self.intern_type(TypeKind::Array(element))
    }

    pub fn option(&mut self, element: Type) -> Type {
        self.intern_type(TypeKind::Option(element))
    }

    pub fn fresh_variable(&mut self, level: u32) -> Type {
        let id = self.variables.push(TypeVariable {
            link: None,
            level,
            generalized: false,
        });

        self.intern_type(TypeKind::Variable(id))
    }

    /// Follows variable links until reaching a type which is not a linked
    /// variable
    pub fn resolve(&self, ty: &Type) -> Type {
        let mut ty = ty.clone();

        while let TypeKind::Variable(id) = &*ty {
            match &self.variables[*id].link {
                Some(link) => ty = link.clone(),
                None => break,
            }
        }

        ty
    }

    /// Recursively replaces every linked variable by its target, producing a
    /// type whose only variables are unlinked ones
    pub fn apply_substitution(&mut self, ty: &Type) -> Type {
        let ty = self.resolve(ty);

        self.map_children(&ty, |tcx, child| tcx.apply_substitution(child))
    }

    /// Rebuilds `ty` with `f` applied to each direct child type
    pub fn map_children(&mut self, ty: &Type, mut f: impl FnMut(&mut Self, &Type) -> Type) -> Type {
        match &**ty {
            TypeKind::Function {
                parameters,
                return_type,
            } => {
                let parameters = parameters.iter().map(|p| f(self, p)).collect();
                let return_type = f(self, return_type);

                self.function(parameters, return_type)
            }
            TypeKind::Tuple(elements) => {
                let elements = elements.iter().map(|e| f(self, e)).collect();

                self.tuple(elements)
            }
            TypeKind::Array(element) => {
                let element = f(self, element);

                self.array(element)
            }
            TypeKind::Option(element) => {
                let element = f(self, element);

                self.option(element)
            }
            _ => ty.clone(),
        }
    }

    /// Renders a type as the user would write it, looking through links
    pub fn display(&mut self, ty: &Type) -> String {
        self.apply_substitution(ty).to_string()
    }
}

impl Type {
    /// Whether any part of this type satisfies `predicate`. Links are not
    /// followed.
    pub fn any(&self, predicate: &impl Fn(&TypeKind) -> bool) -> bool {
        if predicate(&**self) {
            return true;
        }

        match &**self {
            TypeKind::Function {
                parameters,
                return_type,
            } => parameters.iter().any(|p| p.any(predicate)) || return_type.any(predicate),
            TypeKind::Tuple(elements) => elements.iter().any(|e| e.any(predicate)),
            TypeKind::Array(element) | TypeKind::Option(element) => element.any(predicate),
            _ => false,
        }
    }

    /// Whether this type still quantifies over generic placeholders
    pub fn is_polymorphic(&self) -> bool {
        self.any(&|kind| matches!(kind, TypeKind::Generic(_)))
    }
}

impl core::fmt::Debug for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Type").field(&self.0).finish()
    }
}

impl core::ops::Deref for Type {
    type Target = TypeKind;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

/// Names generic placeholders `'a`, `'b`, ... in order of first appearance
/// within one printed type
#[derive(Default)]
struct TypePrinter {
    generic_names: HashMap<TypeVariableId, String>,
}

impl TypePrinter {
    fn generic_name(&mut self, id: TypeVariableId) -> String {
        let count = self.generic_names.len();

        self.generic_names
            .entry(id)
            .or_insert_with(|| {
                let letter = (b'a' + (count % 26) as u8) as char;

                match count / 26 {
                    0 => format!("'{letter}"),
                    round => format!("'{letter}{round}"),
                }
            })
            .clone()
    }

    fn print(&mut self, ty: &Type) -> String {
        match &**ty {
            TypeKind::Unit => "unit".to_owned(),
            TypeKind::Bool => "bool".to_owned(),
            TypeKind::Int => "int".to_owned(),
            TypeKind::Float => "float".to_owned(),
            TypeKind::String => "string".to_owned(),
            TypeKind::Function {
                parameters,
                return_type,
            } => parameters
                .iter()
                .chain(std::iter::once(return_type))
                .map(|t| self.print_nested(t))
                .collect::<Vec<_>>()
                .join(" -> "),
            TypeKind::Tuple(elements) => elements
                .iter()
                .map(|t| self.print_nested(t))
                .collect::<Vec<_>>()
                .join(" * "),
            TypeKind::Array(element) => format!("{} array", self.print_nested(element)),
            TypeKind::Option(element) => format!("{} option", self.print_nested(element)),
            TypeKind::Variable(id) => format!("?{}", id.0),
            TypeKind::Generic(id) => self.generic_name(*id),
        }
    }

    fn print_nested(&mut self, ty: &Type) -> String {
        match &**ty {
            TypeKind::Function { .. } | TypeKind::Tuple(_) => format!("({})", self.print(ty)),
            _ => self.print(ty),
        }
    }
}

/// Prints the type structurally. Variables are not resolved; use
/// [`TypeContext::display`] for types which may still contain links.
impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&TypePrinter::default().print(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_functions_and_tuples_are_parenthesized() {
        let mut tcx = TypeContext::new();
        let int = tcx.int();
        let bool = tcx.bool();

        let pair = tcx.tuple(vec![int.clone(), bool.clone()]);
        let callback = tcx.function(vec![int.clone()], bool.clone());
        let nested = tcx.tuple(vec![pair.clone(), int.clone()]);
        let array = tcx.array(pair.clone());
        let higher = tcx.function(vec![callback, array], nested);

        assert_eq!(
            higher.to_string(),
            "(int -> bool) -> (int * bool) array -> ((int * bool) * int)"
        );
    }

    #[test]
    fn generics_are_named_by_first_appearance() {
        let mut tcx = TypeContext::new();
        let a = tcx.intern_type(TypeKind::Generic(TypeVariableId(7)));
        let b = tcx.intern_type(TypeKind::Generic(TypeVariableId(3)));
        let option = tcx.option(b.clone());
        let f = tcx.function(vec![a.clone(), option], a);

        assert_eq!(f.to_string(), "'a -> 'b option -> 'a");
        assert!(f.is_polymorphic());
    }

    #[test]
    fn display_follows_links() {
        let mut tcx = TypeContext::new();
        let var = tcx.fresh_variable(0);
        let int = tcx.int();
        let array = tcx.array(var.clone());

        let TypeKind::Variable(id) = &*var else {
            unreachable!()
        };
        assert_eq!(tcx.display(&array), format!("?{} array", id.0));

        tcx.variables[*id].link = Some(int);
        assert_eq!(tcx.display(&array), "int array");
    }

    #[test]
    fn types_are_interned() {
        let mut tcx = TypeContext::new();
        let a = tcx.int();
        let b = tcx.int();
        let f = tcx.function(vec![a.clone()], b.clone());
        let g = tcx.function(vec![b], a);

        assert!(Rc::ptr_eq(&f.0, &g.0));
    }
}

use super::{
    TypeContext,
    ty::{Type, TypeKind, TypeVariableId},
};
use crate::error::{ArityShape, ErrorKind};

/// Failure of a single unification, before it is attached to a source span
#[derive(Debug)]
pub struct UnificationError {
    pub kind: ErrorKind,
    /// Innermost first
    pub notes: Vec<String>,
}

impl UnificationError {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            notes: Vec::new(),
        }
    }

    fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };

    format!("{n}{suffix}")
}

impl TypeContext {
    /// Makes `left` and `right` the same type by linking unification
    /// variables, or explains why they can't be
    pub fn unify(&mut self, left: &Type, right: &Type) -> Result<(), UnificationError> {
        self.unify_inner(left, right).map_err(|error| {
            let left = self.display(left);
            let right = self.display(right);

            error.note(format!("while unifying '{left}' and '{right}'"))
        })
    }

    fn unify_inner(&mut self, left: &Type, right: &Type) -> Result<(), UnificationError> {
        let left = self.resolve(left);
        let right = self.resolve(right);

        // Interned, so this also covers a variable unified with itself
        if left == right {
            return Ok(());
        }

        match (&*left, &*right) {
            (TypeKind::Variable(id), _) => self.bind(*id, &left, &right),
            (_, TypeKind::Variable(id)) => self.bind(*id, &right, &left),
            (
                TypeKind::Function {
                    parameters: left_parameters,
                    return_type: left_return,
                },
                TypeKind::Function {
                    parameters: right_parameters,
                    return_type: right_return,
                },
            ) => {
                self.unify_inner(left_return, right_return)
                    .map_err(|e| e.note("in return type of function"))?;

                if left_parameters.len() != right_parameters.len() {
                    return Err(self.arity_mismatch(
                        ArityShape::Function,
                        left_parameters.len(),
                        right_parameters.len(),
                        &left,
                        &right,
                    ));
                }

                for (index, (l, r)) in left_parameters.iter().zip(right_parameters.iter()).enumerate()
                {
                    self.unify_inner(l, r).map_err(|e| {
                        e.note(format!("in {} parameter of function", ordinal(index + 1)))
                    })?;
                }

                Ok(())
            }
            (TypeKind::Tuple(left_elements), TypeKind::Tuple(right_elements)) => {
                if left_elements.len() != right_elements.len() {
                    return Err(self.arity_mismatch(
                        ArityShape::Tuple,
                        left_elements.len(),
                        right_elements.len(),
                        &left,
                        &right,
                    ));
                }

                for (index, (l, r)) in left_elements.iter().zip(right_elements.iter()).enumerate() {
                    self.unify_inner(l, r).map_err(|e| {
                        e.note(format!("in {} element of tuple", ordinal(index + 1)))
                    })?;
                }

                Ok(())
            }
            (TypeKind::Array(l), TypeKind::Array(r)) => self
                .unify_inner(l, r)
                .map_err(|e| e.note("in element type of array")),
            (TypeKind::Option(l), TypeKind::Option(r)) => self
                .unify_inner(l, r)
                .map_err(|e| e.note("in element type of option")),
            _ => Err(UnificationError::new(ErrorKind::TypeMismatch {
                left: self.display(&left),
                right: self.display(&right),
            })),
        }
    }

    fn arity_mismatch(
        &mut self,
        shape: ArityShape,
        left_count: usize,
        right_count: usize,
        left: &Type,
        right: &Type,
    ) -> UnificationError {
        UnificationError::new(ErrorKind::ArityMismatch {
            shape,
            left_count,
            right_count,
            left: self.display(left),
            right: self.display(right),
        })
    }

    /// Links the unlinked variable `id` (whose type is `variable`) to `ty`
    fn bind(
        &mut self,
        id: TypeVariableId,
        variable: &Type,
        ty: &Type,
    ) -> Result<(), UnificationError> {
        let level = self.variables[id].level;

        if self.occurs_in(id, level, ty) {
            return Err(UnificationError::new(ErrorKind::OccursCheck {
                variable: variable.to_string(),
                ty: self.display(ty),
            }));
        }

        self.variables[id].link = Some(ty.clone());
        Ok(())
    }

    /// Checks whether `id` appears in `ty`, lowering the level of every other
    /// unlinked variable found on the way to at most `level`. The lowered
    /// variables now escape into a shallower binding and must not be
    /// generalized by the deeper one.
    fn occurs_in(&mut self, id: TypeVariableId, level: u32, ty: &Type) -> bool {
        let ty = self.resolve(ty);

        match &*ty {
            TypeKind::Variable(other) => {
                if *other == id {
                    return true;
                }

                let other = &mut self.variables[*other];
                other.level = other.level.min(level);
                false
            }
            TypeKind::Function {
                parameters,
                return_type,
            } => {
                parameters.iter().any(|p| self.occurs_in(id, level, p))
                    || self.occurs_in(id, level, return_type)
            }
            TypeKind::Tuple(elements) => elements.iter().any(|e| self.occurs_in(id, level, e)),
            TypeKind::Array(element) | TypeKind::Option(element) => {
                self.occurs_in(id, level, element)
            }
            _ => false,
        }
    }
}

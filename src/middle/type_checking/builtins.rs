//! Functions provided by the runtime library
//!
//! Their linkage name is the same as the symbol name.

use super::{TypeContext, ty::Type};

/// Shorthand for the parameter and return types of a builtin signature
#[derive(Clone, Copy)]
enum Primitive {
    Unit,
    Bool,
    Int,
    Float,
    String,
}

const BUILTINS: &[(&str, &[Primitive], Primitive)] = {
    use Primitive::*;

    &[
        ("print_int", &[Int], Unit),
        ("print_bool", &[Bool], Unit),
        ("print_float", &[Float], Unit),
        ("print_str", &[String], Unit),
        ("println_int", &[Int], Unit),
        ("println_bool", &[Bool], Unit),
        ("println_float", &[Float], Unit),
        ("println_str", &[String], Unit),
        ("float_to_int", &[Float], Int),
        ("int_to_float", &[Int], Float),
        ("int_to_str", &[Int], String),
        ("float_to_str", &[Float], String),
        ("str_to_int", &[String], Int),
        ("str_to_float", &[String], Float),
        ("str_size", &[String], Int),
        ("str_concat", &[String, String], String),
        ("substr", &[String, Int, Int], String),
        ("__str_equal", &[String, String], Bool),
        ("get_line", &[Unit], String),
    ]
};

impl TypeContext {
    fn builtin_primitive(&mut self, primitive: Primitive) -> Type {
        match primitive {
            Primitive::Unit => self.unit(),
            Primitive::Bool => self.bool(),
            Primitive::Int => self.int(),
            Primitive::Float => self.float(),
            Primitive::String => self.string(),
        }
    }

    /// Name and type of every builtin function
    pub fn builtin_signatures(&mut self) -> Vec<(&'static str, Type)> {
        BUILTINS
            .iter()
            .map(|(name, parameters, return_type)| {
                let parameters = parameters
                    .iter()
                    .map(|p| self.builtin_primitive(*p))
                    .collect();
                let return_type = self.builtin_primitive(*return_type);

                (*name, self.function(parameters, return_type))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_signatures_print_as_expected() {
        let mut tcx = TypeContext::new();
        let signatures = tcx
            .builtin_signatures()
            .into_iter()
            .map(|(name, ty)| (name, ty.to_string()))
            .collect::<std::collections::BTreeMap<_, _>>();

        assert_eq!(signatures.len(), 19);
        assert_eq!(signatures["print_int"], "int -> unit");
        assert_eq!(signatures["substr"], "string -> int -> int -> string");
        assert_eq!(signatures["get_line"], "unit -> string");
    }
}

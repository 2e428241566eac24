//! Closure conversion. First every function is classified: a *known*
//! function reads nothing from its surroundings and is never used as a value,
//! so it can be called by its label. Every other function gets a closure
//! holding the values it captures. Then all functions are hoisted to the top
//! level, closures are allocated where their functions were defined, and
//! every call is marked as direct, closure or external.

mod convert;
mod free_vars;

pub use convert::convert;
pub use free_vars::{FreeVariables, analyze_free_variables};

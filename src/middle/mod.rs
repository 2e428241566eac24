//! Names are resolved and types inferred on the AST, which is then
//! K-normalized into MIR. References are forwarded and functions are hoisted
//! out of their definitions with closure conversion.

pub mod closure;
pub mod mir;
pub mod resolve;
pub mod type_checking;

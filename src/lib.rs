//! Middle-end of a native compiler for a small ML-family language.
//!
//! A parsed [`frontend::ast::Program`] goes through alpha renaming, type
//! inference, K-normalization into MIR, reference elimination and closure
//! conversion. The result is a [`middle::mir::Program`] whose functions are
//! all at the top level, together with the type of every name in it.

pub mod config;
pub mod error;
pub mod frontend;
pub mod index;
pub mod middle;

use config::{Config, Stage};
use error::CompileError;
use frontend::ast::Program;
use middle::{
    closure, mir,
    resolve::Resolver,
    type_checking::{self, TypeEnvironment},
};

/// Output of the middle-end, ready for code generation
#[derive(Debug)]
pub struct Compilation {
    pub environment: TypeEnvironment,
    pub program: mir::Program,
}

fn dump(config: &Config, stage: Stage, contents: impl FnOnce() -> String) {
    if config.dumps(stage) {
        eprintln!("=== {stage} ===\n{}", contents());
    }
}

/// Runs every pass of the middle-end over a program
pub fn compile(program: &Program, config: &Config) -> Result<Compilation, CompileError> {
    let resolutions = Resolver::resolve_names(program)?;
    dump(config, Stage::Resolved, || resolutions.dump());

    let mut environment = type_checking::type_check(program, &resolutions, config)?;
    dump(config, Stage::Typed, || environment.dump());

    let mut module = mir::build(program, &resolutions, &mut environment);
    mir::eliminate_references(&mut module, &mut environment);
    dump(config, Stage::Mir, || module.dump(&environment));

    let free_variables = closure::analyze_free_variables(&module);
    let program = closure::convert(module, &free_variables);
    dump(config, Stage::Closure, || program.dump(&environment));

    #[cfg(debug_assertions)]
    program.verify(&environment);

    log::info!(
        "compiled {} top-level functions, {} of them closures",
        program.toplevel.len(),
        program.closures.len()
    );

    Ok(Compilation {
        environment,
        program,
    })
}

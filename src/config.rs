use std::collections::BTreeSet;

use strum::{Display, EnumIter, EnumString};

/// Knobs a driver can set for one compilation
#[derive(Debug, Clone)]
pub struct Config {
    /// Seed the external table with the runtime's built-in functions before
    /// type inference
    pub seed_builtins: bool,
    /// Keep terminal escape codes in rendered diagnostics
    pub color: bool,
    /// Intermediate results to print to stderr as the pipeline runs
    pub dump: BTreeSet<Stage>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed_builtins: true,
            color: true,
            dump: BTreeSet::new(),
        }
    }
}

impl Config {
    pub fn dumps(&self, stage: Stage) -> bool {
        self.dump.contains(&stage)
    }
}

/// Points in the pipeline whose output can be dumped
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    /// Renamed bindings
    Resolved,
    /// Dereferenced types of every binding
    Typed,
    /// K-normalized MIR after reference elimination
    Mir,
    /// The closure converted program
    Closure,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn stages_parse_from_their_names() {
        for stage in Stage::iter() {
            assert_eq!(Stage::from_str(&stage.to_string()), Ok(stage));
        }

        assert_eq!(Stage::from_str("mir"), Ok(Stage::Mir));
        assert!(Stage::from_str("lir").is_err());
    }

    #[test]
    fn default_config_dumps_nothing() {
        let config = Config::default();

        assert!(config.seed_builtins);
        assert!(!config.dumps(Stage::Closure));
    }
}

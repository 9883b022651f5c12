//! Dialect rule table
//!
//! Maps `(function name, dialect)` to a rendering rule and exposes the
//! static syntax descriptor of every supported dialect. A `RuleTable` is
//! built once and only read afterwards, so it can be shared behind an `Arc`.

mod dialect;
pub mod rules;
pub mod template;
mod types;

pub use dialect::{DdlSupport, Dialect, DialectDescriptor, OffsetStyle, QuoteStyle, StringEscape};
pub use rules::RuleSet;
pub use template::{RenderRule, Template, TemplateOp};

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("Function not found: {function} for dialect {dialect}")]
    FunctionNotFound { function: String, dialect: Dialect },

    #[error("Dialect {0} has no registered rules")]
    DialectNotRegistered(Dialect),

    #[error("Incomplete rule set for dialect {dialect}: missing {missing:?}")]
    IncompleteDialect {
        dialect: Dialect,
        missing: Vec<String>,
    },

    #[error("Rule for {function} in dialect {dialect} reads argument {index} of at least {arity}")]
    ArgumentOutOfRange {
        function: String,
        dialect: Dialect,
        index: usize,
        arity: usize,
    },

    #[error("Unknown dialect: {0}")]
    UnknownDialect(String),
}

/// Functions every dialect must register, either as a template or as an
/// explicit `Unsupported` marker.
pub const REQUIRED_FUNCTIONS: &[&str] = &[
    // Date/time extraction
    "year",
    "quarter",
    "month",
    "week_of_year",
    "day_of_year",
    "day",
    "hour",
    "minute",
    "second",
    // Epoch conversion
    "to_timestamp_s",
    "to_timestamp_ms",
    "to_timestamp_us",
    // Scalar
    "abs",
    "ceil",
    "floor",
    "round",
    "round_digits",
    "lower",
    "upper",
    "length",
    "substr",
    "coalesce",
    // Aggregates
    "count",
    "sum",
    "mean",
    "min",
    "max",
    "stddev",
    "variance",
    // Window
    "row_number",
    "rank",
    "dense_rank",
    "lag",
    "lead",
];

/// Fewest arguments a call of `function` is compiled with.
fn min_arity(function: &str) -> usize {
    match function {
        "count" | "row_number" | "rank" | "dense_rank" => 0,
        "round_digits" | "substr" => 2,
        _ => 1,
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    dialects: HashMap<Dialect, RuleSet>,
}

impl RuleTable {
    /// An empty table; see [`RuleTable::builtin`] for the standard one.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the builtin rules of every supported dialect.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for dialect in Dialect::ALL {
            table.dialects.insert(dialect, RuleSet::builtin(dialect));
        }
        table
    }

    /// Register (or replace) the rules of a dialect.
    ///
    /// Rejects rule sets that do not cover every required function, and
    /// templates that read arguments a call may not have.
    pub fn register_dialect(&mut self, dialect: Dialect, rules: RuleSet) -> Result<(), RegistryError> {
        let missing: Vec<String> = REQUIRED_FUNCTIONS
            .iter()
            .filter(|name| !rules.contains(name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(RegistryError::IncompleteDialect { dialect, missing });
        }
        for name in REQUIRED_FUNCTIONS {
            if let Some(RenderRule::Template(template)) = rules.get(name) {
                let arity = min_arity(name);
                if let Some(index) = template.max_arg().filter(|index| *index >= arity) {
                    return Err(RegistryError::ArgumentOutOfRange {
                        function: name.to_string(),
                        dialect,
                        index,
                        arity,
                    });
                }
            }
        }
        self.dialects.insert(dialect, rules);
        Ok(())
    }

    pub fn resolve(&self, function: &str, dialect: Dialect) -> Result<&RenderRule, RegistryError> {
        self.dialects
            .get(&dialect)
            .ok_or(RegistryError::DialectNotRegistered(dialect))?
            .get(function)
            .ok_or_else(|| RegistryError::FunctionNotFound {
                function: function.to_string(),
                dialect,
            })
    }

    /// Registered dialects in declaration order.
    pub fn dialects(&self) -> Vec<Dialect> {
        let mut dialects: Vec<Dialect> = self.dialects.keys().copied().collect();
        dialects.sort();
        dialects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables_are_complete() {
        let table = RuleTable::builtin();
        for dialect in Dialect::ALL {
            for name in REQUIRED_FUNCTIONS {
                assert!(
                    table.resolve(name, dialect).is_ok(),
                    "{} missing for {}",
                    name,
                    dialect
                );
            }
        }
    }

    #[test]
    fn test_partial_rule_set_rejected() {
        let mut table = RuleTable::new();
        let rules = RuleSet::new().rename("abs", "ABS");
        let err = table.register_dialect(Dialect::Postgres, rules).unwrap_err();
        match err {
            RegistryError::IncompleteDialect { dialect, missing } => {
                assert_eq!(dialect, Dialect::Postgres);
                assert!(missing.contains(&"year".to_string()));
                assert!(!missing.contains(&"abs".to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(
            table.resolve("abs", Dialect::Postgres),
            Err(RegistryError::DialectNotRegistered(Dialect::Postgres))
        ));
    }

    #[test]
    fn test_complete_rule_set_accepted() {
        let mut table = RuleTable::new();
        table
            .register_dialect(Dialect::DuckDB, RuleSet::builtin(Dialect::DuckDB))
            .unwrap();
        assert_eq!(table.dialects(), vec![Dialect::DuckDB]);
    }

    #[test]
    fn test_builtin_rule_sets_register() {
        let mut table = RuleTable::new();
        for dialect in Dialect::ALL {
            table
                .register_dialect(dialect, RuleSet::builtin(dialect))
                .unwrap();
        }
        assert_eq!(table.dialects(), Dialect::ALL.to_vec());
    }

    #[test]
    fn test_template_reading_missing_argument_rejected() {
        let mut table = RuleTable::new();
        let rules = RuleSet::builtin(Dialect::Postgres)
            .template("lower", template::call("LOWER", vec![template::arg(0), template::arg(1)]));
        let err = table.register_dialect(Dialect::Postgres, rules).unwrap_err();
        assert_eq!(
            err,
            RegistryError::ArgumentOutOfRange {
                function: "lower".to_string(),
                dialect: Dialect::Postgres,
                index: 1,
                arity: 1,
            }
        );
    }

    #[test]
    fn test_unknown_function() {
        let table = RuleTable::builtin();
        assert!(matches!(
            table.resolve("median", Dialect::Spark),
            Err(RegistryError::FunctionNotFound { .. })
        ));
    }
}

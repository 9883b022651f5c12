//! Builtin rule sets, one per dialect

use crate::template::{
    arg, binary, call, cast, extract, rename, RenderRule, Template, TemplateOp,
};
use crate::Dialect;
use std::collections::HashMap;

/// Rules for a single dialect, keyed by function name.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: HashMap<&'static str, RenderRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `name(args)` → `TARGET(args)`
    pub fn rename(self, name: &'static str, target: &'static str) -> Self {
        self.template(name, rename(target))
    }

    pub fn template(mut self, name: &'static str, template: Template) -> Self {
        self.rules.insert(name, RenderRule::Template(template));
        self
    }

    pub fn unsupported(mut self, name: &'static str, reason: &'static str) -> Self {
        self.rules.insert(name, RenderRule::Unsupported(reason));
        self
    }

    pub fn get(&self, name: &str) -> Option<&RenderRule> {
        self.rules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules shared by every dialect before overrides.
    fn common() -> Self {
        Self::new()
            .rename("abs", "ABS")
            .rename("ceil", "CEIL")
            .rename("floor", "FLOOR")
            .rename("round", "ROUND")
            .rename("round_digits", "ROUND")
            .rename("lower", "LOWER")
            .rename("upper", "UPPER")
            .rename("length", "LENGTH")
            .rename("substr", "SUBSTR")
            .rename("coalesce", "COALESCE")
            .rename("count", "COUNT")
            .rename("sum", "SUM")
            .rename("mean", "AVG")
            .rename("min", "MIN")
            .rename("max", "MAX")
            .rename("stddev", "STDDEV_SAMP")
            .rename("variance", "VAR_SAMP")
            .rename("row_number", "ROW_NUMBER")
            .rename("rank", "RANK")
            .rename("dense_rank", "DENSE_RANK")
            .rename("lag", "LAG")
            .rename("lead", "LEAD")
    }

    fn extract_fields(mut self, fields: [(&'static str, &'static str); 9], wrap: fn(Template) -> Template) -> Self {
        for (name, field) in fields {
            self = self.template(name, wrap(extract(field, arg(0))));
        }
        self
    }

    /// Builtin rules for `dialect`.
    pub fn builtin(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Postgres => postgres(),
            Dialect::DuckDB => duckdb(),
            Dialect::Flink => flink(),
            Dialect::Spark => spark(),
            Dialect::MySQL => mysql(),
            Dialect::SQLite => sqlite(),
        }
    }
}

fn div_by(scale: &'static str) -> Template {
    binary(TemplateOp::Div, arg(0), Template::Number(scale))
}

fn postgres() -> RuleSet {
    RuleSet::common()
        .extract_fields(
            [
                ("year", "YEAR"),
                ("quarter", "QUARTER"),
                ("month", "MONTH"),
                ("week_of_year", "WEEK"),
                ("day_of_year", "DOY"),
                ("day", "DAY"),
                ("hour", "HOUR"),
                ("minute", "MINUTE"),
                ("second", "SECOND"),
            ],
            |t| cast(t, "INTEGER"),
        )
        // EXTRACT(SECOND ...) includes fractional seconds
        .template(
            "second",
            cast(call("FLOOR", vec![extract("SECOND", arg(0))]), "INTEGER"),
        )
        .rename("to_timestamp_s", "TO_TIMESTAMP")
        .template("to_timestamp_ms", call("TO_TIMESTAMP", vec![div_by("1000.0")]))
        .template("to_timestamp_us", call("TO_TIMESTAMP", vec![div_by("1000000.0")]))
        .template("round_digits", call("ROUND", vec![cast(arg(0), "NUMERIC"), arg(1)]))
}

fn duckdb() -> RuleSet {
    RuleSet::common()
        .extract_fields(
            [
                ("year", "YEAR"),
                ("quarter", "QUARTER"),
                ("month", "MONTH"),
                ("week_of_year", "WEEK"),
                ("day_of_year", "DOY"),
                ("day", "DAY"),
                ("hour", "HOUR"),
                ("minute", "MINUTE"),
                ("second", "SECOND"),
            ],
            |t| t,
        )
        .rename("to_timestamp_s", "TO_TIMESTAMP")
        .rename("to_timestamp_ms", "EPOCH_MS")
        .rename("to_timestamp_us", "MAKE_TIMESTAMP")
}

fn flink() -> RuleSet {
    let from_unix = |scaled: Template| call("TO_TIMESTAMP", vec![call("FROM_UNIXTIME", vec![scaled])]);
    RuleSet::common()
        .template("year", extract("YEAR", arg(0)))
        .template("quarter", extract("QUARTER", arg(0)))
        .template("month", extract("MONTH", arg(0)))
        .template("week_of_year", extract("WEEK", arg(0)))
        .rename("day_of_year", "DAYOFYEAR")
        .rename("day", "DAYOFMONTH")
        .rename("hour", "HOUR")
        .rename("minute", "MINUTE")
        .rename("second", "SECOND")
        .template("to_timestamp_s", from_unix(arg(0)))
        .template(
            "to_timestamp_ms",
            from_unix(binary(TemplateOp::Div, arg(0), Template::Int(1000))),
        )
        .template(
            "to_timestamp_us",
            from_unix(binary(TemplateOp::Div, arg(0), Template::Int(1_000_000))),
        )
        .rename("length", "CHAR_LENGTH")
        .rename("substr", "SUBSTRING")
}

fn spark() -> RuleSet {
    RuleSet::common()
        .rename("year", "YEAR")
        .rename("quarter", "QUARTER")
        .rename("month", "MONTH")
        .rename("week_of_year", "WEEKOFYEAR")
        .rename("day_of_year", "DAYOFYEAR")
        .rename("day", "DAYOFMONTH")
        .rename("hour", "HOUR")
        .rename("minute", "MINUTE")
        .rename("second", "SECOND")
        .rename("to_timestamp_s", "TIMESTAMP_SECONDS")
        .rename("to_timestamp_ms", "TIMESTAMP_MILLIS")
        .rename("to_timestamp_us", "TIMESTAMP_MICROS")
}

fn mysql() -> RuleSet {
    RuleSet::common()
        .rename("year", "YEAR")
        .rename("quarter", "QUARTER")
        .rename("month", "MONTH")
        // Mode 3 is the ISO-8601 week
        .template("week_of_year", call("WEEK", vec![arg(0), Template::Int(3)]))
        .rename("day_of_year", "DAYOFYEAR")
        .rename("day", "DAYOFMONTH")
        .rename("hour", "HOUR")
        .rename("minute", "MINUTE")
        .rename("second", "SECOND")
        .rename("to_timestamp_s", "FROM_UNIXTIME")
        .template("to_timestamp_ms", call("FROM_UNIXTIME", vec![div_by("1000")]))
        .template("to_timestamp_us", call("FROM_UNIXTIME", vec![div_by("1000000")]))
        .rename("ceil", "CEILING")
        .rename("length", "CHAR_LENGTH")
        .rename("substr", "SUBSTRING")
}

fn sqlite() -> RuleSet {
    let part = |fmt: &'static str, inner: Template| {
        cast(call("STRFTIME", vec![Template::Str(fmt), inner]), "INTEGER")
    };
    let truncated = || cast(arg(0), "INTEGER");
    // Thursday of the ISO week decides which year and week a date belongs to.
    let iso_thursday = call(
        "DATE",
        vec![arg(0), Template::Str("-3 days"), Template::Str("weekday 4")],
    );
    let iso_week = binary(
        TemplateOp::Add,
        binary(
            TemplateOp::Div,
            binary(TemplateOp::Sub, part("%j", iso_thursday), Template::Int(1)),
            Template::Int(7),
        ),
        Template::Int(1),
    );
    let unix = |scaled: Template| call("DATETIME", vec![scaled, Template::Str("unixepoch")]);

    RuleSet::common()
        .template("year", part("%Y", arg(0)))
        .template(
            "quarter",
            binary(
                TemplateOp::Div,
                binary(TemplateOp::Add, part("%m", arg(0)), Template::Int(2)),
                Template::Int(3),
            ),
        )
        .template("month", part("%m", arg(0)))
        .template("week_of_year", iso_week)
        .template("day_of_year", part("%j", arg(0)))
        .template("day", part("%d", arg(0)))
        .template("hour", part("%H", arg(0)))
        .template("minute", part("%M", arg(0)))
        .template("second", part("%S", arg(0)))
        .template("to_timestamp_s", unix(arg(0)))
        .template("to_timestamp_ms", unix(div_by("1000.0")))
        .template("to_timestamp_us", unix(div_by("1000000.0")))
        .template(
            "ceil",
            binary(
                TemplateOp::Add,
                truncated(),
                binary(TemplateOp::Gt, arg(0), truncated()),
            ),
        )
        .template(
            "floor",
            binary(
                TemplateOp::Sub,
                truncated(),
                binary(TemplateOp::Lt, arg(0), truncated()),
            ),
        )
        .unsupported("stddev", "SQLite has no sample standard deviation aggregate")
        .unsupported("variance", "SQLite has no sample variance aggregate")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_overrides_replace_common_rules() {
        let rules = RuleSet::builtin(Dialect::MySQL);
        assert_eq!(rules.get("ceil"), Some(&RenderRule::Template(rename("CEILING"))));
        assert_eq!(rules.get("floor"), Some(&RenderRule::Template(rename("FLOOR"))));
    }

    #[test]
    fn test_postgres_second_floors_fraction() {
        let rules = RuleSet::builtin(Dialect::Postgres);
        assert_eq!(
            rules.get("second"),
            Some(&RenderRule::Template(cast(
                call("FLOOR", vec![extract("SECOND", arg(0))]),
                "INTEGER"
            )))
        );
    }

    #[test]
    fn test_sqlite_marks_missing_aggregates() {
        let rules = RuleSet::builtin(Dialect::SQLite);
        assert!(matches!(rules.get("stddev"), Some(RenderRule::Unsupported(_))));
        assert!(matches!(rules.get("sum"), Some(RenderRule::Template(_))));
    }
}

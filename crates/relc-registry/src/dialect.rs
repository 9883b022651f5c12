//! Supported SQL dialects and their syntax descriptors

use crate::RegistryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    DuckDB,
    Flink,
    Spark,
    MySQL,
    SQLite,
}

impl Dialect {
    pub const ALL: [Dialect; 6] = [
        Dialect::Postgres,
        Dialect::DuckDB,
        Dialect::Flink,
        Dialect::Spark,
        Dialect::MySQL,
        Dialect::SQLite,
    ];

    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }

    /// Static syntax descriptor for this dialect.
    pub fn descriptor(&self) -> &'static DialectDescriptor {
        match self {
            Dialect::Postgres => &POSTGRES,
            Dialect::DuckDB => &DUCKDB,
            Dialect::Flink => &FLINK,
            Dialect::Spark => &SPARK,
            Dialect::MySQL => &MYSQL,
            Dialect::SQLite => &SQLITE,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "duckdb" => Ok(Dialect::DuckDB),
            "flink" => Ok(Dialect::Flink),
            "spark" | "pyspark" | "sparksql" => Ok(Dialect::Spark),
            "mysql" => Ok(Dialect::MySQL),
            "sqlite" => Ok(Dialect::SQLite),
            _ => Err(RegistryError::UnknownDialect(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStyle {
    DoubleQuote,
    Backtick,
}

impl QuoteStyle {
    pub fn char(&self) -> char {
        match self {
            QuoteStyle::DoubleQuote => '"',
            QuoteStyle::Backtick => '`',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StringEscape {
    /// Only `'` is special; it is doubled.
    Standard,
    /// Backslash is an escape character as well.
    Backslash,
}

/// How `OFFSET` is written when there is no `LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "style", content = "limit", rename_all = "snake_case")]
pub enum OffsetStyle {
    /// `OFFSET n` on its own
    Bare,
    /// `LIMIT <sentinel> OFFSET n`
    LimitSentinel(&'static str),
}

/// DDL statements a dialect accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DdlSupport {
    /// `DATABASE` or `SCHEMA`; `None` when namespaces cannot be created.
    pub database_keyword: Option<&'static str>,
    pub database_if_not_exists: bool,
    pub database_location: bool,
    pub drop_database_cascade: bool,
    pub temporary_view: bool,
    pub or_replace_view: bool,
    pub table_properties: bool,
    pub analyze_table: bool,
}

/// Immutable per-dialect syntax record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialectDescriptor {
    pub name: &'static str,
    pub quote: QuoteStyle,
    pub string_escape: StringEscape,
    /// `DATE '2024-01-01'` rather than a bare string
    pub typed_temporal_literals: bool,
    pub supports_having: bool,
    pub supports_qualify: bool,
    pub supports_filter_clause: bool,
    pub supports_window_functions: bool,
    pub window_requires_order_by: bool,
    /// `int / int` truncates instead of producing a fraction
    pub integer_division_truncates: bool,
    pub supports_right_join: bool,
    pub supports_full_join: bool,
    pub offset_without_limit: OffsetStyle,
    pub ddl: DdlSupport,
}

static POSTGRES: DialectDescriptor = DialectDescriptor {
    name: "postgres",
    quote: QuoteStyle::DoubleQuote,
    string_escape: StringEscape::Standard,
    typed_temporal_literals: true,
    supports_having: true,
    supports_qualify: false,
    supports_filter_clause: true,
    supports_window_functions: true,
    window_requires_order_by: false,
    integer_division_truncates: true,
    supports_right_join: true,
    supports_full_join: true,
    offset_without_limit: OffsetStyle::Bare,
    ddl: DdlSupport {
        database_keyword: Some("DATABASE"),
        database_if_not_exists: false,
        database_location: false,
        drop_database_cascade: false,
        temporary_view: true,
        or_replace_view: true,
        table_properties: false,
        analyze_table: false,
    },
};

static DUCKDB: DialectDescriptor = DialectDescriptor {
    name: "duckdb",
    quote: QuoteStyle::DoubleQuote,
    string_escape: StringEscape::Standard,
    typed_temporal_literals: true,
    supports_having: true,
    supports_qualify: true,
    supports_filter_clause: true,
    supports_window_functions: true,
    window_requires_order_by: false,
    integer_division_truncates: false,
    supports_right_join: true,
    supports_full_join: true,
    offset_without_limit: OffsetStyle::Bare,
    ddl: DdlSupport {
        database_keyword: Some("SCHEMA"),
        database_if_not_exists: true,
        database_location: false,
        drop_database_cascade: true,
        temporary_view: true,
        or_replace_view: true,
        table_properties: false,
        analyze_table: false,
    },
};

static FLINK: DialectDescriptor = DialectDescriptor {
    name: "flink",
    quote: QuoteStyle::Backtick,
    string_escape: StringEscape::Standard,
    typed_temporal_literals: true,
    supports_having: true,
    supports_qualify: false,
    supports_filter_clause: false,
    supports_window_functions: true,
    window_requires_order_by: true,
    integer_division_truncates: true,
    supports_right_join: true,
    supports_full_join: true,
    offset_without_limit: OffsetStyle::Bare,
    ddl: DdlSupport {
        database_keyword: Some("DATABASE"),
        database_if_not_exists: true,
        database_location: false,
        drop_database_cascade: true,
        temporary_view: true,
        or_replace_view: false,
        table_properties: true,
        analyze_table: false,
    },
};

static SPARK: DialectDescriptor = DialectDescriptor {
    name: "spark",
    quote: QuoteStyle::Backtick,
    string_escape: StringEscape::Backslash,
    typed_temporal_literals: true,
    supports_having: true,
    supports_qualify: false,
    supports_filter_clause: true,
    supports_window_functions: true,
    window_requires_order_by: false,
    integer_division_truncates: false,
    supports_right_join: true,
    supports_full_join: true,
    offset_without_limit: OffsetStyle::Bare,
    ddl: DdlSupport {
        database_keyword: Some("DATABASE"),
        database_if_not_exists: true,
        database_location: true,
        drop_database_cascade: true,
        temporary_view: true,
        or_replace_view: true,
        table_properties: false,
        analyze_table: true,
    },
};

static MYSQL: DialectDescriptor = DialectDescriptor {
    name: "mysql",
    quote: QuoteStyle::Backtick,
    string_escape: StringEscape::Backslash,
    typed_temporal_literals: true,
    supports_having: true,
    supports_qualify: false,
    supports_filter_clause: false,
    supports_window_functions: true,
    window_requires_order_by: false,
    integer_division_truncates: false,
    supports_right_join: true,
    supports_full_join: false,
    offset_without_limit: OffsetStyle::LimitSentinel("18446744073709551615"),
    ddl: DdlSupport {
        database_keyword: Some("DATABASE"),
        database_if_not_exists: true,
        database_location: false,
        drop_database_cascade: false,
        temporary_view: false,
        or_replace_view: true,
        table_properties: false,
        analyze_table: false,
    },
};

static SQLITE: DialectDescriptor = DialectDescriptor {
    name: "sqlite",
    quote: QuoteStyle::DoubleQuote,
    string_escape: StringEscape::Standard,
    typed_temporal_literals: false,
    supports_having: true,
    supports_qualify: false,
    supports_filter_clause: true,
    supports_window_functions: true,
    window_requires_order_by: false,
    integer_division_truncates: true,
    supports_right_join: false,
    supports_full_join: false,
    offset_without_limit: OffsetStyle::LimitSentinel("-1"),
    ddl: DdlSupport {
        database_keyword: None,
        database_if_not_exists: false,
        database_location: false,
        drop_database_cascade: false,
        temporary_view: true,
        or_replace_view: false,
        table_properties: false,
        analyze_table: false,
    },
};

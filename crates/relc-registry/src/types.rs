//! Per-dialect SQL type names

use crate::Dialect;
use relc_ir::DataType;

impl Dialect {
    /// Column type used in `CREATE TABLE`.
    pub fn column_type_name(&self, data_type: &DataType) -> Option<String> {
        let name = match (self, data_type) {
            (_, DataType::Null) => return None,
            (_, DataType::Decimal { precision, scale }) => {
                let keyword = match self {
                    Dialect::Postgres | Dialect::SQLite => "NUMERIC",
                    _ => "DECIMAL",
                };
                return Some(format!("{}({}, {})", keyword, precision, scale));
            }

            (Dialect::SQLite, DataType::Bool) => "INTEGER",
            (Dialect::SQLite, t) if t.is_integer() => "INTEGER",
            (Dialect::SQLite, t) if t.is_floating() => "REAL",
            (Dialect::SQLite, DataType::String) => "TEXT",
            (Dialect::SQLite, DataType::Binary) => "BLOB",
            (Dialect::SQLite, DataType::Date | DataType::Time | DataType::Timestamp) => "TEXT",
            (Dialect::SQLite, _) => return None,

            (_, DataType::Bool) => "BOOLEAN",
            (Dialect::Postgres, DataType::Int8 | DataType::Int16) => "SMALLINT",
            (_, DataType::Int8) => "TINYINT",
            (_, DataType::Int16) => "SMALLINT",
            (Dialect::Flink | Dialect::Spark | Dialect::MySQL, DataType::Int32) => "INT",
            (_, DataType::Int32) => "INTEGER",
            (_, DataType::Int64) => "BIGINT",
            (Dialect::Postgres, DataType::Float32) => "REAL",
            (_, DataType::Float32) => "FLOAT",
            (Dialect::Postgres, DataType::Float64) => "DOUBLE PRECISION",
            (_, DataType::Float64) => "DOUBLE",
            (Dialect::Postgres, DataType::String) => "TEXT",
            (Dialect::DuckDB, DataType::String) => "VARCHAR",
            (Dialect::MySQL, DataType::String) => "TEXT",
            (_, DataType::String) => "STRING",
            (Dialect::Postgres, DataType::Binary) => "BYTEA",
            (Dialect::DuckDB, DataType::Binary) => "BLOB",
            (Dialect::Flink, DataType::Binary) => "BYTES",
            (_, DataType::Binary) => "BINARY",
            (_, DataType::Date) => "DATE",
            (Dialect::Spark, DataType::Time) => return None,
            (_, DataType::Time) => "TIME",
            (Dialect::MySQL, DataType::Timestamp) => "DATETIME",
            (_, DataType::Timestamp) => "TIMESTAMP",
            (Dialect::Postgres | Dialect::DuckDB, DataType::Interval) => "INTERVAL",
            (_, DataType::Interval) => return None,
        };
        Some(name.to_string())
    }

    /// Target type in `CAST(x AS ...)`.
    ///
    /// MySQL only casts to a restricted set of type names.
    pub fn cast_type_name(&self, data_type: &DataType) -> Option<String> {
        match (self, data_type) {
            (Dialect::MySQL, DataType::Bool) => Some("SIGNED".to_string()),
            (Dialect::MySQL, t) if t.is_integer() => Some("SIGNED".to_string()),
            (Dialect::MySQL, DataType::String) => Some("CHAR".to_string()),
            _ => self.column_type_name(data_type),
        }
    }
}

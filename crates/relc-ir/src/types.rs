//! Type system for relc IR

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    // Primitives
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal { precision: u8, scale: u8 },

    // Text
    String,

    // Binary
    Binary,

    // Temporal
    Date,
    Time,
    Timestamp,
    Interval,

    // Special
    Null,
}

impl DataType {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_floating() || matches!(self, DataType::Decimal { .. })
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, DataType::Date | DataType::Time | DataType::Timestamp)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DataType::Null)
    }

    /// Whether values of the two types may be compared without an explicit cast.
    pub fn is_comparable_with(&self, other: &DataType) -> bool {
        if self.is_null() || other.is_null() {
            return true;
        }
        if self.is_numeric() && other.is_numeric() {
            return true;
        }
        // Dates compare against timestamps in every supported engine.
        if matches!(
            (self, other),
            (DataType::Date, DataType::Timestamp) | (DataType::Timestamp, DataType::Date)
        ) {
            return true;
        }
        self == other
    }

    /// Widest common type of two operands, if one exists.
    pub fn common_type(&self, other: &DataType) -> Option<DataType> {
        if self.is_null() {
            return Some(other.clone());
        }
        if other.is_null() || self == other {
            return Some(self.clone());
        }
        if self.is_numeric() && other.is_numeric() {
            return Some(promote_numeric(self, other));
        }
        match (self, other) {
            (DataType::Date, DataType::Timestamp) | (DataType::Timestamp, DataType::Date) => {
                Some(DataType::Timestamp)
            }
            _ => None,
        }
    }

    fn integer_rank(&self) -> u8 {
        match self {
            DataType::Int8 => 1,
            DataType::Int16 => 2,
            DataType::Int32 => 3,
            DataType::Int64 => 4,
            _ => 0,
        }
    }
}

fn promote_numeric(left: &DataType, right: &DataType) -> DataType {
    match (left, right) {
        (DataType::Float64, _) | (_, DataType::Float64) => DataType::Float64,
        (DataType::Float32, r) | (r, DataType::Float32) => {
            // Float32 cannot represent every Int64/Decimal exactly.
            if matches!(r, DataType::Int64 | DataType::Decimal { .. }) {
                DataType::Float64
            } else {
                DataType::Float32
            }
        }
        (
            DataType::Decimal { precision: p1, scale: s1 },
            DataType::Decimal { precision: p2, scale: s2 },
        ) => DataType::Decimal {
            precision: (*p1).max(*p2),
            scale: (*s1).max(*s2),
        },
        (d @ DataType::Decimal { .. }, _) | (_, d @ DataType::Decimal { .. }) => d.clone(),
        (l, r) => {
            if l.integer_rank() >= r.integer_rank() {
                l.clone()
            } else {
                r.clone()
            }
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => write!(f, "boolean"),
            DataType::Int8 => write!(f, "int8"),
            DataType::Int16 => write!(f, "int16"),
            DataType::Int32 => write!(f, "int32"),
            DataType::Int64 => write!(f, "int64"),
            DataType::Float32 => write!(f, "float32"),
            DataType::Float64 => write!(f, "float64"),
            DataType::Decimal { precision, scale } => write!(f, "decimal({}, {})", precision, scale),
            DataType::String => write!(f, "string"),
            DataType::Binary => write!(f, "binary"),
            DataType::Date => write!(f, "date"),
            DataType::Time => write!(f, "time"),
            DataType::Timestamp => write!(f, "timestamp"),
            DataType::Interval => write!(f, "interval"),
            DataType::Null => write!(f, "null"),
        }
    }
}

/// Unit of an integer epoch value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    #[serde(alias = "s")]
    Seconds,
    #[serde(alias = "ms")]
    Milliseconds,
    #[serde(alias = "us")]
    Microseconds,
}

impl TimeUnit {
    pub fn suffix(&self) -> &'static str {
        match self {
            TimeUnit::Seconds => "s",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Microseconds => "us",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }
}

/// Ordered list of named, typed columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Build a schema from `(name, type)` pairs.
    pub fn from_pairs<S: Into<String>>(pairs: impl IntoIterator<Item = (S, DataType)>) -> Self {
        Self {
            fields: pairs
                .into_iter()
                .map(|(name, data_type)| Field::new(name, data_type))
                .collect(),
        }
    }

    pub fn find_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find_field(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// First duplicated column name, if any.
    pub fn duplicate_name(&self) -> Option<&str> {
        let mut seen = std::collections::HashSet::new();
        self.fields
            .iter()
            .map(|f| f.name.as_str())
            .find(|name| !seen.insert(*name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_promotion() {
        assert_eq!(DataType::Int8.common_type(&DataType::Int32), Some(DataType::Int32));
        assert_eq!(DataType::Int64.common_type(&DataType::Float32), Some(DataType::Float64));
        assert_eq!(DataType::Int16.common_type(&DataType::Float32), Some(DataType::Float32));
        assert_eq!(DataType::String.common_type(&DataType::Int32), None);
        assert_eq!(DataType::Null.common_type(&DataType::String), Some(DataType::String));
    }

    #[test]
    fn test_comparability() {
        assert!(DataType::Int8.is_comparable_with(&DataType::Float64));
        assert!(DataType::Date.is_comparable_with(&DataType::Timestamp));
        assert!(!DataType::String.is_comparable_with(&DataType::Int64));
        assert!(!DataType::Bool.is_comparable_with(&DataType::Int8));
    }

    #[test]
    fn test_duplicate_name() {
        let schema = Schema::from_pairs([("a", DataType::Int8), ("b", DataType::Int8), ("a", DataType::String)]);
        assert_eq!(schema.duplicate_name(), Some("a"));
        assert_eq!(Schema::from_pairs([("a", DataType::Int8)]).duplicate_name(), None);
    }

    #[test]
    fn test_data_type_json() {
        let json = serde_json::to_string(&DataType::Int64).unwrap();
        assert_eq!(json, "\"int64\"");
        let parsed: DataType = serde_json::from_str("\"timestamp\"").unwrap();
        assert_eq!(parsed, DataType::Timestamp);
    }
}

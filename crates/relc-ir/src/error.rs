//! Errors raised while constructing operator trees

use crate::DataType;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IrError {
    #[error("Type mismatch in {context}: expected {expected}, got {actual}")]
    TypeMismatch {
        context: String,
        expected: String,
        actual: DataType,
    },

    #[error("Column not found: {column}. Available columns: {available:?}")]
    ColumnNotFound {
        column: String,
        available: Vec<String>,
    },

    #[error("Ambiguous column reference: {column}. Candidates: {candidates:?}")]
    AmbiguousColumnReference {
        column: String,
        candidates: Vec<String>,
    },

    #[error("Duplicate output column: {0}")]
    DuplicateColumn(String),

    #[error("Invalid aggregation: {0}")]
    InvalidAggregation(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),
}

impl IrError {
    pub(crate) fn mismatch(context: impl Into<String>, expected: impl Into<String>, actual: &DataType) -> Self {
        IrError::TypeMismatch {
            context: context.into(),
            expected: expected.into(),
            actual: actual.clone(),
        }
    }
}

pub type IrResult<T> = Result<T, IrError>;

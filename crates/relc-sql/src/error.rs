//! Compilation errors

use relc_ir::{DataType, IrError};
use relc_registry::{Dialect, RegistryError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("Unsupported operator {operator} for dialect {dialect}: {detail}")]
    UnsupportedOperator {
        operator: String,
        dialect: Dialect,
        detail: String,
    },

    #[error("Unsupported expression {expression} for dialect {dialect}: {detail}")]
    UnsupportedExpression {
        expression: String,
        dialect: Dialect,
        detail: String,
    },

    #[error("Ambiguous column reference: {column}. Candidates: {candidates:?}")]
    AmbiguousColumnReference {
        column: String,
        candidates: Vec<String>,
    },

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

    #[error("Invalid plan: {0}")]
    Ir(IrError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl CompileError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CompileError::UnsupportedOperator { .. } => "unsupported_operator",
            CompileError::UnsupportedExpression { .. } => "unsupported_expression",
            CompileError::AmbiguousColumnReference { .. } => "ambiguous_column",
            CompileError::TypeMismatch { .. } => "type_mismatch",
            CompileError::ColumnNotFound { .. } => "column_not_found",
            CompileError::Ir(_) => "invalid_plan",
            CompileError::Registry(_) => "registry",
        }
    }
}

impl From<IrError> for CompileError {
    fn from(err: IrError) -> Self {
        match err {
            IrError::TypeMismatch {
                context,
                expected,
                actual,
            } => CompileError::TypeMismatch {
                context,
                expected,
                actual,
            },
            IrError::ColumnNotFound { column, available } => {
                CompileError::ColumnNotFound { column, available }
            }
            IrError::AmbiguousColumnReference { column, candidates } => {
                CompileError::AmbiguousColumnReference { column, candidates }
            }
            other => CompileError::Ir(other),
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

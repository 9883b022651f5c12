//! Scalar expressions
//!
//! Every constructor resolves the semantic type of the node it builds, so an
//! `Expr` always carries a final `DataType`. Operand type errors surface here,
//! at construction, never during compilation.

use crate::error::{IrError, IrResult};
use crate::types::{DataType, TimeUnit};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Literal values
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Bool,
            Value::Int(_) => DataType::Int64,
            Value::Float(_) => DataType::Float64,
            Value::String(_) => DataType::String,
            Value::Date(_) => DataType::Date,
            Value::Timestamp(_) => DataType::Timestamp,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "'{}'", s),
            Value::Date(d) => write!(f, "{}", d),
            Value::Timestamp(ts) => write!(f, "{}", ts),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

/// Reference to a column of an input relation.
///
/// `relation` is the qualifier of the base table the reference was taken
/// from. Above a join it selects the input column even after a rename.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub relation: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
    Or,
    // String
    Like,
}

impl BinaryOp {
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    fn display_name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "Add",
            BinaryOp::Sub => "Subtract",
            BinaryOp::Mul => "Multiply",
            BinaryOp::Div => "Divide",
            BinaryOp::Mod => "Modulus",
            BinaryOp::Eq => "Equals",
            BinaryOp::NotEq => "NotEquals",
            BinaryOp::Lt => "Less",
            BinaryOp::LtEq => "LessEqual",
            BinaryOp::Gt => "Greater",
            BinaryOp::GtEq => "GreaterEqual",
            BinaryOp::And => "And",
            BinaryOp::Or => "Or",
            BinaryOp::Like => "Like",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Scalar functions resolved through the dialect rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarFunc {
    Abs,
    Ceil,
    Floor,
    Round,
    Lower,
    Upper,
    Length,
    Substr,
    Coalesce,
}

impl ScalarFunc {
    /// Rule table key for a call with `arity` arguments.
    pub fn rule_name(&self, arity: usize) -> &'static str {
        match self {
            ScalarFunc::Abs => "abs",
            ScalarFunc::Ceil => "ceil",
            ScalarFunc::Floor => "floor",
            ScalarFunc::Round if arity > 1 => "round_digits",
            ScalarFunc::Round => "round",
            ScalarFunc::Lower => "lower",
            ScalarFunc::Upper => "upper",
            ScalarFunc::Length => "length",
            ScalarFunc::Substr => "substr",
            ScalarFunc::Coalesce => "coalesce",
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            ScalarFunc::Abs => "Abs",
            ScalarFunc::Ceil => "Ceil",
            ScalarFunc::Floor => "Floor",
            ScalarFunc::Round => "Round",
            ScalarFunc::Lower => "Lowercase",
            ScalarFunc::Upper => "Uppercase",
            ScalarFunc::Length => "StringLength",
            ScalarFunc::Substr => "Substring",
            ScalarFunc::Coalesce => "Coalesce",
        }
    }
}

/// Date/time fields that can be extracted from temporal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePart {
    Year,
    Quarter,
    Month,
    WeekOfYear,
    DayOfYear,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    pub const ALL: [DatePart; 9] = [
        DatePart::Year,
        DatePart::Quarter,
        DatePart::Month,
        DatePart::WeekOfYear,
        DatePart::DayOfYear,
        DatePart::Day,
        DatePart::Hour,
        DatePart::Minute,
        DatePart::Second,
    ];

    pub fn rule_name(&self) -> &'static str {
        match self {
            DatePart::Year => "year",
            DatePart::Quarter => "quarter",
            DatePart::Month => "month",
            DatePart::WeekOfYear => "week_of_year",
            DatePart::DayOfYear => "day_of_year",
            DatePart::Day => "day",
            DatePart::Hour => "hour",
            DatePart::Minute => "minute",
            DatePart::Second => "second",
        }
    }

    fn is_time_of_day(&self) -> bool {
        matches!(self, DatePart::Hour | DatePart::Minute | DatePart::Second)
    }

    fn display_name(&self) -> &'static str {
        match self {
            DatePart::Year => "ExtractYear",
            DatePart::Quarter => "ExtractQuarter",
            DatePart::Month => "ExtractMonth",
            DatePart::WeekOfYear => "ExtractWeekOfYear",
            DatePart::DayOfYear => "ExtractDayOfYear",
            DatePart::Day => "ExtractDay",
            DatePart::Hour => "ExtractHour",
            DatePart::Minute => "ExtractMinute",
            DatePart::Second => "ExtractSecond",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggFunc {
    Count,
    Sum,
    Mean,
    Min,
    Max,
    StdDev,
    Variance,
}

impl AggFunc {
    pub fn rule_name(&self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::StdDev => "stddev",
            AggFunc::Variance => "variance",
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            AggFunc::Count => "Count",
            AggFunc::Sum => "Sum",
            AggFunc::Mean => "Mean",
            AggFunc::Min => "Min",
            AggFunc::Max => "Max",
            AggFunc::StdDev => "StandardDev",
            AggFunc::Variance => "Variance",
        }
    }

    fn result_type(&self, arg: Option<&DataType>) -> IrResult<DataType> {
        let context = self.display_name();
        match (self, arg) {
            (AggFunc::Count, _) => Ok(DataType::Int64),
            (_, None) => Err(IrError::InvalidAggregation(format!(
                "{} requires an argument",
                context
            ))),
            (AggFunc::Sum, Some(t)) if t.is_integer() || t.is_null() => Ok(DataType::Int64),
            (AggFunc::Sum, Some(t)) if t.is_floating() => Ok(DataType::Float64),
            (AggFunc::Sum, Some(DataType::Decimal { scale, .. })) => Ok(DataType::Decimal {
                precision: 38,
                scale: *scale,
            }),
            (AggFunc::Mean | AggFunc::StdDev | AggFunc::Variance, Some(t))
                if t.is_numeric() || t.is_null() =>
            {
                Ok(DataType::Float64)
            }
            (AggFunc::Min | AggFunc::Max, Some(t)) if !matches!(t, DataType::Binary) => Ok(t.clone()),
            (_, Some(t)) => Err(IrError::mismatch(context, "numeric", t)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowFunc {
    RowNumber,
    Rank,
    DenseRank,
    Lag,
    Lead,
    Aggregate(AggFunc),
}

impl WindowFunc {
    pub fn rule_name(&self) -> &'static str {
        match self {
            WindowFunc::RowNumber => "row_number",
            WindowFunc::Rank => "rank",
            WindowFunc::DenseRank => "dense_rank",
            WindowFunc::Lag => "lag",
            WindowFunc::Lead => "lead",
            WindowFunc::Aggregate(agg) => agg.rule_name(),
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            WindowFunc::RowNumber => "RowNumber",
            WindowFunc::Rank => "MinRank",
            WindowFunc::DenseRank => "DenseRank",
            WindowFunc::Lag => "Lag",
            WindowFunc::Lead => "Lead",
            WindowFunc::Aggregate(agg) => agg.display_name(),
        }
    }
}

/// Ordering key for sorts and window frames.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Value),
    Column(ColumnRef),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Function {
        func: ScalarFunc,
        args: Vec<Expr>,
    },
    Extract {
        part: DatePart,
        operand: Box<Expr>,
    },
    ToTimestamp {
        operand: Box<Expr>,
        unit: TimeUnit,
    },
    InList {
        operand: Box<Expr>,
        values: Vec<Value>,
        negated: bool,
    },
    IsNull {
        operand: Box<Expr>,
        negated: bool,
    },
    Cast {
        operand: Box<Expr>,
        to: DataType,
    },
    Case {
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
    Aggregate {
        func: AggFunc,
        /// `None` only for `COUNT(*)`
        arg: Option<Box<Expr>>,
        distinct: bool,
        filter: Option<Box<Expr>>,
    },
    Window {
        func: WindowFunc,
        args: Vec<Expr>,
        partition_by: Vec<Expr>,
        order_by: Vec<SortKey>,
    },
}

/// A typed scalar expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    kind: ExprKind,
    data_type: DataType,
}

/// Literal expression.
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::literal(value.into())
}

/// `COUNT(*)`
pub fn count_star() -> Expr {
    Expr {
        kind: ExprKind::Aggregate {
            func: AggFunc::Count,
            arg: None,
            distinct: false,
            filter: None,
        },
        data_type: DataType::Int64,
    }
}

/// `ROW_NUMBER()`; attach a window with [`Expr::over`].
pub fn row_number() -> Expr {
    Expr::ranking(WindowFunc::RowNumber)
}

pub fn rank() -> Expr {
    Expr::ranking(WindowFunc::Rank)
}

pub fn dense_rank() -> Expr {
    Expr::ranking(WindowFunc::DenseRank)
}

macro_rules! literal_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Expr {
                fn from(value: $t) -> Self {
                    Expr::literal(value.into())
                }
            }
        )*
    };
}

literal_from!(bool, i32, i64, f64, &str, String, NaiveDate, NaiveDateTime, Value);

impl Expr {
    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn literal(value: Value) -> Self {
        let data_type = value.data_type();
        Self {
            kind: ExprKind::Literal(value),
            data_type,
        }
    }

    /// Column reference with a type supplied by the owning relation.
    pub fn column(relation: Option<String>, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            kind: ExprKind::Column(ColumnRef {
                relation,
                name: name.into(),
            }),
            data_type,
        }
    }

    fn ranking(func: WindowFunc) -> Self {
        Self {
            kind: ExprKind::Window {
                func,
                args: vec![],
                partition_by: vec![],
                order_by: vec![],
            },
            data_type: DataType::Int64,
        }
    }

    pub fn as_column(&self) -> Option<&ColumnRef> {
        match &self.kind {
            ExprKind::Column(col) => Some(col),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> IrResult<Expr> {
        let (lt, rt) = (&left.data_type, &right.data_type);
        let context = op.display_name();
        let data_type = if op.is_arithmetic() {
            if !lt.is_numeric() && !lt.is_null() {
                return Err(IrError::mismatch(context, "numeric", lt));
            }
            if !rt.is_numeric() && !rt.is_null() {
                return Err(IrError::mismatch(context, "numeric", rt));
            }
            match op {
                BinaryOp::Div => DataType::Float64,
                BinaryOp::Mod if !(lt.is_integer() || lt.is_null()) => {
                    return Err(IrError::mismatch(context, "integer", lt));
                }
                BinaryOp::Mod if !(rt.is_integer() || rt.is_null()) => {
                    return Err(IrError::mismatch(context, "integer", rt));
                }
                _ => lt
                    .common_type(rt)
                    .ok_or_else(|| IrError::mismatch(context, lt.to_string(), rt))?,
            }
        } else if op.is_comparison() {
            if !lt.is_comparable_with(rt) {
                return Err(IrError::mismatch(context, lt.to_string(), rt));
            }
            DataType::Bool
        } else if op.is_logical() {
            for t in [lt, rt] {
                if !matches!(t, DataType::Bool | DataType::Null) {
                    return Err(IrError::mismatch(context, "boolean", t));
                }
            }
            DataType::Bool
        } else {
            for t in [lt, rt] {
                if !matches!(t, DataType::String | DataType::Null) {
                    return Err(IrError::mismatch(context, "string", t));
                }
            }
            DataType::Bool
        };

        Ok(Self {
            kind: ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            data_type,
        })
    }

    pub fn add(self, other: impl Into<Expr>) -> IrResult<Expr> {
        Self::binary(BinaryOp::Add, self, other.into())
    }

    pub fn sub(self, other: impl Into<Expr>) -> IrResult<Expr> {
        Self::binary(BinaryOp::Sub, self, other.into())
    }

    pub fn mul(self, other: impl Into<Expr>) -> IrResult<Expr> {
        Self::binary(BinaryOp::Mul, self, other.into())
    }

    pub fn div(self, other: impl Into<Expr>) -> IrResult<Expr> {
        Self::binary(BinaryOp::Div, self, other.into())
    }

    pub fn modulo(self, other: impl Into<Expr>) -> IrResult<Expr> {
        Self::binary(BinaryOp::Mod, self, other.into())
    }

    pub fn eq(self, other: impl Into<Expr>) -> IrResult<Expr> {
        Self::binary(BinaryOp::Eq, self, other.into())
    }

    pub fn not_eq(self, other: impl Into<Expr>) -> IrResult<Expr> {
        Self::binary(BinaryOp::NotEq, self, other.into())
    }

    pub fn lt(self, other: impl Into<Expr>) -> IrResult<Expr> {
        Self::binary(BinaryOp::Lt, self, other.into())
    }

    pub fn lt_eq(self, other: impl Into<Expr>) -> IrResult<Expr> {
        Self::binary(BinaryOp::LtEq, self, other.into())
    }

    pub fn gt(self, other: impl Into<Expr>) -> IrResult<Expr> {
        Self::binary(BinaryOp::Gt, self, other.into())
    }

    pub fn gt_eq(self, other: impl Into<Expr>) -> IrResult<Expr> {
        Self::binary(BinaryOp::GtEq, self, other.into())
    }

    pub fn and(self, other: impl Into<Expr>) -> IrResult<Expr> {
        Self::binary(BinaryOp::And, self, other.into())
    }

    pub fn or(self, other: impl Into<Expr>) -> IrResult<Expr> {
        Self::binary(BinaryOp::Or, self, other.into())
    }

    pub fn like(self, pattern: impl Into<Expr>) -> IrResult<Expr> {
        Self::binary(BinaryOp::Like, self, pattern.into())
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> IrResult<Expr> {
        let t = &operand.data_type;
        let data_type = match op {
            UnaryOp::Neg if t.is_numeric() || t.is_null() => t.clone(),
            UnaryOp::Neg => return Err(IrError::mismatch("Negate", "numeric", t)),
            UnaryOp::Not if matches!(t, DataType::Bool | DataType::Null) => DataType::Bool,
            UnaryOp::Not => return Err(IrError::mismatch("Not", "boolean", t)),
        };
        Ok(Self {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            data_type,
        })
    }

    pub fn neg(self) -> IrResult<Expr> {
        Self::unary(UnaryOp::Neg, self)
    }

    pub fn not(self) -> IrResult<Expr> {
        Self::unary(UnaryOp::Not, self)
    }

    pub fn is_null(self) -> Expr {
        Self::null_check(self, false)
    }

    pub fn is_not_null(self) -> Expr {
        Self::null_check(self, true)
    }

    fn null_check(operand: Expr, negated: bool) -> Expr {
        Self {
            kind: ExprKind::IsNull {
                operand: Box::new(operand),
                negated,
            },
            data_type: DataType::Bool,
        }
    }

    /// Membership test against a literal set.
    pub fn isin<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> IrResult<Expr> {
        self.in_list(values, false)
    }

    pub fn notin<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> IrResult<Expr> {
        self.in_list(values, true)
    }

    fn in_list<V: Into<Value>>(
        self,
        values: impl IntoIterator<Item = V>,
        negated: bool,
    ) -> IrResult<Expr> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        for value in &values {
            if !self.data_type.is_comparable_with(&value.data_type()) {
                return Err(IrError::mismatch(
                    "InValues",
                    self.data_type.to_string(),
                    &value.data_type(),
                ));
            }
        }
        Ok(Self {
            kind: ExprKind::InList {
                operand: Box::new(self),
                values,
                negated,
            },
            data_type: DataType::Bool,
        })
    }

    pub fn cast(self, to: DataType) -> Expr {
        Self {
            data_type: to.clone(),
            kind: ExprKind::Cast {
                operand: Box::new(self),
                to,
            },
        }
    }

    /// Searched `CASE WHEN ... THEN ... [ELSE ...] END`.
    pub fn case(branches: Vec<(Expr, Expr)>, otherwise: Option<Expr>) -> IrResult<Expr> {
        if branches.is_empty() {
            return Err(IrError::InvalidPlan("CASE requires at least one branch".to_string()));
        }
        let mut data_type = DataType::Null;
        for (condition, result) in &branches {
            if !matches!(condition.data_type, DataType::Bool | DataType::Null) {
                return Err(IrError::mismatch("SearchedCase", "boolean", &condition.data_type));
            }
            data_type = data_type
                .common_type(&result.data_type)
                .ok_or_else(|| IrError::mismatch("SearchedCase", data_type.to_string(), &result.data_type))?;
        }
        if let Some(other) = &otherwise {
            data_type = data_type
                .common_type(&other.data_type)
                .ok_or_else(|| IrError::mismatch("SearchedCase", data_type.to_string(), &other.data_type))?;
        }
        Ok(Self {
            kind: ExprKind::Case {
                branches,
                otherwise: otherwise.map(Box::new),
            },
            data_type,
        })
    }

    // ------------------------------------------------------------------
    // Scalar functions
    // ------------------------------------------------------------------

    pub fn function(func: ScalarFunc, args: Vec<Expr>) -> IrResult<Expr> {
        let context = func.display_name();
        let arity_error = || {
            IrError::InvalidPlan(format!("{} called with {} arguments", context, args.len()))
        };
        let first = args.first().map(|a| a.data_type.clone()).ok_or_else(arity_error)?;

        let data_type = match func {
            ScalarFunc::Abs | ScalarFunc::Ceil | ScalarFunc::Floor | ScalarFunc::Round => {
                if !first.is_numeric() && !first.is_null() {
                    return Err(IrError::mismatch(context, "numeric", &first));
                }
                match (func, args.len()) {
                    (ScalarFunc::Abs, 1) => first,
                    (ScalarFunc::Ceil | ScalarFunc::Floor, 1) if first.is_floating() => DataType::Int64,
                    (ScalarFunc::Ceil | ScalarFunc::Floor, 1) => first,
                    (ScalarFunc::Round, 1) => DataType::Int64,
                    (ScalarFunc::Round, 2) => {
                        if !args[1].data_type.is_integer() {
                            return Err(IrError::mismatch(context, "integer", &args[1].data_type));
                        }
                        if first.is_integer() {
                            first
                        } else if first.is_floating() {
                            DataType::Float64
                        } else {
                            first
                        }
                    }
                    _ => return Err(arity_error()),
                }
            }
            ScalarFunc::Lower | ScalarFunc::Upper | ScalarFunc::Length => {
                if args.len() != 1 {
                    return Err(arity_error());
                }
                if !matches!(first, DataType::String | DataType::Null) {
                    return Err(IrError::mismatch(context, "string", &first));
                }
                if func == ScalarFunc::Length {
                    DataType::Int32
                } else {
                    DataType::String
                }
            }
            ScalarFunc::Substr => {
                if !(2..=3).contains(&args.len()) {
                    return Err(arity_error());
                }
                if !matches!(first, DataType::String | DataType::Null) {
                    return Err(IrError::mismatch(context, "string", &first));
                }
                for arg in &args[1..] {
                    if !arg.data_type.is_integer() {
                        return Err(IrError::mismatch(context, "integer", &arg.data_type));
                    }
                }
                DataType::String
            }
            ScalarFunc::Coalesce => {
                let mut common = DataType::Null;
                for arg in &args {
                    common = common
                        .common_type(&arg.data_type)
                        .ok_or_else(|| IrError::mismatch(context, common.to_string(), &arg.data_type))?;
                }
                common
            }
        };

        Ok(Self {
            kind: ExprKind::Function { func, args },
            data_type,
        })
    }

    pub fn abs(self) -> IrResult<Expr> {
        Self::function(ScalarFunc::Abs, vec![self])
    }

    pub fn ceil(self) -> IrResult<Expr> {
        Self::function(ScalarFunc::Ceil, vec![self])
    }

    pub fn floor(self) -> IrResult<Expr> {
        Self::function(ScalarFunc::Floor, vec![self])
    }

    pub fn round(self, digits: Option<i64>) -> IrResult<Expr> {
        match digits {
            Some(d) => Self::function(ScalarFunc::Round, vec![self, lit(d)]),
            None => Self::function(ScalarFunc::Round, vec![self]),
        }
    }

    pub fn lower(self) -> IrResult<Expr> {
        Self::function(ScalarFunc::Lower, vec![self])
    }

    pub fn upper(self) -> IrResult<Expr> {
        Self::function(ScalarFunc::Upper, vec![self])
    }

    pub fn length(self) -> IrResult<Expr> {
        Self::function(ScalarFunc::Length, vec![self])
    }

    /// 1-based substring.
    pub fn substr(self, start: i64, length: Option<i64>) -> IrResult<Expr> {
        let mut args = vec![self, lit(start)];
        if let Some(len) = length {
            args.push(lit(len));
        }
        Self::function(ScalarFunc::Substr, args)
    }

    pub fn coalesce(self, others: impl IntoIterator<Item = Expr>) -> IrResult<Expr> {
        let mut args = vec![self];
        args.extend(others);
        Self::function(ScalarFunc::Coalesce, args)
    }

    // ------------------------------------------------------------------
    // Temporal
    // ------------------------------------------------------------------

    pub fn extract(self, part: DatePart) -> IrResult<Expr> {
        let t = &self.data_type;
        let ok = if part.is_time_of_day() {
            matches!(t, DataType::Timestamp | DataType::Time)
        } else {
            matches!(t, DataType::Timestamp | DataType::Date)
        };
        if !ok {
            return Err(IrError::mismatch(part.display_name(), "temporal", t));
        }
        Ok(Self {
            kind: ExprKind::Extract {
                part,
                operand: Box::new(self),
            },
            data_type: DataType::Int32,
        })
    }

    pub fn year(self) -> IrResult<Expr> {
        self.extract(DatePart::Year)
    }

    pub fn quarter(self) -> IrResult<Expr> {
        self.extract(DatePart::Quarter)
    }

    pub fn month(self) -> IrResult<Expr> {
        self.extract(DatePart::Month)
    }

    pub fn week_of_year(self) -> IrResult<Expr> {
        self.extract(DatePart::WeekOfYear)
    }

    pub fn day_of_year(self) -> IrResult<Expr> {
        self.extract(DatePart::DayOfYear)
    }

    pub fn day(self) -> IrResult<Expr> {
        self.extract(DatePart::Day)
    }

    pub fn hour(self) -> IrResult<Expr> {
        self.extract(DatePart::Hour)
    }

    pub fn minute(self) -> IrResult<Expr> {
        self.extract(DatePart::Minute)
    }

    pub fn second(self) -> IrResult<Expr> {
        self.extract(DatePart::Second)
    }

    /// Interpret an integer epoch value in `unit` as a timestamp.
    pub fn to_timestamp(self, unit: TimeUnit) -> IrResult<Expr> {
        if !self.data_type.is_integer() {
            return Err(IrError::mismatch("TimestampFromUNIX", "integer", &self.data_type));
        }
        Ok(Self {
            kind: ExprKind::ToTimestamp {
                operand: Box::new(self),
                unit,
            },
            data_type: DataType::Timestamp,
        })
    }

    // ------------------------------------------------------------------
    // Reductions
    // ------------------------------------------------------------------

    pub fn aggregate(func: AggFunc, arg: Expr, distinct: bool) -> IrResult<Expr> {
        if arg.contains_aggregate() {
            return Err(IrError::InvalidAggregation(format!(
                "nested aggregate inside {}",
                func.display_name()
            )));
        }
        if arg.contains_window() {
            return Err(IrError::InvalidAggregation(format!(
                "window function inside {}",
                func.display_name()
            )));
        }
        let data_type = func.result_type(Some(&arg.data_type))?;
        Ok(Self {
            kind: ExprKind::Aggregate {
                func,
                arg: Some(Box::new(arg)),
                distinct,
                filter: None,
            },
            data_type,
        })
    }

    pub fn count(self) -> IrResult<Expr> {
        Self::aggregate(AggFunc::Count, self, false)
    }

    /// Number of distinct non-null values.
    pub fn nunique(self) -> IrResult<Expr> {
        Self::aggregate(AggFunc::Count, self, true)
    }

    pub fn sum(self) -> IrResult<Expr> {
        Self::aggregate(AggFunc::Sum, self, false)
    }

    pub fn mean(self) -> IrResult<Expr> {
        Self::aggregate(AggFunc::Mean, self, false)
    }

    pub fn min(self) -> IrResult<Expr> {
        Self::aggregate(AggFunc::Min, self, false)
    }

    pub fn max(self) -> IrResult<Expr> {
        Self::aggregate(AggFunc::Max, self, false)
    }

    pub fn std(self) -> IrResult<Expr> {
        Self::aggregate(AggFunc::StdDev, self, false)
    }

    pub fn var(self) -> IrResult<Expr> {
        Self::aggregate(AggFunc::Variance, self, false)
    }

    /// Restrict an aggregate to rows matching `predicate`.
    pub fn with_filter(self, predicate: Expr) -> IrResult<Expr> {
        if !matches!(predicate.data_type, DataType::Bool | DataType::Null) {
            return Err(IrError::mismatch("aggregate filter", "boolean", &predicate.data_type));
        }
        if predicate.contains_aggregate() || predicate.contains_window() {
            return Err(IrError::InvalidAggregation(
                "aggregate filter must be a row-level predicate".to_string(),
            ));
        }
        let data_type = self.data_type;
        match self.kind {
            ExprKind::Aggregate {
                func,
                arg,
                distinct,
                filter: None,
            } => Ok(Self {
                kind: ExprKind::Aggregate {
                    func,
                    arg,
                    distinct,
                    filter: Some(Box::new(predicate)),
                },
                data_type,
            }),
            ExprKind::Aggregate { .. } => Err(IrError::InvalidAggregation(
                "aggregate already has a filter".to_string(),
            )),
            _ => Err(IrError::InvalidAggregation(
                "filters apply to aggregates only".to_string(),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Windows
    // ------------------------------------------------------------------

    /// `LAG(self, offset)` over a window attached with [`Expr::over`].
    pub fn lag(self, offset: i64) -> IrResult<Expr> {
        self.shift(WindowFunc::Lag, offset)
    }

    pub fn lead(self, offset: i64) -> IrResult<Expr> {
        self.shift(WindowFunc::Lead, offset)
    }

    fn shift(self, func: WindowFunc, offset: i64) -> IrResult<Expr> {
        if self.contains_window() || self.contains_aggregate() {
            return Err(IrError::InvalidAggregation(format!(
                "{} argument must be a row-level expression",
                func.display_name()
            )));
        }
        let data_type = self.data_type.clone();
        Ok(Self {
            kind: ExprKind::Window {
                func,
                args: vec![self, lit(offset)],
                partition_by: vec![],
                order_by: vec![],
            },
            data_type,
        })
    }

    /// Attach a window specification to a window function or plain aggregate.
    pub fn over(self, partition_by: Vec<Expr>, order_by: Vec<SortKey>) -> IrResult<Expr> {
        for key in partition_by.iter().chain(order_by.iter().map(|k| &k.expr)) {
            if key.contains_window() || key.contains_aggregate() {
                return Err(IrError::InvalidAggregation(
                    "window keys must be row-level expressions".to_string(),
                ));
            }
        }
        let data_type = self.data_type;
        let (func, args) = match self.kind {
            ExprKind::Window { func, args, .. } => (func, args),
            ExprKind::Aggregate {
                func,
                arg,
                distinct: false,
                filter: None,
            } => (WindowFunc::Aggregate(func), arg.map(|a| vec![*a]).unwrap_or_default()),
            ExprKind::Aggregate { .. } => {
                return Err(IrError::InvalidAggregation(
                    "DISTINCT or filtered aggregates cannot be windowed".to_string(),
                ));
            }
            _ => {
                return Err(IrError::InvalidAggregation(
                    "OVER applies to window functions and aggregates only".to_string(),
                ));
            }
        };
        Ok(Self {
            kind: ExprKind::Window {
                func,
                args,
                partition_by,
                order_by,
            },
            data_type,
        })
    }

    pub fn asc(self) -> SortKey {
        SortKey {
            expr: self,
            descending: false,
        }
    }

    pub fn desc(self) -> SortKey {
        SortKey {
            expr: self,
            descending: true,
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Child expressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Column(_) => vec![],
            ExprKind::Unary { operand, .. }
            | ExprKind::Extract { operand, .. }
            | ExprKind::ToTimestamp { operand, .. }
            | ExprKind::InList { operand, .. }
            | ExprKind::IsNull { operand, .. }
            | ExprKind::Cast { operand, .. } => vec![operand.as_ref()],
            ExprKind::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            ExprKind::Function { args, .. } => args.iter().collect(),
            ExprKind::Case { branches, otherwise } => {
                let mut out: Vec<&Expr> = branches.iter().flat_map(|(c, r)| [c, r]).collect();
                if let Some(other) = otherwise {
                    out.push(other.as_ref());
                }
                out
            }
            ExprKind::Aggregate { arg, filter, .. } => {
                arg.iter().chain(filter.iter()).map(|e| e.as_ref()).collect()
            }
            ExprKind::Window {
                args,
                partition_by,
                order_by,
                ..
            } => args
                .iter()
                .chain(partition_by.iter())
                .chain(order_by.iter().map(|k| &k.expr))
                .collect(),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, ExprKind::Aggregate { .. })
    }

    pub fn contains_aggregate(&self) -> bool {
        // Aggregates inside a window are evaluated per window, not per group.
        match &self.kind {
            ExprKind::Aggregate { .. } => true,
            ExprKind::Window { .. } => false,
            _ => self.children().into_iter().any(Expr::contains_aggregate),
        }
    }

    pub fn contains_window(&self) -> bool {
        matches!(self.kind, ExprKind::Window { .. })
            || self.children().into_iter().any(Expr::contains_window)
    }

    /// Every column reference in the tree, left to right.
    pub fn column_refs(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        if let ExprKind::Column(col) = &self.kind {
            out.push(col);
        }
        for child in self.children() {
            child.collect_refs(out);
        }
    }

    /// Split a predicate into its top-level `AND` conjuncts.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let mut out = left.conjuncts();
                out.extend(right.conjuncts());
                out
            }
            _ => vec![self],
        }
    }

    /// Name the expression takes when no alias is given.
    pub fn default_name(&self) -> String {
        match &self.kind {
            ExprKind::Literal(v) => v.to_string(),
            ExprKind::Column(col) => col.name.clone(),
            ExprKind::Unary { op, operand } => {
                let name = match op {
                    UnaryOp::Neg => "Negate",
                    UnaryOp::Not => "Not",
                };
                format!("{}({})", name, operand.default_name())
            }
            ExprKind::Binary { op, left, right } => format!(
                "{}({}, {})",
                op.display_name(),
                left.default_name(),
                right.default_name()
            ),
            ExprKind::Function { func, args } => {
                format!("{}({})", func.display_name(), join_names(args.iter()))
            }
            ExprKind::Extract { part, operand } => {
                format!("{}({})", part.display_name(), operand.default_name())
            }
            ExprKind::ToTimestamp { operand, unit } => {
                format!("TimestampFromUNIX({}, {})", operand.default_name(), unit.suffix())
            }
            ExprKind::InList {
                operand, negated, ..
            } => {
                let name = if *negated { "NotInValues" } else { "InValues" };
                format!("{}({})", name, operand.default_name())
            }
            ExprKind::IsNull { operand, negated } => {
                let name = if *negated { "NotNull" } else { "IsNull" };
                format!("{}({})", name, operand.default_name())
            }
            ExprKind::Cast { operand, to } => format!("Cast({}, {})", operand.default_name(), to),
            ExprKind::Case { .. } => "SearchedCase".to_string(),
            ExprKind::Aggregate {
                func,
                arg,
                distinct,
                ..
            } => match (func, arg) {
                (AggFunc::Count, None) => "CountStar()".to_string(),
                (AggFunc::Count, Some(a)) if *distinct => format!("CountDistinct({})", a.default_name()),
                (_, Some(a)) => format!("{}({})", func.display_name(), a.default_name()),
                (_, None) => format!("{}()", func.display_name()),
            },
            ExprKind::Window { func, args, .. } => {
                format!("{}({})", func.display_name(), join_names(args.iter()))
            }
        }
    }
}

fn join_names<'a>(exprs: impl Iterator<Item = &'a Expr>) -> String {
    exprs.map(Expr::default_name).collect::<Vec<_>>().join(", ")
}

/// An expression with an optional output alias.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedExpr {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl NamedExpr {
    pub fn output_name(&self) -> String {
        self.alias.clone().unwrap_or_else(|| self.expr.default_name())
    }
}

impl From<Expr> for NamedExpr {
    fn from(expr: Expr) -> Self {
        Self { expr, alias: None }
    }
}

impl Expr {
    /// Give the expression an explicit output name.
    pub fn name(self, alias: impl Into<String>) -> NamedExpr {
        NamedExpr {
            expr: self,
            alias: Some(alias.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, data_type: DataType) -> Expr {
        Expr::column(None, name, data_type)
    }

    #[test]
    fn test_arithmetic_types() {
        let e = col("a", DataType::Int8).add(col("c", DataType::Int32)).unwrap();
        assert_eq!(e.data_type(), &DataType::Int32);

        let e = col("a", DataType::Int8).div(2).unwrap();
        assert_eq!(e.data_type(), &DataType::Float64);

        let err = col("g", DataType::String).add(1).unwrap_err();
        assert!(matches!(err, IrError::TypeMismatch { .. }));
    }

    #[test]
    fn test_comparison_requires_compatible_types() {
        assert!(col("c", DataType::Int32).gt(0).is_ok());
        assert!(col("g", DataType::String).eq("A").is_ok());
        assert!(matches!(
            col("g", DataType::String).gt(0),
            Err(IrError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_isin_checks_values() {
        assert!(col("g", DataType::String).isin(["A", "B"]).is_ok());
        assert!(col("g", DataType::String).isin(Vec::<&str>::new()).is_ok());
        assert!(col("g", DataType::String).isin([1]).is_err());
    }

    #[test]
    fn test_extract_requires_temporal() {
        assert!(col("i", DataType::Timestamp).year().is_ok());
        assert!(col("j", DataType::Date).day_of_year().is_ok());
        assert!(col("j", DataType::Date).hour().is_err());
        assert!(col("k", DataType::Time).minute().is_ok());
        assert!(col("a", DataType::Int8).year().is_err());
    }

    #[test]
    fn test_aggregate_types_and_names() {
        let sum = col("b", DataType::Int16).sum().unwrap();
        assert_eq!(sum.data_type(), &DataType::Int64);
        assert_eq!(sum.default_name(), "Sum(b)");

        let mean = col("a", DataType::Int8).mean().unwrap();
        assert_eq!(mean.data_type(), &DataType::Float64);

        assert_eq!(count_star().default_name(), "CountStar()");
        assert_eq!(
            col("b", DataType::Int16).nunique().unwrap().default_name(),
            "CountDistinct(b)"
        );
    }

    #[test]
    fn test_nested_aggregate_rejected() {
        let inner = col("b", DataType::Int16).sum().unwrap();
        assert!(matches!(inner.sum(), Err(IrError::InvalidAggregation(_))));
    }

    #[test]
    fn test_with_filter() {
        let pred = col("g", DataType::String).eq("A").unwrap();
        let agg = col("b", DataType::Int16).nunique().unwrap().with_filter(pred.clone()).unwrap();
        assert!(matches!(agg.kind(), ExprKind::Aggregate { filter: Some(_), distinct: true, .. }));

        assert!(col("b", DataType::Int16).with_filter(pred.clone()).is_err());
        assert!(agg.with_filter(pred).is_err());
    }

    #[test]
    fn test_over_converts_aggregate() {
        let w = col("b", DataType::Int16)
            .sum()
            .unwrap()
            .over(vec![col("g", DataType::String)], vec![col("i", DataType::Timestamp).asc()])
            .unwrap();
        assert!(matches!(
            w.kind(),
            ExprKind::Window { func: WindowFunc::Aggregate(AggFunc::Sum), .. }
        ));
        assert!(w.contains_window());
        assert!(!w.contains_aggregate());
    }

    #[test]
    fn test_conjuncts_flatten_nested_and() {
        let a = col("a", DataType::Int8).gt(0).unwrap();
        let b = col("b", DataType::Int8).gt(0).unwrap();
        let c = col("c", DataType::Int8).gt(0).unwrap();
        let pred = a.and(b).unwrap().and(c).unwrap();
        assert_eq!(pred.conjuncts().len(), 3);

        let or = col("a", DataType::Int8)
            .gt(0)
            .unwrap()
            .or(col("a", DataType::Int8).lt(0).unwrap())
            .unwrap();
        assert_eq!(or.conjuncts().len(), 1);
    }

    #[test]
    fn test_case_common_type() {
        let cond = col("h", DataType::Bool);
        let e = Expr::case(vec![(cond, lit(1))], Some(lit(2.5))).unwrap();
        assert_eq!(e.data_type(), &DataType::Float64);
        assert!(Expr::case(vec![], None).is_err());
    }
}

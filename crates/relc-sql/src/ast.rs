//! Dialect-neutral SQL syntax tree
//!
//! Produced by the compiler and consumed only by the renderer.

use chrono::{NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Numeric text emitted verbatim.
    Number(String),
    String(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Like,
}

impl BinaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Like => "LIKE",
        }
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: SqlExpr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowSpec {
    pub partition_by: Vec<SqlExpr>,
    pub order_by: Vec<OrderByItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<SqlExpr>,
    pub distinct: bool,
    pub filter: Option<Box<SqlExpr>>,
    pub over: Option<WindowSpec>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Vec<SqlExpr>) -> Self {
        Self {
            name: name.into(),
            args,
            distinct: false,
            filter: None,
            over: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Column {
        qualifier: Option<String>,
        name: String,
    },
    Literal(Literal),
    /// `*` as a function argument
    Star,
    Unary {
        op: UnaryOperator,
        operand: Box<SqlExpr>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    Function(FunctionCall),
    Extract {
        field: String,
        expr: Box<SqlExpr>,
    },
    Case {
        branches: Vec<(SqlExpr, SqlExpr)>,
        otherwise: Option<Box<SqlExpr>>,
    },
    InList {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
        negated: bool,
    },
    IsNull {
        expr: Box<SqlExpr>,
        negated: bool,
    },
    Cast {
        expr: Box<SqlExpr>,
        type_name: String,
    },
}

impl SqlExpr {
    pub fn column(qualifier: Option<&str>, name: impl Into<String>) -> Self {
        SqlExpr::Column {
            qualifier: qualifier.map(str::to_string),
            name: name.into(),
        }
    }

    pub fn int(value: i64) -> Self {
        SqlExpr::Literal(Literal::Int(value))
    }

    pub fn binary(op: BinaryOperator, left: SqlExpr, right: SqlExpr) -> Self {
        SqlExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Whether this is a bare reference to a column called `name`.
    pub fn is_column_named(&self, name: &str) -> bool {
        matches!(self, SqlExpr::Column { name: n, .. } if n == name)
    }

    /// Whether evaluating this expression involves a window function.
    pub fn contains_window(&self) -> bool {
        match self {
            SqlExpr::Column { .. } | SqlExpr::Literal(_) | SqlExpr::Star => false,
            SqlExpr::Function(call) => {
                call.over.is_some() || call.args.iter().any(SqlExpr::contains_window)
            }
            SqlExpr::Unary { operand, .. } => operand.contains_window(),
            SqlExpr::Binary { left, right, .. } => left.contains_window() || right.contains_window(),
            SqlExpr::Extract { expr, .. }
            | SqlExpr::IsNull { expr, .. }
            | SqlExpr::Cast { expr, .. } => expr.contains_window(),
            SqlExpr::InList { expr, list, .. } => {
                expr.contains_window() || list.iter().any(SqlExpr::contains_window)
            }
            SqlExpr::Case {
                branches,
                otherwise,
            } => {
                branches
                    .iter()
                    .any(|(w, t)| w.contains_window() || t.contains_window())
                    || otherwise.as_ref().map_or(false, |o| o.contains_window())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOperator {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinOperator {
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinOperator::Inner => "INNER JOIN",
            JoinOperator::Left => "LEFT OUTER JOIN",
            JoinOperator::Right => "RIGHT OUTER JOIN",
            JoinOperator::Full => "FULL OUTER JOIN",
            JoinOperator::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    Table {
        name: String,
        alias: Option<String>,
    },
    Derived {
        select: Box<Select>,
        alias: String,
    },
    Join {
        left: Box<FromItem>,
        right: Box<FromItem>,
        op: JoinOperator,
        on: Vec<SqlExpr>,
    },
}

/// A single SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
    /// `None` renders as `*`.
    pub projection: Option<Vec<SelectItem>>,
    pub from: FromItem,
    pub selection: Vec<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub having: Vec<SqlExpr>,
    pub qualify: Vec<SqlExpr>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl Select {
    pub fn new(from: FromItem) -> Self {
        Self {
            distinct: false,
            projection: None,
            from,
            selection: vec![],
            group_by: vec![],
            having: vec![],
            qualify: vec![],
            order_by: vec![],
            limit: None,
            offset: 0,
        }
    }

    pub fn is_limited(&self) -> bool {
        self.limit.is_some() || self.offset > 0
    }

    /// `SELECT * FROM <table>` with nothing else attached.
    pub fn as_bare_table(&self) -> Option<&str> {
        match &self.from {
            FromItem::Table { name, .. }
                if self.projection.is_none()
                    && !self.distinct
                    && self.selection.is_empty()
                    && self.group_by.is_empty()
                    && self.having.is_empty()
                    && self.qualify.is_empty()
                    && self.order_by.is_empty()
                    && !self.is_limited() =>
            {
                Some(name)
            }
            _ => None,
        }
    }
}

//! Scalar expression lowering
//!
//! Lowers typed IR expressions to SQL syntax for one dialect. Column
//! references are resolved against a [`Scope`]; functions, date parts and
//! epoch conversions go through the dialect rule table.

use crate::ast::{
    BinaryOperator, FunctionCall, Literal, OrderByItem, SqlExpr, UnaryOperator, WindowSpec,
};
use crate::error::{CompileError, CompileResult};
use relc_ir::{
    AggFunc, BinaryOp, ColumnRef, DataType, Expr, ExprKind, JoinSide, RelNode, SortKey, UnaryOp,
    Value, WindowFunc,
};
use relc_registry::{
    Dialect, DialectDescriptor, RegistryError, RenderRule, RuleTable, Template, TemplateOp,
};

/// An output column of a compiled fragment and the SQL that defines it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OutputColumn {
    pub name: String,
    pub expr: SqlExpr,
    pub data_type: DataType,
}

/// Where column references resolve.
pub(crate) enum Scope<'a> {
    /// Every reference is an unqualified column of the same name.
    Bare,
    /// References are resolved against `rel` and replaced by the defining
    /// expression of the matching column; `columns` follows `rel`'s schema.
    Columns {
        rel: &'a RelNode,
        columns: &'a [OutputColumn],
    },
    /// References resolve to the qualified columns of the join side they
    /// belong to.
    Join {
        node: &'a RelNode,
        left: &'a [OutputColumn],
        right: &'a [OutputColumn],
    },
}

fn pick(columns: &[OutputColumn], index: usize, col: &ColumnRef) -> CompileResult<SqlExpr> {
    columns
        .get(index)
        .map(|c| c.expr.clone())
        .ok_or_else(|| CompileError::ColumnNotFound {
            column: col.name.clone(),
            available: columns.iter().map(|c| c.name.clone()).collect(),
        })
}

/// A lowered expression and its semantic type.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompiledScalar {
    pub expr: SqlExpr,
    pub data_type: DataType,
}

pub(crate) struct ScalarCompiler<'a> {
    dialect: Dialect,
    descriptor: &'static DialectDescriptor,
    rules: &'a RuleTable,
}

impl<'a> ScalarCompiler<'a> {
    pub fn new(dialect: Dialect, rules: &'a RuleTable) -> Self {
        Self {
            dialect,
            descriptor: dialect.descriptor(),
            rules,
        }
    }

    pub fn compile(&self, expr: &Expr, scope: &Scope<'_>) -> CompileResult<CompiledScalar> {
        Ok(CompiledScalar {
            expr: self.lower(expr, scope)?,
            data_type: expr.data_type().clone(),
        })
    }

    pub fn lower(&self, expr: &Expr, scope: &Scope<'_>) -> CompileResult<SqlExpr> {
        match expr.kind() {
            ExprKind::Literal(value) => self.literal(expr, value),
            ExprKind::Column(col) => self.column(col, scope),
            ExprKind::Unary { op, operand } => Ok(SqlExpr::Unary {
                op: match op {
                    UnaryOp::Neg => UnaryOperator::Minus,
                    UnaryOp::Not => UnaryOperator::Not,
                },
                operand: Box::new(self.lower(operand, scope)?),
            }),
            ExprKind::Binary { op, left, right } => {
                let mut l = self.lower(left, scope)?;
                let r = self.lower(right, scope)?;
                if *op == BinaryOp::Div
                    && self.descriptor.integer_division_truncates
                    && left.data_type().is_integer()
                    && right.data_type().is_integer()
                {
                    l = SqlExpr::Cast {
                        expr: Box::new(l),
                        type_name: self.cast_type(expr, &DataType::Float64)?,
                    };
                }
                Ok(SqlExpr::binary(binary_operator(*op), l, r))
            }
            ExprKind::Function { func, args } => {
                let args = self.lower_all(args, scope)?;
                self.apply_rule(func.rule_name(args.len()), args, expr)
            }
            ExprKind::Extract { part, operand } => {
                let operand = self.lower(operand, scope)?;
                self.apply_rule(part.rule_name(), vec![operand], expr)
            }
            ExprKind::ToTimestamp { operand, unit } => {
                let operand = self.lower(operand, scope)?;
                let rule = format!("to_timestamp_{}", unit.suffix());
                self.apply_rule(&rule, vec![operand], expr)
            }
            ExprKind::InList {
                operand,
                values,
                negated,
            } => {
                if values.is_empty() {
                    // IN () is not valid SQL; an empty set is a constant.
                    let rhs = if *negated { 1 } else { 0 };
                    return Ok(SqlExpr::binary(
                        BinaryOperator::Eq,
                        SqlExpr::int(1),
                        SqlExpr::int(rhs),
                    ));
                }
                Ok(SqlExpr::InList {
                    expr: Box::new(self.lower(operand, scope)?),
                    list: values
                        .iter()
                        .map(|v| self.literal(expr, v))
                        .collect::<CompileResult<_>>()?,
                    negated: *negated,
                })
            }
            ExprKind::IsNull { operand, negated } => Ok(SqlExpr::IsNull {
                expr: Box::new(self.lower(operand, scope)?),
                negated: *negated,
            }),
            ExprKind::Cast { operand, to } => Ok(SqlExpr::Cast {
                expr: Box::new(self.lower(operand, scope)?),
                type_name: self.cast_type(expr, to)?,
            }),
            ExprKind::Case {
                branches,
                otherwise,
            } => Ok(SqlExpr::Case {
                branches: branches
                    .iter()
                    .map(|(when, then)| -> CompileResult<(SqlExpr, SqlExpr)> {
                        Ok((self.lower(when, scope)?, self.lower(then, scope)?))
                    })
                    .collect::<CompileResult<_>>()?,
                otherwise: match otherwise {
                    Some(other) => Some(Box::new(self.lower(other, scope)?)),
                    None => None,
                },
            }),
            ExprKind::Aggregate {
                func,
                arg,
                distinct,
                filter,
            } => self.aggregate(expr, *func, arg.as_deref(), *distinct, filter.as_deref(), scope),
            ExprKind::Window {
                func,
                args,
                partition_by,
                order_by,
            } => self.window(expr, *func, args, partition_by, order_by, scope),
        }
    }

    pub fn lower_all(&self, exprs: &[Expr], scope: &Scope<'_>) -> CompileResult<Vec<SqlExpr>> {
        exprs.iter().map(|e| self.lower(e, scope)).collect()
    }

    pub fn lower_sort_keys(
        &self,
        keys: &[SortKey],
        scope: &Scope<'_>,
    ) -> CompileResult<Vec<OrderByItem>> {
        keys.iter()
            .map(|key| -> CompileResult<OrderByItem> {
                Ok(OrderByItem {
                    expr: self.lower(&key.expr, scope)?,
                    descending: key.descending,
                })
            })
            .collect()
    }

    fn column(&self, col: &ColumnRef, scope: &Scope<'_>) -> CompileResult<SqlExpr> {
        match scope {
            Scope::Bare => Ok(SqlExpr::column(None, col.name.clone())),
            Scope::Columns { rel, columns } => pick(columns, rel.resolve(col)?, col),
            Scope::Join { node, left, right } => match node.resolve_join_side(col)? {
                (JoinSide::Left, index) => pick(left, index, col),
                (JoinSide::Right, index) => pick(right, index, col),
            },
        }
    }

    fn literal(&self, expr: &Expr, value: &Value) -> CompileResult<SqlExpr> {
        let lit = match value {
            Value::Null => Literal::Null,
            Value::Bool(b) => Literal::Bool(*b),
            Value::Int(i) => Literal::Int(*i),
            Value::Float(x) if !x.is_finite() => {
                return Err(self.unsupported(expr, format!("non-finite float literal {}", x)));
            }
            Value::Float(x) => Literal::Float(*x),
            Value::String(s) => Literal::String(s.clone()),
            Value::Date(d) => Literal::Date(*d),
            Value::Timestamp(ts) => Literal::Timestamp(*ts),
        };
        Ok(SqlExpr::Literal(lit))
    }

    fn cast_type(&self, expr: &Expr, to: &DataType) -> CompileResult<String> {
        self.dialect
            .cast_type_name(to)
            .ok_or_else(|| self.unsupported(expr, format!("no cast target for {}", to)))
    }

    fn aggregate(
        &self,
        expr: &Expr,
        func: AggFunc,
        arg: Option<&Expr>,
        distinct: bool,
        filter: Option<&Expr>,
        scope: &Scope<'_>,
    ) -> CompileResult<SqlExpr> {
        let mut arg_sql = match arg {
            Some(a) => self.lower(a, scope)?,
            None => SqlExpr::Star,
        };
        let predicate = match filter {
            Some(f) => Some(self.lower(f, scope)?),
            None => None,
        };

        let native_filter = match predicate {
            Some(p) if self.descriptor.supports_filter_clause => Some(p),
            Some(p) => {
                // Rows failing the predicate become NULL, which every
                // aggregate ignores.
                let then = if arg.is_none() { SqlExpr::int(1) } else { arg_sql };
                arg_sql = SqlExpr::Case {
                    branches: vec![(p, then)],
                    otherwise: None,
                };
                None
            }
            None => None,
        };

        let mut sql = self.apply_rule(func.rule_name(), vec![arg_sql], expr)?;
        if distinct || native_filter.is_some() {
            match &mut sql {
                SqlExpr::Function(call) => {
                    call.distinct = distinct;
                    call.filter = native_filter.map(Box::new);
                }
                _ => {
                    return Err(self.unsupported(
                        expr,
                        "DISTINCT or FILTER requires a plain aggregate call".to_string(),
                    ))
                }
            }
        }
        Ok(sql)
    }

    fn window(
        &self,
        expr: &Expr,
        func: WindowFunc,
        args: &[Expr],
        partition_by: &[Expr],
        order_by: &[SortKey],
        scope: &Scope<'_>,
    ) -> CompileResult<SqlExpr> {
        if !self.descriptor.supports_window_functions {
            return Err(self.unsupported(expr, "window functions are not available".to_string()));
        }
        if self.descriptor.window_requires_order_by && order_by.is_empty() {
            return Err(self.unsupported(expr, "window requires an ORDER BY".to_string()));
        }

        let mut args_sql = self.lower_all(args, scope)?;
        if matches!(func, WindowFunc::Aggregate(AggFunc::Count)) && args_sql.is_empty() {
            args_sql.push(SqlExpr::Star);
        }
        let mut sql = self.apply_rule(func.rule_name(), args_sql, expr)?;
        let spec = WindowSpec {
            partition_by: self.lower_all(partition_by, scope)?,
            order_by: self.lower_sort_keys(order_by, scope)?,
        };
        match &mut sql {
            SqlExpr::Function(call) => {
                call.over = Some(spec);
                Ok(sql)
            }
            _ => Err(self.unsupported(
                expr,
                "OVER requires a plain function call".to_string(),
            )),
        }
    }

    fn apply_rule(&self, name: &str, args: Vec<SqlExpr>, expr: &Expr) -> CompileResult<SqlExpr> {
        tracing::trace!(
            target: "relc::compile",
            function = name,
            dialect = %self.dialect,
            "applying render rule"
        );
        match self.rules.resolve(name, self.dialect) {
            Ok(RenderRule::Template(template)) => self.expand(template, &args, expr),
            Ok(RenderRule::Unsupported(reason)) => Err(self.unsupported(expr, reason.to_string())),
            Err(RegistryError::FunctionNotFound { function, .. }) => Err(self.unsupported(
                expr,
                format!("no rendering rule for {}", function),
            )),
            Err(other) => Err(other.into()),
        }
    }

    fn expand(&self, template: &Template, args: &[SqlExpr], expr: &Expr) -> CompileResult<SqlExpr> {
        Ok(match template {
            Template::Arg(i) => args.get(*i).cloned().ok_or_else(|| {
                self.unsupported(
                    expr,
                    format!("rule reads argument {} of {}", i, args.len()),
                )
            })?,
            Template::Args => {
                return Err(self.unsupported(
                    expr,
                    "argument list used outside a call".to_string(),
                ))
            }
            Template::Call(name, parts) => {
                let mut call_args = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        Template::Args => call_args.extend(args.iter().cloned()),
                        other => call_args.push(self.expand(other, args, expr)?),
                    }
                }
                SqlExpr::Function(FunctionCall::new(*name, call_args))
            }
            Template::Extract(field, inner) => SqlExpr::Extract {
                field: field.to_string(),
                expr: Box::new(self.expand(inner, args, expr)?),
            },
            Template::Cast(inner, type_name) => SqlExpr::Cast {
                expr: Box::new(self.expand(inner, args, expr)?),
                type_name: type_name.to_string(),
            },
            Template::Binary(op, l, r) => SqlExpr::binary(
                template_operator(*op),
                self.expand(l, args, expr)?,
                self.expand(r, args, expr)?,
            ),
            Template::Int(i) => SqlExpr::int(*i),
            Template::Number(text) => SqlExpr::Literal(Literal::Number(text.to_string())),
            Template::Str(s) => SqlExpr::Literal(Literal::String(s.to_string())),
        })
    }

    fn unsupported(&self, expr: &Expr, detail: String) -> CompileError {
        CompileError::UnsupportedExpression {
            expression: expr.default_name(),
            dialect: self.dialect,
            detail,
        }
    }
}

fn binary_operator(op: BinaryOp) -> BinaryOperator {
    match op {
        BinaryOp::Add => BinaryOperator::Plus,
        BinaryOp::Sub => BinaryOperator::Minus,
        BinaryOp::Mul => BinaryOperator::Multiply,
        BinaryOp::Div => BinaryOperator::Divide,
        BinaryOp::Mod => BinaryOperator::Modulo,
        BinaryOp::Eq => BinaryOperator::Eq,
        BinaryOp::NotEq => BinaryOperator::NotEq,
        BinaryOp::Lt => BinaryOperator::Lt,
        BinaryOp::LtEq => BinaryOperator::LtEq,
        BinaryOp::Gt => BinaryOperator::Gt,
        BinaryOp::GtEq => BinaryOperator::GtEq,
        BinaryOp::And => BinaryOperator::And,
        BinaryOp::Or => BinaryOperator::Or,
        BinaryOp::Like => BinaryOperator::Like,
    }
}

fn template_operator(op: TemplateOp) -> BinaryOperator {
    match op {
        TemplateOp::Add => BinaryOperator::Plus,
        TemplateOp::Sub => BinaryOperator::Minus,
        TemplateOp::Mul => BinaryOperator::Multiply,
        TemplateOp::Div => BinaryOperator::Divide,
        TemplateOp::Gt => BinaryOperator::Gt,
        TemplateOp::Lt => BinaryOperator::Lt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Renderer;
    use pretty_assertions::assert_eq;
    use relc_ir::{count_star, lit, DatePart, TimeUnit};

    fn col(name: &str, data_type: DataType) -> Expr {
        Expr::column(None, name, data_type)
    }

    fn render(expr: &Expr, dialect: Dialect) -> CompileResult<String> {
        let rules = RuleTable::builtin();
        let compiled = ScalarCompiler::new(dialect, &rules).compile(expr, &Scope::Bare)?;
        Ok(Renderer::new(dialect.descriptor()).render_expr(&compiled.expr))
    }

    #[test]
    fn test_empty_isin_is_constant() {
        let g = col("g", DataType::String);
        let e = g.clone().isin(Vec::<&str>::new()).unwrap();
        assert_eq!(render(&e, Dialect::Postgres).unwrap(), "1 = 0");
        let e = g.notin(Vec::<&str>::new()).unwrap();
        assert_eq!(render(&e, Dialect::Postgres).unwrap(), "1 = 1");
    }

    #[test]
    fn test_filtered_count_distinct() {
        let pred = col("g", DataType::String).eq("A").unwrap();
        let e = col("b", DataType::Int16).nunique().unwrap().with_filter(pred).unwrap();
        assert_eq!(
            render(&e, Dialect::DuckDB).unwrap(),
            "COUNT(DISTINCT \"b\") FILTER (WHERE \"g\" = 'A')"
        );
        assert_eq!(
            render(&e, Dialect::Flink).unwrap(),
            "COUNT(DISTINCT CASE WHEN `g` = 'A' THEN `b` END)"
        );
    }

    #[test]
    fn test_filtered_count_star_fallback() {
        let pred = col("c", DataType::Int32).gt(0).unwrap();
        let e = count_star().with_filter(pred).unwrap();
        assert_eq!(
            render(&e, Dialect::MySQL).unwrap(),
            "COUNT(CASE WHEN `c` > 0 THEN 1 END)"
        );
        assert_eq!(render(&e, Dialect::Postgres).unwrap(), "COUNT(*) FILTER (WHERE \"c\" > 0)");
    }

    #[test]
    fn test_integer_division() {
        let e = col("a", DataType::Int32).div(col("b", DataType::Int32)).unwrap();
        assert_eq!(
            render(&e, Dialect::Postgres).unwrap(),
            "CAST(\"a\" AS DOUBLE PRECISION) / \"b\""
        );
        assert_eq!(render(&e, Dialect::DuckDB).unwrap(), "\"a\" / \"b\"");
        let e = col("a", DataType::Float64).div(2).unwrap();
        assert_eq!(render(&e, Dialect::Postgres).unwrap(), "\"a\" / 2");
    }

    #[test]
    fn test_every_date_part_renders_for_every_dialect() {
        for dialect in Dialect::ALL {
            for part in DatePart::ALL {
                let e = col("i", DataType::Timestamp).extract(part).unwrap();
                assert!(render(&e, dialect).is_ok(), "{:?} on {}", part, dialect);
            }
        }
    }

    #[test]
    fn test_week_of_year_per_dialect() {
        let e = col("i", DataType::Timestamp).week_of_year().unwrap();
        assert_eq!(
            render(&e, Dialect::Postgres).unwrap(),
            "CAST(EXTRACT(WEEK FROM \"i\") AS INTEGER)"
        );
        assert_eq!(render(&e, Dialect::Spark).unwrap(), "WEEKOFYEAR(`i`)");
        assert_eq!(render(&e, Dialect::MySQL).unwrap(), "WEEK(`i`, 3)");
        assert_eq!(
            render(&e, Dialect::SQLite).unwrap(),
            "((CAST(STRFTIME('%j', DATE(\"i\", '-3 days', 'weekday 4')) AS INTEGER) - 1) / 7) + 1"
        );
    }

    #[test]
    fn test_epoch_units() {
        let ms = col("x", DataType::Int64).to_timestamp(TimeUnit::Milliseconds).unwrap();
        assert_eq!(render(&ms, Dialect::Postgres).unwrap(), "TO_TIMESTAMP(\"x\" / 1000.0)");
        assert_eq!(render(&ms, Dialect::DuckDB).unwrap(), "EPOCH_MS(\"x\")");
        assert_eq!(
            render(&ms, Dialect::Flink).unwrap(),
            "TO_TIMESTAMP(FROM_UNIXTIME(`x` / 1000))"
        );
        assert_eq!(render(&ms, Dialect::Spark).unwrap(), "TIMESTAMP_MILLIS(`x`)");

        let s = col("x", DataType::Int64).to_timestamp(TimeUnit::Seconds).unwrap();
        assert_eq!(render(&s, Dialect::SQLite).unwrap(), "DATETIME(\"x\", 'unixepoch')");
    }

    #[test]
    fn test_unsupported_aggregate_names_dialect() {
        let e = col("a", DataType::Float64).std().unwrap();
        match render(&e, Dialect::SQLite) {
            Err(CompileError::UnsupportedExpression {
                expression,
                dialect,
                ..
            }) => {
                assert_eq!(expression, "StandardDev(a)");
                assert_eq!(dialect, Dialect::SQLite);
            }
            other => panic!("expected unsupported expression, got {:?}", other),
        }
        assert_eq!(render(&e, Dialect::Postgres).unwrap(), "STDDEV_SAMP(\"a\")");
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let e = col("a", DataType::Float64).gt(f64::NAN).unwrap();
        assert!(matches!(
            render(&e, Dialect::DuckDB),
            Err(CompileError::UnsupportedExpression { .. })
        ));
    }

    #[test]
    fn test_window_order_requirement() {
        let e = col("b", DataType::Int16)
            .sum()
            .unwrap()
            .over(vec![col("g", DataType::String)], vec![])
            .unwrap();
        assert_eq!(
            render(&e, Dialect::Postgres).unwrap(),
            "SUM(\"b\") OVER (PARTITION BY \"g\")"
        );
        assert!(matches!(
            render(&e, Dialect::Flink),
            Err(CompileError::UnsupportedExpression { .. })
        ));
    }

    #[test]
    fn test_lag_offset_argument() {
        let e = col("b", DataType::Int16)
            .lag(2)
            .unwrap()
            .over(vec![], vec![col("i", DataType::Timestamp).asc()])
            .unwrap();
        assert_eq!(
            render(&e, Dialect::DuckDB).unwrap(),
            "LAG(\"b\", 2) OVER (ORDER BY \"i\" ASC)"
        );
    }

    #[test]
    fn test_cast_and_case() {
        let e = col("a", DataType::Int64).cast(DataType::String);
        assert_eq!(render(&e, Dialect::MySQL).unwrap(), "CAST(`a` AS CHAR)");
        assert_eq!(render(&e, Dialect::DuckDB).unwrap(), "CAST(\"a\" AS VARCHAR)");

        let e = Expr::case(
            vec![(col("c", DataType::Int32).gt(0).unwrap(), lit("pos"))],
            Some(lit("other")),
        )
        .unwrap();
        assert_eq!(
            render(&e, Dialect::Postgres).unwrap(),
            "CASE WHEN \"c\" > 0 THEN 'pos' ELSE 'other' END"
        );
    }

    #[test]
    fn test_sqlite_ceil_synthesized() {
        let e = col("x", DataType::Float64).ceil().unwrap();
        assert_eq!(
            render(&e, Dialect::SQLite).unwrap(),
            "CAST(\"x\" AS INTEGER) + (\"x\" > CAST(\"x\" AS INTEGER))"
        );
        assert_eq!(render(&e, Dialect::MySQL).unwrap(), "CEILING(`x`)");
    }
}

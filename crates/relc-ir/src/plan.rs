//! JSON plan format
//!
//! `PlanSpec` is the wire form of an operator tree. Building it goes through
//! the same typed builders as hand-written plans, so every check those
//! builders make applies to JSON input too.

use crate::error::{IrError, IrResult};
use crate::expr::{
    count_star, dense_rank, rank, row_number, AggFunc, BinaryOp, ColumnRef, DatePart, Expr, ExprKind, NamedExpr,
    ScalarFunc, SortKey, UnaryOp, Value,
};
use crate::rel::{resolve_side, JoinKind, JoinSide, Rel, RelExt, RelNode};
use crate::types::{DataType, Field, Schema, TimeUnit};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Table schema as stored in a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub fields: Vec<Field>,
}

/// Trait for resolving base table schemas while building plans
pub trait SchemaProvider {
    fn table_schema(&self, name: &str) -> IrResult<Schema>;
}

/// Schema provider backed by a map, used by the compile service and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    tables: HashMap<String, Schema>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: TableSchema) {
        self.tables.insert(table.name, Schema::new(table.fields));
    }

    pub fn with_table(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.tables.insert(name.into(), schema);
        self
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl From<Vec<TableSchema>> for InMemoryCatalog {
    fn from(tables: Vec<TableSchema>) -> Self {
        let mut catalog = Self::new();
        for table in tables {
            catalog.add_table(table);
        }
        catalog
    }
}

impl SchemaProvider for InMemoryCatalog {
    fn table_schema(&self, name: &str) -> IrResult<Schema> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| IrError::TableNotFound(name.to_string()))
    }
}

/// Relational operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanSpec {
    Table {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    Project {
        input: Box<PlanSpec>,
        exprs: Vec<NamedExprSpec>,
    },
    Filter {
        input: Box<PlanSpec>,
        predicates: Vec<ExprSpec>,
    },
    Aggregate {
        input: Box<PlanSpec>,
        #[serde(default)]
        keys: Vec<NamedExprSpec>,
        #[serde(default)]
        metrics: Vec<NamedExprSpec>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        having: Vec<ExprSpec>,
    },
    ValueCounts {
        input: Box<PlanSpec>,
        expr: NamedExprSpec,
    },
    Sort {
        input: Box<PlanSpec>,
        keys: Vec<SortKeySpec>,
    },
    Limit {
        input: Box<PlanSpec>,
        #[serde(default)]
        n: Option<u64>,
        #[serde(default)]
        offset: u64,
    },
    Join {
        left: Box<PlanSpec>,
        right: Box<PlanSpec>,
        #[serde(default = "default_join_kind")]
        kind: JoinKind,
        #[serde(default)]
        predicates: Vec<ExprSpec>,
    },
    Window {
        input: Box<PlanSpec>,
        exprs: Vec<NamedExprSpec>,
    },
    Distinct {
        input: Box<PlanSpec>,
    },
}

fn default_join_kind() -> JoinKind {
    JoinKind::Inner
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedExprSpec {
    pub expr: ExprSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKeySpec {
    pub expr: ExprSpec,
    #[serde(default)]
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBranchSpec {
    pub when: ExprSpec,
    pub then: ExprSpec,
}

/// Scalar expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExprSpec {
    Literal {
        value: serde_json::Value,
        /// Reinterpret a string value as `date` or `timestamp`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_type: Option<DataType>,
    },
    Column {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table: Option<String>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<ExprSpec>,
    },
    Binary {
        op: BinaryOp,
        left: Box<ExprSpec>,
        right: Box<ExprSpec>,
    },
    Call {
        func: String,
        #[serde(default)]
        args: Vec<ExprSpec>,
    },
    Extract {
        part: DatePart,
        operand: Box<ExprSpec>,
    },
    ToTimestamp {
        operand: Box<ExprSpec>,
        unit: TimeUnit,
    },
    InList {
        operand: Box<ExprSpec>,
        values: Vec<serde_json::Value>,
        #[serde(default)]
        negated: bool,
    },
    IsNull {
        operand: Box<ExprSpec>,
        #[serde(default)]
        negated: bool,
    },
    Cast {
        operand: Box<ExprSpec>,
        to: DataType,
    },
    Case {
        branches: Vec<CaseBranchSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<Box<ExprSpec>>,
    },
    Aggregate {
        func: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arg: Option<Box<ExprSpec>>,
        #[serde(default)]
        distinct: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<Box<ExprSpec>>,
    },
    Window {
        func: String,
        #[serde(default)]
        args: Vec<ExprSpec>,
        #[serde(default)]
        partition_by: Vec<ExprSpec>,
        #[serde(default)]
        order_by: Vec<SortKeySpec>,
    },
}

/// Where column references in an expression resolve.
#[derive(Clone, Copy)]
enum Scope<'a> {
    Single(&'a Rel),
    Join(&'a Rel, &'a Rel),
}

impl PlanSpec {
    /// SHA-256 of the canonical JSON form, for caching.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).expect("plan should always serialize");
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Build a validated operator tree.
    pub fn build(&self, provider: &dyn SchemaProvider) -> IrResult<Rel> {
        match self {
            PlanSpec::Table { name, alias } => {
                let schema = provider.table_schema(name)?;
                match alias {
                    Some(alias) => RelNode::table_as(name.as_str(), alias.as_str(), schema),
                    None => RelNode::table(name.as_str(), schema),
                }
            }
            PlanSpec::Project { input, exprs } => {
                let input = input.build(provider)?;
                let exprs = build_named(exprs, Scope::Single(&input))?;
                input.select(exprs)
            }
            PlanSpec::Filter { input, predicates } => {
                let input = input.build(provider)?;
                let predicates = build_all(predicates, Scope::Single(&input))?;
                input.filter(predicates)
            }
            PlanSpec::Aggregate {
                input,
                keys,
                metrics,
                having,
            } => {
                let input = input.build(provider)?;
                let scope = Scope::Single(&input);
                let mut grouped = input.group_by(build_named(keys, scope)?);
                for predicate in having {
                    grouped = grouped.having(predicate.build(scope)?)?;
                }
                grouped.aggregate(build_named(metrics, scope)?)
            }
            PlanSpec::ValueCounts { input, expr } => {
                let input = input.build(provider)?;
                let expr = expr.build(Scope::Single(&input))?;
                input.value_counts(expr)
            }
            PlanSpec::Sort { input, keys } => {
                let input = input.build(provider)?;
                let keys = build_sort_keys(keys, Scope::Single(&input))?;
                input.order_by(keys)
            }
            PlanSpec::Limit { input, n, offset } => input.build(provider)?.limit_offset(*n, *offset),
            PlanSpec::Join {
                left,
                right,
                kind,
                predicates,
            } => {
                let left = left.build(provider)?;
                let right = right.build(provider)?;
                let predicates = build_all(predicates, Scope::Join(&left, &right))?;
                left.join(&right, *kind, predicates)
            }
            PlanSpec::Window { input, exprs } => {
                let input = input.build(provider)?;
                let exprs = build_named(exprs, Scope::Single(&input))?;
                input.window(exprs)
            }
            PlanSpec::Distinct { input } => Ok(input.build(provider)?.distinct()),
        }
    }
}

fn build_all(specs: &[ExprSpec], scope: Scope<'_>) -> IrResult<Vec<Expr>> {
    specs.iter().map(|spec| spec.build(scope)).collect()
}

fn build_named(specs: &[NamedExprSpec], scope: Scope<'_>) -> IrResult<Vec<NamedExpr>> {
    specs.iter().map(|spec| spec.build(scope)).collect()
}

fn build_sort_keys(specs: &[SortKeySpec], scope: Scope<'_>) -> IrResult<Vec<SortKey>> {
    specs
        .iter()
        .map(|spec| {
            let expr = spec.expr.build(scope)?;
            Ok(if spec.desc { expr.desc() } else { expr.asc() })
        })
        .collect()
}

impl NamedExprSpec {
    fn build(&self, scope: Scope<'_>) -> IrResult<NamedExpr> {
        let expr = self.expr.build(scope)?;
        Ok(match &self.alias {
            Some(alias) => expr.name(alias.as_str()),
            None => expr.into(),
        })
    }
}

impl ExprSpec {
    fn build(&self, scope: Scope<'_>) -> IrResult<Expr> {
        match self {
            ExprSpec::Literal { value, data_type } => Ok(Expr::literal(literal_value(value, data_type.as_ref())?)),
            ExprSpec::Column { name, table } => resolve_column(scope, name, table.as_deref()),
            ExprSpec::Unary { op, operand } => Expr::unary(*op, operand.build(scope)?),
            ExprSpec::Binary { op, left, right } => {
                Expr::binary(*op, left.build(scope)?, right.build(scope)?)
            }
            ExprSpec::Call { func, args } => {
                let func = scalar_func(func)?;
                Expr::function(func, build_all(args, scope)?)
            }
            ExprSpec::Extract { part, operand } => operand.build(scope)?.extract(*part),
            ExprSpec::ToTimestamp { operand, unit } => operand.build(scope)?.to_timestamp(*unit),
            ExprSpec::InList {
                operand,
                values,
                negated,
            } => {
                let operand = operand.build(scope)?;
                let values = values
                    .iter()
                    .map(|v| literal_value(v, None))
                    .collect::<IrResult<Vec<_>>>()?;
                if *negated {
                    operand.notin(values)
                } else {
                    operand.isin(values)
                }
            }
            ExprSpec::IsNull { operand, negated } => {
                let operand = operand.build(scope)?;
                Ok(if *negated {
                    operand.is_not_null()
                } else {
                    operand.is_null()
                })
            }
            ExprSpec::Cast { operand, to } => Ok(operand.build(scope)?.cast(to.clone())),
            ExprSpec::Case { branches, otherwise } => {
                let branches = branches
                    .iter()
                    .map(|b| Ok((b.when.build(scope)?, b.then.build(scope)?)))
                    .collect::<IrResult<Vec<_>>>()?;
                let otherwise = otherwise.as_ref().map(|e| e.build(scope)).transpose()?;
                Expr::case(branches, otherwise)
            }
            ExprSpec::Aggregate {
                func,
                arg,
                distinct,
                filter,
            } => {
                let agg = build_aggregate(func, arg.as_deref(), *distinct, scope)?;
                match filter {
                    Some(predicate) => agg.with_filter(predicate.build(scope)?),
                    None => Ok(agg),
                }
            }
            ExprSpec::Window {
                func,
                args,
                partition_by,
                order_by,
            } => {
                let base = build_window_func(func, args, scope)?;
                base.over(build_all(partition_by, scope)?, build_sort_keys(order_by, scope)?)
            }
        }
    }
}

fn resolve_column(scope: Scope<'_>, name: &str, table: Option<&str>) -> IrResult<Expr> {
    let column = ColumnRef {
        relation: table.map(str::to_string),
        name: name.to_string(),
    };
    let rel = match scope {
        Scope::Single(rel) => rel,
        Scope::Join(left, right) => match resolve_side(left, right, &column)?.0 {
            JoinSide::Left => left,
            JoinSide::Right => right,
        },
    };
    match table {
        Some(_) => rel.column(&column),
        None => rel.col(name),
    }
}

fn literal_value(value: &serde_json::Value, data_type: Option<&DataType>) -> IrResult<Value> {
    use serde_json::Value as Json;

    let invalid = || IrError::InvalidPlan(format!("unsupported literal: {}", value));
    match (value, data_type) {
        (Json::Null, _) => Ok(Value::Null),
        (Json::Bool(b), _) => Ok(Value::Bool(*b)),
        (Json::Number(n), Some(t)) if t.is_floating() => n.as_f64().map(Value::Float).ok_or_else(invalid),
        (Json::Number(n), _) => match n.as_i64() {
            Some(i) => Ok(Value::Int(i)),
            None => n.as_f64().map(Value::Float).ok_or_else(invalid),
        },
        (Json::String(s), Some(DataType::Date)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|e| IrError::InvalidPlan(format!("invalid date literal {:?}: {}", s, e))),
        (Json::String(s), Some(DataType::Timestamp)) => parse_timestamp(s).map(Value::Timestamp),
        (Json::String(s), _) => Ok(Value::String(s.clone())),
        _ => Err(invalid()),
    }
}

fn parse_timestamp(s: &str) -> IrResult<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| IrError::InvalidPlan(format!("invalid timestamp literal {:?}", s)))
}

fn scalar_func(name: &str) -> IrResult<ScalarFunc> {
    Ok(match name {
        "abs" => ScalarFunc::Abs,
        "ceil" => ScalarFunc::Ceil,
        "floor" => ScalarFunc::Floor,
        "round" => ScalarFunc::Round,
        "lower" => ScalarFunc::Lower,
        "upper" => ScalarFunc::Upper,
        "length" => ScalarFunc::Length,
        "substr" => ScalarFunc::Substr,
        "coalesce" => ScalarFunc::Coalesce,
        other => return Err(IrError::InvalidPlan(format!("unknown function: {}", other))),
    })
}

fn agg_func(name: &str) -> Option<(AggFunc, bool)> {
    Some(match name {
        "count" => (AggFunc::Count, false),
        "nunique" => (AggFunc::Count, true),
        "sum" => (AggFunc::Sum, false),
        "mean" | "avg" => (AggFunc::Mean, false),
        "min" => (AggFunc::Min, false),
        "max" => (AggFunc::Max, false),
        "std" | "stddev" => (AggFunc::StdDev, false),
        "var" | "variance" => (AggFunc::Variance, false),
        _ => return None,
    })
}

fn build_aggregate(
    name: &str,
    arg: Option<&ExprSpec>,
    distinct: bool,
    scope: Scope<'_>,
) -> IrResult<Expr> {
    let (func, implied_distinct) = agg_func(name)
        .ok_or_else(|| IrError::InvalidAggregation(format!("unknown aggregate: {}", name)))?;
    match (func, arg) {
        (AggFunc::Count, None) if !distinct && !implied_distinct => Ok(count_star()),
        (_, None) => Err(IrError::InvalidAggregation(format!("{} requires an argument", name))),
        (_, Some(arg)) => Expr::aggregate(func, arg.build(scope)?, distinct || implied_distinct),
    }
}

fn build_window_func(name: &str, args: &[ExprSpec], scope: Scope<'_>) -> IrResult<Expr> {
    let mut args = build_all(args, scope)?.into_iter();
    match name {
        "row_number" => Ok(row_number()),
        "rank" => Ok(rank()),
        "dense_rank" => Ok(dense_rank()),
        "lag" | "lead" => {
            let expr = args
                .next()
                .ok_or_else(|| IrError::InvalidPlan(format!("{} requires an argument", name)))?;
            let offset = match args.next().as_ref().map(Expr::kind) {
                None => 1,
                Some(ExprKind::Literal(Value::Int(n))) => *n,
                Some(_) => {
                    return Err(IrError::InvalidPlan(format!(
                        "{} offset must be an integer literal",
                        name
                    )))
                }
            };
            if name == "lag" {
                expr.lag(offset)
            } else {
                expr.lead(offset)
            }
        }
        other => match (agg_func(other), args.next()) {
            (Some((AggFunc::Count, false)), None) => Ok(count_star()),
            (Some((func, false)), Some(arg)) => Expr::aggregate(func, arg, false),
            _ => Err(IrError::InvalidPlan(format!("unknown window function: {}", other))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rel::RelKind;

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new().with_table(
            "table",
            Schema::from_pairs([
                ("a", DataType::Int8),
                ("b", DataType::Int16),
                ("g", DataType::String),
                ("i", DataType::Timestamp),
            ]),
        )
    }

    #[test]
    fn test_build_group_by_with_having() {
        let json = r#"{
            "op": "aggregate",
            "input": {"op": "table", "name": "table"},
            "keys": [{"expr": {"type": "column", "name": "g"}}],
            "metrics": [{"expr": {"type": "aggregate", "func": "sum", "arg": {"type": "column", "name": "b"}}, "alias": "b_sum"}],
            "having": [{"type": "binary", "op": "gt_eq",
                        "left": {"type": "aggregate", "func": "count"},
                        "right": {"type": "literal", "value": 1000}}]
        }"#;
        let spec: PlanSpec = serde_json::from_str(json).unwrap();
        let rel = spec.build(&catalog()).unwrap();
        assert!(matches!(rel.kind(), RelKind::Having { .. }));
        assert_eq!(rel.schema().names(), vec!["g", "b_sum"]);
    }

    #[test]
    fn test_unknown_table() {
        let spec = PlanSpec::Table {
            name: "missing".to_string(),
            alias: None,
        };
        assert_eq!(
            spec.build(&catalog()).unwrap_err(),
            IrError::TableNotFound("missing".to_string())
        );
    }

    #[test]
    fn test_type_errors_surface_from_json() {
        let json = r#"{
            "op": "filter",
            "input": {"op": "table", "name": "table"},
            "predicates": [{"type": "binary", "op": "gt",
                            "left": {"type": "column", "name": "g"},
                            "right": {"type": "literal", "value": 0}}]
        }"#;
        let spec: PlanSpec = serde_json::from_str(json).unwrap();
        assert!(matches!(spec.build(&catalog()), Err(IrError::TypeMismatch { .. })));
    }

    #[test]
    fn test_timestamp_literal() {
        let value = literal_value(
            &serde_json::json!("2024-01-02 03:04:05"),
            Some(&DataType::Timestamp),
        )
        .unwrap();
        assert_eq!(value.data_type(), DataType::Timestamp);
        assert!(literal_value(&serde_json::json!("nope"), Some(&DataType::Date)).is_err());
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let spec = PlanSpec::Limit {
            input: Box::new(PlanSpec::Table {
                name: "table".to_string(),
                alias: None,
            }),
            n: Some(10),
            offset: 0,
        };
        let parsed: PlanSpec = serde_json::from_str(&serde_json::to_string(&spec).unwrap()).unwrap();
        assert_eq!(spec.fingerprint(), parsed.fingerprint());
        assert_eq!(spec.fingerprint().len(), 64);
    }

    #[test]
    fn test_catalog_table_names_sorted() {
        let catalog = InMemoryCatalog::from(vec![
            TableSchema { name: "zeta".to_string(), fields: vec![] },
            TableSchema { name: "alpha".to_string(), fields: vec![] },
        ]);
        assert_eq!(catalog.table_names(), vec!["alpha", "zeta"]);
    }
}

//! Relational operator tree
//!
//! Nodes are immutable and shared through `Arc`. Each node computes its
//! output schema when it is built, so a `Rel` that exists is a valid plan.

use crate::error::{IrError, IrResult};
use crate::expr::{count_star, ColumnRef, Expr, ExprKind, NamedExpr, SortKey};
use crate::types::{DataType, Field, Schema};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type Rel = Arc<RelNode>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Full => "full",
            JoinKind::Cross => "cross",
        }
    }
}

/// Which input of a join a column reference resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelKind {
    Table {
        name: String,
        alias: Option<String>,
    },
    Project {
        input: Rel,
        exprs: Vec<NamedExpr>,
    },
    Filter {
        input: Rel,
        predicates: Vec<Expr>,
    },
    Aggregate {
        input: Rel,
        keys: Vec<NamedExpr>,
        metrics: Vec<NamedExpr>,
    },
    /// Group-level predicates over the scope of the aggregate's input.
    Having {
        input: Rel,
        predicates: Vec<Expr>,
    },
    Sort {
        input: Rel,
        keys: Vec<SortKey>,
    },
    Limit {
        input: Rel,
        n: Option<u64>,
        offset: u64,
    },
    Join {
        left: Rel,
        right: Rel,
        kind: JoinKind,
        predicates: Vec<Expr>,
    },
    /// Input columns followed by the window expressions.
    Window {
        input: Rel,
        exprs: Vec<NamedExpr>,
    },
    Distinct {
        input: Rel,
    },
}

/// The base relation and column that an output column was taken from.
///
/// References built with [`RelExt::col`] carry the same pair, which lets a
/// column taken from a join input be found again above the join even when
/// the join renamed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub relation: String,
    pub name: String,
}

impl Origin {
    fn new(relation: &str, name: &str) -> Self {
        Self {
            relation: relation.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelNode {
    kind: RelKind,
    schema: Schema,
    /// One entry per output field; `None` for computed columns above a join.
    origins: Vec<Option<Origin>>,
}

/// Outcome of looking a reference up in one relation.
enum Lookup {
    Found(usize),
    Missing,
    Ambiguous(Vec<String>),
}

impl RelNode {
    /// Base table with a trusted schema.
    pub fn table(name: impl Into<String>, schema: Schema) -> IrResult<Rel> {
        Self::build_table(name.into(), None, schema)
    }

    pub fn table_as(name: impl Into<String>, alias: impl Into<String>, schema: Schema) -> IrResult<Rel> {
        Self::build_table(name.into(), Some(alias.into()), schema)
    }

    fn build_table(name: String, alias: Option<String>, schema: Schema) -> IrResult<Rel> {
        if let Some(dup) = schema.duplicate_name() {
            return Err(IrError::DuplicateColumn(dup.to_string()));
        }
        Ok(Self::build(RelKind::Table { name, alias }, schema, Vec::new()))
    }

    /// Nodes with a qualifier own all their columns; nodes above a join
    /// keep the origins `inherited` from their inputs.
    fn build(kind: RelKind, schema: Schema, inherited: Vec<Option<Origin>>) -> Rel {
        let mut node = RelNode {
            kind,
            schema,
            origins: Vec::new(),
        };
        node.origins = match node.qualifier() {
            Some(qualifier) => node
                .schema
                .fields
                .iter()
                .map(|f| Some(Origin::new(qualifier, &f.name)))
                .collect(),
            None => inherited,
        };
        Arc::new(node)
    }

    pub fn kind(&self) -> &RelKind {
        &self.kind
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn origins(&self) -> &[Option<Origin>] {
        &self.origins
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            RelKind::Table { .. } => "Table",
            RelKind::Project { .. } => "Project",
            RelKind::Filter { .. } => "Filter",
            RelKind::Aggregate { .. } => "Aggregate",
            RelKind::Having { .. } => "Having",
            RelKind::Sort { .. } => "Sort",
            RelKind::Limit { .. } => "Limit",
            RelKind::Join { .. } => "Join",
            RelKind::Window { .. } => "Window",
            RelKind::Distinct { .. } => "Distinct",
        }
    }

    pub fn inputs(&self) -> Vec<&Rel> {
        match &self.kind {
            RelKind::Table { .. } => vec![],
            RelKind::Join { left, right, .. } => vec![left, right],
            RelKind::Project { input, .. }
            | RelKind::Filter { input, .. }
            | RelKind::Aggregate { input, .. }
            | RelKind::Having { input, .. }
            | RelKind::Sort { input, .. }
            | RelKind::Limit { input, .. }
            | RelKind::Window { input, .. }
            | RelKind::Distinct { input } => vec![input],
        }
    }

    /// Label that column references taken from this relation carry.
    ///
    /// Joins have no single label; their columns are addressed by output name.
    pub fn qualifier(&self) -> Option<&str> {
        match &self.kind {
            RelKind::Table { name, alias } => Some(alias.as_deref().unwrap_or(name)),
            RelKind::Join { .. } => None,
            _ => self.inputs().first().copied().and_then(|input| input.qualifier()),
        }
    }

    /// Position of the output column a reference denotes.
    ///
    /// Unqualified references match output names. Qualified ones match
    /// origins, so `b.id` over `a JOIN b` finds `id_right`. A qualifier
    /// that names no input is never bound by name alone.
    pub fn resolve(&self, column: &ColumnRef) -> IrResult<usize> {
        match self.lookup(column) {
            Lookup::Found(index) => Ok(index),
            Lookup::Ambiguous(candidates) => Err(IrError::AmbiguousColumnReference {
                column: display_ref(column),
                candidates,
            }),
            Lookup::Missing => Err(unresolved(&[self], column)),
        }
    }

    /// Typed reference to the output column `column` denotes, keeping its
    /// qualifier.
    pub fn column(&self, column: &ColumnRef) -> IrResult<Expr> {
        let index = self.resolve(column)?;
        let data_type = self.schema.fields[index].data_type.clone();
        Ok(Expr::column(
            column.relation.clone(),
            column.name.clone(),
            data_type,
        ))
    }

    /// Resolve a column reference inside a join predicate to one input and
    /// the position of the column within it.
    pub fn resolve_join_side(&self, column: &ColumnRef) -> IrResult<(JoinSide, usize)> {
        let (left, right) = match &self.kind {
            RelKind::Join { left, right, .. } => (left, right),
            _ => {
                return Err(IrError::InvalidPlan(format!(
                    "{} is not a join",
                    self.kind_name()
                )))
            }
        };
        resolve_side(left, right, column)
    }

    fn lookup(&self, column: &ColumnRef) -> Lookup {
        let hits: Vec<usize> = match column.relation.as_deref() {
            None => self
                .schema
                .fields
                .iter()
                .enumerate()
                .filter(|(_, f)| f.name == column.name)
                .map(|(i, _)| i)
                .collect(),
            Some(relation) => self
                .origins
                .iter()
                .enumerate()
                .filter(|(_, origin)| {
                    matches!(origin, Some(o) if o.relation == relation && o.name == column.name)
                })
                .map(|(i, _)| i)
                .collect(),
        };
        match hits.as_slice() {
            [] => Lookup::Missing,
            [index] => Lookup::Found(*index),
            _ => Lookup::Ambiguous(hits.iter().map(|i| self.describe(*i)).collect()),
        }
    }

    /// `relation.name` of an output column when its origin is known.
    fn describe(&self, index: usize) -> String {
        match self.origins.get(index).and_then(Option::as_ref) {
            Some(origin) => format!("{}.{}", origin.relation, origin.name),
            None => self.schema.fields[index].name.clone(),
        }
    }

    fn knows_relation(&self, relation: &str) -> bool {
        self.origins.iter().flatten().any(|o| o.relation == relation)
    }

    /// Origin of the column an expression passes through unchanged.
    fn origin_of(&self, expr: &Expr) -> Option<Origin> {
        let index = self.resolve(expr.as_column()?).ok()?;
        self.origins.get(index).cloned().flatten()
    }
}

impl Lookup {
    fn candidates(&self, rel: &RelNode) -> Vec<String> {
        match self {
            Lookup::Found(index) => vec![rel.describe(*index)],
            Lookup::Missing => vec![],
            Lookup::Ambiguous(candidates) => candidates.clone(),
        }
    }
}

fn display_ref(column: &ColumnRef) -> String {
    match &column.relation {
        Some(relation) => format!("{}.{}", relation, column.name),
        None => column.name.clone(),
    }
}

/// Error for a reference none of `rels` could bind.
fn unresolved(rels: &[&RelNode], column: &ColumnRef) -> IrError {
    if let Some(relation) = column.relation.as_deref() {
        let same_name: Vec<String> = rels
            .iter()
            .flat_map(|&rel| {
                rel.schema
                    .fields
                    .iter()
                    .zip(&rel.origins)
                    .enumerate()
                    .filter(move |(_, (f, origin))| {
                        f.name == column.name
                            || matches!(origin, Some(o) if o.name == column.name)
                    })
                    .map(move |(i, _)| rel.describe(i))
            })
            .collect();
        if !same_name.is_empty() && !rels.iter().any(|rel| rel.knows_relation(relation)) {
            return IrError::AmbiguousColumnReference {
                column: display_ref(column),
                candidates: same_name,
            };
        }
    }
    IrError::ColumnNotFound {
        column: column.name.clone(),
        available: rels
            .iter()
            .flat_map(|&rel| rel.schema.names())
            .map(str::to_string)
            .collect(),
    }
}

pub(crate) fn resolve_side(left: &Rel, right: &Rel, column: &ColumnRef) -> IrResult<(JoinSide, usize)> {
    match (left.lookup(column), right.lookup(column)) {
        (Lookup::Found(index), Lookup::Missing) => Ok((JoinSide::Left, index)),
        (Lookup::Missing, Lookup::Found(index)) => Ok((JoinSide::Right, index)),
        (Lookup::Missing, Lookup::Missing) => Err(unresolved(&[&**left, &**right], column)),
        (l, r) => Err(IrError::AmbiguousColumnReference {
            column: display_ref(column),
            candidates: l
                .candidates(left)
                .into_iter()
                .chain(r.candidates(right))
                .collect(),
        }),
    }
}

/// Every column an expression references must resolve in `rel`.
fn check_scope(rel: &RelNode, expr: &Expr) -> IrResult<()> {
    for col in expr.column_refs() {
        rel.resolve(col)?;
    }
    Ok(())
}

fn check_predicate(rel: &RelNode, predicate: &Expr, context: &str) -> IrResult<()> {
    check_scope(rel, predicate)?;
    if !matches!(predicate.data_type(), DataType::Bool | DataType::Null) {
        return Err(IrError::mismatch(context, "boolean", predicate.data_type()));
    }
    Ok(())
}

fn output_schema(fields: Vec<Field>) -> IrResult<Schema> {
    let schema = Schema::new(fields);
    if let Some(dup) = schema.duplicate_name() {
        return Err(IrError::DuplicateColumn(dup.to_string()));
    }
    Ok(schema)
}

fn field_of(named: &NamedExpr) -> Field {
    Field::new(named.output_name(), named.expr.data_type().clone())
}

/// Column references that are not under an aggregate call.
fn bare_columns(expr: &Expr) -> Vec<&ColumnRef> {
    match expr.kind() {
        ExprKind::Aggregate { .. } => vec![],
        ExprKind::Column(col) => vec![col],
        _ => expr.children().into_iter().flat_map(bare_columns).collect(),
    }
}

/// Fluent builders over `Rel`.
pub trait RelExt {
    /// Typed reference to an output column of this relation.
    fn col(&self, name: &str) -> IrResult<Expr>;
    fn select(&self, exprs: Vec<NamedExpr>) -> IrResult<Rel>;
    fn filter(&self, predicates: Vec<Expr>) -> IrResult<Rel>;
    fn aggregate(&self, keys: Vec<NamedExpr>, metrics: Vec<NamedExpr>) -> IrResult<Rel>;
    fn group_by(&self, keys: Vec<NamedExpr>) -> GroupedRel;
    fn value_counts(&self, expr: NamedExpr) -> IrResult<Rel>;
    fn order_by(&self, keys: Vec<SortKey>) -> IrResult<Rel>;
    fn limit(&self, n: u64) -> IrResult<Rel>;
    fn limit_offset(&self, n: Option<u64>, offset: u64) -> IrResult<Rel>;
    fn join(&self, right: &Rel, kind: JoinKind, predicates: Vec<Expr>) -> IrResult<Rel>;
    fn window(&self, exprs: Vec<NamedExpr>) -> IrResult<Rel>;
    fn distinct(&self) -> Rel;
}

impl RelExt for Rel {
    fn col(&self, name: &str) -> IrResult<Expr> {
        let field = self
            .schema
            .find_field(name)
            .ok_or_else(|| IrError::ColumnNotFound {
                column: name.to_string(),
                available: self.schema.names().into_iter().map(str::to_string).collect(),
            })?;
        Ok(Expr::column(
            self.qualifier().map(str::to_string),
            name,
            field.data_type.clone(),
        ))
    }

    fn select(&self, exprs: Vec<NamedExpr>) -> IrResult<Rel> {
        if exprs.is_empty() {
            return Err(IrError::InvalidPlan("projection needs at least one column".to_string()));
        }
        for named in &exprs {
            check_scope(self, &named.expr)?;
            if named.expr.contains_aggregate() {
                return Err(IrError::InvalidAggregation(format!(
                    "{} is an aggregate; use aggregate() instead",
                    named.output_name()
                )));
            }
        }
        let schema = output_schema(exprs.iter().map(field_of).collect())?;
        let origins = exprs.iter().map(|e| self.origin_of(&e.expr)).collect();
        Ok(RelNode::build(
            RelKind::Project {
                input: self.clone(),
                exprs,
            },
            schema,
            origins,
        ))
    }

    fn filter(&self, predicates: Vec<Expr>) -> IrResult<Rel> {
        for predicate in &predicates {
            check_predicate(self, predicate, "Filter")?;
            if predicate.contains_aggregate() {
                return Err(IrError::InvalidAggregation(
                    "aggregate in filter predicate; use having()".to_string(),
                ));
            }
        }
        Ok(RelNode::build(
            RelKind::Filter {
                input: self.clone(),
                predicates,
            },
            self.schema.clone(),
            self.origins.clone(),
        ))
    }

    fn aggregate(&self, keys: Vec<NamedExpr>, metrics: Vec<NamedExpr>) -> IrResult<Rel> {
        if keys.is_empty() && metrics.is_empty() {
            return Err(IrError::InvalidAggregation("nothing to aggregate".to_string()));
        }
        for key in &keys {
            check_scope(self, &key.expr)?;
            if key.expr.contains_aggregate() || key.expr.contains_window() {
                return Err(IrError::InvalidAggregation(format!(
                    "grouping key {} must be a row-level expression",
                    key.output_name()
                )));
            }
        }
        let key_columns: Vec<usize> = keys
            .iter()
            .filter_map(|k| k.expr.as_column().and_then(|c| self.resolve(c).ok()))
            .collect();
        for metric in &metrics {
            check_scope(self, &metric.expr)?;
            if !metric.expr.contains_aggregate() || metric.expr.contains_window() {
                return Err(IrError::InvalidAggregation(format!(
                    "{} is not an aggregate",
                    metric.output_name()
                )));
            }
            if let Some(col) = bare_columns(&metric.expr)
                .into_iter()
                .find(|c| self.resolve(c).map_or(true, |i| !key_columns.contains(&i)))
            {
                return Err(IrError::InvalidAggregation(format!(
                    "column {} in {} is neither grouped nor aggregated",
                    col.name,
                    metric.output_name()
                )));
            }
        }
        let schema = output_schema(keys.iter().chain(metrics.iter()).map(field_of).collect())?;
        let origins = keys
            .iter()
            .map(|k| self.origin_of(&k.expr))
            .chain(metrics.iter().map(|_| None))
            .collect();
        Ok(RelNode::build(
            RelKind::Aggregate {
                input: self.clone(),
                keys,
                metrics,
            },
            schema,
            origins,
        ))
    }

    fn group_by(&self, keys: Vec<NamedExpr>) -> GroupedRel {
        GroupedRel {
            input: self.clone(),
            keys,
            having: vec![],
        }
    }

    fn value_counts(&self, expr: NamedExpr) -> IrResult<Rel> {
        self.group_by(vec![expr]).size()
    }

    fn order_by(&self, keys: Vec<SortKey>) -> IrResult<Rel> {
        for key in &keys {
            check_scope(self, &key.expr)?;
            if key.expr.contains_aggregate() {
                return Err(IrError::InvalidAggregation(
                    "aggregate in sort key".to_string(),
                ));
            }
        }
        Ok(RelNode::build(
            RelKind::Sort {
                input: self.clone(),
                keys,
            },
            self.schema.clone(),
            self.origins.clone(),
        ))
    }

    fn limit(&self, n: u64) -> IrResult<Rel> {
        self.limit_offset(Some(n), 0)
    }

    fn limit_offset(&self, n: Option<u64>, offset: u64) -> IrResult<Rel> {
        if n.is_none() && offset == 0 {
            return Err(IrError::InvalidPlan("limit without a count or offset".to_string()));
        }
        Ok(RelNode::build(
            RelKind::Limit {
                input: self.clone(),
                n,
                offset,
            },
            self.schema.clone(),
            self.origins.clone(),
        ))
    }

    fn join(&self, right: &Rel, kind: JoinKind, predicates: Vec<Expr>) -> IrResult<Rel> {
        match (kind, predicates.is_empty()) {
            (JoinKind::Cross, false) => {
                return Err(IrError::InvalidPlan("cross join takes no predicates".to_string()))
            }
            (JoinKind::Cross, true) => {}
            (_, true) => {
                return Err(IrError::InvalidPlan(format!(
                    "{} join requires at least one predicate",
                    kind.as_str()
                )))
            }
            _ => {}
        }
        for predicate in &predicates {
            if !matches!(predicate.data_type(), DataType::Bool | DataType::Null) {
                return Err(IrError::mismatch("Join", "boolean", predicate.data_type()));
            }
            if predicate.contains_aggregate() || predicate.contains_window() {
                return Err(IrError::InvalidAggregation(
                    "join predicates must be row-level".to_string(),
                ));
            }
            for col in predicate.column_refs() {
                resolve_side(self, right, col)?;
            }
        }

        let mut fields = self.schema.fields.clone();
        for field in &right.schema.fields {
            let name = if self.schema.contains(&field.name) {
                format!("{}_right", field.name)
            } else {
                field.name.clone()
            };
            fields.push(Field {
                name,
                ..field.clone()
            });
        }
        let schema = output_schema(fields)?;
        let origins = self.origins.iter().chain(&right.origins).cloned().collect();
        Ok(RelNode::build(
            RelKind::Join {
                left: self.clone(),
                right: right.clone(),
                kind,
                predicates,
            },
            schema,
            origins,
        ))
    }

    fn window(&self, exprs: Vec<NamedExpr>) -> IrResult<Rel> {
        for named in &exprs {
            check_scope(self, &named.expr)?;
            if !named.expr.contains_window() {
                return Err(IrError::InvalidPlan(format!(
                    "{} is not a window expression",
                    named.output_name()
                )));
            }
            if named.expr.contains_aggregate() {
                return Err(IrError::InvalidAggregation(format!(
                    "{} mixes grouped and windowed aggregation",
                    named.output_name()
                )));
            }
        }
        let mut fields = self.schema.fields.clone();
        fields.extend(exprs.iter().map(field_of));
        let schema = output_schema(fields)?;
        let origins = self
            .origins
            .iter()
            .cloned()
            .chain(exprs.iter().map(|_| None))
            .collect();
        Ok(RelNode::build(
            RelKind::Window {
                input: self.clone(),
                exprs,
            },
            schema,
            origins,
        ))
    }

    fn distinct(&self) -> Rel {
        RelNode::build(
            RelKind::Distinct { input: self.clone() },
            self.schema.clone(),
            self.origins.clone(),
        )
    }
}

/// A relation with grouping keys and group predicates, awaiting metrics.
#[derive(Debug, Clone)]
pub struct GroupedRel {
    input: Rel,
    keys: Vec<NamedExpr>,
    having: Vec<Expr>,
}

impl GroupedRel {
    /// Add a group-level predicate; it may reference aggregates of the input.
    pub fn having(mut self, predicate: Expr) -> IrResult<Self> {
        check_predicate(&self.input, &predicate, "Having")?;
        if predicate.contains_window() {
            return Err(IrError::InvalidAggregation(
                "window function in having predicate".to_string(),
            ));
        }
        self.having.push(predicate);
        Ok(self)
    }

    pub fn aggregate(self, metrics: Vec<NamedExpr>) -> IrResult<Rel> {
        let agg = self.input.aggregate(self.keys, metrics)?;
        if self.having.is_empty() {
            return Ok(agg);
        }
        let schema = agg.schema.clone();
        let origins = agg.origins.clone();
        Ok(RelNode::build(
            RelKind::Having {
                input: agg,
                predicates: self.having,
            },
            schema,
            origins,
        ))
    }

    /// Row count per group, as a column named `count`.
    pub fn size(self) -> IrResult<Rel> {
        self.aggregate(vec![count_star().name("count")])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lit;

    fn sample() -> Rel {
        RelNode::table(
            "table",
            Schema::from_pairs([
                ("a", DataType::Int8),
                ("b", DataType::Int16),
                ("c", DataType::Int32),
                ("g", DataType::String),
                ("i", DataType::Timestamp),
            ]),
        )
        .unwrap()
    }

    #[test]
    fn test_col_carries_type_and_qualifier() {
        let t = sample();
        let c = t.col("c").unwrap();
        assert_eq!(c.data_type(), &DataType::Int32);
        assert_eq!(c.as_column().unwrap().relation.as_deref(), Some("table"));
        assert!(matches!(t.col("zz"), Err(IrError::ColumnNotFound { .. })));
    }

    #[test]
    fn test_aggregate_schema_keys_then_metrics() {
        let t = sample();
        let agg = t
            .group_by(vec![t.col("g").unwrap().into()])
            .aggregate(vec![t.col("b").unwrap().sum().unwrap().name("b_sum")])
            .unwrap();
        assert_eq!(agg.schema().names(), vec!["g", "b_sum"]);
        assert_eq!(agg.schema().find_field("b_sum").unwrap().data_type, DataType::Int64);
    }

    #[test]
    fn test_having_wraps_aggregate() {
        let t = sample();
        let rel = t
            .group_by(vec![t.col("g").unwrap().into()])
            .having(count_star().gt_eq(1000).unwrap())
            .unwrap()
            .aggregate(vec![t.col("b").unwrap().sum().unwrap().name("b_sum")])
            .unwrap();
        assert_eq!(rel.kind_name(), "Having");
        assert_eq!(rel.schema().names(), vec!["g", "b_sum"]);
    }

    #[test]
    fn test_ungrouped_column_in_metric_rejected() {
        let t = sample();
        let metric = t
            .col("b")
            .unwrap()
            .sum()
            .unwrap()
            .add(t.col("a").unwrap())
            .unwrap()
            .name("m");
        let err = t.aggregate(vec![t.col("g").unwrap().into()], vec![metric]).unwrap_err();
        assert!(matches!(err, IrError::InvalidAggregation(_)));
    }

    #[test]
    fn test_size_and_value_counts() {
        let t = sample();
        let rel = t.group_by(vec![t.col("i").unwrap().into()]).size().unwrap();
        assert_eq!(rel.schema().names(), vec!["i", "count"]);

        let rel = t.value_counts(t.col("g").unwrap().into()).unwrap();
        assert_eq!(rel.schema().names(), vec!["g", "count"]);
    }

    #[test]
    fn test_duplicate_projection_names() {
        let t = sample();
        let err = t
            .select(vec![t.col("a").unwrap().into(), t.col("b").unwrap().name("a")])
            .unwrap_err();
        assert_eq!(err, IrError::DuplicateColumn("a".to_string()));
    }

    #[test]
    fn test_filter_rejects_non_boolean_and_aggregates() {
        let t = sample();
        assert!(t.filter(vec![t.col("a").unwrap()]).is_err());
        let agg_pred = t.col("a").unwrap().sum().unwrap().gt(1).unwrap();
        assert!(matches!(t.filter(vec![agg_pred]), Err(IrError::InvalidAggregation(_))));
    }

    #[test]
    fn test_join_renames_collisions() {
        let left = sample();
        let right = RelNode::table(
            "other",
            Schema::from_pairs([("a", DataType::Int8), ("z", DataType::Float64)]),
        )
        .unwrap();
        let pred = left.col("a").unwrap().eq(right.col("a").unwrap()).unwrap();
        let joined = left.join(&right, JoinKind::Inner, vec![pred]).unwrap();
        assert_eq!(
            joined.schema().names(),
            vec!["a", "b", "c", "g", "i", "a_right", "z"]
        );
    }

    #[test]
    fn test_join_ambiguous_unqualified_reference() {
        let left = sample();
        let right = RelNode::table("other", Schema::from_pairs([("a", DataType::Int8)])).unwrap();
        let pred = Expr::column(None, "a", DataType::Int8).gt(lit(0)).unwrap();
        let err = left.join(&right, JoinKind::Inner, vec![pred]).unwrap_err();
        assert!(matches!(err, IrError::AmbiguousColumnReference { .. }));
    }

    #[test]
    fn test_self_join_needs_aliases() {
        let schema = Schema::from_pairs([("a", DataType::Int8)]);
        let l = RelNode::table_as("t", "l", schema.clone()).unwrap();
        let r = RelNode::table_as("t", "r", schema).unwrap();
        let pred = l.col("a").unwrap().eq(r.col("a").unwrap()).unwrap();
        let joined = l.join(&r, JoinKind::Left, vec![pred.clone()]).unwrap();
        let cols = pred.column_refs();
        assert_eq!(joined.resolve_join_side(cols[0]).unwrap(), (JoinSide::Left, 0));
        assert_eq!(joined.resolve_join_side(cols[1]).unwrap(), (JoinSide::Right, 0));
    }

    fn pair() -> (Rel, Rel, Rel) {
        let a = RelNode::table(
            "a",
            Schema::from_pairs([("id", DataType::Int64), ("x", DataType::Int64)]),
        )
        .unwrap();
        let b = RelNode::table(
            "b",
            Schema::from_pairs([("id", DataType::Int64), ("y", DataType::Int64)]),
        )
        .unwrap();
        let pred = a.col("id").unwrap().eq(b.col("id").unwrap()).unwrap();
        let joined = a.join(&b, JoinKind::Inner, vec![pred]).unwrap();
        (a, b, joined)
    }

    #[test]
    fn test_qualified_reference_finds_renamed_join_column() {
        let (a, b, joined) = pair();
        let b_id = b.col("id").unwrap();
        let b_ref = b_id.as_column().unwrap();
        assert_eq!(joined.resolve(b_ref).unwrap(), 2);
        assert_eq!(joined.schema().fields[2].name, "id_right");
        assert_eq!(joined.resolve(a.col("id").unwrap().as_column().unwrap()).unwrap(), 0);
        assert_eq!(
            joined.origins()[2],
            Some(Origin {
                relation: "b".to_string(),
                name: "id".to_string()
            })
        );

        // Origins survive unary nodes above the join.
        let filtered = joined.filter(vec![b_id.clone().gt(5).unwrap()]).unwrap();
        assert_eq!(filtered.resolve(b_ref).unwrap(), 2);
    }

    #[test]
    fn test_unknown_qualifier_is_ambiguous_not_guessed() {
        let (_, _, joined) = pair();
        let stray = ColumnRef {
            relation: Some("c".to_string()),
            name: "id".to_string(),
        };
        match joined.resolve(&stray).unwrap_err() {
            IrError::AmbiguousColumnReference { column, candidates } => {
                assert_eq!(column, "c.id");
                assert_eq!(candidates, vec!["a.id".to_string(), "b.id".to_string()]);
            }
            other => panic!("unexpected error {:?}", other),
        }

        let missing = ColumnRef {
            relation: Some("b".to_string()),
            name: "x".to_string(),
        };
        assert!(matches!(
            joined.resolve(&missing),
            Err(IrError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_three_way_join_resolves_through_inner_join() {
        let (_, b, joined) = pair();
        let c = RelNode::table(
            "c",
            Schema::from_pairs([("bid", DataType::Int64), ("z", DataType::Int64)]),
        )
        .unwrap();
        let pred = b.col("id").unwrap().eq(c.col("bid").unwrap()).unwrap();
        let three = joined.join(&c, JoinKind::Inner, vec![pred.clone()]).unwrap();
        let cols = pred.column_refs();
        assert_eq!(three.resolve_join_side(cols[0]).unwrap(), (JoinSide::Left, 2));
        assert_eq!(three.resolve_join_side(cols[1]).unwrap(), (JoinSide::Right, 0));
    }

    #[test]
    fn test_projection_over_join_keeps_column_origin() {
        let (a, b, joined) = pair();
        let projected = joined
            .select(vec![b.col("id").unwrap().name("b_id"), a.col("x").unwrap().into()])
            .unwrap();
        assert_eq!(projected.resolve(b.col("id").unwrap().as_column().unwrap()).unwrap(), 0);
        assert_eq!(projected.origins()[1].as_ref().map(|o| o.relation.as_str()), Some("a"));
    }

    #[test]
    fn test_window_appends_columns() {
        let t = sample();
        let w = crate::expr::row_number()
            .over(vec![t.col("g").unwrap()], vec![t.col("i").unwrap().asc()])
            .unwrap();
        let rel = t.window(vec![w.name("rn")]).unwrap();
        assert_eq!(rel.schema().names(), vec!["a", "b", "c", "g", "i", "rn"]);
        assert!(t.window(vec![t.col("a").unwrap().into()]).is_err());
    }

    #[test]
    fn test_qualifier_passes_through_unary_nodes() {
        let t = sample();
        let f = t.filter(vec![t.col("c").unwrap().gt(0).unwrap()]).unwrap();
        assert_eq!(f.qualifier(), Some("table"));
        let s = f.limit(5).unwrap();
        assert_eq!(s.qualifier(), Some("table"));
    }
}

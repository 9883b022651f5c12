//! Relational operator lowering
//!
//! Each node compiles to a [`Fragment`]: a SELECT under construction plus
//! the SQL defining each of its output columns. Operators are folded into
//! the fragment of their input when SQL evaluation order allows it; when it
//! does not (a second level of grouping, a filter after a limit, a window
//! over a window), the input fragment is wrapped as a derived table and the
//! operator applies to that.

use crate::ast::{FromItem, JoinOperator, Select, SelectItem, SqlExpr};
use crate::error::{CompileError, CompileResult};
use crate::scalar::{OutputColumn, ScalarCompiler, Scope};
use relc_ir::{Expr, JoinKind, NamedExpr, Rel, RelKind, RelNode, SortKey};
use relc_registry::{Dialect, DialectDescriptor, RuleTable};
use std::collections::HashMap;
use std::sync::Arc;

/// A SELECT under construction.
///
/// When `select.projection` is set it holds exactly one item per entry of
/// `columns`, in order.
#[derive(Debug, Clone)]
pub(crate) struct Fragment {
    pub select: Select,
    pub columns: Vec<OutputColumn>,
    /// The SELECT groups or aggregates.
    pub aggregated: bool,
    /// The SELECT evaluates window functions.
    pub windowed: bool,
}

impl Fragment {
    /// The statement with every column addressable by its output name.
    fn into_named_select(self) -> Select {
        let Fragment {
            mut select,
            columns,
            ..
        } = self;
        if let Some(items) = select.projection.as_mut() {
            for (item, column) in items.iter_mut().zip(&columns) {
                if item.alias.is_none() && !item.expr.is_column_named(&column.name) {
                    item.alias = Some(column.name.clone());
                }
            }
        }
        select
    }
}

pub(crate) struct RelCompiler<'a> {
    dialect: Dialect,
    descriptor: &'static DialectDescriptor,
    scalar: ScalarCompiler<'a>,
    memo: HashMap<*const RelNode, Fragment>,
    next_alias: usize,
}

impl<'a> RelCompiler<'a> {
    pub fn new(dialect: Dialect, rules: &'a RuleTable) -> Self {
        Self {
            dialect,
            descriptor: dialect.descriptor(),
            scalar: ScalarCompiler::new(dialect, rules),
            memo: HashMap::new(),
            next_alias: 0,
        }
    }

    pub fn compile(&mut self, rel: &Rel) -> CompileResult<Select> {
        Ok(self.compile_rel(rel)?.select)
    }

    fn compile_rel(&mut self, rel: &Rel) -> CompileResult<Fragment> {
        let key = Arc::as_ptr(rel);
        if let Some(hit) = self.memo.get(&key) {
            tracing::trace!(target: "relc::compile", node = rel.kind_name(), "memoized node");
            return Ok(hit.clone());
        }
        tracing::trace!(target: "relc::compile", node = rel.kind_name(), "compiling node");

        let fragment = match rel.kind() {
            RelKind::Table { name, alias } => Fragment {
                select: Select::new(FromItem::Table {
                    name: name.clone(),
                    alias: alias.clone(),
                }),
                columns: rel
                    .schema()
                    .fields
                    .iter()
                    .map(|f| OutputColumn {
                        name: f.name.clone(),
                        expr: SqlExpr::column(None, f.name.clone()),
                        data_type: f.data_type.clone(),
                    })
                    .collect(),
                aggregated: false,
                windowed: false,
            },
            RelKind::Project { input, exprs } => self.project(input, exprs)?,
            RelKind::Filter { input, predicates } => self.filter(input, predicates)?,
            RelKind::Aggregate {
                input,
                keys,
                metrics,
            } => self.aggregate(input, keys, metrics, &[])?,
            RelKind::Having { input, predicates } => match input.kind() {
                RelKind::Aggregate {
                    input,
                    keys,
                    metrics,
                } => self.aggregate(input, keys, metrics, predicates)?,
                _ => {
                    return Err(self.unsupported(
                        "Having",
                        format!("input is {}, not Aggregate", input.kind_name()),
                    ))
                }
            },
            RelKind::Sort { input, keys } => self.sort(input, keys)?,
            RelKind::Limit { input, n, offset } => {
                let mut f = self.compile_rel(input)?;
                if f.select.is_limited() {
                    f = self.wrap(f);
                }
                f.select.limit = *n;
                f.select.offset = *offset;
                f
            }
            RelKind::Join {
                left,
                right,
                kind,
                predicates,
            } => self.join(rel, left, right, *kind, predicates)?,
            RelKind::Window { input, exprs } => self.window(input, exprs)?,
            RelKind::Distinct { input } => {
                let mut f = self.compile_rel(input)?;
                if f.select.is_limited() {
                    f = self.wrap(f);
                }
                // SELECT DISTINCT may only order by selected expressions.
                if let Some(items) = &f.select.projection {
                    f.select
                        .order_by
                        .retain(|key| items.iter().any(|item| item.expr == key.expr));
                }
                f.select.distinct = true;
                f
            }
        };

        self.memo.insert(key, fragment.clone());
        Ok(fragment)
    }

    fn project(&mut self, input: &Rel, exprs: &[NamedExpr]) -> CompileResult<Fragment> {
        let mut f = self.compile_rel(input)?;
        // A second level of grouping must not collapse into the first.
        if f.aggregated || f.select.distinct || f.select.is_limited() {
            f = self.wrap(f);
        }
        let (items, columns) = self.select_items(exprs, input, &f.columns, false)?;
        f.windowed = f.windowed || items.iter().any(|item| item.expr.contains_window());
        f.select.projection = Some(items);
        f.columns = columns;
        Ok(f)
    }

    fn filter(&mut self, input: &Rel, predicates: &[Expr]) -> CompileResult<Fragment> {
        let mut f = self.compile_rel(input)?;
        if f.select.is_limited() || f.select.distinct {
            f = self.wrap(f);
        }
        if f.windowed && !f.aggregated && !self.descriptor.supports_qualify {
            f = self.wrap(f);
        }

        let scope = Scope::Columns {
            rel: input,
            columns: &f.columns,
        };
        let conditions = self.conditions(predicates, &scope)?;
        if f.aggregated {
            if !self.descriptor.supports_having {
                return Err(self.unsupported("Filter", "HAVING is not available".to_string()));
            }
            f.select.having.extend(conditions);
        } else if f.windowed {
            f.select.qualify.extend(conditions);
        } else {
            f.select.selection.extend(conditions);
        }
        Ok(f)
    }

    fn aggregate(
        &mut self,
        input: &Rel,
        keys: &[NamedExpr],
        metrics: &[NamedExpr],
        having: &[Expr],
    ) -> CompileResult<Fragment> {
        let mut f = self.compile_rel(input)?;
        if f.aggregated || f.windowed || f.select.is_limited() || f.select.distinct {
            f = self.wrap(f);
        }
        // Row order does not survive grouping.
        f.select.order_by.clear();

        // Computed keys are named so the result columns match the schema.
        let (key_items, key_columns) = self.select_items(keys, input, &f.columns, true)?;
        let (metric_items, metric_columns) = self.select_items(metrics, input, &f.columns, false)?;
        let scope = Scope::Columns {
            rel: input,
            columns: &f.columns,
        };
        let having = self.conditions(having, &scope)?;
        if !having.is_empty() && !self.descriptor.supports_having {
            return Err(self.unsupported("Having", "HAVING is not available".to_string()));
        }

        // Keys appear with identical text in the SELECT list and GROUP BY.
        f.select.group_by = key_items.iter().map(|item| item.expr.clone()).collect();
        f.select.having.extend(having);
        f.select.projection = Some(key_items.into_iter().chain(metric_items).collect());
        f.columns = key_columns.into_iter().chain(metric_columns).collect();
        f.aggregated = true;
        f.windowed = false;
        Ok(f)
    }

    fn sort(&mut self, input: &Rel, keys: &[SortKey]) -> CompileResult<Fragment> {
        let mut f = self.compile_rel(input)?;
        if f.select.is_limited() {
            f = self.wrap(f);
        }
        let scope = Scope::Columns {
            rel: input,
            columns: &f.columns,
        };
        let mut order_by = self.scalar.lower_sort_keys(keys, &scope)?;
        order_by.append(&mut f.select.order_by);
        f.select.order_by = order_by;
        Ok(f)
    }

    fn window(&mut self, input: &Rel, exprs: &[NamedExpr]) -> CompileResult<Fragment> {
        let mut f = self.compile_rel(input)?;
        if f.aggregated || f.windowed || f.select.is_limited() || f.select.distinct {
            f = self.wrap(f);
        }

        let mut items = match f.select.projection.take() {
            Some(items) => items,
            None => f
                .columns
                .iter()
                .map(|c| SelectItem {
                    expr: c.expr.clone(),
                    alias: None,
                })
                .collect(),
        };
        let (new_items, new_columns) = self.select_items(exprs, input, &f.columns, false)?;
        items.extend(new_items);
        f.select.projection = Some(items);
        f.columns.extend(new_columns);
        f.windowed = true;
        Ok(f)
    }

    fn join(
        &mut self,
        rel: &RelNode,
        left: &Rel,
        right: &Rel,
        kind: JoinKind,
        predicates: &[Expr],
    ) -> CompileResult<Fragment> {
        let op = match kind {
            JoinKind::Inner => JoinOperator::Inner,
            JoinKind::Left => JoinOperator::Left,
            JoinKind::Right if self.descriptor.supports_right_join => JoinOperator::Right,
            JoinKind::Full if self.descriptor.supports_full_join => JoinOperator::Full,
            JoinKind::Cross => JoinOperator::Cross,
            JoinKind::Right | JoinKind::Full => {
                return Err(self.unsupported(
                    "Join",
                    format!("{} outer join is not available", kind.as_str()),
                ))
            }
        };

        let left_fragment = self.compile_rel(left)?;
        let right_fragment = self.compile_rel(right)?;
        let left_alias = self.alias();
        let right_alias = self.alias();
        let (left_from, left_columns) = join_side(left_fragment, &left_alias);
        let (right_from, right_columns) = join_side(right_fragment, &right_alias);

        let on = self.conditions(
            predicates,
            &Scope::Join {
                node: rel,
                left: &left_columns,
                right: &right_columns,
            },
        )?;

        // Output fields are the left columns then the (renamed) right ones.
        let mut items = Vec::new();
        let mut columns = Vec::new();
        for (field, side) in rel
            .schema()
            .fields
            .iter()
            .zip(left_columns.into_iter().chain(right_columns))
        {
            items.push(SelectItem {
                alias: column_alias(&side.expr, &field.name, false),
                expr: side.expr.clone(),
            });
            columns.push(OutputColumn {
                name: field.name.clone(),
                expr: side.expr,
                data_type: field.data_type.clone(),
            });
        }

        let mut select = Select::new(FromItem::Join {
            left: Box::new(left_from),
            right: Box::new(right_from),
            op,
            on,
        });
        select.projection = Some(items);
        Ok(Fragment {
            select,
            columns,
            aggregated: false,
            windowed: false,
        })
    }

    /// Lower `exprs` over the columns of `input`. With `name_computed`
    /// every non-column item carries its output name.
    fn select_items(
        &self,
        exprs: &[NamedExpr],
        input: &RelNode,
        columns: &[OutputColumn],
        name_computed: bool,
    ) -> CompileResult<(Vec<SelectItem>, Vec<OutputColumn>)> {
        let scope = Scope::Columns {
            rel: input,
            columns,
        };
        let mut items = Vec::with_capacity(exprs.len());
        let mut columns = Vec::with_capacity(exprs.len());
        for named in exprs {
            let name = named.output_name();
            let compiled = self.scalar.compile(&named.expr, &scope)?;
            items.push(SelectItem {
                alias: column_alias(&compiled.expr, &name, name_computed || named.alias.is_some()),
                expr: compiled.expr.clone(),
            });
            columns.push(OutputColumn {
                name,
                expr: compiled.expr,
                data_type: compiled.data_type,
            });
        }
        Ok((items, columns))
    }

    /// Lower predicates to a flat list of conjuncts.
    fn conditions(&self, predicates: &[Expr], scope: &Scope<'_>) -> CompileResult<Vec<SqlExpr>> {
        predicates
            .iter()
            .flat_map(Expr::conjuncts)
            .map(|p| self.scalar.lower(p, scope))
            .collect()
    }

    /// Turn `f` into a derived table and start a new SELECT over it.
    fn wrap(&mut self, f: Fragment) -> Fragment {
        let alias = self.alias();
        tracing::debug!(
            target: "relc::compile",
            alias = %alias,
            aggregated = f.aggregated,
            windowed = f.windowed,
            "wrapping fragment as derived table"
        );
        let columns = f
            .columns
            .iter()
            .map(|c| OutputColumn {
                name: c.name.clone(),
                expr: SqlExpr::column(None, c.name.clone()),
                data_type: c.data_type.clone(),
            })
            .collect();
        Fragment {
            select: Select::new(FromItem::Derived {
                select: Box::new(f.into_named_select()),
                alias,
            }),
            columns,
            aggregated: false,
            windowed: false,
        }
    }

    fn alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    fn unsupported(&self, operator: &str, detail: String) -> CompileError {
        CompileError::UnsupportedOperator {
            operator: operator.to_string(),
            dialect: self.dialect,
            detail,
        }
    }
}

/// A join input as a FROM item under `alias`, with its columns qualified.
fn join_side(f: Fragment, alias: &str) -> (FromItem, Vec<OutputColumn>) {
    let columns = f
        .columns
        .iter()
        .map(|c| OutputColumn {
            name: c.name.clone(),
            expr: SqlExpr::column(Some(alias), c.name.clone()),
            data_type: c.data_type.clone(),
        })
        .collect();
    let from = match f.select.as_bare_table() {
        Some(table) => FromItem::Table {
            name: table.to_string(),
            alias: Some(alias.to_string()),
        },
        None => FromItem::Derived {
            select: Box::new(f.into_named_select()),
            alias: alias.to_string(),
        },
    };
    (from, columns)
}

/// Alias for a SELECT item producing column `name`.
///
/// Plain column references are renamed only when the name differs; other
/// expressions carry an alias only when one was asked for.
fn column_alias(expr: &SqlExpr, name: &str, explicit: bool) -> Option<String> {
    match expr {
        SqlExpr::Column { name: n, .. } if n == name => None,
        SqlExpr::Column { .. } => Some(name.to_string()),
        _ if explicit => Some(name.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relc_ir::{DataType, RelExt, Schema};

    fn table() -> Rel {
        RelNode::table(
            "table",
            Schema::from_pairs([("a", DataType::Int64), ("g", DataType::String)]),
        )
        .unwrap()
    }

    #[test]
    fn test_aliases_are_sequential() {
        let rules = RuleTable::builtin();
        let mut compiler = RelCompiler::new(Dialect::Postgres, &rules);
        assert_eq!(compiler.alias(), "t0");
        assert_eq!(compiler.alias(), "t1");
    }

    #[test]
    fn test_shared_subtree_compiled_once() {
        let t = table();
        let f = t.filter(vec![t.col("a").unwrap().gt(1).unwrap()]).unwrap();

        let rules = RuleTable::builtin();
        let mut compiler = RelCompiler::new(Dialect::Postgres, &rules);
        compiler.compile(&f).unwrap();
        assert_eq!(compiler.memo.len(), 2);
        compiler.compile(&f).unwrap();
        assert_eq!(compiler.memo.len(), 2);
    }

    #[test]
    fn test_wrap_names_every_column() {
        let t = table();
        let p = t
            .select(vec![t.col("a").unwrap().add(1).unwrap().into()])
            .unwrap();
        let rules = RuleTable::builtin();
        let mut compiler = RelCompiler::new(Dialect::Postgres, &rules);
        let f = compiler.compile_rel(&p).unwrap();
        let select = f.into_named_select();
        let items = select.projection.unwrap();
        assert_eq!(items[0].alias.as_deref(), Some("Add(a, 1)"));
    }

    #[test]
    fn test_column_alias_rules() {
        let a = SqlExpr::column(Some("t0"), "a");
        assert_eq!(column_alias(&a, "a", true), None);
        assert_eq!(column_alias(&a, "a_right", false).as_deref(), Some("a_right"));
        assert_eq!(column_alias(&SqlExpr::int(1), "x", false), None);
        assert_eq!(column_alias(&SqlExpr::int(1), "x", true).as_deref(), Some("x"));
    }
}

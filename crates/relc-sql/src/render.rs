//! SQL text rendering
//!
//! Turns the syntax tree into single-line text for one dialect. Everything
//! that varies between dialects at the token level (identifier quoting,
//! string escapes, temporal literals, offset syntax) is decided here from the
//! dialect descriptor; structural differences are resolved earlier by the
//! compiler.

use crate::ast::{
    FromItem, FunctionCall, Literal, OrderByItem, Select, SelectItem, SqlExpr, UnaryOperator,
    WindowSpec,
};
use relc_registry::{DialectDescriptor, OffsetStyle, StringEscape};

pub struct Renderer {
    dialect: &'static DialectDescriptor,
}

impl Renderer {
    pub fn new(dialect: &'static DialectDescriptor) -> Self {
        Self { dialect }
    }

    /// Quote an identifier, doubling any embedded quote character.
    pub fn quote_identifier(&self, name: &str) -> String {
        let q = self.dialect.quote.char();
        let mut out = String::with_capacity(name.len() + 2);
        out.push(q);
        for c in name.chars() {
            if c == q {
                out.push(q);
            }
            out.push(c);
        }
        out.push(q);
        out
    }

    pub fn quote_string(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('\'');
        for c in value.chars() {
            match (c, self.dialect.string_escape) {
                ('\'', StringEscape::Standard) => out.push_str("''"),
                ('\'', StringEscape::Backslash) => out.push_str("\\'"),
                ('\\', StringEscape::Backslash) => out.push_str("\\\\"),
                _ => out.push(c),
            }
        }
        out.push('\'');
        out
    }

    pub fn render_select(&self, select: &Select) -> String {
        let mut sql = String::from("SELECT ");
        if select.distinct {
            sql.push_str("DISTINCT ");
        }
        match &select.projection {
            Some(items) => sql.push_str(&self.join(items, |item| self.render_select_item(item))),
            None => sql.push('*'),
        }

        sql.push_str(" FROM ");
        sql.push_str(&self.render_from(&select.from));

        if !select.selection.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_conjunction(&select.selection));
        }
        if !select.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.join(&select.group_by, |e| self.render_expr(e)));
        }
        if !select.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.render_conjunction(&select.having));
        }
        if !select.qualify.is_empty() {
            sql.push_str(" QUALIFY ");
            sql.push_str(&self.render_conjunction(&select.qualify));
        }
        if !select.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.render_order_by(&select.order_by));
        }

        match (select.limit, select.offset) {
            (Some(n), 0) => sql.push_str(&format!(" LIMIT {}", n)),
            (Some(n), offset) => sql.push_str(&format!(" LIMIT {} OFFSET {}", n, offset)),
            (None, 0) => {}
            (None, offset) => match self.dialect.offset_without_limit {
                OffsetStyle::Bare => sql.push_str(&format!(" OFFSET {}", offset)),
                OffsetStyle::LimitSentinel(all) => {
                    sql.push_str(&format!(" LIMIT {} OFFSET {}", all, offset))
                }
            },
        }
        sql
    }

    fn render_select_item(&self, item: &SelectItem) -> String {
        let expr = self.render_expr(&item.expr);
        match &item.alias {
            Some(alias) => format!("{} AS {}", expr, self.quote_identifier(alias)),
            None => expr,
        }
    }

    fn render_from(&self, from: &FromItem) -> String {
        match from {
            FromItem::Table { name, alias: None } => self.quote_identifier(name),
            FromItem::Table {
                name,
                alias: Some(alias),
            } => format!(
                "{} AS {}",
                self.quote_identifier(name),
                self.quote_identifier(alias)
            ),
            FromItem::Derived { select, alias } => format!(
                "({}) AS {}",
                self.render_select(select),
                self.quote_identifier(alias)
            ),
            FromItem::Join {
                left,
                right,
                op,
                on,
            } => {
                let mut sql = format!(
                    "{} {} {}",
                    self.render_from(left),
                    op.keyword(),
                    self.render_from(right)
                );
                if !on.is_empty() {
                    sql.push_str(" ON ");
                    sql.push_str(&self.render_conjunction(on));
                }
                sql
            }
        }
    }

    fn render_conjunction(&self, predicates: &[SqlExpr]) -> String {
        predicates
            .iter()
            .map(|p| self.render_expr(p))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn render_order_by(&self, items: &[OrderByItem]) -> String {
        self.join(items, |item| {
            let direction = if item.descending { "DESC" } else { "ASC" };
            format!("{} {}", self.render_expr(&item.expr), direction)
        })
    }

    pub fn render_expr(&self, expr: &SqlExpr) -> String {
        match expr {
            SqlExpr::Column { qualifier, name } => match qualifier {
                Some(q) => format!(
                    "{}.{}",
                    self.quote_identifier(q),
                    self.quote_identifier(name)
                ),
                None => self.quote_identifier(name),
            },
            SqlExpr::Literal(lit) => self.render_literal(lit),
            SqlExpr::Star => "*".to_string(),
            SqlExpr::Unary { op, operand } => {
                let inner = self.render_expr(operand);
                match op {
                    UnaryOperator::Not if is_atomic(operand) || is_logical(operand) => {
                        format!("NOT {}", inner)
                    }
                    UnaryOperator::Not => format!("NOT ({})", inner),
                    UnaryOperator::Minus if is_atomic(operand) && !is_literal(operand) => {
                        format!("-{}", inner)
                    }
                    UnaryOperator::Minus => format!("-({})", inner),
                }
            }
            SqlExpr::Binary { op, left, right } if op.is_logical() => format!(
                "({} {} {})",
                self.render_operand(left),
                op.as_str(),
                self.render_operand(right)
            ),
            SqlExpr::Binary { op, left, right } => format!(
                "{} {} {}",
                self.render_operand(left),
                op.as_str(),
                self.render_operand(right)
            ),
            SqlExpr::Function(call) => self.render_function(call),
            SqlExpr::Extract { field, expr } => {
                format!("EXTRACT({} FROM {})", field, self.render_expr(expr))
            }
            SqlExpr::Case {
                branches,
                otherwise,
            } => {
                let mut sql = String::from("CASE");
                for (when, then) in branches {
                    sql.push_str(&format!(
                        " WHEN {} THEN {}",
                        self.render_expr(when),
                        self.render_expr(then)
                    ));
                }
                if let Some(other) = otherwise {
                    sql.push_str(&format!(" ELSE {}", self.render_expr(other)));
                }
                sql.push_str(" END");
                sql
            }
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => format!(
                "{} {}IN ({})",
                self.render_operand(expr),
                if *negated { "NOT " } else { "" },
                self.join(list, |e| self.render_expr(e))
            ),
            SqlExpr::IsNull { expr, negated } => format!(
                "{} IS {}NULL",
                self.render_operand(expr),
                if *negated { "NOT " } else { "" }
            ),
            SqlExpr::Cast { expr, type_name } => {
                format!("CAST({} AS {})", self.render_expr(expr), type_name)
            }
        }
    }

    /// Operand of a binary operator, predicate or postfix test.
    ///
    /// Nested comparisons and arithmetic always get their own parentheses;
    /// logical operators already carry them.
    fn render_operand(&self, expr: &SqlExpr) -> String {
        match expr {
            SqlExpr::Binary { op, .. } if !op.is_logical() => {
                format!("({})", self.render_expr(expr))
            }
            SqlExpr::InList { .. } | SqlExpr::IsNull { .. } => {
                format!("({})", self.render_expr(expr))
            }
            _ => self.render_expr(expr),
        }
    }

    fn render_function(&self, call: &FunctionCall) -> String {
        let mut sql = format!(
            "{}({}{})",
            call.name,
            if call.distinct { "DISTINCT " } else { "" },
            self.join(&call.args, |e| self.render_expr(e))
        );
        if let Some(filter) = &call.filter {
            sql.push_str(&format!(" FILTER (WHERE {})", self.render_expr(filter)));
        }
        if let Some(window) = &call.over {
            sql.push_str(&format!(" OVER ({})", self.render_window(window)));
        }
        sql
    }

    fn render_window(&self, window: &WindowSpec) -> String {
        let mut parts = Vec::new();
        if !window.partition_by.is_empty() {
            parts.push(format!(
                "PARTITION BY {}",
                self.join(&window.partition_by, |e| self.render_expr(e))
            ));
        }
        if !window.order_by.is_empty() {
            parts.push(format!("ORDER BY {}", self.render_order_by(&window.order_by)));
        }
        parts.join(" ")
    }

    fn render_literal(&self, lit: &Literal) -> String {
        match lit {
            Literal::Null => "NULL".to_string(),
            Literal::Bool(true) => "TRUE".to_string(),
            Literal::Bool(false) => "FALSE".to_string(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(x) => {
                let text = x.to_string();
                if text.contains(['.', 'e', 'E']) {
                    text
                } else {
                    format!("{}.0", text)
                }
            }
            Literal::Number(text) => text.clone(),
            Literal::String(s) => self.quote_string(s),
            Literal::Date(d) => self.temporal("DATE", &d.format("%Y-%m-%d").to_string()),
            Literal::Timestamp(ts) => self.temporal(
                "TIMESTAMP",
                &ts.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            ),
        }
    }

    fn temporal(&self, keyword: &str, text: &str) -> String {
        if self.dialect.typed_temporal_literals {
            format!("{} {}", keyword, self.quote_string(text))
        } else {
            self.quote_string(text)
        }
    }

    fn join<T>(&self, items: &[T], f: impl Fn(&T) -> String) -> String {
        items.iter().map(f).collect::<Vec<_>>().join(", ")
    }
}

fn is_atomic(expr: &SqlExpr) -> bool {
    matches!(
        expr,
        SqlExpr::Column { .. }
            | SqlExpr::Literal(_)
            | SqlExpr::Function(_)
            | SqlExpr::Cast { .. }
            | SqlExpr::Extract { .. }
    )
}

fn is_literal(expr: &SqlExpr) -> bool {
    matches!(expr, SqlExpr::Literal(_))
}

fn is_logical(expr: &SqlExpr) -> bool {
    matches!(expr, SqlExpr::Binary { op, .. } if op.is_logical())
}

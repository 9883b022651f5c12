use proptest::prelude::*;
use relc_ir::{DataType, DatePart, NamedExpr, Rel, RelExt, RelNode, Schema};
use relc_registry::{Dialect, RuleTable};
use relc_sql::render::Renderer;
use relc_sql::{compile, compile_expr, compile_select};

fn table() -> Rel {
    RelNode::table(
        "events",
        Schema::from_pairs([
            ("a", DataType::Int64),
            ("b", DataType::Float64),
            ("g", DataType::String),
            ("ts", DataType::Timestamp),
        ]),
    )
    .unwrap()
}

fn dialect() -> impl Strategy<Value = Dialect> {
    prop::sample::select(Dialect::ALL.to_vec())
}

fn date_part() -> impl Strategy<Value = DatePart> {
    prop::sample::select(vec![
        DatePart::Year,
        DatePart::Quarter,
        DatePart::Month,
        DatePart::WeekOfYear,
        DatePart::DayOfYear,
        DatePart::Day,
        DatePart::Hour,
        DatePart::Minute,
        DatePart::Second,
    ])
}

/// Filter, group, order and limit with generated constants.
fn pipeline(threshold: i64, limit: u64, offset: u64) -> Rel {
    let t = table();
    let filtered = t
        .filter(vec![t.col("a").unwrap().gt(threshold).unwrap()])
        .unwrap();
    let grouped = filtered
        .group_by(vec![filtered.col("g").unwrap().into()])
        .aggregate(vec![filtered.col("b").unwrap().mean().unwrap().name("avg_b")])
        .unwrap();
    grouped
        .order_by(vec![grouped.col("avg_b").unwrap().desc()])
        .unwrap()
        .limit_offset(Some(limit), offset)
        .unwrap()
}

proptest! {
    #[test]
    fn compilation_is_deterministic(
        dialect in dialect(),
        threshold in -1000i64..1000,
        limit in 1u64..500,
        offset in 0u64..50,
    ) {
        let rules = RuleTable::builtin();
        let first = compile(&pipeline(threshold, limit, offset), dialect, &rules).unwrap();
        let second = compile(&pipeline(threshold, limit, offset), dialect, &rules).unwrap();
        prop_assert_eq!(&first.sql, &second.sql);
        prop_assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn filter_lands_where_its_input_allows(dialect in dialect(), threshold in -1000i64..1000) {
        let t = table();
        let row_level = t.filter(vec![t.col("a").unwrap().gt(threshold).unwrap()]).unwrap();
        let sql = compile(&row_level, dialect, &RuleTable::builtin()).unwrap().sql;
        prop_assert!(sql.contains(" WHERE "));
        prop_assert!(!sql.contains(" HAVING "));

        let agg = t
            .group_by(vec![t.col("g").unwrap().into()])
            .aggregate(vec![t.col("a").unwrap().sum().unwrap().name("total")])
            .unwrap();
        let group_level = agg.filter(vec![agg.col("total").unwrap().gt(threshold).unwrap()]).unwrap();
        let sql = compile(&group_level, dialect, &RuleTable::builtin()).unwrap().sql;
        prop_assert!(sql.contains(" HAVING "));
        prop_assert!(!sql.contains(" WHERE "));
    }

    #[test]
    fn empty_membership_is_constant(dialect in dialect(), negated in any::<bool>()) {
        let t = table();
        let g = t.col("g").unwrap();
        let empty: Vec<String> = vec![];
        let predicate = if negated { g.notin(empty).unwrap() } else { g.isin(empty).unwrap() };
        let rel = t.filter(vec![predicate]).unwrap();
        let sql = compile(&rel, dialect, &RuleTable::builtin()).unwrap().sql;
        let expected_suffix = if negated { "WHERE 1 = 1" } else { "WHERE 1 = 0" };
        prop_assert!(sql.ends_with(expected_suffix));
        prop_assert!(!sql.contains(" IN "));
    }

    #[test]
    fn membership_lists_every_value(
        dialect in dialect(),
        values in prop::collection::vec("[a-z]{1,6}", 1..6),
    ) {
        let t = table();
        let rel = t.filter(vec![t.col("g").unwrap().isin(values.clone()).unwrap()]).unwrap();
        let sql = compile(&rel, dialect, &RuleTable::builtin()).unwrap().sql;
        for value in &values {
            let quoted = format!("'{}'", value);
            prop_assert!(sql.contains(&quoted));
        }
    }

    #[test]
    fn grouping_keys_render_identically(
        dialect in dialect(),
        parts in prop::collection::vec(date_part(), 1..4),
    ) {
        let t = table();
        let keys: Vec<NamedExpr> = parts
            .iter()
            .enumerate()
            .map(|(i, part)| t.col("ts").unwrap().extract(*part).unwrap().name(format!("k{}", i)))
            .collect();
        let rel = t.group_by(keys.clone()).size().unwrap();
        let select = compile_select(&rel, dialect, &RuleTable::builtin()).unwrap();

        let renderer = Renderer::new(dialect.descriptor());
        let projection = select.projection.as_ref().unwrap();
        prop_assert_eq!(select.group_by.len(), parts.len());
        for ((item, key), named) in projection.iter().zip(&select.group_by).zip(&keys) {
            let text = renderer.render_expr(key);
            prop_assert_eq!(&renderer.render_expr(&item.expr), &text);
            let (standalone, _) = compile_expr(&named.expr, dialect, &RuleTable::builtin()).unwrap();
            prop_assert_eq!(standalone, text);
        }
    }

    #[test]
    fn compiled_schema_is_root_schema(dialect in dialect(), threshold in -10i64..10) {
        let rel = pipeline(threshold, 10, 0);
        let compiled = compile(&rel, dialect, &RuleTable::builtin()).unwrap();
        prop_assert_eq!(&compiled.schema, rel.schema());
    }
}

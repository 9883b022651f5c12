//! Canonical operator trees compiled per dialect and compared byte-for-byte.

use pretty_assertions::assert_eq;
use relc_ir::{
    count_star, DataType, Field, InMemoryCatalog, PlanSpec, Rel, RelExt, RelNode, Schema, TableSchema,
};
use relc_registry::{Dialect, RuleTable};
use relc_sql::compile;

fn table() -> Rel {
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

fn sql(rel: &Rel, dialect: Dialect) -> String {
    compile(rel, dialect, &RuleTable::builtin()).unwrap().sql
}

#[test]
fn test_ungrouped_sum() {
    let t = table();
    let rel = t
        .aggregate(vec![], vec![t.col("a").unwrap().sum().unwrap().into()])
        .unwrap();
    assert_eq!(sql(&rel, Dialect::Postgres), r#"SELECT SUM("a") FROM "table""#);
    assert_eq!(sql(&rel, Dialect::Spark), "SELECT SUM(`a`) FROM `table`");
}

#[test]
fn test_group_by_size() {
    let t = table();
    let rel = t.group_by(vec![t.col("i").unwrap().into()]).size().unwrap();
    assert_eq!(
        sql(&rel, Dialect::DuckDB),
        r#"SELECT "i", COUNT(*) AS "count" FROM "table" GROUP BY "i""#
    );
    assert_eq!(rel.schema().names(), vec!["i", "count"]);
}

#[test]
fn test_isin_and_disjunction() {
    let t = table();
    let c = t.col("c").unwrap();
    let rel = t
        .filter(vec![
            c.clone().gt(0).unwrap().or(c.lt(0).unwrap()).unwrap(),
            t.col("g").unwrap().isin(["A", "B"]).unwrap(),
        ])
        .unwrap();
    assert_eq!(
        sql(&rel, Dialect::Postgres),
        r#"SELECT * FROM "table" WHERE (("c" > 0) OR ("c" < 0)) AND "g" IN ('A', 'B')"#
    );
}

#[test]
fn test_filtered_nunique() {
    let t = table();
    let metric = t
        .col("b")
        .unwrap()
        .nunique()
        .unwrap()
        .with_filter(t.col("g").unwrap().eq("A").unwrap())
        .unwrap();
    let rel = t.aggregate(vec![], vec![metric.into()]).unwrap();

    assert_eq!(
        sql(&rel, Dialect::Postgres),
        r#"SELECT COUNT(DISTINCT "b") FILTER (WHERE "g" = 'A') FROM "table""#
    );
    assert_eq!(
        sql(&rel, Dialect::Flink),
        "SELECT COUNT(DISTINCT CASE WHEN `g` = 'A' THEN `b` END) FROM `table`"
    );
    assert_eq!(
        sql(&rel, Dialect::MySQL),
        "SELECT COUNT(DISTINCT CASE WHEN `g` = 'A' THEN `b` END) FROM `table`"
    );
}

#[test]
fn test_nested_group_by_wraps_inner_aggregate() {
    let t = table();
    let inner = t
        .group_by(vec![t.col("a").unwrap().into(), t.col("c").unwrap().into()])
        .aggregate(vec![t.col("b").unwrap().sum().unwrap().name("the_sum")])
        .unwrap();
    let outer = inner
        .group_by(vec![inner.col("a").unwrap().into()])
        .aggregate(vec![inner
            .col("the_sum")
            .unwrap()
            .abs()
            .unwrap()
            .mean()
            .unwrap()
            .name("mad")])
        .unwrap();

    assert_eq!(
        sql(&outer, Dialect::Postgres),
        concat!(
            r#"SELECT "a", AVG(ABS("the_sum")) AS "mad" "#,
            r#"FROM (SELECT "a", "c", SUM("b") AS "the_sum" FROM "table" GROUP BY "a", "c") AS "t0" "#,
            r#"GROUP BY "a""#
        )
    );
    assert_eq!(outer.schema().names(), vec!["a", "mad"]);
}

#[test]
fn test_having_count() {
    let t = table();
    let rel = t
        .group_by(vec![t.col("g").unwrap().into()])
        .having(count_star().gt_eq(1000).unwrap())
        .unwrap()
        .aggregate(vec![t.col("b").unwrap().sum().unwrap().name("b_sum")])
        .unwrap();
    assert_eq!(
        sql(&rel, Dialect::Postgres),
        r#"SELECT "g", SUM("b") AS "b_sum" FROM "table" GROUP BY "g" HAVING COUNT(*) >= 1000"#
    );
}

#[test]
fn test_scenarios_from_json_plan() {
    let catalog = InMemoryCatalog::from(vec![TableSchema {
        name: "table".to_string(),
        fields: vec![
            Field::new("g", DataType::String),
            Field::new("b", DataType::Int16),
        ],
    }]);
    let json = r#"{
        "op": "aggregate",
        "input": {"op": "table", "name": "table"},
        "keys": [{"expr": {"type": "column", "name": "g"}}],
        "metrics": [{"alias": "b_sum", "expr": {"type": "aggregate", "func": "sum",
                     "arg": {"type": "column", "name": "b"}}}],
        "having": [{"type": "binary", "op": "gt_eq",
                    "left": {"type": "aggregate", "func": "count"},
                    "right": {"type": "literal", "value": 1000}}]
    }"#;
    let spec: PlanSpec = serde_json::from_str(json).unwrap();
    let rel = spec.build(&catalog).unwrap();
    assert_eq!(
        sql(&rel, Dialect::SQLite),
        r#"SELECT "g", SUM("b") AS "b_sum" FROM "table" GROUP BY "g" HAVING COUNT(*) >= 1000"#
    );
}

#[test]
fn test_compiled_schema_matches_root() {
    let t = table();
    let rel = t
        .group_by(vec![t.col("i").unwrap().year().unwrap().name("year")])
        .aggregate(vec![t.col("a").unwrap().mean().unwrap().name("avg_a")])
        .unwrap();
    for dialect in Dialect::ALL {
        let compiled = compile(&rel, dialect, &RuleTable::builtin()).unwrap();
        assert_eq!(&compiled.schema, rel.schema());
        assert_eq!(compiled.dialect, dialect);
    }
}

#[test]
fn test_fingerprint_depends_on_dialect() {
    let t = table();
    let rel = t.filter(vec![t.col("c").unwrap().gt(0).unwrap()]).unwrap();
    let rules = RuleTable::builtin();
    let pg = compile(&rel, Dialect::Postgres, &rules).unwrap();
    let duck = compile(&rel, Dialect::DuckDB, &rules).unwrap();
    assert_eq!(pg.sql, duck.sql);
    assert_ne!(pg.fingerprint(), duck.fingerprint());
    let again = compile(&rel, Dialect::Postgres, &rules).unwrap();
    assert_eq!(pg.fingerprint(), again.fingerprint());
}
